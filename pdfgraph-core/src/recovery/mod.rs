//! Reconstruction of damaged files.
//!
//! When the cross-reference table or trailer of a file cannot be read, or
//! an offset does not lead to the object it should, the document is
//! rebuilt from the raw bytes:
//!
//! 1. the file is scanned for `n g obj` headers and `trailer <<` markers
//!    (the last definition of an identifier wins),
//! 2. every object found is parsed at its offset,
//! 3. the last trailer found supplies the trailer dictionary,
//! 4. without a usable `/Root`, the physically last `/Type /Catalog`
//!    dictionary with a `/Pages` entry becomes the root,
//! 5. `/Size` is recomputed from the highest object number.
//!
//! Failing step 4 is fatal: [`PdfError::CatalogNotFound`].
//!
//! # Example
//!
//! ```rust,no_run
//! use pdfgraph::{Document, ParseOptions};
//!
//! # fn main() -> pdfgraph::Result<()> {
//! let bytes = std::fs::read("damaged.pdf")?;
//! let document = Document::load_from_bytes(&bytes, ParseOptions::lenient())?;
//! if document.is_recovered() {
//!     println!("rebuilt {} objects", document.xref().len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod scanner;

pub use scanner::{ObjectScanner, ScanResult, ScanStats};

use crate::error::{PdfError, Result};
use crate::objects::{Object, ObjectId};
use crate::parser::objects::ObjectParser;
use crate::parser::xref::{find_startxref, parse_section};
use crate::parser::ParseOptions;
use crate::trailer::Trailer;
use crate::xref::{DocumentId, IndirectReference, XRefTable};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// What the reconstruction found
#[derive(Debug, Clone, Default)]
pub struct RebuildReport {
    pub scan: ScanStats,
    /// Objects parsed and registered
    pub objects_recovered: usize,
    /// Headers found whose body could not be parsed or whose number is out
    /// of range
    pub unreadable: Vec<ObjectId>,
    pub trailer_found: bool,
    /// The root was located by searching for the catalog
    pub catalog_from_scan: bool,
}

/// Output of [`rebuild`]
#[derive(Debug)]
pub struct RebuiltDocument {
    pub xref: XRefTable,
    pub trailer: Trailer,
    pub report: RebuildReport,
}

/// Cheap test whether the standard structure is unreadable: no
/// `startxref`, or no parsable section where it points.
pub fn needs_xref_recovery(data: &[u8]) -> bool {
    let Ok(offset) = find_startxref(data) else {
        return true;
    };
    match usize::try_from(offset) {
        Ok(offset) if offset < data.len() => parse_section(data, offset, true).is_err(),
        _ => true,
    }
}

/// Rebuilds the cross-reference table and trailer from the raw bytes.
pub fn rebuild(data: &[u8], document: DocumentId, options: &ParseOptions) -> Result<RebuiltDocument> {
    info!(bytes = data.len(), "rebuilding cross-reference table from file contents");

    let scan = ObjectScanner::new()?.scan(data);
    let mut report = RebuildReport {
        scan: scan.stats.clone(),
        ..RebuildReport::default()
    };

    let mut xref = XRefTable::new(document).with_max_recursion_depth(options.max_recursion_depth);
    xref.set_under_construction(true);
    for (id, offset) in &scan.objects {
        // Rejected identifiers have no entry and are reported as unreadable below
        if let Err(e) = xref.add(IndirectReference::for_object_id(*id, *offset)) {
            warn!(object = %id, offset, error = %e, "scanned object cannot be registered");
        }
    }

    bind_scanned_objects(data, &scan.objects, &mut xref, &mut report);
    xref.set_under_construction(false);

    let mut trailer = scan
        .last_trailer
        .and_then(|offset| read_trailer_dictionary(data, offset))
        .map(|trailer| {
            report.trailer_found = true;
            trailer
        })
        .unwrap_or_default();

    if !has_catalog_root(&xref, &trailer) {
        let catalog = find_last_catalog(&xref, &scan).ok_or(PdfError::CatalogNotFound)?;
        warn!(catalog = %catalog, "trailer root unusable, adopting scanned catalog");
        trailer.set_root(catalog);
        report.catalog_from_scan = true;
    }

    let dict = trailer.dictionary_mut();
    dict.remove("Prev");
    dict.remove("XRefStm");
    let size = xref
        .iter()
        .map(|r| r.object_number())
        .max()
        .unwrap_or(0)
        .checked_add(1)
        .ok_or_else(|| PdfError::InvalidStructure("object number overflows /Size".to_string()))?;
    trailer.set_size(size);

    debug_assert!(xref.verify_consistency().is_ok());
    info!(
        objects = report.objects_recovered,
        unreadable = report.unreadable.len(),
        trailer_found = report.trailer_found,
        "cross-reference table rebuilt"
    );

    Ok(RebuiltDocument {
        xref,
        trailer,
        report,
    })
}

fn bind_scanned_objects(
    data: &[u8],
    offsets: &BTreeMap<ObjectId, u64>,
    xref: &mut XRefTable,
    report: &mut RebuildReport,
) {
    let resolve_length = |id: ObjectId| {
        let offset = usize::try_from(*offsets.get(&id)?).ok()?;
        match ObjectParser::parse_indirect_at(data, offset) {
            Ok((found, Object::Integer(length))) if found == id => Some(length),
            _ => None,
        }
    };

    for (id, offset) in offsets {
        let parsed = usize::try_from(*offset)
            .ok()
            .and_then(|start| {
                ObjectParser::at(data, start)
                    .with_lenient(true)
                    .with_length_resolver(&resolve_length)
                    .parse_indirect()
                    .map_err(|e| warn!(object = %id, offset, error = %e, "unreadable object"))
                    .ok()
            })
            .filter(|(found, _)| found == id);

        let bound = match (parsed, xref.get_mut(*id)) {
            (Some((_, object)), Some(reference)) => reference
                .bind(object)
                .map_err(|e| warn!(object = %id, error = %e, "object cannot be registered"))
                .is_ok(),
            _ => false,
        };

        if bound {
            report.objects_recovered += 1;
        } else {
            xref.remove(*id);
            report.unreadable.push(*id);
        }
    }
}

fn read_trailer_dictionary(data: &[u8], offset: u64) -> Option<Trailer> {
    let start = usize::try_from(offset).ok()?;
    match ObjectParser::at(data, start).with_lenient(true).parse_object() {
        Ok(Object::Dictionary(dict)) => Some(Trailer::from_dict(dict, None)),
        Ok(other) => {
            warn!(offset, found = other.type_name(), "trailer is not a dictionary");
            None
        }
        Err(e) => {
            warn!(offset, error = %e, "unreadable trailer");
            None
        }
    }
}

fn is_catalog(object: &Object) -> bool {
    matches!(object, Object::Dictionary(dict) if dict.has_type("Catalog") && dict.contains_key("Pages"))
}

fn has_catalog_root(xref: &XRefTable, trailer: &Trailer) -> bool {
    trailer
        .root()
        .and_then(|root| xref.get_object(root))
        .is_some_and(is_catalog)
}

/// The catalog defined last in the file.
fn find_last_catalog(xref: &XRefTable, scan: &ScanResult) -> Option<ObjectId> {
    scan.in_file_order()
        .into_iter()
        .rev()
        .map(|(id, _)| id)
        .find(|id| xref.get_object(*id).is_some_and(is_catalog))
}
