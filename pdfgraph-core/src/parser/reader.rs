//! Reads a complete file through its cross-reference sections.
//!
//! The reader follows `startxref` and the `/Prev` chain, registers one
//! placeholder reference per in-use entry while the table is under
//! construction, then binds every placeholder by parsing the object at its
//! offset. Any structural failure is returned as an error so the caller can
//! fall back to [`recovery`](crate::recovery).

use super::lexer::find_bytes;
use super::objects::ObjectParser;
use super::xref::{find_startxref, parse_section, XRefEntry};
use super::{ParseError, ParseOptions, ParseResult};
use crate::error::{PdfError, Result};
use crate::objects::{Object, ObjectId};
use crate::trailer::Trailer;
use crate::xref::{DocumentId, IndirectReference, XRefTable};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// How far into the file the `%PDF-` header is searched for in lenient mode.
const HEADER_WINDOW: usize = 1024;

/// Version assumed when a lenient read finds no header.
pub const DEFAULT_VERSION: &str = "1.4";

/// Everything a successful read produces
#[derive(Debug)]
pub struct ParsedDocument {
    pub version: String,
    pub xref: XRefTable,
    pub trailer: Trailer,
}

pub struct DocumentReader<'a> {
    data: &'a [u8],
    options: &'a ParseOptions,
}

impl<'a> DocumentReader<'a> {
    pub fn new(data: &'a [u8], options: &'a ParseOptions) -> Self {
        Self { data, options }
    }

    /// Version from the `%PDF-x.y` header.
    pub fn read_version(&self) -> ParseResult<String> {
        let header_at = if self.data.starts_with(b"%PDF-") {
            0
        } else if self.options.lenient {
            let window = &self.data[..self.data.len().min(HEADER_WINDOW)];
            match find_bytes(window, b"%PDF-") {
                Some(position) => {
                    warn!(position, "header does not start the file");
                    position
                }
                None => {
                    warn!("no PDF header, assuming version {DEFAULT_VERSION}");
                    return Ok(DEFAULT_VERSION.to_string());
                }
            }
        } else {
            return Err(ParseError::InvalidHeader);
        };

        let version: String = self.data[header_at + 5..]
            .iter()
            .take_while(|byte| byte.is_ascii_digit() || **byte == b'.')
            .map(|byte| *byte as char)
            .collect();

        if version.is_empty() {
            if self.options.lenient {
                return Ok(DEFAULT_VERSION.to_string());
            }
            return Err(ParseError::InvalidHeader);
        }
        Ok(version)
    }

    /// Reads the file through its cross-reference sections.
    pub fn read(&self, document: DocumentId) -> Result<ParsedDocument> {
        let version = self.read_version()?;
        let (entries, trailer) = self.read_sections()?;

        let mut xref = XRefTable::new(document)
            .with_max_recursion_depth(self.options.max_recursion_depth);
        xref.set_under_construction(true);

        let mut offsets = BTreeMap::new();
        for (number, entry) in &entries {
            if !entry.in_use || *number == 0 {
                continue;
            }
            let id = ObjectId::new(*number, entry.generation);
            xref.add(IndirectReference::for_object_id(id, entry.offset))?;
            offsets.insert(id, entry.offset);
        }

        self.bind_objects(&mut xref, &offsets)?;
        xref.set_under_construction(false);
        debug_assert!(
            xref.verify_consistency().is_ok(),
            "cross-reference table inconsistent after loading"
        );

        verify_root(&xref, &trailer)?;
        debug!(objects = xref.len(), version = %version, "read cross-reference table");

        Ok(ParsedDocument {
            version,
            xref,
            trailer,
        })
    }

    /// Walks `startxref` and the `/Prev` chain. Entries of newer sections
    /// shadow older ones; the returned trailer is the newest, linked to its
    /// predecessors.
    fn read_sections(&self) -> Result<(BTreeMap<u32, XRefEntry>, Trailer)> {
        let mut offset = find_startxref(self.data)?;
        let mut visited = BTreeSet::new();
        let mut sections = Vec::new();

        loop {
            if !visited.insert(offset) {
                warn!(offset, "loop in the /Prev chain");
                break;
            }
            let start = usize::try_from(offset)
                .ok()
                .filter(|start| *start < self.data.len())
                .ok_or(ParseError::InvalidXRef)?;
            let section = parse_section(self.data, start, self.options.lenient)?;
            let trailer = Trailer::from_dict(section.trailer, Some(offset));
            let previous = trailer.prev_offset();
            sections.push((section.entries, trailer));

            match previous {
                Some(previous) => offset = previous,
                None => break,
            }
        }

        let mut entries = BTreeMap::new();
        for (section_entries, _) in &sections {
            for (number, entry) in section_entries {
                entries.entry(*number).or_insert(*entry);
            }
        }

        let mut trailers = sections.into_iter().map(|(_, trailer)| trailer).rev();
        let oldest = trailers.next().ok_or(ParseError::InvalidTrailer)?;
        let newest = trailers.fold(oldest, |older, mut newer| {
            newer.set_previous(older);
            newer
        });

        Ok((entries, newest))
    }

    fn bind_objects(&self, xref: &mut XRefTable, offsets: &BTreeMap<ObjectId, u64>) -> Result<()> {
        let data = self.data;
        let resolve_length = |id: ObjectId| {
            let offset = usize::try_from(*offsets.get(&id)?).ok()?;
            match ObjectParser::parse_indirect_at(data, offset) {
                Ok((found, Object::Integer(length))) if found == id => Some(length),
                _ => None,
            }
        };

        for (id, offset) in offsets {
            let object = self.parse_object_at(*id, *offset, &resolve_length)?;
            if let Some(reference) = xref.get_mut(*id) {
                reference.bind(object)?;
            }
        }
        Ok(())
    }

    fn parse_object_at(
        &self,
        id: ObjectId,
        offset: u64,
        resolve_length: &dyn Fn(ObjectId) -> Option<i64>,
    ) -> Result<Object> {
        let mismatch = || {
            PdfError::from(ParseError::ObjectMismatch {
                expected: id.to_string(),
                offset,
            })
        };

        let start = usize::try_from(offset)
            .ok()
            .filter(|start| *start < self.data.len())
            .ok_or_else(mismatch)?;

        let (found, object) = ObjectParser::at(self.data, start)
            .with_lenient(self.options.lenient)
            .with_length_resolver(resolve_length)
            .parse_indirect()
            .map_err(|e| {
                warn!(object = %id, offset, error = %e, "object unreadable at recorded offset");
                mismatch()
            })?;

        if found != id {
            warn!(object = %id, found = %found, offset, "offset points at another object");
            return Err(mismatch());
        }
        Ok(object)
    }
}

/// The trailer's `/Root` must be a catalog with a page tree.
fn verify_root(xref: &XRefTable, trailer: &Trailer) -> Result<()> {
    let root = trailer
        .root()
        .ok_or_else(|| ParseError::MissingKey("Root".to_string()))?;
    let catalog = xref.get_object(root).and_then(Object::as_dict);
    match catalog {
        Some(dict) if dict.has_type("Catalog") && dict.contains_key("Pages") => Ok(()),
        _ => Err(PdfError::InvalidStructure(format!(
            "root {root} is not a catalog with a page tree"
        ))),
    }
}
