use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId};
use crate::parser::reader::DEFAULT_VERSION;
use crate::parser::{DocumentReader, ParseOptions};
use crate::recovery::{self, RebuildReport};
use crate::security::SecurityHandler;
use crate::trailer::Trailer;
use crate::writer::{format_pdf_date, PdfWriter, WriteOptions};
use crate::xref::{DocumentId, IndirectReference, XRefTable};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

/// Version written by documents created from scratch.
pub const DEFAULT_OUTPUT_VERSION: &str = "1.7";

/// A PDF document: its cross-reference table, which owns every indirect
/// object, and the trailer that roots the object graph.
///
/// # Example
///
/// ```rust,no_run
/// use pdfgraph::{Document, WriteOptions};
///
/// # fn main() -> pdfgraph::Result<()> {
/// let mut doc = Document::load("input.pdf")?;
/// println!("{} pages", doc.page_count()?);
///
/// // Drops everything the trailer cannot reach, then numbers densely
/// doc.save_with_options("output.pdf", &WriteOptions::default().with_renumber(true))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Document {
    id: DocumentId,
    version: String,
    xref: XRefTable,
    trailer: Trailer,
    security: Option<Box<dyn SecurityHandler>>,
    recovery: Option<RebuildReport>,
}

impl Document {
    /// Creates a document with an empty page tree and an Info dictionary.
    pub fn new() -> Self {
        let id = DocumentId::new();
        let mut xref = XRefTable::new(id);

        let mut pages = Dictionary::new();
        pages.set("Type", Object::name("Pages"));
        pages.set("Kids", Vec::<Object>::new());
        pages.set("Count", 0);
        let pages_id = ObjectId::new(1, 0);
        xref.insert_dictionary(pages_id, pages);

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::name("Catalog"));
        catalog.set("Pages", pages_id);
        let catalog_id = ObjectId::new(2, 0);
        xref.insert_dictionary(catalog_id, catalog);

        let now = format_pdf_date(Utc::now());
        let mut metadata = Dictionary::new();
        metadata.set(
            "Producer",
            format!("pdfgraph v{}", env!("CARGO_PKG_VERSION")),
        );
        metadata.set("CreationDate", now.clone());
        metadata.set("ModDate", now);
        let info_id = ObjectId::new(3, 0);
        xref.insert_dictionary(info_id, metadata);

        let mut trailer = Trailer::new();
        trailer.set_root(catalog_id);
        trailer.set_info(info_id);
        trailer.set_size(xref.max_object_number() + 1);

        Self {
            id,
            version: DEFAULT_OUTPUT_VERSION.to_string(),
            xref,
            trailer,
            security: None,
            recovery: None,
        }
    }

    /// Opens a file with [`ParseOptions::default`]: lenient, rebuilding the
    /// cross-reference table when the file is damaged.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_options(path, ParseOptions::default())
    }

    pub fn load_with_options(path: impl AsRef<Path>, options: ParseOptions) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::load_from_bytes(&data, options)
    }

    /// Reads a document from memory.
    ///
    /// The file is first read through its cross-reference sections. When
    /// that fails and `options.rebuild_on_failure` is set, the table and
    /// trailer are reconstructed by scanning the bytes.
    pub fn load_from_bytes(data: &[u8], options: ParseOptions) -> Result<Self> {
        let id = DocumentId::new();
        let reader = DocumentReader::new(data, &options);

        let error = match reader.read(id) {
            Ok(parsed) => {
                return Ok(Self::from_parts(
                    id,
                    parsed.version,
                    parsed.xref,
                    parsed.trailer,
                    None,
                ))
            }
            Err(error) if options.rebuild_on_failure => error,
            Err(error) => return Err(error),
        };

        warn!(error = %error, "standard read failed, reconstructing the document");
        Self::rebuild_with(data, id, &options)
    }

    /// Reconstructs the document by scanning `data`, ignoring whatever
    /// cross-reference sections the file has.
    pub fn rebuild_from_bytes(data: &[u8], options: ParseOptions) -> Result<Self> {
        Self::rebuild_with(data, DocumentId::new(), &options)
    }

    fn rebuild_with(data: &[u8], id: DocumentId, options: &ParseOptions) -> Result<Self> {
        let version = DocumentReader::new(data, options)
            .read_version()
            .unwrap_or_else(|e| {
                warn!(error = %e, "no usable header, assuming version {DEFAULT_VERSION}");
                DEFAULT_VERSION.to_string()
            });
        let rebuilt = recovery::rebuild(data, id, options)?;
        info!(
            objects = rebuilt.xref.len(),
            unreadable = rebuilt.report.unreadable.len(),
            "document recovered"
        );
        Ok(Self::from_parts(
            id,
            version,
            rebuilt.xref,
            rebuilt.trailer,
            Some(rebuilt.report),
        ))
    }

    fn from_parts(
        id: DocumentId,
        version: String,
        xref: XRefTable,
        trailer: Trailer,
        recovery: Option<RebuildReport>,
    ) -> Self {
        Self {
            id,
            version,
            xref,
            trailer,
            security: None,
            recovery,
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn xref(&self) -> &XRefTable {
        &self.xref
    }

    pub fn xref_mut(&mut self) -> &mut XRefTable {
        &mut self.xref
    }

    /// The newest trailer; older ones are reachable through
    /// [`Trailer::chain`].
    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Trailer {
        &mut self.trailer
    }

    pub fn security_handler(&self) -> Option<&dyn SecurityHandler> {
        self.security.as_deref()
    }

    pub fn set_security_handler(&mut self, handler: Box<dyn SecurityHandler>) {
        self.security = Some(handler);
    }

    /// Whether the document was reconstructed from a damaged file
    pub fn is_recovered(&self) -> bool {
        self.recovery.is_some()
    }

    pub fn recovery_report(&self) -> Option<&RebuildReport> {
        self.recovery.as_ref()
    }

    /// Makes `object` indirect and returns its identifier.
    pub fn add_object(&mut self, object: impl Into<Object>) -> Result<ObjectId> {
        self.xref.add_object(object.into())
    }

    /// Like [`Document::add_object`], but a reference edge is returned as is
    /// with `false` instead of failing.
    pub fn try_add_object(&mut self, object: impl Into<Object>) -> Result<(ObjectId, bool)> {
        self.xref.try_add_object(object.into())
    }

    /// Removes the indirect object `reference` points at.
    pub fn remove_object(&mut self, reference: &Object) -> Result<Option<IndirectReference>> {
        match reference {
            Object::Reference(id) => Ok(self.xref.remove(*id)),
            other => Err(PdfError::invalid_operation(format!(
                "cannot remove a direct {} object",
                other.type_name()
            ))),
        }
    }

    pub fn get_object(&self, id: ObjectId) -> Option<&Object> {
        self.xref.get_object(id)
    }

    pub fn get_object_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.xref.get_object_mut(id)
    }

    /// The value behind `object` if it is a reference edge, `object` itself
    /// otherwise.
    pub fn resolve<'a>(&'a self, object: &'a Object) -> Result<&'a Object> {
        match object {
            Object::Reference(id) => self.xref.resolve(*id),
            direct => Ok(direct),
        }
    }

    /// Replaces a reference edge with a copy of the object it points at.
    pub fn dereference(&self, object: &mut Object) -> Result<()> {
        if let Object::Reference(id) = object {
            *object = self.xref.resolve(*id)?.clone();
        }
        Ok(())
    }

    pub fn catalog(&self) -> Result<&Dictionary> {
        let root = self.root_id()?;
        self.xref
            .resolve(root)?
            .as_dict()
            .ok_or_else(|| PdfError::InvalidStructure(format!("root {root} is not a dictionary")))
    }

    pub fn catalog_mut(&mut self) -> Result<&mut Dictionary> {
        let root = self.root_id()?;
        self.xref
            .get_object_mut(root)
            .ok_or(PdfError::InvalidReference(root))?
            .as_dict_mut()
            .ok_or_else(|| PdfError::InvalidStructure(format!("root {root} is not a dictionary")))
    }

    fn root_id(&self) -> Result<ObjectId> {
        self.trailer
            .root()
            .ok_or_else(|| PdfError::InvalidStructure("trailer has no /Root".to_string()))
    }

    fn pages_root(&self) -> Result<ObjectId> {
        self.catalog()?
            .get_reference("Pages")
            .ok_or_else(|| PdfError::InvalidStructure("catalog has no /Pages".to_string()))
    }

    /// Number of leaf pages in the page tree.
    ///
    /// The tree is walked with an explicit stack; nodes met twice are
    /// counted once.
    pub fn page_count(&self) -> Result<usize> {
        let mut count = 0;
        let mut visited = BTreeSet::new();
        let mut stack = vec![self.pages_root()?];

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                warn!(node = %id, "page tree node visited twice");
                continue;
            }
            let Some(node) = self.xref.get_object(id).and_then(Object::as_dict) else {
                warn!(node = %id, "page tree node missing");
                continue;
            };
            match node.get("Kids").and_then(Object::as_array) {
                Some(kids) => stack.extend(kids.iter().rev().filter_map(Object::as_reference)),
                None => count += 1,
            }
        }
        Ok(count)
    }

    /// Appends an empty US Letter page to the root of the page tree.
    pub fn add_page(&mut self) -> Result<ObjectId> {
        let pages_id = self.pages_root()?;

        let mut page = Dictionary::new();
        page.set("Type", Object::name("Page"));
        page.set("Parent", pages_id);
        let media_box: Vec<Object> = [0, 0, 612, 792].into_iter().map(Object::Integer).collect();
        page.set("MediaBox", media_box);
        let page_id = self.xref.add_dictionary(page)?;

        let pages = self
            .xref
            .get_object_mut(pages_id)
            .and_then(Object::as_dict_mut)
            .ok_or(PdfError::InvalidReference(pages_id))?;
        match pages.get_mut("Kids").and_then(Object::as_array_mut) {
            Some(kids) => kids.push(Object::Reference(page_id)),
            None => pages.set("Kids", vec![Object::Reference(page_id)]),
        }
        let count = pages.get_integer("Count").unwrap_or(0);
        pages.set("Count", count + 1);

        debug!(page = %page_id, "added page");
        Ok(page_id)
    }

    /// Every object reachable from the trailer, `depth` edges deep at most.
    pub fn transitive_closure(&mut self, depth: Option<usize>) -> Result<BTreeSet<ObjectId>> {
        self.xref
            .transitive_closure_of_dictionary(self.trailer.dictionary_mut(), depth)
    }

    /// Drops objects the trailer cannot reach. Returns how many were dropped.
    pub fn compact(&mut self) -> Result<usize> {
        self.xref.compact(self.trailer.dictionary_mut())
    }

    /// Renumbers every object densely from 1, returning the old → new map.
    pub fn renumber(&mut self) -> Result<BTreeMap<ObjectId, ObjectId>> {
        self.xref.renumber(self.trailer.dictionary_mut())
    }

    /// The `/ID` pair, generated first if the trailer has none.
    pub fn ensure_document_id(&mut self) -> (Vec<u8>, Vec<u8>) {
        self.trailer.ensure_document_id()
    }

    /// Saves the document with the default [`WriteOptions`].
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.save_with_options(path, &WriteOptions::default())
    }

    pub fn save_with_options(&mut self, path: impl AsRef<Path>, options: &WriteOptions) -> Result<()> {
        self.prepare_for_writing(options)?;
        let mut writer = PdfWriter::new(path)?;
        writer.write_document(self, options)?;
        self.record_positions(writer.positions());
        Ok(())
    }

    /// Writes the document to any [`Write`] implementation.
    pub fn write_to<W: Write>(&mut self, writer: W, options: &WriteOptions) -> Result<()> {
        self.prepare_for_writing(options)?;
        let mut writer = PdfWriter::new_with_writer(writer);
        writer.write_document(self, options)?;
        self.record_positions(writer.positions());
        Ok(())
    }

    /// Runs the graph passes that precede serialization. Without compaction
    /// the closure still runs so that dangling edges reach the dead object
    /// instead of the file.
    fn prepare_for_writing(&mut self, options: &WriteOptions) -> Result<()> {
        if options.compact {
            self.compact()?;
        } else {
            self.transitive_closure(None)?;
        }
        if options.renumber {
            self.renumber()?;
        }
        self.ensure_document_id();
        Ok(())
    }

    fn record_positions(&mut self, positions: &BTreeMap<ObjectId, u64>) {
        for (id, position) in positions {
            self.xref.set_position(*id, *position);
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xref::DEAD_OBJECT_COUNT_KEY;
    use pretty_assertions::assert_eq;

    fn saved(document: &mut Document, options: &WriteOptions) -> Vec<u8> {
        let mut buffer = Vec::new();
        document.write_to(&mut buffer, options).unwrap();
        buffer
    }

    #[test]
    fn test_new_document() {
        let document = Document::new();

        assert_eq!(document.version(), "1.7");
        assert_eq!(document.xref().len(), 3);
        assert_eq!(document.page_count().unwrap(), 0);
        assert!(document.catalog().unwrap().has_type("Catalog"));
        assert_eq!(document.trailer().size(), Some(4));
        assert!(!document.is_recovered());

        let info = document
            .trailer()
            .info()
            .and_then(|id| document.get_object(id))
            .and_then(Object::as_dict)
            .unwrap();
        assert!(info.contains_key("CreationDate"));
    }

    #[test]
    fn test_add_page_updates_page_tree() {
        let mut document = Document::new();
        let first = document.add_page().unwrap();
        document.add_page().unwrap();

        assert_eq!(document.page_count().unwrap(), 2);
        let page = document.get_object(first).and_then(Object::as_dict).unwrap();
        assert!(page.has_type("Page"));

        let pages_id = document.catalog().unwrap().get_reference("Pages").unwrap();
        assert_eq!(page.get_reference("Parent"), Some(pages_id));
        let pages = document.get_object(pages_id).and_then(Object::as_dict).unwrap();
        assert_eq!(pages.get_integer("Count"), Some(2));
    }

    #[test]
    fn test_add_object_rejects_reference_edges() {
        let mut document = Document::new();
        let id = document.add_object(42).unwrap();

        assert!(matches!(
            document.add_object(id),
            Err(PdfError::InvalidOperation(_))
        ));
        assert_eq!(document.try_add_object(id).unwrap(), (id, false));

        let (fresh, inserted) = document.try_add_object("text").unwrap();
        assert!(inserted);
        assert_ne!(fresh, id);
    }

    #[test]
    fn test_remove_object_needs_reference() {
        let mut document = Document::new();
        let id = document.add_object(7).unwrap();

        assert!(matches!(
            document.remove_object(&Object::Integer(7)),
            Err(PdfError::InvalidOperation(_))
        ));
        let removed = document.remove_object(&Object::Reference(id)).unwrap();
        assert_eq!(removed.map(|r| r.id()), Some(id));
        assert!(document.get_object(id).is_none());
    }

    #[test]
    fn test_resolve_and_dereference() {
        let mut document = Document::new();
        let id = document.add_object(Object::Real(2.5)).unwrap();

        let edge = Object::Reference(id);
        assert_eq!(document.resolve(&edge).unwrap(), &Object::Real(2.5));
        let direct = Object::Boolean(true);
        assert_eq!(document.resolve(&direct).unwrap(), &direct);

        let mut item = Object::Reference(id);
        document.dereference(&mut item).unwrap();
        assert_eq!(item, Object::Real(2.5));

        let mut dangling = Object::Reference(ObjectId::new(500, 0));
        assert!(matches!(
            document.dereference(&mut dangling),
            Err(PdfError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_write_compacts_unreachable_objects() {
        let mut document = Document::new();
        document.add_page().unwrap();
        let orphan = document.add_object("orphan").unwrap();

        let buffer = saved(&mut document, &WriteOptions::default());
        assert!(document.get_object(orphan).is_none());
        assert!(!String::from_utf8_lossy(&buffer).contains("(orphan)"));
        assert!(document.xref().iter().all(|r| r.position().is_some()));
    }

    #[test]
    fn test_write_without_compaction_redirects_dangling_edges() {
        let mut document = Document::new();
        document
            .catalog_mut()
            .unwrap()
            .set("Lost", ObjectId::new(999, 0));
        let orphan = document.add_object("orphan").unwrap();

        saved(&mut document, &WriteOptions::default().with_compact(false));

        assert!(document.get_object(orphan).is_some());
        let dead = document.xref().dead_object_id().unwrap();
        assert_eq!(document.catalog().unwrap().get_reference("Lost"), Some(dead));
        let dead_dict = document.get_object(dead).and_then(Object::as_dict).unwrap();
        assert_eq!(dead_dict.get_integer(DEAD_OBJECT_COUNT_KEY), Some(1));
    }

    #[test]
    fn test_round_trip_through_bytes() {
        let mut document = Document::new();
        for _ in 0..3 {
            document.add_page().unwrap();
        }
        let buffer = saved(&mut document, &WriteOptions::default().with_renumber(true));

        let loaded = Document::load_from_bytes(&buffer, ParseOptions::strict()).unwrap();
        assert!(!loaded.is_recovered());
        assert_eq!(loaded.version(), "1.7");
        assert_eq!(loaded.page_count().unwrap(), 3);
        assert_eq!(loaded.xref().len(), document.xref().len());
        assert_eq!(
            loaded.trailer().document_id(),
            document.trailer().document_id()
        );
    }

    #[test]
    fn test_damaged_file_is_rebuilt() {
        let mut document = Document::new();
        document.add_page().unwrap();
        let mut buffer = saved(&mut document, &WriteOptions::default());

        // Cut the file before its cross-reference section
        let xref_at = String::from_utf8_lossy(&buffer).rfind("xref\n0 ").unwrap();
        buffer.truncate(xref_at);

        assert!(Document::load_from_bytes(&buffer, ParseOptions::strict()).is_err());

        let recovered = Document::load_from_bytes(&buffer, ParseOptions::lenient()).unwrap();
        assert!(recovered.is_recovered());
        assert_eq!(recovered.page_count().unwrap(), 1);
        let report = recovered.recovery_report().unwrap();
        assert!(report.catalog_from_scan);
        assert_eq!(
            recovered.trailer().size(),
            Some(recovered.xref().max_object_number() + 1)
        );
    }

    #[test]
    fn test_forced_rebuild_of_intact_file() {
        let mut document = Document::new();
        document.add_page().unwrap();
        document.add_page().unwrap();
        let buffer = saved(&mut document, &WriteOptions::default());

        let rebuilt = Document::rebuild_from_bytes(&buffer, ParseOptions::default()).unwrap();
        assert!(rebuilt.is_recovered());
        assert!(!rebuilt.recovery_report().unwrap().catalog_from_scan);
        assert_eq!(rebuilt.page_count().unwrap(), 2);
        assert_eq!(rebuilt.xref().ids(), document.xref().ids());
        assert_eq!(rebuilt.trailer().root(), document.trailer().root());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.pdf");

        let mut document = Document::new();
        document.add_page().unwrap();
        document.save(&path).unwrap();

        let loaded = Document::load(&path).unwrap();
        assert_eq!(loaded.page_count().unwrap(), 1);
        assert!(loaded.trailer().document_id().is_some());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Document::load(dir.path().join("absent.pdf")),
            Err(PdfError::Io(_))
        ));
    }
}
