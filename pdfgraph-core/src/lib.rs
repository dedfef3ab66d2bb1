//! # pdfgraph
//!
//! The indirect-object graph and cross-reference table of PDF files, with
//! reading, writing and reconstruction of damaged files.
//!
//! ## Features
//!
//! - **Object graph**: every indirect object is owned by the document's
//!   [`XRefTable`]; objects point at each other through `n g R` edges
//! - **Reachability**: transitive closure from any root, deep graphs walked
//!   without exhausting the stack, dangling edges redirected to a dead object
//! - **Garbage collection**: compaction to what the trailer reaches and
//!   dense renumbering
//! - **Reading**: classic xref sections, `/Prev` chains, indirect `/Length`
//! - **Recovery**: rebuilds the table and trailer of damaged files by
//!   scanning for object definitions
//! - **Writing**: canonical 20-byte xref entries, fresh `/ID`, optional
//!   encryption hook and Flate compression
//!
//! ## Quick Start
//!
//! ### Creating documents
//!
//! ```rust,no_run
//! use pdfgraph::{Document, Result};
//!
//! # fn main() -> Result<()> {
//! let mut doc = Document::new();
//! doc.add_page()?;
//! let note = doc.add_object("written by pdfgraph")?;
//! doc.catalog_mut()?.set("Note", note);
//! doc.save("output.pdf")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Inspecting and cleaning up existing files
//!
//! ```rust,no_run
//! use pdfgraph::{Document, ParseOptions, WriteOptions};
//!
//! # fn main() -> pdfgraph::Result<()> {
//! let mut doc = Document::load_with_options("input.pdf", ParseOptions::lenient())?;
//! if doc.is_recovered() {
//!     println!("cross-reference table was rebuilt");
//! }
//!
//! let reachable = doc.transitive_closure(None)?;
//! println!("{} of {} objects are in use", reachable.len(), doc.xref().len());
//!
//! doc.save_with_options("clean.pdf", &WriteOptions::default().with_renumber(true))?;
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod error;
pub mod objects;
pub mod parser;
pub mod recovery;
pub mod security;
pub mod trailer;
pub mod writer;
pub mod xref;

pub use document::Document;
pub use error::{PdfError, Result};
pub use objects::{Dictionary, Object, ObjectId, Stream, StringFormat};
pub use parser::{ParseError, ParseOptions};
pub use recovery::RebuildReport;
pub use security::SecurityHandler;
pub use trailer::Trailer;
pub use writer::{PdfWriter, WriteOptions};
pub use xref::{DocumentId, IndirectReference, XRefTable, MAX_OBJECT_NUMBER, MAX_RECURSION_DEPTH};

/// Current version of pdfgraph
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Header versions
pub mod pdf_version {
    /// Versions whose classic cross-reference sections are read and written
    pub const SUPPORTED_VERSIONS: &[&str] = &[
        "1.0", "1.1", "1.2", "1.3", "1.4", "1.5", "1.6", "1.7", "2.0",
    ];
}
