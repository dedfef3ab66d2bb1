//! The PDF object model.
//!
//! Direct objects nest by value. Indirect objects live in the
//! [`XRefTable`](crate::xref::XRefTable) and are pointed at through
//! [`Object::Reference`] edges.

mod dictionary;
mod primitive;
mod stream;

pub use dictionary::Dictionary;
pub use primitive::{Object, ObjectId, StringFormat};
pub use stream::Stream;
