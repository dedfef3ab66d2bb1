//! Indirect references: the identity nodes of the object graph.

use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId};
use std::cmp::Ordering;
use std::fmt;

/// Identity of a [`Document`](crate::Document) instance.
///
/// Every reference registered in a table remembers which document owns it,
/// so a reference can never leak from one document into another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(u64);

impl DocumentId {
    pub fn new() -> Self {
        DocumentId(rand::random())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A slot in the cross-reference table.
///
/// The reference exclusively owns the object it is bound to. Other objects
/// point at it through `Object::Reference(id)` edges, which are plain
/// handles resolved through the table, so there is no ownership cycle
/// between an object and its reference.
///
/// References are either created bound ([`IndirectReference::from_object`])
/// or as placeholders carrying only an identifier and a file offset
/// ([`IndirectReference::for_object_id`]) that the reader binds once the
/// object body has been parsed.
#[derive(Debug, Clone)]
pub struct IndirectReference {
    id: ObjectId,
    document: Option<DocumentId>,
    value: Option<Object>,
    position: Option<u64>,
}

impl IndirectReference {
    /// Binds a fresh reference to an already constructed object.
    ///
    /// Fails with `InvalidOperation` if `object` is itself a reference edge:
    /// that object is already indirect and has its own slot.
    pub fn from_object(object: Object, id: ObjectId, position: Option<u64>) -> Result<Self> {
        if let Object::Reference(bound) = object {
            return Err(PdfError::invalid_operation(format!(
                "object {bound} is already indirect and cannot be bound to {id}"
            )));
        }
        Ok(Self {
            id,
            document: None,
            value: Some(object),
            position,
        })
    }

    /// Bound reference for a dictionary created by the document itself.
    pub(crate) fn owned_dictionary(dict: Dictionary, id: ObjectId, document: DocumentId) -> Self {
        Self {
            id,
            document: Some(document),
            value: Some(Object::Dictionary(dict)),
            position: None,
        }
    }

    /// Placeholder for an object that is known by identifier and offset only.
    pub fn for_object_id(id: ObjectId, position: u64) -> Self {
        Self {
            id,
            document: None,
            value: None,
            position: Some(position),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn object_number(&self) -> u32 {
        self.id.number()
    }

    pub fn generation_number(&self) -> u16 {
        self.id.generation()
    }

    pub fn document(&self) -> Option<DocumentId> {
        self.document
    }

    pub fn position(&self) -> Option<u64> {
        self.position
    }

    pub fn set_position(&mut self, position: u64) {
        self.position = Some(position);
    }

    pub fn is_bound(&self) -> bool {
        self.value.is_some()
    }

    pub fn value(&self) -> Option<&Object> {
        self.value.as_ref()
    }

    pub fn value_mut(&mut self) -> Option<&mut Object> {
        self.value.as_mut()
    }

    /// Binds a placeholder to its parsed object. Binding happens once.
    pub fn bind(&mut self, object: Object) -> Result<()> {
        if self.value.is_some() {
            return Err(PdfError::invalid_operation(format!(
                "reference {} is already bound",
                self.id
            )));
        }
        if object.is_reference() {
            return Err(PdfError::invalid_operation(format!(
                "reference {} cannot be bound to another reference edge",
                self.id
            )));
        }
        self.value = Some(object);
        Ok(())
    }

    /// Replaces the bound object, returning the previous one.
    pub fn replace_value(&mut self, object: Object) -> Result<Option<Object>> {
        if object.is_reference() {
            return Err(PdfError::invalid_operation(format!(
                "reference {} cannot be bound to another reference edge",
                self.id
            )));
        }
        Ok(self.value.replace(object))
    }

    pub fn into_value(self) -> Option<Object> {
        self.value
    }

    pub(crate) fn set_id(&mut self, id: ObjectId) {
        self.id = id;
    }

    /// Records the owning document. The owner is set once.
    pub(crate) fn attach(&mut self, document: DocumentId) -> Result<()> {
        match self.document {
            Some(owner) if owner != document => Err(PdfError::invalid_operation(format!(
                "reference {} belongs to document {owner}, not {document}",
                self.id
            ))),
            _ => {
                self.document = Some(document);
                Ok(())
            }
        }
    }
}

// References are identity nodes: two references are the same node when
// they carry the same identifier.
impl PartialEq for IndirectReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for IndirectReference {}

impl PartialOrd for IndirectReference {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndirectReference {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Dictionary;

    #[test]
    fn test_from_object_binds_value() {
        let reference =
            IndirectReference::from_object(Object::Integer(7), ObjectId::new(3, 0), Some(120))
                .unwrap();
        assert!(reference.is_bound());
        assert_eq!(reference.value(), Some(&Object::Integer(7)));
        assert_eq!(reference.object_number(), 3);
        assert_eq!(reference.generation_number(), 0);
        assert_eq!(reference.position(), Some(120));
        assert_eq!(reference.document(), None);
    }

    #[test]
    fn test_from_object_rejects_reference_edge() {
        let result = IndirectReference::from_object(
            Object::Reference(ObjectId::new(1, 0)),
            ObjectId::new(2, 0),
            None,
        );
        assert!(matches!(result, Err(PdfError::InvalidOperation(_))));
    }

    #[test]
    fn test_placeholder_binds_once() {
        let mut reference = IndirectReference::for_object_id(ObjectId::new(5, 1), 900);
        assert!(!reference.is_bound());
        assert_eq!(reference.value(), None);

        reference.bind(Object::Dictionary(Dictionary::new())).unwrap();
        assert!(reference.is_bound());

        let second = reference.bind(Object::Null);
        assert!(matches!(second, Err(PdfError::InvalidOperation(_))));
    }

    #[test]
    fn test_attach_is_set_once() {
        let first = DocumentId::new();
        let second = DocumentId::new();
        let mut reference = IndirectReference::for_object_id(ObjectId::new(1, 0), 0);

        reference.attach(first).unwrap();
        reference.attach(first).unwrap();
        assert!(reference.attach(second).is_err());
        assert_eq!(reference.document(), Some(first));
    }

    #[test]
    fn test_references_order_by_identifier() {
        let mut references = vec![
            IndirectReference::for_object_id(ObjectId::new(9, 0), 0),
            IndirectReference::for_object_id(ObjectId::new(2, 1), 0),
            IndirectReference::for_object_id(ObjectId::new(2, 0), 0),
        ];
        references.sort();
        let ids: Vec<_> = references.iter().map(|r| r.id()).collect();
        assert_eq!(
            ids,
            vec![
                ObjectId::new(2, 0),
                ObjectId::new(2, 1),
                ObjectId::new(9, 0)
            ]
        );
    }
}
