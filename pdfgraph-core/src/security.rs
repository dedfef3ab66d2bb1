//! Hook for encrypting objects on their way to disk.
//!
//! The engine does not implement any cipher itself. A [`SecurityHandler`]
//! installed on a [`Document`](crate::Document) is asked to encrypt every
//! indirect object the writer emits, except the objects that must stay in
//! clear text: the trailer and the encryption dictionary it points at.

use crate::error::Result;
use crate::objects::{Object, ObjectId};
use std::fmt::Debug;

pub trait SecurityHandler: Debug {
    /// Whether objects should be passed to [`SecurityHandler::encrypt_object`]
    fn is_encryption_active(&self) -> bool;

    /// Encrypts the strings and stream data of one indirect object in place.
    /// `id` is the identifier the object is written under.
    fn encrypt_object(&self, id: ObjectId, object: &mut Object) -> Result<()>;
}

/// Visits every string and stream payload of `object` in place.
///
/// Helper for handler implementations; nested direct content is walked
/// with an explicit stack and reference edges are not followed.
pub fn for_each_payload_mut(object: &mut Object, mut f: impl FnMut(&mut Vec<u8>)) {
    let mut stack: Vec<&mut Object> = vec![object];
    while let Some(current) = stack.pop() {
        match current {
            Object::String(bytes, _) => f(bytes),
            Object::Array(items) => stack.extend(items.iter_mut()),
            Object::Dictionary(dict) => stack.extend(dict.values_mut()),
            Object::Stream(stream) => {
                let mut data = stream.data().to_vec();
                f(&mut data);
                stream.set_data(data);
                stack.extend(stream.dictionary_mut().values_mut());
            }
            _ => {}
        }
    }
}
