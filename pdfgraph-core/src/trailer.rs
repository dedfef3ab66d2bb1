//! The document trailer.
//!
//! A [`Trailer`] wraps the trailer dictionary (`/Size`, `/Root`, `/Info`,
//! `/Encrypt`, `/ID`) and, for incrementally updated files, the chain of
//! older trailers reached through `/Prev`.

use crate::objects::{Dictionary, Object, ObjectId, StringFormat};
use chrono::Utc;

#[derive(Debug, Clone, Default)]
pub struct Trailer {
    dict: Dictionary,
    previous: Option<Box<Trailer>>,
    xref_offset: Option<u64>,
}

impl Trailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trailer read from a file; `xref_offset` is where its section starts
    pub fn from_dict(dict: Dictionary, xref_offset: Option<u64>) -> Self {
        Self {
            dict,
            previous: None,
            xref_offset,
        }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dict
    }

    pub fn dictionary_mut(&mut self) -> &mut Dictionary {
        &mut self.dict
    }

    pub fn xref_offset(&self) -> Option<u64> {
        self.xref_offset
    }

    pub fn size(&self) -> Option<u32> {
        self.dict
            .get_integer("Size")
            .and_then(|size| u32::try_from(size).ok())
    }

    pub fn set_size(&mut self, size: u32) {
        self.dict.set("Size", size);
    }

    pub fn root(&self) -> Option<ObjectId> {
        self.dict.get_reference("Root")
    }

    pub fn set_root(&mut self, root: ObjectId) {
        self.dict.set("Root", root);
    }

    pub fn info(&self) -> Option<ObjectId> {
        self.dict.get_reference("Info")
    }

    pub fn set_info(&mut self, info: ObjectId) {
        self.dict.set("Info", info);
    }

    pub fn encrypt(&self) -> Option<ObjectId> {
        self.dict.get_reference("Encrypt")
    }

    pub fn set_encrypt(&mut self, encrypt: ObjectId) {
        self.dict.set("Encrypt", encrypt);
    }

    pub fn is_encrypted(&self) -> bool {
        self.dict.contains_key("Encrypt")
    }

    /// Byte offset of the previous cross-reference section, from `/Prev`
    pub fn prev_offset(&self) -> Option<u64> {
        self.dict
            .get_integer("Prev")
            .and_then(|offset| u64::try_from(offset).ok())
    }

    /// The two elements of `/ID`, when present and well formed
    pub fn document_id(&self) -> Option<(&[u8], &[u8])> {
        match self.dict.get("ID").and_then(Object::as_array)?.as_slice() {
            [first, second] => Some((first.as_string_bytes()?, second.as_string_bytes()?)),
            _ => None,
        }
    }

    pub fn set_document_id(&mut self, permanent: Vec<u8>, changing: Vec<u8>) {
        self.dict.set(
            "ID",
            vec![
                Object::String(permanent, StringFormat::Hexadecimal),
                Object::String(changing, StringFormat::Hexadecimal),
            ],
        );
    }

    /// Returns `/ID`, generating it first if it is missing.
    ///
    /// A fresh identifier is the MD5 digest of the current time, the
    /// trailer size and 16 random bytes; both elements start out equal.
    pub fn ensure_document_id(&mut self) -> (Vec<u8>, Vec<u8>) {
        if let Some((first, second)) = self.document_id() {
            return (first.to_vec(), second.to_vec());
        }

        let mut seed = Utc::now().to_rfc3339().into_bytes();
        seed.extend_from_slice(&self.size().unwrap_or(0).to_be_bytes());
        seed.extend_from_slice(&rand::random::<[u8; 16]>());
        let digest = md5::compute(&seed).to_vec();

        self.set_document_id(digest.clone(), digest.clone());
        (digest.clone(), digest)
    }

    pub fn previous(&self) -> Option<&Trailer> {
        self.previous.as_deref()
    }

    pub fn set_previous(&mut self, previous: Trailer) {
        self.previous = Some(Box::new(previous));
    }

    /// This trailer followed by every older one, newest first
    pub fn chain(&self) -> impl Iterator<Item = &Trailer> {
        std::iter::successors(Some(self), |trailer| trailer.previous())
    }

    /// Copy of the dictionary as it is written out: `/Size` set, `/Prev`
    /// and `/XRefStm` removed. Only a classic table is emitted, so neither
    /// key would point anywhere valid.
    pub fn dictionary_for_writing(&self, size: u32) -> Dictionary {
        let mut dict = self.dict.clone();
        dict.remove("Prev");
        dict.remove("XRefStm");
        dict.set("Size", size);
        dict
    }
}
