use crate::objects::ObjectId;
use crate::parser::ParseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Invalid PDF structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid object reference: {0}")]
    InvalidReference(ObjectId),

    #[error("Catalog not found, file corrupt")]
    CatalogNotFound,

    #[error("Compression error: {0}")]
    CompressionError(String),

    #[error("Encryption error: {0}")]
    EncryptionError(String),
}

pub type Result<T> = std::result::Result<T, PdfError>;

impl PdfError {
    pub(crate) fn invalid_operation(message: impl Into<String>) -> Self {
        PdfError::InvalidOperation(message.into())
    }
}
