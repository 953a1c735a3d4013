//! Error types for the SOAP codec.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while compiling descriptors, encoding, decoding or reading
/// multipart transport bodies.
///
/// Every error aborts the current call; nothing is retried and no partially
/// decoded value is handed back.
#[derive(Error, Debug)]
pub enum SoapError {
    /// A required value is missing or null on a non-nilable property.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Structural XML mismatch (unexpected element, premature end, no
    /// matching choice variant, malformed primitive text).
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unknown `xsi:type` reference or unmapped primitive schema type.
    #[error("Type resolution error: {0}")]
    TypeResolution(String),

    /// Unresolved content-id or malformed multipart body.
    #[error("Attachment error: {0}")]
    Attachment(String),

    /// A type lacks usable serialization metadata.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failure reported by the XML reader or writer.
    #[error("XML error: {0}")]
    Xml(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for SoapError {
    fn from(err: quick_xml::Error) -> Self {
        match err {
            quick_xml::Error::Io(io) => SoapError::Io(std::io::Error::new(io.kind(), io.to_string())),
            other => SoapError::Xml(other.to_string()),
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for SoapError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        SoapError::Xml(err.to_string())
    }
}

impl SoapError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Parse(_) => ErrorKind::Parse,
            Self::TypeResolution(_) => ErrorKind::TypeResolution,
            Self::Attachment(_) => ErrorKind::Attachment,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Xml(_) => ErrorKind::Xml,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Error categories, usable as stable codes in logs and faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Required value missing
    Validation,
    /// Structural XML mismatch
    Parse,
    /// Unknown type reference
    TypeResolution,
    /// Attachment could not be resolved or read
    Attachment,
    /// Unusable type metadata or settings
    Configuration,
    /// Malformed XML
    Xml,
    /// Underlying stream failure
    Io,
}

impl ErrorKind {
    /// Get the string code for this error kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Parse => "PARSE_ERROR",
            Self::TypeResolution => "TYPE_RESOLUTION_ERROR",
            Self::Attachment => "ATTACHMENT_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::Xml => "XML_ERROR",
            Self::Io => "IO_ERROR",
        }
    }
}
