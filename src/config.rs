//! Configuration types for the SOAP codec.

use crate::error::SoapError;
use serde::{Deserialize, Serialize};

/// Main codec configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Config version
    pub version: String,

    /// Binary content encoding
    pub binary: BinaryConfig,

    /// Multipart transport reading
    pub multipart: MultipartConfig,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            binary: BinaryConfig::default(),
            multipart: MultipartConfig::default(),
        }
    }
}

impl CodecConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, SoapError> {
        let config: CodecConfig = serde_yaml::from_str(yaml)
            .map_err(|e| SoapError::Configuration(format!("invalid codec config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the codec cannot operate with.
    pub fn validate(&self) -> Result<(), SoapError> {
        let chunk = self.binary.encode_chunk_size;
        if chunk == 0 || chunk % 3 != 0 {
            return Err(SoapError::Configuration(format!(
                "binary.encode_chunk_size must be a positive multiple of 3, got {}",
                chunk
            )));
        }
        if self.multipart.line_buffer_size == 0 {
            return Err(SoapError::Configuration(
                "multipart.line_buffer_size must be positive".to_string(),
            ));
        }
        if self.multipart.max_parts == 0 {
            return Err(SoapError::Configuration(
                "multipart.max_parts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Binary content settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinaryConfig {
    /// Raw bytes encoded per base64 text chunk (multiple of 3)
    pub encode_chunk_size: usize,

    /// How attachments are referenced from the XML in multipart mode
    pub reference: AttachmentReference,
}

impl Default for BinaryConfig {
    fn default() -> Self {
        Self {
            encode_chunk_size: 49_152, // 48KB, 64KB of base64 text
            reference: AttachmentReference::XopInclude,
        }
    }
}

/// Attachment reference style used in multipart mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentReference {
    /// MTOM: child `xop:Include` element carrying `href="cid:<id>"`
    #[default]
    XopInclude,
    /// SwA: `href="cid:<id>"` attribute on the property element
    Href,
}

/// Multipart reader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipartConfig {
    /// Fixed size of the line buffer (bytes)
    pub line_buffer_size: usize,

    /// Maximum number of parts in one body
    pub max_parts: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            line_buffer_size: 8192,
            max_parts: 1024,
        }
    }
}
