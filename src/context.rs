//! Per-message serializer/deserializer state.

use crate::binary::BinaryContent;
use crate::config::{AttachmentReference, BinaryConfig};
use crate::error::SoapError;
use std::collections::HashMap;
use tracing::debug;

/// Attachment state of one message exchange.
///
/// Holds the content-id → [`BinaryContent`] map and the multipart-mode flag.
/// A context belongs to exactly one in-flight exchange; it carries no
/// synchronization and must not be shared between exchanges.
#[derive(Debug)]
pub struct SerializerContext {
    attachments: Vec<BinaryContent>,
    index: HashMap<String, usize>,
    multipart: bool,
    reference: AttachmentReference,
    encode_chunk_size: usize,
}

impl Default for SerializerContext {
    fn default() -> Self {
        Self::from_config(&BinaryConfig::default())
    }
}

impl SerializerContext {
    /// Inline (non-multipart) context with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Multipart context using the given reference style.
    pub fn multipart(reference: AttachmentReference) -> Self {
        let mut ctx = Self::default();
        ctx.multipart = true;
        ctx.reference = reference;
        ctx
    }

    /// Inline context using configured chunking and reference style.
    pub fn from_config(config: &BinaryConfig) -> Self {
        // keep chunks aligned to whole base64 quanta
        let chunk = (config.encode_chunk_size / 3 * 3).max(3);
        Self {
            attachments: Vec::new(),
            index: HashMap::new(),
            multipart: false,
            reference: config.reference,
            encode_chunk_size: chunk,
        }
    }

    pub fn is_multipart(&self) -> bool {
        self.multipart
    }

    pub fn set_multipart(&mut self, multipart: bool) {
        self.multipart = multipart;
    }

    pub fn reference(&self) -> AttachmentReference {
        self.reference
    }

    pub fn encode_chunk_size(&self) -> usize {
        self.encode_chunk_size
    }

    /// Register an attachment under its content-id.
    ///
    /// Registering the same content twice is a no-op; a different content
    /// under an already used id is rejected.
    pub fn add_attachment(&mut self, content: BinaryContent) -> Result<(), SoapError> {
        if let Some(&pos) = self.index.get(content.content_id()) {
            if self.attachments[pos] == content {
                return Ok(());
            }
            return Err(SoapError::Attachment(format!(
                "duplicate content-id `{}`",
                content.content_id()
            )));
        }
        debug!(content_id = %content.content_id(), "Registered attachment");
        self.index
            .insert(content.content_id().to_string(), self.attachments.len());
        self.attachments.push(content);
        Ok(())
    }

    pub fn attachment(&self, content_id: &str) -> Option<&BinaryContent> {
        self.index.get(content_id).map(|&pos| &self.attachments[pos])
    }

    /// Look up a referenced content part.
    pub fn resolve(&self, content_id: &str) -> Result<&BinaryContent, SoapError> {
        self.attachment(content_id).ok_or_else(|| {
            SoapError::Attachment(format!("unknown content part `cid:{}`", content_id))
        })
    }

    /// Registered attachments in registration order.
    pub fn attachments(&self) -> &[BinaryContent] {
        &self.attachments
    }

    /// Drain the registered attachments, e.g. for the multipart writer.
    pub fn take_attachments(&mut self) -> Vec<BinaryContent> {
        self.index.clear();
        std::mem::take(&mut self.attachments)
    }

    pub fn len(&self) -> usize {
        self.attachments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty()
    }
}
