//! Binary content: attachment values and their XML encoding.
//!
//! Inline content is written as base64 text in bounded chunks. In multipart
//! mode the content is registered in the [`SerializerContext`] and referenced
//! by content-id instead.

use crate::config::AttachmentReference;
use crate::context::SerializerContext;
use crate::error::SoapError;
use crate::value::Value;
use crate::xml::{Node, XmlCursor, XmlSink, XOP_NS};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Size of the random nonce behind generated content-ids.
pub const CONTENT_ID_NONCE_LEN: usize = 42;

#[derive(Clone, PartialEq)]
enum Storage {
    File(PathBuf),
    Memory(Arc<[u8]>),
}

/// Immutable binary payload identified by a content-id.
///
/// Backed either by a file or by an in-memory buffer. Cloning is cheap and
/// clones share the same storage.
#[derive(Clone, PartialEq)]
pub struct BinaryContent {
    content_id: String,
    storage: Storage,
}

impl BinaryContent {
    /// In-memory content with a generated content-id.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            content_id: generate_content_id(),
            storage: Storage::Memory(Arc::from(data.into())),
        }
    }

    /// File-backed content with a generated content-id. The file is opened
    /// lazily.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        Self {
            content_id: generate_content_id(),
            storage: Storage::File(path.as_ref().to_path_buf()),
        }
    }

    /// Replace the content-id. An empty id keeps the current one.
    pub fn with_content_id(mut self, content_id: impl Into<String>) -> Self {
        let content_id = content_id.into();
        if !content_id.is_empty() {
            self.content_id = content_id;
        }
        self
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// Path of the backing file, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::File(p) => Some(p),
            Storage::Memory(_) => None,
        }
    }

    /// Open the content as a byte stream.
    pub fn open(&self) -> io::Result<Box<dyn Read + Send + '_>> {
        match &self.storage {
            Storage::File(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            Storage::Memory(data) => Ok(Box::new(&data[..])),
        }
    }

    /// Read the whole content into memory.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        match &self.storage {
            Storage::File(path) => std::fs::read(path),
            Storage::Memory(data) => Ok(data.to_vec()),
        }
    }
}

impl fmt::Debug for BinaryContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("BinaryContent");
        s.field("content_id", &self.content_id);
        match &self.storage {
            Storage::File(p) => s.field("file", p),
            Storage::Memory(d) => s.field("len", &d.len()),
        };
        s.finish()
    }
}

/// Base64 of a fresh random nonce.
pub fn generate_content_id() -> String {
    let mut nonce = [0u8; CONTENT_ID_NONCE_LEN];
    fastrand::fill(&mut nonce);
    STANDARD.encode(nonce)
}

/// Write binary content as inline base64 or as an attachment reference.
pub(crate) fn write_binary(
    value: &Value,
    sink: &mut XmlSink<'_>,
    ctx: &mut SerializerContext,
) -> Result<(), SoapError> {
    let content = value.as_binary().ok_or_else(|| {
        SoapError::Validation(format!("expected binary content, found {}", value.kind_name()))
    })?;

    if ctx.is_multipart() {
        let href = format!("cid:{}", percent_encode(content.content_id()));
        ctx.add_attachment(content.clone())?;
        return match ctx.reference() {
            AttachmentReference::Href => sink.attribute("href", &href),
            AttachmentReference::XopInclude => {
                sink.start_element("xop:Include")?;
                sink.declare_namespace("xop", XOP_NS)?;
                sink.attribute("href", &href)?;
                sink.end_element()
            }
        };
    }

    let chunk_size = ctx.encode_chunk_size();
    let mut reader = content.open()?;
    let mut buf = vec![0u8; chunk_size];
    let mut encoded = String::with_capacity(chunk_size / 3 * 4 + 4);
    loop {
        let filled = read_full(&mut reader, &mut buf)?;
        if filled == 0 {
            break;
        }
        encoded.clear();
        STANDARD.encode_string(&buf[..filled], &mut encoded);
        sink.text(&encoded)?;
        if filled < buf.len() {
            break;
        }
    }
    // empty content still closes as `<e></e>`
    sink.text("")
}

/// Decode binary content at the cursor: an `href` attribute, an `xop:Include`
/// child, or inline base64 text.
pub(crate) fn read_binary(
    cursor: &mut XmlCursor<'_>,
    ctx: &mut SerializerContext,
) -> Result<Value, SoapError> {
    if let Some(href) = cursor.current_element().and_then(|e| e.attribute(None, "href")) {
        let href = href.to_string();
        return resolve_reference(&href, ctx);
    }

    // leading whitespace may precede an `xop:Include`; anything else is text
    loop {
        match cursor.peek()? {
            Node::Text(t) if t.trim().is_empty() => {}
            Node::Start(child) => {
                let child = child.clone();
                if child.local_name != "Include" || child.namespace.as_deref() != Some(XOP_NS) {
                    return Err(SoapError::Parse(format!(
                        "unexpected element `<{}>` in binary content",
                        child.local_name
                    )));
                }
                let href = child.attribute(None, "href").map(str::to_string).ok_or_else(|| {
                    SoapError::Attachment("xop:Include without href".to_string())
                })?;
                cursor.skip_element()?;
                return resolve_reference(&href, ctx);
            }
            Node::Text(_) | Node::End | Node::Eof => break,
        }
        cursor.next_node()?;
    }

    let mut decoder = Base64Decoder::default();
    cursor.for_each_text(|chunk| decoder.push(chunk))?;
    let bytes = decoder.finish()?;
    Ok(Value::Binary(BinaryContent::from_bytes(bytes)))
}

fn resolve_reference(href: &str, ctx: &SerializerContext) -> Result<Value, SoapError> {
    let id = href.trim();
    let id = id.strip_prefix("cid:").unwrap_or(id);
    let id = percent_decode(id);
    debug!(content_id = %id, "Resolving attachment reference");
    ctx.resolve(&id).cloned().map(Value::Binary)
}

/// Escape a content-id for use in a `cid:` URL.
fn percent_encode(id: &str) -> String {
    const KEEP: &[u8] = b"-._~!$&'()*+,;=:@/";
    let mut out = String::with_capacity(id.len());
    for b in id.bytes() {
        if b.is_ascii_alphanumeric() || KEEP.contains(&b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(b) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub(crate) fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Incremental base64 decoder tolerant of whitespace and arbitrary chunk
/// boundaries.
#[derive(Default)]
pub(crate) struct Base64Decoder {
    pending: Vec<u8>,
    out: Vec<u8>,
}

impl Base64Decoder {
    pub(crate) fn push(&mut self, chunk: &str) -> Result<(), SoapError> {
        for b in chunk.bytes() {
            if b.is_ascii_whitespace() {
                continue;
            }
            if !b.is_ascii() {
                return Err(SoapError::Parse(
                    "invalid base64 content: non-ASCII character".to_string(),
                ));
            }
            self.pending.push(b);
        }
        let ready = self.pending.len() / 4 * 4;
        if ready > 0 && !self.pending[..ready].contains(&b'=') {
            let rest = self.pending.split_off(ready);
            STANDARD
                .decode_vec(&self.pending, &mut self.out)
                .map_err(|e| SoapError::Parse(format!("invalid base64 content: {}", e)))?;
            self.pending = rest;
        }
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<Vec<u8>, SoapError> {
        if !self.pending.is_empty() {
            STANDARD
                .decode_vec(&self.pending, &mut self.out)
                .map_err(|e| SoapError::Parse(format!("invalid base64 content: {}", e)))?;
        }
        Ok(self.out)
    }
}
