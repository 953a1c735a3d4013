//! Streaming `multipart/related` transport reader and writer.
//!
//! The reader splits the raw body into logical lines through a fixed-size
//! buffer, so memory per read stays bounded however long a line is. The
//! first part is the primary (SOAP envelope) body; every later part becomes a
//! [`BinaryContent`] keyed by its content-id.

use crate::binary::{read_full, Base64Decoder, BinaryContent};
use crate::config::MultipartConfig;
use crate::context::SerializerContext;
use crate::error::SoapError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::HashSet;
use std::fmt;
use std::io::{self, BufRead, BufReader, Read, Write};
use tracing::{debug, trace};

/// Raw bytes per base64 line written by [`MultipartWriter`] (76 characters).
const BASE64_LINE_BYTES: usize = 57;

/// Read a multipart body with the default [`MultipartConfig`].
pub fn read_multipart<R: Read>(
    input: R,
    content_type: &str,
) -> Result<MultipartEnvelope<R>, SoapError> {
    MultipartReader::default().read(input, content_type)
}

/// Primary body of a response.
pub enum PrimaryPart<R> {
    /// Not multipart: the untouched transport stream
    Stream(R),
    /// First part of a multipart body
    Buffered(io::Cursor<Vec<u8>>),
}

impl<R: Read> Read for PrimaryPart<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            PrimaryPart::Stream(r) => r.read(buf),
            PrimaryPart::Buffered(c) => c.read(buf),
        }
    }
}

/// Result of reading one transport body.
pub struct MultipartEnvelope<R> {
    primary: PrimaryPart<R>,
    primary_content_type: Option<String>,
    attachments: Vec<BinaryContent>,
    multipart: bool,
}

impl<R> fmt::Debug for MultipartEnvelope<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartEnvelope")
            .field("multipart", &self.multipart)
            .field("primary_content_type", &self.primary_content_type)
            .field("attachments", &self.attachments)
            .finish_non_exhaustive()
    }
}

impl<R: Read> MultipartEnvelope<R> {
    /// Whether the body was `multipart/related`.
    pub fn is_multipart(&self) -> bool {
        self.multipart
    }

    /// Content type declared in the primary part's headers.
    pub fn primary_content_type(&self) -> Option<&str> {
        self.primary_content_type.as_deref()
    }

    /// Attachments in body order.
    pub fn attachments(&self) -> &[BinaryContent] {
        &self.attachments
    }

    pub fn into_parts(self) -> (PrimaryPart<R>, Vec<BinaryContent>) {
        (self.primary, self.attachments)
    }

    /// Register the attachments in `ctx`, switch it to multipart mode when
    /// the body was multipart, and hand back the primary body.
    pub fn populate(self, ctx: &mut SerializerContext) -> Result<PrimaryPart<R>, SoapError> {
        for attachment in self.attachments {
            ctx.add_attachment(attachment)?;
        }
        if self.multipart {
            ctx.set_multipart(true);
        }
        Ok(self.primary)
    }
}

/// Reader for `multipart/related` transport bodies.
#[derive(Debug, Clone, Default)]
pub struct MultipartReader {
    config: MultipartConfig,
}

impl MultipartReader {
    pub fn new(config: MultipartConfig) -> Self {
        Self { config }
    }

    /// Split `input` according to its declared `content_type`.
    ///
    /// Anything but `multipart/related` with a `boundary` parameter is
    /// returned whole as the primary part with no attachments.
    pub fn read<R: Read>(
        &self,
        input: R,
        content_type: &str,
    ) -> Result<MultipartEnvelope<R>, SoapError> {
        let Some(boundary) = related_boundary(content_type) else {
            debug!(content_type = %content_type, "Body is not multipart/related");
            return Ok(MultipartEnvelope {
                primary: PrimaryPart::Stream(input),
                primary_content_type: None,
                attachments: Vec::new(),
                multipart: false,
            });
        };

        trace!(boundary = %boundary, "Reading multipart/related body");
        let capacity = self.config.line_buffer_size.max(boundary.len() + 8);
        let mut lines = LineReader::new(input, capacity);
        let boundary = boundary.into_bytes();

        skip_preamble(&mut lines, &boundary)?;

        let mut parts: Vec<Part> = Vec::new();
        loop {
            if parts.len() >= self.config.max_parts {
                return Err(SoapError::Attachment(format!(
                    "multipart body exceeds {} parts",
                    self.config.max_parts
                )));
            }
            let headers = read_headers(&mut lines)?;
            let encoding = Encoding::from_headers(&headers)?;
            let (body, next) = read_body(&mut lines, &boundary, encoding)?;
            trace!(
                part = parts.len(),
                content_id = ?headers.content_id(),
                len = body.len(),
                "Read multipart part"
            );
            parts.push(Part { headers, body });
            if next == Delimiter::Terminal {
                break;
            }
        }

        let mut parts = parts.into_iter();
        let primary = parts
            .next()
            .ok_or_else(|| SoapError::Attachment("empty multipart content".to_string()))?;

        let mut seen = HashSet::new();
        let mut attachments = Vec::new();
        for part in parts {
            let content_id = part.headers.content_id().ok_or_else(|| {
                SoapError::Attachment("attachment part without a Content-ID header".to_string())
            })?;
            if !seen.insert(content_id.clone()) {
                return Err(SoapError::Attachment(format!(
                    "duplicate content-id `{}` in multipart body",
                    content_id
                )));
            }
            attachments.push(BinaryContent::from_bytes(part.body).with_content_id(content_id));
        }

        debug!(
            boundary = %String::from_utf8_lossy(&boundary),
            attachments = attachments.len(),
            "Read multipart body"
        );
        Ok(MultipartEnvelope {
            primary_content_type: primary.headers.get("content-type").map(str::to_string),
            primary: PrimaryPart::Buffered(io::Cursor::new(primary.body)),
            attachments,
            multipart: true,
        })
    }
}

struct Part {
    headers: PartHeaders,
    body: Vec<u8>,
}

/// Part headers with lowercased names and trimmed values.
#[derive(Debug, Default)]
struct PartHeaders {
    fields: Vec<(String, String)>,
}

impl PartHeaders {
    fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn content_id(&self) -> Option<String> {
        let id = self.get("content-id")?.trim();
        let id = id.strip_prefix('<').unwrap_or(id);
        let id = id.strip_suffix('>').unwrap_or(id);
        Some(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Encoding {
    Passthrough,
    Base64,
}

impl Encoding {
    fn from_headers(headers: &PartHeaders) -> Result<Self, SoapError> {
        let Some(value) = headers.get("content-transfer-encoding") else {
            return Ok(Self::Passthrough);
        };
        match value.to_ascii_lowercase().as_str() {
            "base64" => Ok(Self::Base64),
            // quoted-printable is not decoded
            "7bit" | "8bit" | "binary" | "quoted-printable" => Ok(Self::Passthrough),
            other => Err(SoapError::Attachment(format!(
                "unsupported content-transfer-encoding `{}`",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LineEnd {
    Crlf,
    Eof,
    /// Buffer filled before the line ended
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Delimiter {
    Next,
    Terminal,
}

/// Line splitter over a single-byte-lookahead reader.
struct LineReader<R> {
    input: BufReader<R>,
    line: Vec<u8>,
    capacity: usize,
}

impl<R: Read> LineReader<R> {
    fn new(input: R, capacity: usize) -> Self {
        Self {
            input: BufReader::new(input),
            line: Vec::with_capacity(capacity),
            capacity,
        }
    }

    fn peek_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.input.fill_buf()?.first().copied())
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = self.peek_byte()?;
        if byte.is_some() {
            self.input.consume(1);
        }
        Ok(byte)
    }

    /// Fill `line` with the next chunk, without its CRLF.
    fn read_chunk(&mut self) -> io::Result<LineEnd> {
        self.line.clear();
        loop {
            if self.line.len() == self.capacity {
                return Ok(LineEnd::Limit);
            }
            let Some(byte) = self.next_byte()? else {
                return Ok(LineEnd::Eof);
            };
            if byte == b'\r' && self.peek_byte()? == Some(b'\n') {
                self.input.consume(1);
                return Ok(LineEnd::Crlf);
            }
            self.line.push(byte);
        }
    }

    fn delimiter(&self, boundary: &[u8]) -> Option<Delimiter> {
        let mut line = self.line.as_slice();
        while let [rest @ .., b' ' | b'\t'] = line {
            line = rest;
        }
        let rest = line.strip_prefix(b"--")?.strip_prefix(boundary)?;
        match rest {
            b"" => Some(Delimiter::Next),
            b"--" => Some(Delimiter::Terminal),
            _ => None,
        }
    }
}

fn skip_preamble<R: Read>(lines: &mut LineReader<R>, boundary: &[u8]) -> Result<(), SoapError> {
    let mut at_line_start = true;
    loop {
        let end = lines.read_chunk()?;
        if at_line_start && end != LineEnd::Limit {
            match lines.delimiter(boundary) {
                Some(Delimiter::Next) => return Ok(()),
                Some(Delimiter::Terminal) => break,
                None => {}
            }
        }
        if end == LineEnd::Eof {
            break;
        }
        at_line_start = end == LineEnd::Crlf;
    }
    Err(SoapError::Attachment("empty multipart content".to_string()))
}

fn read_headers<R: Read>(lines: &mut LineReader<R>) -> Result<PartHeaders, SoapError> {
    let mut headers = PartHeaders::default();
    let mut logical = Vec::new();
    loop {
        let end = lines.read_chunk()?;
        logical.extend_from_slice(&lines.line);
        match end {
            LineEnd::Limit => continue,
            LineEnd::Eof => {
                return Err(SoapError::Attachment(
                    "multipart body ended inside part headers".to_string(),
                ))
            }
            LineEnd::Crlf => {}
        }
        if logical.is_empty() {
            return Ok(headers);
        }

        let line = String::from_utf8_lossy(&logical).into_owned();
        logical.clear();
        if line.starts_with([' ', '\t']) {
            // folded continuation of the previous header
            if let Some((_, value)) = headers.fields.last_mut() {
                value.push(' ');
                value.push_str(line.trim());
                continue;
            }
        }
        let (name, value) = line.split_once(':').ok_or_else(|| {
            SoapError::Attachment(format!("malformed part header `{}`", line.trim()))
        })?;
        headers
            .fields
            .push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
    }
}

/// Collects body bytes; line terminators are only kept where the encoding
/// carries them.
enum BodySink {
    Passthrough(Vec<u8>),
    Base64(Base64Decoder),
}

impl BodySink {
    fn new(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Passthrough => Self::Passthrough(Vec::new()),
            Encoding::Base64 => Self::Base64(Base64Decoder::default()),
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Result<(), SoapError> {
        match self {
            Self::Passthrough(out) => out.extend_from_slice(bytes),
            Self::Base64(decoder) => {
                let text = std::str::from_utf8(bytes).map_err(|_| {
                    SoapError::Attachment("non-ASCII data in base64 part".to_string())
                })?;
                decoder.push(text).map_err(attachment_error)?;
            }
        }
        Ok(())
    }

    fn line_break(&mut self) {
        if let Self::Passthrough(out) = self {
            out.extend_from_slice(b"\r\n");
        }
    }

    fn finish(self) -> Result<Vec<u8>, SoapError> {
        match self {
            Self::Passthrough(out) => Ok(out),
            Self::Base64(decoder) => decoder.finish().map_err(attachment_error),
        }
    }
}

fn attachment_error(err: SoapError) -> SoapError {
    match err {
        SoapError::Parse(msg) => SoapError::Attachment(msg),
        other => other,
    }
}

fn read_body<R: Read>(
    lines: &mut LineReader<R>,
    boundary: &[u8],
    encoding: Encoding,
) -> Result<(Vec<u8>, Delimiter), SoapError> {
    let mut sink = BodySink::new(encoding);
    let mut at_line_start = true;
    // the CRLF ending the previous line belongs to the body unless a
    // delimiter follows it
    let mut pending_break = false;
    loop {
        let end = lines.read_chunk()?;
        if at_line_start && end != LineEnd::Limit {
            if let Some(delimiter) = lines.delimiter(boundary) {
                return Ok((sink.finish()?, delimiter));
            }
        }
        if end == LineEnd::Eof {
            return Err(SoapError::Attachment(
                "multipart body is missing its closing boundary".to_string(),
            ));
        }
        if pending_break {
            sink.line_break();
        }
        sink.push(&lines.line)?;
        pending_break = end == LineEnd::Crlf;
        at_line_start = pending_break;
    }
}

/// Extract the boundary of a `multipart/related` content type.
fn related_boundary(content_type: &str) -> Option<String> {
    let mut params = split_params(content_type).into_iter();
    let media_type = params.next()?;
    if !media_type.trim().eq_ignore_ascii_case("multipart/related") {
        return None;
    }
    params.find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Split on `;` outside quoted strings.
fn split_params(header: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in header.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&header[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&header[start..]);
    params
}

/// Part transfer encoding written by [`MultipartWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferEncoding {
    #[default]
    Binary,
    Base64,
}

impl TransferEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferEncoding::Binary => "binary",
            TransferEncoding::Base64 => "base64",
        }
    }
}

/// Writes `multipart/related` bodies: the primary part first, then one part
/// per attachment.
#[derive(Debug, Clone)]
pub struct MultipartWriter {
    boundary: String,
    encoding: TransferEncoding,
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartWriter {
    /// Writer with a random boundary.
    pub fn new() -> Self {
        let token: String = std::iter::repeat_with(fastrand::alphanumeric)
            .take(32)
            .collect();
        Self {
            boundary: format!("MIMEBoundary_{}", token),
            encoding: TransferEncoding::default(),
        }
    }

    pub fn with_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundary = boundary.into();
        self
    }

    pub fn with_encoding(mut self, encoding: TransferEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// `Content-Type` header value for the body.
    pub fn content_type(&self, root_type: &str) -> String {
        format!(
            "multipart/related; type=\"{}\"; boundary=\"{}\"",
            root_type, self.boundary
        )
    }

    pub fn write<W: Write>(
        &self,
        out: &mut W,
        primary: &[u8],
        primary_type: &str,
        attachments: &[BinaryContent],
    ) -> Result<(), SoapError> {
        write!(out, "--{}\r\n", self.boundary)?;
        write!(out, "Content-Type: {}\r\n", primary_type)?;
        write!(out, "Content-Transfer-Encoding: binary\r\n\r\n")?;
        out.write_all(primary)?;

        for attachment in attachments {
            write!(out, "\r\n--{}\r\n", self.boundary)?;
            write!(out, "Content-Type: application/octet-stream\r\n")?;
            write!(out, "Content-Transfer-Encoding: {}\r\n", self.encoding.as_str())?;
            write!(out, "Content-ID: <{}>\r\n\r\n", attachment.content_id())?;
            let mut reader = attachment.open()?;
            match self.encoding {
                TransferEncoding::Binary => {
                    io::copy(&mut reader, out)?;
                }
                TransferEncoding::Base64 => write_base64_lines(&mut reader, out)?,
            }
        }

        write!(out, "\r\n--{}--\r\n", self.boundary)?;
        out.flush()?;
        debug!(
            boundary = %self.boundary,
            attachments = attachments.len(),
            "Wrote multipart body"
        );
        Ok(())
    }
}

fn write_base64_lines<W: Write>(reader: &mut dyn Read, out: &mut W) -> io::Result<()> {
    let mut buf = [0u8; BASE64_LINE_BYTES];
    let mut first = true;
    loop {
        let filled = read_full(reader, &mut buf)?;
        if filled == 0 {
            return Ok(());
        }
        if !first {
            out.write_all(b"\r\n")?;
        }
        first = false;
        out.write_all(STANDARD.encode(&buf[..filled]).as_bytes())?;
        if filled < buf.len() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&str]) -> Vec<u8> {
        parts.concat().into_bytes()
    }

    fn primary_bytes<R: Read>(primary: PrimaryPart<R>) -> Vec<u8> {
        let mut primary = primary;
        let mut out = Vec::new();
        primary.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_primary_and_base64_attachment() {
        let encoded = STANDARD.encode(b"attached bytes");
        let raw = body(&[
            "preamble\r\n",
            "--B\r\n",
            "Content-Type: text/xml\r\n",
            "\r\n",
            "<Envelope>\r\n  body\r\n</Envelope>\r\n",
            "--B\r\n",
            "Content-ID: <att1>\r\n",
            "Content-Transfer-Encoding: base64\r\n",
            "\r\n",
            &encoded[..8],
            "\r\n",
            &encoded[8..],
            "\r\n",
            "--B--\r\n",
            "epilogue",
        ]);

        let envelope = read_multipart(raw.as_slice(), "multipart/related; boundary=B").unwrap();
        assert!(envelope.is_multipart());
        assert_eq!(envelope.primary_content_type(), Some("text/xml"));
        assert_eq!(envelope.attachments().len(), 1);
        assert_eq!(envelope.attachments()[0].content_id(), "att1");
        assert_eq!(envelope.attachments()[0].read_all().unwrap(), b"attached bytes");

        let (primary, _) = envelope.into_parts();
        assert_eq!(primary_bytes(primary), b"<Envelope>\r\n  body\r\n</Envelope>");
    }

    #[test]
    fn test_not_multipart_is_whole_primary() {
        let raw = b"--B\r\n\r\nnot parsed\r\n--B--".to_vec();
        for content_type in ["text/xml; charset=utf-8", "multipart/related; type=\"text/xml\""] {
            let envelope = read_multipart(raw.as_slice(), content_type).unwrap();
            assert!(!envelope.is_multipart());
            assert!(envelope.attachments().is_empty());
            let (primary, _) = envelope.into_parts();
            assert_eq!(primary_bytes(primary), raw);
        }
    }

    #[test]
    fn test_zero_parts() {
        for raw in ["--B--\r\n", "no delimiter at all", ""] {
            let err = read_multipart(raw.as_bytes(), "multipart/related; boundary=B").unwrap_err();
            assert!(matches!(err, SoapError::Attachment(_)));
            assert!(err.to_string().contains("empty multipart content"));
        }
    }

    #[test]
    fn test_missing_closing_boundary() {
        let raw = "--B\r\n\r\nprimary\r\n";
        let err = read_multipart(raw.as_bytes(), "multipart/related; boundary=B").unwrap_err();
        assert!(err.to_string().contains("closing boundary"));
    }

    #[test]
    fn test_attachment_requires_content_id() {
        let raw = "--B\r\n\r\nprimary\r\n--B\r\nContent-Type: image/png\r\n\r\nxx\r\n--B--";
        let err = read_multipart(raw.as_bytes(), "multipart/related; boundary=B").unwrap_err();
        assert!(err.to_string().contains("Content-ID"));
    }

    #[test]
    fn test_unsupported_encoding() {
        let raw = "--B\r\nContent-Transfer-Encoding: x-gzip\r\n\r\nprimary\r\n--B--";
        let err = read_multipart(raw.as_bytes(), "multipart/related; boundary=B").unwrap_err();
        assert!(err.to_string().contains("x-gzip"));
    }

    #[test]
    fn test_malformed_base64_part() {
        for data in ["aaa\u{e9}", "@@@@"] {
            let raw = format!(
                "--B\r\n\r\nroot\r\n--B\r\nContent-ID: <a>\r\nContent-Transfer-Encoding: base64\r\n\r\n{}\r\n--B--",
                data
            );
            let err = read_multipart(raw.as_bytes(), "multipart/related; boundary=B").unwrap_err();
            assert!(matches!(err, SoapError::Attachment(_)), "{:?}", err);
        }
    }

    #[test]
    fn test_envelope_debug_lists_attachments() {
        let raw = "--B\r\nContent-Type: text/xml\r\n\r\nroot\r\n--B\r\nContent-ID: <att1>\r\n\r\nx\r\n--B--";
        let envelope = read_multipart(raw.as_bytes(), "multipart/related; boundary=B").unwrap();
        let debug = format!("{:?}", envelope);
        assert!(debug.contains("multipart: true"));
        assert!(debug.contains("text/xml"));
        assert!(debug.contains("att1"));
    }

    #[test]
    fn test_quoted_boundary_and_folded_headers() {
        let raw = body(&[
            "--a;b\r\n",
            "Content-Type: application/xop+xml;\r\n",
            "\ttype=\"text/xml\"\r\n",
            "\r\n",
            "root\r\n",
            "--a;b \r\n",
            "CONTENT-ID:   <img%201>  \r\n",
            "\r\n",
            "\r\n",
            "--a;b--",
        ]);
        let content_type = r#"Multipart/Related; type="application/xop+xml"; boundary="a;b""#;
        let envelope = read_multipart(raw.as_slice(), content_type).unwrap();
        assert_eq!(
            envelope.primary_content_type(),
            Some("application/xop+xml; type=\"text/xml\"")
        );
        let attachment = &envelope.attachments()[0];
        assert_eq!(attachment.content_id(), "img%201");
        assert!(attachment.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_lines_longer_than_buffer() {
        let long_line = "x".repeat(100);
        let delimiter_lookalike = format!("{}--B", "y".repeat(13));
        let raw = body(&[
            "--B\r\n",
            "\r\n",
            &long_line,
            "\r\n",
            &delimiter_lookalike,
            "\r\n--B\r\n",
            "Content-ID: <bin>\r\n",
            "\r\n",
            "a\rb\nc\r\n\r\n",
            "--B--",
        ]);
        let reader = MultipartReader::new(MultipartConfig {
            line_buffer_size: 16,
            max_parts: 8,
        });
        let envelope = reader.read(raw.as_slice(), "multipart/related; boundary=B").unwrap();
        assert_eq!(envelope.attachments()[0].read_all().unwrap(), b"a\rb\nc\r\n");
        let (primary, _) = envelope.into_parts();
        assert_eq!(
            primary_bytes(primary),
            format!("{}\r\n{}", long_line, delimiter_lookalike).into_bytes()
        );
    }

    #[test]
    fn test_max_parts() {
        let raw = "--B\r\n\r\none\r\n--B\r\nContent-ID: <a>\r\n\r\ntwo\r\n--B--";
        let reader = MultipartReader::new(MultipartConfig {
            line_buffer_size: 64,
            max_parts: 1,
        });
        let err = reader.read(raw.as_bytes(), "multipart/related; boundary=B").unwrap_err();
        assert!(matches!(err, SoapError::Attachment(_)));
    }

    #[test]
    fn test_populate_registers_attachments() {
        let raw = "--B\r\n\r\nroot\r\n--B\r\nContent-ID: <att1>\r\n\r\ndata\r\n--B--";
        let envelope = read_multipart(raw.as_bytes(), "multipart/related; boundary=B").unwrap();
        let mut ctx = SerializerContext::new();
        let primary = envelope.populate(&mut ctx).unwrap();
        assert!(ctx.is_multipart());
        assert_eq!(ctx.resolve("att1").unwrap().read_all().unwrap(), b"data");
        assert_eq!(primary_bytes(primary), b"root");
    }

    #[test]
    fn test_writer_output_reads_back() {
        let attachments = vec![
            BinaryContent::from_bytes((0u8..=255).collect::<Vec<_>>()).with_content_id("raw"),
            BinaryContent::from_bytes(vec![7u8; 200]).with_content_id("big"),
        ];
        for encoding in [TransferEncoding::Binary, TransferEncoding::Base64] {
            let writer = MultipartWriter::new().with_encoding(encoding);
            let mut out = Vec::new();
            writer
                .write(&mut out, b"<Envelope/>", "text/xml", &attachments)
                .unwrap();

            let envelope = read_multipart(out.as_slice(), &writer.content_type("text/xml")).unwrap();
            assert_eq!(envelope.attachments(), attachments.as_slice());
            let (primary, _) = envelope.into_parts();
            assert_eq!(primary_bytes(primary), b"<Envelope/>");
        }
    }
}
