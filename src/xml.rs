//! XML reading and writing primitives used by compiled descriptors.
//!
//! Built on quick-xml, which never expands external entities.

use crate::error::SoapError;
use crate::value::TypeName;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::{QName, ResolveResult};
use quick_xml::{NsReader, Writer};
use std::io::{BufRead, Write};

/// Namespace URIs.
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
pub const XOP_NS: &str = "http://www.w3.org/2004/08/xop/include";

/// Prefix used when a subtype namespace is declared next to `xsi:type`.
const TYPE_PREFIX: &str = "tns";

/// A resolved attribute of the element the cursor is positioned on.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    pub namespace: Option<String>,
    pub local_name: String,
    pub value: String,
}

/// A start tag with namespace-resolved names.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementInfo {
    pub local_name: String,
    pub namespace: Option<String>,
    pub attributes: Vec<AttributeInfo>,
    /// `xsi:type` value resolved against the namespaces in scope at this tag
    pub xsi_type: Option<TypeName>,
    /// The `xsi:type` value carried no prefix
    pub xsi_type_unprefixed: bool,
}

impl ElementInfo {
    /// Find an attribute by namespace and local name.
    pub fn attribute(&self, namespace: Option<&str>, local_name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.local_name == local_name && a.namespace.as_deref() == namespace)
            .map(|a| a.value.as_str())
    }

    /// Whether the element carries `xsi:nil="true"` (or `"1"`).
    pub fn is_nil(&self) -> bool {
        self.attribute(Some(XSI_NS), "nil")
            .map(|v| {
                let v = v.trim();
                v.eq_ignore_ascii_case("true") || v == "1"
            })
            .unwrap_or(false)
    }
}

/// One unit of lookahead.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Start(ElementInfo),
    End,
    Text(String),
    Eof,
}

/// Pull cursor over an XML document with one node of lookahead.
pub struct XmlCursor<'r> {
    reader: NsReader<Box<dyn BufRead + 'r>>,
    buf: Vec<u8>,
    peeked: Option<Node>,
    open: Vec<ElementInfo>,
}

impl<'r> XmlCursor<'r> {
    pub fn new<R: BufRead + 'r>(input: R) -> Self {
        let boxed: Box<dyn BufRead + 'r> = Box::new(input);
        let mut reader = NsReader::from_reader(boxed);
        reader.config_mut().expand_empty_elements = true;
        Self {
            reader,
            buf: Vec::new(),
            peeked: None,
            open: Vec::new(),
        }
    }

    /// Number of currently open elements.
    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// The innermost element whose start tag has been consumed.
    pub fn current_element(&self) -> Option<&ElementInfo> {
        self.open.last()
    }

    /// Look at the next node without consuming it.
    pub fn peek(&mut self) -> Result<&Node, SoapError> {
        if self.peeked.is_none() {
            let node = self.read_node()?;
            self.peeked = Some(node);
        }
        Ok(self.peeked.get_or_insert(Node::Eof))
    }

    /// Consume the next node.
    pub fn next_node(&mut self) -> Result<Node, SoapError> {
        let node = match self.peeked.take() {
            Some(node) => node,
            None => self.read_node()?,
        };
        match &node {
            Node::Start(info) => self.open.push(info.clone()),
            Node::End => {
                self.open.pop();
            }
            _ => {}
        }
        Ok(node)
    }

    /// Skip whitespace and return the next start tag without consuming it,
    /// or `None` when the enclosing element ends first.
    pub fn peek_start(&mut self) -> Result<Option<ElementInfo>, SoapError> {
        loop {
            match self.peek()? {
                Node::Text(t) if t.trim().is_empty() => {}
                Node::Text(t) => {
                    let text = t.trim().to_string();
                    return Err(SoapError::Parse(format!(
                        "unexpected text `{}` where an element was expected{}",
                        text,
                        self.location()
                    )));
                }
                Node::Start(info) => return Ok(Some(info.clone())),
                Node::End | Node::Eof => return Ok(None),
            }
            self.next_node()?;
        }
    }

    /// Consume the next start tag.
    pub fn expect_start(&mut self) -> Result<ElementInfo, SoapError> {
        if self.peek_start()?.is_none() {
            return Err(SoapError::Parse(format!(
                "premature end of content{}",
                self.location()
            )));
        }
        match self.next_node()? {
            Node::Start(info) => Ok(info),
            other => Err(SoapError::Parse(format!("expected a start tag, found {:?}", other))),
        }
    }

    /// Consume the end tag of the current element, allowing only whitespace
    /// before it.
    pub fn finish_element(&mut self) -> Result<(), SoapError> {
        if let Some(info) = self.peek_start()? {
            return Err(SoapError::Parse(format!(
                "unexpected element `<{}>`{}",
                info.local_name,
                self.location()
            )));
        }
        match self.next_node()? {
            Node::End => Ok(()),
            _ => Err(SoapError::Parse(format!("premature end of document{}", self.location()))),
        }
    }

    /// Consume everything up to and including the end tag of the current
    /// element.
    pub fn skip_to_end(&mut self) -> Result<(), SoapError> {
        let target = self.depth();
        while self.depth() >= target && target > 0 {
            if let Node::Eof = self.next_node()? {
                return Err(SoapError::Parse("premature end of document".to_string()));
            }
        }
        Ok(())
    }

    /// Consume the next element and its whole subtree.
    pub fn skip_element(&mut self) -> Result<(), SoapError> {
        self.expect_start()?;
        self.skip_to_end()
    }

    /// Feed every text chunk of the current element to `f`, stopping before
    /// its end tag. Child elements are rejected.
    pub fn for_each_text<F>(&mut self, mut f: F) -> Result<(), SoapError>
    where
        F: FnMut(&str) -> Result<(), SoapError>,
    {
        loop {
            match self.peek()? {
                Node::Text(t) => f(t)?,
                Node::End => return Ok(()),
                Node::Start(info) => {
                    let name = info.local_name.clone();
                    return Err(SoapError::Parse(format!(
                        "unexpected element `<{}>` in simple content{}",
                        name,
                        self.location()
                    )));
                }
                Node::Eof => {
                    return Err(SoapError::Parse(format!(
                        "premature end of document{}",
                        self.location()
                    )))
                }
            }
            self.next_node()?;
        }
    }

    /// Collect the text content of the current element.
    pub fn read_text(&mut self) -> Result<String, SoapError> {
        let mut text = String::new();
        self.for_each_text(|chunk| {
            text.push_str(chunk);
            Ok(())
        })?;
        Ok(text)
    }

    fn location(&self) -> String {
        match self.open.last() {
            Some(e) => format!(" in `<{}>`", e.local_name),
            None => String::new(),
        }
    }

    fn read_node(&mut self) -> Result<Node, SoapError> {
        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(start) => return element_info(&self.reader, &start).map(Node::Start),
                Event::End(_) => return Ok(Node::End),
                Event::Text(text) => return Ok(Node::Text(text.unescape()?.into_owned())),
                Event::CData(data) => {
                    let text = std::str::from_utf8(&data)
                        .map_err(|e| SoapError::Xml(format!("invalid UTF-8 in CDATA: {}", e)))?;
                    return Ok(Node::Text(text.to_string()));
                }
                Event::Eof => return Ok(Node::Eof),
                _ => {}
            }
        }
    }
}

fn element_info<R>(reader: &NsReader<R>, start: &BytesStart) -> Result<ElementInfo, SoapError> {
    let (ns, local) = reader.resolve_element(start.name());
    let namespace = namespace_of(ns, start.name())?;
    let local_name = utf8(local.as_ref())?;

    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let (ns, local) = reader.resolve_attribute(attr.key);
        attributes.push(AttributeInfo {
            namespace: namespace_of(ns, attr.key)?,
            local_name: utf8(local.as_ref())?,
            value: attr.unescape_value()?.into_owned(),
        });
    }

    let mut xsi_type_unprefixed = false;
    let xsi_type = match attributes
        .iter()
        .find(|a| a.local_name == "type" && a.namespace.as_deref() == Some(XSI_NS))
    {
        Some(attr) => {
            let qname = attr.value.trim();
            xsi_type_unprefixed = !qname.contains(':');
            let (ns, local) = reader.resolve(QName(qname.as_bytes()), false);
            let namespace = namespace_of(ns, QName(qname.as_bytes())).map_err(|_| {
                SoapError::TypeResolution(format!(
                    "xsi:type `{}` on `<{}>` uses an undeclared prefix",
                    qname, local_name
                ))
            })?;
            Some(TypeName::new(namespace.unwrap_or_default(), utf8(local.as_ref())?))
        }
        None => None,
    };

    Ok(ElementInfo {
        local_name,
        namespace,
        attributes,
        xsi_type,
        xsi_type_unprefixed,
    })
}

fn namespace_of(result: ResolveResult, name: QName) -> Result<Option<String>, SoapError> {
    match result {
        ResolveResult::Bound(ns) => Ok(Some(utf8(ns.as_ref())?)),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(SoapError::Parse(format!(
            "undeclared namespace prefix `{}` in `{}`",
            String::from_utf8_lossy(&prefix),
            String::from_utf8_lossy(name.as_ref())
        ))),
    }
}

fn utf8(bytes: &[u8]) -> Result<String, SoapError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| SoapError::Xml(format!("invalid UTF-8 in name: {}", e)))
}

/// Streaming XML writer with a deferred start tag.
///
/// Attributes may be added to the most recently started element until its
/// first content is written.
pub struct XmlSink<'w> {
    writer: Writer<Box<dyn Write + 'w>>,
    pending: Option<BytesStart<'static>>,
    open: Vec<String>,
}

impl<'w> XmlSink<'w> {
    pub fn new<W: Write + 'w>(output: W) -> Self {
        let boxed: Box<dyn Write + 'w> = Box::new(output);
        Self {
            writer: Writer::new(boxed),
            pending: None,
            open: Vec::new(),
        }
    }

    pub fn start_element(&mut self, name: &str) -> Result<(), SoapError> {
        self.flush_pending()?;
        self.pending = Some(BytesStart::new(name.to_string()));
        self.open.push(name.to_string());
        Ok(())
    }

    pub fn attribute(&mut self, name: &str, value: &str) -> Result<(), SoapError> {
        match self.pending.as_mut() {
            Some(start) => {
                start.push_attribute((name, value));
                Ok(())
            }
            None => Err(SoapError::Configuration(format!(
                "attribute `{}` written after element content",
                name
            ))),
        }
    }

    /// Declare `xmlns:<prefix>` on the pending element unless already present.
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) -> Result<(), SoapError> {
        let key = format!("xmlns:{}", prefix);
        let declared = self
            .pending
            .as_ref()
            .map(|s| s.attributes().flatten().any(|a| a.key.as_ref() == key.as_bytes()))
            .unwrap_or(false);
        if declared {
            return Ok(());
        }
        self.attribute(&key, uri)
    }

    /// Mark the pending element with `xsi:nil="true"`.
    pub fn write_nil(&mut self) -> Result<(), SoapError> {
        self.declare_namespace("xsi", XSI_NS)?;
        self.attribute("xsi:nil", "true")
    }

    /// Tag the pending element with an explicit `xsi:type`.
    pub fn write_xsi_type(&mut self, name: &TypeName) -> Result<(), SoapError> {
        self.declare_namespace("xsi", XSI_NS)?;
        if name.namespace.is_empty() {
            self.attribute("xsi:type", &name.local)
        } else {
            self.declare_namespace(TYPE_PREFIX, &name.namespace)?;
            self.attribute("xsi:type", &format!("{}:{}", TYPE_PREFIX, name.local))
        }
    }

    pub fn text(&mut self, text: &str) -> Result<(), SoapError> {
        self.flush_pending()?;
        if !text.is_empty() {
            self.writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        Ok(())
    }

    pub fn end_element(&mut self) -> Result<(), SoapError> {
        let name = self
            .open
            .pop()
            .ok_or_else(|| SoapError::Configuration("end_element without open element".to_string()))?;
        match self.pending.take() {
            Some(start) => self.writer.write_event(Event::Empty(start))?,
            None => self.writer.write_event(Event::End(BytesEnd::new(name)))?,
        }
        Ok(())
    }

    /// Flush buffered output; every started element must be closed.
    pub fn finish(mut self) -> Result<(), SoapError> {
        if let Some(name) = self.open.last() {
            return Err(SoapError::Configuration(format!("element `<{}>` left open", name)));
        }
        self.writer.get_mut().flush()?;
        Ok(())
    }

    fn flush_pending(&mut self) -> Result<(), SoapError> {
        if let Some(start) = self.pending.take() {
            self.writer.write_event(Event::Start(start))?;
        }
        Ok(())
    }
}
