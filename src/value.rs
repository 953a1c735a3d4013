//! In-memory values produced and consumed by compiled descriptors.

use crate::binary::BinaryContent;
use chrono::{DateTime, FixedOffset};
use std::fmt;
use std::str::FromStr;

/// Qualified type identity: namespace URI plus local name.
///
/// An empty namespace means "no namespace".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName {
    /// Namespace URI
    pub namespace: String,
    /// Local name
    pub local: String,
}

impl TypeName {
    /// Create a qualified type name.
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// Create a built-in XML Schema type name (`xs:<local>`).
    pub fn xsd(local: impl Into<String>) -> Self {
        Self::new(crate::xml::XSD_NS, local)
    }

    /// Whether this name lives in the XML Schema namespace.
    pub fn is_xsd(&self) -> bool {
        self.namespace == crate::xml::XSD_NS
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

/// A decoded message value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent or `xsi:nil` value
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    /// `xs:decimal` and `xs:integer` family
    Decimal(Decimal),
    DateTime(DateTime<FixedOffset>),
    String(String),
    Binary(BinaryContent),
    /// Items of a repeated property
    List(Vec<Value>),
    /// Instance of a sequence type
    Object(Object),
    /// Instance of a choice type
    Choice(ChoiceValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::Decimal(_) => "decimal",
            Value::DateTime(_) => "dateTime",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Choice(_) => "choice",
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_choice(&self) -> Option<&ChoiceValue> {
        match self {
            Value::Choice(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&BinaryContent> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<BinaryContent> for Value {
    fn from(v: BinaryContent) -> Self {
        Value::Binary(v)
    }
}

impl From<Object> for Value {
    fn from(v: Object) -> Self {
        Value::Object(v)
    }
}

impl From<ChoiceValue> for Value {
    fn from(v: ChoiceValue) -> Self {
        Value::Choice(v)
    }
}

/// Instance of a sequence type.
///
/// Carries its runtime type so a property declared with a base type can be
/// written with an explicit `xsi:type`. Fields keep declaration order when
/// produced by a decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    type_name: TypeName,
    fields: Vec<(String, Value)>,
}

impl Object {
    pub fn new(type_name: TypeName) -> Self {
        Self {
            type_name,
            fields: Vec::new(),
        }
    }

    pub(crate) fn with_fields(type_name: TypeName, fields: Vec<(String, Value)>) -> Self {
        Self { type_name, fields }
    }

    /// Builder-style field assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field, replacing any previous value of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }
}

/// Instance of a choice type: the selected variant's discriminant and its
/// value.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceValue {
    pub tag: u32,
    pub value: Box<Value>,
}

impl ChoiceValue {
    pub fn new(tag: u32, value: impl Into<Value>) -> Self {
        Self {
            tag,
            value: Box::new(value.into()),
        }
    }
}

/// Lexical `xs:decimal` / `xs:integer` value of arbitrary precision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal(String);

impl Decimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the value has no fractional part.
    pub fn is_integer(&self) -> bool {
        !self.0.contains('.')
    }
}

impl FromStr for Decimal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (digits, None),
        };
        let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        let valid = all_digits(int_part)
            && frac_part.map_or(true, all_digits)
            && (!int_part.is_empty() || frac_part.is_some_and(|f| !f.is_empty()));
        if valid {
            Ok(Decimal(text.to_string()))
        } else {
            Err(format!("`{}` is not a valid decimal", s))
        }
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
