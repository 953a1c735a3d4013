//! Built-in XML Schema types.

use crate::binary;
use crate::context::SerializerContext;
use crate::descriptor::{deserializer, matcher, serializer, TypeDescriptor};
use crate::error::SoapError;
use crate::metadata::LayoutKind;
use crate::value::{Decimal, TypeName, Value};
use crate::xml::{XmlCursor, XmlSink};
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone};
use std::sync::Arc;

/// Text encodings of built-in schema types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Boolean,
    Int,
    Long,
    Double,
    Decimal,
    Integer,
    DateTime,
    String,
    Base64Binary,
}

impl Primitive {
    /// Map an XSD local name to its encoding.
    pub fn from_xsd_name(local: &str) -> Option<Self> {
        let primitive = match local {
            "boolean" => Self::Boolean,
            "int" | "short" | "byte" | "unsignedShort" | "unsignedByte" => Self::Int,
            "long" | "unsignedInt" => Self::Long,
            "double" | "float" => Self::Double,
            "decimal" => Self::Decimal,
            "integer" | "nonNegativeInteger" | "positiveInteger" | "nonPositiveInteger"
            | "negativeInteger" | "unsignedLong" => Self::Integer,
            "dateTime" => Self::DateTime,
            "string" | "normalizedString" | "token" | "anyURI" | "QName" | "language"
            | "NCName" | "ID" => Self::String,
            "base64Binary" => Self::Base64Binary,
            _ => return None,
        };
        Some(primitive)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Long => "long",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Integer => "integer",
            Self::DateTime => "dateTime",
            Self::String => "string",
            Self::Base64Binary => "base64Binary",
        }
    }

    /// Write `value` as element content.
    pub fn write(
        &self,
        value: &Value,
        sink: &mut XmlSink<'_>,
        ctx: &mut SerializerContext,
    ) -> Result<(), SoapError> {
        let text = match (self, value) {
            (Self::Base64Binary, _) => return binary::write_binary(value, sink, ctx),
            (Self::Boolean, Value::Boolean(b)) => b.to_string(),
            (Self::Int, Value::Int(i)) => i.to_string(),
            (Self::Long, Value::Long(l)) => l.to_string(),
            (Self::Long, Value::Int(i)) => i.to_string(),
            (Self::Double, Value::Double(d)) => format_double(*d),
            (Self::Decimal, Value::Decimal(d)) => d.to_string(),
            (Self::Decimal, Value::Int(i)) => i.to_string(),
            (Self::Decimal, Value::Long(l)) => l.to_string(),
            (Self::Integer, Value::Decimal(d)) if d.is_integer() => d.to_string(),
            (Self::Integer, Value::Int(i)) => i.to_string(),
            (Self::Integer, Value::Long(l)) => l.to_string(),
            (Self::DateTime, Value::DateTime(dt)) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            (Self::String, Value::String(s)) => s.clone(),
            (_, other) => {
                return Err(SoapError::Validation(format!(
                    "cannot write {} value as xs:{}",
                    other.kind_name(),
                    self.name()
                )))
            }
        };
        sink.text(&text)
    }

    /// Read the content of the current element.
    pub fn read(
        &self,
        cursor: &mut XmlCursor<'_>,
        ctx: &mut SerializerContext,
    ) -> Result<Value, SoapError> {
        if *self == Self::Base64Binary {
            return binary::read_binary(cursor, ctx);
        }
        let element = cursor
            .current_element()
            .map(|e| e.local_name.clone())
            .unwrap_or_default();
        let text = cursor.read_text()?;
        self.parse(&text).map_err(|reason| {
            SoapError::Parse(format!("invalid xs:{} value in `<{}>`: {}", self.name(), element, reason))
        })
    }

    fn parse(&self, text: &str) -> Result<Value, String> {
        let trimmed = text.trim();
        let value = match self {
            Self::Boolean => match trimmed {
                "true" | "1" => Value::Boolean(true),
                "false" | "0" => Value::Boolean(false),
                _ => return Err(format!("`{}` is not a boolean", trimmed)),
            },
            Self::Int => Value::Int(trimmed.parse().map_err(|e| format!("`{}`: {}", trimmed, e))?),
            Self::Long => Value::Long(trimmed.parse().map_err(|e| format!("`{}`: {}", trimmed, e))?),
            Self::Double => Value::Double(parse_double(trimmed)?),
            Self::Decimal => Value::Decimal(trimmed.parse()?),
            Self::Integer => {
                let d: Decimal = trimmed.parse()?;
                if !d.is_integer() {
                    return Err(format!("`{}` has a fractional part", trimmed));
                }
                Value::Decimal(d)
            }
            Self::DateTime => Value::DateTime(parse_date_time(trimmed)?),
            Self::String => Value::String(text.to_string()),
            Self::Base64Binary => return Err("binary content has no plain text form".to_string()),
        };
        Ok(value)
    }
}

/// `xs:dateTime` with an optional timezone; local times are taken as UTC.
fn parse_date_time(s: &str) -> Result<DateTime<FixedOffset>, String> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Ok(dt),
        Err(e) => {
            let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .map_err(|_| format!("`{}`: {}", s, e))?;
            let utc = FixedOffset::east_opt(0).ok_or_else(|| "invalid UTC offset".to_string())?;
            Ok(utc.from_utc_datetime(&naive))
        }
    }
}

fn format_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "INF" } else { "-INF" }.to_string()
    } else {
        d.to_string()
    }
}

fn parse_double(s: &str) -> Result<f64, String> {
    match s {
        "NaN" => Ok(f64::NAN),
        "INF" | "+INF" => Ok(f64::INFINITY),
        "-INF" => Ok(f64::NEG_INFINITY),
        _ => s.parse().map_err(|e| format!("`{}`: {}", s, e)),
    }
}

/// Descriptor for a simple type encoded as `primitive`.
pub(crate) fn compile(name: TypeName, primitive: Primitive) -> TypeDescriptor {
    TypeDescriptor {
        name,
        layout: LayoutKind::Simple,
        properties: Arc::from(Vec::new()),
        variants: Arc::from(Vec::new()),
        subtypes: Vec::new(),
        is_abstract: false,
        serialize: serializer(move |_, value, sink, ctx| primitive.write(value, sink, ctx)),
        deserialize: deserializer(move |_, cursor, ctx| primitive.read(cursor, ctx)),
        matches: matcher(|_, _| Ok(false)),
    }
}
