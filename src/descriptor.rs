//! Compiled per-type codec descriptors.

use crate::context::SerializerContext;
use crate::error::SoapError;
use crate::metadata::{ConstructorFn, LayoutKind, VariantDispatch};
use crate::registry::TypeRegistry;
use crate::value::{TypeName, Value};
use crate::xml::{ElementInfo, XmlCursor, XmlSink};
use std::fmt;
use std::sync::Arc;

/// Writes the content of a value (never its wrapping element).
pub type SerializeFn = Arc<
    dyn Fn(&TypeRegistry, &Value, &mut XmlSink<'_>, &mut SerializerContext) -> Result<(), SoapError>
        + Send
        + Sync,
>;

/// Reads the content of a value, stopping before the enclosing end tag.
pub type DeserializeFn = Arc<
    dyn Fn(&TypeRegistry, &mut XmlCursor<'_>, &mut SerializerContext) -> Result<Value, SoapError>
        + Send
        + Sync,
>;

/// Tests whether an element starts a value of the type.
pub type MatchFn =
    Arc<dyn Fn(&TypeRegistry, &ElementInfo) -> Result<bool, SoapError> + Send + Sync>;

pub(crate) fn serializer<F>(f: F) -> SerializeFn
where
    F: Fn(&TypeRegistry, &Value, &mut XmlSink<'_>, &mut SerializerContext) -> Result<(), SoapError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

pub(crate) fn deserializer<F>(f: F) -> DeserializeFn
where
    F: Fn(&TypeRegistry, &mut XmlCursor<'_>, &mut SerializerContext) -> Result<Value, SoapError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

pub(crate) fn matcher<F>(f: F) -> MatchFn
where
    F: Fn(&TypeRegistry, &ElementInfo) -> Result<bool, SoapError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A sequence property, resolved from metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    /// Nested value type, resolved through the registry when used
    pub type_name: TypeName,
    pub nilable: bool,
    pub content: bool,
    pub optional: bool,
    pub repeated: bool,
}

/// A choice variant.
#[derive(Clone)]
pub struct ChoiceVariant {
    pub id: u32,
    pub dispatch: VariantDispatch,
    pub type_name: TypeName,
    pub constructor: ConstructorFn,
}

impl fmt::Debug for ChoiceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChoiceVariant")
            .field("id", &self.id)
            .field("dispatch", &self.dispatch)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Compiled codec for one type. Immutable once built.
#[derive(Clone)]
pub struct TypeDescriptor {
    pub(crate) name: TypeName,
    pub(crate) layout: LayoutKind,
    pub(crate) properties: Arc<[PropertyDescriptor]>,
    pub(crate) variants: Arc<[ChoiceVariant]>,
    pub(crate) subtypes: Vec<TypeName>,
    pub(crate) is_abstract: bool,
    pub(crate) serialize: SerializeFn,
    pub(crate) deserialize: DeserializeFn,
    pub(crate) matches: MatchFn,
}

impl TypeDescriptor {
    pub fn name(&self) -> &TypeName {
        &self.name
    }

    pub fn layout(&self) -> LayoutKind {
        self.layout
    }

    pub fn is_choice(&self) -> bool {
        self.layout == LayoutKind::Choice
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// All properties, inherited ones first.
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn variants(&self) -> &[ChoiceVariant] {
        &self.variants
    }

    pub fn subtypes(&self) -> &[TypeName] {
        &self.subtypes
    }

    pub fn serialize(
        &self,
        registry: &TypeRegistry,
        value: &Value,
        sink: &mut XmlSink<'_>,
        ctx: &mut SerializerContext,
    ) -> Result<(), SoapError> {
        (self.serialize)(registry, value, sink, ctx)
    }

    pub fn deserialize(
        &self,
        registry: &TypeRegistry,
        cursor: &mut XmlCursor<'_>,
        ctx: &mut SerializerContext,
    ) -> Result<Value, SoapError> {
        (self.deserialize)(registry, cursor, ctx)
    }

    pub fn matches_element(
        &self,
        registry: &TypeRegistry,
        element: &ElementInfo,
    ) -> Result<bool, SoapError> {
        (self.matches)(registry, element)
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("layout", &self.layout)
            .field("properties", &self.properties)
            .field("variants", &self.variants)
            .field("subtypes", &self.subtypes)
            .field("is_abstract", &self.is_abstract)
            .finish_non_exhaustive()
    }
}
