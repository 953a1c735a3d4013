//! Schema metadata consumed by the descriptor compiler.
//!
//! Produced outside this crate by WSDL/XSD analysis; [`SchemaSet`] is an
//! in-memory source for callers that build metadata by hand.

use crate::value::{TypeName, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds the owning choice instance from a decoded variant value.
pub type ConstructorFn = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Structural layout of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// Text content; a restriction of a built-in schema type
    Simple,
    /// Ordered properties (`xs:sequence`)
    Sequence,
    /// Tagged union of variants (`xs:choice`)
    Choice,
}

/// Supplies metadata for a type identity.
pub trait MetadataSource: Send + Sync {
    fn describe(&self, name: &TypeName) -> Option<TypeMetadata>;
}

/// Metadata of one type.
#[derive(Debug, Clone)]
pub struct TypeMetadata {
    pub layout: LayoutKind,
    /// Extended type (sequences) or restricted built-in type (simple types)
    pub base: Option<TypeName>,
    pub is_abstract: bool,
    /// Own properties, declaration order
    pub properties: Vec<PropertyMetadata>,
    pub variants: Vec<VariantMetadata>,
    /// Every known type deriving from this one
    pub subtypes: Vec<TypeName>,
}

impl TypeMetadata {
    pub fn sequence(properties: Vec<PropertyMetadata>) -> Self {
        Self {
            layout: LayoutKind::Sequence,
            base: None,
            is_abstract: false,
            properties,
            variants: Vec::new(),
            subtypes: Vec::new(),
        }
    }

    pub fn choice(variants: Vec<VariantMetadata>) -> Self {
        Self {
            layout: LayoutKind::Choice,
            variants,
            ..Self::sequence(Vec::new())
        }
    }

    /// Simple type restricting a built-in schema type.
    pub fn simple(base: TypeName) -> Self {
        Self {
            layout: LayoutKind::Simple,
            base: Some(base),
            ..Self::sequence(Vec::new())
        }
    }

    pub fn extending(mut self, base: TypeName) -> Self {
        self.base = Some(base);
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_subtypes(mut self, subtypes: Vec<TypeName>) -> Self {
        self.subtypes = subtypes;
        self
    }
}

/// Metadata of one sequence property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyMetadata {
    /// Element name
    pub name: String,
    pub type_name: TypeName,
    pub nilable: bool,
    /// Written without a wrapping element
    pub content: bool,
    /// minOccurs="0"
    pub optional: bool,
    /// maxOccurs > 1
    pub repeated: bool,
}

impl PropertyMetadata {
    pub fn new(name: impl Into<String>, type_name: TypeName) -> Self {
        Self {
            name: name.into(),
            type_name,
            nilable: false,
            content: false,
            optional: false,
            repeated: false,
        }
    }

    pub fn nilable(mut self) -> Self {
        self.nilable = true;
        self
    }

    pub fn content(mut self) -> Self {
        self.content = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }
}

/// How a choice variant is recognized on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantDispatch {
    /// Wrapped in an element of this name
    Element(String),
    /// Unwrapped; recognized by the nested type's match routine
    Inline,
}

/// Metadata of one choice variant.
#[derive(Clone)]
pub struct VariantMetadata {
    /// Discriminant, unique within the owning choice type
    pub id: u32,
    pub dispatch: VariantDispatch,
    pub type_name: TypeName,
    /// Defaults to building a [`Value::Choice`] tagged with `id`
    pub constructor: Option<ConstructorFn>,
}

impl VariantMetadata {
    pub fn element(id: u32, name: impl Into<String>, type_name: TypeName) -> Self {
        Self {
            id,
            dispatch: VariantDispatch::Element(name.into()),
            type_name,
            constructor: None,
        }
    }

    pub fn inline(id: u32, type_name: TypeName) -> Self {
        Self {
            id,
            dispatch: VariantDispatch::Inline,
            type_name,
            constructor: None,
        }
    }

    pub fn with_constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.constructor = Some(Arc::new(constructor));
        self
    }
}

impl fmt::Debug for VariantMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantMetadata")
            .field("id", &self.id)
            .field("dispatch", &self.dispatch)
            .field("type_name", &self.type_name)
            .field("custom_constructor", &self.constructor.is_some())
            .finish()
    }
}

/// In-memory metadata source.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    types: HashMap<TypeName, TypeMetadata>,
}

impl SchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, name: TypeName, metadata: TypeMetadata) -> Self {
        self.insert(name, metadata);
        self
    }

    pub fn insert(&mut self, name: TypeName, metadata: TypeMetadata) {
        self.types.insert(name, metadata);
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl MetadataSource for SchemaSet {
    fn describe(&self, name: &TypeName) -> Option<TypeMetadata> {
        self.types.get(name).cloned()
    }
}
