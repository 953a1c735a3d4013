//! Type descriptor registry and compiler.
//!
//! Descriptors are compiled on first use from a [`MetadataSource`] and cached
//! for the life of the registry. Compilation is a pure function of metadata,
//! so two callers racing on the same type may both compile it; the first
//! inserted descriptor wins and the other is dropped.

use crate::context::SerializerContext;
use crate::descriptor::{PropertyDescriptor, TypeDescriptor};
use crate::error::SoapError;
use crate::metadata::{LayoutKind, MetadataSource, TypeMetadata};
use crate::primitive::{self, Primitive};
use crate::value::{TypeName, Value};
use crate::xml::{XmlCursor, XmlSink};
use crate::{choice, sequence};
use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace, warn};

static GLOBAL: OnceLock<TypeRegistry> = OnceLock::new();

/// Install the process-wide registry. Only the first call installs; later
/// sources are ignored and the existing registry is returned.
pub fn install_global<S: MetadataSource + 'static>(source: S) -> &'static TypeRegistry {
    if let Some(existing) = GLOBAL.get() {
        warn!("Global type registry already installed, ignoring new metadata source");
        return existing;
    }
    GLOBAL.get_or_init(|| TypeRegistry::new(source))
}

/// The process-wide registry, if installed.
pub fn global() -> Option<&'static TypeRegistry> {
    GLOBAL.get()
}

/// Append-only cache of compiled descriptors keyed by type identity.
pub struct TypeRegistry {
    source: Arc<dyn MetadataSource>,
    descriptors: DashMap<TypeName, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new<S: MetadataSource + 'static>(source: S) -> Self {
        Self::with_source(Arc::new(source))
    }

    pub fn with_source(source: Arc<dyn MetadataSource>) -> Self {
        Self {
            source,
            descriptors: DashMap::new(),
        }
    }

    /// Return the cached descriptor or compile and cache a new one.
    pub fn get_or_compile(&self, name: &TypeName) -> Result<Arc<TypeDescriptor>, SoapError> {
        if let Some(found) = self.descriptors.get(name) {
            return Ok(Arc::clone(found.value()));
        }

        let compiled = Arc::new(self.compile(name)?);
        let entry = self
            .descriptors
            .entry(name.clone())
            .or_insert_with(|| Arc::clone(&compiled));
        if !Arc::ptr_eq(entry.value(), &compiled) {
            trace!(type_name = %name, "Descriptor compiled concurrently, keeping the first");
        }
        Ok(Arc::clone(entry.value()))
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn contains(&self, name: &TypeName) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Write the content of `value` as type `type_name`.
    pub fn serialize(
        &self,
        type_name: &TypeName,
        value: &Value,
        sink: &mut XmlSink<'_>,
        ctx: &mut SerializerContext,
    ) -> Result<(), SoapError> {
        self.get_or_compile(type_name)?.serialize(self, value, sink, ctx)
    }

    /// Read content of type `type_name` from inside the current element.
    pub fn deserialize(
        &self,
        type_name: &TypeName,
        cursor: &mut XmlCursor<'_>,
        ctx: &mut SerializerContext,
    ) -> Result<Value, SoapError> {
        self.get_or_compile(type_name)?.deserialize(self, cursor, ctx)
    }

    /// Write `value` wrapped in an element named `element`.
    pub fn write_element(
        &self,
        element: &str,
        type_name: &TypeName,
        value: &Value,
        sink: &mut XmlSink<'_>,
        ctx: &mut SerializerContext,
    ) -> Result<(), SoapError> {
        let declared = self.get_or_compile(type_name)?;
        sequence::write_wrapped(self, element, &declared, value, sink, ctx)
    }

    /// Read the next element, which must be named `element`, as `type_name`.
    pub fn read_element(
        &self,
        element: &str,
        type_name: &TypeName,
        cursor: &mut XmlCursor<'_>,
        ctx: &mut SerializerContext,
    ) -> Result<Value, SoapError> {
        let declared = self.get_or_compile(type_name)?;
        match cursor.peek_start()? {
            None => Err(SoapError::Parse(format!(
                "missing required element `<{}>`",
                element
            ))),
            Some(found) if found.local_name != element => Err(SoapError::Parse(format!(
                "unexpected element `<{}>`, expected `<{}>`",
                found.local_name, element
            ))),
            Some(_) => sequence::read_wrapped(self, type_name, true, &declared, cursor, ctx),
        }
    }

    fn compile(&self, name: &TypeName) -> Result<TypeDescriptor, SoapError> {
        if name.is_xsd() {
            let primitive = Primitive::from_xsd_name(&name.local).ok_or_else(|| {
                SoapError::TypeResolution(format!("unmapped primitive schema type `{}`", name))
            })?;
            return Ok(primitive::compile(name.clone(), primitive));
        }

        let metadata = self.source.describe(name).ok_or_else(|| {
            SoapError::Configuration(format!("type `{}` has no serialization metadata", name))
        })?;

        let descriptor = match metadata.layout {
            LayoutKind::Simple => {
                let base = metadata.base.as_ref().filter(|b| b.is_xsd()).ok_or_else(|| {
                    SoapError::Configuration(format!(
                        "simple type `{}` must restrict a built-in schema type",
                        name
                    ))
                })?;
                let primitive = Primitive::from_xsd_name(&base.local).ok_or_else(|| {
                    SoapError::TypeResolution(format!(
                        "unmapped primitive schema type `{}` (base of `{}`)",
                        base, name
                    ))
                })?;
                primitive::compile(name.clone(), primitive)
            }
            LayoutKind::Sequence => {
                if !metadata.variants.is_empty() {
                    return Err(SoapError::Configuration(format!(
                        "sequence type `{}` declares choice variants",
                        name
                    )));
                }
                let properties = self.flatten_properties(name, &metadata)?;
                sequence::compile(
                    name.clone(),
                    properties,
                    metadata.subtypes.clone(),
                    metadata.is_abstract,
                )
            }
            LayoutKind::Choice => {
                if !metadata.properties.is_empty() {
                    return Err(SoapError::Configuration(format!(
                        "choice type `{}` declares sequence properties",
                        name
                    )));
                }
                choice::compile(name.clone(), &metadata.variants)?
            }
        };

        debug!(
            type_name = %name,
            layout = ?descriptor.layout(),
            properties = descriptor.properties().len(),
            variants = descriptor.variants().len(),
            "Compiled type descriptor"
        );
        Ok(descriptor)
    }

    /// Inherited properties (most-base first) followed by the type's own.
    fn flatten_properties(
        &self,
        name: &TypeName,
        metadata: &TypeMetadata,
    ) -> Result<Vec<PropertyDescriptor>, SoapError> {
        let mut chain: Vec<TypeMetadata> = Vec::new();
        let mut seen = vec![name.clone()];
        let mut next = metadata.base.clone();
        while let Some(base) = next {
            if seen.contains(&base) {
                return Err(SoapError::Configuration(format!(
                    "cyclic base type chain through `{}`",
                    base
                )));
            }
            let base_metadata = self.source.describe(&base).ok_or_else(|| {
                SoapError::Configuration(format!(
                    "base type `{}` of `{}` has no serialization metadata",
                    base, name
                ))
            })?;
            if base_metadata.layout != LayoutKind::Sequence {
                return Err(SoapError::Configuration(format!(
                    "`{}` extends `{}`, which is not a sequence type",
                    name, base
                )));
            }
            next = base_metadata.base.clone();
            seen.push(base);
            chain.push(base_metadata);
        }

        let own = std::iter::once(metadata);
        let mut properties = Vec::new();
        for level in chain.iter().rev().chain(own) {
            for property in &level.properties {
                if property.name.is_empty() && !property.content {
                    return Err(SoapError::Configuration(format!(
                        "type `{}` has a property without an element name",
                        name
                    )));
                }
                properties.push(PropertyDescriptor {
                    name: property.name.clone(),
                    type_name: property.type_name.clone(),
                    nilable: property.nilable,
                    content: property.content,
                    optional: property.optional,
                    repeated: property.repeated,
                });
            }
        }
        Ok(properties)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("descriptors", &self.descriptors.len())
            .finish_non_exhaustive()
    }
}
