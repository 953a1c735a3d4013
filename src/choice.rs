//! Choice layout: tagged unions dispatched by element name or by the nested
//! type's match routine.

use crate::descriptor::{deserializer, matcher, serializer, ChoiceVariant, TypeDescriptor};
use crate::error::SoapError;
use crate::metadata::{ConstructorFn, LayoutKind, VariantDispatch, VariantMetadata};
use crate::sequence::{read_wrapped, write_wrapped};
use crate::value::{ChoiceValue, TypeName, Value};
use std::collections::HashSet;
use std::sync::Arc;

pub(crate) fn compile(
    name: TypeName,
    metadata: &[VariantMetadata],
) -> Result<TypeDescriptor, SoapError> {
    let mut seen = HashSet::new();
    let mut variants = Vec::with_capacity(metadata.len());
    for variant in metadata {
        if !seen.insert(variant.id) {
            return Err(SoapError::Configuration(format!(
                "choice type `{}` declares discriminant {} more than once",
                name, variant.id
            )));
        }
        if let VariantDispatch::Element(element) = &variant.dispatch {
            if element.is_empty() {
                return Err(SoapError::Configuration(format!(
                    "variant {} of choice type `{}` has an empty element name",
                    variant.id, name
                )));
            }
        }
        let tag = variant.id;
        let constructor: ConstructorFn = match &variant.constructor {
            Some(custom) => Arc::clone(custom),
            None => Arc::new(move |value: Value| Value::Choice(ChoiceValue::new(tag, value))),
        };
        variants.push(ChoiceVariant {
            id: variant.id,
            dispatch: variant.dispatch.clone(),
            type_name: variant.type_name.clone(),
            constructor,
        });
    }
    let variants: Arc<[ChoiceVariant]> = Arc::from(variants);

    let serialize = {
        let owner = name.clone();
        let variants = Arc::clone(&variants);
        serializer(move |registry, value, sink, ctx| {
            let choice = value.as_choice().ok_or_else(|| {
                SoapError::Validation(format!(
                    "expected a choice value of type `{}`, found {}",
                    owner,
                    value.kind_name()
                ))
            })?;
            let variant = variants.iter().find(|v| v.id == choice.tag).ok_or_else(|| {
                SoapError::Validation(format!(
                    "choice type `{}` has no variant with discriminant {}",
                    owner, choice.tag
                ))
            })?;
            let nested = registry.get_or_compile(&variant.type_name)?;
            match &variant.dispatch {
                VariantDispatch::Element(element) => {
                    write_wrapped(registry, element, &nested, &choice.value, sink, ctx)
                }
                VariantDispatch::Inline => nested.serialize(registry, &choice.value, sink, ctx),
            }
        })
    };

    let deserialize = {
        let owner = name.clone();
        let variants = Arc::clone(&variants);
        deserializer(move |registry, cursor, ctx| {
            let element = cursor.peek_start()?.ok_or_else(|| {
                SoapError::Parse(format!(
                    "no matching choice variant for `{}`: content ended",
                    owner
                ))
            })?;
            for variant in variants.iter() {
                let nested = registry.get_or_compile(&variant.type_name)?;
                match &variant.dispatch {
                    VariantDispatch::Element(element_name) if *element_name == element.local_name => {
                        let value = read_wrapped(registry, &owner, true, &nested, cursor, ctx)?;
                        return Ok((variant.constructor)(value));
                    }
                    VariantDispatch::Inline if nested.matches_element(registry, &element)? => {
                        let value = nested.deserialize(registry, cursor, ctx)?;
                        return Ok((variant.constructor)(value));
                    }
                    _ => {}
                }
            }
            Err(SoapError::Parse(format!(
                "no matching choice variant for element `<{}>` in `{}`",
                element.local_name, owner
            )))
        })
    };

    let matches = {
        let variants = Arc::clone(&variants);
        matcher(move |registry, element| {
            for variant in variants.iter() {
                let hit = match &variant.dispatch {
                    VariantDispatch::Element(element_name) => *element_name == element.local_name,
                    VariantDispatch::Inline => registry
                        .get_or_compile(&variant.type_name)?
                        .matches_element(registry, element)?,
                };
                if hit {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    };

    Ok(TypeDescriptor {
        name,
        layout: LayoutKind::Choice,
        properties: Arc::from(Vec::new()),
        variants,
        subtypes: Vec::new(),
        is_abstract: false,
        serialize,
        deserialize,
        matches,
    })
}
