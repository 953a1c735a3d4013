//! Sequence layout: ordered properties, nilability and subtype dispatch.

use crate::context::SerializerContext;
use crate::descriptor::{deserializer, matcher, serializer, PropertyDescriptor, TypeDescriptor};
use crate::error::SoapError;
use crate::metadata::LayoutKind;
use crate::registry::TypeRegistry;
use crate::value::{Object, TypeName, Value};
use crate::xml::{ElementInfo, XmlCursor, XmlSink};
use std::sync::Arc;
use tracing::debug;

/// Build the descriptor of a sequence type. `properties` already holds the
/// inherited properties, most-base first.
pub(crate) fn compile(
    name: TypeName,
    properties: Vec<PropertyDescriptor>,
    subtypes: Vec<TypeName>,
    is_abstract: bool,
) -> TypeDescriptor {
    let properties: Arc<[PropertyDescriptor]> = Arc::from(properties);

    let serialize = {
        let owner = name.clone();
        let properties = Arc::clone(&properties);
        serializer(move |registry, value, sink, ctx| {
            let object = value.as_object().ok_or_else(|| {
                SoapError::Validation(format!(
                    "expected an object of type `{}`, found {}",
                    owner,
                    value.kind_name()
                ))
            })?;
            let absent = Value::Null;
            for property in properties.iter() {
                let field = object.get(&property.name).unwrap_or(&absent);
                write_property(registry, &owner, property, field, sink, ctx)?;
            }
            Ok(())
        })
    };

    let deserialize = if is_abstract {
        let owner = name.clone();
        deserializer(move |_, _, _| {
            Err(SoapError::Configuration(format!(
                "type `{}` is abstract and cannot be decoded without an xsi:type naming a concrete subtype",
                owner
            )))
        })
    } else {
        let owner = name.clone();
        let properties = Arc::clone(&properties);
        deserializer(move |registry, cursor, ctx| {
            let mut fields = Vec::with_capacity(properties.len());
            for property in properties.iter() {
                let value = read_property(registry, &owner, property, cursor, ctx)?;
                fields.push((property.name.clone(), value));
            }
            Ok(Value::Object(Object::with_fields(owner.clone(), fields)))
        })
    };

    let matches = {
        let properties = Arc::clone(&properties);
        matcher(move |registry, element| match properties.first() {
            Some(first) => property_starts_at(registry, first, element),
            None => Ok(false),
        })
    };

    TypeDescriptor {
        name,
        layout: LayoutKind::Sequence,
        properties,
        variants: Arc::from(Vec::new()),
        subtypes,
        is_abstract,
        serialize,
        deserialize,
        matches,
    }
}

fn write_property(
    registry: &TypeRegistry,
    owner: &TypeName,
    property: &PropertyDescriptor,
    value: &Value,
    sink: &mut XmlSink<'_>,
    ctx: &mut SerializerContext,
) -> Result<(), SoapError> {
    if !property.repeated {
        return write_single(registry, owner, property, value, sink, ctx);
    }
    match value {
        Value::Null => Ok(()),
        Value::List(items) => {
            for item in items {
                write_single(registry, owner, property, item, sink, ctx)?;
            }
            Ok(())
        }
        other => Err(SoapError::Validation(format!(
            "property `{}` of `{}` is repeated and expects a list, found {}",
            property.name,
            owner,
            other.kind_name()
        ))),
    }
}

fn write_single(
    registry: &TypeRegistry,
    owner: &TypeName,
    property: &PropertyDescriptor,
    value: &Value,
    sink: &mut XmlSink<'_>,
    ctx: &mut SerializerContext,
) -> Result<(), SoapError> {
    if value.is_null() {
        if property.nilable {
            sink.start_element(&property.name)?;
            sink.write_nil()?;
            return sink.end_element();
        }
        if property.optional {
            return Ok(());
        }
        return Err(SoapError::Validation(format!(
            "property `{}` of `{}` is required but has no value",
            property.name, owner
        )));
    }

    let nested = registry.get_or_compile(&property.type_name)?;
    if property.content || nested.is_choice() {
        return nested.serialize(registry, value, sink, ctx);
    }
    write_wrapped(registry, &property.name, &nested, value, sink, ctx)
}

fn read_property(
    registry: &TypeRegistry,
    owner: &TypeName,
    property: &PropertyDescriptor,
    cursor: &mut XmlCursor<'_>,
    ctx: &mut SerializerContext,
) -> Result<Value, SoapError> {
    let nested = registry.get_or_compile(&property.type_name)?;

    if property.repeated {
        let mut items = Vec::new();
        while let Some(element) = cursor.peek_start()? {
            if !property_starts_at(registry, property, &element)? {
                break;
            }
            items.push(read_single(registry, owner, property, &nested, cursor, ctx)?);
        }
        return Ok(Value::List(items));
    }

    if property.optional {
        match cursor.peek_start()? {
            Some(element) if property_starts_at(registry, property, &element)? => {}
            _ => return Ok(Value::Null),
        }
    }

    read_single(registry, owner, property, &nested, cursor, ctx)
}

fn read_single(
    registry: &TypeRegistry,
    owner: &TypeName,
    property: &PropertyDescriptor,
    nested: &Arc<TypeDescriptor>,
    cursor: &mut XmlCursor<'_>,
    ctx: &mut SerializerContext,
) -> Result<Value, SoapError> {
    if property.content && !nested.is_choice() {
        return nested.deserialize(registry, cursor, ctx);
    }

    let element = cursor.peek_start()?.ok_or_else(|| {
        SoapError::Parse(format!(
            "missing required element `<{}>` in `{}`",
            property.name, owner
        ))
    })?;

    if nested.is_choice() {
        // a nil choice keeps the property's own element name
        if element.local_name == property.name && element.is_nil() {
            return read_wrapped(registry, owner, property.nilable, nested, cursor, ctx);
        }
        return nested.deserialize(registry, cursor, ctx);
    }

    if element.local_name != property.name {
        return Err(SoapError::Parse(format!(
            "unexpected element `<{}>`, expected `<{}>` in `{}`",
            element.local_name, property.name, owner
        )));
    }
    read_wrapped(registry, owner, property.nilable, nested, cursor, ctx)
}

/// Whether `element` can start a value of `property`.
fn property_starts_at(
    registry: &TypeRegistry,
    property: &PropertyDescriptor,
    element: &ElementInfo,
) -> Result<bool, SoapError> {
    if element.local_name == property.name {
        return Ok(true);
    }
    let nested = registry.get_or_compile(&property.type_name)?;
    if nested.is_choice() || property.content {
        return nested.matches_element(registry, element);
    }
    Ok(false)
}

/// Write `value` inside an element named `element`, with `xsi:nil` for null
/// and `xsi:type` when the runtime type is a registered subtype.
pub(crate) fn write_wrapped(
    registry: &TypeRegistry,
    element: &str,
    declared: &TypeDescriptor,
    value: &Value,
    sink: &mut XmlSink<'_>,
    ctx: &mut SerializerContext,
) -> Result<(), SoapError> {
    sink.start_element(element)?;
    if value.is_null() {
        sink.write_nil()?;
        return sink.end_element();
    }
    match subtype_for_value(registry, declared, value)? {
        Some(subtype) => {
            sink.write_xsi_type(subtype.name())?;
            subtype.serialize(registry, value, sink, ctx)?;
        }
        None => declared.serialize(registry, value, sink, ctx)?,
    }
    sink.end_element()
}

/// Consume the element at the cursor and decode its content as `declared`
/// or the subtype named by its `xsi:type`.
pub(crate) fn read_wrapped(
    registry: &TypeRegistry,
    owner: &TypeName,
    nilable: bool,
    declared: &Arc<TypeDescriptor>,
    cursor: &mut XmlCursor<'_>,
    ctx: &mut SerializerContext,
) -> Result<Value, SoapError> {
    let element = cursor.expect_start()?;
    if element.is_nil() {
        if !nilable {
            return Err(SoapError::Validation(format!(
                "element `<{}>` in `{}` is marked xsi:nil but is not nilable",
                element.local_name, owner
            )));
        }
        cursor.skip_to_end()?;
        return Ok(Value::Null);
    }
    let target = runtime_type(registry, declared, &element)?;
    let value = target.deserialize(registry, cursor, ctx)?;
    cursor.finish_element()?;
    Ok(value)
}

fn subtype_for_value(
    registry: &TypeRegistry,
    declared: &TypeDescriptor,
    value: &Value,
) -> Result<Option<Arc<TypeDescriptor>>, SoapError> {
    if declared.subtypes().is_empty() {
        return Ok(None);
    }
    let Some(object) = value.as_object() else {
        return Ok(None);
    };
    let runtime = object.type_name();
    if runtime == declared.name() {
        return Ok(None);
    }
    match declared.subtypes().iter().find(|s| *s == runtime) {
        Some(subtype) => registry.get_or_compile(subtype).map(Some),
        None => {
            debug!(
                declared = %declared.name(),
                runtime = %runtime,
                "Runtime type is not a registered subtype, writing declared type"
            );
            Ok(None)
        }
    }
}

fn runtime_type(
    registry: &TypeRegistry,
    declared: &Arc<TypeDescriptor>,
    element: &ElementInfo,
) -> Result<Arc<TypeDescriptor>, SoapError> {
    let Some(xsi_type) = &element.xsi_type else {
        return Ok(Arc::clone(declared));
    };
    // A bare name is written for no-namespace types, so a default xmlns in
    // scope may have qualified it on the way back in.
    let matches = |candidate: &TypeName| {
        candidate == xsi_type
            || (element.xsi_type_unprefixed
                && candidate.namespace.is_empty()
                && candidate.local == xsi_type.local)
    };
    if matches(declared.name()) {
        return Ok(Arc::clone(declared));
    }
    let subtype = declared.subtypes().iter().find(|s| matches(s));
    match subtype {
        Some(subtype) => registry.get_or_compile(subtype),
        None => Err(SoapError::TypeResolution(format!(
            "xsi:type `{}` on `<{}>` is not a registered subtype of `{}`",
            xsi_type,
            element.local_name,
            declared.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PropertyMetadata, SchemaSet, TypeMetadata};
    use crate::xml::XSI_NS;

    fn tn(local: &str) -> TypeName {
        TypeName::new("urn:test", local)
    }

    fn registry() -> TypeRegistry {
        let schema = SchemaSet::new()
            .with_type(
                tn("Pair"),
                TypeMetadata::sequence(vec![
                    PropertyMetadata::new("A", TypeName::xsd("int")),
                    PropertyMetadata::new("B", TypeName::xsd("int")),
                ]),
            )
            .with_type(
                tn("Holder"),
                TypeMetadata::sequence(vec![
                    PropertyMetadata::new("Note", TypeName::xsd("string")).nilable()
                ]),
            )
            .with_type(
                tn("Base"),
                TypeMetadata::sequence(vec![PropertyMetadata::new("Name", TypeName::xsd("string"))])
                    .with_subtypes(vec![tn("Derived")]),
            )
            .with_type(
                tn("Derived"),
                TypeMetadata::sequence(vec![PropertyMetadata::new("Extra", TypeName::xsd("int"))])
                    .extending(tn("Base")),
            )
            .with_type(
                tn("Box"),
                TypeMetadata::sequence(vec![PropertyMetadata::new("Item", tn("Base"))]),
            )
            .with_type(
                tn("Bag"),
                TypeMetadata::sequence(vec![
                    PropertyMetadata::new("Tag", TypeName::xsd("string")).repeated(),
                    PropertyMetadata::new("Label", TypeName::xsd("string")).optional(),
                ]),
            );
        TypeRegistry::new(schema)
    }

    fn write(registry: &TypeRegistry, element: &str, ty: &TypeName, value: &Value) -> String {
        let mut out = Vec::new();
        let mut ctx = SerializerContext::new();
        {
            let mut sink = XmlSink::new(&mut out);
            registry.write_element(element, ty, value, &mut sink, &mut ctx).unwrap();
            sink.finish().unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    fn read(registry: &TypeRegistry, element: &str, ty: &TypeName, xml: &str) -> Result<Value, SoapError> {
        let mut ctx = SerializerContext::new();
        let mut cursor = XmlCursor::new(xml.as_bytes());
        registry.read_element(element, ty, &mut cursor, &mut ctx)
    }

    #[test]
    fn test_properties_written_in_order() {
        let registry = registry();
        let pair = Object::new(tn("Pair")).with("B", 2).with("A", 1);
        let xml = write(&registry, "S", &tn("Pair"), &pair.into());
        assert_eq!(xml, "<S><A>1</A><B>2</B></S>");

        let value = read(&registry, "S", &tn("Pair"), &xml).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.type_name(), &tn("Pair"));
        assert_eq!(object.get("A"), Some(&Value::Int(1)));
        assert_eq!(object.get("B"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_out_of_order_and_missing_elements() {
        let registry = registry();
        let err = read(&registry, "S", &tn("Pair"), "<S><B>2</B><A>1</A></S>").unwrap_err();
        assert!(matches!(err, SoapError::Parse(_)));
        assert!(err.to_string().contains("expected `<A>`"));

        let err = read(&registry, "S", &tn("Pair"), "<S><A>1</A></S>").unwrap_err();
        assert!(err.to_string().contains("missing required element `<B>`"));
    }

    #[test]
    fn test_trailing_element_rejected() {
        let registry = registry();
        let err = read(&registry, "S", &tn("Pair"), "<S><A>1</A><B>2</B><C/></S>").unwrap_err();
        assert!(err.to_string().contains("unexpected element `<C>`"));
    }

    #[test]
    fn test_nil_round_trip() {
        let registry = registry();
        let holder = Object::new(tn("Holder")).with("Note", Value::Null);
        let xml = write(&registry, "H", &tn("Holder"), &holder.into());
        assert_eq!(
            xml,
            format!(r#"<H><Note xmlns:xsi="{}" xsi:nil="true"/></H>"#, XSI_NS)
        );

        let value = read(&registry, "H", &tn("Holder"), &xml).unwrap();
        assert_eq!(value.as_object().unwrap().get("Note"), Some(&Value::Null));
    }

    #[test]
    fn test_nil_on_required_property() {
        let registry = registry();
        let xml = format!(
            r#"<S xmlns:xsi="{}"><A xsi:nil="true"/><B>2</B></S>"#,
            XSI_NS
        );
        let err = read(&registry, "S", &tn("Pair"), &xml).unwrap_err();
        assert!(matches!(err, SoapError::Validation(_)));

        let mut ctx = SerializerContext::new();
        let mut out = Vec::new();
        let mut sink = XmlSink::new(&mut out);
        let missing = Object::new(tn("Pair")).with("A", 1);
        let err = registry
            .write_element("S", &tn("Pair"), &missing.into(), &mut sink, &mut ctx)
            .unwrap_err();
        assert!(err.to_string().contains("property `B`"));
    }

    #[test]
    fn test_subtype_written_with_xsi_type() {
        let registry = registry();
        let derived = Object::new(tn("Derived")).with("Name", "n").with("Extra", 5);
        let boxed = Object::new(tn("Box")).with("Item", derived);
        let xml = write(&registry, "Box", &tn("Box"), &boxed.into());
        assert!(xml.contains(r#"xsi:type="tns:Derived""#));
        assert!(xml.contains("<Name>n</Name><Extra>5</Extra>"));

        let value = read(&registry, "Box", &tn("Box"), &xml).unwrap();
        let item = value.as_object().unwrap().get("Item").unwrap().as_object().unwrap();
        assert_eq!(item.type_name(), &tn("Derived"));
        assert_eq!(item.get("Extra"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_base_value_has_no_xsi_type() {
        let registry = registry();
        let base = Object::new(tn("Base")).with("Name", "plain");
        let boxed = Object::new(tn("Box")).with("Item", base);
        let xml = write(&registry, "Box", &tn("Box"), &boxed.into());
        assert_eq!(xml, "<Box><Item><Name>plain</Name></Item></Box>");
    }

    #[test]
    fn test_unrelated_xsi_type_rejected() {
        let registry = registry();
        let xml = format!(
            r#"<Box xmlns:xsi="{}" xmlns:t="urn:test"><Item xsi:type="t:Pair"><A>1</A><B>2</B></Item></Box>"#,
            XSI_NS
        );
        let err = read(&registry, "Box", &tn("Box"), &xml).unwrap_err();
        assert!(matches!(err, SoapError::TypeResolution(_)));
    }

    #[test]
    fn test_unqualified_subtype_under_default_namespace() {
        let local = |name: &str| TypeName::new("", name);
        let registry = TypeRegistry::new(
            SchemaSet::new()
                .with_type(
                    local("Shape"),
                    TypeMetadata::sequence(vec![PropertyMetadata::new("Name", TypeName::xsd("string"))])
                        .with_subtypes(vec![local("Circle")]),
                )
                .with_type(
                    local("Circle"),
                    TypeMetadata::sequence(vec![PropertyMetadata::new("Radius", TypeName::xsd("int"))])
                        .extending(local("Shape")),
                )
                .with_type(
                    local("Drawing"),
                    TypeMetadata::sequence(vec![PropertyMetadata::new("Item", local("Shape"))]),
                ),
        );
        let circle = Object::new(local("Circle")).with("Name", "c").with("Radius", 3);
        let drawing = Object::new(local("Drawing")).with("Item", circle);
        let xml = write(&registry, "Drawing", &local("Drawing"), &drawing.into());
        assert!(xml.contains(r#"xsi:type="Circle""#));

        let wrapped = xml.replacen("<Drawing>", r#"<Drawing xmlns="urn:envelope">"#, 1);
        let value = read(&registry, "Drawing", &local("Drawing"), &wrapped).unwrap();
        let item = value.as_object().unwrap().get("Item").unwrap().as_object().unwrap();
        assert_eq!(item.type_name(), &local("Circle"));
        assert_eq!(item.get("Radius"), Some(&Value::Int(3)));

        let prefixed = wrapped
            .replacen(r#"xmlns="urn:envelope""#, r#"xmlns="urn:envelope" xmlns:e="urn:envelope""#, 1)
            .replacen(r#"xsi:type="Circle""#, r#"xsi:type="e:Circle""#, 1);
        let err = read(&registry, "Drawing", &local("Drawing"), &prefixed).unwrap_err();
        assert!(matches!(err, SoapError::TypeResolution(_)));
    }

    #[test]
    fn test_repeated_and_optional_properties() {
        let registry = registry();
        let bag = Object::new(tn("Bag"))
            .with("Tag", Value::List(vec!["a".into(), "b".into()]))
            .with("Label", Value::Null);
        let xml = write(&registry, "Bag", &tn("Bag"), &bag.into());
        assert_eq!(xml, "<Bag><Tag>a</Tag><Tag>b</Tag></Bag>");

        let value = read(&registry, "Bag", &tn("Bag"), "<Bag><Tag>x</Tag><Label>l</Label></Bag>").unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.get("Tag"), Some(&Value::List(vec!["x".into()])));
        assert_eq!(object.get("Label"), Some(&Value::String("l".to_string())));

        let value = read(&registry, "Bag", &tn("Bag"), "<Bag/>").unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.get("Tag"), Some(&Value::List(Vec::new())));
        assert_eq!(object.get("Label"), Some(&Value::Null));
    }

    #[test]
    fn test_repeated_property_requires_list() {
        let registry = registry();
        let bag = Object::new(tn("Bag")).with("Tag", "single");
        let mut ctx = SerializerContext::new();
        let mut out = Vec::new();
        let mut sink = XmlSink::new(&mut out);
        let err = registry
            .write_element("Bag", &tn("Bag"), &bag.into(), &mut sink, &mut ctx)
            .unwrap_err();
        assert!(matches!(err, SoapError::Validation(_)));
    }
}
