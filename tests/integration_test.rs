//! Integration tests for the zentinel-soap-codec crate.
//!
//! These tests exercise the public API end-to-end: compiling descriptors from
//! schema metadata, encoding and decoding messages, and moving attachments
//! through the multipart transport.

use chrono::DateTime;
use std::io::BufReader;
use zentinel_soap_codec::config::{AttachmentReference, CodecConfig};
use zentinel_soap_codec::error::ErrorKind;
use zentinel_soap_codec::multipart::TransferEncoding;
use zentinel_soap_codec::registry;
use zentinel_soap_codec::{
    read_multipart, BinaryContent, ChoiceValue, Decimal, MultipartWriter, Object,
    PropertyMetadata, SchemaSet, SerializerContext, SoapError, TypeMetadata, TypeName,
    TypeRegistry, Value, VariantMetadata, XmlCursor, XmlSink,
};

const NS: &str = "urn:zentinel:orders";

// ============================================================================
// Helpers
// ============================================================================

fn tn(local: &str) -> TypeName {
    TypeName::new(NS, local)
}

fn order_schema() -> SchemaSet {
    SchemaSet::new()
        .with_type(
            tn("Order"),
            TypeMetadata::sequence(vec![
                PropertyMetadata::new("Id", TypeName::xsd("long")),
                PropertyMetadata::new("Placed", TypeName::xsd("dateTime")),
                PropertyMetadata::new("Total", TypeName::xsd("decimal")),
                PropertyMetadata::new("Rush", TypeName::xsd("boolean")),
                PropertyMetadata::new("Note", TypeName::xsd("string")).nilable(),
                PropertyMetadata::new("Payment", tn("Payment")),
                PropertyMetadata::new("Line", tn("Line")).repeated(),
                PropertyMetadata::new("Document", TypeName::xsd("base64Binary")).nilable(),
            ]),
        )
        .with_type(
            tn("Line"),
            TypeMetadata::sequence(vec![
                PropertyMetadata::new("Sku", TypeName::xsd("string")),
                PropertyMetadata::new("Quantity", TypeName::xsd("int")),
            ])
            .with_subtypes(vec![tn("GiftLine")]),
        )
        .with_type(
            tn("GiftLine"),
            TypeMetadata::sequence(vec![PropertyMetadata::new("Message", TypeName::xsd("string"))])
                .extending(tn("Line")),
        )
        .with_type(
            tn("Payment"),
            TypeMetadata::choice(vec![
                VariantMetadata::element(1, "Card", tn("Card")),
                VariantMetadata::element(2, "Invoice", TypeName::xsd("string")),
            ]),
        )
        .with_type(
            tn("Card"),
            TypeMetadata::sequence(vec![
                PropertyMetadata::new("Holder", TypeName::xsd("string")),
                PropertyMetadata::new("Expires", tn("Month")),
            ]),
        )
        .with_type(tn("Month"), TypeMetadata::simple(TypeName::xsd("token")))
        .with_type(
            tn("Scan"),
            TypeMetadata::sequence(vec![PropertyMetadata::new(
                "Data",
                TypeName::xsd("base64Binary"),
            )]),
        )
}

fn sample_order(document: Value) -> Value {
    let card = Object::new(tn("Card"))
        .with("Holder", "A. Customer")
        .with("Expires", "2027-09");
    let lines = vec![
        Object::new(tn("Line")).with("Sku", "SKU-1").with("Quantity", 2).into(),
        Object::new(tn("GiftLine"))
            .with("Sku", "SKU-2")
            .with("Quantity", 1)
            .with("Message", "Happy birthday <3")
            .into(),
    ];
    Object::new(tn("Order"))
        .with("Id", 9_000_000_001i64)
        .with(
            "Placed",
            Value::DateTime(DateTime::parse_from_rfc3339("2024-05-01T10:00:00+02:00").unwrap()),
        )
        .with(
            "Total",
            Value::Decimal("12345678901234567890.25".parse::<Decimal>().unwrap()),
        )
        .with("Rush", true)
        .with("Note", Value::Null)
        .with("Payment", ChoiceValue::new(1, card))
        .with("Line", Value::List(lines))
        .with("Document", document)
        .into()
}

fn encode(registry: &TypeRegistry, value: &Value, ctx: &mut SerializerContext) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut sink = XmlSink::new(&mut out);
        registry
            .write_element("Order", &tn("Order"), value, &mut sink, ctx)
            .unwrap();
        sink.finish().unwrap();
    }
    out
}

fn decode(registry: &TypeRegistry, xml: &[u8], ctx: &mut SerializerContext) -> Result<Value, SoapError> {
    let mut cursor = XmlCursor::new(xml);
    registry.read_element("Order", &tn("Order"), &mut cursor, ctx)
}

fn document_bytes(order: &Value) -> Vec<u8> {
    order
        .as_object()
        .and_then(|o| o.get("Document"))
        .and_then(Value::as_binary)
        .unwrap()
        .read_all()
        .unwrap()
}

/// Compare everything but the binary document, whose content-id is not
/// carried by inline encoding.
fn assert_same_order(decoded: &Value, original: &Value) {
    let decoded = decoded.as_object().unwrap();
    let original = original.as_object().unwrap();
    assert_eq!(decoded.type_name(), original.type_name());
    for (name, value) in original.fields() {
        if name == "Document" {
            continue;
        }
        assert_eq!(decoded.get(name), Some(value), "field {}", name);
    }
}

// ============================================================================
// Inline encoding
// ============================================================================

#[test]
fn test_inline_round_trip() {
    let registry = TypeRegistry::new(order_schema());
    let order = sample_order(BinaryContent::from_bytes(b"%PDF-1.7 scanned order".to_vec()).into());

    let mut ctx = SerializerContext::new();
    let xml = encode(&registry, &order, &mut ctx);
    assert!(ctx.is_empty());

    let text = String::from_utf8(xml.clone()).unwrap();
    assert!(text.starts_with("<Order><Id>9000000001</Id>"));
    assert!(text.contains("<Placed>2024-05-01T10:00:00+02:00</Placed>"));
    assert!(text.contains("<Total>12345678901234567890.25</Total>"));
    assert!(text.contains("<Card><Holder>A. Customer</Holder><Expires>2027-09</Expires></Card>"));
    assert!(text.contains(r#"xsi:type="tns:GiftLine""#));
    assert!(text.contains("Happy birthday &lt;3"));

    let decoded = decode(&registry, &xml, &mut SerializerContext::new()).unwrap();
    assert_same_order(&decoded, &order);
    assert_eq!(document_bytes(&decoded), b"%PDF-1.7 scanned order");
}

#[test]
fn test_small_encode_chunks() {
    let config = CodecConfig::from_yaml("binary:\n  encode_chunk_size: 3\n").unwrap();
    let registry = TypeRegistry::new(order_schema());
    let payload: Vec<u8> = (0u8..100).collect();
    let order = sample_order(BinaryContent::from_bytes(payload.clone()).into());

    let mut ctx = SerializerContext::from_config(&config.binary);
    assert_eq!(ctx.encode_chunk_size(), 3);
    let xml = encode(&registry, &order, &mut ctx);

    let decoded = decode(&registry, &xml, &mut SerializerContext::new()).unwrap();
    assert_eq!(document_bytes(&decoded), payload);
}

#[test]
fn test_nil_document_round_trip() {
    let registry = TypeRegistry::new(order_schema());
    let order = sample_order(Value::Null);
    let mut ctx = SerializerContext::multipart(AttachmentReference::XopInclude);
    let xml = encode(&registry, &order, &mut ctx);
    assert!(ctx.is_empty());

    let decoded = decode(&registry, &xml, &mut SerializerContext::new()).unwrap();
    assert_eq!(decoded.as_object().unwrap().get("Document"), Some(&Value::Null));
}

// ============================================================================
// Attachments over multipart
// ============================================================================

fn multipart_round_trip(reference: AttachmentReference, encoding: TransferEncoding) {
    let registry = TypeRegistry::new(order_schema());
    let content = BinaryContent::from_bytes(vec![0xAB; 4096]);
    let order = sample_order(content.clone().into());

    let mut ctx = SerializerContext::multipart(reference);
    let xml = encode(&registry, &order, &mut ctx);
    let text = String::from_utf8(xml.clone()).unwrap();
    let href = format!(r#"href="cid:{}""#, content.content_id());
    assert!(text.contains(&href));
    match reference {
        AttachmentReference::XopInclude => assert!(text.contains("<xop:Include")),
        AttachmentReference::Href => assert!(!text.contains("xop:Include")),
    }

    let writer = MultipartWriter::new().with_encoding(encoding);
    let mut body = Vec::new();
    writer
        .write(&mut body, &xml, "application/xop+xml", &ctx.take_attachments())
        .unwrap();

    let envelope = read_multipart(body.as_slice(), &writer.content_type("application/xop+xml")).unwrap();
    assert_eq!(envelope.attachments().len(), 1);

    let mut incoming = SerializerContext::new();
    let primary = envelope.populate(&mut incoming).unwrap();
    assert!(incoming.is_multipart());

    let mut cursor = XmlCursor::new(BufReader::new(primary));
    let decoded = registry
        .read_element("Order", &tn("Order"), &mut cursor, &mut incoming)
        .unwrap();
    assert_same_order(&decoded, &order);

    let document = decoded.as_object().unwrap().get("Document").unwrap();
    assert_eq!(document.as_binary(), Some(&content));
}

#[test]
fn test_mtom_round_trip() {
    multipart_round_trip(AttachmentReference::XopInclude, TransferEncoding::Binary);
}

#[test]
fn test_href_round_trip_base64_parts() {
    multipart_round_trip(AttachmentReference::Href, TransferEncoding::Base64);
}

#[test]
fn test_unknown_content_part() {
    let registry = TypeRegistry::new(order_schema());
    let xml = r#"<Scan><Data><xop:Include xmlns:xop="http://www.w3.org/2004/08/xop/include" href="cid:nope"/></Data></Scan>"#;
    let mut ctx = SerializerContext::multipart(AttachmentReference::XopInclude);
    let mut cursor = XmlCursor::new(xml.as_bytes());
    let err = registry
        .read_element("Scan", &tn("Scan"), &mut cursor, &mut ctx)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Attachment);
    assert!(err.to_string().contains("unknown content part"));
}

#[test]
fn test_percent_encoded_reference() {
    let registry = TypeRegistry::new(order_schema());
    let mut ctx = SerializerContext::new();
    ctx.add_attachment(BinaryContent::from_bytes(b"scan".to_vec()).with_content_id("scan 1@host"))
        .unwrap();

    let xml = r#"<Scan><Data href="cid:scan%201%40host"/></Scan>"#;
    let mut cursor = XmlCursor::new(xml.as_bytes());
    let value = registry
        .read_element("Scan", &tn("Scan"), &mut cursor, &mut ctx)
        .unwrap();
    let data = value.as_object().unwrap().get("Data").unwrap();
    assert_eq!(data.as_binary().unwrap().read_all().unwrap(), b"scan");
}

// ============================================================================
// Errors and registry
// ============================================================================

#[test]
fn test_error_kinds() {
    let registry = TypeRegistry::new(order_schema());
    let mut ctx = SerializerContext::new();

    let err = decode(&registry, b"<Order><Placed/></Order>", &mut ctx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert_eq!(err.kind().as_str(), "PARSE_ERROR");

    let err = registry.get_or_compile(&tn("Missing")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let err = registry
        .get_or_compile(&TypeName::xsd("gYearMonth"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeResolution);

    let mut out = Vec::new();
    let mut sink = XmlSink::new(&mut out);
    let incomplete: Value = Object::new(tn("Card")).with("Holder", "x").into();
    let err = registry
        .write_element("Card", &tn("Card"), &incomplete, &mut sink, &mut ctx)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn test_wrong_root_element() {
    let registry = TypeRegistry::new(order_schema());
    let err = decode(&registry, b"<Invoice/>", &mut SerializerContext::new()).unwrap_err();
    assert!(err.to_string().contains("expected `<Order>`"));
}

#[test]
fn test_global_registry() {
    let installed = registry::install_global(order_schema());
    let again = registry::install_global(SchemaSet::new());
    assert!(std::ptr::eq(installed, again));

    let global = registry::global().unwrap();
    assert!(global.get_or_compile(&tn("Order")).is_ok());
}
