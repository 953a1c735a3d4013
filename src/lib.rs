//! SOAP/XML message codec for Zentinel
//!
//! Maps between wire XML and typed in-memory values, and carries binary
//! payloads either inline (base64) or as `multipart/related` (SwA/MTOM)
//! attachments.
//!
//! # Features
//!
//! - Per-type codec descriptors compiled lazily from schema metadata
//! - Sequence and choice layouts, nilability, optional and repeated properties
//! - Polymorphic subtype dispatch via `xsi:type`
//! - Binary content streamed as chunked base64 or referenced by content-id
//! - Streaming multipart reader with bounded line buffering
//!
//! # Example
//!
//! ```ignore
//! use zentinel_soap_codec::{read_multipart, SchemaSet, SerializerContext, TypeRegistry, XmlCursor};
//!
//! let registry = TypeRegistry::new(schema);
//! let envelope = read_multipart(response, &content_type)?;
//! let mut ctx = SerializerContext::new();
//! let body = std::io::BufReader::new(envelope.populate(&mut ctx)?);
//! let mut cursor = XmlCursor::new(body);
//! let value = registry.read_element("Order", &order_type, &mut cursor, &mut ctx)?;
//! ```

pub mod binary;
mod choice;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod metadata;
pub mod multipart;
pub mod primitive;
pub mod registry;
mod sequence;
pub mod value;
pub mod xml;

pub use binary::BinaryContent;
pub use config::{AttachmentReference, CodecConfig};
pub use context::SerializerContext;
pub use descriptor::TypeDescriptor;
pub use error::{ErrorKind, SoapError};
pub use metadata::{
    LayoutKind, MetadataSource, PropertyMetadata, SchemaSet, TypeMetadata, VariantMetadata,
};
pub use multipart::{read_multipart, MultipartReader, MultipartWriter, PrimaryPart};
pub use registry::TypeRegistry;
pub use value::{ChoiceValue, Decimal, Object, TypeName, Value};
pub use xml::{XmlCursor, XmlSink};
