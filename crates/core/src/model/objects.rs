//! PDF object types.
//!
//! Dictionaries keep insertion order and always use name keys; cross-object
//! links are `PDFObjRef` values resolved through the owning document, never
//! embedded references to other objects.

use super::text::{StringEncoding, decode_text, detect_encoding, encode_text};
use crate::error::{PdfError, Result};
use bytes::Bytes;
use indexmap::IndexMap;

/// Dictionary: name -> object, insertion ordered, last write wins.
pub type PDFDict = IndexMap<String, PDFObject>;

/// PDF Object types - the fundamental value type in PDF.
#[derive(Debug, Clone, PartialEq)]
pub enum PDFObject {
    /// Null object
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Real (floating point) value
    Real(f64),
    /// Name object (e.g., /Type, /Font)
    Name(String),
    /// String, literal or hex
    String(PDFString),
    /// Array of objects
    Array(Vec<Self>),
    /// Dictionary (name -> object mapping)
    Dict(PDFDict),
    /// Stream (dictionary + binary data)
    Stream(Box<PDFStream>),
    /// Indirect object reference
    Ref(PDFObjRef),
}

impl PDFObject {
    /// Build a name object.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Build a string object from raw bytes.
    pub fn string(bytes: impl Into<Vec<u8>>) -> Self {
        Self::String(PDFString::from_bytes(bytes))
    }

    /// Check if this is a null object
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get as boolean
    pub const fn as_bool(&self) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            _ => Err(PdfError::TypeError {
                expected: "bool",
                got: self.type_name(),
            }),
        }
    }

    /// Get as integer
    pub const fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "int",
                got: self.type_name(),
            }),
        }
    }

    /// Get as real (float)
    pub const fn as_real(&self) -> Result<f64> {
        match self {
            Self::Real(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "real",
                got: self.type_name(),
            }),
        }
    }

    /// Get numeric value (int or real coerced to f64)
    pub const fn as_num(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(PdfError::TypeError {
                expected: "number",
                got: self.type_name(),
            }),
        }
    }

    /// Get as name string
    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "name",
                got: self.type_name(),
            }),
        }
    }

    /// Get as string object
    pub fn as_string(&self) -> Result<&PDFString> {
        match self {
            Self::String(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "string",
                got: self.type_name(),
            }),
        }
    }

    /// Get the raw bytes of a string object
    pub fn as_bytes(&self) -> Result<&[u8]> {
        self.as_string().map(PDFString::as_bytes)
    }

    /// Get as array
    pub const fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(PdfError::TypeError {
                expected: "array",
                got: self.type_name(),
            }),
        }
    }

    /// Get as dictionary
    pub const fn as_dict(&self) -> Result<&PDFDict> {
        match self {
            Self::Dict(d) => Ok(d),
            _ => Err(PdfError::TypeError {
                expected: "dict",
                got: self.type_name(),
            }),
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Result<&PDFStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(PdfError::TypeError {
                expected: "stream",
                got: self.type_name(),
            }),
        }
    }

    /// Get as object reference
    pub const fn as_objref(&self) -> Result<PDFObjRef> {
        match self {
            Self::Ref(r) => Ok(*r),
            _ => Err(PdfError::TypeError {
                expected: "ref",
                got: self.type_name(),
            }),
        }
    }

    /// Whether this object holds a string or stream anywhere in its tree.
    pub fn contains_encryptable(&self) -> bool {
        match self {
            Self::String(_) | Self::Stream(_) => true,
            Self::Array(arr) => arr.iter().any(Self::contains_encryptable),
            Self::Dict(dict) => dict.values().any(Self::contains_encryptable),
            _ => false,
        }
    }

    /// Get type name for error messages
    pub(crate) const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "ref",
        }
    }
}

impl From<bool> for PDFObject {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PDFObject {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PDFObject {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for PDFObject {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<PDFString> for PDFObject {
    fn from(value: PDFString) -> Self {
        Self::String(value)
    }
}

impl From<Vec<PDFObject>> for PDFObject {
    fn from(value: Vec<PDFObject>) -> Self {
        Self::Array(value)
    }
}

impl From<PDFDict> for PDFObject {
    fn from(value: PDFDict) -> Self {
        Self::Dict(value)
    }
}

impl From<PDFStream> for PDFObject {
    fn from(value: PDFStream) -> Self {
        Self::Stream(Box::new(value))
    }
}

impl From<PDFObjRef> for PDFObject {
    fn from(value: PDFObjRef) -> Self {
        Self::Ref(value)
    }
}

/// PDF string: the bytes as they appear in the file plus the text encoding
/// detected from them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PDFString {
    bytes: Vec<u8>,
    encoding: StringEncoding,
}

impl PDFString {
    /// Wrap raw (already decrypted) bytes, detecting their text encoding.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        let encoding = detect_encoding(&bytes);
        Self { bytes, encoding }
    }

    /// Encode text as PDFDocEncoding when possible, else UTF-16BE with BOM.
    pub fn from_text(text: &str) -> Self {
        let (bytes, encoding) = encode_text(text);
        Self { bytes, encoding }
    }

    /// The original, undecoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub const fn encoding(&self) -> StringEncoding {
        self.encoding
    }

    /// Logical text value; `None` for binary strings.
    pub fn text(&self) -> Option<String> {
        decode_text(&self.bytes, self.encoding)
    }

    /// Text value, falling back to a lossy Latin-1 view of binary data.
    pub fn to_string_lossy(&self) -> String {
        self.text()
            .unwrap_or_else(|| self.bytes.iter().map(|&b| char::from(b)).collect())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// PDF indirect object reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PDFObjRef {
    /// Object ID
    pub objid: u32,
    /// Generation number
    pub genno: u32,
}

impl PDFObjRef {
    /// Create a new object reference.
    pub const fn new(objid: u32, genno: u32) -> Self {
        Self { objid, genno }
    }
}

impl std::fmt::Display for PDFObjRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} R", self.objid, self.genno)
    }
}

/// PDF Stream - dictionary attributes + binary data.
#[derive(Debug, Clone, PartialEq)]
pub struct PDFStream {
    /// Stream dictionary attributes
    pub attrs: PDFDict,
    /// Raw (possibly encrypted and encoded) data
    rawdata: Bytes,
    /// Whether rawdata has already been decrypted
    rawdata_decrypted: bool,
    /// Owning indirect object, set when the stream is part of a document
    pub objref: Option<PDFObjRef>,
}

impl PDFStream {
    /// Create a new stream.
    pub fn new(attrs: PDFDict, rawdata: impl Into<Bytes>) -> Self {
        Self {
            attrs,
            rawdata: rawdata.into(),
            rawdata_decrypted: false,
            objref: None,
        }
    }

    /// Get raw (undecoded) data.
    pub fn get_rawdata(&self) -> &[u8] {
        self.rawdata.as_ref()
    }

    /// Get raw data as shared bytes.
    pub fn rawdata_bytes(&self) -> Bytes {
        self.rawdata.clone()
    }

    /// Check if rawdata has been decrypted already.
    pub const fn rawdata_is_decrypted(&self) -> bool {
        self.rawdata_decrypted
    }

    /// Replace rawdata and mark it as decrypted.
    pub fn set_rawdata_decrypted(&mut self, data: Vec<u8>) {
        self.rawdata = Bytes::from(data);
        self.rawdata_decrypted = true;
    }

    /// Check if stream contains a key.
    pub fn contains(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    /// Get attribute by name.
    pub fn get(&self, name: &str) -> Option<&PDFObject> {
        self.attrs.get(name)
    }

    /// Get attribute, trying multiple names.
    pub fn get_any(&self, names: &[&str]) -> Option<&PDFObject> {
        names.iter().find_map(|name| self.attrs.get(*name))
    }

    /// Whether the stream's /Type is `kind`.
    pub fn is_type(&self, kind: &str) -> bool {
        matches!(self.attrs.get("Type"), Some(PDFObject::Name(name)) if name == kind)
    }
}

// === Type conversion helper functions ===

/// Get integer value from object.
pub fn int_value(obj: &PDFObject) -> Result<i64> {
    obj.as_int()
}

/// Get numeric value (int or float) from object.
pub fn num_value(obj: &PDFObject) -> Result<f64> {
    obj.as_num()
}

/// Get dictionary value from object.
pub fn dict_value(obj: &PDFObject) -> Result<&PDFDict> {
    obj.as_dict()
}

/// Get stream value from object.
pub fn stream_value(obj: &PDFObject) -> Result<&PDFStream> {
    obj.as_stream()
}
