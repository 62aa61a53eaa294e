//! PDF object model.

pub mod objects;
pub mod text;
pub mod writer;

pub use objects::{PDFDict, PDFObjRef, PDFObject, PDFStream, PDFString};
pub use text::StringEncoding;
pub use writer::write_object;
