//! Shared helpers: assemble small PDF files with a correct xref table.

#![allow(dead_code)]

use quire_core::model::write_object;
use quire_core::{EncryptionParams, PDFDict, PDFObjRef, PDFObject, StandardSecurityHandler};

pub const DOC_ID: [u8; 16] = [
    101, 26, 148, 254, 235, 120, 104, 211, 18, 169, 123, 55, 114, 112, 134, 14,
];

/// In-memory PDF writer for test fixtures.
#[derive(Default)]
pub struct PdfBuilder {
    objects: Vec<(u32, Vec<u8>)>,
    trailer: PDFDict,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `objid 0 obj <body> endobj`.
    pub fn object(mut self, objid: u32, body: impl AsRef<[u8]>) -> Self {
        self.objects.push((objid, body.as_ref().to_vec()));
        self
    }

    /// Add an object serialized from `obj`.
    pub fn value(self, objid: u32, obj: &PDFObject) -> Self {
        self.object(objid, obj.to_bytes())
    }

    /// Add a stream object with the given dictionary entries and payload.
    pub fn stream(self, objid: u32, attrs: &str, payload: &[u8]) -> Self {
        let mut body = format!("<< {attrs} /Length {} >>\nstream\n", payload.len()).into_bytes();
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\nendstream");
        self.object(objid, body)
    }

    pub fn trailer(mut self, key: &str, value: PDFObject) -> Self {
        self.trailer.insert(key.to_string(), value);
        self
    }

    /// Header, objects, a classic xref table, trailer and `startxref`.
    pub fn build(&self) -> Vec<u8> {
        let mut out = b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n".to_vec();
        let mut offsets = Vec::new();
        for (objid, body) in &self.objects {
            offsets.push((*objid, out.len()));
            out.extend_from_slice(format!("{objid} 0 obj\n").as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }
        let size = self.objects.iter().map(|(id, _)| *id).max().unwrap_or(0) + 1;

        let xref_pos = out.len();
        out.extend_from_slice(format!("xref\n0 {size}\n0000000000 65535 f \n").as_bytes());
        for objid in 1..size {
            match offsets.iter().find(|(id, _)| *id == objid) {
                Some((_, offset)) => {
                    out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
                }
                None => out.extend_from_slice(b"0000000000 65535 f \n"),
            }
        }

        let mut trailer = self.trailer.clone();
        trailer.insert("Size".into(), PDFObject::Int(i64::from(size)));
        out.extend_from_slice(b"trailer\n");
        write_object(&mut out, &PDFObject::Dict(trailer)).unwrap();
        out.extend_from_slice(format!("\nstartxref\n{xref_pos}\n%%EOF\n").as_bytes());
        out
    }
}

/// `/ID [<id> <id>]`.
pub fn id_array() -> PDFObject {
    PDFObject::Array(vec![
        PDFObject::string(DOC_ID.to_vec()),
        PDFObject::string(DOC_ID.to_vec()),
    ])
}

pub const SECRET_TITLE: &[u8] = b"Quarterly figures";
pub const SECRET_CONTENT: &[u8] = b"BT /F1 12 Tf (top secret) Tj ET";
pub const AES_IV: [u8; 16] = [7; 16];

/// An encrypted document: catalog (1) with an encrypted `/Title`, a content
/// stream (2) and the encryption dictionary (3).
pub fn encrypted_pdf(mut params: EncryptionParams, user: &[u8], owner: &[u8]) -> Vec<u8> {
    params.compute_entries(user, owner, &DOC_ID).unwrap();
    let key = params.compute_key(user, &DOC_ID);
    let encrypt = params.to_dict();
    let handler = StandardSecurityHandler::with_key(params, DOC_ID.to_vec(), key);

    let title = handler
        .encrypt_string(PDFObjRef::new(1, 0), SECRET_TITLE, &AES_IV)
        .unwrap();
    let mut catalog = PDFDict::new();
    catalog.insert("Type".into(), PDFObject::name("Catalog"));
    catalog.insert("Title".into(), PDFObject::string(title));
    catalog.insert("Content".into(), PDFObject::Ref(PDFObjRef::new(2, 0)));

    let content = handler
        .encrypt_stream(PDFObjRef::new(2, 0), &PDFDict::new(), SECRET_CONTENT, &AES_IV)
        .unwrap();

    PdfBuilder::new()
        .value(1, &PDFObject::Dict(catalog))
        .stream(2, "", &content)
        .value(3, &PDFObject::Dict(encrypt))
        .trailer("Root", PDFObject::Ref(PDFObjRef::new(1, 0)))
        .trailer("Encrypt", PDFObject::Ref(PDFObjRef::new(3, 0)))
        .trailer("ID", id_array())
        .build()
}
