//! Document loading and indirect object resolution.

mod common;

use common::{PdfBuilder, id_array};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use proptest::prelude::*;
use quire_core::{
    Document, PDFObjRef, PDFObject, ParseOptions, PdfError, XRefEntry, XRefTable,
};
use std::io::Write;
use std::sync::Arc;

fn root() -> PDFObject {
    PDFObject::Ref(PDFObjRef::new(1, 0))
}

fn simple_pdf() -> Vec<u8> {
    PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object(3, "<< /Title (Minutes) /Producer (quire) >>")
        .stream(4, "/Subtype /Text", b"hello stream")
        .trailer("Root", root())
        .trailer("Info", PDFObject::Ref(PDFObjRef::new(3, 0)))
        .trailer("ID", id_array())
        .build()
}

fn find(data: &[u8], needle: &[u8]) -> usize {
    data.windows(needle.len())
        .position(|w| w == needle)
        .expect("needle present")
}

#[test]
fn test_load_simple() {
    let doc = Document::load(simple_pdf(), ParseOptions::strict()).unwrap();
    assert!(!doc.is_encrypted());
    assert!(!doc.xref().is_fallback());
    assert_eq!(
        doc.object_refs(),
        (1..=4).map(|id| PDFObjRef::new(id, 0)).collect::<Vec<_>>()
    );

    let catalog = doc.catalog().unwrap();
    let pages = doc.resolve(&catalog.as_dict().unwrap()["Pages"]).unwrap();
    assert_eq!(pages.as_dict().unwrap()["Count"].as_int().unwrap(), 0);

    let info = doc.info().unwrap().unwrap();
    let title = info.as_dict().unwrap()["Title"].as_string().unwrap();
    assert_eq!(title.text().as_deref(), Some("Minutes"));
}

#[test]
fn test_stream_object() {
    let doc = Document::load(simple_pdf(), ParseOptions::strict()).unwrap();
    let obj = doc.get_object(PDFObjRef::new(4, 0)).unwrap();
    let stream = obj.as_stream().unwrap();
    assert_eq!(stream.get("Subtype").unwrap().as_name().unwrap(), "Text");
    assert_eq!(stream.get_rawdata(), b"hello stream");
    assert_eq!(doc.stream_data(stream).unwrap(), b"hello stream");
}

#[test]
fn test_cached_objects_are_shared() {
    let doc = Document::load(simple_pdf(), ParseOptions::strict()).unwrap();
    let first = doc.get_object(PDFObjRef::new(2, 0)).unwrap();
    let second = doc.get_object(PDFObjRef::new(2, 0)).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_concurrent_resolution_shares_one_object() {
    let doc = Document::load(simple_pdf(), ParseOptions::strict()).unwrap();
    let objects: Vec<Arc<PDFObject>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| doc.get_object(PDFObjRef::new(1, 0)).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let cached = doc.get_object(PDFObjRef::new(1, 0)).unwrap();
    for obj in &objects {
        assert_eq!(obj.as_ref(), cached.as_ref());
    }
}

#[test]
fn test_missing_object_strict_and_lenient() {
    let pdf = simple_pdf();
    let doc = Document::load(pdf.clone(), ParseOptions::strict()).unwrap();
    assert!(matches!(
        doc.get_object(PDFObjRef::new(42, 0)),
        Err(PdfError::ObjectNotFound { objid: 42, genno: 0 })
    ));

    let doc = Document::load(pdf, ParseOptions::lenient()).unwrap();
    assert!(doc.get_object(PDFObjRef::new(42, 0)).unwrap().is_null());
}

#[test]
fn test_generation_mismatch_independent_of_resolution_order() {
    let pdf = simple_pdf();
    let stale = PDFObjRef::new(1, 5);

    let cold = Document::load(pdf.clone(), ParseOptions::strict()).unwrap();
    assert!(matches!(
        cold.get_object(stale),
        Err(PdfError::ObjectNotFound { objid: 1, genno: 5 })
    ));

    let warm = Document::load(pdf, ParseOptions::strict()).unwrap();
    assert!(warm.get_object(PDFObjRef::new(1, 0)).unwrap().as_dict().is_ok());
    assert!(matches!(
        warm.get_object(stale),
        Err(PdfError::ObjectNotFound { objid: 1, genno: 5 })
    ));
}

#[test]
fn test_reference_cycle_resolves_to_null() {
    let pdf = PdfBuilder::new()
        .object(1, "<< /Type /Catalog >>")
        .object(2, "3 0 R")
        .object(3, "2 0 R")
        .trailer("Root", root())
        .build();
    let doc = Document::load(pdf, ParseOptions::strict()).unwrap();
    assert!(doc.resolve_ref(PDFObjRef::new(2, 0)).unwrap().is_null());
    // The unresolved references themselves are still available.
    assert_eq!(
        doc.get_object(PDFObjRef::new(2, 0)).unwrap().as_objref().unwrap(),
        PDFObjRef::new(3, 0)
    );
}

#[test]
fn test_stream_length_through_reference() {
    let pdf = PdfBuilder::new()
        .object(1, "<< /Type /Catalog >>")
        .object(2, "<< /Length 3 0 R >>\nstream\n0123456789\nendstream")
        .object(3, "10")
        .trailer("Root", root())
        .build();
    let doc = Document::load(pdf, ParseOptions::strict()).unwrap();
    let obj = doc.get_object(PDFObjRef::new(2, 0)).unwrap();
    assert_eq!(obj.as_stream().unwrap().get_rawdata(), b"0123456789");
}

/// Catalog (1) and an xref stream (6); objects 2 and 3 live in a
/// compressed object stream (5).
fn xref_stream_pdf() -> Vec<u8> {
    let objects = [
        "<< /Type /Pages /Kids [] /Count 0 >>",
        "(packed string)",
    ];
    let mut header = String::new();
    let mut body = String::new();
    for (i, obj) in objects.iter().enumerate() {
        header.push_str(&format!("{} {} ", i + 2, body.len()));
        body.push_str(obj);
        body.push(' ');
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(format!("{header}{body}").as_bytes())
        .unwrap();
    let compressed = encoder.finish().unwrap();

    let mut out = b"%PDF-1.5\n".to_vec();
    let catalog = out.len();
    out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    let objstm = out.len();
    out.extend_from_slice(
        format!(
            "5 0 obj\n<< /Type /ObjStm /N 2 /First {} /Filter /FlateDecode /Length {} >>\nstream\n",
            header.len(),
            compressed.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&compressed);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    let xref = out.len();
    let entry = |kind: u8, field: usize, extra: u8| {
        let field = u16::try_from(field).unwrap().to_be_bytes();
        [kind, field[0], field[1], extra]
    };
    let rows = [
        entry(0, 0, 255),
        entry(1, catalog, 0),
        entry(2, 5, 0),
        entry(2, 5, 1),
        entry(0, 0, 0),
        entry(1, objstm, 0),
        entry(1, xref, 0),
    ];
    out.extend_from_slice(
        format!(
            "6 0 obj\n<< /Type /XRef /Size 7 /W [1 2 1] /Root 1 0 R /Length {} >>\nstream\n",
            rows.len() * 4
        )
        .as_bytes(),
    );
    out.extend_from_slice(&rows.concat());
    out.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{xref}\n%%EOF\n").as_bytes());
    out
}

#[test]
fn test_xref_stream_and_object_stream() {
    let doc = Document::load(xref_stream_pdf(), ParseOptions::strict()).unwrap();
    assert_eq!(
        doc.xref().get(3),
        Some(XRefEntry::Compressed { stream: 5, index: 1 })
    );
    assert!(!doc.trailer().contains_key("W"));

    let catalog = doc.catalog().unwrap();
    let pages = doc.resolve(&catalog.as_dict().unwrap()["Pages"]).unwrap();
    assert_eq!(pages.as_dict().unwrap()["Type"].as_name().unwrap(), "Pages");
    let packed = doc.get_object(PDFObjRef::new(3, 0)).unwrap();
    assert_eq!(packed.as_bytes().unwrap(), b"packed string");
}

#[test]
fn test_fallback_finds_object_stream_members() {
    let mut pdf = xref_stream_pdf();
    let at = find(&pdf, b"startxref\n") + b"startxref\n".len();
    pdf.truncate(at);
    pdf.extend_from_slice(b"99999999\n%%EOF\n");

    assert!(matches!(
        Document::load(pdf.clone(), ParseOptions::strict()),
        Err(PdfError::NoValidXRef)
    ));

    let doc = Document::load(pdf, ParseOptions::lenient()).unwrap();
    assert!(doc.xref().is_fallback());
    let packed = doc.get_object(PDFObjRef::new(3, 0)).unwrap();
    assert_eq!(packed.as_bytes().unwrap(), b"packed string");
}

#[test]
fn test_fallback_scan_with_trailer() {
    let mut pdf = simple_pdf();
    let at = find(&pdf, b"startxref\n") + b"startxref\n".len();
    pdf.truncate(at);
    pdf.extend_from_slice(b"12\n%%EOF\n");

    let doc = Document::load(pdf, ParseOptions::lenient()).unwrap();
    assert!(doc.xref().is_fallback());
    assert_eq!(doc.xref().objids(), vec![1, 2, 3, 4]);
    let catalog = doc.catalog().unwrap();
    assert_eq!(catalog.as_dict().unwrap()["Type"].as_name().unwrap(), "Catalog");
}

#[test]
fn test_incremental_update_prev_chain() {
    let mut pdf = simple_pdf();
    let prev = {
        let at = find(&pdf, b"startxref\n") + b"startxref\n".len();
        let digits: Vec<u8> = pdf[at..].iter().take_while(|b| b.is_ascii_digit()).copied().collect();
        String::from_utf8(digits).unwrap()
    };

    let updated = pdf.len();
    pdf.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 7 >>\nendobj\n");
    let xref = pdf.len();
    pdf.extend_from_slice(
        format!(
            "xref\n2 1\n{updated:010} 00000 n \ntrailer\n<< /Size 5 /Root 1 0 R /Prev {prev} >>\nstartxref\n{xref}\n%%EOF\n"
        )
        .as_bytes(),
    );

    let doc = Document::load(pdf, ParseOptions::strict()).unwrap();
    assert!(!doc.trailer().contains_key("Prev"));
    assert!(doc.trailer().contains_key("Info"));
    let pages = doc.get_object(PDFObjRef::new(2, 0)).unwrap();
    assert_eq!(pages.as_dict().unwrap()["Count"].as_int().unwrap(), 7);
    let info = doc.get_object(PDFObjRef::new(3, 0)).unwrap();
    assert!(info.as_dict().unwrap().contains_key("Producer"));
}

#[test]
fn test_from_prebuilt_xref() {
    let pdf = simple_pdf();
    let entries = [1u32, 2].map(|objid| {
        let offset = find(&pdf, format!("{objid} 0 obj").as_bytes());
        (objid, XRefEntry::Offset { offset, genno: 0 })
    });
    let mut trailer = quire_core::PDFDict::new();
    trailer.insert("Root".into(), root());
    let xref = XRefTable::from_entries(entries, trailer);

    let doc = Document::from_xref(pdf, xref, ParseOptions::strict()).unwrap();
    assert_eq!(doc.object_refs().len(), 2);
    assert!(doc.catalog().is_ok());
    assert!(doc.info().unwrap().is_none());
    assert!(doc.get_object(PDFObjRef::new(3, 0)).is_err());
}

/// Reference chains: 0 ends the chain in an integer, anything else points at
/// that object.
fn chains() -> impl Strategy<Value = Vec<u32>> {
    (1u32..8).prop_flat_map(|n| prop::collection::vec(0..=n, n as usize))
}

fn expected_target(links: &[u32], start: u32) -> PDFObject {
    let mut seen = Vec::new();
    let mut current = start;
    loop {
        if seen.contains(&current) {
            return PDFObject::Null;
        }
        seen.push(current);
        match links[current as usize - 1] {
            0 => return PDFObject::Int(100 + i64::from(current)),
            next => current = next,
        }
    }
}

proptest! {
    #[test]
    fn prop_resolution_terminates(links in chains()) {
        let mut builder = PdfBuilder::new();
        for (i, &link) in links.iter().enumerate() {
            let objid = i as u32 + 1;
            builder = match link {
                0 => builder.object(objid, format!("{}", 100 + objid)),
                next => builder.object(objid, format!("{next} 0 R")),
            };
        }
        let doc = Document::load(builder.trailer("Root", root()).build(), ParseOptions::lenient())
            .unwrap();
        for objid in 1..=links.len() as u32 {
            let resolved = doc.resolve_ref(PDFObjRef::new(objid, 0)).unwrap();
            prop_assert_eq!(resolved.as_ref(), &expected_target(&links, objid));
        }
    }
}
