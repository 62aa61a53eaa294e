//! Benchmarks for object parsing and document loading.
//!
//! Benchmark groups:
//! - `lexer_tokenize`: raw tokenizer throughput over object syntax
//! - `object_parse`: nested dictionaries and arrays
//! - `document_load`: xref loading plus resolving every object, with and
//!   without RC4 decryption

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use quire_core::{
    Document, EncryptionParams, Lexer, ObjectParser, PDFDict, PDFObjRef, PDFObject, ParseOptions,
    Permissions, StandardSecurityHandler,
};

const DOC_ID: [u8; 16] = *b"quire-bench-id-0";

/// Object syntax with a mix of names, numbers, strings and references.
fn generate_objects(n: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(n * 96);
    for i in 0..n {
        data.extend_from_slice(
            format!(
                "<< /Type /Annot /Subtype /Link /Rect [{} {} 612.5 792] /P {} 0 R \
                 /Contents (note {i}) /ID <{:08x}> >>\n",
                i % 600,
                i % 800,
                i + 1,
                i
            )
            .as_bytes(),
        );
    }
    data
}

/// A document with `n` dictionary objects and a classic xref table.
fn generate_document(n: u32, handler: Option<&StandardSecurityHandler>) -> Vec<u8> {
    let mut out = b"%PDF-1.7\n".to_vec();
    let mut offsets = Vec::with_capacity(n as usize);
    for objid in 1..=n {
        offsets.push(out.len());
        let title = format!("Object number {objid}").into_bytes();
        let title = match handler {
            Some(handler) => handler
                .encrypt_string(PDFObjRef::new(objid, 0), &title, &[0; 16])
                .unwrap(),
            None => title,
        };
        let mut dict = PDFDict::new();
        dict.insert("Type".into(), PDFObject::name("Item"));
        dict.insert("Next".into(), PDFObject::Ref(PDFObjRef::new(objid % n + 1, 0)));
        dict.insert("Title".into(), PDFObject::string(title));
        out.extend_from_slice(format!("{objid} 0 obj\n").as_bytes());
        out.extend_from_slice(&PDFObject::Dict(dict).to_bytes());
        out.extend_from_slice(b"\nendobj\n");
    }

    let mut trailer = format!("<< /Size {} /Root 1 0 R", n + 1);
    let encrypt_id = n + 1;
    if let Some(handler) = handler {
        offsets.push(out.len());
        out.extend_from_slice(format!("{encrypt_id} 0 obj\n").as_bytes());
        out.extend_from_slice(&PDFObject::Dict(handler.params().to_dict()).to_bytes());
        out.extend_from_slice(b"\nendobj\n");
        let id: String = DOC_ID.iter().map(|b| format!("{b:02x}")).collect();
        trailer = format!(
            "<< /Size {} /Root 1 0 R /Encrypt {encrypt_id} 0 R /ID [<{id}> <{id}>]",
            n + 2
        );
    }

    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", offsets.len() + 1).as_bytes());
    for offset in &offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(format!("trailer\n{trailer} >>\nstartxref\n{xref}\n%%EOF\n").as_bytes());
    out
}

fn rc4_handler() -> StandardSecurityHandler {
    let mut params = EncryptionParams::rc4(128, Permissions::all());
    params.compute_entries(b"", b"owner", &DOC_ID).unwrap();
    let key = params.compute_key(b"", &DOC_ID);
    StandardSecurityHandler::with_key(params, DOC_ID.to_vec(), key)
}

fn bench_tokenize(c: &mut Criterion) {
    let mut group = c.benchmark_group("lexer_tokenize");

    for objects in [1_000usize, 10_000, 100_000] {
        let data = generate_objects(objects);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("objects", objects), &data, |b, data| {
            b.iter(|| {
                let mut lexer = Lexer::new(black_box(data));
                let mut count = 0usize;
                while let Some(token) = lexer.next_token().unwrap() {
                    black_box(token);
                    count += 1;
                }
                count
            })
        });
    }

    group.finish();
}

fn bench_parse_objects(c: &mut Criterion) {
    let mut group = c.benchmark_group("object_parse");

    for objects in [1_000usize, 10_000, 100_000] {
        let data = generate_objects(objects);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("dicts", objects), &data, |b, data| {
            b.iter(|| {
                let mut parser = ObjectParser::new(black_box(data));
                for _ in 0..objects {
                    black_box(parser.parse_object().unwrap());
                }
            })
        });
    }

    let nested = format!("{}1{}", "[".repeat(200), "]".repeat(200));
    group.bench_function("nested_arrays_200", |b| {
        b.iter(|| ObjectParser::new(black_box(nested.as_bytes())).parse_object().unwrap())
    });

    group.finish();
}

fn bench_document_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_load");
    group.sample_size(20);

    let handler = rc4_handler();
    for objects in [100u32, 1_000, 10_000] {
        for (label, data) in [
            ("plain", generate_document(objects, None)),
            ("rc4_128", generate_document(objects, Some(&handler))),
        ] {
            group.bench_with_input(BenchmarkId::new(label, objects), &data, |b, data| {
                b.iter(|| {
                    let doc = Document::load(data.clone(), ParseOptions::strict()).unwrap();
                    for objref in doc.object_refs() {
                        black_box(doc.get_object(objref).unwrap());
                    }
                })
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_tokenize, bench_parse_objects, bench_document_load);
criterion_main!(benches);
