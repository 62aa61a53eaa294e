//! dumppdf - dump PDF objects as XML
//!
//! Prints the trailer, selected objects or every object of a (possibly
//! encrypted) PDF file.

use anyhow::{Context, bail};
use clap::{ArgAction, ArgGroup, Parser};
use memmap2::Mmap;
use quire_core::{Document, PDFDict, PDFObjRef, PDFObject, ParseOptions, PasswordType};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Escape special characters for XML output.
fn escape(s: &[u8]) -> String {
    let mut result = String::with_capacity(s.len());
    for &byte in s {
        match byte {
            b'&' => result.push_str("&amp;"),
            b'<' => result.push_str("&lt;"),
            b'>' => result.push_str("&gt;"),
            b'"' => result.push_str("&quot;"),
            b'\'' => result.push_str("&#39;"),
            b'\\' => result.push_str("&#92;"),
            0..=31 | 127..=255 => result.push_str(&format!("&#{byte};")),
            _ => result.push(char::from(byte)),
        }
    }
    result
}

/// How stream payloads are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamCodec {
    /// Dictionary only
    None,
    /// Decrypted but still encoded bytes
    Raw,
    /// Decoded bytes, no XML
    Binary,
    /// Decoded bytes escaped inside `<data>`
    Text,
}

fn dumpxml<W: Write>(
    out: &mut W,
    doc: &Document,
    obj: &PDFObject,
    codec: StreamCodec,
) -> anyhow::Result<()> {
    match obj {
        PDFObject::Null => write!(out, "<null />")?,
        PDFObject::Bool(b) => write!(out, "<boolean>{b}</boolean>")?,
        PDFObject::Int(n) => write!(out, "<number>{n}</number>")?,
        PDFObject::Real(n) => write!(out, "<number>{n}</number>")?,
        PDFObject::String(s) => write!(
            out,
            r#"<string size="{}">{}</string>"#,
            s.len(),
            escape(s.as_bytes())
        )?,
        PDFObject::Name(name) => write!(out, "<literal>{}</literal>", escape(name.as_bytes()))?,
        PDFObject::Array(items) => {
            writeln!(out, r#"<list size="{}">"#, items.len())?;
            for item in items {
                dumpxml(out, doc, item, codec)?;
                writeln!(out)?;
            }
            write!(out, "</list>")?;
        }
        PDFObject::Dict(dict) => dump_dict(out, doc, dict, codec)?,
        PDFObject::Stream(stream) => match codec {
            StreamCodec::Raw => out.write_all(stream.get_rawdata())?,
            StreamCodec::Binary => out.write_all(&doc.stream_data(stream)?)?,
            StreamCodec::Text | StreamCodec::None => {
                writeln!(out, "<stream>")?;
                writeln!(out, "<props>")?;
                dump_dict(out, doc, &stream.attrs, codec)?;
                writeln!(out)?;
                writeln!(out, "</props>")?;
                if codec == StreamCodec::Text {
                    let data = doc.stream_data(stream)?;
                    writeln!(out, r#"<data size="{}">{}</data>"#, data.len(), escape(&data))?;
                }
                write!(out, "</stream>")?;
            }
        },
        PDFObject::Ref(objref) => write!(out, r#"<ref id="{}" />"#, objref.objid)?,
    }
    Ok(())
}

fn dump_dict<W: Write>(
    out: &mut W,
    doc: &Document,
    dict: &PDFDict,
    codec: StreamCodec,
) -> anyhow::Result<()> {
    writeln!(out, r#"<dict size="{}">"#, dict.len())?;
    for (key, value) in dict {
        writeln!(out, "<key>{}</key>", escape(key.as_bytes()))?;
        write!(out, "<value>")?;
        dumpxml(out, doc, value, codec)?;
        writeln!(out, "</value>")?;
    }
    write!(out, "</dict>")?;
    Ok(())
}

fn dumptrailer<W: Write>(out: &mut W, doc: &Document, show_fallback_xref: bool) -> anyhow::Result<()> {
    if doc.xref().is_fallback() && !show_fallback_xref {
        tracing::warn!(
            "this PDF does not have a valid xref; use --show-fallback-xref to display \
             the trailer of the rebuilt one"
        );
        return Ok(());
    }
    writeln!(out, "<trailer>")?;
    dump_dict(out, doc, doc.trailer(), StreamCodec::None)?;
    writeln!(out)?;
    writeln!(out, "</trailer>")?;
    writeln!(out)?;
    Ok(())
}

fn dump_object<W: Write>(
    out: &mut W,
    doc: &Document,
    objref: PDFObjRef,
    codec: StreamCodec,
) -> anyhow::Result<()> {
    match doc.get_object(objref) {
        Ok(obj) => {
            if codec == StreamCodec::Raw || codec == StreamCodec::Binary {
                return dumpxml(out, doc, &obj, codec);
            }
            writeln!(out, r#"<object id="{}">"#, objref.objid)?;
            dumpxml(out, doc, &obj, codec)?;
            writeln!(out)?;
            writeln!(out, "</object>")?;
            writeln!(out)?;
        }
        Err(err) => tracing::warn!(%objref, %err, "cannot read object"),
    }
    Ok(())
}

fn dumpallobjs<W: Write>(
    out: &mut W,
    doc: &Document,
    codec: StreamCodec,
    show_fallback_xref: bool,
) -> anyhow::Result<()> {
    write!(out, "<pdf>")?;
    for objref in doc.object_refs() {
        dump_object(out, doc, objref, codec)?;
    }
    dumptrailer(out, doc, show_fallback_xref)?;
    write!(out, "</pdf>")?;
    Ok(())
}

/// Write embedded files listed in the catalog's `/Names /EmbeddedFiles` tree.
fn extractembedded(doc: &Document, extractdir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(extractdir)?;
    let catalog = doc.catalog()?;
    let Some(names) = catalog.as_dict()?.get("Names") else {
        return Ok(());
    };
    let names = doc.resolve(names)?;
    if let Some(tree) = names.as_dict().ok().and_then(|n| n.get("EmbeddedFiles")) {
        extract_from_tree(doc, &*doc.resolve(tree)?, extractdir, 0)?;
    }
    Ok(())
}

fn extract_from_tree(doc: &Document, tree: &PDFObject, extractdir: &Path, depth: usize) -> anyhow::Result<()> {
    const MAX_TREE_DEPTH: usize = 32;
    let Ok(node) = tree.as_dict() else {
        return Ok(());
    };
    if depth > MAX_TREE_DEPTH {
        bail!("embedded file name tree is nested too deeply");
    }
    if let Some(names) = node.get("Names") {
        let names = doc.resolve(names)?;
        for pair in names.as_array()?.chunks_exact(2) {
            let filespec = doc.resolve(&pair[1])?;
            if let Ok(filespec) = filespec.as_dict() {
                let fallback = pair[0].as_string().map(|s| s.to_string_lossy()).unwrap_or_default();
                extract_single(doc, filespec, &fallback, extractdir)?;
            }
        }
    }
    if let Some(kids) = node.get("Kids") {
        for kid in doc.resolve(kids)?.as_array()? {
            extract_from_tree(doc, &*doc.resolve(kid)?, extractdir, depth + 1)?;
        }
    }
    Ok(())
}

fn extract_single(doc: &Document, filespec: &PDFDict, fallback: &str, extractdir: &Path) -> anyhow::Result<()> {
    let filename = ["UF", "F"]
        .iter()
        .find_map(|key| filespec.get(*key).and_then(|v| v.as_string().ok()))
        .map_or_else(|| fallback.to_string(), |s| s.to_string_lossy());
    let Some(basename) = Path::new(&filename).file_name() else {
        tracing::warn!(%filename, "embedded file has no usable name");
        return Ok(());
    };
    let Some(ef) = filespec.get("EF") else {
        return Ok(());
    };
    let ef = doc.resolve(ef)?;
    let ef = ef.as_dict()?;
    let Some(file) = ef.get("UF").or_else(|| ef.get("F")) else {
        return Ok(());
    };
    let file = doc.resolve(file)?;
    let Ok(stream) = file.as_stream() else {
        tracing::warn!(%filename, "embedded file reference is not a stream");
        return Ok(());
    };

    let path = extractdir.join(basename);
    if path.exists() {
        tracing::warn!(path = %path.display(), "file exists, skipping");
        return Ok(());
    }
    eprintln!("extracting: {}", path.display());
    std::fs::write(&path, doc.stream_data(stream)?)?;
    Ok(())
}

/// A command line tool for dumping PDF internal structure as XML.
#[derive(Parser, Debug)]
#[command(name = "dumppdf")]
#[command(version, about = "Dump PDF objects in XML format", long_about = None)]
#[command(group(
    ArgGroup::new("procedure")
        .args(["all", "objects", "extract_embedded"])
))]
#[command(group(
    ArgGroup::new("stream_codec")
        .args(["raw_stream", "binary_stream", "text_stream"])
))]
struct Args {
    /// One or more paths to PDF files
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Use debug logging level
    #[arg(short = 'd', long, action = ArgAction::SetTrue)]
    debug: bool,

    /// Comma separated list of object numbers to dump
    #[arg(short = 'i', long = "objects", value_delimiter = ',')]
    objects: Option<Vec<u32>>,

    /// Dump every object
    #[arg(short = 'a', long, action = ArgAction::SetTrue)]
    all: bool,

    /// Extract embedded files to the specified directory
    #[arg(short = 'E', long = "extract-embedded")]
    extract_embedded: Option<PathBuf>,

    /// Show the trailer of a rebuilt xref when the file has no valid one
    #[arg(long, action = ArgAction::SetTrue)]
    show_fallback_xref: bool,

    /// Password for an encrypted document
    #[arg(short = 'P', long, default_value = "")]
    password: String,

    /// Fail on malformed streams and missing objects instead of recovering
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// Output file name, `-` for stdout
    #[arg(short = 'o', long, default_value = "-")]
    outfile: String,

    /// Write stream objects without decoding filters (raw)
    #[arg(short = 'r', long = "raw-stream", action = ArgAction::SetTrue)]
    raw_stream: bool,

    /// Write decoded stream objects as binary
    #[arg(short = 'b', long = "binary-stream", action = ArgAction::SetTrue)]
    binary_stream: bool,

    /// Write decoded stream objects as text
    #[arg(short = 't', long = "text-stream", action = ArgAction::SetTrue)]
    text_stream: bool,
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn open(path: &Path, options: ParseOptions, password: &str) -> anyhow::Result<Document> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    // Safety: the file handle remains open for the duration of the map.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("cannot map {}", path.display()))?;
    let mut doc = Document::from_mmap(mmap, options)
        .with_context(|| format!("cannot parse {}", path.display()))?;
    if doc.is_encrypted() && !password.is_empty() {
        match doc.authenticate_as(password) {
            Ok(PasswordType::Owner) => tracing::debug!("owner password accepted"),
            Ok(PasswordType::User) => tracing::debug!("user password accepted"),
            Err(_) if doc.is_locked() => bail!("incorrect password for {}", path.display()),
            Err(_) => tracing::warn!("password did not match, document opened with empty password"),
        }
    }
    if doc.is_locked() {
        bail!("{} is encrypted; pass the password with -P", path.display());
    }
    Ok(doc)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let codec = if args.raw_stream {
        StreamCodec::Raw
    } else if args.binary_stream {
        StreamCodec::Binary
    } else if args.text_stream {
        StreamCodec::Text
    } else {
        StreamCodec::None
    };
    let options = if args.strict {
        ParseOptions::strict()
    } else {
        ParseOptions::lenient()
    };

    let mut output: Box<dyn Write> = if args.outfile == "-" {
        Box::new(BufWriter::new(io::stdout()))
    } else {
        let file = File::create(&args.outfile)
            .with_context(|| format!("cannot create {}", args.outfile))?;
        Box::new(BufWriter::new(file))
    };

    for path in &args.files {
        let doc = open(path, options, &args.password)?;

        if let Some(extractdir) = &args.extract_embedded {
            extractembedded(&doc, extractdir)?;
        } else if args.all {
            dumpallobjs(&mut output, &doc, codec, args.show_fallback_xref)?;
        } else if let Some(objids) = &args.objects {
            for &objid in objids {
                let objref = doc
                    .object_refs()
                    .into_iter()
                    .find(|r| r.objid == objid)
                    .unwrap_or(PDFObjRef::new(objid, 0));
                dump_object(&mut output, &doc, objref, codec)?;
            }
        } else {
            dumptrailer(&mut output, &doc, args.show_fallback_xref)?;
        }
        if codec != StreamCodec::Raw && codec != StreamCodec::Binary {
            writeln!(output)?;
        }
    }

    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_xml() {
        assert_eq!(escape(b"a<b>&\"c\""), "a&lt;b&gt;&amp;&quot;c&quot;");
        assert_eq!(escape(b"\n\xff"), "&#10;&#255;");
    }

    #[test]
    fn dump_simple_objects() {
        let doc = Document::from_xref(
            Vec::new(),
            quire_core::XRefTable::new(),
            ParseOptions::lenient(),
        )
        .unwrap();
        let mut dict = PDFDict::new();
        dict.insert("Type".into(), PDFObject::name("Catalog"));
        dict.insert("Count".into(), PDFObject::Int(3));
        let mut out = Vec::new();
        dumpxml(&mut out, &doc, &PDFObject::Dict(dict), StreamCodec::None).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(r#"<dict size="2">"#));
        assert!(text.contains("<key>Type</key>\n<value><literal>Catalog</literal></value>"));
        assert!(text.contains("<number>3</number>"));
    }
}
