//! Serialize objects back to PDF syntax.
//!
//! Output re-parses to an equal object: text strings are written as
//! escaped literals, binary strings as hex, names with `#xx` escapes.

use super::objects::{PDFObject, PDFString};
use super::text::StringEncoding;
use std::io::{self, Write};

/// Write one object in PDF syntax.
pub fn write_object<W: Write>(out: &mut W, obj: &PDFObject) -> io::Result<()> {
    match obj {
        PDFObject::Null => out.write_all(b"null"),
        PDFObject::Bool(true) => out.write_all(b"true"),
        PDFObject::Bool(false) => out.write_all(b"false"),
        PDFObject::Int(n) => write!(out, "{n}"),
        PDFObject::Real(n) => write_real(out, *n),
        PDFObject::Name(name) => write_name(out, name),
        PDFObject::String(s) => write_string(out, s),
        PDFObject::Array(items) => {
            out.write_all(b"[")?;
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.write_all(b" ")?;
                }
                write_object(out, item)?;
            }
            out.write_all(b"]")
        }
        PDFObject::Dict(dict) => write_dict(out, dict),
        PDFObject::Stream(stream) => {
            write_dict(out, &stream.attrs)?;
            out.write_all(b"\nstream\n")?;
            out.write_all(stream.get_rawdata())?;
            out.write_all(b"\nendstream")
        }
        PDFObject::Ref(r) => write!(out, "{} {} R", r.objid, r.genno),
    }
}

fn write_dict<W: Write>(out: &mut W, dict: &super::objects::PDFDict) -> io::Result<()> {
    out.write_all(b"<<")?;
    for (key, value) in dict {
        write_name(out, key)?;
        out.write_all(b" ")?;
        write_object(out, value)?;
    }
    out.write_all(b">>")
}

fn write_real<W: Write>(out: &mut W, value: f64) -> io::Result<()> {
    if !value.is_finite() {
        return out.write_all(b"0.0");
    }
    let text = format!("{value}");
    out.write_all(text.as_bytes())?;
    if !text.contains('.') {
        out.write_all(b".0")?;
    }
    Ok(())
}

const fn is_name_regular(byte: u8) -> bool {
    matches!(byte, b'!'..=b'~')
        && !matches!(
            byte,
            b'#' | b'/' | b'%' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}'
        )
}

/// Write `/name`, escaping delimiters and non-printable bytes as `#xx`.
pub fn write_name<W: Write>(out: &mut W, name: &str) -> io::Result<()> {
    out.write_all(b"/")?;
    for &byte in name.as_bytes() {
        if is_name_regular(byte) {
            out.write_all(&[byte])?;
        } else {
            write!(out, "#{byte:02X}")?;
        }
    }
    Ok(())
}

fn write_string<W: Write>(out: &mut W, s: &PDFString) -> io::Result<()> {
    if s.encoding() == StringEncoding::Binary {
        out.write_all(b"<")?;
        for byte in s.as_bytes() {
            write!(out, "{byte:02x}")?;
        }
        return out.write_all(b">");
    }

    out.write_all(b"(")?;
    for &byte in s.as_bytes() {
        match byte {
            b'(' | b')' | b'\\' => out.write_all(&[b'\\', byte])?,
            b'\n' => out.write_all(b"\\n")?,
            b'\r' => out.write_all(b"\\r")?,
            b'\t' => out.write_all(b"\\t")?,
            0x20..=0x7E => out.write_all(&[byte])?,
            _ => write!(out, "\\{byte:03o}")?,
        }
    }
    out.write_all(b")")
}

impl PDFObject {
    /// Serialize to PDF syntax.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = write_object(&mut out, self);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::objects::{PDFDict, PDFObjRef};

    #[test]
    fn scalars() {
        assert_eq!(PDFObject::Null.to_bytes(), b"null");
        assert_eq!(PDFObject::Int(-12).to_bytes(), b"-12");
        assert_eq!(PDFObject::Real(3.0).to_bytes(), b"3.0");
        assert_eq!(PDFObject::Real(-0.25).to_bytes(), b"-0.25");
        assert_eq!(PDFObject::Ref(PDFObjRef::new(4, 1)).to_bytes(), b"4 1 R");
    }

    #[test]
    fn names_are_escaped() {
        assert_eq!(PDFObject::name("A B#").to_bytes(), b"/A#20B#23");
        assert_eq!(PDFObject::name("").to_bytes(), b"/");
    }

    #[test]
    fn strings() {
        assert_eq!(PDFObject::string(b"a(b)\\".to_vec()).to_bytes(), b"(a\\(b\\)\\\\)");
        assert_eq!(PDFObject::string(vec![0u8, 0xff]).to_bytes(), b"<00ff>");
    }

    #[test]
    fn dict_keeps_order() {
        let mut dict = PDFDict::new();
        dict.insert("Type".into(), PDFObject::name("Page"));
        dict.insert("Count".into(), PDFObject::Int(2));
        assert_eq!(PDFObject::Dict(dict).to_bytes(), b"<</Type /Page/Count 2>>");
    }
}
