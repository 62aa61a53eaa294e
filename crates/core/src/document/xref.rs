//! Cross-reference loading.
//!
//! Sections are read from `startxref` backwards through `/Prev`; entries and
//! trailer keys from newer sections win over older ones. A broken chain falls
//! back (lenient mode only) to scanning the file for `N G obj` headers.

use super::options::ParseOptions;
use crate::codec::filters::FilterRegistry;
use crate::error::{PdfError, Result};
use crate::model::objects::{PDFDict, PDFObject, PDFStream};
use crate::parser::lexer::is_whitespace;
use crate::parser::ObjectParser;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use rustc_hash::{FxHashMap, FxHashSet};

static OBJ_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s+(\d+)\s+obj\b").expect("valid object header pattern"));

/// How far from the end of the file `startxref` is searched for.
const STARTXREF_WINDOW: usize = 1024;

/// Location of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Uncompressed object at a byte offset.
    Offset { offset: usize, genno: u32 },
    /// Object `index` inside object stream `stream`.
    Compressed { stream: u32, index: usize },
    /// Deleted object.
    Free,
}

/// Merged cross-reference index plus trailer.
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: FxHashMap<u32, XRefEntry>,
    trailer: PDFDict,
    fallback: bool,
}

impl XRefTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index built from explicit `(objid, entry)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (u32, XRefEntry)>, trailer: PDFDict) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            trailer,
            fallback: false,
        }
    }

    pub fn get(&self, objid: u32) -> Option<XRefEntry> {
        self.entries.get(&objid).copied()
    }

    pub fn insert(&mut self, objid: u32, entry: XRefEntry) {
        self.entries.insert(objid, entry);
    }

    pub const fn trailer(&self) -> &PDFDict {
        &self.trailer
    }

    /// Whether the index was rebuilt by scanning for object headers.
    pub const fn is_fallback(&self) -> bool {
        self.fallback
    }

    /// Object numbers that are in use, ascending.
    pub fn objids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .entries
            .iter()
            .filter(|(_, entry)| !matches!(entry, XRefEntry::Free))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge an older section: existing entries and trailer keys are kept.
    fn merge_older(&mut self, section: Section) {
        for (objid, entry) in section.entries {
            self.entries.entry(objid).or_insert(entry);
        }
        for (key, value) in section.trailer {
            self.trailer.entry(key).or_insert(value);
        }
    }
}

/// One xref section before merging.
#[derive(Debug, Default)]
struct Section {
    entries: FxHashMap<u32, XRefEntry>,
    trailer: PDFDict,
}

/// Load the cross-reference index of `data`.
pub fn load_xref(data: &Bytes, options: ParseOptions, filters: &FilterRegistry) -> Result<XRefTable> {
    let chained = find_startxref(data).and_then(|pos| load_chain(data, pos, options, filters));
    match chained {
        Ok(table) if !table.is_empty() => Ok(table),
        Ok(_) if options.strict => Err(PdfError::NoValidXRef),
        Err(err) if options.strict => {
            tracing::debug!(%err, "cross-reference chain is broken");
            Err(PdfError::NoValidXRef)
        }
        Ok(_) | Err(_) => {
            tracing::warn!("cross-reference chain unusable, scanning for object headers");
            load_fallback(data, options, filters)
        }
    }
}

/// Offset stored after the last `startxref` keyword.
pub fn find_startxref(data: &[u8]) -> Result<usize> {
    const NEEDLE: &[u8] = b"startxref";
    let start = data.len().saturating_sub(STARTXREF_WINDOW);
    let found = data[start..]
        .windows(NEEDLE.len())
        .rposition(|w| w == NEEDLE)
        .ok_or(PdfError::NoValidXRef)?;
    let mut parser = ObjectParser::new(data);
    parser.set_pos(start + found + NEEDLE.len());
    match parser.parse_object() {
        Ok(PDFObject::Int(pos)) if pos >= 0 && (pos as usize) < data.len() => Ok(pos as usize),
        _ => Err(PdfError::NoValidXRef),
    }
}

fn load_chain(
    data: &Bytes,
    start: usize,
    options: ParseOptions,
    filters: &FilterRegistry,
) -> Result<XRefTable> {
    let mut table = XRefTable::new();
    let mut visited = FxHashSet::default();
    let mut next = Some(start);

    while let Some(pos) = next.take() {
        if !visited.insert(pos) {
            tracing::warn!(pos, "cross-reference /Prev loop");
            break;
        }
        let mut section = load_section(data, pos, options, filters)?;

        // Hybrid file: the /XRefStm stream supplies compressed objects the
        // classic table lists as free.
        if let Some(stm_pos) = offset_entry(&section.trailer, "XRefStm")
            && visited.insert(stm_pos)
        {
            match load_xref_stream(data, stm_pos, options, filters) {
                Ok(stm) => {
                    for (objid, entry) in stm.entries {
                        let slot = section.entries.entry(objid).or_insert(XRefEntry::Free);
                        if *slot == XRefEntry::Free {
                            *slot = entry;
                        }
                    }
                }
                Err(err) => tracing::warn!(stm_pos, %err, "ignoring unreadable /XRefStm"),
            }
        }

        next = offset_entry(&section.trailer, "Prev");
        section.trailer.shift_remove("Prev");
        section.trailer.shift_remove("XRefStm");
        tracing::debug!(pos, entries = section.entries.len(), "loaded xref section");
        table.merge_older(section);
    }
    Ok(table)
}

fn offset_entry(trailer: &PDFDict, key: &str) -> Option<usize> {
    trailer
        .get(key)
        .and_then(|v| v.as_int().ok())
        .and_then(|n| usize::try_from(n).ok())
}

fn load_section(
    data: &Bytes,
    pos: usize,
    options: ParseOptions,
    filters: &FilterRegistry,
) -> Result<Section> {
    let rest = data.get(pos..).ok_or(PdfError::NoValidXRef)?;
    if rest.starts_with(b"xref") {
        load_classic(data, pos + 4)
    } else {
        load_xref_stream(data, pos, options, filters)
    }
}

/// Classic `xref` table followed by `trailer << … >>`.
fn load_classic(data: &Bytes, pos: usize) -> Result<Section> {
    let mut section = Section::default();
    let mut cursor = Cursor::new(data, pos);

    loop {
        cursor.skip_whitespace();
        if cursor.at_end() {
            return Err(PdfError::StreamEndedUnexpectedly);
        }
        if cursor.rest().starts_with(b"trailer") {
            cursor.pos += 7;
            break;
        }
        let start = cursor.read_uint()?;
        cursor.skip_whitespace();
        let count = cursor.read_uint()?;

        let mut base = start;
        for i in 0..count {
            cursor.skip_whitespace();
            let offset = cursor.read_uint()?;
            cursor.skip_whitespace();
            let genno = cursor.read_uint()?;
            cursor.skip_whitespace();
            let marker = cursor.next_byte().ok_or(PdfError::StreamEndedUnexpectedly)?;

            // Subsections that start at 1 but still carry the object 0 entry.
            if i == 0 && base > 0 && marker == b'f' && offset == 0 && genno == 65535 {
                base -= 1;
            }
            let Some(objid) = base.checked_add(i).and_then(|n| u32::try_from(n).ok()) else {
                continue;
            };
            let entry = match marker {
                b'n' => XRefEntry::Offset {
                    offset: offset as usize,
                    genno: genno as u32,
                },
                b'f' => XRefEntry::Free,
                other => {
                    return Err(PdfError::malformed(
                        cursor.pos - 1,
                        format!("invalid xref entry marker {:?}", char::from(other)),
                    ));
                }
            };
            section.entries.insert(objid, entry);
        }
    }

    let mut parser = ObjectParser::from_bytes(data);
    parser.set_pos(cursor.pos);
    section.trailer = parser.parse_dictionary()?.as_dict()?.clone();
    Ok(section)
}

/// Cross-reference stream (`/Type /XRef`).
fn load_xref_stream(
    data: &Bytes,
    pos: usize,
    options: ParseOptions,
    filters: &FilterRegistry,
) -> Result<Section> {
    let mut parser = ObjectParser::from_bytes(data).with_options(options);
    parser.set_pos(pos);
    let (_, obj) = parser.parse_indirect_object()?;
    let stream = obj.as_stream()?;
    let mut section = Section {
        entries: parse_xref_stream_entries(stream, filters)?,
        trailer: PDFDict::new(),
    };
    for (key, value) in &stream.attrs {
        if !matches!(
            key.as_str(),
            "Length" | "Filter" | "DecodeParms" | "W" | "Index" | "Type"
        ) {
            section.trailer.insert(key.clone(), value.clone());
        }
    }
    Ok(section)
}

fn parse_xref_stream_entries(
    stream: &PDFStream,
    filters: &FilterRegistry,
) -> Result<FxHashMap<u32, XRefEntry>> {
    let widths = stream
        .get("W")
        .ok_or_else(|| PdfError::KeyError("W".into()))?
        .as_array()?
        .iter()
        .map(|w| w.as_int().map(|w| w.clamp(0, 8) as usize))
        .collect::<Result<Vec<_>>>()?;
    let [w0, w1, w2] = widths[..] else {
        return Err(PdfError::DecodeError(format!(
            "xref stream /W has {} fields, expected 3",
            widths.len()
        )));
    };
    let entry_size = w0 + w1 + w2;
    if entry_size == 0 {
        return Err(PdfError::DecodeError("xref stream /W is all zero".into()));
    }

    let size = stream
        .get("Size")
        .ok_or_else(|| PdfError::KeyError("Size".into()))?
        .as_int()?;
    let subsections = match stream.get("Index") {
        Some(index) => index
            .as_array()?
            .chunks_exact(2)
            .map(|pair| -> Result<(i64, i64)> { Ok((pair[0].as_int()?, pair[1].as_int()?)) })
            .collect::<Result<Vec<_>>>()?,
        None => vec![(0, size)],
    };

    let decoded = filters.apply(
        stream.get_rawdata(),
        stream.get("Filter"),
        stream.get("DecodeParms"),
    )?;

    let mut entries = FxHashMap::default();
    let mut rows = decoded.chunks_exact(entry_size);
    'sections: for (start, count) in subsections {
        for i in 0..count.max(0) {
            let Some(row) = rows.next() else {
                break 'sections;
            };
            let Some(objid) = start.checked_add(i).and_then(|n| u32::try_from(n).ok()) else {
                continue;
            };
            let kind = if w0 == 0 { 1 } else { be_uint(&row[..w0]) };
            let field1 = be_uint(&row[w0..w0 + w1]);
            let field2 = be_uint(&row[w0 + w1..]);
            let entry = match kind {
                0 => XRefEntry::Free,
                1 => XRefEntry::Offset {
                    offset: field1 as usize,
                    genno: field2 as u32,
                },
                2 => XRefEntry::Compressed {
                    stream: field1 as u32,
                    index: field2 as usize,
                },
                // Unknown types are references to the null object.
                _ => continue,
            };
            entries.insert(objid, entry);
        }
    }
    Ok(entries)
}

fn be_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b))
}

/// Rebuild the index by scanning for `N G obj` headers. Later definitions
/// win; the trailer comes from the last `trailer` dictionary, else from the
/// last cross-reference stream found.
pub fn load_fallback(data: &Bytes, options: ParseOptions, filters: &FilterRegistry) -> Result<XRefTable> {
    let mut table = XRefTable {
        fallback: true,
        ..XRefTable::default()
    };
    for cap in OBJ_HEADER.captures_iter(data) {
        let (Some(whole), Some(objid), Some(genno)) = (cap.get(0), cap.get(1), cap.get(2)) else {
            continue;
        };
        let (Some(objid), Some(genno)) = (parse_u32(objid.as_bytes()), parse_u32(genno.as_bytes()))
        else {
            continue;
        };
        table.entries.insert(
            objid,
            XRefEntry::Offset {
                offset: whole.start(),
                genno,
            },
        );
    }
    if table.entries.is_empty() {
        return Err(PdfError::NoValidXRef);
    }

    if let Some(trailer) = find_trailer_dict(data) {
        table.trailer = trailer;
    } else {
        let mut offsets: Vec<usize> = table
            .entries
            .values()
            .filter_map(|entry| match entry {
                XRefEntry::Offset { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect();
        offsets.sort_unstable_by(|a, b| b.cmp(a));
        for offset in offsets {
            let mut parser = ObjectParser::from_bytes(data).with_options(options);
            parser.set_pos(offset);
            if let Ok((_, PDFObject::Stream(stream))) = parser.parse_indirect_object()
                && stream.is_type("XRef")
            {
                if let Ok(entries) = parse_xref_stream_entries(&stream, filters) {
                    for (objid, entry) in entries {
                        if matches!(entry, XRefEntry::Compressed { .. }) {
                            table.entries.entry(objid).or_insert(entry);
                        }
                    }
                }
                table.trailer = stream
                    .attrs
                    .into_iter()
                    .filter(|(key, _)| matches!(key.as_str(), "Root" | "Info" | "ID" | "Encrypt" | "Size"))
                    .collect();
                break;
            }
        }
    }
    tracing::debug!(objects = table.entries.len(), "rebuilt xref by scanning");
    Ok(table)
}

fn find_trailer_dict(data: &Bytes) -> Option<PDFDict> {
    const NEEDLE: &[u8] = b"trailer";
    let mut end = data.len();
    while let Some(found) = data[..end].windows(NEEDLE.len()).rposition(|w| w == NEEDLE) {
        let mut parser = ObjectParser::from_bytes(data);
        parser.set_pos(found + NEEDLE.len());
        if let Ok(PDFObject::Dict(dict)) = parser.parse_dictionary() {
            return Some(dict);
        }
        end = found;
    }
    None
}

fn parse_u32(digits: &[u8]) -> Option<u32> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Byte cursor for the fixed-format classic table.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn rest(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or_default()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.data.len() && is_whitespace(self.data[self.pos]) {
            self.pos += 1;
        }
    }

    fn next_byte(&mut self) -> Option<u8> {
        let b = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn read_uint(&mut self) -> Result<u64> {
        let start = self.pos;
        while self.pos < self.data.len() && self.data[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(if self.at_end() {
                PdfError::StreamEndedUnexpectedly
            } else {
                PdfError::malformed(start, "expected a number in xref table")
            });
        }
        std::str::from_utf8(&self.data[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| PdfError::NumericOverflow {
                pos: start,
                literal: String::from_utf8_lossy(&self.data[start..self.pos]).into_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startxref_uses_last_occurrence() {
        let data = b"startxref\n5\n%%EOF\nxxxxxxxx startxref\n12\n%%EOF";
        assert_eq!(find_startxref(data).unwrap(), 12);
        assert!(find_startxref(b"no marker here").is_err());
    }

    #[test]
    fn classic_table_with_shifted_subsection() {
        let data = Bytes::from_static(
            b"xref\n1 3\n0000000000 65535 f \n0000000017 00000 n \n0000000081 00000 n \ntrailer\n<< /Size 3 /Root 1 0 R >>\n",
        );
        let section = load_classic(&data, 4).unwrap();
        assert_eq!(section.entries.get(&0), Some(&XRefEntry::Free));
        assert_eq!(
            section.entries.get(&1),
            Some(&XRefEntry::Offset { offset: 17, genno: 0 })
        );
        assert_eq!(
            section.entries.get(&2),
            Some(&XRefEntry::Offset { offset: 81, genno: 0 })
        );
        assert!(section.trailer.contains_key("Root"));
    }

    #[test]
    fn classic_subsection_past_u64_range_is_skipped() {
        let data = Bytes::from_static(
            b"xref\n18446744073709551615 2\n0000000017 00000 n \n0000000081 00000 n \ntrailer\n<< /Size 3 >>\n",
        );
        let section = load_classic(&data, 4).unwrap();
        assert!(section.entries.is_empty());
        assert!(section.trailer.contains_key("Size"));
    }

    #[test]
    fn xref_stream_index_past_i64_range_is_skipped() {
        let mut attrs = PDFDict::new();
        attrs.insert(
            "W".into(),
            PDFObject::Array(vec![PDFObject::Int(1), PDFObject::Int(1), PDFObject::Int(1)]),
        );
        attrs.insert("Size".into(), PDFObject::Int(3));
        attrs.insert(
            "Index".into(),
            PDFObject::Array(vec![
                PDFObject::Int(i64::MAX),
                PDFObject::Int(2),
                PDFObject::Int(2),
                PDFObject::Int(1),
            ]),
        );
        let rows = vec![1, 10, 0, 1, 20, 0, 1, 30, 0];
        let stream = PDFStream::new(attrs, rows);
        let entries = parse_xref_stream_entries(&stream, &FilterRegistry::default()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get(&2), Some(&XRefEntry::Offset { offset: 30, genno: 0 }));
    }

    #[test]
    fn big_endian_fields() {
        assert_eq!(be_uint(&[]), 0);
        assert_eq!(be_uint(&[0x01, 0x02]), 0x0102);
    }
}
