//! Stream filters applied after decryption.
//!
//! Filters are looked up by name (or its inline-image abbreviation) in a
//! [`FilterRegistry`]; callers can register their own [`StreamFilter`]s.

use crate::error::{PdfError, Result};
use crate::model::objects::{PDFDict, PDFObject};
use rustc_hash::FxHashMap;
use std::io::Read;
use std::sync::Arc;

/// A decoder for one `/Filter` entry.
pub trait StreamFilter: Send + Sync {
    /// Decode `data`. `params` is the matching `/DecodeParms` dictionary.
    fn decode(&self, data: &[u8], params: Option<&PDFDict>) -> Result<Vec<u8>>;
}

/// Name -> filter lookup.
#[derive(Clone)]
pub struct FilterRegistry {
    filters: FxHashMap<String, Arc<dyn StreamFilter>>,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_aliases(&["FlateDecode", "Fl"], Arc::new(FlateDecode));
        registry.register_aliases(&["ASCIIHexDecode", "AHx"], Arc::new(AsciiHexDecode));
        registry.register_aliases(&["ASCII85Decode", "A85"], Arc::new(Ascii85Decode));
        // Decryption happens before filters run; the Crypt entry only names the crypt filter.
        registry.register("Crypt", Arc::new(Passthrough));
        registry
    }
}

impl std::fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.filters.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FilterRegistry").field("filters", &names).finish()
    }
}

impl FilterRegistry {
    pub fn empty() -> Self {
        Self {
            filters: FxHashMap::default(),
        }
    }

    pub fn register(&mut self, name: &str, filter: Arc<dyn StreamFilter>) {
        self.filters.insert(name.to_string(), filter);
    }

    fn register_aliases(&mut self, names: &[&str], filter: Arc<dyn StreamFilter>) {
        for name in names {
            self.register(name, Arc::clone(&filter));
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn StreamFilter> {
        self.filters.get(name).map(Arc::as_ref)
    }

    /// Apply a filter chain in order.
    ///
    /// `filters` and `params` are the already-resolved `/Filter` and
    /// `/DecodeParms` values of a stream dictionary.
    pub fn apply(
        &self,
        data: &[u8],
        filters: Option<&PDFObject>,
        params: Option<&PDFObject>,
    ) -> Result<Vec<u8>> {
        let names: Vec<&str> = match filters {
            None | Some(PDFObject::Null) => return Ok(data.to_vec()),
            Some(PDFObject::Name(name)) => vec![name.as_str()],
            Some(PDFObject::Array(items)) => items
                .iter()
                .map(PDFObject::as_name)
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(PdfError::TypeError {
                    expected: "name or array",
                    got: other.type_name(),
                });
            }
        };
        let params: Vec<Option<&PDFDict>> = match params {
            Some(PDFObject::Dict(dict)) => vec![Some(dict)],
            Some(PDFObject::Array(items)) => items
                .iter()
                .map(|item| match item {
                    PDFObject::Dict(dict) => Some(dict),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };

        let mut output = data.to_vec();
        for (idx, name) in names.iter().enumerate() {
            let filter = self
                .get(name)
                .ok_or_else(|| PdfError::DecodeError(format!("unsupported filter /{name}")))?;
            let parms = params.get(idx).copied().flatten();
            output = filter.decode(&output, parms)?;
        }
        Ok(output)
    }
}

struct Passthrough;

impl StreamFilter for Passthrough {
    fn decode(&self, data: &[u8], _params: Option<&PDFDict>) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// zlib/deflate with optional PNG or TIFF predictors.
pub struct FlateDecode;

impl StreamFilter for FlateDecode {
    fn decode(&self, data: &[u8], params: Option<&PDFDict>) -> Result<Vec<u8>> {
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut output = Vec::new();
        if let Err(e) = decoder.read_to_end(&mut output) {
            tracing::debug!(error = %e, "zlib stream is damaged, keeping partial output");
            output = decompress_corrupted(data);
        }

        let Some(params) = params else {
            return Ok(output);
        };
        let int_param = |key: &str, default: i64| {
            params
                .get(key)
                .and_then(|v| v.as_int().ok())
                .unwrap_or(default)
        };
        let predictor = int_param("Predictor", 1);
        let columns = usize::try_from(int_param("Columns", 1)).unwrap_or(1);
        let colors = usize::try_from(int_param("Colors", 1)).unwrap_or(1);
        let bits = usize::try_from(int_param("BitsPerComponent", 8)).unwrap_or(8);
        match predictor {
            1 => Ok(output),
            2 => apply_tiff_predictor(&output, columns, colors, bits),
            10..=15 => apply_png_predictor(&output, columns, colors, bits),
            other => Err(PdfError::DecodeError(format!(
                "unsupported predictor {other}"
            ))),
        }
    }
}

/// Best-effort zlib decompression for corrupted streams: keep whatever
/// output was produced before the decoder failed.
fn decompress_corrupted(data: &[u8]) -> Vec<u8> {
    use flate2::{Decompress, FlushDecompress, Status};
    let mut decoder = Decompress::new(true);
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut buf = [0u8; 4096];
    let mut i = 0usize;
    while i < data.len() {
        let before_out = decoder.total_out();
        let before_in = decoder.total_in();
        let res = decoder.decompress(&data[i..i + 1], &mut buf, FlushDecompress::None);
        let produced = (decoder.total_out() - before_out) as usize;
        out.extend_from_slice(&buf[..produced]);
        let consumed = (decoder.total_in() - before_in) as usize;
        i += consumed.max(1);
        match res {
            Ok(Status::StreamEnd) | Err(_) => break,
            Ok(_) => {}
        }
    }
    out
}

/// Bytes per predictor row, checked against the data it has to cover.
fn row_width(data_len: usize, columns: usize, colors: usize, bits_per_component: usize) -> Result<usize> {
    let row_bytes = columns
        .checked_mul(colors)
        .and_then(|n| n.checked_mul(bits_per_component))
        .map(|bits| bits.div_ceil(8))
        .ok_or_else(|| PdfError::DecodeError("predictor row width overflows".into()))?;
    if row_bytes == 0 {
        return Err(PdfError::DecodeError("predictor row width is zero".into()));
    }
    if row_bytes > data_len {
        return Err(PdfError::DecodeError(format!(
            "predictor row of {row_bytes} bytes exceeds {data_len} bytes of data"
        )));
    }
    Ok(row_bytes)
}

/// Undo PNG row prediction: each row carries a leading filter-type byte.
pub fn apply_png_predictor(
    data: &[u8],
    columns: usize,
    colors: usize,
    bits_per_component: usize,
) -> Result<Vec<u8>> {
    let row_bytes = row_width(data.len(), columns, colors, bits_per_component)?;
    let bpp = (colors * bits_per_component / 8).max(1);
    let row_size = row_bytes + 1;

    let mut result = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];
    let mut current_row = vec![0u8; row_bytes];

    for row in data.chunks_exact(row_size) {
        let (filter_type, row_data) = (row[0], &row[1..]);
        for i in 0..row_bytes {
            let left = if i >= bpp { current_row[i - bpp] } else { 0 };
            let above = prev_row[i];
            let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
            let delta = match filter_type {
                0 => 0,
                1 => left,
                2 => above,
                3 => ((u16::from(left) + u16::from(above)) / 2) as u8,
                4 => paeth(left, above, upper_left),
                other => {
                    return Err(PdfError::DecodeError(format!(
                        "unknown PNG filter type {other}"
                    )));
                }
            };
            current_row[i] = row_data[i].wrapping_add(delta);
        }
        result.extend_from_slice(&current_row);
        std::mem::swap(&mut prev_row, &mut current_row);
    }

    Ok(result)
}

/// Undo TIFF predictor 2 (horizontal differencing) for 8-bit components.
pub fn apply_tiff_predictor(
    data: &[u8],
    columns: usize,
    colors: usize,
    bits_per_component: usize,
) -> Result<Vec<u8>> {
    if bits_per_component != 8 {
        return Err(PdfError::DecodeError(format!(
            "TIFF predictor with {bits_per_component} bits per component"
        )));
    }
    let row_bytes = row_width(data.len(), columns, colors, bits_per_component)?;
    let mut result = data.to_vec();
    for row in result.chunks_mut(row_bytes) {
        for i in colors..row.len() {
            row[i] = row[i].wrapping_add(row[i - colors]);
        }
    }
    Ok(result)
}

const fn paeth(left: u8, above: u8, upper_left: u8) -> u8 {
    let (a, b, c) = (left as i32, above as i32, upper_left as i32);
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}

/// ASCIIHexDecode; whitespace ignored, `>` ends the data.
pub struct AsciiHexDecode;

impl StreamFilter for AsciiHexDecode {
    fn decode(&self, data: &[u8], _params: Option<&PDFDict>) -> Result<Vec<u8>> {
        let mut result = Vec::with_capacity(data.len() / 2);
        let mut pending: Option<u8> = None;
        for &byte in data {
            if byte == b'>' {
                break;
            }
            if byte.is_ascii_whitespace() || byte == 0 {
                continue;
            }
            let nibble = hex_nibble(byte).ok_or_else(|| {
                PdfError::DecodeError(format!("invalid ASCIIHex byte {byte:#04x}"))
            })?;
            match pending.take() {
                Some(high) => result.push((high << 4) | nibble),
                None => pending = Some(nibble),
            }
        }
        if let Some(high) = pending {
            result.push(high << 4);
        }
        Ok(result)
    }
}

pub(crate) const fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// ASCII85Decode with `z` groups and optional `<~ ~>` markers.
pub struct Ascii85Decode;

impl StreamFilter for Ascii85Decode {
    fn decode(&self, data: &[u8], _params: Option<&PDFDict>) -> Result<Vec<u8>> {
        let data = data.strip_prefix(b"<~").unwrap_or(data);
        let data = match data.iter().position(|&b| b == b'~') {
            Some(end) => &data[..end],
            None => data,
        };

        let mut result = Vec::with_capacity(data.len() * 4 / 5);
        let mut group = [0u8; 5];
        let mut filled = 0usize;
        for &byte in data {
            match byte {
                b'z' if filled == 0 => result.extend_from_slice(&[0; 4]),
                b'!'..=b'u' => {
                    group[filled] = byte;
                    filled += 1;
                    if filled == 5 {
                        result.extend_from_slice(&decode_group(&group)?);
                        filled = 0;
                    }
                }
                b if b.is_ascii_whitespace() || b == 0 => {}
                other => {
                    return Err(PdfError::DecodeError(format!(
                        "invalid ASCII85 byte {other:#04x}"
                    )));
                }
            }
        }
        if filled > 1 {
            group[filled..].fill(b'u');
            result.extend_from_slice(&decode_group(&group)?[..filled - 1]);
        }
        Ok(result)
    }
}

fn decode_group(group: &[u8; 5]) -> Result<[u8; 4]> {
    let value = group.iter().try_fold(0u32, |acc, &b| {
        acc.checked_mul(85)?.checked_add(u32::from(b - b'!'))
    });
    value
        .map(u32::to_be_bytes)
        .ok_or_else(|| PdfError::DecodeError("ASCII85 group out of range".into()))
}
