//! Minimal PNG reader: chunk walking, IHDR parsing and scanline reconstruction
//! for 8-bit non-interlaced truecolor images.

use std::io::Read;

use flate2::read::ZlibDecoder;
use thiserror::Error;

pub const SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const COLOR_TRUECOLOR: u8 = 2;
const COLOR_TRUECOLOR_ALPHA: u8 = 6;

/// Largest width or height a PNG may declare.
const MAX_DIMENSION: u32 = (1 << 31) - 1;

/// Upper bound on zlib's expansion ratio for a single stream.
const MAX_INFLATE_RATIO: usize = 1032;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("missing PNG signature")]
    Signature,
    #[error("truncated chunk at offset {offset}")]
    TruncatedChunk { offset: usize },
    #[error("IHDR must be the first chunk and carry 13 bytes")]
    Header,
    #[error("image has zero width or height")]
    EmptyImage,
    #[error("no IDAT data before IEND")]
    MissingData,
    #[error("declared dimensions exceed what the image data can hold")]
    Dimensions,
    #[error("inflate failed: {0}")]
    Inflate(#[from] std::io::Error),
    #[error("unknown filter type {filter} on row {row}")]
    Filter { filter: u8, row: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub kind: [u8; 4],
    pub data: &'a [u8],
}

/// Walks length-prefixed chunks after the signature. CRCs are skipped unchecked.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Result<Chunk<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.bytes.len() {
            return None;
        }
        let start = self.offset;
        let parsed = parse_chunk(self.bytes, start);
        match parsed {
            Some((chunk, next)) => {
                self.offset = next;
                Some(Ok(chunk))
            }
            None => {
                self.offset = self.bytes.len();
                Some(Err(DecodeError::TruncatedChunk { offset: start }))
            }
        }
    }
}

fn parse_chunk(bytes: &[u8], start: usize) -> Option<(Chunk<'_>, usize)> {
    let length_bytes: [u8; 4] = bytes.get(start..start + 4)?.try_into().ok()?;
    let length = usize::try_from(u32::from_be_bytes(length_bytes)).ok()?;
    let kind: [u8; 4] = bytes.get(start + 4..start + 8)?.try_into().ok()?;
    let data_end = (start + 8).checked_add(length)?;
    let data = bytes.get(start + 8..data_end)?;
    // A short CRC on the final chunk is tolerated.
    let next = data_end.saturating_add(4).min(bytes.len());
    Some((Chunk { kind, data }, next))
}

pub fn chunks(bytes: &[u8]) -> Result<Chunks<'_>, DecodeError> {
    if !bytes.starts_with(&SIGNATURE) {
        return Err(DecodeError::Signature);
    }
    Ok(Chunks {
        bytes,
        offset: SIGNATURE.len(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub interlace: u8,
}

impl Header {
    /// Bytes per pixel when the full decode supports this layout.
    pub fn truecolor_bytes_per_pixel(&self) -> Option<usize> {
        if self.bit_depth != 8 || self.interlace != 0 {
            return None;
        }
        match self.color_type {
            COLOR_TRUECOLOR => Some(3),
            COLOR_TRUECOLOR_ALPHA => Some(4),
            _ => None,
        }
    }

    pub fn is_grayscale_color_type(&self) -> bool {
        matches!(self.color_type, 0 | 4)
    }
}

/// Reads IHDR, which must be the first chunk. Nothing past it is touched.
pub fn read_header(bytes: &[u8]) -> Result<Header, DecodeError> {
    let first = chunks(bytes)?.next().ok_or(DecodeError::Header)??;
    if &first.kind != b"IHDR" || first.data.len() < 13 {
        return Err(DecodeError::Header);
    }
    let data = first.data;
    let width = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let height = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(DecodeError::Dimensions);
    }
    Ok(Header {
        width,
        height,
        bit_depth: data[8],
        color_type: data[9],
        interlace: data[12],
    })
}

/// Decodes every scanline and compares R, G and B per pixel.
///
/// Returns `Ok(None)` for layouts outside 8-bit non-interlaced truecolor
/// (with or without alpha). Stops at the first non-gray pixel.
pub fn is_grayscale(bytes: &[u8]) -> Result<Option<bool>, DecodeError> {
    let header = read_header(bytes)?;
    let Some(bpp) = header.truecolor_bytes_per_pixel() else {
        return Ok(None);
    };
    if header.width == 0 || header.height == 0 {
        return Err(DecodeError::EmptyImage);
    }

    let compressed = image_data(bytes)?;
    let stride = usize::try_from(header.width)
        .ok()
        .and_then(|width| width.checked_mul(bpp))
        .ok_or(DecodeError::Dimensions)?;
    let inflated_limit = compressed.len().saturating_mul(MAX_INFLATE_RATIO);
    if stride >= inflated_limit {
        return Err(DecodeError::Dimensions);
    }

    let mut decoder = ZlibDecoder::new(compressed.as_slice());
    let mut previous = row_buffer(stride)?;
    let mut current = row_buffer(stride)?;
    let mut filter = [0u8; 1];
    for row in 0..header.height {
        decoder.read_exact(&mut filter)?;
        decoder.read_exact(&mut current)?;
        unfilter_row(filter[0], &mut current, &previous, bpp)
            .map_err(|filter| DecodeError::Filter { filter, row })?;
        if !row_is_gray(&current, bpp) {
            return Ok(Some(false));
        }
        std::mem::swap(&mut previous, &mut current);
    }
    Ok(Some(true))
}

fn row_buffer(stride: usize) -> Result<Vec<u8>, DecodeError> {
    let mut row = Vec::new();
    row.try_reserve_exact(stride)
        .map_err(|_| DecodeError::Dimensions)?;
    row.resize(stride, 0);
    Ok(row)
}

/// IDAT payloads concatenated in file order, collected up to IEND.
fn image_data(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut compressed = Vec::new();
    for chunk in chunks(bytes)? {
        let chunk = chunk?;
        match &chunk.kind {
            b"IDAT" => compressed.extend_from_slice(chunk.data),
            b"IEND" => break,
            _ => {}
        }
    }
    if compressed.is_empty() {
        return Err(DecodeError::MissingData);
    }
    Ok(compressed)
}

/// Reverses the filter in place. `previous` is the already-reconstructed row
/// above, all zeros for the first row. Returns the tag on an unknown filter.
pub(crate) fn unfilter_row(
    filter: u8,
    row: &mut [u8],
    previous: &[u8],
    bpp: usize,
) -> Result<(), u8> {
    match filter {
        0 => {}
        1 => {
            for i in bpp..row.len() {
                row[i] = row[i].wrapping_add(row[i - bpp]);
            }
        }
        2 => {
            for (out, up) in row.iter_mut().zip(previous) {
                *out = out.wrapping_add(*up);
            }
        }
        3 => {
            for i in 0..row.len() {
                let left = if i >= bpp { u16::from(row[i - bpp]) } else { 0 };
                let up = u16::from(previous[i]);
                row[i] = row[i].wrapping_add(((left + up) / 2) as u8);
            }
        }
        4 => {
            for i in 0..row.len() {
                let (left, upleft) = if i >= bpp {
                    (row[i - bpp], previous[i - bpp])
                } else {
                    (0, 0)
                };
                row[i] = row[i].wrapping_add(paeth(left, previous[i], upleft));
            }
        }
        other => return Err(other),
    }
    Ok(())
}

/// Paeth predictor. Ties go to left, then up, then upper-left.
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn row_is_gray(row: &[u8], bpp: usize) -> bool {
    row.chunks_exact(bpp)
        .all(|pixel| pixel[0] == pixel[1] && pixel[1] == pixel[2])
}
