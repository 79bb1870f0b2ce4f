//! Format and color-mode classification from raw image bytes.

pub mod png;

use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
    Gif,
    Bmp,
    Unknown,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived from bytes on every call. `is_grayscale` is `None` when undetermined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SniffResult {
    pub format: ImageFormat,
    pub is_grayscale: Option<bool>,
}

pub fn detect_format(bytes: &[u8]) -> ImageFormat {
    if bytes.starts_with(&png::SIGNATURE) {
        ImageFormat::Png
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        ImageFormat::Jpeg
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        ImageFormat::Webp
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        ImageFormat::Gif
    } else if bytes.starts_with(b"BM") {
        ImageFormat::Bmp
    } else {
        ImageFormat::Unknown
    }
}

/// Header-only check. PNG answers only for grayscale color types; JPEG answers
/// from the first start-of-frame component count.
pub fn is_grayscale_quick(bytes: &[u8]) -> Option<bool> {
    match detect_format(bytes) {
        ImageFormat::Png => png::read_header(bytes)
            .ok()
            .filter(png::Header::is_grayscale_color_type)
            .map(|_| true),
        ImageFormat::Jpeg => jpeg_single_component(bytes),
        _ => None,
    }
}

/// Full scanline decode for 8-bit non-interlaced truecolor PNGs.
///
/// Malformed streams degrade to `None`; the decode error is only logged.
pub fn is_grayscale_full(bytes: &[u8]) -> Option<bool> {
    match png::is_grayscale(bytes) {
        Ok(result) => result,
        Err(err) => {
            tracing::debug!(error = %err, "png decode failed; color mode left unknown");
            None
        }
    }
}

/// Quick check first, PNG full decode when the quick check is inconclusive.
pub fn sniff_bytes(bytes: &[u8]) -> SniffResult {
    let format = detect_format(bytes);
    let is_grayscale = match is_grayscale_quick(bytes) {
        Some(answer) => Some(answer),
        None if format == ImageFormat::Png => is_grayscale_full(bytes),
        None => None,
    };
    SniffResult {
        format,
        is_grayscale,
    }
}

pub fn classify(path: &Path) -> std::io::Result<SniffResult> {
    let bytes = std::fs::read(path)?;
    Ok(sniff_bytes(&bytes))
}

fn jpeg_single_component(bytes: &[u8]) -> Option<bool> {
    let mut i = 2;
    while i + 1 < bytes.len() {
        if bytes[i] != 0xFF {
            return None;
        }
        let marker = bytes[i + 1];
        match marker {
            // fill byte
            0xFF => i += 1,
            0x01 | 0xD0..=0xD9 => i += 2,
            // entropy-coded data follows SOS; no frame header seen
            0xDA => return None,
            0xC0..=0xC2 => return bytes.get(i + 9).map(|&components| components == 1),
            _ => {
                let high = *bytes.get(i + 2)?;
                let low = *bytes.get(i + 3)?;
                let length = usize::from(u16::from_be_bytes([high, low]));
                if length < 2 {
                    return None;
                }
                i += 2 + length;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::png::tests::{chunk, hand_png, ihdr};
    use super::png::SIGNATURE;
    use super::{
        classify, detect_format, is_grayscale_full, is_grayscale_quick, sniff_bytes, ImageFormat,
    };

    fn jpeg_with_components(components: u8) -> Vec<u8> {
        let mut bytes = vec![0xFF, 0xD8];
        // APP0 with a 16-byte segment
        bytes.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x10]);
        bytes.extend_from_slice(b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0");
        // fill bytes before the frame marker
        bytes.extend_from_slice(&[0xFF, 0xFF]);
        let length = 8 + 3 * u16::from(components);
        bytes.extend_from_slice(&[0xFF, 0xC0]);
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend_from_slice(&[8, 0x00, 0x10, 0x00, 0x10, components]);
        for id in 1..=components {
            bytes.extend_from_slice(&[id, 0x11, 0]);
        }
        bytes.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x02, 0xFF, 0xD9]);
        bytes
    }

    #[test]
    fn detects_canonical_magic_bytes() {
        assert_eq!(detect_format(&SIGNATURE), ImageFormat::Png);
        assert_eq!(detect_format(&[0xFF, 0xD8, 0xFF, 0xE0]), ImageFormat::Jpeg);
        assert_eq!(detect_format(b"RIFF\x24\0\0\0WEBPVP8 "), ImageFormat::Webp);
        assert_eq!(detect_format(b"GIF87a\x01\0"), ImageFormat::Gif);
        assert_eq!(detect_format(b"GIF89a\x01\0"), ImageFormat::Gif);
        assert_eq!(detect_format(b"BM\x36\0\0\0"), ImageFormat::Bmp);
        assert_eq!(detect_format(b""), ImageFormat::Unknown);
        assert_eq!(detect_format(b"RIFF\x24\0\0\0WAVE"), ImageFormat::Unknown);
    }

    #[test]
    fn quick_png_grayscale_needs_no_image_data() {
        let mut png = SIGNATURE.to_vec();
        png.extend(ihdr(8, 8, 8, 0, 0));
        assert_eq!(is_grayscale_quick(&png), Some(true));

        let mut with_alpha = SIGNATURE.to_vec();
        with_alpha.extend(ihdr(8, 8, 8, 4, 0));
        assert_eq!(is_grayscale_quick(&with_alpha), Some(true));
    }

    #[test]
    fn quick_png_defers_on_color_types() {
        for color_type in [2, 3, 6] {
            let mut png = SIGNATURE.to_vec();
            png.extend(ihdr(8, 8, 8, color_type, 0));
            assert_eq!(is_grayscale_quick(&png), None);
        }
    }

    #[test]
    fn quick_jpeg_reads_component_count() {
        assert_eq!(is_grayscale_quick(&jpeg_with_components(1)), Some(true));
        assert_eq!(is_grayscale_quick(&jpeg_with_components(3)), Some(false));
        assert_eq!(is_grayscale_quick(&[0xFF, 0xD8, 0xFF, 0xDA, 0x00, 0x02]), None);
        assert_eq!(is_grayscale_quick(&[0xFF, 0xD8]), None);
    }

    #[test]
    fn quick_has_no_answer_for_other_formats() {
        assert_eq!(is_grayscale_quick(b"GIF89a\x01\0\x01\0"), None);
        assert_eq!(is_grayscale_quick(b"BM"), None);
    }

    #[test]
    fn combined_policy_falls_back_to_full_decode() -> anyhow::Result<()> {
        let gray = hand_png(1, 1, 2, &[0, 42, 42, 42])?;
        assert_eq!(
            sniff_bytes(&gray),
            super::SniffResult {
                format: ImageFormat::Png,
                is_grayscale: Some(true),
            }
        );
        let red = hand_png(1, 1, 6, &[0, 255, 0, 0, 255])?;
        assert_eq!(sniff_bytes(&red).is_grayscale, Some(false));
        Ok(())
    }

    #[test]
    fn indexed_png_stays_unknown() {
        let mut png = SIGNATURE.to_vec();
        png.extend(ihdr(4, 4, 8, 3, 0));
        png.extend(chunk(b"PLTE", &[0, 0, 0, 255, 0, 0]));
        png.extend(chunk(b"IEND", &[]));
        assert_eq!(sniff_bytes(&png).is_grayscale, None);
    }

    #[test]
    fn corrupt_png_degrades_to_unknown() {
        let mut png = SIGNATURE.to_vec();
        png.extend(ihdr(4, 4, 8, 2, 0));
        png.extend(chunk(b"IDAT", b"definitely not zlib"));
        png.extend(chunk(b"IEND", &[]));
        assert_eq!(is_grayscale_full(&png), None);
        assert_eq!(sniff_bytes(&png).format, ImageFormat::Png);
    }

    #[test]
    fn absurd_width_degrades_to_unknown() {
        let mut png = SIGNATURE.to_vec();
        png.extend(ihdr(u32::MAX, 1, 8, 6, 0));
        png.extend(chunk(b"IDAT", &[0x78, 0x9C, 0x63, 0, 0, 0, 1, 0, 1]));
        png.extend(chunk(b"IEND", &[]));
        let result = sniff_bytes(&png);
        assert_eq!(result.format, ImageFormat::Png);
        assert_eq!(result.is_grayscale, None);
    }

    #[test]
    fn classify_reads_from_disk() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("tex.png");
        std::fs::write(&path, hand_png(2, 1, 2, &[0, 7, 7, 7, 9, 9, 9])?)?;
        let result = classify(&path)?;
        assert_eq!(result.format, ImageFormat::Png);
        assert_eq!(result.is_grayscale, Some(true));

        let empty = temp.path().join("empty.bin");
        std::fs::write(&empty, b"")?;
        assert_eq!(classify(&empty)?.format, ImageFormat::Unknown);
        assert!(classify(&temp.path().join("missing.png")).is_err());
        Ok(())
    }
}
