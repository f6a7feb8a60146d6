// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image decoder — magic-byte sniffing and header parsing for JPEG and PNG.
//
// Only the container structure is read (markers, chunk headers). The
// compressed payload is handed to the PDF writer untouched.

use tracing::{debug, instrument};
use voucherwerk_core::error::{Result, VoucherwerkError};

use crate::raster::{ColorModel, DecodeParms, RasterImage, StreamFilter};

const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n'];
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Container format detected from the leading bytes of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Pdf,
    Unknown,
}

impl SourceFormat {
    /// Conventional file extension, used when naming stored objects.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Pdf => "pdf",
            Self::Unknown => "bin",
        }
    }
}

/// Frame parameters read from a JPEG start-of-frame segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegFrame {
    pub width: u32,
    pub height: u32,
    pub precision: u8,
    pub components: u8,
}

/// Fields of a PNG `IHDR` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PngHeader {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub interlace: u8,
}

/// Stateless JPEG/PNG header reader.
pub struct ImageDecoder;

impl ImageDecoder {
    /// Sniff the container format from magic bytes, ignoring any file name.
    pub fn classify(bytes: &[u8]) -> SourceFormat {
        if bytes.starts_with(&JPEG_SOI) {
            SourceFormat::Jpeg
        } else if bytes.starts_with(&PNG_SIGNATURE) {
            SourceFormat::Png
        } else if bytes.starts_with(PDF_MAGIC) {
            SourceFormat::Pdf
        } else {
            SourceFormat::Unknown
        }
    }

    /// Width and height of a JPEG.
    pub fn jpeg_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
        let frame = Self::jpeg_frame(bytes)?;
        Ok((frame.width, frame.height))
    }

    /// Walk the marker stream after SOI until a start-of-frame segment.
    ///
    /// SOF markers are 0xC0..=0xCF minus DHT (C4), JPG (C8), and DAC (CC).
    /// Fill bytes (repeated 0xFF) and stray non-marker bytes are skipped. Reaching
    /// SOS or EOI first means the frame header is missing.
    pub fn jpeg_frame(bytes: &[u8]) -> Result<JpegFrame> {
        if !bytes.starts_with(&JPEG_SOI) {
            return Err(VoucherwerkError::Format("missing JPEG SOI marker".into()));
        }

        let mut i = 2;
        while i < bytes.len() {
            if bytes[i] != 0xFF {
                i += 1;
                continue;
            }
            while i < bytes.len() && bytes[i] == 0xFF {
                i += 1;
            }
            let Some(&marker) = bytes.get(i) else {
                break;
            };
            i += 1;

            match marker {
                // Stuffed zero or restart/TEM markers carry no length.
                0x00 | 0x01 | 0xD0..=0xD7 => continue,
                0xD9 | 0xDA => break,
                0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                    let segment = bytes.get(i..i + 8).ok_or_else(|| {
                        VoucherwerkError::Format("truncated JPEG frame header".into())
                    })?;
                    let frame = JpegFrame {
                        precision: segment[2],
                        height: u32::from(u16::from_be_bytes([segment[3], segment[4]])),
                        width: u32::from(u16::from_be_bytes([segment[5], segment[6]])),
                        components: segment[7],
                    };
                    debug!(marker, ?frame, "JPEG frame header found");
                    return Ok(frame);
                }
                _ => {
                    let Some(len) = bytes.get(i..i + 2) else {
                        break;
                    };
                    let len = usize::from(u16::from_be_bytes([len[0], len[1]]));
                    if len < 2 {
                        return Err(VoucherwerkError::Format(format!(
                            "invalid JPEG segment length {len} for marker {marker:#04X}"
                        )));
                    }
                    i += len;
                }
            }
        }

        Err(VoucherwerkError::Format(
            "no JPEG start-of-frame marker found".into(),
        ))
    }

    /// Read the fixed-offset `IHDR` fields of a PNG.
    pub fn png_header(bytes: &[u8]) -> Result<PngHeader> {
        if !bytes.starts_with(&PNG_SIGNATURE) {
            return Err(VoucherwerkError::Format("PNG signature mismatch".into()));
        }
        // signature(8) + length(4) + "IHDR"(4) + 13 data bytes
        let ihdr = bytes
            .get(8..29)
            .ok_or_else(|| VoucherwerkError::Format("truncated PNG header".into()))?;
        if &ihdr[4..8] != b"IHDR" {
            return Err(VoucherwerkError::Format("first PNG chunk is not IHDR".into()));
        }
        Ok(PngHeader {
            width: u32::from_be_bytes([ihdr[8], ihdr[9], ihdr[10], ihdr[11]]),
            height: u32::from_be_bytes([ihdr[12], ihdr[13], ihdr[14], ihdr[15]]),
            bit_depth: ihdr[16],
            color_type: ihdr[17],
            interlace: ihdr[20],
        })
    }

    /// Concatenate every `IDAT` payload up to `IEND`.
    ///
    /// Chunk layout: length(4, big-endian) type(4) data(length) crc(4).
    pub fn png_idat(bytes: &[u8]) -> Result<Vec<u8>> {
        if !bytes.starts_with(&PNG_SIGNATURE) {
            return Err(VoucherwerkError::Format("PNG signature mismatch".into()));
        }

        let mut idat = Vec::new();
        let mut pos = PNG_SIGNATURE.len();
        while let Some(header) = bytes.get(pos..pos + 8) {
            let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let kind = &header[4..8];
            let data_start = pos + 8;
            let data = bytes.get(data_start..data_start + len).ok_or_else(|| {
                VoucherwerkError::Format(format!(
                    "PNG chunk {} overruns the buffer",
                    String::from_utf8_lossy(kind)
                ))
            })?;
            match kind {
                b"IDAT" => idat.extend_from_slice(data),
                b"IEND" => break,
                _ => {}
            }
            pos = data_start + len + 4;
        }

        if idat.is_empty() {
            return Err(VoucherwerkError::Format("PNG has no IDAT data".into()));
        }
        Ok(idat)
    }

    /// Decode a JPEG or PNG upload into an embeddable raster.
    #[instrument(skip_all, fields(bytes_len = bytes.len()))]
    pub fn decode(bytes: &[u8]) -> Result<RasterImage> {
        match Self::classify(bytes) {
            SourceFormat::Jpeg => Self::decode_jpeg(bytes),
            SourceFormat::Png => Self::decode_png(bytes),
            SourceFormat::Pdf => Err(VoucherwerkError::Format(
                "PDF is not a raster; use the image extractor".into(),
            )),
            SourceFormat::Unknown => Err(VoucherwerkError::Format(
                "unrecognised image signature".into(),
            )),
        }
    }

    /// JPEG bytes are embedded whole under DCTDecode.
    pub fn decode_jpeg(bytes: &[u8]) -> Result<RasterImage> {
        let frame = Self::jpeg_frame(bytes)?;
        let color_model = match frame.components {
            1 => ColorModel::Gray,
            3 => ColorModel::Rgb,
            n => {
                return Err(VoucherwerkError::Format(format!(
                    "JPEG with {n} components is not supported"
                )));
            }
        };
        RasterImage::new(
            frame.width,
            frame.height,
            color_model,
            u32::from(frame.precision),
            StreamFilter::Dct,
            None,
            bytes.to_vec(),
        )
    }

    /// PNG IDAT data is zlib with per-row filters, embedded under FlateDecode
    /// with predictor 15.
    pub fn decode_png(bytes: &[u8]) -> Result<RasterImage> {
        let header = Self::png_header(bytes)?;
        let color_model = match header.color_type {
            0 => ColorModel::Gray,
            2 => ColorModel::Rgb,
            3 => return Err(VoucherwerkError::Format("palette PNG is not supported".into())),
            4 | 6 => {
                return Err(VoucherwerkError::Format(
                    "PNG with alpha channel is not supported".into(),
                ));
            }
            other => {
                return Err(VoucherwerkError::Format(format!(
                    "invalid PNG colour type {other}"
                )));
            }
        };
        if header.interlace != 0 {
            return Err(VoucherwerkError::Format(
                "interlaced PNG is not supported".into(),
            ));
        }

        let bpc = u32::from(header.bit_depth);
        RasterImage::new(
            header.width,
            header.height,
            color_model,
            bpc,
            StreamFilter::Flate,
            Some(DecodeParms::png(header.width, color_model, bpc)),
            Self::png_idat(bytes)?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn classify_by_magic_bytes() {
        assert_eq!(ImageDecoder::classify(&fixtures::jpeg_rgb(8, 8)), SourceFormat::Jpeg);
        assert_eq!(ImageDecoder::classify(&fixtures::png_rgb(8, 8)), SourceFormat::Png);
        assert_eq!(ImageDecoder::classify(b"%PDF-1.4\n"), SourceFormat::Pdf);
        assert_eq!(ImageDecoder::classify(b"GIF89a"), SourceFormat::Unknown);
        assert_eq!(ImageDecoder::classify(b""), SourceFormat::Unknown);
    }

    #[test]
    fn jpeg_dimensions_from_encoder_output() {
        let jpeg = fixtures::jpeg_rgb(123, 45);
        assert_eq!(ImageDecoder::jpeg_dimensions(&jpeg).unwrap(), (123, 45));

        let raster = ImageDecoder::decode(&jpeg).unwrap();
        assert_eq!(raster.color_model(), ColorModel::Rgb);
        assert_eq!(raster.filter(), StreamFilter::Dct);
        assert_eq!(raster.payload(), jpeg.as_slice());
    }

    #[test]
    fn jpeg_skips_fill_bytes_and_app_segments() {
        // SOI, fill, APP0 (len 4), SOF0 for 2x3 greyscale.
        let bytes = [
            0xFF, 0xD8, 0xFF, 0xFF, 0xE0, 0x00, 0x04, 0xAA, 0xBB, 0xFF, 0xC0, 0x00, 0x0B, 0x08,
            0x00, 0x03, 0x00, 0x02, 0x01, 0x01, 0x11, 0x00,
        ];
        let frame = ImageDecoder::jpeg_frame(&bytes).unwrap();
        assert_eq!((frame.width, frame.height, frame.components), (2, 3, 1));
    }

    #[test]
    fn jpeg_dht_is_not_a_frame() {
        // DHT (C4) shaped like a frame header, then EOI.
        let bytes = [
            0xFF, 0xD8, 0xFF, 0xC4, 0x00, 0x08, 0x08, 0x00, 0x10, 0x00, 0x10, 0x03, 0xFF, 0xD9,
        ];
        assert!(matches!(
            ImageDecoder::jpeg_dimensions(&bytes),
            Err(VoucherwerkError::Format(_))
        ));
    }

    #[test]
    fn jpeg_without_soi_is_rejected() {
        assert!(ImageDecoder::jpeg_dimensions(b"\x00\x01\x02").is_err());
        assert!(ImageDecoder::jpeg_dimensions(&[0xFF, 0xD8]).is_err());
    }

    #[test]
    fn png_header_fields() {
        let png = fixtures::png_rgb(31, 17);
        let header = ImageDecoder::png_header(&png).unwrap();
        assert_eq!((header.width, header.height), (31, 17));
        assert_eq!(header.bit_depth, 8);
        assert_eq!(header.color_type, 2);
        assert_eq!(header.interlace, 0);
    }

    #[test]
    fn png_raster_carries_predictor() {
        let raster = ImageDecoder::decode(&fixtures::png_gray(20, 10)).unwrap();
        assert_eq!(raster.color_model(), ColorModel::Gray);
        assert_eq!(raster.filter(), StreamFilter::Flate);
        assert_eq!(raster.decode_parms(), Some(DecodeParms::png(20, ColorModel::Gray, 8)));
    }

    #[test]
    fn idat_chunks_are_concatenated() {
        let mut png = PNG_SIGNATURE.to_vec();
        let mut chunk = |kind: &[u8], data: &[u8]| {
            png.extend_from_slice(&(data.len() as u32).to_be_bytes());
            png.extend_from_slice(kind);
            png.extend_from_slice(data);
            png.extend_from_slice(&[0; 4]);
        };
        chunk(b"IHDR", &[0, 0, 0, 1, 0, 0, 0, 1, 8, 0, 0, 0, 0]);
        chunk(b"IDAT", b"abc");
        chunk(b"tEXt", b"ignored");
        chunk(b"IDAT", b"def");
        chunk(b"IEND", b"");
        chunk(b"IDAT", b"after-end");

        assert_eq!(ImageDecoder::png_idat(&png).unwrap(), b"abcdef");
    }

    #[test]
    fn png_without_idat_fails() {
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend_from_slice(&0u32.to_be_bytes());
        png.extend_from_slice(b"IEND");
        png.extend_from_slice(&[0; 4]);
        assert!(ImageDecoder::png_idat(&png).is_err());
    }

    #[test]
    fn png_alpha_is_rejected() {
        let err = ImageDecoder::decode(&fixtures::png_rgba(4, 4)).unwrap_err();
        assert!(err.to_string().contains("alpha"));
    }

    #[test]
    fn pdf_is_not_a_raster() {
        assert!(ImageDecoder::decode(b"%PDF-1.4\n").is_err());
    }
}
