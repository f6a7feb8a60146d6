// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// voucherwerk-document — Binary document handling for Voucherwerk.
//
// Sniffs and parses JPEG/PNG containers, writes image-per-page PDFs, and
// reads the page rasters back out of those PDFs. Payloads stay compressed
// throughout; no pixel data is ever decoded.

pub mod image;
pub mod pdf;
pub mod raster;

#[cfg(test)]
mod fixtures;

pub use image::{ImageDecoder, SourceFormat};
pub use pdf::{PdfImageExtractor, PdfPageWriter};
pub use raster::{ColorModel, DecodeParms, RasterImage, StreamFilter};

use voucherwerk_core::error::{Result, VoucherwerkError};

/// Decode any supported upload into the raster for its first page.
///
/// JPEG/PNG are parsed directly; PDFs go through `extractor`.
pub fn decode_upload(bytes: &[u8], extractor: &PdfImageExtractor) -> Result<RasterImage> {
    match ImageDecoder::classify(bytes) {
        SourceFormat::Pdf => extractor.extract_first_page_image(bytes),
        SourceFormat::Unknown => Err(VoucherwerkError::Format(
            "upload is neither JPEG, PNG, nor PDF".into(),
        )),
        _ => ImageDecoder::decode(bytes),
    }
}
