// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Raster image model — compressed payload plus the parameters a PDF image
// XObject needs to render it. Pixels are never decoded.

use voucherwerk_core::error::{Result, VoucherwerkError};

/// Colour space of an embedded raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorModel {
    Gray,
    Rgb,
}

impl ColorModel {
    /// Samples per pixel.
    pub fn components(self) -> u32 {
        match self {
            Self::Gray => 1,
            Self::Rgb => 3,
        }
    }

    /// PDF colour space name, without the leading slash.
    pub fn pdf_name(self) -> &'static str {
        match self {
            Self::Gray => "DeviceGray",
            Self::Rgb => "DeviceRGB",
        }
    }

    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "DeviceGray" => Some(Self::Gray),
            "DeviceRGB" => Some(Self::Rgb),
            _ => None,
        }
    }
}

/// Compression applied to the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamFilter {
    /// Baseline/progressive JPEG bytes, embedded verbatim.
    Dct,
    /// zlib data, e.g. concatenated PNG IDAT chunks.
    Flate,
    None,
}

impl StreamFilter {
    pub fn pdf_name(self) -> Option<&'static str> {
        match self {
            Self::Dct => Some("DCTDecode"),
            Self::Flate => Some("FlateDecode"),
            Self::None => None,
        }
    }

    pub fn from_pdf_name(name: &str) -> Option<Self> {
        match name {
            "DCTDecode" => Some(Self::Dct),
            "FlateDecode" => Some(Self::Flate),
            _ => None,
        }
    }
}

/// `/DecodeParms` for a Flate-compressed image.
///
/// PNG-sourced payloads carry per-row filter bytes, which PDF readers undo
/// via predictor 15. Dropping these parameters on re-embed corrupts the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodeParms {
    pub predictor: u32,
    pub colors: u32,
    pub bits_per_component: u32,
    pub columns: u32,
}

impl DecodeParms {
    /// Parameters matching a non-interlaced PNG of the given shape.
    pub fn png(width: u32, color_model: ColorModel, bits_per_component: u32) -> Self {
        Self {
            predictor: 15,
            colors: color_model.components(),
            bits_per_component,
            columns: width,
        }
    }
}

/// An immutable compressed raster ready to be placed on a PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    width: u32,
    height: u32,
    color_model: ColorModel,
    bits_per_component: u32,
    filter: StreamFilter,
    decode_parms: Option<DecodeParms>,
    payload: Vec<u8>,
}

impl RasterImage {
    /// Validate and assemble a raster. Zero dimensions, an empty payload, or
    /// a bit depth PDF cannot express are rejected with `Format`.
    pub fn new(
        width: u32,
        height: u32,
        color_model: ColorModel,
        bits_per_component: u32,
        filter: StreamFilter,
        decode_parms: Option<DecodeParms>,
        payload: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(VoucherwerkError::Format(format!(
                "raster dimensions must be positive, got {width}x{height}"
            )));
        }
        if !matches!(bits_per_component, 1 | 2 | 4 | 8 | 16) {
            return Err(VoucherwerkError::Format(format!(
                "unsupported bits per component: {bits_per_component}"
            )));
        }
        if payload.is_empty() {
            return Err(VoucherwerkError::Format("raster payload is empty".into()));
        }
        Ok(Self {
            width,
            height,
            color_model,
            bits_per_component,
            filter,
            decode_parms,
            payload,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color_model(&self) -> ColorModel {
        self.color_model
    }

    pub fn bits_per_component(&self) -> u32 {
        self.bits_per_component
    }

    pub fn filter(&self) -> StreamFilter {
        self.filter
    }

    pub fn decode_parms(&self) -> Option<DecodeParms> {
        self.decode_parms
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
