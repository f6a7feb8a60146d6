// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Test images produced by real encoders. Pixels are pseudo-random so the
// compressed payloads stay well above the extractor's size threshold.

use std::io::Cursor;

use ::image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage, Rgba, RgbaImage};

fn noise(seed: u32) -> impl FnMut() -> u8 {
    let mut state = seed | 1;
    move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (state >> 24) as u8
    }
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).expect("encode fixture");
    out.into_inner()
}

pub fn rgb(width: u32, height: u32) -> DynamicImage {
    let mut next = noise(width * 31 + height);
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
        Rgb([next(), next(), next()])
    }))
}

pub fn jpeg_rgb(width: u32, height: u32) -> Vec<u8> {
    encode(rgb(width, height), ImageFormat::Jpeg)
}

pub fn png_rgb(width: u32, height: u32) -> Vec<u8> {
    encode(rgb(width, height), ImageFormat::Png)
}

pub fn png_gray(width: u32, height: u32) -> Vec<u8> {
    let mut next = noise(width + height * 7);
    let image = GrayImage::from_fn(width, height, |_, _| Luma([next()]));
    encode(DynamicImage::ImageLuma8(image), ImageFormat::Png)
}

pub fn png_rgba(width: u32, height: u32) -> Vec<u8> {
    let mut next = noise(width ^ height);
    let image = RgbaImage::from_fn(width, height, |_, _| Rgba([next(), next(), next(), 255]));
    encode(DynamicImage::ImageRgba8(image), ImageFormat::Png)
}
