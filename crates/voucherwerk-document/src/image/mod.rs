// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module — format sniffing and JPEG/PNG header decoding.

pub mod decoder;

pub use decoder::{ImageDecoder, JpegFrame, PngHeader, SourceFormat};
