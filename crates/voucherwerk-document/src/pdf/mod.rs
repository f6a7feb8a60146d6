// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module — writing image-per-page PDFs and reading their rasters back.

pub mod reader;
pub mod syntax;
pub mod writer;

pub use reader::PdfImageExtractor;
pub use writer::PdfPageWriter;
