// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF page writer — emits a PDF 1.4 file with one full-page image per page.
//
// Object numbering for N pages is fixed so the extractor can rely on it:
//
//   1            Catalog
//   2            Pages
//   3 + i        Page i
//   3 + N + i    Content stream for page i
//   3 + 2N + i   Image XObject for page i

use tracing::{debug, instrument};
use voucherwerk_core::error::{Result, VoucherwerkError};

use crate::raster::{RasterImage, StreamFilter};

const HEADER: &[u8] = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n";

/// Serialises ordered raster images into a PDF byte stream.
///
/// Each page's MediaBox equals the image's pixel dimensions in points, so the
/// image fills the page at one pixel per point.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfPageWriter;

/// Accumulates object bytes and records their offsets for the xref table.
struct ObjectSink {
    out: Vec<u8>,
    offsets: Vec<usize>,
}

impl ObjectSink {
    fn new(object_count: usize, capacity: usize) -> Self {
        let mut out = Vec::with_capacity(capacity);
        out.extend_from_slice(HEADER);
        Self {
            out,
            offsets: vec![0; object_count],
        }
    }

    fn begin(&mut self, number: usize) {
        self.offsets[number - 1] = self.out.len();
        self.push(&format!("{number} 0 obj\n"));
    }

    fn push(&mut self, text: &str) {
        self.out.extend_from_slice(text.as_bytes());
    }

    fn dict_object(&mut self, number: usize, dict: &str) {
        self.begin(number);
        self.push(dict);
        self.push("\nendobj\n");
    }

    /// `dict` must already contain the matching `/Length`.
    fn stream_object(&mut self, number: usize, dict: &str, data: &[u8]) {
        self.begin(number);
        self.push(dict);
        self.push("\nstream\n");
        self.out.extend_from_slice(data);
        self.push("\nendstream\nendobj\n");
    }

    fn finish(mut self) -> Vec<u8> {
        let size = self.offsets.len() + 1;
        let xref_offset = self.out.len();
        self.push(&format!("xref\n0 {size}\n0000000000 65535 f \n"));
        let entries: String = self
            .offsets
            .iter()
            .map(|offset| format!("{offset:010} 00000 n \n"))
            .collect();
        self.push(&entries);
        self.push(&format!(
            "trailer\n<< /Size {size} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        ));
        self.out
    }
}

fn image_dict(image: &RasterImage) -> String {
    let mut dict = format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /{} /BitsPerComponent {}",
        image.width(),
        image.height(),
        image.color_model().pdf_name(),
        image.bits_per_component(),
    );
    if let Some(filter) = image.filter().pdf_name() {
        dict.push_str(&format!(" /Filter /{filter}"));
    }
    let parms = image
        .decode_parms()
        .filter(|_| image.filter() != StreamFilter::Dct);
    if let Some(parms) = parms {
        dict.push_str(&format!(
            " /DecodeParms << /Predictor {} /Colors {} /BitsPerComponent {} /Columns {} >>",
            parms.predictor, parms.colors, parms.bits_per_component, parms.columns
        ));
    }
    dict.push_str(&format!(" /Length {} >>", image.payload().len()));
    dict
}

impl PdfPageWriter {
    pub fn new() -> Self {
        Self
    }

    /// One-page PDF holding `image`.
    pub fn build_single_page(&self, image: &RasterImage) -> Vec<u8> {
        self.write_pages(std::slice::from_ref(image))
    }

    /// Multi-page PDF with pages in the order given. Index 0 is the voucher's
    /// original page.
    #[instrument(skip_all, fields(pages = images.len()))]
    pub fn build_multi_page(&self, images: &[RasterImage]) -> Result<Vec<u8>> {
        if images.is_empty() {
            return Err(VoucherwerkError::EmptyDocument);
        }
        Ok(self.write_pages(images))
    }

    fn write_pages(&self, images: &[RasterImage]) -> Vec<u8> {
        let n = images.len();
        let payload_bytes: usize = images.iter().map(|i| i.payload().len()).sum();
        let mut sink = ObjectSink::new(2 + 3 * n, payload_bytes + 512 * (n + 1));

        let page_obj = |i: usize| 3 + i;
        let content_obj = |i: usize| 3 + n + i;
        let image_obj = |i: usize| 3 + 2 * n + i;

        sink.dict_object(1, "<< /Type /Catalog /Pages 2 0 R >>");

        let kids: Vec<String> = (0..n).map(|i| format!("{} 0 R", page_obj(i))).collect();
        sink.dict_object(
            2,
            &format!("<< /Type /Pages /Kids [{}] /Count {n} >>", kids.join(" ")),
        );

        for (i, image) in images.iter().enumerate() {
            sink.dict_object(
                page_obj(i),
                &format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Contents {} 0 R \
                     /Resources << /XObject << /Im1 {} 0 R >> >> >>",
                    image.width(),
                    image.height(),
                    content_obj(i),
                    image_obj(i),
                ),
            );
        }

        for (i, image) in images.iter().enumerate() {
            let content = format!("q\n{} 0 0 {} 0 0 cm\n/Im1 Do\nQ\n", image.width(), image.height());
            sink.stream_object(
                content_obj(i),
                &format!("<< /Length {} >>", content.len()),
                content.as_bytes(),
            );
        }

        for (i, image) in images.iter().enumerate() {
            sink.stream_object(image_obj(i), &image_dict(image), image.payload());
        }

        let out = sink.finish();
        debug!(pages = n, bytes = out.len(), "PDF written");
        out
    }
}
