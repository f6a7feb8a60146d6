// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF image extractor — recovers page rasters from PDFs written by
// `PdfPageWriter`, so a voucher can be rebuilt with extra pages.

use tracing::{debug, instrument, warn};
use voucherwerk_core::MergeConfig;
use voucherwerk_core::error::{Result, VoucherwerkError};

use crate::pdf::syntax::{ObjectScanner, PdfDict};
use crate::pdf::writer::PdfPageWriter;
use crate::raster::{ColorModel, DecodeParms, RasterImage, StreamFilter};

/// Default lower bound on an image stream's length.
pub const DEFAULT_MIN_IMAGE_STREAM_LEN: usize = 1000;

/// Reads embedded image XObjects back out of engine-produced PDFs.
///
/// Not a general PDF parser: object streams, indirect `/Length` values, and
/// string objects are all unsupported and surface as `PdfParse`.
#[derive(Debug, Clone, Copy)]
pub struct PdfImageExtractor {
    /// Image streams shorter than this are skipped as non-image artifacts.
    min_image_stream_len: usize,
}

impl Default for PdfImageExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_IMAGE_STREAM_LEN)
    }
}

impl PdfImageExtractor {
    pub fn new(min_image_stream_len: usize) -> Self {
        Self {
            min_image_stream_len,
        }
    }

    pub fn from_config(config: &MergeConfig) -> Self {
        Self::new(config.min_image_stream_len)
    }

    pub fn min_image_stream_len(&self) -> usize {
        self.min_image_stream_len
    }

    /// Raster behind the first page.
    #[instrument(skip_all, fields(bytes_len = pdf.len()))]
    pub fn extract_first_page_image(&self, pdf: &[u8]) -> Result<RasterImage> {
        let mut images = self.images(pdf)?;
        match images.next() {
            Some(image) => image,
            None => Err(VoucherwerkError::PdfParse(
                "no embedded page image found".into(),
            )),
        }
    }

    /// Rasters of every page, in file order.
    #[instrument(skip_all, fields(bytes_len = pdf.len()))]
    pub fn extract_all_page_images(&self, pdf: &[u8]) -> Result<Vec<RasterImage>> {
        let images = self.images(pdf)?.collect::<Result<Vec<_>>>()?;
        debug!(count = images.len(), "page images extracted");
        Ok(images)
    }

    /// Reduce a PDF to its first page. Anything that cannot be parsed is
    /// returned unchanged, since an unmerged document is still usable.
    #[instrument(skip_all, fields(bytes_len = pdf.len()))]
    pub fn first_page_only(&self, pdf: &[u8]) -> Vec<u8> {
        match self.extract_first_page_image(pdf) {
            Ok(image) => PdfPageWriter::new().build_single_page(&image),
            Err(err) => {
                warn!(error = %err, "cannot isolate first page, passing PDF through unmodified");
                pdf.to_vec()
            }
        }
    }

    /// `/Count` of the first `/Type /Pages` node.
    pub fn page_count(&self, pdf: &[u8]) -> Result<usize> {
        check_header(pdf)?;
        let mut scanner = ObjectScanner::new(pdf);
        while let Some(object) = scanner.next_object()? {
            let Some(dict) = object.dict else { continue };
            if dict.is("Type", "Pages") {
                let count = dict.integer("Count").ok_or_else(|| {
                    VoucherwerkError::PdfParse("/Pages node has no /Count".into())
                })?;
                return usize::try_from(count)
                    .map_err(|_| VoucherwerkError::PdfParse(format!("invalid /Count {count}")));
            }
        }
        Err(VoucherwerkError::PdfParse("no /Pages node found".into()))
    }

    fn images<'a>(&self, pdf: &'a [u8]) -> Result<PageImages<'a>> {
        check_header(pdf)?;
        Ok(PageImages {
            scanner: ObjectScanner::new(pdf),
            min_len: self.min_image_stream_len,
            yielded: 0,
            done: false,
        })
    }
}

fn check_header(pdf: &[u8]) -> Result<()> {
    if pdf.starts_with(b"%PDF-") {
        Ok(())
    } else {
        Err(VoucherwerkError::PdfParse("missing %PDF- header".into()))
    }
}

/// Lazily yields qualifying image XObjects while the scanner advances past
/// every stream, image or not.
struct PageImages<'a> {
    scanner: ObjectScanner<'a>,
    min_len: usize,
    yielded: usize,
    done: bool,
}

impl Iterator for PageImages<'_> {
    type Item = Result<RasterImage>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let object = match self.scanner.next_object() {
                Ok(Some(object)) => object,
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            let (Some(dict), Some(stream)) = (object.dict, object.stream) else {
                continue;
            };
            if !(dict.is("Type", "XObject") && dict.is("Subtype", "Image")) {
                continue;
            }
            if stream.len() < self.min_len {
                if self.yielded == 0 {
                    warn!(
                        object = object.number,
                        len = stream.len(),
                        min_len = self.min_len,
                        "skipping short image ahead of the first page; a later page becomes page 1"
                    );
                } else {
                    debug!(
                        object = object.number,
                        len = stream.len(),
                        "skipping short image stream"
                    );
                }
                continue;
            }
            self.yielded += 1;
            return Some(raster_from_dict(&dict, stream, object.number));
        }
        None
    }
}

fn dimension(dict: &PdfDict, key: &str, object: u32) -> Result<u32> {
    dict.integer(key)
        .and_then(|v| u32::try_from(v).ok())
        .filter(|v| *v > 0)
        .ok_or_else(|| VoucherwerkError::PdfParse(format!("object {object}: bad /{key}")))
}

fn raster_from_dict(dict: &PdfDict, payload: &[u8], object: u32) -> Result<RasterImage> {
    let width = dimension(dict, "Width", object)?;
    let height = dimension(dict, "Height", object)?;
    let bpc = dict
        .integer("BitsPerComponent")
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(8);

    let color_model = dict
        .name("ColorSpace")
        .and_then(ColorModel::from_pdf_name)
        .ok_or_else(|| {
            VoucherwerkError::PdfParse(format!("object {object}: unsupported /ColorSpace"))
        })?;

    let filter = match dict.name("Filter") {
        None => StreamFilter::None,
        Some(name) => StreamFilter::from_pdf_name(name).ok_or_else(|| {
            VoucherwerkError::PdfParse(format!("object {object}: unsupported /Filter /{name}"))
        })?,
    };

    // Missing keys take the PDF defaults for a predictor dictionary.
    let decode_parms = dict.dict("DecodeParms").map(|parms| {
        let int = |key: &str, default: u32| {
            parms
                .integer(key)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(default)
        };
        DecodeParms {
            predictor: int("Predictor", 1),
            colors: int("Colors", 1),
            bits_per_component: int("BitsPerComponent", 8),
            columns: int("Columns", 1),
        }
    });

    debug!(object, width, height, ?filter, ?decode_parms, "image XObject parsed");
    RasterImage::new(
        width,
        height,
        color_model,
        bpc,
        filter,
        decode_parms,
        payload.to_vec(),
    )
    .map_err(|err| VoucherwerkError::PdfParse(format!("object {object}: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::image::ImageDecoder;

    fn rasters() -> Vec<RasterImage> {
        vec![
            ImageDecoder::decode(&fixtures::jpeg_rgb(64, 48)).unwrap(),
            ImageDecoder::decode(&fixtures::png_rgb(40, 40)).unwrap(),
            ImageDecoder::decode(&fixtures::png_gray(50, 30)).unwrap(),
        ]
    }

    #[test]
    fn first_page_round_trips_jpeg_dimensions() {
        let jpeg = fixtures::jpeg_rgb(64, 48);
        let image = ImageDecoder::decode(&jpeg).unwrap();
        let pdf = PdfPageWriter::new().build_single_page(&image);

        assert_eq!(ImageDecoder::classify(&pdf), crate::image::SourceFormat::Pdf);
        let recovered = PdfImageExtractor::default()
            .extract_first_page_image(&pdf)
            .unwrap();
        assert_eq!(
            ImageDecoder::jpeg_dimensions(recovered.payload()).unwrap(),
            (64, 48)
        );
        assert_eq!(recovered, image);
    }

    #[test]
    fn decode_parms_survive_round_trip() {
        let image = ImageDecoder::decode(&fixtures::png_rgb(40, 40)).unwrap();
        let pdf = PdfPageWriter::new().build_single_page(&image);
        let recovered = PdfImageExtractor::default()
            .extract_first_page_image(&pdf)
            .unwrap();
        assert_eq!(recovered.decode_parms(), image.decode_parms());

        // Re-embedding the recovered raster reproduces the same file.
        assert_eq!(PdfPageWriter::new().build_single_page(&recovered), pdf);
    }

    #[test]
    fn all_pages_in_order() {
        let images = rasters();
        let pdf = PdfPageWriter::new().build_multi_page(&images).unwrap();
        let extractor = PdfImageExtractor::default();

        assert_eq!(extractor.extract_all_page_images(&pdf).unwrap(), images);
        assert_eq!(extractor.page_count(&pdf).unwrap(), 3);
    }

    #[test]
    fn short_streams_are_discarded() {
        let tiny =
            RasterImage::new(2, 2, ColorModel::Gray, 8, StreamFilter::None, None, vec![1, 2, 3, 4])
                .unwrap();
        let big = ImageDecoder::decode(&fixtures::jpeg_rgb(64, 64)).unwrap();
        let pdf = PdfPageWriter::new()
            .build_multi_page(&[tiny.clone(), big.clone()])
            .unwrap();

        let default = PdfImageExtractor::default();
        assert_eq!(default.extract_first_page_image(&pdf).unwrap(), big);
        assert_eq!(default.extract_all_page_images(&pdf).unwrap().len(), 1);

        let permissive = PdfImageExtractor::new(0);
        assert_eq!(permissive.extract_first_page_image(&pdf).unwrap(), tiny);
    }

    #[test]
    fn short_leading_page_shifts_first_page_only() {
        let tiny =
            RasterImage::new(2, 2, ColorModel::Gray, 8, StreamFilter::None, None, vec![9; 4])
                .unwrap();
        let big = ImageDecoder::decode(&fixtures::jpeg_rgb(64, 64)).unwrap();
        let pdf = PdfPageWriter::new()
            .build_multi_page(&[tiny.clone(), big.clone()])
            .unwrap();

        // The threshold decides which raster counts as page 1.
        let default = PdfImageExtractor::default();
        let first = default.first_page_only(&pdf);
        assert_eq!(default.extract_first_page_image(&first).unwrap(), big);

        let permissive = PdfImageExtractor::new(0);
        let first = permissive.first_page_only(&pdf);
        assert_eq!(permissive.extract_first_page_image(&first).unwrap(), tiny);
        assert_eq!(permissive.page_count(&first).unwrap(), 1);
    }

    #[test]
    fn first_page_only_drops_later_pages() {
        let images = rasters();
        let pdf = PdfPageWriter::new().build_multi_page(&images).unwrap();
        let extractor = PdfImageExtractor::default();

        let first = extractor.first_page_only(&pdf);
        assert_eq!(extractor.page_count(&first).unwrap(), 1);
        assert_eq!(extractor.extract_first_page_image(&first).unwrap(), images[0]);
    }

    #[test]
    fn unparseable_pdf_passes_through() {
        let foreign = b"%PDF-1.7\n1 0 obj\n<< /Title (Quarterly) >>\nendobj\n".to_vec();
        let extractor = PdfImageExtractor::default();
        assert!(matches!(
            extractor.extract_first_page_image(&foreign),
            Err(VoucherwerkError::PdfParse(_))
        ));
        assert_eq!(extractor.first_page_only(&foreign), foreign);
    }

    #[test]
    fn non_pdf_bytes_are_rejected() {
        let extractor = PdfImageExtractor::default();
        assert!(extractor.extract_all_page_images(b"not a pdf").is_err());
        assert!(extractor.page_count(b"").is_err());
    }

    #[test]
    fn pdf_without_images_has_no_first_page() {
        let pdf = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n\
                    2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n";
        let extractor = PdfImageExtractor::default();
        assert!(extractor.extract_all_page_images(pdf).unwrap().is_empty());
        assert!(extractor.extract_first_page_image(pdf).is_err());
        assert_eq!(extractor.page_count(pdf).unwrap(), 0);
    }
}
