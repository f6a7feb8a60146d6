// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command handlers. Results are printed to stdout as JSON; logs go to stderr.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};
use voucherwerk_core::error::Result;
use voucherwerk_core::{AttachmentCandidate, MergeConfig, VoucherRecord};
use voucherwerk_document::{
    ImageDecoder, PdfImageExtractor, PdfPageWriter, RasterImage, StreamFilter,
};
use voucherwerk_merge::{MergeOrchestrator, RetryConfig, RetryDecision, should_retry};
use voucherwerk_store::{SqliteLeaseProvider, SqliteObjectStore};

use crate::OcrFields;

pub type Orchestrator = MergeOrchestrator<SqliteObjectStore, SqliteLeaseProvider>;

/// One page image as reported by `extract`.
#[derive(Debug, Serialize)]
struct PageInfo {
    page: usize,
    width: u32,
    height: u32,
    color_space: &'static str,
    bits_per_component: u32,
    filter: Option<&'static str>,
    payload_len: usize,
}

impl PageInfo {
    fn new(page: usize, image: &RasterImage) -> Self {
        Self {
            page,
            width: image.width(),
            height: image.height(),
            color_space: image.color_model().pdf_name(),
            bits_per_component: image.bits_per_component(),
            filter: image.filter().pdf_name(),
            payload_len: image.payload().len(),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Open the SQLite store at `store`, creating its directory if needed.
///
/// Leases live in the same file, so concurrent `voucherwerk` processes on one
/// store serialise their merges.
pub fn open(store: &Path, config: Option<&Path>) -> Result<Orchestrator> {
    let config = match config {
        Some(path) => MergeConfig::load(path)?,
        None => MergeConfig::default(),
    };
    if let Some(parent) = store.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    info!(path = %store.display(), "opening voucher store");
    MergeOrchestrator::new(
        SqliteObjectStore::open(store)?,
        SqliteLeaseProvider::open(store)?,
        config,
    )
}

pub fn build_pdf(images: &[PathBuf], output: &Path) -> Result<()> {
    let rasters = images
        .iter()
        .map(|path| ImageDecoder::decode(&fs::read(path)?))
        .collect::<Result<Vec<_>>>()?;
    let pdf = PdfPageWriter::new().build_multi_page(&rasters)?;
    fs::write(output, &pdf)?;
    info!(pages = rasters.len(), bytes = pdf.len(), output = %output.display(), "PDF written");
    Ok(())
}

/// DCT payloads are complete JPEG files; Flate payloads are the raw PNG
/// image data and are written with an `.idat` extension.
pub fn extract(input: &Path, output: Option<&Path>) -> Result<()> {
    let images = PdfImageExtractor::default().extract_all_page_images(&fs::read(input)?)?;
    if let Some(dir) = output {
        fs::create_dir_all(dir)?;
        for (i, image) in images.iter().enumerate() {
            let ext = match image.filter() {
                StreamFilter::Dct => "jpg",
                StreamFilter::Flate => "idat",
                StreamFilter::None => "raw",
            };
            fs::write(dir.join(format!("page-{}.{ext}", i + 1)), image.payload())?;
        }
    }
    let pages: Vec<PageInfo> = images
        .iter()
        .enumerate()
        .map(|(i, image)| PageInfo::new(i + 1, image))
        .collect();
    print_json(&pages)
}

pub fn page_count(input: &Path) -> Result<()> {
    let count = PdfImageExtractor::default().page_count(&fs::read(input)?)?;
    println!("{count}");
    Ok(())
}

pub fn first_page(input: &Path, output: &Path) -> Result<()> {
    let pdf = PdfImageExtractor::default().first_page_only(&fs::read(input)?);
    fs::write(output, pdf)?;
    Ok(())
}

pub fn voucher_record(
    document_no: String,
    classification: String,
    branch: Option<String>,
    discount_rate: Option<String>,
    fields: OcrFields,
) -> VoucherRecord {
    let mut record = VoucherRecord::new(document_no, classification, "");
    record.branch_id = branch;
    record.discount_rate = discount_rate;
    record.gold_weight = fields.weight;
    record.purity = fields.purity;
    record.document_date = fields.date;
    record.amount_usd = fields.usd;
    record.amount_aed = fields.aed;
    record
}

pub fn register(orch: &Orchestrator, record: VoucherRecord, input: &Path) -> Result<()> {
    let stored = orch.register_voucher(&record, &fs::read(input)?)?;
    print_json(&stored)
}

/// Route one attachment, retrying transient failures with backoff.
pub fn attach(
    orch: &Orchestrator,
    input: &Path,
    document_no: String,
    classification: String,
    fields: OcrFields,
    retries: u32,
) -> Result<()> {
    let mut candidate = AttachmentCandidate::new(classification, document_no, fs::read(input)?);
    candidate.gold_weight = fields.weight;
    candidate.purity = fields.purity;
    candidate.document_date = fields.date;
    candidate.amount_usd = fields.usd;
    candidate.amount_aed = fields.aed;

    let policy = RetryConfig {
        max_retries: retries,
        ..RetryConfig::default()
    };
    let mut attempt = 0;
    loop {
        match orch.handle_candidate(&candidate) {
            Ok(outcome) => return print_json(&outcome),
            Err(err) => match should_retry(&err, attempt, &policy) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(attempt, error = %err, ?delay, "attachment failed, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                RetryDecision::GiveUp | RetryDecision::Exhausted => return Err(err),
            },
        }
    }
}

pub fn retry_pending(orch: &Orchestrator) -> Result<()> {
    print_json(&orch.retry_pending()?)
}

pub fn vouchers(orch: &Orchestrator) -> Result<()> {
    print_json(&orch.load_vouchers()?)
}
