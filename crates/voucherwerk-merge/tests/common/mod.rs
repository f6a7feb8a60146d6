// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared fixtures for the merge integration tests.

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use voucherwerk_core::error::{Result, VoucherwerkError};
use voucherwerk_core::{AttachmentCandidate, MergeConfig, Metadata, VoucherRecord};
use voucherwerk_merge::MergeOrchestrator;
use voucherwerk_store::{LocalLeaseProvider, MemoryStore, ObjectHead, ObjectStore};

pub const DATE: &str = "02/06/2025";

/// Pseudo-random RGB pixels, so encoded payloads stay large and distinct.
fn noise_image(width: u32, height: u32, seed: u32) -> DynamicImage {
    let mut state = seed.wrapping_mul(2_654_435_761) | 1;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (state >> 24) as u8
    };
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
        Rgb([next(), next(), next()])
    }))
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).expect("encode fixture");
    out.into_inner()
}

pub fn jpeg(width: u32, height: u32, seed: u32) -> Vec<u8> {
    encode(noise_image(width, height, seed), ImageFormat::Jpeg)
}

pub fn png(width: u32, height: u32, seed: u32) -> Vec<u8> {
    encode(noise_image(width, height, seed), ImageFormat::Png)
}

pub fn voucher(document_no: &str, weight: &str) -> VoucherRecord {
    let mut record = VoucherRecord::new(document_no, "MPU", "");
    record.branch_id = Some("1".into());
    record.gold_weight = Some(weight.into());
    record.document_date = Some(DATE.into());
    record
}

pub fn candidate(document_no: &str, weight: Option<&str>, raw: Vec<u8>) -> AttachmentCandidate {
    let mut candidate = AttachmentCandidate::new("FHE", document_no, raw);
    candidate.gold_weight = weight.map(str::to_owned);
    candidate.document_date = Some("02-06-2025".into());
    candidate
}

pub fn memory_orchestrator() -> MergeOrchestrator<MemoryStore, LocalLeaseProvider> {
    MergeOrchestrator::new(MemoryStore::new(), LocalLeaseProvider::new(), MergeConfig::default())
        .expect("default config")
}

/// A `MemoryStore` whose `promote` can be made to fail on demand.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_promote: AtomicBool,
}

impl FlakyStore {
    pub fn set_failing(&self, failing: bool) {
        self.fail_promote.store(failing, Ordering::SeqCst);
    }
}

impl ObjectStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, bytes: &[u8], metadata: &Metadata) -> Result<()> {
        self.inner.put(key, bytes, metadata)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix)
    }

    fn head(&self, key: &str) -> Result<ObjectHead> {
        self.inner.head(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key)
    }

    fn promote(&self, moves: &[(String, String)]) -> Result<()> {
        if self.fail_promote.load(Ordering::SeqCst) {
            return Err(VoucherwerkError::Storage("connection reset".into()));
        }
        self.inner.promote(moves)
    }
}
