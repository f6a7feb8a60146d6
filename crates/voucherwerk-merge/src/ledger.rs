// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Attachment ledger — the ordered rasters behind a voucher's current PDF.
//
// Page 1 comes from `{stem}_original.{ext}` when present, otherwise from the
// first page of the stored PDF. Attachments follow by numeric index.

use serde::Serialize;
use tracing::{debug, instrument};
use voucherwerk_core::error::Result;
use voucherwerk_core::layout::{LedgerSlot, key_stem, ledger_slot};
use voucherwerk_core::{AttachmentCandidate, meta};
use voucherwerk_document::{PdfImageExtractor, RasterImage, decode_upload};
use voucherwerk_store::ObjectStore;
use voucherwerk_store::integrity::verify_stamp;

/// Why a candidate was judged to be already attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateReason {
    DocumentNumber(String),
    ByteSize(u64),
}

impl std::fmt::Display for DuplicateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DocumentNumber(n) => write!(f, "document number {n} already attached"),
            Self::ByteSize(size) => write!(f, "attachment of {size} bytes already attached"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub slot: LedgerSlot,
    /// Raster object key; `None` when page 1 was recovered from the PDF.
    pub key: Option<String>,
    pub document_number: Option<String>,
    /// Size of the stored raster object in bytes.
    pub size: u64,
    pub image: RasterImage,
}

#[derive(Debug, Clone)]
pub struct AttachmentLedger {
    voucher_key: String,
    entries: Vec<LedgerEntry>,
}

impl AttachmentLedger {
    /// Read every ledger object for the voucher stored at `voucher_key`.
    ///
    /// Rasters carrying a `content-sha256` are verified before use.
    #[instrument(skip(store, extractor))]
    pub fn load<S: ObjectStore + ?Sized>(
        store: &S,
        voucher_key: &str,
        extractor: &PdfImageExtractor,
    ) -> Result<Self> {
        let stem = key_stem(voucher_key);
        let mut slots: Vec<(LedgerSlot, String)> = store
            .list(stem)?
            .into_iter()
            .filter_map(|key| ledger_slot(stem, &key).map(|slot| (slot, key)))
            .collect();
        slots.sort();

        let mut entries = Vec::with_capacity(slots.len() + 1);
        if slots.first().is_none_or(|(slot, _)| *slot != LedgerSlot::Original) {
            entries.push(Self::original_from_pdf(store, voucher_key, extractor)?);
        }
        for (slot, key) in slots {
            let bytes = store.get(&key)?;
            let head = store.head(&key)?;
            verify_stamp(&head.metadata, &bytes)?;
            let image = decode_upload(&bytes, extractor)?;
            entries.push(LedgerEntry {
                slot,
                document_number: head.metadata.get(meta::DOCUMENT_NO).cloned(),
                size: bytes.len() as u64,
                key: Some(key),
                image,
            });
        }

        debug!(pages = entries.len(), "ledger loaded");
        Ok(Self {
            voucher_key: voucher_key.to_owned(),
            entries,
        })
    }

    fn original_from_pdf<S: ObjectStore + ?Sized>(
        store: &S,
        voucher_key: &str,
        extractor: &PdfImageExtractor,
    ) -> Result<LedgerEntry> {
        let pdf = store.get(voucher_key)?;
        let head = store.head(voucher_key)?;
        verify_stamp(&head.metadata, &pdf)?;
        let image = extractor.extract_first_page_image(&pdf)?;
        debug!("original page recovered from stored PDF");
        Ok(LedgerEntry {
            slot: LedgerSlot::Original,
            key: None,
            document_number: head.metadata.get(meta::DOCUMENT_NO).cloned(),
            size: pdf.len() as u64,
            image,
        })
    }

    pub fn voucher_key(&self) -> &str {
        &self.voucher_key
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn attachments(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| matches!(e.slot, LedgerSlot::Attachment(_)))
    }

    pub fn page_count(&self) -> usize {
        self.entries.len()
    }

    /// One past the highest attachment index in use.
    pub fn next_attachment_index(&self) -> u32 {
        self.attachments()
            .filter_map(|e| match e.slot {
                LedgerSlot::Attachment(n) => Some(n),
                LedgerSlot::Original => None,
            })
            .max()
            .map_or(1, |n| n + 1)
    }

    /// Match on document number first, then on raw byte size.
    pub fn duplicate_of(&self, candidate: &AttachmentCandidate) -> Option<DuplicateReason> {
        if let Some(doc_no) = candidate.document_number() {
            let same_number = self
                .attachments()
                .any(|e| e.document_number.as_deref().map(str::trim) == Some(doc_no));
            if same_number {
                return Some(DuplicateReason::DocumentNumber(doc_no.to_owned()));
            }
        }
        let size = candidate.raw_image.len() as u64;
        self.attachments()
            .any(|e| e.size == size)
            .then_some(DuplicateReason::ByteSize(size))
    }

    /// Page rasters in order, with `appended` as the final page.
    pub fn pages_with(&self, appended: &RasterImage) -> Vec<RasterImage> {
        self.entries
            .iter()
            .map(|e| e.image.clone())
            .chain(std::iter::once(appended.clone()))
            .collect()
    }
}
