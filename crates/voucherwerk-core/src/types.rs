// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types: voucher classifications, stored voucher records, and the
// ephemeral attachment candidates routed by the merge orchestrator.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VoucherwerkError;

/// User metadata attached to a stored object (string keys and values).
pub type Metadata = BTreeMap<String, String>;

/// Metadata keys written next to every stored voucher, raster, and pending
/// attachment.
pub mod meta {
    pub const DOCUMENT_NO: &str = "document-no";
    pub const CLASSIFICATION: &str = "classification";
    pub const BRANCH_ID: &str = "branch-id";
    pub const DOCUMENT_DATE: &str = "document-date";
    pub const AMOUNT_USD: &str = "invoice-amount-usd";
    pub const AMOUNT_AED: &str = "invoice-amount-aed";
    pub const GOLD_WEIGHT: &str = "gold-weight";
    pub const PURITY: &str = "purity";
    pub const DISCOUNT_RATE: &str = "discount-rate";
    pub const CONTENT_SHA256: &str = "content-sha256";
    pub const PENDING_REASON: &str = "pending-reason";
}

/// The seven classification codes that make a document a voucher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoucherType {
    Mpu,
    Mpv,
    Mrt,
    Msl,
    Rec,
    Pay,
    Mjv,
}

impl VoucherType {
    pub const ALL: [VoucherType; 7] = [
        Self::Mpu,
        Self::Mpv,
        Self::Mrt,
        Self::Msl,
        Self::Rec,
        Self::Pay,
        Self::Mjv,
    ];

    /// Upper-case code as printed on the voucher (e.g. `MPU`).
    pub fn code(&self) -> &'static str {
        match self {
            Self::Mpu => "MPU",
            Self::Mpv => "MPV",
            Self::Mrt => "MRT",
            Self::Msl => "MSL",
            Self::Rec => "REC",
            Self::Pay => "PAY",
            Self::Mjv => "MJV",
        }
    }

    /// Exact code lookup. Attachment codes (`FHE`, `TIS`, ...) return `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Voucher type implied by a document number prefix (`MPU01-85285` → MPU).
    pub fn from_document_number(document_no: &str) -> Option<Self> {
        let prefix: String = document_no
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_uppercase())
            .collect();
        Self::from_code(&prefix)
    }
}

impl fmt::Display for VoucherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for VoucherType {
    type Err = VoucherwerkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s.trim()).ok_or_else(|| {
            VoucherwerkError::InvalidRecord(format!("'{s}' is not a voucher classification"))
        })
    }
}

/// Treat missing and blank OCR fields the same way.
pub fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn field(metadata: &Metadata, key: &str) -> Option<String> {
    metadata
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn insert_field(metadata: &mut Metadata, key: &str, value: &Option<String>) {
    if let Some(v) = present(value) {
        metadata.insert(key.to_owned(), v.to_owned());
    }
}

/// A stored voucher, as reconstructed from its object metadata.
///
/// Identity fields are written once at registration and never mutated by the
/// merge path; merges only replace the PDF bytes under `storage_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherRecord {
    pub document_number: String,
    /// Raw classification string; only the seven voucher codes are matchable.
    pub classification: String,
    pub branch_id: Option<String>,
    pub document_date: Option<String>,
    pub amount_usd: Option<String>,
    pub amount_aed: Option<String>,
    pub gold_weight: Option<String>,
    pub purity: Option<String>,
    pub discount_rate: Option<String>,
    pub storage_key: String,
}

impl VoucherRecord {
    pub fn new(
        document_number: impl Into<String>,
        classification: impl Into<String>,
        storage_key: impl Into<String>,
    ) -> Self {
        Self {
            document_number: document_number.into(),
            classification: classification.into(),
            branch_id: None,
            document_date: None,
            amount_usd: None,
            amount_aed: None,
            gold_weight: None,
            purity: None,
            discount_rate: None,
            storage_key: storage_key.into(),
        }
    }

    /// Parsed classification, or `None` for attachments and unknown codes.
    pub fn voucher_type(&self) -> Option<VoucherType> {
        VoucherType::from_code(self.classification.trim())
    }

    /// Rebuild a record from the metadata stored with `storage_key`.
    pub fn from_metadata(storage_key: impl Into<String>, metadata: &Metadata) -> Self {
        Self {
            document_number: field(metadata, meta::DOCUMENT_NO).unwrap_or_default(),
            classification: field(metadata, meta::CLASSIFICATION).unwrap_or_default(),
            branch_id: field(metadata, meta::BRANCH_ID),
            document_date: field(metadata, meta::DOCUMENT_DATE),
            amount_usd: field(metadata, meta::AMOUNT_USD),
            amount_aed: field(metadata, meta::AMOUNT_AED),
            gold_weight: field(metadata, meta::GOLD_WEIGHT),
            purity: field(metadata, meta::PURITY),
            discount_rate: field(metadata, meta::DISCOUNT_RATE),
            storage_key: storage_key.into(),
        }
    }

    pub fn to_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        if !self.document_number.trim().is_empty() {
            metadata.insert(meta::DOCUMENT_NO.into(), self.document_number.trim().into());
        }
        if !self.classification.trim().is_empty() {
            metadata.insert(meta::CLASSIFICATION.into(), self.classification.trim().into());
        }
        insert_field(&mut metadata, meta::BRANCH_ID, &self.branch_id);
        insert_field(&mut metadata, meta::DOCUMENT_DATE, &self.document_date);
        insert_field(&mut metadata, meta::AMOUNT_USD, &self.amount_usd);
        insert_field(&mut metadata, meta::AMOUNT_AED, &self.amount_aed);
        insert_field(&mut metadata, meta::GOLD_WEIGHT, &self.gold_weight);
        insert_field(&mut metadata, meta::PURITY, &self.purity);
        insert_field(&mut metadata, meta::DISCOUNT_RATE, &self.discount_rate);
        metadata
    }
}

/// A loose supporting document waiting to be attached to a voucher.
///
/// Fields arrive as plain strings from the OCR/classification oracle and are
/// interpreted only by the match engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentCandidate {
    /// Non-voucher code assigned by the classifier (e.g. `FHE`).
    pub classification: String,
    pub document_number: String,
    pub gold_weight: Option<String>,
    pub purity: Option<String>,
    pub document_date: Option<String>,
    pub amount_usd: Option<String>,
    pub amount_aed: Option<String>,
    /// The uploaded JPEG/PNG exactly as received.
    #[serde(skip)]
    pub raw_image: Vec<u8>,
}

impl AttachmentCandidate {
    pub fn new(
        classification: impl Into<String>,
        document_number: impl Into<String>,
        raw_image: Vec<u8>,
    ) -> Self {
        Self {
            classification: classification.into(),
            document_number: document_number.into(),
            gold_weight: None,
            purity: None,
            document_date: None,
            amount_usd: None,
            amount_aed: None,
            raw_image,
        }
    }

    /// Whether the candidate carries anything the match engine can key on.
    /// Without weight or an amount the candidate is parked, never matched.
    pub fn has_criteria(&self) -> bool {
        present(&self.gold_weight).is_some()
            || present(&self.amount_usd).is_some()
            || present(&self.amount_aed).is_some()
    }

    pub fn document_number(&self) -> Option<&str> {
        Some(self.document_number.trim()).filter(|s| !s.is_empty())
    }

    pub fn to_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        if let Some(doc_no) = self.document_number() {
            metadata.insert(meta::DOCUMENT_NO.into(), doc_no.into());
        }
        if !self.classification.trim().is_empty() {
            metadata.insert(meta::CLASSIFICATION.into(), self.classification.trim().into());
        }
        insert_field(&mut metadata, meta::GOLD_WEIGHT, &self.gold_weight);
        insert_field(&mut metadata, meta::PURITY, &self.purity);
        insert_field(&mut metadata, meta::DOCUMENT_DATE, &self.document_date);
        insert_field(&mut metadata, meta::AMOUNT_USD, &self.amount_usd);
        insert_field(&mut metadata, meta::AMOUNT_AED, &self.amount_aed);
        metadata
    }

    /// Rehydrate a parked candidate from its pending-area metadata.
    pub fn from_metadata(metadata: &Metadata, raw_image: Vec<u8>) -> Self {
        Self {
            classification: field(metadata, meta::CLASSIFICATION).unwrap_or_default(),
            document_number: field(metadata, meta::DOCUMENT_NO).unwrap_or_default(),
            gold_weight: field(metadata, meta::GOLD_WEIGHT),
            purity: field(metadata, meta::PURITY),
            document_date: field(metadata, meta::DOCUMENT_DATE),
            amount_usd: field(metadata, meta::AMOUNT_USD),
            amount_aed: field(metadata, meta::AMOUNT_AED),
            raw_image,
        }
    }
}
