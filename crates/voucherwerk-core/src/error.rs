// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Voucherwerk.

use thiserror::Error;

/// Top-level error type for all Voucherwerk operations.
#[derive(Debug, Error)]
pub enum VoucherwerkError {
    // -- Document errors --
    /// Raster bytes are not a JPEG/PNG this engine can re-embed.
    #[error("unsupported or malformed raster: {0}")]
    Format(String),

    /// A PDF did not have the structure this engine writes.
    #[error("PDF structure not recognised: {0}")]
    PdfParse(String),

    #[error("cannot build a PDF with zero pages")]
    EmptyDocument,

    // -- Merge errors --
    /// Retryable: the voucher's stored PDF and ledger were left untouched.
    #[error("merge into {voucher_key} failed: {source}")]
    MergeFailed {
        voucher_key: String,
        #[source]
        source: Box<VoucherwerkError>,
    },

    #[error("invalid voucher record: {0}")]
    InvalidRecord(String),

    // -- Storage / persistence --
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object store error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("timed out waiting for lease on {0}")]
    LeaseTimeout(String),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl VoucherwerkError {
    /// Wrap `self` as the cause of a failed merge into `voucher_key`.
    pub fn into_merge_failure(self, voucher_key: impl Into<String>) -> Self {
        match self {
            already @ VoucherwerkError::MergeFailed { .. } => already,
            other => VoucherwerkError::MergeFailed {
                voucher_key: voucher_key.into(),
                source: Box::new(other),
            },
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, VoucherwerkError>;
