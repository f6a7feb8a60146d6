// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// voucherwerk-merge — Attaches supporting documents to the vouchers they
// belong to.
//
// `MatchEngine` decides which vouchers accept a candidate, `AttachmentLedger`
// reconstructs a voucher's pages, and `MergeOrchestrator` drives one
// candidate through matching, duplicate detection, and the PDF rebuild.

pub mod ledger;
pub mod matching;
pub mod orchestrator;
pub mod retry;

pub use ledger::{AttachmentLedger, DuplicateReason, LedgerEntry};
pub use matching::{MatchEngine, MatchReport};
pub use orchestrator::{
    MergeOrchestrator, MergeOutcome, MergeState, PendingReason, RecordMerge, RetrySummary,
    SkippedDuplicate,
};
pub use retry::{ErrorClass, RetryConfig, RetryDecision, classify_error, should_retry};
