// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Match engine — decides whether an attachment belongs to a voucher.
//
// Every field arrives as an OCR string, so each criterion parses both sides
// independently and falls back to plain string equality when parsing fails.
// A voucher is accepted when
//
//   voucher classification ∧ purity ok ∧ (weight ∨ amount) ∧ date
//
// where "purity ok" holds whenever either side has no purity.

use tracing::{debug, instrument};
use voucherwerk_core::dates::parse_document_date;
use voucherwerk_core::{AttachmentCandidate, MergeConfig, VoucherRecord, VoucherType, present};

/// Outcome of each criterion for one candidate/voucher pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchReport {
    pub is_voucher: bool,
    pub weight: bool,
    pub purity: bool,
    pub amount: bool,
    pub date: bool,
}

impl MatchReport {
    pub fn accepted(&self) -> bool {
        self.is_voucher && self.purity && (self.weight || self.amount) && self.date
    }
}

/// Tolerance-driven attachment-to-voucher matcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchEngine {
    amount_tolerance: f64,
    purity_epsilon: f64,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new(0.01, 1e-4)
    }
}

/// Parse a weight or amount, dropping thousands separators.
fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    cleaned.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a purity such as `22K`, `0.916`, or `916k`.
fn parse_purity(raw: &str) -> Option<f64> {
    raw.trim()
        .trim_end_matches(['K', 'k'])
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Weights match on their integer part: 20000.50 and 20000.75 are the same
/// bar, 19999.99 and 20000.00 are not.
pub fn weight_matches(candidate: Option<&str>, target: Option<&str>) -> bool {
    let (Some(a), Some(b)) = (candidate, target) else {
        return false;
    };
    match (parse_number(a), parse_number(b)) {
        (Some(x), Some(y)) => x.trunc() == y.trunc(),
        _ => a == b,
    }
}

/// Both dates must be present; each side is parsed with the first matching
/// format, and unparseable dates compare as raw strings.
pub fn date_matches(candidate: Option<&str>, target: Option<&str>) -> bool {
    let (Some(a), Some(b)) = (candidate, target) else {
        return false;
    };
    match (parse_document_date(a), parse_document_date(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

impl MatchEngine {
    pub fn new(amount_tolerance: f64, purity_epsilon: f64) -> Self {
        Self {
            amount_tolerance,
            purity_epsilon,
        }
    }

    pub fn from_config(config: &MergeConfig) -> Self {
        Self::new(config.amount_tolerance, config.purity_epsilon)
    }

    /// Skipped (true) unless both sides carry a purity.
    ///
    /// The difference is compared at 1e-9 resolution so that a decimal gap of
    /// exactly the epsilon (0.5 vs 0.5001) does not slip under it through
    /// binary rounding.
    pub fn purity_matches(&self, candidate: Option<&str>, target: Option<&str>) -> bool {
        let (Some(a), Some(b)) = (candidate, target) else {
            return true;
        };
        match (parse_purity(a), parse_purity(b)) {
            (Some(x), Some(y)) => {
                let diff = ((x - y).abs() * 1e9).round();
                diff < (self.purity_epsilon * 1e9).round()
            }
            _ => a == b,
        }
    }

    /// Relative difference of two positive amounts, measured against the
    /// smaller one, within tolerance.
    fn amount_within(&self, candidate: Option<&str>, target: Option<&str>) -> bool {
        let (Some(x), Some(y)) = (candidate.and_then(parse_number), target.and_then(parse_number))
        else {
            return false;
        };
        if x <= 0.0 || y <= 0.0 {
            return false;
        }
        (x - y).abs() / x.min(y) <= self.amount_tolerance
    }

    /// USD first; AED only when USD did not match.
    pub fn amount_matches(&self, candidate: &AttachmentCandidate, target: &VoucherRecord) -> bool {
        self.amount_within(present(&candidate.amount_usd), present(&target.amount_usd))
            || self.amount_within(present(&candidate.amount_aed), present(&target.amount_aed))
    }

    /// Evaluate every criterion without short-circuiting.
    pub fn evaluate(&self, candidate: &AttachmentCandidate, target: &VoucherRecord) -> MatchReport {
        MatchReport {
            is_voucher: VoucherType::from_code(target.classification.trim()).is_some(),
            weight: weight_matches(present(&candidate.gold_weight), present(&target.gold_weight)),
            purity: self.purity_matches(present(&candidate.purity), present(&target.purity)),
            amount: self.amount_matches(candidate, target),
            date: date_matches(present(&candidate.document_date), present(&target.document_date)),
        }
    }

    pub fn matches(&self, candidate: &AttachmentCandidate, target: &VoucherRecord) -> bool {
        self.evaluate(candidate, target).accepted()
    }

    /// Every accepted voucher, in the order given. Several matches are valid.
    #[instrument(skip_all, fields(candidate = %candidate.document_number, targets = targets.len()))]
    pub fn search_matches<'a>(
        &self,
        candidate: &AttachmentCandidate,
        targets: &'a [VoucherRecord],
    ) -> Vec<&'a VoucherRecord> {
        let matched: Vec<&VoucherRecord> = targets
            .iter()
            .filter(|target| {
                let report = self.evaluate(candidate, target);
                if report.accepted() {
                    debug!(voucher = %target.document_number, ?report, "voucher matched");
                }
                report.accepted()
            })
            .collect();
        debug!(matches = matched.len(), "search complete");
        matched
    }
}
