// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document date parsing. OCR output mixes several day-first layouts, so each
// side of a comparison is parsed independently against a fixed format list.

use chrono::NaiveDate;

/// Formats tried in order when comparing document dates; first success wins.
pub const MATCH_DATE_FORMATS: [&str; 5] = [
    "%d/%m/%Y", // 02/06/2025
    "%d-%m-%Y", // 02-06-2025
    "%d-%b-%y", // 02-Jun-25
    "%d-%b-%Y", // 02-Jun-2025
    "%Y-%m-%d", // 2025-06-02
];

/// Parse a document date using [`MATCH_DATE_FORMATS`].
pub fn parse_document_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    MATCH_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Broader parse used for placing a voucher in the storage tree. Accepts the
/// match formats plus `YYYY/MM/DD`.
pub fn parse_filing_date(raw: &str) -> Option<NaiveDate> {
    parse_document_date(raw).or_else(|| NaiveDate::parse_from_str(raw.trim(), "%Y/%m/%d").ok())
}
