// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Object key layout.
//
//   {voucher_prefix}{year}/Branch {NN}/{mon}/{d}-{m}-{Y}/{TYPE}/{docno}_0001.pdf
//   {stem}_original.{ext}          raster backing page 1
//   {stem}_attachment_{N}.{ext}    raster backing page N+1 (N >= 1)
//   {pending_prefix}{docno}.{ext}  attachments parked for review
//
// where `stem` is the PDF key without its `.pdf` suffix.

use chrono::{Datelike, NaiveDate, Utc};
use tracing::warn;

use crate::dates::parse_filing_date;
use crate::error::{Result, VoucherwerkError};
use crate::types::{VoucherRecord, VoucherType};

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const VOUCHER_PDF_SUFFIX: &str = "_0001.pdf";
const ORIGINAL_SUFFIX: &str = "_original.";
const ATTACHMENT_MARKER: &str = "_attachment_";

/// Position of a raster object within a voucher's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LedgerSlot {
    Original,
    Attachment(u32),
}

/// Replace characters that are unsafe in object keys.
pub fn sanitize_document_no(document_no: &str) -> String {
    document_no
        .trim()
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            other => other,
        })
        .collect()
}

/// Branch digits embedded in a document number (`MPU01-85285` → `01`).
fn branch_from_document_no(document_no: &str) -> Option<String> {
    let digits: String = document_no
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_uppercase())
        .chars()
        .take_while(char::is_ascii_digit)
        .take(3)
        .collect();
    if digits.is_empty() || digits.len() == document_no.trim().len() {
        return None;
    }
    Some(digits)
}

fn branch_folder(record: &VoucherRecord) -> String {
    let raw = record
        .branch_id
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_owned)
        .or_else(|| branch_from_document_no(&record.document_number));
    match raw {
        Some(branch) => match branch.parse::<u32>() {
            Ok(n) => format!("Branch {n:02}"),
            Err(_) => format!("Branch {branch}"),
        },
        None => "Branch 01".to_owned(),
    }
}

fn filing_date(record: &VoucherRecord) -> NaiveDate {
    match record.document_date.as_deref().and_then(parse_filing_date) {
        Some(date) => date,
        None => {
            let today = Utc::now().date_naive();
            warn!(
                document_no = %record.document_number,
                date = ?record.document_date,
                "document date unparseable, filing under today"
            );
            today
        }
    }
}

/// Storage key for a voucher's PDF.
pub fn voucher_pdf_key(voucher_prefix: &str, record: &VoucherRecord) -> Result<String> {
    let voucher_type = record
        .voucher_type()
        .or_else(|| VoucherType::from_document_number(&record.document_number))
        .ok_or_else(|| {
            VoucherwerkError::InvalidRecord(format!(
                "classification '{}' is not a voucher code",
                record.classification
            ))
        })?;
    let document_no = sanitize_document_no(&record.document_number);
    if document_no.is_empty() {
        return Err(VoucherwerkError::InvalidRecord(
            "voucher has no document number".into(),
        ));
    }

    let date = filing_date(record);
    let month = MONTHS[date.month0() as usize];
    Ok(format!(
        "{voucher_prefix}{year}/{branch}/{month}/{day}-{month_num}-{year}/{voucher_type}/{document_no}{VOUCHER_PDF_SUFFIX}",
        year = date.year(),
        branch = branch_folder(record),
        day = date.day(),
        month_num = date.month(),
    ))
}

/// Whether `key` names a voucher PDF rather than a ledger raster that happens
/// to be a PDF.
pub fn is_voucher_pdf_key(key: &str) -> bool {
    key.ends_with(VOUCHER_PDF_SUFFIX)
}

/// PDF key without its `.pdf` suffix; ledger rasters share this stem.
pub fn key_stem(pdf_key: &str) -> &str {
    pdf_key.strip_suffix(".pdf").unwrap_or(pdf_key)
}

pub fn original_raster_key(stem: &str, ext: &str) -> String {
    format!("{stem}{ORIGINAL_SUFFIX}{ext}")
}

pub fn attachment_raster_key(stem: &str, index: u32, ext: &str) -> String {
    format!("{stem}{ATTACHMENT_MARKER}{index}.{ext}")
}

/// Identify which ledger slot `key` occupies for the voucher with `stem`.
///
/// Keys belonging to a different voucher whose stem merely shares a prefix
/// (e.g. `..._0001` vs `..._00010`) are rejected.
pub fn ledger_slot(stem: &str, key: &str) -> Option<LedgerSlot> {
    let rest = key.strip_prefix(stem)?;
    if let Some(ext) = rest.strip_prefix(ORIGINAL_SUFFIX) {
        return (!ext.is_empty() && !ext.contains('/')).then_some(LedgerSlot::Original);
    }
    let tail = rest.strip_prefix(ATTACHMENT_MARKER)?;
    let (index, ext) = tail.split_once('.')?;
    if ext.is_empty() || ext.contains('/') || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match index.parse::<u32>() {
        Ok(n) if n > 0 => Some(LedgerSlot::Attachment(n)),
        _ => None,
    }
}

/// Key under which an unmatched attachment is parked.
pub fn pending_key(pending_prefix: &str, name: &str, ext: &str) -> String {
    format!("{pending_prefix}{}.{ext}", sanitize_document_no(name))
}

/// Temporary key for a staged write of `final_key`.
pub fn staging_key(staging_prefix: &str, token: &str, final_key: &str) -> String {
    format!("{staging_prefix}{token}/{final_key}")
}
