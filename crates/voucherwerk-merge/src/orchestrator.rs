// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Merge orchestrator — routes one attachment candidate to its vouchers.
//
//   Received ─┬─> NoCriteria                      (parked)
//             └─> Searching ─┬─> Unmatched        (parked)
//                            └─> Matched ─┬─> DuplicateSkipped
//                                         ├─> Merged
//                                         └─> MergeFailed
//
// Each matched voucher is merged on its own; one that fails does not stop
// the rest. A candidate whose failure will not clear on retry is parked.
//
// Every write goes to a staging key first and is promoted in one step, so a
// failed or abandoned merge leaves the voucher's PDF and ledger as they were.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use voucherwerk_core::error::{Result, VoucherwerkError};
use voucherwerk_core::layout::{
    attachment_raster_key, is_voucher_pdf_key, key_stem, original_raster_key, pending_key,
    staging_key, voucher_pdf_key,
};
use voucherwerk_core::{AttachmentCandidate, MergeConfig, Metadata, VoucherRecord, meta};
use voucherwerk_document::{
    ImageDecoder, PdfImageExtractor, PdfPageWriter, RasterImage, SourceFormat, decode_upload,
};
use voucherwerk_store::integrity::{stamp, verify_stamp};
use voucherwerk_store::{LeaseProvider, ObjectStore, hash_bytes};

use crate::ledger::{AttachmentLedger, DuplicateReason};
use crate::matching::MatchEngine;
use crate::retry::{ErrorClass, classify_error};

/// States a candidate passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeState {
    Received,
    NoCriteria,
    Searching,
    Matched,
    Unmatched,
    DuplicateSkipped,
    Merged,
    MergeFailed,
}

impl fmt::Display for MergeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::NoCriteria => "no-criteria",
            Self::Searching => "searching",
            Self::Matched => "matched",
            Self::Unmatched => "unmatched",
            Self::DuplicateSkipped => "duplicate-skipped",
            Self::Merged => "merged",
            Self::MergeFailed => "merge-failed",
        };
        f.write_str(s)
    }
}

/// Why a candidate was parked in the pending area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingReason {
    NoCriteria,
    Unmatched,
    /// At least one matched voucher could not be rebuilt, for a reason a
    /// retry would not fix.
    MergeFailed,
}

impl PendingReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoCriteria => "no-criteria",
            Self::Unmatched => "unmatched",
            Self::MergeFailed => "merge-failed",
        }
    }
}

/// One voucher that received the candidate as a new page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordMerge {
    pub voucher_key: String,
    pub attachment_key: String,
    /// Page count of the rebuilt PDF.
    pub page_count: usize,
}

/// One voucher whose ledger already held the candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDuplicate {
    pub voucher_key: String,
    pub reason: DuplicateReason,
}

/// Terminal state of a successfully handled candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum MergeOutcome {
    NoCriteria {
        pending_key: String,
    },
    Unmatched {
        pending_key: String,
    },
    /// Every matched voucher already carried the candidate.
    DuplicateSkipped {
        skipped: Vec<SkippedDuplicate>,
    },
    /// At least one voucher was rebuilt; the rest were duplicates.
    Merged {
        merged: Vec<RecordMerge>,
        skipped: Vec<SkippedDuplicate>,
    },
}

impl MergeOutcome {
    pub fn state(&self) -> MergeState {
        match self {
            Self::NoCriteria { .. } => MergeState::NoCriteria,
            Self::Unmatched { .. } => MergeState::Unmatched,
            Self::DuplicateSkipped { .. } => MergeState::DuplicateSkipped,
            Self::Merged { .. } => MergeState::Merged,
        }
    }
}

/// Counts from one pass over the pending area.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrySummary {
    /// Merged or found to be duplicates, and removed from the pending area.
    pub merged: usize,
    pub still_pending: usize,
    pub failed: usize,
}

enum RecordResult {
    Merged(RecordMerge),
    Skipped(SkippedDuplicate),
}

/// Per-record results of merging one candidate into its matches.
#[derive(Default)]
struct FanOut {
    merged: Vec<RecordMerge>,
    skipped: Vec<SkippedDuplicate>,
    failures: Vec<VoucherwerkError>,
}

impl FanOut {
    fn has_permanent_failure(&self) -> bool {
        self.failures
            .iter()
            .any(|err| classify_error(err) == ErrorClass::Permanent)
    }

    /// A transient failure is reported ahead of a permanent one, so callers
    /// that retry still do.
    fn into_outcome(mut self) -> Result<MergeOutcome> {
        if !self.failures.is_empty() {
            let pick = self
                .failures
                .iter()
                .position(|err| classify_error(err) == ErrorClass::Transient)
                .unwrap_or(0);
            warn!(
                state = %MergeState::MergeFailed,
                failed = self.failures.len(),
                merged = self.merged.len(),
                duplicates = self.skipped.len(),
                "candidate only partly merged"
            );
            return Err(self.failures.swap_remove(pick));
        }
        if self.merged.is_empty() {
            info!(state = %MergeState::DuplicateSkipped, vouchers = self.skipped.len());
            Ok(MergeOutcome::DuplicateSkipped {
                skipped: self.skipped,
            })
        } else {
            info!(
                state = %MergeState::Merged,
                vouchers = self.merged.len(),
                duplicates = self.skipped.len()
            );
            Ok(MergeOutcome::Merged {
                merged: self.merged,
                skipped: self.skipped,
            })
        }
    }
}

/// An object write that is staged before promotion.
struct StagedWrite {
    key: String,
    bytes: Vec<u8>,
    metadata: Metadata,
}

impl StagedWrite {
    fn stamped(key: String, bytes: Vec<u8>, mut metadata: Metadata) -> Self {
        stamp(&mut metadata, &bytes);
        Self {
            key,
            bytes,
            metadata,
        }
    }
}

/// Routes candidates into voucher PDFs held in an [`ObjectStore`].
///
/// The store and lease provider are injected. All methods take `&self`, so a
/// single orchestrator can be shared between worker threads.
pub struct MergeOrchestrator<S: ObjectStore, L: LeaseProvider> {
    store: S,
    leases: L,
    config: MergeConfig,
    engine: MatchEngine,
    extractor: PdfImageExtractor,
    writer: PdfPageWriter,
}

impl<S: ObjectStore, L: LeaseProvider> MergeOrchestrator<S, L> {
    pub fn new(store: S, leases: L, config: MergeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine: MatchEngine::from_config(&config),
            extractor: PdfImageExtractor::from_config(&config),
            writer: PdfPageWriter::new(),
            store,
            leases,
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    pub fn extractor(&self) -> &PdfImageExtractor {
        &self.extractor
    }

    /// File a newly ingested voucher.
    ///
    /// A JPEG/PNG upload becomes a one-page PDF plus an `_original` raster; a
    /// PDF upload is cut down to its first page. Registering a voucher whose
    /// key already exists returns the stored record unchanged.
    #[instrument(skip_all, fields(document_no = %record.document_number, bytes_len = upload.len()))]
    pub fn register_voucher(&self, record: &VoucherRecord, upload: &[u8]) -> Result<VoucherRecord> {
        if record.voucher_type().is_none() {
            return Err(VoucherwerkError::InvalidRecord(format!(
                "'{}' is not a voucher classification",
                record.classification
            )));
        }
        let key = voucher_pdf_key(&self.config.voucher_prefix, record)?;
        let _lease = self.leases.acquire(&key, self.config.lease_timeout())?;

        if self.store.exists(&key)? {
            info!(key, "voucher already registered");
            let head = self.store.head(&key)?;
            return Ok(VoucherRecord::from_metadata(key, &head.metadata));
        }

        let format = ImageDecoder::classify(upload);
        let metadata = record.to_metadata();
        let mut writes = Vec::with_capacity(2);
        match format {
            SourceFormat::Jpeg | SourceFormat::Png => {
                let raster = ImageDecoder::decode(upload)?;
                let pdf = self.writer.build_single_page(&raster);
                writes.push(StagedWrite::stamped(key.clone(), pdf, metadata.clone()));
                writes.push(StagedWrite::stamped(
                    original_raster_key(key_stem(&key), format.extension()),
                    upload.to_vec(),
                    metadata,
                ));
            }
            SourceFormat::Pdf => {
                let pdf = self.extractor.first_page_only(upload);
                writes.push(StagedWrite::stamped(key.clone(), pdf, metadata));
            }
            SourceFormat::Unknown => {
                return Err(VoucherwerkError::Format(
                    "voucher upload is neither JPEG, PNG, nor PDF".into(),
                ));
            }
        }
        self.commit(&writes)?;

        info!(key, ?format, "voucher registered");
        let mut stored = record.clone();
        stored.storage_key = key;
        Ok(stored)
    }

    /// Every voucher PDF under the voucher prefix, rebuilt from its metadata.
    #[instrument(skip(self))]
    pub fn load_vouchers(&self) -> Result<Vec<VoucherRecord>> {
        let records = self
            .store
            .list(&self.config.voucher_prefix)?
            .into_iter()
            .filter(|key| is_voucher_pdf_key(key))
            .map(|key| {
                let head = self.store.head(&key)?;
                Ok(VoucherRecord::from_metadata(key, &head.metadata))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(count = records.len(), "vouchers loaded");
        Ok(records)
    }

    /// Route `candidate` against every stored voucher.
    pub fn handle_candidate(&self, candidate: &AttachmentCandidate) -> Result<MergeOutcome> {
        let targets = if candidate.has_criteria() {
            self.load_vouchers()?
        } else {
            Vec::new()
        };
        self.handle_candidate_against(candidate, &targets)
    }

    /// Route `candidate` against `targets`.
    ///
    /// A `Format` error means the candidate's own bytes are unusable. A
    /// `MergeFailed` error names a voucher that could not be rebuilt; every
    /// other match was still tried, those that merged keep their new page,
    /// and a retry skips them as duplicates. When the failure is permanent
    /// the candidate is also parked, so `retry_pending` can pick it up once
    /// the voucher is repaired.
    #[instrument(
        skip_all,
        fields(document_no = %candidate.document_number, bytes_len = candidate.raw_image.len())
    )]
    pub fn handle_candidate_against(
        &self,
        candidate: &AttachmentCandidate,
        targets: &[VoucherRecord],
    ) -> Result<MergeOutcome> {
        match self.route(candidate, targets) {
            Err(reason) => {
                let pending_key = self.park(candidate, reason)?;
                Ok(match reason {
                    PendingReason::NoCriteria => MergeOutcome::NoCriteria { pending_key },
                    // `route` never yields `MergeFailed`.
                    PendingReason::Unmatched | PendingReason::MergeFailed => {
                        MergeOutcome::Unmatched { pending_key }
                    }
                })
            }
            Ok(matched) => {
                let fan_out = self.merge_matches(candidate, &matched)?;
                if fan_out.has_permanent_failure() {
                    if let Err(err) = self.park(candidate, PendingReason::MergeFailed) {
                        warn!(error = %err, "could not park partly merged candidate");
                    }
                }
                fan_out.into_outcome()
            }
        }
    }

    /// Received → Searching → Matched, or the reason to park.
    fn route<'t>(
        &self,
        candidate: &AttachmentCandidate,
        targets: &'t [VoucherRecord],
    ) -> std::result::Result<Vec<&'t VoucherRecord>, PendingReason> {
        info!(state = %MergeState::Received, "candidate received");
        if !candidate.has_criteria() {
            info!(state = %MergeState::NoCriteria, "no weight or amount to match on");
            return Err(PendingReason::NoCriteria);
        }
        info!(state = %MergeState::Searching, targets = targets.len());
        let matched = self.engine.search_matches(candidate, targets);
        if matched.is_empty() {
            info!(state = %MergeState::Unmatched, "no voucher accepted the candidate");
            return Err(PendingReason::Unmatched);
        }
        info!(state = %MergeState::Matched, matches = matched.len());
        Ok(matched)
    }

    /// Errors only if the candidate itself cannot be decoded; per-voucher
    /// failures are collected in the returned [`FanOut`].
    fn merge_matches(
        &self,
        candidate: &AttachmentCandidate,
        matched: &[&VoucherRecord],
    ) -> Result<FanOut> {
        let raster = decode_upload(&candidate.raw_image, &self.extractor)?;
        let ext = ImageDecoder::classify(&candidate.raw_image).extension();

        let mut fan_out = FanOut::default();
        for record in matched {
            match self.merge_into(record, candidate, &raster, ext) {
                Ok(RecordResult::Merged(m)) => fan_out.merged.push(m),
                Ok(RecordResult::Skipped(s)) => fan_out.skipped.push(s),
                Err(err) => fan_out.failures.push(err),
            }
        }
        Ok(fan_out)
    }

    fn merge_into(
        &self,
        record: &VoucherRecord,
        candidate: &AttachmentCandidate,
        raster: &RasterImage,
        ext: &str,
    ) -> Result<RecordResult> {
        let voucher_key = record.storage_key.as_str();
        self.merge_locked(voucher_key, candidate, raster, ext)
            .map_err(|err| {
                warn!(state = %MergeState::MergeFailed, voucher_key, error = %err);
                err.into_merge_failure(voucher_key)
            })
    }

    /// Ledger fetch, duplicate check, rebuild, and write, all under the
    /// voucher's lease.
    fn merge_locked(
        &self,
        voucher_key: &str,
        candidate: &AttachmentCandidate,
        raster: &RasterImage,
        ext: &str,
    ) -> Result<RecordResult> {
        let _lease = self.leases.acquire(voucher_key, self.config.lease_timeout())?;
        let ledger = AttachmentLedger::load(&self.store, voucher_key, &self.extractor)?;

        if let Some(reason) = ledger.duplicate_of(candidate) {
            info!(voucher_key, %reason, "duplicate skipped");
            return Ok(RecordResult::Skipped(SkippedDuplicate {
                voucher_key: voucher_key.to_owned(),
                reason,
            }));
        }

        let pages = ledger.pages_with(raster);
        let pdf = self.writer.build_multi_page(&pages)?;
        let attachment_key =
            attachment_raster_key(key_stem(voucher_key), ledger.next_attachment_index(), ext);
        let pdf_metadata = self.store.head(voucher_key)?.metadata;

        self.commit(&[
            StagedWrite::stamped(
                attachment_key.clone(),
                candidate.raw_image.clone(),
                candidate.to_metadata(),
            ),
            StagedWrite::stamped(voucher_key.to_owned(), pdf, pdf_metadata),
        ])?;

        debug!(voucher_key, attachment_key, pages = pages.len(), "voucher rebuilt");
        Ok(RecordResult::Merged(RecordMerge {
            voucher_key: voucher_key.to_owned(),
            attachment_key,
            page_count: pages.len(),
        }))
    }

    /// Stage every write under a fresh token, then promote them together.
    /// Staged objects are removed again if anything fails.
    fn commit(&self, writes: &[StagedWrite]) -> Result<()> {
        let token = Uuid::new_v4().to_string();
        let moves: Vec<(String, String)> = writes
            .iter()
            .map(|w| {
                let staged = staging_key(&self.config.staging_prefix, &token, &w.key);
                (staged, w.key.clone())
            })
            .collect();

        let result = writes
            .iter()
            .zip(&moves)
            .try_for_each(|(w, (staged, _))| self.store.put(staged, &w.bytes, &w.metadata))
            .and_then(|()| self.store.promote(&moves));

        if result.is_err() {
            for (staged, _) in &moves {
                if let Err(err) = self.store.delete(staged) {
                    warn!(key = %staged, error = %err, "could not remove staged object");
                }
            }
        }
        result
    }

    /// Store the raw candidate in the pending area with its OCR fields.
    ///
    /// Candidates without a document number are keyed by content hash.
    fn park(&self, candidate: &AttachmentCandidate, reason: PendingReason) -> Result<String> {
        let ext = ImageDecoder::classify(&candidate.raw_image).extension();
        let name = match candidate.document_number() {
            Some(doc_no) => doc_no.to_owned(),
            None => hash_bytes(&candidate.raw_image)[..16].to_owned(),
        };
        let key = pending_key(&self.config.pending_prefix, &name, ext);

        let mut metadata = candidate.to_metadata();
        metadata.insert(meta::PENDING_REASON.into(), reason.as_str().into());
        stamp(&mut metadata, &candidate.raw_image);
        self.store.put(&key, &candidate.raw_image, &metadata)?;

        info!(key, reason = reason.as_str(), "candidate parked");
        Ok(key)
    }

    /// Re-route everything in the pending area against the current vouchers.
    ///
    /// Entries that merge (or turn out to be attached already) are removed;
    /// the rest stay where they are. One bad entry does not stop the pass.
    #[instrument(skip(self))]
    pub fn retry_pending(&self) -> Result<RetrySummary> {
        let keys = self.store.list(&self.config.pending_prefix)?;
        let targets = self.load_vouchers()?;
        let mut summary = RetrySummary::default();

        for key in keys {
            match self.retry_one(&key, &targets) {
                Ok(Some(outcome)) => {
                    debug!(key, state = %outcome.state(), "pending entry resolved");
                    self.store.delete(&key)?;
                    summary.merged += 1;
                }
                Ok(None) => summary.still_pending += 1,
                Err(err) => {
                    warn!(key, error = %err, "pending entry could not be merged");
                    summary.failed += 1;
                }
            }
        }

        info!(
            merged = summary.merged,
            still_pending = summary.still_pending,
            failed = summary.failed,
            "pending area rescanned"
        );
        Ok(summary)
    }

    /// `None` when the entry still has nowhere to go.
    fn retry_one(&self, key: &str, targets: &[VoucherRecord]) -> Result<Option<MergeOutcome>> {
        let bytes = self.store.get(key)?;
        let head = self.store.head(key)?;
        verify_stamp(&head.metadata, &bytes)?;
        let candidate = AttachmentCandidate::from_metadata(&head.metadata, bytes);

        match self.route(&candidate, targets) {
            Err(_) => Ok(None),
            Ok(matched) => self.merge_matches(&candidate, &matched)?.into_outcome().map(Some),
        }
    }
}
