// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry classification with exponential backoff + jitter.
//
// The orchestrator never retries on its own. Callers (a queue worker, the
// CLI) use `should_retry` to decide whether a failed candidate is worth
// another pass.

use std::time::Duration;

use tracing::{debug, info, warn};
use voucherwerk_core::error::VoucherwerkError;

/// Whether an error can clear up on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Lease contention, storage hiccups, interrupted I/O.
    Transient,
    /// Bad input or corrupted state; retrying gives the same answer.
    Permanent,
}

/// Retry configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Base delay between retries (exponential backoff).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Result of evaluating whether to retry.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after this delay.
    RetryAfter(Duration),
    /// The error is permanent.
    GiveUp,
    /// Maximum retries exhausted.
    Exhausted,
}

/// Classify a `VoucherwerkError` for retry decisions.
///
/// A failed merge is classified by its cause.
pub fn classify_error(err: &VoucherwerkError) -> ErrorClass {
    match err {
        VoucherwerkError::MergeFailed { source, .. } => classify_error(source),
        VoucherwerkError::Storage(_) => ErrorClass::Transient,
        VoucherwerkError::Database(_) => ErrorClass::Transient,
        VoucherwerkError::LeaseTimeout(_) => ErrorClass::Transient,

        VoucherwerkError::Format(_) => ErrorClass::Permanent,
        VoucherwerkError::PdfParse(_) => ErrorClass::Permanent,
        VoucherwerkError::EmptyDocument => ErrorClass::Permanent,
        VoucherwerkError::IntegrityMismatch { .. } => ErrorClass::Permanent,
        VoucherwerkError::InvalidRecord(_) => ErrorClass::Permanent,
        VoucherwerkError::NotFound(_) => ErrorClass::Permanent,
        VoucherwerkError::Config(_) => ErrorClass::Permanent,
        VoucherwerkError::Serialization(_) => ErrorClass::Permanent,

        VoucherwerkError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::NotFound
            | std::io::ErrorKind::PermissionDenied
            | std::io::ErrorKind::InvalidData => ErrorClass::Permanent,
            _ => ErrorClass::Transient,
        },
    }
}

/// Decide whether to retry based on the error class and attempt count.
pub fn should_retry(err: &VoucherwerkError, attempt: u32, config: &RetryConfig) -> RetryDecision {
    match classify_error(err) {
        ErrorClass::Permanent => {
            info!(error = %err, "permanent error, not retrying");
            RetryDecision::GiveUp
        }
        ErrorClass::Transient if attempt >= config.max_retries => {
            warn!(attempt, max = config.max_retries, "retry limit exhausted");
            RetryDecision::Exhausted
        }
        ErrorClass::Transient => {
            let delay = compute_delay(attempt, config);
            debug!(attempt, delay_ms = delay.as_millis(), "scheduling retry");
            RetryDecision::RetryAfter(delay)
        }
    }
}

/// delay = min(base * 2^attempt + jitter, max_delay), jitter in [0, base).
fn compute_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(1u64 << attempt.min(10));
    let total_ms = exp_ms.saturating_add(jitter(base_ms, attempt));
    let capped_ms = total_ms.min(config.max_delay.as_millis() as u64);
    Duration::from_millis(capped_ms)
}

/// Deterministic spread across [0, base) from the attempt number.
fn jitter(base_ms: u64, attempt: u32) -> u64 {
    let hash = (attempt as u64).wrapping_mul(6364136223846793005);
    hash % base_ms.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_timeout_is_transient() {
        let err = VoucherwerkError::LeaseTimeout("v/a.pdf".into());
        assert_eq!(classify_error(&err), ErrorClass::Transient);
    }

    #[test]
    fn merge_failure_follows_its_cause() {
        let storage = VoucherwerkError::Storage("disk full".into()).into_merge_failure("v/a.pdf");
        assert_eq!(classify_error(&storage), ErrorClass::Transient);

        let unparseable =
            VoucherwerkError::PdfParse("string values".into()).into_merge_failure("v/a.pdf");
        assert_eq!(classify_error(&unparseable), ErrorClass::Permanent);
        assert_eq!(
            should_retry(&unparseable, 0, &RetryConfig::default()),
            RetryDecision::GiveUp
        );

        let tampered = VoucherwerkError::IntegrityMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        }
        .into_merge_failure("v/a.pdf");
        assert_eq!(classify_error(&tampered), ErrorClass::Permanent);
    }

    #[test]
    fn bad_raster_is_permanent() {
        let err = VoucherwerkError::Format("interlaced PNG".into());
        assert_eq!(classify_error(&err), ErrorClass::Permanent);
        assert_eq!(classify_error(&VoucherwerkError::EmptyDocument), ErrorClass::Permanent);
    }

    #[test]
    fn io_kind_decides() {
        let interrupted = VoucherwerkError::Io(std::io::Error::from(std::io::ErrorKind::Interrupted));
        let denied = VoucherwerkError::Io(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert_eq!(classify_error(&interrupted), ErrorClass::Transient);
        assert_eq!(classify_error(&denied), ErrorClass::Permanent);
    }

    #[test]
    fn retry_respects_max() {
        let config = RetryConfig {
            max_retries: 3,
            ..Default::default()
        };
        let err = VoucherwerkError::Database("locked".into());
        assert!(matches!(should_retry(&err, 0, &config), RetryDecision::RetryAfter(_)));
        assert_eq!(should_retry(&err, 3, &config), RetryDecision::Exhausted);
    }

    #[test]
    fn permanent_error_never_retries() {
        let config = RetryConfig::default();
        let err = VoucherwerkError::InvalidRecord("TIS is not a voucher".into());
        assert_eq!(should_retry(&err, 0, &config), RetryDecision::GiveUp);
    }

    #[test]
    fn delay_increases_with_attempts() {
        let config = RetryConfig::default();
        let d0 = compute_delay(0, &config);
        let d1 = compute_delay(1, &config);
        let d2 = compute_delay(2, &config);
        assert!(d1 > d0);
        assert!(d2 > d1);
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };
        assert!(compute_delay(20, &config) <= Duration::from_secs(10));
    }
}
