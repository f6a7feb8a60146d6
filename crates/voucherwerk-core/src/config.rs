// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Merge pipeline configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Result, VoucherwerkError};

/// Settings shared by the merge orchestrator, the extractor, and the CLI.
///
/// Every field has a default, so a config file only needs the keys it wants
/// to override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Prefix under which voucher PDFs (and their ledger rasters) live.
    pub voucher_prefix: String,
    /// Prefix for attachments parked for manual review or a later retry.
    pub pending_prefix: String,
    /// Prefix for staged writes awaiting promotion.
    pub staging_prefix: String,
    /// Upper bound on waiting for a per-voucher lease.
    pub lease_timeout_ms: u64,
    /// Image streams shorter than this are treated as non-image artifacts.
    pub min_image_stream_len: usize,
    /// Relative tolerance for USD/AED amount comparison.
    pub amount_tolerance: f64,
    /// Purity values closer than this are considered equal.
    pub purity_epsilon: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            voucher_prefix: "organized_vouchers/".into(),
            pending_prefix: "attached_voucher/".into(),
            staging_prefix: "staging/".into(),
            lease_timeout_ms: 30_000,
            min_image_stream_len: 1000,
            amount_tolerance: 0.01,
            purity_epsilon: 1e-4,
        }
    }
}

impl MergeConfig {
    /// Load a JSON config file, filling unspecified keys with defaults.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        debug!(?config, "merge config loaded");
        Ok(config)
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }

    /// Reject settings that would make the pipeline misbehave silently.
    pub fn validate(&self) -> Result<()> {
        let prefixes = [
            ("voucher_prefix", &self.voucher_prefix),
            ("pending_prefix", &self.pending_prefix),
            ("staging_prefix", &self.staging_prefix),
        ];
        for (name, prefix) in prefixes {
            if prefix.is_empty() || !prefix.ends_with('/') {
                return Err(VoucherwerkError::Config(format!(
                    "{name} must be a non-empty prefix ending in '/', got {prefix:?}"
                )));
            }
        }
        for (i, (a_name, a)) in prefixes.iter().enumerate() {
            for (b_name, b) in &prefixes[i + 1..] {
                if a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                    return Err(VoucherwerkError::Config(format!(
                        "{a_name} {a:?} overlaps {b_name} {b:?}"
                    )));
                }
            }
        }
        let tolerance_ok = self.amount_tolerance.is_finite() && self.amount_tolerance >= 0.0;
        let epsilon_ok = self.purity_epsilon.is_finite() && self.purity_epsilon > 0.0;
        if !tolerance_ok || !epsilon_ok {
            return Err(VoucherwerkError::Config(
                "tolerances must be non-negative numbers".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = MergeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lease_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("voucherwerk.json");
        std::fs::write(&path, r#"{ "lease_timeout_ms": 500 }"#).expect("write");

        let config = MergeConfig::load(&path).expect("load");
        assert_eq!(config.lease_timeout_ms, 500);
        assert_eq!(config.voucher_prefix, "organized_vouchers/");
    }

    #[test]
    fn overlapping_prefixes_rejected() {
        let config = MergeConfig {
            staging_prefix: "organized_vouchers/".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(VoucherwerkError::Config(_))));
    }

    #[test]
    fn pending_prefix_must_not_overlap() {
        let under_staging = MergeConfig {
            pending_prefix: "staging/pending/".into(),
            ..Default::default()
        };
        assert!(matches!(under_staging.validate(), Err(VoucherwerkError::Config(_))));

        let same_as_vouchers = MergeConfig {
            pending_prefix: "organized_vouchers/".into(),
            ..Default::default()
        };
        let err = same_as_vouchers.validate().unwrap_err();
        assert!(err.to_string().contains("pending_prefix"));
    }

    #[test]
    fn prefix_without_slash_rejected() {
        let config = MergeConfig {
            pending_prefix: "pending".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
