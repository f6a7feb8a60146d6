// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Object integrity — SHA-256 fingerprints stored in object metadata.

use sha2::{Digest, Sha256};
use voucherwerk_core::error::VoucherwerkError;
use voucherwerk_core::{Metadata, meta};

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Verify that `data` matches the expected SHA-256 hex digest.
///
/// Returns `Err(VoucherwerkError::IntegrityMismatch)` with the expected and
/// actual values when it does not.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<(), VoucherwerkError> {
    let actual = hash_bytes(data);
    if actual.eq_ignore_ascii_case(expected_hex.trim()) {
        Ok(())
    } else {
        Err(VoucherwerkError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}

/// Record the digest of `data` under `content-sha256`.
pub fn stamp(metadata: &mut Metadata, data: &[u8]) {
    metadata.insert(meta::CONTENT_SHA256.to_owned(), hash_bytes(data));
}

/// Check `data` against its `content-sha256` entry. Objects written without
/// a digest pass unchecked.
pub fn verify_stamp(metadata: &Metadata, data: &[u8]) -> Result<(), VoucherwerkError> {
    match metadata.get(meta::CONTENT_SHA256) {
        Some(expected) => verify_hash(data, expected),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// SHA-256 of the empty byte slice (well-known constant).
    const EMPTY_SHA256: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn hash_empty_input() {
        assert_eq!(hash_bytes(b""), EMPTY_SHA256);
    }

    #[test]
    fn hash_known_value() {
        // sha256sum of "hello".
        let expected = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        assert_eq!(hash_bytes(b"hello"), expected);
    }

    #[test]
    fn verify_mismatched_hash() {
        match verify_hash(b"a", "0000").unwrap_err() {
            VoucherwerkError::IntegrityMismatch { expected, actual } => {
                assert_eq!(expected, "0000");
                assert_eq!(actual, hash_bytes(b"a"));
            }
            other => panic!("unexpected error variant: {other}"),
        }
    }

    #[test]
    fn stamped_metadata_verifies() {
        let mut metadata = Metadata::new();
        stamp(&mut metadata, b"raster");
        assert!(verify_stamp(&metadata, b"raster").is_ok());
        assert!(verify_stamp(&metadata, b"tampered").is_err());
    }

    #[test]
    fn unstamped_object_passes() {
        assert!(verify_stamp(&Metadata::new(), b"anything").is_ok());
    }
}
