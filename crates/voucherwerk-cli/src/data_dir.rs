// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Default location of the voucher store.

use std::path::PathBuf;

/// `$XDG_DATA_HOME/voucherwerk`, falling back to `~/.local/share/voucherwerk`.
pub fn data_dir() -> PathBuf {
    base_dir().join("voucherwerk")
}

/// The SQLite store used when `--store` is not given.
pub fn default_store_path() -> PathBuf {
    data_dir().join("vouchers.db")
}

fn base_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}
