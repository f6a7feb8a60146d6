// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Voucherwerk — Core types and error definitions shared across all crates.

pub mod config;
pub mod dates;
pub mod error;
pub mod layout;
pub mod types;

pub use config::MergeConfig;
pub use error::{Result, VoucherwerkError};
pub use types::*;
