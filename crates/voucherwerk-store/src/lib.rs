// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// voucherwerk-store — Object storage, per-key leases, and content integrity.
//
// The merge pipeline only ever talks to the `ObjectStore` and
// `LeaseProvider` traits; backends are chosen by the caller.

pub mod integrity;
pub mod lease;
pub mod sqlite;
pub mod store;

pub use integrity::{hash_bytes, verify_hash};
pub use lease::{LeaseGuard, LeaseProvider, LocalLeaseProvider};
pub use sqlite::{SqliteLeaseProvider, SqliteObjectStore};
pub use store::{MemoryStore, ObjectHead, ObjectStore};
