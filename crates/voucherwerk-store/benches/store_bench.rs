// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for integrity hashing and the object store backends
// in the voucherwerk-store crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use voucherwerk_core::Metadata;
use voucherwerk_store::{MemoryStore, ObjectStore, SqliteObjectStore, hash_bytes};

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Benchmark SHA-256 integrity hashing at various raster sizes.
///
/// Sizes: 10 KiB, 100 KiB, 1 MiB -- covering small attachment photos up to
/// full-page voucher scans.
fn bench_integrity_hash(c: &mut Criterion) {
    let sizes: &[(&str, usize)] = &[
        ("10 KiB", 10 * 1024),
        ("100 KiB", 100 * 1024),
        ("1 MiB", 1024 * 1024),
    ];

    let mut group = c.benchmark_group("integrity_hash_sha256");
    for &(label, size) in sizes {
        let data = vec![0xABu8; size];
        group.bench_function(label, |b| {
            b.iter(|| black_box(hash_bytes(black_box(&data))));
        });
    }
    group.finish();
}

/// Put 200 ledger-shaped keys, then list one voucher's prefix.
fn bench_store_list(c: &mut Criterion) {
    let payload = vec![0x42u8; 4096];
    let metadata = Metadata::from([("document-no".to_string(), "MPU01-1".to_string())]);

    let memory = MemoryStore::new();
    let sqlite = SqliteObjectStore::open_in_memory().expect("open sqlite");
    for store in [&memory as &dyn ObjectStore, &sqlite as &dyn ObjectStore] {
        for v in 0..50 {
            for slot in ["original.jpg", "attachment_1.png", "attachment_2.png"] {
                let key = format!("organized_vouchers/2025/MPU01-{v}_0001_{slot}");
                store.put(&key, &payload, &metadata).expect("put");
            }
            let pdf = format!("organized_vouchers/2025/MPU01-{v}_0001.pdf");
            store.put(&pdf, &payload, &metadata).expect("put");
        }
    }

    let prefix = "organized_vouchers/2025/MPU01-17_0001";
    c.bench_function("memory list (200 keys)", |b| {
        b.iter(|| black_box(memory.list(black_box(prefix)).expect("list")));
    });
    c.bench_function("sqlite list (200 keys)", |b| {
        b.iter(|| black_box(sqlite.list(black_box(prefix)).expect("list")));
    });
}

criterion_group!(benches, bench_integrity_hash, bench_store_list);
criterion_main!(benches);
