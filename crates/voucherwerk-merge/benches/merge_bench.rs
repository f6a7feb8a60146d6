// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the match engine: a full scan of a realistic
// voucher list for one candidate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use voucherwerk_core::{AttachmentCandidate, VoucherRecord};
use voucherwerk_merge::MatchEngine;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// `count` vouchers with varied weights, amounts, dates, and date formats.
fn vouchers(count: usize) -> Vec<VoucherRecord> {
    const CODES: [&str; 4] = ["MPU", "MSL", "REC", "TIS"];
    (0..count)
        .map(|i| {
            let code = CODES[i % CODES.len()];
            let mut r = VoucherRecord::new(format!("{code}01-{i}"), code, format!("v/{i}_0001.pdf"));
            r.gold_weight = Some(format!("{}.{}", 1000 + i % 500, i % 100));
            r.amount_usd = Some(format!("{},{:03}.50", 10 + i % 90, i % 1000));
            r.purity = Some(if i % 3 == 0 { "22K".into() } else { "0.995".into() });
            r.document_date = Some(match i % 3 {
                0 => format!("{:02}/06/2025", 1 + i % 28),
                1 => format!("{}-Jun-25", 1 + i % 28),
                _ => format!("2025-06-{:02}", 1 + i % 28),
            });
            r
        })
        .collect()
}

fn candidate() -> AttachmentCandidate {
    let mut c = AttachmentCandidate::new("FHE", "FHE-1", vec![0xFF, 0xD8, 0xFF]);
    c.gold_weight = Some("1250.75".into());
    c.purity = Some("22k".into());
    c.document_date = Some("23-06-2025".into());
    c
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Scan 5 000 vouchers; every criterion is parsed from strings each time.
fn bench_search_matches(c: &mut Criterion) {
    let targets = vouchers(5_000);
    let candidate = candidate();
    let engine = MatchEngine::default();

    c.bench_function("search_matches (5000 vouchers)", |b| {
        b.iter(|| black_box(engine.search_matches(black_box(&candidate), black_box(&targets)).len()));
    });
}

/// A single pair, all criteria evaluated.
fn bench_evaluate(c: &mut Criterion) {
    let targets = vouchers(1);
    let candidate = candidate();
    let engine = MatchEngine::default();

    c.bench_function("evaluate (one pair)", |b| {
        b.iter(|| black_box(engine.evaluate(black_box(&candidate), black_box(&targets[0]))));
    });
}

criterion_group!(benches, bench_search_matches, bench_evaluate);
criterion_main!(benches);
