//! Range utilities

use anyhow::{Result, anyhow};

use crate::WorkRange;

/// Split the inclusive `span` into `parts` contiguous, non-overlapping ranges that cover it
/// exactly. Sizes differ by at most one (earlier ranges get the extra item). `parts` is
/// clamped to the span length; an empty span yields a single empty range.
pub fn split_span(span: WorkRange, parts: usize) -> Result<Vec<WorkRange>> {
    if parts == 0 {
        return Err(anyhow!("cannot split {} into 0 ranges", span));
    }
    if span.is_empty() {
        return Ok(vec![span]);
    }
    // i128 holds the full i64::MIN..=i64::MAX length (2^64), which u64 cannot.
    let len = span.upper as i128 - span.lower as i128 + 1;
    let parts = (parts as i128).min(len);
    let base = len / parts;
    let extra = len % parts;

    let mut out = Vec::with_capacity(parts as usize);
    let mut lower = span.lower as i128;
    for i in 0..parts {
        let size = base + i128::from(i < extra);
        // size >= 1 and the pieces sum to len, so upper never passes span.upper
        let upper = lower + size - 1;
        out.push(WorkRange::new(lower as i64, upper as i64));
        lower = upper + 1;
    }
    Ok(out)
}

/// Resolve the ranges for a run: explicit `ranges` win, else `span` split into `workers`
/// (default `available` threads), else `fallback`.
pub fn resolve_ranges(
    ranges: &[WorkRange],
    span: Option<WorkRange>,
    workers: Option<usize>,
    available: usize,
    fallback: &[(i64, i64)],
) -> Result<Vec<WorkRange>> {
    if !ranges.is_empty() {
        return Ok(ranges.to_vec());
    }
    if let Some(span) = span {
        return split_span(span, workers.unwrap_or(available).max(1));
    }
    Ok(fallback.iter().copied().map(WorkRange::from).collect())
}

/// True when no two ranges share an item.
pub fn ranges_disjoint(ranges: &[WorkRange]) -> bool {
    let mut sorted: Vec<&WorkRange> = ranges.iter().filter(|r| !r.is_empty()).collect();
    sorted.sort_by_key(|r| r.lower);
    sorted.windows(2).all(|w| w[0].upper < w[1].lower)
}
