//! Row-count window and distribution primitives
//!
//! All rolling features are defined over "the N most recent rows in this
//! instrument's ordered sequence", never over calendar ranges, so holiday and
//! listing gaps shift the window contents rather than shrinking them. The
//! helpers here operate on nullable series: a window is only populated once
//! the full row-count exists, and aggregates skip nulls inside it.

/// Non-null values in the trailing `len`-row window of `series` ending at
/// `idx` (inclusive). `None` until the window holds `len` rows.
pub fn trailing_nonnull(series: &[Option<f64>], idx: usize, len: usize) -> Option<Vec<f64>> {
    if len == 0 || idx + 1 < len {
        return None;
    }
    let start = idx + 1 - len;
    Some(series[start..=idx].iter().filter_map(|v| *v).collect())
}

/// Strict variant: the trailing `len`-row window with every value present.
/// `None` if the window is not full or any value inside it is null. Used
/// where a null means "insufficient history" rather than a data gap, so the
/// derived value must wait for the whole window to exist.
pub fn trailing_complete(series: &[Option<f64>], idx: usize, len: usize) -> Option<Vec<f64>> {
    if len == 0 || idx + 1 < len {
        return None;
    }
    let start = idx + 1 - len;
    series[start..=idx].iter().copied().collect()
}

/// Like [`trailing_nonnull`] but without the full-window requirement: uses up
/// to `len` trailing rows, however many exist. This matches the warehouse
/// convention for the long 252-row volatility distribution, which starts
/// producing values as soon as any history exists.
pub fn trailing_nonnull_partial(series: &[Option<f64>], idx: usize, len: usize) -> Vec<f64> {
    let start = (idx + 1).saturating_sub(len);
    series[start..=idx].iter().filter_map(|v| *v).collect()
}

/// Unweighted mean; `None` on an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (n-1 denominator); `None` below two values.
pub fn sample_stddev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

pub fn min(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |acc, v| match acc {
        None => Some(v),
        Some(a) => Some(a.min(v)),
    })
}

pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().fold(None, |acc, v| match acc {
        None => Some(v),
        Some(a) => Some(a.max(v)),
    })
}

/// Guarded z-score: `None` when the stddev is zero, non-finite or absent.
pub fn zscore(value: f64, mean: f64, stddev: f64) -> Option<f64> {
    if stddev > 0.0 && stddev.is_finite() {
        Some((value - mean) / stddev)
    } else {
        None
    }
}

/// Continuous percentile with linear interpolation (PERCENTILE_CONT
/// semantics). `p` in [0, 1]. `None` on an empty slice.
pub fn percentile_cont(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("non-finite value in percentile input"));
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return Some(sorted[lo]);
    }
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Equal-count bucket for the item at 0-based `rank` among `n_rows` sorted
/// rows, NTILE semantics: the first `n_rows % buckets` buckets receive one
/// extra row. Returns 1..=buckets.
pub fn ntile(buckets: usize, n_rows: usize, rank: usize) -> u8 {
    debug_assert!(rank < n_rows);
    let base = n_rows / buckets;
    let remainder = n_rows % buckets;
    // First `remainder` buckets hold base+1 rows each.
    let big_rows = remainder * (base + 1);
    let bucket = if rank < big_rows {
        rank / (base + 1)
    } else if base > 0 {
        remainder + (rank - big_rows) / base
    } else {
        // More buckets than rows: one row per bucket.
        rank
    };
    (bucket + 1).min(buckets) as u8
}
