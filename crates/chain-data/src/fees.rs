//! Fee-rate normalization.
//!
//! Providers disagree on units: explorer APIs report sat/vB directly, while
//! indexer and node APIs report a coin-per-kilobyte float. Everything is
//! normalized to integer sat/vB before it leaves this crate.

/// Convert a coin/kB rate (e.g. "0.0001" BTC per kilobyte) to sat/vB.
///
/// Floored, with a minimum of 1 for any positive rate so a tiny estimate
/// never becomes an unrelayable zero. Non-positive and non-finite inputs
/// yield 0, which callers treat as "no estimate".
pub fn coin_per_kb_to_sat_per_vb(rate: f64) -> u64 {
    if !rate.is_finite() || rate <= 0.0 {
        return 0;
    }
    let sat_per_vb = (rate * 1e8 / 1000.0).floor();
    if sat_per_vb < 1.0 {
        1
    } else {
        sat_per_vb as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_rate() {
        // The canonical cross-variant check: 0.0001 coin/kB is 10 sat/vB.
        assert_eq!(coin_per_kb_to_sat_per_vb(0.0001), 10);
    }

    #[test]
    fn small_rates_floor_to_one() {
        assert_eq!(coin_per_kb_to_sat_per_vb(0.000001), 1); // 0.1 sat/vB
        assert_eq!(coin_per_kb_to_sat_per_vb(0.00000999), 1);
    }

    #[test]
    fn non_positive_rates_mean_no_estimate() {
        assert_eq!(coin_per_kb_to_sat_per_vb(0.0), 0);
        assert_eq!(coin_per_kb_to_sat_per_vb(-1.0), 0);
        assert_eq!(coin_per_kb_to_sat_per_vb(f64::NAN), 0);
    }

    #[test]
    fn large_rates_floor_exactly() {
        assert_eq!(coin_per_kb_to_sat_per_vb(0.001), 100);
        assert_eq!(coin_per_kb_to_sat_per_vb(0.00123456), 123);
    }
}
