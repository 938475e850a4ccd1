//! Confidence scoring shared by the suggestion engine and reversal detector.
//!
//! Scores are 0-100, deterministic, and monotonically non-increasing in both
//! amount difference and date distance. Exact amount on the same day scores
//! 100.

use crate::config::MatchingConfig;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const AMOUNT_WEIGHT: f64 = 60.0;
const DATE_WEIGHT: f64 = 40.0;

/// Default tolerance for a transaction: a fixed percentage band clamped so
/// tiny transactions don't over-match and large ones don't under-match.
pub fn default_tolerance(amount: Decimal, config: &MatchingConfig) -> Decimal {
    (amount * config.tolerance_pct).clamp(config.tolerance_min, config.tolerance_max)
}

/// Confidence score from amount and date proximity.
pub fn confidence_score(
    amount_difference: Decimal,
    tolerance: Decimal,
    date_distance_days: i64,
    window_days: i64,
) -> i32 {
    let amount_ratio = if tolerance <= Decimal::ZERO {
        if amount_difference.is_zero() {
            0.0
        } else {
            1.0
        }
    } else {
        (amount_difference.abs() / tolerance)
            .to_f64()
            .unwrap_or(1.0)
            .min(1.0)
    };

    let date_ratio = if window_days <= 0 {
        if date_distance_days == 0 {
            0.0
        } else {
            1.0
        }
    } else {
        (date_distance_days.unsigned_abs() as f64 / window_days as f64).min(1.0)
    };

    let score = AMOUNT_WEIGHT * (1.0 - amount_ratio) + DATE_WEIGHT * (1.0 - date_ratio);
    score.round() as i32
}

/// Human-readable reason for a match, e.g. "exact amount, 2 days apart".
pub fn match_reason(amount_difference: Decimal, date_distance_days: i64) -> String {
    let amount_part = if amount_difference.is_zero() {
        "exact amount".to_string()
    } else {
        format!("amount off by {}", amount_difference.abs())
    };

    let date_part = match date_distance_days.abs() {
        0 => "same day".to_string(),
        1 => "1 day apart".to_string(),
        n => format!("{} days apart", n),
    };

    format!("{}, {}", amount_part, date_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MatchBand;

    fn config() -> MatchingConfig {
        MatchingConfig::default()
    }

    #[test]
    fn tolerance_is_one_percent_within_bounds() {
        let tolerance = default_tolerance(Decimal::from(50_000), &config());
        assert_eq!(tolerance, Decimal::from(500));
    }

    #[test]
    fn tolerance_clamps_small_amounts_up() {
        let tolerance = default_tolerance(Decimal::from(1_000), &config());
        assert_eq!(tolerance, Decimal::from(100));
    }

    #[test]
    fn tolerance_clamps_large_amounts_down() {
        let tolerance = default_tolerance(Decimal::from(5_000_000), &config());
        assert_eq!(tolerance, Decimal::from(10_000));
    }

    #[test]
    fn tolerance_is_monotonic_in_amount() {
        let cfg = config();
        let amounts = [1u64, 500, 10_000, 50_000, 100_000, 1_000_000, 10_000_000];
        let mut last = Decimal::ZERO;
        for amount in amounts {
            let tolerance = default_tolerance(Decimal::from(amount), &cfg);
            assert!(tolerance >= last);
            assert!(tolerance >= cfg.tolerance_min && tolerance <= cfg.tolerance_max);
            last = tolerance;
        }
    }

    #[test]
    fn exact_same_day_scores_100() {
        let score = confidence_score(Decimal::ZERO, Decimal::from(500), 0, 30);
        assert_eq!(score, 100);
        assert_eq!(MatchBand::from_score(score), MatchBand::High);
    }

    #[test]
    fn score_decreases_with_amount_difference() {
        let tolerance = Decimal::from(500);
        let mut last = 101;
        for diff in [0u64, 100, 250, 400, 500] {
            let score = confidence_score(Decimal::from(diff), tolerance, 0, 30);
            assert!(score < last);
            last = score;
        }
    }

    #[test]
    fn score_decreases_with_date_distance() {
        let tolerance = Decimal::from(500);
        let mut last = 101;
        for days in [0i64, 3, 10, 20, 30] {
            let score = confidence_score(Decimal::ZERO, tolerance, days, 30);
            assert!(score < last);
            last = score;
        }
    }

    #[test]
    fn score_is_deterministic() {
        let a = confidence_score(Decimal::from(120), Decimal::from(500), 4, 30);
        let b = confidence_score(Decimal::from(120), Decimal::from(500), 4, 30);
        assert_eq!(a, b);
    }

    #[test]
    fn worst_case_scores_zero() {
        let score = confidence_score(Decimal::from(500), Decimal::from(500), 30, 30);
        assert_eq!(score, 0);
        assert_eq!(MatchBand::from_score(score), MatchBand::Low);
    }

    #[test]
    fn band_edges() {
        assert_eq!(MatchBand::from_score(80), MatchBand::High);
        assert_eq!(MatchBand::from_score(79), MatchBand::Medium);
        assert_eq!(MatchBand::from_score(50), MatchBand::Medium);
        assert_eq!(MatchBand::from_score(49), MatchBand::Low);
    }

    #[test]
    fn reason_mentions_exact_match() {
        assert_eq!(match_reason(Decimal::ZERO, 0), "exact amount, same day");
        assert_eq!(
            match_reason(Decimal::from(-250), 2),
            "amount off by 250, 2 days apart"
        );
    }
}
