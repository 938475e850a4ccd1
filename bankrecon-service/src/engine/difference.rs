//! Difference classifier: decides whether an amount gap needs a formal
//! adjustment and validates the operator-confirmed classification.
//!
//! Two-phase: `preview` proposes a default for the operator to confirm,
//! `confirm` validates the final classification. Nothing here persists.

use crate::config::MatchingConfig;
use crate::models::{DifferenceClassification, DifferencePreset, DifferenceType, Direction};
use rust_decimal::Decimal;
use service_core::error::AppError;

pub struct DifferenceClassifier {
    config: MatchingConfig,
}

impl DifferenceClassifier {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    /// Proposes a default classification for the gap, or None when the gap is
    /// within the threshold and the commit needs no classification at all.
    /// The preset is a suggestion for the operator, never auto-applied.
    pub fn preview(
        &self,
        transaction_amount: Decimal,
        candidate_amount: Decimal,
        direction: Direction,
    ) -> Option<DifferencePreset> {
        let difference_amount = transaction_amount - candidate_amount;
        if difference_amount.abs() <= self.config.difference_threshold {
            return None;
        }

        let bank_side_higher = difference_amount > Decimal::ZERO;
        let suggested_type = match (direction, bank_side_higher) {
            (Direction::Credit, true) => DifferenceType::BankInterest,
            (Direction::Credit, false) => DifferenceType::TdsDeducted,
            (Direction::Debit, true) => DifferenceType::BankCharges,
            (Direction::Debit, false) => DifferenceType::RoundOff,
        };

        Some(DifferencePreset {
            difference_amount,
            suggested_type,
        })
    }

    /// Validates the operator-confirmed classification. Unknown types are
    /// rejected; a TDS section is kept only for `tds_deducted`.
    pub fn confirm(
        &self,
        difference_type: &str,
        difference_amount: Decimal,
        notes: Option<String>,
        tds_section: Option<String>,
    ) -> Result<DifferenceClassification, AppError> {
        let kind = DifferenceType::parse(difference_type).ok_or_else(|| {
            AppError::BadRequest(anyhow::anyhow!(
                "Unknown difference type: {}",
                difference_type
            ))
        })?;

        let tds_section = if kind == DifferenceType::TdsDeducted {
            tds_section
        } else {
            None
        };

        Ok(DifferenceClassification {
            difference_amount,
            difference_type: kind.as_str().to_string(),
            notes,
            tds_section,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn classifier() -> DifferenceClassifier {
        DifferenceClassifier::new(MatchingConfig::default())
    }

    #[test]
    fn gap_of_exactly_threshold_needs_no_classification() {
        let preset = classifier().preview(
            Decimal::from(100_010),
            Decimal::from(100_000),
            Direction::Credit,
        );
        assert!(preset.is_none());
    }

    #[test]
    fn gap_just_over_threshold_needs_classification() {
        let preset = classifier().preview(
            Decimal::from_str("100010.01").unwrap(),
            Decimal::from(100_000),
            Direction::Credit,
        );
        assert!(preset.is_some());
    }

    #[test]
    fn credit_excess_defaults_to_bank_interest() {
        let preset = classifier()
            .preview(Decimal::from(10_500), Decimal::from(10_000), Direction::Credit)
            .unwrap();
        assert_eq!(preset.suggested_type, DifferenceType::BankInterest);
        assert_eq!(preset.difference_amount, Decimal::from(500));
    }

    #[test]
    fn credit_shortfall_defaults_to_tds() {
        let preset = classifier()
            .preview(Decimal::from(98_000), Decimal::from(100_000), Direction::Credit)
            .unwrap();
        assert_eq!(preset.suggested_type, DifferenceType::TdsDeducted);
        assert_eq!(preset.difference_amount, Decimal::from(-2_000));
    }

    #[test]
    fn debit_excess_defaults_to_bank_charges() {
        let preset = classifier()
            .preview(Decimal::from(10_118), Decimal::from(10_000), Direction::Debit)
            .unwrap();
        assert_eq!(preset.suggested_type, DifferenceType::BankCharges);
    }

    #[test]
    fn debit_shortfall_defaults_to_round_off() {
        let preset = classifier()
            .preview(Decimal::from(9_950), Decimal::from(10_000), Direction::Debit)
            .unwrap();
        assert_eq!(preset.suggested_type, DifferenceType::RoundOff);
    }

    #[test]
    fn confirm_rejects_unknown_type() {
        let result = classifier().confirm("goodwill", Decimal::from(100), None, None);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn confirm_keeps_tds_section_for_tds_only() {
        let classification = classifier()
            .confirm(
                "tds_deducted",
                Decimal::from(-2_000),
                None,
                Some("194J".to_string()),
            )
            .unwrap();
        assert_eq!(classification.tds_section.as_deref(), Some("194J"));

        let classification = classifier()
            .confirm(
                "bank_charges",
                Decimal::from(118),
                None,
                Some("194J".to_string()),
            )
            .unwrap();
        assert_eq!(classification.tds_section, None);
    }

    #[test]
    fn confirm_accepts_suspense_escape_hatch() {
        let classification = classifier()
            .confirm(
                "suspense",
                Decimal::from(777),
                Some("investigate later".to_string()),
                None,
            )
            .unwrap();
        assert_eq!(classification.difference_type, "suspense");
    }
}
