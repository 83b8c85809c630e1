// 🎯 Scorer - Fixed additive risk formula
//
// Five components, each clamped to its own sub-range, summed and clamped to
// [0, 100]. Higher = riskier. Coefficients come from `RiskPolicy`.

use serde::{Deserialize, Serialize};

use crate::aggregator::{FinancialSummary, StatisticsBundle};
use crate::policy::RiskPolicy;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub volatility: f64,
    pub behavioral_risk: f64,
    pub savings_risk: f64,
    pub consistency_penalty: f64,
    pub frequency_adjustment: f64,
}

impl ComponentScores {
    pub fn total(&self) -> f64 {
        self.volatility
            + self.behavioral_risk
            + self.savings_risk
            + self.consistency_penalty
            + self.frequency_adjustment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    /// In [0, 100], rounded to one decimal
    pub overall: f64,
    pub components: ComponentScores,
}

/// Substitute the neutral default for anything that is not a real number
fn finite_or(value: f64, neutral: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        neutral
    }
}

fn clamp_component(value: f64, max: f64) -> f64 {
    finite_or(value, 0.0).clamp(0.0, max.max(0.0))
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

// ============================================================================
// COMPONENTS
// ============================================================================

/// Higher monthly volatility → higher score
pub fn volatility_component(income_volatility: f64, spending_volatility: f64, policy: &RiskPolicy) -> f64 {
    let combined = finite_or(income_volatility, 0.0) + finite_or(spending_volatility, 0.0);
    clamp_component(combined * policy.volatility.weight, policy.volatility.max)
}

/// Non-decreasing in each of the three ratios
pub fn behavioral_risk_component(
    discretionary_ratio: f64,
    weekend_ratio: f64,
    high_risk_ratio: f64,
    policy: &RiskPolicy,
) -> f64 {
    let w = &policy.behavioral;

    let high_risk = finite_or(high_risk_ratio, 0.0) * w.high_risk_weight;
    let weekend = (finite_or(weekend_ratio, 0.0) - w.weekend_baseline).max(0.0) * w.weekend_weight;
    let discretionary = (finite_or(discretionary_ratio, 0.0) - w.discretionary_baseline).max(0.0)
        * w.discretionary_weight;

    clamp_component(high_risk + weekend + discretionary, w.max)
}

/// Non-increasing in savings rate; zero at or above the target rate
pub fn savings_risk_component(savings_rate: f64, policy: &RiskPolicy) -> f64 {
    let s = &policy.savings;
    let shortfall = (s.target_rate - finite_or(savings_rate, 0.0)).max(0.0);
    clamp_component(shortfall * s.weight, s.max)
}

/// No income at all is the worst possible savings position
fn savings_risk(fs: &FinancialSummary, policy: &RiskPolicy) -> f64 {
    if fs.spends_without_income() {
        clamp_component(policy.savings.max, policy.savings.max)
    } else {
        savings_risk_component(fs.savings_rate, policy)
    }
}

pub fn consistency_penalty(consistency_score: f64, policy: &RiskPolicy) -> f64 {
    let consistency = finite_or(consistency_score, 0.0).clamp(0.0, 1.0);
    clamp_component((1.0 - consistency) * policy.consistency.weight, policy.consistency.max)
}

/// Both ends of the reference band are atypical
pub fn frequency_adjustment(transactions_per_day: f64, policy: &RiskPolicy) -> f64 {
    let band = &policy.frequency;
    let freq = finite_or(transactions_per_day, 0.0);

    let penalty = if freq < band.min_per_day {
        band.sparse_penalty
    } else if freq > band.max_per_day {
        band.dense_penalty
    } else {
        0.0
    };

    clamp_component(penalty, band.max)
}

// ============================================================================
// OVERALL SCORE
// ============================================================================

pub fn score(bundle: &StatisticsBundle, policy: &RiskPolicy) -> RiskScore {
    if bundle.is_empty() {
        return RiskScore {
            overall: round_to(policy.neutral_score.clamp(0.0, 100.0), 1),
            components: ComponentScores::default(),
        };
    }

    let fs = &bundle.financial_summary;
    let ba = &bundle.behavioral_analysis;

    let components = ComponentScores {
        volatility: volatility_component(fs.income_volatility, fs.spending_volatility, policy),
        behavioral_risk: behavioral_risk_component(
            ba.discretionary_spending_ratio,
            ba.weekend_spending_ratio,
            ba.high_risk_spending_ratio,
            policy,
        ),
        savings_risk: savings_risk(fs, policy),
        consistency_penalty: consistency_penalty(fs.consistency_score, policy),
        frequency_adjustment: frequency_adjustment(fs.transaction_frequency, policy),
    };

    let overall = finite_or(components.total(), policy.neutral_score).clamp(0.0, 100.0);

    RiskScore {
        overall: round_to(overall, 1),
        components,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RiskPolicy {
        RiskPolicy::default()
    }

    fn bundle_with(f: impl FnOnce(&mut StatisticsBundle)) -> StatisticsBundle {
        let mut bundle = StatisticsBundle::empty(180);
        bundle.financial_summary.transaction_count = 60;
        bundle.financial_summary.transaction_frequency = 60.0 / 180.0;
        bundle.financial_summary.consistency_score = 1.0;
        bundle.financial_summary.savings_rate = 0.3;
        f(&mut bundle);
        bundle
    }

    #[test]
    fn test_empty_bundle_scores_neutral() {
        let result = score(&StatisticsBundle::empty(180), &policy());
        assert_eq!(result.overall, 50.0);
        assert_eq!(result.components, ComponentScores::default());
    }

    #[test]
    fn test_calm_profile_scores_zero() {
        let result = score(&bundle_with(|_| {}), &policy());
        assert_eq!(result.overall, 0.0);
    }

    #[test]
    fn test_components_are_clamped() {
        let p = policy();

        assert_eq!(volatility_component(5.0, 5.0, &p), 40.0);
        assert_eq!(behavioral_risk_component(1.0, 1.0, 1.0, &p), 30.0);
        assert_eq!(savings_risk_component(-10.0, &p), 20.0);
        assert_eq!(consistency_penalty(-3.0, &p), 20.0);
        assert_eq!(frequency_adjustment(0.0, &p), 10.0);
        assert_eq!(frequency_adjustment(5.0, &p), 5.0);
        assert_eq!(frequency_adjustment(0.5, &p), 0.0);
    }

    #[test]
    fn test_overall_in_range_and_finite() {
        let worst = bundle_with(|b| {
            b.financial_summary.income_volatility = f64::INFINITY;
            b.financial_summary.spending_volatility = 9.0;
            b.financial_summary.savings_rate = f64::NAN;
            b.financial_summary.consistency_score = 0.0;
            b.financial_summary.transaction_frequency = 0.01;
            b.behavioral_analysis.discretionary_spending_ratio = 1.0;
            b.behavioral_analysis.weekend_spending_ratio = 1.0;
            b.behavioral_analysis.high_risk_spending_ratio = 1.0;
        });

        let result = score(&worst, &policy());
        assert!(result.overall.is_finite());
        assert!((0.0..=100.0).contains(&result.overall));
        assert_eq!(result.overall, 100.0);
    }

    #[test]
    fn test_behavioral_monotone_in_discretionary_ratio() {
        let p = policy();
        let mut previous = f64::MIN;

        for step in 0..=20 {
            let ratio = step as f64 / 20.0;
            let value = behavioral_risk_component(ratio, 0.3, 0.05, &p);
            assert!(value >= previous, "decreased at ratio {}", ratio);
            previous = value;
        }
    }

    #[test]
    fn test_savings_monotone_decreasing() {
        let p = policy();
        let mut previous = f64::MAX;

        for step in -20..=20 {
            let rate = step as f64 / 10.0;
            let value = savings_risk_component(rate, &p);
            assert!(value <= previous, "increased at savings rate {}", rate);
            previous = value;
        }
        assert_eq!(savings_risk_component(0.1, &p), 0.0);
    }

    #[test]
    fn test_spending_without_income_maxes_savings_risk() {
        let b = bundle_with(|b| {
            b.financial_summary.total_credits = 0.0;
            b.financial_summary.total_debits = 60000.0;
            b.financial_summary.savings_rate = 0.0;
        });

        let result = score(&b, &policy());
        assert_eq!(result.components.savings_risk, 20.0);
        assert_eq!(result.overall, 20.0);
    }

    #[test]
    fn test_rounding_to_one_decimal() {
        let b = bundle_with(|b| {
            b.financial_summary.income_volatility = 0.12345;
        });

        let result = score(&b, &policy());
        // 0.12345 * 50 = 6.1725
        assert_eq!(result.overall, 6.2);
        assert!((result.components.volatility - 6.1725).abs() < 1e-9);
    }
}
