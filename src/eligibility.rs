// ✅ Categorizer & Eligibility - Score → tier, score + overrides → verdict
//
// Check order: insufficient data, hard-deny flags, score cut-off, savings
// minimum. The first failing check decides and names itself in the reason.

use serde::{Deserialize, Serialize};

use crate::aggregator::{SpendingStability, StatisticsBundle};
use crate::analysis::{RiskBreakdown, RiskCategory};
use crate::policy::{CategoryThresholds, RiskPolicy};
use crate::scoring::RiskScore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: String,
}

impl Eligibility {
    fn deny(reason: String) -> Self {
        Eligibility {
            eligible: false,
            reason,
        }
    }
}

/// Monotone bucketing: `[0, medium_from)` low, `[medium_from, high_from)` medium
pub fn categorize(score: f64, thresholds: &CategoryThresholds) -> RiskCategory {
    if score < thresholds.medium_from {
        RiskCategory::Low
    } else if score < thresholds.high_from {
        RiskCategory::Medium
    } else {
        RiskCategory::High
    }
}

pub fn assess_eligibility(score: f64, bundle: &StatisticsBundle, policy: &RiskPolicy) -> Eligibility {
    if bundle.is_empty() {
        return Eligibility::deny(
            "Insufficient transaction history for assessment: no transaction data in window"
                .to_string(),
        );
    }

    let rules = &policy.eligibility;
    let savings_rate = bundle.financial_summary.savings_rate;
    let discretionary = bundle.behavioral_analysis.discretionary_spending_ratio;
    let high_risk = bundle.behavioral_analysis.high_risk_spending_ratio;

    // Hard-deny flags win regardless of score
    if rules.deny_spending_without_income && bundle.financial_summary.spends_without_income() {
        return Eligibility::deny(format!(
            "Negative savings rate: spending of {:.2} with no income in window",
            bundle.financial_summary.total_debits
        ));
    }
    if savings_rate < rules.savings_rate_floor {
        return Eligibility::deny(format!(
            "Negative savings rate ({:.2}) indicating financial stress",
            savings_rate
        ));
    }
    if discretionary > rules.discretionary_ceiling {
        return Eligibility::deny(format!(
            "Discretionary spending ratio ({:.2}) indicates an unstable lifestyle",
            discretionary
        ));
    }
    if high_risk > rules.high_risk_ceiling {
        return Eligibility::deny(format!(
            "Excessive high-risk spending ratio ({:.2}) indicating poor financial discipline",
            high_risk
        ));
    }

    if score >= rules.max_score {
        return Eligibility::deny(format!(
            "Risk score {:.1} is above the eligibility cut-off of {:.1}",
            score, rules.max_score
        ));
    }
    if savings_rate < rules.min_savings_rate {
        return Eligibility::deny(format!(
            "Savings rate ({:.2}) is below the required minimum of {:.2}",
            savings_rate, rules.min_savings_rate
        ));
    }

    let mut strengths = Vec::new();
    if bundle.behavioral_analysis.essential_spending_ratio > 0.5 {
        strengths.push("stable essential spending");
    }
    if high_risk < 0.15 {
        strengths.push("controlled discretionary spending");
    }
    if bundle.financial_summary.consistency_score > 0.7 {
        strengths.push("consistent financial behavior");
    }
    if savings_rate > 0.05 {
        strengths.push("positive savings rate");
    }
    if strengths.is_empty() {
        strengths.push("acceptable risk profile");
    }

    Eligibility {
        eligible: true,
        reason: format!(
            "Eligible with risk score {:.1}, based on {}",
            score,
            strengths.join(", ")
        ),
    }
}

/// Positive signals a reviewer would look for, independent of the verdict
pub fn eligibility_factors(bundle: &StatisticsBundle) -> Vec<String> {
    if bundle.is_empty() {
        return vec!["Insufficient data".to_string()];
    }

    let fs = &bundle.financial_summary;
    let ba = &bundle.behavioral_analysis;
    let mut factors = Vec::new();

    if ba.essential_spending_ratio > 0.5 {
        factors.push("High essential spending ratio".to_string());
    }
    if ba.high_risk_spending_ratio < 0.15 {
        factors.push("Low discretionary spending".to_string());
    }
    if matches!(
        ba.spending_stability,
        SpendingStability::High | SpendingStability::Medium
    ) {
        factors.push("Stable spending pattern".to_string());
    }
    if ba.income_and_spending_analysis.len() > 1 && fs.income_volatility < 0.3 {
        factors.push("Stable income".to_string());
    }
    if factors.is_empty() {
        factors.push("Standard risk profile".to_string());
    }

    factors
}

pub fn risk_breakdown(bundle: &StatisticsBundle, risk: &RiskScore) -> RiskBreakdown {
    let ba = &bundle.behavioral_analysis;

    let risk_essential_spending = if bundle.is_empty() {
        50.0
    } else {
        (50.0 - ba.essential_spending_ratio * 50.0).max(0.0)
    };

    RiskBreakdown {
        components: risk.components,
        risk_essential_spending,
        high_risk_spending: (ba.high_risk_spending_ratio * 100.0).clamp(0.0, 100.0),
        weekend_spending: (ba.weekend_spending_ratio * 100.0).min(50.0),
        loan_eligibility_factors: eligibility_factors(bundle),
    }
}
