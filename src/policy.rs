// ⚖️ Risk Policy - Every tunable constant in one table
//
// Weights, sub-ranges, category boundaries and eligibility rules live here so
// tuning never touches the scoring logic. All sections deserialize with
// defaults, so a config file only needs the values it overrides.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Ten years; keeps `chrono::Duration::days` far from its limits
pub const MAX_WINDOW_DAYS: i64 = 3650;

// ============================================================================
// SPENDING CLASS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpendingClass {
    /// Rent, groceries, utilities... (money that has to go out)
    Essential,

    /// Gambling, nightlife, luxury... (counted as discretionary too)
    HighRisk,

    /// Everything else
    Discretionary,
}

impl SpendingClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpendingClass::Essential => "Essential",
            SpendingClass::HighRisk => "HighRisk",
            SpendingClass::Discretionary => "Discretionary",
        }
    }

    pub fn is_discretionary(&self) -> bool {
        !matches!(self, SpendingClass::Essential)
    }
}

// ============================================================================
// CATEGORY POLICY (static membership table)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryPolicy {
    pub essential: BTreeSet<String>,
    pub high_risk: BTreeSet<String>,
}

impl CategoryPolicy {
    /// Normalize a free-text category label for lookup
    pub fn normalize(category: &str) -> String {
        category.trim().to_lowercase()
    }

    /// Classify a category label. Unknown labels are discretionary.
    pub fn classify(&self, category: &str) -> SpendingClass {
        let key = Self::normalize(category);

        if self.essential.contains(&key) {
            SpendingClass::Essential
        } else if self.high_risk.contains(&key) {
            SpendingClass::HighRisk
        } else {
            SpendingClass::Discretionary
        }
    }
}

impl Default for CategoryPolicy {
    fn default() -> Self {
        let essential = [
            "groceries",
            "utilities",
            "rent",
            "mortgage",
            "insurance",
            "healthcare",
            "medicine",
            "fuel",
            "transport",
            "education",
            "bills",
        ];
        let high_risk = [
            "gambling",
            "casino",
            "betting",
            "alcohol",
            "tobacco",
            "luxury",
            "entertainment",
            "gaming",
            "nightlife",
            "party",
        ];

        CategoryPolicy {
            essential: essential.iter().map(|c| c.to_string()).collect(),
            high_risk: high_risk.iter().map(|c| c.to_string()).collect(),
        }
    }
}

// ============================================================================
// COMPONENT WEIGHTS
// ============================================================================

/// volatility = (income_volatility + spending_volatility) * weight
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityWeights {
    pub weight: f64,
    pub max: f64,
}

impl Default for VolatilityWeights {
    fn default() -> Self {
        VolatilityWeights {
            weight: 50.0,
            max: 40.0,
        }
    }
}

/// behavioral = high_risk * w1 + (weekend - b1)+ * w2 + (discretionary - b2)+ * w3
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralWeights {
    pub high_risk_weight: f64,
    pub weekend_weight: f64,
    pub weekend_baseline: f64,
    pub discretionary_weight: f64,
    pub discretionary_baseline: f64,
    pub max: f64,
}

impl Default for BehavioralWeights {
    fn default() -> Self {
        BehavioralWeights {
            high_risk_weight: 30.0,
            weekend_weight: 20.0,
            weekend_baseline: 0.2,
            discretionary_weight: 15.0,
            discretionary_baseline: 0.4,
            max: 30.0,
        }
    }
}

/// savings = (target_rate - savings_rate)+ * weight
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SavingsWeights {
    pub target_rate: f64,
    pub weight: f64,
    pub max: f64,
}

impl Default for SavingsWeights {
    fn default() -> Self {
        SavingsWeights {
            target_rate: 0.1,
            weight: 25.0,
            max: 20.0,
        }
    }
}

/// consistency = (1 - consistency_score) * weight
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyWeights {
    pub weight: f64,
    pub max: f64,
}

impl Default for ConsistencyWeights {
    fn default() -> Self {
        ConsistencyWeights {
            weight: 20.0,
            max: 20.0,
        }
    }
}

/// Reference band for transactions per day. Outside the band is atypical.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyBand {
    pub min_per_day: f64,
    pub max_per_day: f64,
    pub sparse_penalty: f64,
    pub dense_penalty: f64,
    pub max: f64,
}

impl Default for FrequencyBand {
    fn default() -> Self {
        // 20 and 300 transactions over a 180 day window
        FrequencyBand {
            min_per_day: 0.1,
            max_per_day: 1.7,
            sparse_penalty: 10.0,
            dense_penalty: 5.0,
            max: 10.0,
        }
    }
}

// ============================================================================
// CATEGORY & ELIGIBILITY THRESHOLDS
// ============================================================================

/// score < medium_from → low, score < high_from → medium, else high
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryThresholds {
    pub medium_from: f64,
    pub high_from: f64,
}

impl Default for CategoryThresholds {
    fn default() -> Self {
        CategoryThresholds {
            medium_from: 40.0,
            high_from: 70.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilityRules {
    /// Eligible only strictly below this score
    pub max_score: f64,

    /// Eligible only at or above this savings rate
    pub min_savings_rate: f64,

    /// Hard deny below this savings rate
    pub savings_rate_floor: f64,

    /// Hard deny above this discretionary ratio
    pub discretionary_ceiling: f64,

    /// Hard deny above this high-risk ratio
    pub high_risk_ceiling: f64,

    /// Hard deny when the window has debits but no credits
    pub deny_spending_without_income: bool,
}

impl Default for EligibilityRules {
    fn default() -> Self {
        EligibilityRules {
            max_score: 60.0,
            min_savings_rate: -0.1,
            savings_rate_floor: -0.5,
            discretionary_ceiling: 0.8,
            high_risk_ceiling: 0.25,
            deny_spending_without_income: true,
        }
    }
}

/// Coefficient-of-variation cut-offs for spending stability
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityThresholds {
    pub high_below: f64,
    pub medium_below: f64,
}

impl Default for StabilityThresholds {
    fn default() -> Self {
        StabilityThresholds {
            high_below: 0.2,
            medium_below: 0.4,
        }
    }
}

// ============================================================================
// RISK POLICY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskPolicy {
    /// Trailing window in days
    pub window_days: i64,

    /// Score reported when there is nothing to analyze
    pub neutral_score: f64,

    pub volatility: VolatilityWeights,
    pub behavioral: BehavioralWeights,
    pub savings: SavingsWeights,
    pub consistency: ConsistencyWeights,
    pub frequency: FrequencyBand,
    pub thresholds: CategoryThresholds,
    pub eligibility: EligibilityRules,
    pub stability: StabilityThresholds,
    pub categories: CategoryPolicy,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        RiskPolicy {
            window_days: 180,
            neutral_score: 50.0,
            volatility: VolatilityWeights::default(),
            behavioral: BehavioralWeights::default(),
            savings: SavingsWeights::default(),
            consistency: ConsistencyWeights::default(),
            frequency: FrequencyBand::default(),
            thresholds: CategoryThresholds::default(),
            eligibility: EligibilityRules::default(),
            stability: StabilityThresholds::default(),
            categories: CategoryPolicy::default(),
        }
    }
}

impl RiskPolicy {
    /// Window length actually used for fetching and frequency
    pub fn effective_window_days(&self) -> i64 {
        self.window_days.clamp(1, MAX_WINDOW_DAYS)
    }

    /// Reject values that would make fetch, aggregation and scoring disagree
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_WINDOW_DAYS).contains(&self.window_days) {
            bail!(
                "policy.window_days must be between 1 and {}, got {}",
                MAX_WINDOW_DAYS,
                self.window_days
            );
        }
        if !(0.0..=100.0).contains(&self.neutral_score) {
            bail!("policy.neutral_score must be within [0, 100], got {}", self.neutral_score);
        }

        let t = &self.thresholds;
        if !(t.medium_from.is_finite() && t.high_from.is_finite() && t.medium_from <= t.high_from) {
            bail!(
                "policy.thresholds must satisfy medium_from <= high_from, got {} and {}",
                t.medium_from,
                t.high_from
            );
        }

        let f = &self.frequency;
        if !(f.min_per_day.is_finite() && f.max_per_day.is_finite() && f.min_per_day <= f.max_per_day) {
            bail!(
                "policy.frequency must satisfy min_per_day <= max_per_day, got {} and {}",
                f.min_per_day,
                f.max_per_day
            );
        }

        Ok(())
    }
}
