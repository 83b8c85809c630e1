// 🧾 Analysis Result - What one analysis run produces and persists
//
// The metrics payload is a fixed record with a schema version, not an open
// map, so consumers (webhook receivers, the results endpoint) can rely on it.

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::aggregator::{BehavioralAnalysis, FinancialSummary};
use crate::scoring::ComponentScores;

pub const METRICS_SCHEMA_VERSION: u32 = 1;

// ============================================================================
// RISK CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Low,
    Medium,
    High,
}

impl RiskCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Low => "low",
            RiskCategory::Medium => "medium",
            RiskCategory::High => "high",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskCategory::Low),
            "medium" => Ok(RiskCategory::Medium),
            "high" => Ok(RiskCategory::High),
            other => bail!("Unknown risk category: {}", other),
        }
    }
}

// ============================================================================
// METRICS PAYLOAD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub components: ComponentScores,

    /// 0-100 views of the individual spending patterns
    pub risk_essential_spending: f64,
    pub high_risk_spending: f64,
    pub weekend_spending: f64,

    pub loan_eligibility_factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    pub schema_version: u32,

    /// Set when the window held no transactions and defaults were reported
    pub insufficient_data: bool,

    pub financial_summary: FinancialSummary,
    pub behavioral_analysis: BehavioralAnalysis,
    pub risk_breakdown: RiskBreakdown,
}

// ============================================================================
// ANALYSIS RESULT
// ============================================================================

/// Written once per run, never updated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub user_id: Uuid,
    pub risk_score: f64,
    pub risk_category: RiskCategory,
    pub eligible: bool,
    pub eligibility_reason: String,
    pub metrics: AnalysisMetrics,
    pub created_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn summary(&self) -> String {
        format!(
            "Risk score {:.1} ({}), eligible: {}, reason: {}",
            self.risk_score,
            self.risk_category,
            if self.eligible { "yes" } else { "no" },
            self.eligibility_reason
        )
    }
}
