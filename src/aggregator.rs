// 📊 Aggregator - Descriptive statistics over one user's window
//
// Single pass over the fetched transactions. Inputs are put into a canonical
// order before any float is accumulated, so every permutation of the same
// transactions yields bit-identical statistics.

use chrono::{Datelike, Weekday};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

use crate::db::{Transaction, TransactionType};
use crate::policy::{CategoryPolicy, RiskPolicy, SpendingClass, StabilityThresholds};

// ============================================================================
// STATISTICS BUNDLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpendingStability {
    Low,
    Medium,
    High,
}

impl SpendingStability {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpendingStability::Low => "Low",
            SpendingStability::Medium => "Medium",
            SpendingStability::High => "High",
        }
    }
}

/// Cash flow of one calendar month (`YYYY-MM`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyFlow {
    pub income: f64,
    pub spending: f64,
    pub net: f64,
    pub savings_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub window_days: i64,
    pub transaction_count: usize,

    /// Transactions per day of window
    pub transaction_frequency: f64,

    pub total_credits: f64,
    pub total_debits: f64,
    pub net_savings: f64,

    /// net_savings / total_credits, 0 without credits
    pub savings_rate: f64,

    pub monthly_spendings: BTreeMap<String, f64>,
    pub monthly_savings: BTreeMap<String, f64>,
    pub total_savings: f64,

    /// Standard deviation of monthly totals
    pub income_std_dev: f64,
    pub spending_std_dev: f64,

    /// Standard deviation of monthly totals normalized by their mean
    pub income_volatility: f64,
    pub spending_volatility: f64,

    /// 1 / (1 + CV of monthly net cash flow), in [0, 1]
    pub consistency_score: f64,
}

impl FinancialSummary {
    /// Money went out but none came in; `savings_rate` reads 0 here
    pub fn spends_without_income(&self) -> bool {
        self.total_credits <= 0.0 && self.total_debits > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralAnalysis {
    pub category_spending: BTreeMap<String, f64>,

    /// Category share of total debits
    pub spending_pattern_distribution: BTreeMap<String, f64>,

    pub income_and_spending_analysis: BTreeMap<String, MonthlyFlow>,
    pub spending_stability: SpendingStability,

    pub essential_spending: f64,
    pub discretionary_spending: f64,
    pub high_risk_spending: f64,
    pub essential_spending_ratio: f64,
    pub discretionary_spending_ratio: f64,
    pub high_risk_spending_ratio: f64,

    pub weekday_spending: f64,
    pub weekend_spending: f64,
    pub weekend_spending_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsBundle {
    pub financial_summary: FinancialSummary,
    pub behavioral_analysis: BehavioralAnalysis,
}

impl StatisticsBundle {
    /// Neutral bundle for a window without transactions
    pub fn empty(window_days: i64) -> Self {
        StatisticsBundle {
            financial_summary: FinancialSummary {
                window_days,
                transaction_count: 0,
                transaction_frequency: 0.0,
                total_credits: 0.0,
                total_debits: 0.0,
                net_savings: 0.0,
                savings_rate: 0.0,
                monthly_spendings: BTreeMap::new(),
                monthly_savings: BTreeMap::new(),
                total_savings: 0.0,
                income_std_dev: 0.0,
                spending_std_dev: 0.0,
                income_volatility: 0.0,
                spending_volatility: 0.0,
                consistency_score: 0.0,
            },
            behavioral_analysis: BehavioralAnalysis {
                category_spending: BTreeMap::new(),
                spending_pattern_distribution: BTreeMap::new(),
                income_and_spending_analysis: BTreeMap::new(),
                spending_stability: SpendingStability::Medium,
                essential_spending: 0.0,
                discretionary_spending: 0.0,
                high_risk_spending: 0.0,
                essential_spending_ratio: 0.0,
                discretionary_spending_ratio: 0.0,
                high_risk_spending_ratio: 0.0,
                weekday_spending: 0.0,
                weekend_spending: 0.0,
                weekend_spending_ratio: 0.0,
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.financial_summary.transaction_count == 0
    }
}

// ============================================================================
// MATH HELPERS
// ============================================================================

pub fn safe_divide(numerator: f64, denominator: f64, default: f64) -> f64 {
    if denominator == 0.0 || !denominator.is_finite() {
        default
    } else {
        numerator / denominator
    }
}

pub fn mean(values: &[f64]) -> f64 {
    safe_divide(values.iter().sum::<f64>(), values.len() as f64, 0.0)
}

/// Population standard deviation. Zero for fewer than two values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Coefficient of variation against a non-negative series; 0 when mean is 0
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    safe_divide(std_dev(values), mean(values).abs(), 0.0)
}

fn canonical_order(a: &Transaction, b: &Transaction) -> Ordering {
    a.date
        .cmp(&b.date)
        .then(a.transaction_type.cmp(&b.transaction_type))
        .then(a.amount.abs().total_cmp(&b.amount.abs()))
        .then_with(|| a.category.cmp(&b.category))
        .then_with(|| a.description.cmp(&b.description))
        .then(a.id.cmp(&b.id))
}

// ============================================================================
// AGGREGATOR
// ============================================================================

pub struct Aggregator {
    pub window_days: i64,
    pub categories: CategoryPolicy,
    pub stability: StabilityThresholds,
}

impl Aggregator {
    pub fn new(policy: &RiskPolicy) -> Self {
        Aggregator {
            window_days: policy.effective_window_days(),
            categories: policy.categories.clone(),
            stability: policy.stability.clone(),
        }
    }

    pub fn aggregate(&self, transactions: &[Transaction]) -> StatisticsBundle {
        let mut ordered: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| {
                let usable = tx.amount.is_finite();
                if !usable {
                    debug!(id = %tx.id, "skipping transaction with non-finite amount");
                }
                usable
            })
            .collect();

        if ordered.is_empty() {
            return StatisticsBundle::empty(self.window_days);
        }
        ordered.sort_by(|a, b| canonical_order(a, b));

        let mut total_credits = 0.0;
        let mut total_debits = 0.0;
        let mut essential_spending = 0.0;
        let mut discretionary_spending = 0.0;
        let mut high_risk_spending = 0.0;
        let mut weekday_spending = 0.0;
        let mut weekend_spending = 0.0;
        let mut category_spending: BTreeMap<String, f64> = BTreeMap::new();
        let mut months: BTreeMap<String, MonthlyFlow> = BTreeMap::new();

        for tx in &ordered {
            let amount = tx.amount.abs();
            let month = months.entry(tx.date.format("%Y-%m").to_string()).or_default();

            match tx.transaction_type {
                TransactionType::Credit => {
                    total_credits += amount;
                    month.income += amount;
                }
                TransactionType::Debit => {
                    total_debits += amount;
                    month.spending += amount;

                    *category_spending
                        .entry(CategoryPolicy::normalize(&tx.category))
                        .or_insert(0.0) += amount;

                    let class = self.categories.classify(&tx.category);
                    match class {
                        SpendingClass::Essential => essential_spending += amount,
                        SpendingClass::HighRisk => high_risk_spending += amount,
                        SpendingClass::Discretionary => {}
                    }
                    if class.is_discretionary() {
                        discretionary_spending += amount;
                    }

                    if matches!(tx.date.weekday(), Weekday::Sat | Weekday::Sun) {
                        weekend_spending += amount;
                    } else {
                        weekday_spending += amount;
                    }
                }
            }
        }

        // Per-month derived values
        let mut monthly_spendings = BTreeMap::new();
        let mut monthly_savings = BTreeMap::new();
        for (key, flow) in months.iter_mut() {
            flow.net = flow.income - flow.spending;
            flow.savings_rate = safe_divide(flow.net, flow.income, 0.0);
            monthly_spendings.insert(key.clone(), flow.spending);
            monthly_savings.insert(key.clone(), flow.net.max(0.0));
        }

        let incomes: Vec<f64> = months.values().map(|f| f.income).collect();
        let spendings: Vec<f64> = months.values().map(|f| f.spending).collect();
        let nets: Vec<f64> = months.values().map(|f| f.net).collect();

        let net_savings = total_credits - total_debits;
        let transaction_count = ordered.len();

        let financial_summary = FinancialSummary {
            window_days: self.window_days,
            transaction_count,
            transaction_frequency: transaction_count as f64 / self.window_days as f64,
            total_credits,
            total_debits,
            net_savings,
            savings_rate: safe_divide(net_savings, total_credits, 0.0),
            total_savings: monthly_savings.values().sum(),
            monthly_spendings,
            monthly_savings,
            income_std_dev: std_dev(&incomes),
            spending_std_dev: std_dev(&spendings),
            income_volatility: coefficient_of_variation(&incomes),
            spending_volatility: coefficient_of_variation(&spendings),
            consistency_score: consistency_score(&nets),
        };

        let spending_pattern_distribution = category_spending
            .iter()
            .map(|(category, amount)| (category.clone(), safe_divide(*amount, total_debits, 0.0)))
            .collect();

        let behavioral_analysis = BehavioralAnalysis {
            category_spending,
            spending_pattern_distribution,
            spending_stability: self.spending_stability(&spendings),
            income_and_spending_analysis: months,
            essential_spending,
            discretionary_spending,
            high_risk_spending,
            essential_spending_ratio: safe_divide(essential_spending, total_debits, 0.0),
            discretionary_spending_ratio: safe_divide(discretionary_spending, total_debits, 0.0),
            high_risk_spending_ratio: safe_divide(high_risk_spending, total_debits, 0.0),
            weekday_spending,
            weekend_spending,
            weekend_spending_ratio: safe_divide(weekend_spending, total_debits, 0.0),
        };

        StatisticsBundle {
            financial_summary,
            behavioral_analysis,
        }
    }

    fn spending_stability(&self, monthly_spending: &[f64]) -> SpendingStability {
        let active: Vec<f64> = monthly_spending.iter().copied().filter(|s| *s > 0.0).collect();
        if active.len() < 2 {
            return SpendingStability::Medium;
        }

        let cv = coefficient_of_variation(&active);
        if cv < self.stability.high_below {
            SpendingStability::High
        } else if cv < self.stability.medium_below {
            SpendingStability::Medium
        } else {
            SpendingStability::Low
        }
    }
}

/// Inverse of the coefficient of variation of monthly net cash flow
fn consistency_score(monthly_net: &[f64]) -> f64 {
    if monthly_net.is_empty() {
        return 0.0;
    }

    let spread = std_dev(monthly_net);
    let level = mean(monthly_net).abs();

    let cv = if spread == 0.0 {
        0.0
    } else if level == 0.0 {
        return 0.0;
    } else {
        spread / level
    };

    (1.0 / (1.0 + cv)).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn tx(date: DateTime<Utc>, amount: f64, kind: TransactionType, category: &str) -> Transaction {
        Transaction::new(Uuid::nil(), date, category, amount, kind, category)
    }

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    fn aggregator() -> Aggregator {
        Aggregator::new(&RiskPolicy::default())
    }

    fn sample() -> Vec<Transaction> {
        vec![
            tx(day(2024, 1, 1), 50000.0, TransactionType::Credit, "salary"),
            tx(day(2024, 1, 3), 15000.0, TransactionType::Debit, "rent"),
            tx(day(2024, 1, 6), 4000.0, TransactionType::Debit, "Casino"), // Saturday
            tx(day(2024, 1, 9), 1000.0, TransactionType::Debit, "shopping"),
            tx(day(2024, 2, 1), 40000.0, TransactionType::Credit, "salary"),
            tx(day(2024, 2, 5), -15000.0, TransactionType::Debit, "rent"),
            tx(day(2024, 2, 10), 5000.0, TransactionType::Debit, "groceries"), // Saturday
        ]
    }

    #[test]
    fn test_totals_and_ratios() {
        let bundle = aggregator().aggregate(&sample());
        let fs = &bundle.financial_summary;
        let ba = &bundle.behavioral_analysis;

        assert_eq!(fs.transaction_count, 7);
        assert_eq!(fs.total_credits, 90000.0);
        assert_eq!(fs.total_debits, 40000.0);
        assert_eq!(fs.net_savings, 50000.0);
        assert!((fs.savings_rate - 50000.0 / 90000.0).abs() < 1e-12);
        assert!((fs.transaction_frequency - 7.0 / 180.0).abs() < 1e-12);

        assert_eq!(ba.category_spending.get("rent"), Some(&30000.0));
        assert_eq!(ba.category_spending.get("casino"), Some(&4000.0));
        assert!((ba.spending_pattern_distribution["rent"] - 0.75).abs() < 1e-12);

        assert_eq!(ba.essential_spending, 35000.0);
        assert_eq!(ba.high_risk_spending, 4000.0);
        assert_eq!(ba.discretionary_spending, 5000.0);
        assert!((ba.essential_spending_ratio - 0.875).abs() < 1e-12);
        assert!((ba.discretionary_spending_ratio - 0.125).abs() < 1e-12);
        assert!((ba.high_risk_spending_ratio - 0.1).abs() < 1e-12);

        assert_eq!(ba.weekend_spending, 9000.0);
        assert_eq!(ba.weekday_spending, 31000.0);
        assert!((ba.weekend_spending_ratio - 0.225).abs() < 1e-12);
    }

    #[test]
    fn test_monthly_flows_and_volatility() {
        let bundle = aggregator().aggregate(&sample());
        let fs = &bundle.financial_summary;
        let months = &bundle.behavioral_analysis.income_and_spending_analysis;

        assert_eq!(months.len(), 2);
        assert_eq!(months["2024-01"].income, 50000.0);
        assert_eq!(months["2024-01"].spending, 20000.0);
        assert_eq!(months["2024-01"].net, 30000.0);
        assert_eq!(months["2024-02"].net, 20000.0);
        assert_eq!(fs.monthly_savings["2024-02"], 20000.0);
        assert_eq!(fs.total_savings, 50000.0);

        // incomes 50k / 40k → std 5k, mean 45k
        assert!((fs.income_std_dev - 5000.0).abs() < 1e-9);
        assert!((fs.income_volatility - 5000.0 / 45000.0).abs() < 1e-12);
        // spendings equal → no volatility
        assert_eq!(fs.spending_std_dev, 0.0);
        assert_eq!(fs.spending_volatility, 0.0);
        // nets 30k / 20k → cv 0.2
        assert!((fs.consistency_score - 1.0 / 1.2).abs() < 1e-12);
        assert_eq!(bundle.behavioral_analysis.spending_stability, SpendingStability::High);
    }

    #[test]
    fn test_empty_input_is_neutral() {
        let bundle = aggregator().aggregate(&[]);

        assert!(bundle.is_empty());
        assert_eq!(bundle, StatisticsBundle::empty(180));
        assert_eq!(bundle.financial_summary.savings_rate, 0.0);
        assert_eq!(bundle.behavioral_analysis.weekend_spending_ratio, 0.0);
        assert_eq!(bundle.behavioral_analysis.spending_stability, SpendingStability::Medium);
    }

    #[test]
    fn test_single_transaction_has_zero_volatility() {
        let bundle = aggregator().aggregate(&[tx(day(2024, 3, 4), 700.0, TransactionType::Debit, "fuel")]);
        let fs = &bundle.financial_summary;

        assert_eq!(fs.income_volatility, 0.0);
        assert_eq!(fs.spending_volatility, 0.0);
        assert_eq!(fs.income_std_dev, 0.0);
        assert_eq!(fs.savings_rate, 0.0, "no credits → savings rate defaults to 0");
        assert!(fs.spends_without_income());
        assert_eq!(fs.consistency_score, 1.0);
        assert!(fs.consistency_score.is_finite());
    }

    #[test]
    fn test_order_independent_bit_identical() {
        let forward = sample();
        let mut reversed = forward.clone();
        reversed.reverse();
        let mut rotated = forward.clone();
        rotated.rotate_left(3);

        let a = aggregator().aggregate(&forward);
        let b = aggregator().aggregate(&reversed);
        let c = aggregator().aggregate(&rotated);

        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(
            a.financial_summary.consistency_score.to_bits(),
            c.financial_summary.consistency_score.to_bits()
        );
    }

    #[test]
    fn test_non_finite_amounts_are_ignored() {
        let mut txs = sample();
        txs.push(tx(day(2024, 2, 11), f64::NAN, TransactionType::Debit, "rent"));

        let bundle = aggregator().aggregate(&txs);
        assert_eq!(bundle.financial_summary.transaction_count, 7);
        assert!(bundle.financial_summary.total_debits.is_finite());
    }

    #[test]
    fn test_math_helpers() {
        assert_eq!(safe_divide(1.0, 0.0, 7.0), 7.0);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(std_dev(&[3.0]), 0.0);
        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.0).abs() < 1e-12);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0]), 0.0);
        assert_eq!(consistency_score(&[100.0, -100.0]), 0.0);
    }
}
