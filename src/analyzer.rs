// 🔬 Risk Analyzer - lookup → fetch → aggregate → score → persist → notify
//
// Strict sequence, no branching back. A failing step short-circuits the rest,
// so a failed run leaves no result row and sends no webhook. Only the notify
// step is allowed to fail quietly.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::Aggregator;
use crate::analysis::{AnalysisMetrics, AnalysisResult, METRICS_SCHEMA_VERSION};
use crate::config::AppConfig;
use crate::eligibility::{assess_eligibility, categorize, risk_breakdown};
use crate::error::{AnalysisError, RiskResult};
use crate::policy::RiskPolicy;
use crate::scoring;
use crate::store::RiskStore;
use crate::webhook::{Notifier, WebhookNotifier, WebhookPayload};

#[derive(Clone)]
pub struct RiskAnalyzer {
    store: Arc<dyn RiskStore>,
    notifier: Option<Arc<dyn Notifier>>,
    policy: Arc<RiskPolicy>,
}

impl RiskAnalyzer {
    pub fn new(
        store: Arc<dyn RiskStore>,
        notifier: Option<Arc<dyn Notifier>>,
        policy: RiskPolicy,
    ) -> Self {
        RiskAnalyzer {
            store,
            notifier,
            policy: Arc::new(policy),
        }
    }

    /// Wire the analyzer from configuration: webhook section → notifier
    pub fn from_config(store: Arc<dyn RiskStore>, config: &AppConfig) -> RiskResult<Self> {
        let notifier: Option<Arc<dyn Notifier>> = match &config.webhook {
            Some(webhook) => Some(Arc::new(WebhookNotifier::new(webhook)?)),
            None => None,
        };

        Ok(Self::new(store, notifier, config.policy.clone()))
    }

    pub fn store(&self) -> &Arc<dyn RiskStore> {
        &self.store
    }

    pub fn policy(&self) -> &RiskPolicy {
        &self.policy
    }

    pub async fn analyze(&self, account_no: &str, bank_code: &str) -> RiskResult<AnalysisResult> {
        self.analyze_at(account_no, bank_code, Utc::now()).await
    }

    /// Same as `analyze` with the window anchored at `now`
    pub async fn analyze_at(
        &self,
        account_no: &str,
        bank_code: &str,
        now: DateTime<Utc>,
    ) -> RiskResult<AnalysisResult> {
        // 1. Lookup
        let user = self
            .store
            .find_user_by_account(account_no, bank_code)?
            .ok_or_else(|| AnalysisError::UserNotFound {
                account_no: account_no.to_string(),
                bank_code: bank_code.to_string(),
            })?;

        // 2. Fetch
        let since = now - Duration::days(self.policy.effective_window_days());
        let transactions = self.store.fetch_transactions(user.id, since, now)?;
        debug!(user_id = %user.id, count = transactions.len(), %since, "fetched transactions");

        // 3-4. Aggregate + score
        let result = self.evaluate(user.id, &transactions, now)?;

        // 5. Persist
        self.store.save_result(&result)?;
        info!(
            user_id = %user.id,
            risk_score = result.risk_score,
            risk_category = %result.risk_category,
            eligible = result.eligible,
            "analysis completed"
        );

        // 6. Notify
        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.deliver(&WebhookPayload::new(&result)).await {
                warn!(user_id = %user.id, error = %e, "webhook delivery failed");
            }
        }

        Ok(result)
    }

    /// Pure part of the pipeline: transactions → result, nothing stored
    pub fn evaluate(
        &self,
        user_id: Uuid,
        transactions: &[crate::db::Transaction],
        now: DateTime<Utc>,
    ) -> RiskResult<AnalysisResult> {
        let bundle = Aggregator::new(&self.policy).aggregate(transactions);
        let risk = scoring::score(&bundle, &self.policy);

        if !risk.overall.is_finite() || !(0.0..=100.0).contains(&risk.overall) {
            return Err(AnalysisError::Computation(format!(
                "risk score {} outside [0, 100]",
                risk.overall
            )));
        }

        let risk_category = categorize(risk.overall, &self.policy.thresholds);
        let eligibility = assess_eligibility(risk.overall, &bundle, &self.policy);

        let metrics = AnalysisMetrics {
            schema_version: METRICS_SCHEMA_VERSION,
            insufficient_data: bundle.is_empty(),
            risk_breakdown: risk_breakdown(&bundle, &risk),
            financial_summary: bundle.financial_summary,
            behavioral_analysis: bundle.behavioral_analysis,
        };

        Ok(AnalysisResult {
            id: Uuid::new_v4(),
            user_id,
            risk_score: risk.overall,
            risk_category,
            eligible: eligibility.eligible,
            eligibility_reason: eligibility.reason,
            metrics,
            // Storage keeps microseconds
            created_at: now.trunc_subsecs(6),
        })
    }

    pub fn latest_result(&self, user_id: Uuid) -> RiskResult<AnalysisResult> {
        self.store
            .latest_result(user_id)?
            .ok_or(AnalysisError::ResultNotFound { user_id })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::analysis::RiskCategory;
    use crate::db::{self, Transaction, TransactionType, User};
    use crate::store::SqliteStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    /// Records every payload; optionally fails each delivery
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub delivered: Mutex<Vec<WebhookPayload>>,
        pub fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn deliver(&self, payload: &WebhookPayload) -> RiskResult<()> {
            self.delivered.lock().unwrap().push(payload.clone());
            if self.fail {
                Err(AnalysisError::Webhook("connection refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    pub(crate) fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap()
    }

    pub(crate) fn seeded_store() -> (Arc<SqliteStore>, User) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let user = User::new("Asha Rao", "123456789012", "HDFC0001234");
        db::insert_user(&store.connection().unwrap(), &user).unwrap();
        (store, user)
    }

    pub(crate) fn insert(store: &SqliteStore, transactions: &[Transaction]) {
        db::insert_transactions(&store.connection().unwrap(), transactions).unwrap();
    }

    /// Ten equal salary credits spread over five months
    pub(crate) fn income_only(user_id: Uuid) -> Vec<Transaction> {
        (0..10)
            .map(|i| {
                let date = Utc.with_ymd_and_hms(2024, 2 + i / 2, 1 + (i % 2) * 14, 9, 0, 0).unwrap();
                Transaction::new(user_id, date, "SALARY", 25000.0, TransactionType::Credit, "salary")
            })
            .collect()
    }

    pub(crate) fn sample_result() -> AnalysisResult {
        let analyzer = RiskAnalyzer::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            None,
            RiskPolicy::default(),
        );
        let user_id = Uuid::new_v4();
        analyzer.evaluate(user_id, &income_only(user_id), now()).unwrap()
    }

    fn analyzer(store: Arc<SqliteStore>, notifier: Option<Arc<RecordingNotifier>>) -> RiskAnalyzer {
        RiskAnalyzer::new(
            store,
            notifier.map(|n| n as Arc<dyn Notifier>),
            RiskPolicy::default(),
        )
    }

    #[tokio::test]
    async fn test_income_only_user_is_low_risk_and_eligible() {
        let (store, user) = seeded_store();
        insert(&store, &income_only(user.id));
        let notifier = Arc::new(RecordingNotifier::default());

        let result = analyzer(store.clone(), Some(notifier.clone()))
            .analyze_at("123456789012", "HDFC0001234", now())
            .await
            .unwrap();

        let fs = &result.metrics.financial_summary;
        assert_eq!(fs.transaction_count, 10);
        assert_eq!(fs.savings_rate, 1.0);
        assert_eq!(result.metrics.behavioral_analysis.discretionary_spending_ratio, 0.0);
        assert_eq!(result.risk_category, RiskCategory::Low);
        assert!(result.eligible, "{}", result.eligibility_reason);
        assert!(!result.eligibility_reason.is_empty());
        assert!(!result.metrics.insufficient_data);

        // persisted and delivered exactly once
        let latest = store.latest_result(user.id).unwrap().unwrap();
        assert_eq!(latest.id, result.id);
        assert_eq!(latest.risk_score, result.risk_score);
        assert_eq!(latest.eligibility_reason, result.eligibility_reason);
        assert_eq!(latest.created_at, result.created_at);
        assert_eq!(latest.metrics.schema_version, 1);
        assert_eq!(notifier.delivered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_transactions_gives_neutral_result() {
        let (store, user) = seeded_store();

        let result = analyzer(store.clone(), None)
            .analyze_at("123456789012", "HDFC0001234", now())
            .await
            .unwrap();

        assert_eq!(result.risk_score, 50.0);
        assert_eq!(result.risk_category, RiskCategory::Medium);
        assert!(!result.eligible);
        assert!(result.eligibility_reason.contains("transaction"));
        assert!(result.metrics.insufficient_data);
        assert!(store.latest_result(user.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_unknown_account_short_circuits() {
        let (store, _) = seeded_store();
        let notifier = Arc::new(RecordingNotifier::default());

        let err = analyzer(store.clone(), Some(notifier.clone()))
            .analyze_at("000000000", "SBIN0000001", now())
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::UserNotFound { .. }));
        assert_eq!(db::count_analysis_results(&store.connection().unwrap()).unwrap(), 0);
        assert!(notifier.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_webhook_failure_does_not_fail_analysis() {
        let (store, user) = seeded_store();
        insert(&store, &income_only(user.id));
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });

        let result = analyzer(store.clone(), Some(notifier.clone()))
            .analyze_at("123456789012", "HDFC0001234", now())
            .await;

        assert!(result.is_ok());
        assert_eq!(notifier.delivered.lock().unwrap().len(), 1);
        assert_eq!(db::count_analysis_results(&store.connection().unwrap()).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_window_excludes_old_transactions() {
        let (store, user) = seeded_store();
        let old = Transaction::new(
            user.id,
            Utc.with_ymd_and_hms(2023, 11, 1, 9, 0, 0).unwrap(),
            "CASINO ROYALE",
            90000.0,
            TransactionType::Debit,
            "casino",
        );
        let mut transactions = income_only(user.id);
        transactions.push(old);
        insert(&store, &transactions);

        let result = analyzer(store, None)
            .analyze_at("123456789012", "HDFC0001234", now())
            .await
            .unwrap();

        assert_eq!(result.metrics.financial_summary.transaction_count, 10);
        assert_eq!(result.metrics.behavioral_analysis.high_risk_spending_ratio, 0.0);
    }

    #[tokio::test]
    async fn test_future_dated_transactions_are_outside_window() {
        let (store, user) = seeded_store();
        let postdated = Transaction::new(
            user.id,
            now() + Duration::days(30),
            "CASINO ROYALE",
            90000.0,
            TransactionType::Debit,
            "casino",
        );
        let mut transactions = income_only(user.id);
        transactions.push(postdated);
        insert(&store, &transactions);

        let result = analyzer(store, None)
            .analyze_at("123456789012", "HDFC0001234", now())
            .await
            .unwrap();

        assert_eq!(result.metrics.financial_summary.transaction_count, 10);
        assert_eq!(result.metrics.behavioral_analysis.high_risk_spending_ratio, 0.0);
        assert!(result.eligible, "{}", result.eligibility_reason);
    }

    #[tokio::test]
    async fn test_spending_without_income_is_denied() {
        let (store, user) = seeded_store();
        let debits: Vec<Transaction> = (0..30)
            .map(|i| {
                Transaction::new(
                    user.id,
                    now() - Duration::days(5 + i * 6),
                    "BIG BAZAAR",
                    2000.0,
                    TransactionType::Debit,
                    "groceries",
                )
            })
            .collect();
        insert(&store, &debits);

        let result = analyzer(store, None)
            .analyze_at("123456789012", "HDFC0001234", now())
            .await
            .unwrap();

        let fs = &result.metrics.financial_summary;
        assert_eq!(fs.total_credits, 0.0);
        assert_eq!(fs.total_debits, 60000.0);
        assert_eq!(result.metrics.risk_breakdown.components.savings_risk, 20.0);
        assert!(!result.eligible);
        assert!(result.eligibility_reason.contains("no income"), "{}", result.eligibility_reason);
    }

    #[tokio::test]
    async fn test_returned_result_matches_stored_result() {
        let (store, user) = seeded_store();
        insert(&store, &income_only(user.id));
        let at = now() + Duration::nanoseconds(123_456_789);

        let result = analyzer(store.clone(), None)
            .analyze_at("123456789012", "HDFC0001234", at)
            .await
            .unwrap();

        let latest = store.latest_result(user.id).unwrap().unwrap();
        assert_eq!(result.created_at, now() + Duration::microseconds(123_456));
        assert_eq!(latest.created_at, result.created_at);
    }

    #[tokio::test]
    async fn test_latest_result_wins_by_creation_time() {
        let (store, user) = seeded_store();
        let analyzer = analyzer(store.clone(), None);

        let first = analyzer.analyze_at("123456789012", "HDFC0001234", now()).await.unwrap();
        insert(&store, &income_only(user.id));
        let second = analyzer
            .analyze_at("123456789012", "HDFC0001234", now() + Duration::hours(1))
            .await
            .unwrap();

        let latest = analyzer.latest_result(user.id).unwrap();
        assert_eq!(latest.id, second.id);
        assert_ne!(latest.id, first.id);

        let missing = analyzer.latest_result(Uuid::new_v4()).unwrap_err();
        assert!(matches!(missing, AnalysisError::ResultNotFound { .. }));
    }

    #[test]
    fn test_evaluate_is_order_independent() {
        let user_id = Uuid::new_v4();
        let analyzer = RiskAnalyzer::new(
            Arc::new(SqliteStore::open_in_memory().unwrap()),
            None,
            RiskPolicy::default(),
        );

        let mut transactions = income_only(user_id);
        for (i, category) in ["rent", "casino", "shopping", "groceries"].iter().enumerate() {
            transactions.push(Transaction::new(
                user_id,
                Utc.with_ymd_and_hms(2024, 3, 2 + i as u32 * 3, 20, 0, 0).unwrap(),
                category,
                1234.56 * (i + 1) as f64,
                TransactionType::Debit,
                category,
            ));
        }
        let mut shuffled = transactions.clone();
        shuffled.reverse();
        shuffled.swap(1, 7);

        let a = analyzer.evaluate(user_id, &transactions, now()).unwrap();
        let b = analyzer.evaluate(user_id, &shuffled, now()).unwrap();

        assert_eq!(a.risk_score.to_bits(), b.risk_score.to_bits());
        assert_eq!(a.risk_category, b.risk_category);
        assert_eq!(a.metrics, b.metrics);
    }
}
