// Transaction Risk Analytics - Core Library
// Exposes all modules for use in the CLI, the API server, and tests

pub mod aggregator;
pub mod analysis;
pub mod analyzer;
pub mod config;
pub mod db;
pub mod eligibility;
pub mod error;
pub mod policy;
pub mod scoring;
pub mod store;
pub mod webhook;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use aggregator::{
    Aggregator, BehavioralAnalysis, FinancialSummary, MonthlyFlow, SpendingStability,
    StatisticsBundle,
};
pub use analysis::{AnalysisMetrics, AnalysisResult, RiskBreakdown, RiskCategory, METRICS_SCHEMA_VERSION};
pub use analyzer::RiskAnalyzer;
pub use config::{AppConfig, DatabaseConfig, ServerConfig, WebhookConfig};
pub use db::{
    Transaction, TransactionType, User,
    setup_database, insert_user, insert_transactions, load_users_csv, load_transactions_csv,
    get_user_by_account, get_user_transactions, verify_count, parse_timestamp,
};
pub use eligibility::{assess_eligibility, categorize, Eligibility};
pub use error::{AnalysisError, RiskResult};
pub use policy::{CategoryPolicy, RiskPolicy, SpendingClass};
pub use scoring::{score, ComponentScores, RiskScore};
pub use store::{RiskStore, SqliteStore};
pub use webhook::{Notifier, WebhookNotifier, WebhookPayload};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
