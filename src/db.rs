use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::analysis::{AnalysisMetrics, AnalysisResult, RiskCategory};
use crate::policy::CategoryPolicy;

// ============================================================================
// DOMAIN RECORDS
// ============================================================================

/// Account holder. Created by the import path, only read by the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub account_no: String,
    pub bank_code: String,
}

impl User {
    pub fn new(name: &str, account_no: &str, bank_code: &str) -> Self {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            account_no: account_no.trim().to_string(),
            bank_code: bank_code.trim().to_uppercase(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Credit,
    Debit,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Credit => "credit",
            TransactionType::Debit => "debit",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "credit" | "cr" => Ok(TransactionType::Credit),
            "debit" | "dr" => Ok(TransactionType::Debit),
            other => bail!("Unknown transaction type: {}", other),
        }
    }
}

/// Transaction as read by the analyzer. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: DateTime<Utc>,
    pub description: String,

    /// Signed as recorded; the analyzer uses the magnitude and takes the
    /// direction from `transaction_type`.
    pub amount: f64,

    pub transaction_type: TransactionType,
    pub category: String,

    /// Payment app / channel tag (UPI app, card, ...)
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_channel: Option<String>,
}

impl Transaction {
    pub fn new(
        user_id: Uuid,
        date: DateTime<Utc>,
        description: &str,
        amount: f64,
        transaction_type: TransactionType,
        category: &str,
    ) -> Self {
        Transaction {
            id: Uuid::new_v4(),
            user_id,
            date,
            description: description.to_string(),
            amount,
            transaction_type,
            category: category.to_string(),
            payment_channel: None,
        }
    }

    /// Compute idempotency hash for duplicate detection on import.
    /// Identity = id (UUID), Deduplication = hash over
    /// user, date, amount, type, category and description.
    pub fn compute_idempotency_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!(
            "{}|{}|{}|{}|{}|{}",
            self.user_id,
            format_timestamp(&self.date),
            self.amount,
            self.transaction_type,
            CategoryPolicy::normalize(&self.category),
            self.description
        ));
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// CSV ROWS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub account_no: String,
    #[serde(alias = "ifsc_code", alias = "ifsc")]
    pub bank_code: String,
}

/// Transaction row keyed by account rather than user id
#[derive(Debug, Deserialize)]
pub struct TransactionRecord {
    pub account_no: String,
    #[serde(alias = "ifsc_code", alias = "ifsc")]
    pub bank_code: String,
    pub date: String,
    pub description: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub category: String,
    #[serde(default, alias = "UPI_App", alias = "upi_app")]
    pub payment_channel: Option<String>,
}

// ============================================================================
// TIMESTAMPS
// ============================================================================

/// Canonical storage format. Fixed width so TEXT comparison orders by time.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse RFC3339, `YYYY-MM-DD HH:MM:SS[.f]`, `YYYY-MM-DDTHH:MM:SS[.f]` or a
/// bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    bail!("Unable to parse datetime string: {}", raw)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

fn uuid_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Users Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            account_no TEXT NOT NULL,
            bank_code TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (account_no, bank_code)
        )",
        [],
    )?;

    // ==========================================================================
    // Transactions Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id TEXT PRIMARY KEY,
            idempotency_hash TEXT UNIQUE NOT NULL,
            user_id TEXT NOT NULL REFERENCES users(id),
            date TEXT NOT NULL,
            description TEXT NOT NULL,
            amount REAL NOT NULL,
            transaction_type TEXT NOT NULL,
            category TEXT NOT NULL,
            payment_channel TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Analysis Results Table (append-only, latest = max created_at)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS analysis_results (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            risk_score REAL NOT NULL,
            risk_category TEXT NOT NULL,
            eligible INTEGER NOT NULL,
            eligibility_reason TEXT NOT NULL,
            metrics TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_results_user_created ON analysis_results(user_id, created_at)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// USERS
// ============================================================================

pub fn insert_user(conn: &Connection, user: &User) -> Result<bool> {
    let result = conn.execute(
        "INSERT INTO users (id, name, account_no, bank_code) VALUES (?1, ?2, ?3, ?4)",
        params![user.id.to_string(), user.name, user.account_no, user.bank_code],
    );

    match result {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            debug!(account_no = %user.account_no, "user already exists, skipping");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_user_by_account(
    conn: &Connection,
    account_no: &str,
    bank_code: &str,
) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT id, name, account_no, bank_code
             FROM users
             WHERE account_no = ?1 AND bank_code = ?2",
            params![account_no.trim(), bank_code.trim().to_uppercase()],
            |row| {
                Ok(User {
                    id: uuid_column(row, 0)?,
                    name: row.get(1)?,
                    account_no: row.get(2)?,
                    bank_code: row.get(3)?,
                })
            },
        )
        .optional()?;

    Ok(user)
}

pub fn load_users_csv(csv_path: &Path) -> Result<Vec<User>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open users CSV file")?;

    let mut users = Vec::new();
    for result in rdr.deserialize() {
        let record: UserRecord = result.context("Failed to deserialize user")?;
        users.push(User::new(&record.name, &record.account_no, &record.bank_code));
    }

    Ok(users)
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// Read transaction rows and attach them to already imported users.
/// Rows for unknown accounts are skipped with a warning.
pub fn load_transactions_csv(conn: &Connection, csv_path: &Path) -> Result<Vec<Transaction>> {
    let mut rdr =
        csv::Reader::from_path(csv_path).context("Failed to open transactions CSV file")?;

    let mut transactions = Vec::new();
    let mut unknown_accounts = 0;

    for (line, result) in rdr.deserialize().enumerate() {
        let record: TransactionRecord = result.context("Failed to deserialize transaction")?;

        let Some(user) = get_user_by_account(conn, &record.account_no, &record.bank_code)? else {
            unknown_accounts += 1;
            continue;
        };

        let date = parse_timestamp(&record.date)
            .with_context(|| format!("Invalid date on data row {}", line + 1))?;
        let transaction_type: TransactionType = record
            .transaction_type
            .parse()
            .with_context(|| format!("Invalid type on data row {}", line + 1))?;

        let mut tx = Transaction::new(
            user.id,
            date,
            &record.description,
            record.amount,
            transaction_type,
            &record.category,
        );
        tx.payment_channel = record.payment_channel.filter(|c| !c.trim().is_empty());
        transactions.push(tx);
    }

    if unknown_accounts > 0 {
        warn!(unknown_accounts, "skipped rows for accounts that are not imported");
    }

    Ok(transactions)
}

/// Insert transactions, skipping any whose idempotency hash already exists.
///
/// Re-importing the same file inserts nothing. Rows that agree on every
/// hashed field are treated as one transaction: two equal purchases on a
/// date-only row (same day, amount, category and description) keep only the
/// first. Source files that can contain such rows need a time of day or a
/// distinguishing description.
pub fn insert_transactions(conn: &Connection, transactions: &[Transaction]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for tx in transactions {
        let hash = tx.compute_idempotency_hash();

        let result = conn.execute(
            "INSERT INTO transactions (
                id, idempotency_hash, user_id, date, description, amount,
                transaction_type, category, payment_channel
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                tx.id.to_string(),
                hash,
                tx.user_id.to_string(),
                format_timestamp(&tx.date),
                tx.description,
                tx.amount,
                tx.transaction_type.as_str(),
                tx.category,
                tx.payment_channel,
            ],
        );

        match result {
            Ok(_) => inserted += 1,
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                duplicates += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    info!(inserted, duplicates, "transactions imported");

    Ok(inserted)
}

/// Transactions of one user dated in `[since, until]`, oldest first
pub fn get_user_transactions(
    conn: &Connection,
    user_id: Uuid,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, date, description, amount,
                transaction_type, category, payment_channel
         FROM transactions
         WHERE user_id = ?1 AND date >= ?2 AND date <= ?3
         ORDER BY date",
    )?;

    let transactions = stmt
        .query_map(
            params![
                user_id.to_string(),
                format_timestamp(&since),
                format_timestamp(&until)
            ],
            |row| {
                let type_str: String = row.get(5)?;
                let transaction_type = type_str.parse::<TransactionType>().map_err(|e| {
                    conversion_error(5, std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
                })?;

                Ok(Transaction {
                    id: uuid_column(row, 0)?,
                    user_id: uuid_column(row, 1)?,
                    date: timestamp_column(row, 2)?,
                    description: row.get(3)?,
                    amount: row.get(4)?,
                    transaction_type,
                    category: row.get(6)?,
                    payment_channel: row.get(7)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(transactions)
}

pub fn verify_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// ANALYSIS RESULTS
// ============================================================================

pub fn insert_analysis_result(conn: &Connection, result: &AnalysisResult) -> Result<()> {
    let metrics_json = serde_json::to_string(&result.metrics)?;

    conn.execute(
        "INSERT INTO analysis_results (
            id, user_id, risk_score, risk_category, eligible,
            eligibility_reason, metrics, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            result.id.to_string(),
            result.user_id.to_string(),
            result.risk_score,
            result.risk_category.as_str(),
            result.eligible,
            result.eligibility_reason,
            metrics_json,
            format_timestamp(&result.created_at),
        ],
    )?;

    Ok(())
}

pub fn get_latest_analysis_result(
    conn: &Connection,
    user_id: Uuid,
) -> Result<Option<AnalysisResult>> {
    let row = conn
        .query_row(
            "SELECT id, user_id, risk_score, risk_category, eligible,
                    eligibility_reason, metrics, created_at
             FROM analysis_results
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
            params![user_id.to_string()],
            |row| {
                Ok((
                    uuid_column(row, 0)?,
                    uuid_column(row, 1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, bool>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    timestamp_column(row, 7)?,
                ))
            },
        )
        .optional()?;

    let Some((id, user_id, risk_score, category, eligible, reason, metrics_json, created_at)) = row
    else {
        return Ok(None);
    };

    let risk_category: RiskCategory = category.parse()?;
    let metrics: AnalysisMetrics =
        serde_json::from_str(&metrics_json).context("Failed to decode stored metrics")?;

    Ok(Some(AnalysisResult {
        id,
        user_id,
        risk_score,
        risk_category,
        eligible,
        eligibility_reason: reason,
        metrics,
        created_at,
    }))
}

pub fn count_analysis_results(conn: &Connection) -> Result<i64> {
    let count: i64 =
        conn.query_row("SELECT COUNT(*) FROM analysis_results", [], |row| row.get(0))?;
    Ok(count)
}
