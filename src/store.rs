// 🗄️ Store - The backing-store seam of the analyzer
//
// The analyzer only sees `RiskStore`. `SqliteStore` serializes access to one
// rusqlite connection; anything that goes wrong underneath surfaces as
// `UpstreamUnavailable`.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::analysis::AnalysisResult;
use crate::db::{self, Transaction, User};
use crate::error::{AnalysisError, RiskResult};

pub trait RiskStore: Send + Sync {
    fn find_user_by_account(&self, account_no: &str, bank_code: &str) -> RiskResult<Option<User>>;

    /// Transactions dated in `[since, until]`; empty when there are none
    fn fetch_transactions(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> RiskResult<Vec<Transaction>>;

    fn save_result(&self, result: &AnalysisResult) -> RiskResult<()>;

    /// Most recently created result for the user
    fn latest_result(&self, user_id: Uuid) -> RiskResult<Option<AnalysisResult>>;

    fn health_check(&self) -> RiskResult<()>;
}

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> RiskResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> RiskResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> RiskResult<Self> {
        db::setup_database(&conn).map_err(AnalysisError::upstream)?;
        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Direct access for import paths and tests
    pub fn connection(&self) -> RiskResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AnalysisError::upstream("database connection lock poisoned"))
    }
}

impl RiskStore for SqliteStore {
    fn find_user_by_account(&self, account_no: &str, bank_code: &str) -> RiskResult<Option<User>> {
        let conn = self.connection()?;
        db::get_user_by_account(&conn, account_no, bank_code).map_err(AnalysisError::upstream)
    }

    fn fetch_transactions(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> RiskResult<Vec<Transaction>> {
        let conn = self.connection()?;
        db::get_user_transactions(&conn, user_id, since, until).map_err(AnalysisError::upstream)
    }

    fn save_result(&self, result: &AnalysisResult) -> RiskResult<()> {
        let conn = self.connection()?;
        db::insert_analysis_result(&conn, result).map_err(AnalysisError::upstream)
    }

    fn latest_result(&self, user_id: Uuid) -> RiskResult<Option<AnalysisResult>> {
        let conn = self.connection()?;
        db::get_latest_analysis_result(&conn, user_id).map_err(AnalysisError::upstream)
    }

    fn health_check(&self) -> RiskResult<()> {
        let conn = self.connection()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}
