// 🧮 risk-analytics CLI - import data and run analyses against the local store

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use risk_analytics::{
    db, insert_transactions, insert_user, load_transactions_csv, load_users_csv, verify_count,
    AppConfig, RiskAnalyzer, SqliteStore,
};

#[derive(Parser)]
#[command(name = "risk-analytics", version, about = "Transaction risk analytics")]
struct Cli {
    /// TOML config file (falls back to RISK_ANALYTICS_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the database path from config
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the schema (idempotent)
    Init,
    /// Import users from CSV (name, account_no, bank_code)
    ImportUsers { csv: PathBuf },
    /// Import transactions from CSV; rows for unknown accounts are skipped
    ImportTransactions { csv: PathBuf },
    /// Run the full analysis for one account
    Analyze {
        account_no: String,
        bank_code: String,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the latest stored result for a user id
    Latest { user_id: uuid::Uuid },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("risk_analytics=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }

    let store = SqliteStore::open(&config.database.path)
        .with_context(|| format!("Failed to open database {:?}", config.database.path))?;

    match cli.command {
        Command::Init => {
            println!("🔧 Database ready at {}", config.database.path.display());
        }
        Command::ImportUsers { csv } => run_import_users(&store, &csv)?,
        Command::ImportTransactions { csv } => run_import_transactions(&store, &csv)?,
        Command::Analyze {
            account_no,
            bank_code,
            json,
        } => run_analyze(store, &config, &account_no, &bank_code, json)?,
        Command::Latest { user_id } => {
            let analyzer = RiskAnalyzer::from_config(Arc::new(store), &config)?;
            let result = analyzer.latest_result(user_id)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

fn run_import_users(store: &SqliteStore, csv: &Path) -> Result<()> {
    println!("📂 Loading users from {}...", csv.display());
    let users = load_users_csv(csv)?;

    let conn = store.connection()?;
    let mut inserted = 0;
    for user in &users {
        if insert_user(&conn, user)? {
            inserted += 1;
        }
    }

    println!("✓ Imported {} users ({} already present)", inserted, users.len() - inserted);
    Ok(())
}

fn run_import_transactions(store: &SqliteStore, csv: &Path) -> Result<()> {
    println!("📂 Loading transactions from {}...", csv.display());
    let conn = store.connection()?;

    let transactions = load_transactions_csv(&conn, csv)?;
    println!("✓ Parsed {} transactions for known accounts", transactions.len());

    let inserted = insert_transactions(&conn, &transactions)?;
    let total = verify_count(&conn)?;
    println!("💾 Inserted {} new transactions", inserted);
    println!("🔍 Database now holds {} transactions", total);
    Ok(())
}

fn run_analyze(
    store: SqliteStore,
    config: &AppConfig,
    account_no: &str,
    bank_code: &str,
    json: bool,
) -> Result<()> {
    let analyzer = RiskAnalyzer::from_config(Arc::new(store.clone()), config)?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(analyzer.analyze(account_no, bank_code))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let fs = &result.metrics.financial_summary;
    let stored = db::count_analysis_results(&*store.connection()?)?;

    println!("🔬 Analysis for {} / {}", account_no, bank_code);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Transactions:  {}", fs.transaction_count);
    println!("  Credits:       {:.2}", fs.total_credits);
    println!("  Debits:        {:.2}", fs.total_debits);
    println!("  Savings rate:  {:.1}%", fs.savings_rate * 100.0);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{} {}", if result.eligible { "✅" } else { "❌" }, result.summary());
    println!("  Result id: {} ({} stored results)", result.id, stored);
    Ok(())
}
