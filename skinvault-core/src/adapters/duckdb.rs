//! DuckDB ledger implementation

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::adapters::row_lock::{RowGuard, RowLocks};
use crate::domain::result::{Error, Result};
use crate::domain::{NewTransaction, Transaction, User};
use crate::migrations::MIGRATIONS;
use crate::ports::{LedgerRepository, LedgerTx};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const TRANSACTION_COLUMNS: &str = "id, idempotency_key::VARCHAR, user_id, balance_before::VARCHAR, \
     balance_after::VARCHAR, amount::VARCHAR, created_at";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("could not set lock on file")
}

fn is_unique_violation(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("duplicate key") || lower.contains("unique constraint")
}

/// Ledger stored in a DuckDB database file
///
/// Reads go through one shared connection. Every [`LedgerTx`] gets its own
/// cloned connection so that its writes stay invisible until commit.
pub struct DuckDbLedger {
    conn: Mutex<Connection>,
    row_locks: Arc<RowLocks>,
    db_path: Option<PathBuf>,
}

impl DuckDbLedger {
    /// Open (or create) the ledger database and apply pending migrations
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock.
    pub fn open(db_path: &Path) -> Result<Self> {
        let mut attempt = 0;
        let conn = loop {
            match Self::try_open_connection(Some(db_path)) {
                Ok(conn) => break conn,
                Err(e) if is_retryable_error(&e.to_string()) && attempt < MAX_RETRIES - 1 => {
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                    log::warn!(
                        "Database busy, retrying in {}ms (attempt {}/{}): {}",
                        delay.as_millis(),
                        attempt + 1,
                        MAX_RETRIES,
                        e
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        Self::with_connection(conn, Some(db_path.to_path_buf()))
    }

    /// Ledger in a private in-memory database, gone when dropped
    pub fn open_in_memory() -> Result<Self> {
        let conn = Self::try_open_connection(None)?;
        Self::with_connection(conn, None)
    }

    fn with_connection(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        let ledger = Self {
            conn: Mutex::new(conn),
            row_locks: Arc::new(RowLocks::new()),
            db_path,
        };
        let result = ledger.run_migrations()?;
        if !result.applied.is_empty() {
            log::info!("Applied ledger migrations: {}", result.applied.join(", "));
        }
        Ok(ledger)
    }

    fn try_open_connection(db_path: Option<&Path>) -> Result<Connection> {
        // Extension autoloading stays off, nothing here needs an extension
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = match db_path {
            Some(path) => Connection::open_with_flags(path, config)?,
            None => Connection::open_in_memory_with_flags(config)?,
        };
        Ok(conn)
    }

    /// Run database migrations using the MigrationService
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock_conn()?;
        MigrationService::new(&conn, MIGRATIONS)
            .run_pending()
            .map_err(|e| Error::database(format!("Migration failed: {}", e)))
    }

    /// Path of the database file, `None` for in-memory ledgers
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }
}

#[async_trait]
impl LedgerRepository for DuckDbLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        let conn = self.lock_conn()?.try_clone()?;
        Ok(Box::new(DuckDbTx {
            conn,
            row_locks: Arc::clone(&self.row_locks),
            guards: HashMap::new(),
            keys: Vec::new(),
            open: false,
        }))
    }

    async fn find_transaction_by_idempotency_key(&self, key: Uuid) -> Result<Option<Transaction>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {} FROM transactions WHERE idempotency_key = CAST(? AS UUID)",
            TRANSACTION_COLUMNS
        );
        match conn.query_row(&sql, [key.to_string()], read_transaction_row) {
            Ok(row) => Ok(Some(row.into_transaction()?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user_balance(&self, user_id: i64) -> Result<Option<Decimal>> {
        let conn = self.lock_conn()?;
        select_balance(&conn, user_id)
    }

    async fn list_transactions_by_user(&self, user_id: i64) -> Result<Vec<Transaction>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {} FROM transactions WHERE user_id = ? ORDER BY id",
            TRANSACTION_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([user_id], read_transaction_row)?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row?.into_transaction()?);
        }
        Ok(transactions)
    }

    async fn create_user(&self, balance: Decimal) -> Result<User> {
        User::validate_balance(balance)?;
        let conn = self.lock_conn()?;
        let (id, stored): (i64, String) = conn.query_row(
            "INSERT INTO users (balance) VALUES (CAST(? AS DECIMAL(38, 10)))
             RETURNING id, balance::VARCHAR",
            [balance.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(User::new(id, parse_decimal(&stored)?))
    }
}

/// One read-modify-write transaction on its own connection
///
/// `BEGIN` is issued only once the first row lock is held, so the snapshot
/// always includes whatever the previous lock holder committed.
struct DuckDbTx {
    conn: Connection,
    row_locks: Arc<RowLocks>,
    guards: HashMap<i64, RowGuard>,
    /// Idempotency keys inserted so far, for reporting commit-time conflicts
    keys: Vec<Uuid>,
    open: bool,
}

impl DuckDbTx {
    fn ensure_open(&mut self) -> Result<()> {
        if !self.open {
            self.conn.execute_batch("BEGIN TRANSACTION")?;
            self.open = true;
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerTx for DuckDbTx {
    async fn lock_user_balance(&mut self, user_id: i64) -> Result<Option<Decimal>> {
        if !self.guards.contains_key(&user_id) {
            let guard = self.row_locks.lock(user_id).await;
            self.guards.insert(user_id, guard);
        }
        self.ensure_open()?;
        select_balance(&self.conn, user_id)
    }

    async fn set_user_balance(&mut self, user_id: i64, balance: Decimal) -> Result<()> {
        if !self.guards.contains_key(&user_id) {
            return Err(Error::database(format!(
                "balance of user {} updated without holding its row lock",
                user_id
            )));
        }
        self.ensure_open()?;
        let updated = self.conn.execute(
            "UPDATE users SET balance = CAST(? AS DECIMAL(38, 10)) WHERE id = ?",
            params![balance.to_string(), user_id],
        )?;
        if updated == 0 {
            return Err(Error::UserNotFound(user_id));
        }
        Ok(())
    }

    async fn insert_transaction(&mut self, tx: &NewTransaction) -> Result<Transaction> {
        self.ensure_open()?;
        let sql = format!(
            "INSERT INTO transactions
                 (idempotency_key, user_id, balance_before, balance_after, amount, created_at)
             VALUES (CAST(? AS UUID), ?, CAST(? AS DECIMAL(38, 10)), CAST(? AS DECIMAL(38, 10)),
                     CAST(? AS DECIMAL(38, 10)), ?)
             RETURNING {}",
            TRANSACTION_COLUMNS
        );
        let row = self
            .conn
            .query_row(
                &sql,
                params![
                    tx.idempotency_key.to_string(),
                    tx.user_id,
                    tx.balance_before.to_string(),
                    tx.balance_after.to_string(),
                    tx.amount.to_string(),
                    tx.created_at.to_rfc3339_opts(SecondsFormat::Micros, true),
                ],
                read_transaction_row,
            )
            .map_err(|e| map_write_error(e, tx.idempotency_key))?;
        self.keys.push(tx.idempotency_key);
        row.into_transaction()
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        let result = self.conn.execute_batch("COMMIT");
        // DuckDB aborts the transaction itself when COMMIT fails
        self.open = false;

        result.map_err(|e| match self.keys.first() {
            // A unique conflict with a concurrent transaction may only show up here
            Some(key) if is_unique_violation(&e.to_string()) => {
                Error::DuplicateIdempotencyKey(key.to_string())
            }
            _ => e.into(),
        })
    }
}

impl Drop for DuckDbTx {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                log::warn!("Rollback failed: {}", e);
            }
        }
        // Row locks are released after the rollback, when `guards` drops
    }
}

fn map_write_error(e: duckdb::Error, key: Uuid) -> Error {
    if is_unique_violation(&e.to_string()) {
        Error::DuplicateIdempotencyKey(key.to_string())
    } else {
        e.into()
    }
}

fn select_balance(conn: &Connection, user_id: i64) -> Result<Option<Decimal>> {
    match conn.query_row(
        "SELECT balance::VARCHAR FROM users WHERE id = ?",
        [user_id],
        |row| row.get::<_, String>(0),
    ) {
        Ok(balance) => Ok(Some(parse_decimal(&balance)?)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Raw transaction row, converted outside the row callback so parse
/// failures surface as `Error::Database` instead of a driver error
struct TransactionRow {
    id: i64,
    idempotency_key: String,
    user_id: i64,
    balance_before: String,
    balance_after: String,
    amount: String,
    created_at: String,
}

fn read_transaction_row(row: &duckdb::Row) -> duckdb::Result<TransactionRow> {
    Ok(TransactionRow {
        id: row.get(0)?,
        idempotency_key: row.get(1)?,
        user_id: row.get(2)?,
        balance_before: row.get(3)?,
        balance_after: row.get(4)?,
        amount: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl TransactionRow {
    fn into_transaction(self) -> Result<Transaction> {
        Ok(Transaction {
            id: self.id,
            idempotency_key: Uuid::parse_str(&self.idempotency_key)
                .map_err(|e| Error::database(format!("invalid idempotency key in store: {}", e)))?,
            user_id: self.user_id,
            balance_before: parse_decimal(&self.balance_before)?,
            balance_after: parse_decimal(&self.balance_after)?,
            amount: parse_decimal(&self.amount)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s)
        .map(|d| d.normalize())
        .map_err(|e| Error::database(format!("invalid decimal '{}' in store: {}", s, e)))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("invalid timestamp '{}' in store: {}", s, e)))
}
