//! `SQLite`-backed ledger journal.
//!
//! Every committed transaction, refused debit and cap change is written
//! here so [`CreditLedger::restore`](crate::core::ledger::CreditLedger::restore)
//! can rebuild balances after a restart. Amounts are stored as decimal text.

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;

use crate::core::ledger::{
    JournalContents, RejectedDebit, RejectionReason, Transaction, TransactionJournal,
    TransactionKind, TransactionMeta,
};
use crate::core::locks;
use crate::error::{Result, RouterError};

const LEDGER_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("../../migrations/001_ledger.sql"),
}];

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: i32,
    sql: &'static str,
}

/// Run schema migrations for the ledger database.
///
/// Returns the latest schema version applied.
///
/// # Errors
/// Returns an error if creating the migrations table, reading the schema version,
/// or applying any migration fails.
pub fn run_migrations(conn: &mut Connection) -> Result<i32> {
    ensure_schema_migrations_table(conn)?;

    let mut current_version = get_schema_version(conn)?;

    for migration in LEDGER_MIGRATIONS {
        if migration.version > current_version {
            apply_migration(conn, migration)?;
            current_version = migration.version;
        }
    }

    Ok(current_version)
}

fn ensure_schema_migrations_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (\
            version INTEGER PRIMARY KEY,\
            applied_at TEXT DEFAULT (datetime('now'))\
        );",
    )
    .map_err(|e| storage("create schema_migrations", &e))
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .map_err(|e| storage("read schema version", &e))?;

    Ok(version.unwrap_or(0))
}

fn apply_migration(conn: &mut Connection, migration: &Migration) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(|e| storage("begin migration", &e))?;

    tx.execute_batch(migration.sql)
        .map_err(|e| storage(&format!("apply migration {}", migration.version), &e))?;

    tx.execute(
        "INSERT INTO schema_migrations (version) VALUES (?1)",
        [migration.version],
    )
    .map_err(|e| storage(&format!("record migration {}", migration.version), &e))?;

    tx.commit()
        .map_err(|e| storage(&format!("commit migration {}", migration.version), &e))
}

fn storage(context: &str, err: &dyn std::fmt::Display) -> RouterError {
    RouterError::Storage(format!("{context}: {err}"))
}

/// Ledger journal in a single `SQLite` file.
///
/// The connection mutex only serializes I/O; ordering between accounts is
/// decided by the ledger before it calls in.
pub struct SqliteJournal {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteJournal").finish_non_exhaustive()
    }
}

impl SqliteJournal {
    /// Open (or create) the journal at `path` and apply migrations.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created, the database
    /// cannot be opened, or a migration fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path).map_err(|e| storage("open ledger db", &e))?;
        run_migrations(&mut conn)?;
        tracing::debug!(?path, "Ledger journal opened");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory journal (for testing).
    ///
    /// # Errors
    /// Returns an error if migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn =
            Connection::open_in_memory().map_err(|e| storage("open in-memory db", &e))?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of committed transactions on disk.
    ///
    /// # Errors
    /// Returns an error if the count query fails.
    pub fn transaction_count(&self) -> Result<u64> {
        let conn = locks::lock(&self.conn);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM ledger_transactions", [], |row| {
                row.get(0)
            })
            .map_err(|e| storage("count transactions", &e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Monthly cap stored for `account_id`, if any row exists.
    ///
    /// # Errors
    /// Returns an error if the query fails or the stored value is corrupt.
    pub fn cap_for(&self, account_id: &str) -> Result<Option<Decimal>> {
        let conn = locks::lock(&self.conn);
        let raw: Option<Option<String>> = conn
            .query_row(
                "SELECT monthly_cap FROM account_caps WHERE account_id = ?1",
                [account_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| storage("read cap", &e))?;
        raw.flatten().map(|s| parse_decimal(&s)).transpose()
    }
}

impl TransactionJournal for SqliteJournal {
    fn append(&self, tx: &Transaction) -> Result<()> {
        let id = i64::try_from(tx.id)
            .map_err(|_| RouterError::Storage(format!("transaction id {} out of range", tx.id)))?;
        let meta = serde_json::to_string(&tx.meta)?;
        let conn = locks::lock(&self.conn);
        conn.execute(
            "INSERT INTO ledger_transactions \
                (id, account_id, amount, balance_after, kind, meta_json, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                tx.account_id,
                tx.amount.to_string(),
                tx.balance_after.to_string(),
                tx.kind.as_str(),
                meta,
                tx.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| storage("append transaction", &e))?;
        Ok(())
    }

    fn append_rejection(&self, rejection: &RejectedDebit) -> Result<()> {
        let meta = serde_json::to_string(&rejection.meta)?;
        let conn = locks::lock(&self.conn);
        conn.execute(
            "INSERT INTO rejected_debits \
                (account_id, amount, balance, reason, meta_json, attempted_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                rejection.account_id,
                rejection.amount.to_string(),
                rejection.balance.to_string(),
                rejection.reason.as_str(),
                meta,
                rejection.attempted_at.to_rfc3339(),
            ],
        )
        .map_err(|e| storage("append rejection", &e))?;
        Ok(())
    }

    fn set_cap(&self, account_id: &str, cap: Option<Decimal>) -> Result<()> {
        let conn = locks::lock(&self.conn);
        conn.execute(
            "INSERT INTO account_caps (account_id, monthly_cap, updated_at) \
             VALUES (?1, ?2, ?3) \
             ON CONFLICT(account_id) DO UPDATE SET \
                monthly_cap = excluded.monthly_cap, updated_at = excluded.updated_at",
            params![
                account_id,
                cap.map(|c| c.to_string()),
                Utc::now().to_rfc3339()
            ],
        )
        .map_err(|e| storage("set cap", &e))?;
        Ok(())
    }

    fn load(&self) -> Result<JournalContents> {
        let conn = locks::lock(&self.conn);
        Ok(JournalContents {
            transactions: load_transactions(&conn)?,
            rejections: load_rejections(&conn)?,
            caps: load_caps(&conn)?,
        })
    }
}

type TransactionRow = (i64, String, String, String, String, Option<String>, String);

fn load_transactions(conn: &Connection) -> Result<Vec<Transaction>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, account_id, amount, balance_after, kind, meta_json, created_at \
             FROM ledger_transactions ORDER BY id ASC",
        )
        .map_err(|e| storage("prepare transactions", &e))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
            ))
        })
        .map_err(|e| storage("query transactions", &e))?;

    let mut out = Vec::new();
    for row in rows {
        let (id, account_id, amount, balance_after, kind, meta, created_at): TransactionRow =
            row.map_err(|e| storage("read transaction row", &e))?;
        out.push(Transaction {
            id: u64::try_from(id)
                .map_err(|_| RouterError::Storage(format!("negative transaction id {id}")))?,
            account_id,
            amount: parse_decimal(&amount)?,
            balance_after: parse_decimal(&balance_after)?,
            kind: TransactionKind::from_name(&kind).ok_or_else(|| {
                RouterError::Storage(format!("unknown transaction kind '{kind}'"))
            })?,
            meta: parse_meta(meta.as_deref())?,
            created_at: parse_timestamp(&created_at)?,
        });
    }
    Ok(out)
}

type RejectionRow = (String, String, String, String, Option<String>, String);

fn load_rejections(conn: &Connection) -> Result<Vec<RejectedDebit>> {
    let mut stmt = conn
        .prepare(
            "SELECT account_id, amount, balance, reason, meta_json, attempted_at \
             FROM rejected_debits ORDER BY id ASC",
        )
        .map_err(|e| storage("prepare rejections", &e))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })
        .map_err(|e| storage("query rejections", &e))?;

    let mut out = Vec::new();
    for row in rows {
        let (account_id, amount, balance, reason, meta, attempted_at): RejectionRow =
            row.map_err(|e| storage("read rejection row", &e))?;
        out.push(RejectedDebit {
            account_id,
            amount: parse_decimal(&amount)?,
            balance: parse_decimal(&balance)?,
            reason: RejectionReason::from_name(&reason).ok_or_else(|| {
                RouterError::Storage(format!("unknown rejection reason '{reason}'"))
            })?,
            meta: parse_meta(meta.as_deref())?,
            attempted_at: parse_timestamp(&attempted_at)?,
        });
    }
    Ok(out)
}

fn load_caps(conn: &Connection) -> Result<Vec<(String, Option<Decimal>)>> {
    let mut stmt = conn
        .prepare("SELECT account_id, monthly_cap FROM account_caps ORDER BY account_id")
        .map_err(|e| storage("prepare caps", &e))?;

    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
        })
        .map_err(|e| storage("query caps", &e))?;

    let mut out = Vec::new();
    for row in rows {
        let (account_id, cap) = row.map_err(|e| storage("read cap row", &e))?;
        out.push((account_id, cap.as_deref().map(parse_decimal).transpose()?));
    }
    Ok(out)
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| RouterError::Storage(format!("corrupt amount '{raw}': {e}")))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RouterError::Storage(format!("corrupt timestamp '{raw}': {e}")))
}

fn parse_meta(raw: Option<&str>) -> Result<TransactionMeta> {
    match raw {
        Some(json) if !json.is_empty() => Ok(serde_json::from_str(json)?),
        _ => Ok(TransactionMeta::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ledger::{CreditKind, CreditLedger};
    use crate::error::RouterError;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[test]
    fn migrations_create_schema_and_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&mut conn).unwrap(), 1);
        assert_eq!(run_migrations(&mut conn).unwrap(), 1);

        let tables: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' \
                 AND name IN ('ledger_transactions', 'rejected_debits', 'account_caps')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);

        let applied: i32 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 1);
    }

    #[test]
    fn ledger_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.sqlite");

        {
            let journal = Arc::new(SqliteJournal::open(&path).unwrap());
            let ledger = CreditLedger::with_journal(journal);
            ledger
                .credit("acct", dec!(5), CreditKind::Purchase, TransactionMeta::note("top-up"))
                .unwrap();
            ledger
                .debit(
                    "acct",
                    dec!(1.25),
                    TransactionMeta::usage("openai", "gpt-4o", 100, 50),
                )
                .unwrap();
            ledger.set_monthly_cap("acct", Some(dec!(3))).unwrap();
            assert!(ledger.debit("acct", dec!(2), TransactionMeta::default()).is_err());
        }

        let journal = Arc::new(SqliteJournal::open(&path).unwrap());
        assert_eq!(journal.transaction_count().unwrap(), 2);
        assert_eq!(journal.cap_for("acct").unwrap(), Some(dec!(3)));

        let ledger = CreditLedger::restore(journal).unwrap();
        assert_eq!(ledger.balance("acct"), dec!(3.75));
        let history = ledger.transactions("acct");
        assert_eq!(history[1].meta.provider_id.as_deref(), Some("openai"));
        assert_eq!(history[0].meta.note.as_deref(), Some("top-up"));
        assert_eq!(ledger.rejections("acct").len(), 1);
        assert_eq!(
            ledger.rejections("acct")[0].reason,
            RejectionReason::SpendingCap
        );

        let receipt = ledger
            .credit("acct", dec!(1), CreditKind::Bonus, TransactionMeta::default())
            .unwrap();
        assert_eq!(receipt.tx_id, 3);
    }

    #[test]
    fn clearing_a_cap_stores_null() {
        let journal = SqliteJournal::open_in_memory().unwrap();
        journal.set_cap("acct", Some(dec!(10))).unwrap();
        journal.set_cap("acct", None).unwrap();
        assert_eq!(journal.cap_for("acct").unwrap(), None);
        assert_eq!(journal.load().unwrap().caps, vec![("acct".to_string(), None)]);
    }

    #[test]
    fn corrupt_amount_is_a_storage_error() {
        let journal = SqliteJournal::open_in_memory().unwrap();
        {
            let conn = locks::lock(&journal.conn);
            conn.execute(
                "INSERT INTO ledger_transactions \
                    (id, account_id, amount, balance_after, kind, meta_json, created_at) \
                 VALUES (1, 'acct', 'lots', '1', 'purchase', NULL, ?1)",
                [Utc::now().to_rfc3339()],
            )
            .unwrap();
        }
        assert!(matches!(journal.load(), Err(RouterError::Storage(_))));
    }

    #[test]
    fn duplicate_transaction_id_is_rejected() {
        let journal = SqliteJournal::open_in_memory().unwrap();
        let tx = Transaction {
            id: 7,
            account_id: "acct".to_string(),
            amount: dec!(1),
            balance_after: dec!(1),
            kind: TransactionKind::Purchase,
            meta: TransactionMeta::default(),
            created_at: Utc::now(),
        };
        journal.append(&tx).unwrap();
        assert!(journal.append(&tx).is_err());
    }
}
