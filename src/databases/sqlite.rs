//! SQLite target (via rusqlite).
//!
//! A single connection guarded by a mutex, so workers serialize on it. That
//! matches SQLite's one-writer model; the lock wait is part of the measured
//! latency.

use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, warn};

use crate::bencher::{Bencher, Execute};
use crate::databases::generic_workload;
use crate::descriptor::BenchmarkDescriptor;
use crate::error::{BenchError, Result};

pub const MEMORY: &str = ":memory:";

pub struct Sqlite {
    conn: Mutex<Option<Connection>>,
}

impl Sqlite {
    /// Opens `path`, or a private in-memory database for `:memory:`.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == MEMORY {
            Connection::open_in_memory()?
        } else {
            let conn = Connection::open(path)?;
            // journal_mode answers with a row
            conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn
        };
        conn.busy_timeout(Duration::from_secs(5))?;

        debug!(path, "opened sqlite database");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.conn.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| BenchError::Database("connection is closed".to_string()))?;
        f(conn)
    }
}

/// Runs one statement and drains any rows it returns.
fn run_statement(conn: &Connection, sql: &str) -> Result<()> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| BenchError::Database(format!("{sql}: {e}")))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| BenchError::Database(format!("{sql}: {e}")))?;
    while rows
        .next()
        .map_err(|e| BenchError::Database(format!("{sql}: {e}")))?
        .is_some()
    {}
    Ok(())
}

/// Matches `BEGIN [DEFERRED|IMMEDIATE|EXCLUSIVE] [TRANSACTION]`.
fn parse_begin(part: &str) -> Option<TransactionBehavior> {
    let mut words = part.split_whitespace().map(str::to_ascii_uppercase);
    if words.next()? != "BEGIN" {
        return None;
    }
    let mut behavior = TransactionBehavior::Deferred;
    let mut next = words.next();
    match next.as_deref() {
        Some("DEFERRED") => next = words.next(),
        Some("IMMEDIATE") => {
            behavior = TransactionBehavior::Immediate;
            next = words.next();
        }
        Some("EXCLUSIVE") => {
            behavior = TransactionBehavior::Exclusive;
            next = words.next();
        }
        _ => {}
    }
    if next.as_deref() == Some("TRANSACTION") {
        next = words.next();
    }
    next.is_none().then_some(behavior)
}

/// Matches `COMMIT [TRANSACTION]` and `END [TRANSACTION]`.
fn is_commit(part: &str) -> bool {
    let mut words = part.split_whitespace().map(str::to_ascii_uppercase);
    matches!(words.next().as_deref(), Some("COMMIT" | "END"))
        && matches!(words.next().as_deref(), None | Some("TRANSACTION"))
        && words.next().is_none()
}

fn run_transaction(
    conn: &mut Connection,
    behavior: TransactionBehavior,
    statements: &[&str],
) -> Result<()> {
    let tx: Transaction<'_> = conn.transaction_with_behavior(behavior)?;
    for sql in statements {
        run_statement(&tx, sql)?;
    }
    tx.commit()?;
    Ok(())
}

impl Execute for Sqlite {
    /// Splits the statement on `;`. Statements between `BEGIN` and `COMMIT`
    /// run in one transaction, all others run individually. Execution
    /// continues past failures; the first failure is returned.
    ///
    /// A `COMMIT` without an open batch is passed to SQLite unchanged, so a
    /// transaction never stays open on the shared connection.
    fn exec(&self, statement: &str) -> Result<()> {
        self.with_conn(|conn| {
            let mut first_error = None;
            let mut batch: Option<(TransactionBehavior, Vec<&str>)> = None;

            for part in statement.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                if let Some(behavior) = parse_begin(part) {
                    if let Some((open, statements)) = batch.take() {
                        warn!("nested BEGIN, committing {} statement(s)", statements.len());
                        if let Err(e) = run_transaction(conn, open, &statements) {
                            first_error.get_or_insert(e);
                        }
                    }
                    batch = Some((behavior, Vec::new()));
                    continue;
                }
                if is_commit(part) {
                    if let Some((behavior, statements)) = batch.take() {
                        if let Err(e) = run_transaction(conn, behavior, &statements) {
                            first_error.get_or_insert(e);
                        }
                        continue;
                    }
                }

                match batch.as_mut() {
                    Some((_, statements)) => statements.push(part),
                    None => {
                        if let Err(e) = run_statement(conn, part) {
                            first_error.get_or_insert(e);
                        }
                    }
                }
            }

            if let Some((behavior, statements)) = batch {
                warn!("BEGIN without COMMIT, committing {} statement(s)", statements.len());
                if let Err(e) = run_transaction(conn, behavior, &statements) {
                    first_error.get_or_insert(e);
                }
            }

            first_error.map_or(Ok(()), Err)
        })
    }
}

impl Bencher for Sqlite {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn setup(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS Generic (
                    GenericId   INTEGER PRIMARY KEY,
                    Name        TEXT,
                    Balance     INTEGER,
                    Description TEXT
                );
                DELETE FROM Generic;",
            )?;
            Ok(())
        })
    }

    fn cleanup(&self, close_connection: bool) {
        let mut guard = self.conn.lock();
        if let Some(conn) = guard.as_ref() {
            if let Err(e) = conn.execute_batch("DROP TABLE IF EXISTS Generic;") {
                warn!("failed to drop table: {e}");
            }
        }

        if close_connection {
            if let Some(conn) = guard.take() {
                if let Err((_, e)) = conn.close() {
                    warn!("failed to close connection: {e}");
                }
            }
        }
    }

    fn benchmarks(&self) -> Vec<BenchmarkDescriptor> {
        generic_workload("Generic")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{Coordinator, Filter};
    use crate::harness::{BenchConfig, CancelToken};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn count(db: &Sqlite, sql: &str) -> i64 {
        db.with_conn(|c| Ok(c.query_row(sql, [], |r| r.get(0))?))
            .unwrap()
    }

    fn memory() -> Sqlite {
        let db = Sqlite::open(MEMORY).unwrap();
        db.setup().unwrap();
        db
    }

    #[test]
    fn setup_is_idempotent() {
        let db = memory();
        db.exec("INSERT INTO Generic (GenericId) VALUES (1);").unwrap();
        db.setup().unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM Generic"), 0);
    }

    #[test]
    fn multiple_statements_run_in_order() {
        let db = memory();
        db.exec("INSERT INTO Generic (GenericId) VALUES (1); INSERT INTO Generic (GenericId) VALUES (2); SELECT * FROM Generic;")
            .unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM Generic"), 2);
    }

    #[test]
    fn failure_does_not_stop_later_statements() {
        let db = memory();
        let err = db
            .exec("INSERT INTO Missing VALUES (1); INSERT INTO Generic (GenericId) VALUES (7);")
            .unwrap_err();
        assert!(err.to_string().contains("Missing"));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM Generic"), 1);
    }

    #[test]
    fn transaction_is_all_or_nothing() {
        let db = memory();
        let result = db.exec(
            "BEGIN; INSERT INTO Generic (GenericId) VALUES (1); INSERT INTO Generic (GenericId) VALUES (1); COMMIT;",
        );
        assert!(result.is_err());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM Generic"), 0);

        db.exec("BEGIN; INSERT INTO Generic (GenericId) VALUES (1); INSERT INTO Generic (GenericId) VALUES (2); COMMIT;")
            .unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM Generic"), 2);
    }

    #[test]
    fn transaction_keyword_forms_are_batched() {
        let db = memory();
        db.exec("BEGIN TRANSACTION; INSERT INTO Generic (GenericId) VALUES (1); COMMIT TRANSACTION;")
            .unwrap();
        db.exec("begin immediate; INSERT INTO Generic (GenericId) VALUES (2); end;")
            .unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM Generic"), 2);

        // a later BEGIN must not fail with "cannot start a transaction within a transaction"
        db.exec("BEGIN; INSERT INTO Generic (GenericId) VALUES (3); COMMIT;").unwrap();
        assert!(db.with_conn(|c| Ok(c.is_autocommit())).unwrap());
    }

    #[test]
    fn stray_commit_is_passed_through() {
        let db = memory();
        let err = db.exec("COMMIT;").unwrap_err();
        assert!(err.to_string().contains("no transaction is active"), "{err}");
        assert!(db.with_conn(|c| Ok(c.is_autocommit())).unwrap());
    }

    #[test]
    fn begin_forms() {
        assert!(matches!(parse_begin("BEGIN"), Some(TransactionBehavior::Deferred)));
        assert!(matches!(
            parse_begin("begin exclusive transaction"),
            Some(TransactionBehavior::Exclusive)
        ));
        assert!(parse_begin("BEGIN WORK").is_none());
        assert!(parse_begin("BEGINNING").is_none());
        assert!(is_commit("end transaction"));
        assert!(!is_commit("COMMIT NOW"));
    }

    #[test]
    fn closed_connection_reports_error() {
        let db = memory();
        db.cleanup(true);
        assert!(db.exec("SELECT 1;").is_err());
        db.cleanup(true);
    }

    #[test]
    fn builtin_workload_end_to_end() {
        let db = Arc::new(memory());
        let config = BenchConfig {
            iterations: 40,
            workers: 4,
            seed: 9,
            ..Default::default()
        };
        let coordinator = Coordinator::new("sqlite", db.clone(), config, CancelToken::new());

        let outcome = coordinator
            .run(&db.benchmarks(), &Filter::parse("inserts updates"))
            .unwrap();
        assert_eq!(outcome.summaries.len(), 2);
        assert!(outcome.summaries.iter().all(|s| s.executions == 40 && s.errors == 0));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM Generic"), 40);

        let outcome = coordinator.run(&db.benchmarks(), &Filter::parse("deletes")).unwrap();
        assert_eq!(outcome.summaries[0].errors, 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM Generic"), 0);
    }

    #[test]
    fn file_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.sqlite3");
        let db = Sqlite::open(path.to_str().unwrap()).unwrap();
        db.setup().unwrap();
        db.exec("INSERT INTO Generic (GenericId, Name) VALUES (1, 'a');").unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM Generic"), 1);
        db.cleanup(true);
        assert!(path.exists());
    }
}
