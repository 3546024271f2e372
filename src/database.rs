//! # Database Module
//!
//! A small SQLite helper for handlers that need persistence.
//!
//! [`Database`] owns one connection behind a `Mutex`, so a single instance
//! can be shared (`Arc<Database>`) between the listener and any handler.
//! Statements run in autocommit mode unless they go through a [`Session`],
//! which holds the lock for its whole lifetime and commits when dropped.
//!
//! Table and column names passed to the helpers are validated against
//! `[A-Za-z_][A-Za-z0-9_]*` and double-quoted; values always travel as bound
//! parameters. `WHERE` and `ORDER BY` fragments are passed through verbatim
//! and must not contain untrusted input.
//!
//! ```rust
//! use nkapi::database::{Database, Executor, Filter, Select, SqlValue};
//!
//! let db = Database::open_in_memory()?;
//! db.table_create("users", &[("id", "INTEGER PRIMARY KEY"), ("name", "TEXT NOT NULL")], true)?;
//! db.insert("users", &[("name", SqlValue::from("ada".to_string()))])?;
//!
//! let rows = db.select("users", &Select::all().filter(Filter::new("name = ?", ["ada".to_string()])))?;
//! assert_eq!(rows[0].get("id"), Some(&SqlValue::Integer(1)));
//! # Ok::<(), nkapi::database::DatabaseError>(())
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params_from_iter, Connection};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub use rusqlite::types::Value as SqlValue;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex should be valid")
});

/// Savepoint used to make [`Executor::execute_many`] all-or-nothing.
const BATCH_SAVEPOINT: &str = "nkapi_execute_many";

pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Error from a [`Database`] operation.
#[derive(Debug)]
pub enum DatabaseError {
    /// SQLite rejected the statement or the connection failed
    Sqlite(rusqlite::Error),
    /// A table, column or pragma value is not a plain identifier
    InvalidIdentifier(String),
    /// The connection was closed and could not be reopened
    Closed,
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::Sqlite(e) => write!(f, "sqlite error: {}", e),
            DatabaseError::InvalidIdentifier(name) => write!(f, "invalid identifier '{}'", name),
            DatabaseError::Closed => write!(f, "database connection is closed"),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatabaseError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(e: rusqlite::Error) -> Self {
        DatabaseError::Sqlite(e)
    }
}

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file; `:memory:` for a private in-memory database
    pub path: PathBuf,
    /// How long to wait on a locked database before failing
    pub busy_timeout_ms: u64,
    pub journal_mode: Option<String>,
    pub synchronous: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./db.sqlite3"),
            busy_timeout_ms: 5000,
            journal_mode: Some("WAL".to_string()),
            synchronous: Some("NORMAL".to_string()),
        }
    }
}

/// One result row: column names plus values in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Value of `column`, by name.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The row as a JSON object keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.clone(), sql_to_json(v)))
            .collect();
        serde_json::Value::Object(map)
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(column, &sql_to_json(value))?;
        }
        map.end()
    }
}

fn sql_to_json(value: &SqlValue) -> serde_json::Value {
    match value {
        SqlValue::Null => serde_json::Value::Null,
        SqlValue::Integer(i) => serde_json::Value::from(*i),
        SqlValue::Real(f) => serde_json::Value::from(*f),
        SqlValue::Text(s) => serde_json::Value::from(s.as_str()),
        SqlValue::Blob(b) => serde_json::Value::from(b.clone()),
    }
}

/// Column description from `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

/// A `WHERE` clause with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    clause: String,
    params: Vec<SqlValue>,
}

impl Filter {
    pub fn new<I, V>(clause: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        Self {
            clause: clause.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }
}

/// Options for [`Executor::select`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    columns: Vec<String>,
    filter: Option<Filter>,
    order_by: Option<String>,
    limit: Option<u64>,
}

impl Select {
    /// `SELECT *` with no filter.
    pub fn all() -> Self {
        Self::default()
    }

    /// Plain names are quoted; anything else (`COUNT(*)`) is used as written.
    #[must_use]
    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Validate `name` and wrap it in double quotes.
pub fn quote_identifier(name: &str) -> Result<String> {
    if IDENTIFIER.is_match(name) {
        Ok(format!("\"{name}\""))
    } else {
        Err(DatabaseError::InvalidIdentifier(name.to_string()))
    }
}

/// Statement helpers shared by [`Database`] and [`Session`].
///
/// Implementors only provide access to a live connection.
pub trait Executor {
    fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>;

    /// Run a statement, returning the number of changed rows.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<usize> {
        self.with_connection(|conn| {
            debug!(sql = %sql, params = params.len(), "Executing statement");
            Ok(conn.execute(sql, params_from_iter(params))?)
        })
    }

    /// Run one statement per parameter set, all or nothing.
    fn execute_many(&self, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<usize> {
        self.with_connection(|conn| {
            debug!(sql = %sql, batches = param_sets.len(), "Executing batch");
            conn.execute_batch(&format!("SAVEPOINT {BATCH_SAVEPOINT}"))?;
            let outcome = run_batch(conn, sql, param_sets);
            let finish = if outcome.is_ok() {
                format!("RELEASE {BATCH_SAVEPOINT}")
            } else {
                format!("ROLLBACK TO {BATCH_SAVEPOINT}; RELEASE {BATCH_SAVEPOINT}")
            };
            conn.execute_batch(&finish)?;
            outcome
        })
    }

    /// Run a query and collect every row.
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        self.with_connection(|conn| collect_rows(conn, sql, params))
    }

    /// First row of a query, if any.
    fn query_one(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Run `PRAGMA <statement>` and return whatever rows it produces.
    fn execute_pragma(&self, statement: &str) -> Result<Vec<Row>> {
        self.query(&format!("PRAGMA {statement};"), &[])
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        let rows = self.query(
            "SELECT name FROM sqlite_master WHERE type='table' AND name=?;",
            &[SqlValue::from(table.to_string())],
        )?;
        Ok(!rows.is_empty())
    }

    /// `CREATE TABLE` from `(name, definition)` pairs.
    fn table_create(&self, table: &str, columns: &[(&str, &str)], if_not_exists: bool) -> Result<()> {
        let definitions = columns
            .iter()
            .map(|(name, definition)| Ok(format!("{} {}", quote_identifier(name)?, definition)))
            .collect::<Result<Vec<_>>>()?;
        let condition = if if_not_exists { "IF NOT EXISTS " } else { "" };
        let sql = format!(
            "CREATE TABLE {condition}{} ({});",
            quote_identifier(table)?,
            definitions.join(", ")
        );
        self.execute(&sql, &[]).map(|_| ())
    }

    /// Drop `table`. A missing table is not an error.
    fn table_drop(&self, table: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {};", quote_identifier(table)?);
        self.execute(&sql, &[]).map(|_| ())
    }

    /// Table names, sorted.
    fn table_list(&self) -> Result<Vec<String>> {
        let rows = self.query("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name;", &[])?;
        Ok(rows
            .iter()
            .filter_map(|row| match row.get_index(0) {
                Some(SqlValue::Text(name)) => Some(name.clone()),
                _ => None,
            })
            .collect())
    }

    /// Columns of `table` in declaration order. Unknown tables give an
    /// empty list.
    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = self.execute_pragma(&format!("table_info({})", quote_identifier(table)?))?;
        Ok(rows.iter().map(column_info).collect())
    }

    fn select(&self, table: &str, select: &Select) -> Result<Vec<Row>> {
        let columns = if select.columns.is_empty() {
            "*".to_string()
        } else {
            select
                .columns
                .iter()
                .map(|c| if IDENTIFIER.is_match(c) { format!("\"{c}\"") } else { c.clone() })
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!("SELECT {columns} FROM {}", quote_identifier(table)?);
        let mut params: &[SqlValue] = &[];
        if let Some(filter) = &select.filter {
            sql.push_str(&format!(" WHERE {}", filter.clause));
            params = filter.params.as_slice();
        }
        if let Some(order_by) = &select.order_by {
            sql.push_str(&format!(" ORDER BY {order_by}"));
        }
        if let Some(limit) = select.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        sql.push(';');
        self.query(&sql, params)
    }

    /// Insert one row and return its rowid.
    fn insert(&self, table: &str, data: &[(&str, SqlValue)]) -> Result<i64> {
        let names = data
            .iter()
            .map(|(name, _)| quote_identifier(name))
            .collect::<Result<Vec<_>>>()?;
        let placeholders = vec!["?"; data.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            quote_identifier(table)?,
            names.join(", "),
            placeholders
        );
        let values: Vec<SqlValue> = data.iter().map(|(_, v)| v.clone()).collect();
        self.with_connection(|conn| {
            debug!(sql = %sql, "Inserting row");
            conn.execute(&sql, params_from_iter(&values))?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Update matching rows (all rows without a filter). Returns the count.
    fn update(&self, table: &str, updates: &[(&str, SqlValue)], filter: Option<&Filter>) -> Result<usize> {
        let assignments = updates
            .iter()
            .map(|(name, _)| Ok(format!("{} = ?", quote_identifier(name)?)))
            .collect::<Result<Vec<_>>>()?;
        let mut sql = format!("UPDATE {} SET {}", quote_identifier(table)?, assignments.join(", "));
        let mut params: Vec<SqlValue> = updates.iter().map(|(_, v)| v.clone()).collect();
        if let Some(filter) = filter {
            sql.push_str(&format!(" WHERE {}", filter.clause));
            params.extend(filter.params.iter().cloned());
        }
        sql.push(';');
        self.execute(&sql, &params)
    }

    /// Delete matching rows (all rows without a filter). Returns the count.
    fn delete(&self, table: &str, filter: Option<&Filter>) -> Result<usize> {
        let mut sql = format!("DELETE FROM {}", quote_identifier(table)?);
        let mut params: &[SqlValue] = &[];
        if let Some(filter) = filter {
            sql.push_str(&format!(" WHERE {}", filter.clause));
            params = filter.params.as_slice();
        }
        sql.push(';');
        self.execute(&sql, params)
    }
}

fn run_batch(conn: &Connection, sql: &str, param_sets: &[Vec<SqlValue>]) -> Result<usize> {
    let mut stmt = conn.prepare(sql)?;
    let mut changed = 0;
    for params in param_sets {
        changed += stmt.execute(params_from_iter(params))?;
    }
    Ok(changed)
}

fn collect_rows(conn: &Connection, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
    debug!(sql = %sql, params = params.len(), "Running query");
    let mut stmt = conn.prepare(sql)?;
    let columns: Arc<[String]> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let values = (0..columns.len())
            .map(|i| row.get::<_, SqlValue>(i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        out.push(Row {
            columns: Arc::clone(&columns),
            values,
        });
    }
    Ok(out)
}

// table_info columns: cid, name, type, notnull, dflt_value, pk
fn column_info(row: &Row) -> ColumnInfo {
    let text = |i| match row.get_index(i) {
        Some(SqlValue::Text(s)) => Some(s.clone()),
        _ => None,
    };
    let flag = |i| matches!(row.get_index(i), Some(SqlValue::Integer(n)) if *n != 0);
    ColumnInfo {
        name: text(1).unwrap_or_default(),
        declared_type: text(2).unwrap_or_default(),
        not_null: flag(3),
        default: text(4),
        primary_key: flag(5),
    }
}

/// Thread-safe SQLite handle.
///
/// A closed database reopens itself on the next operation.
#[derive(Debug)]
pub struct Database {
    config: DatabaseConfig,
    connection: Mutex<Option<Connection>>,
}

impl Database {
    /// Open (creating if needed) the database described by `config` and
    /// apply its pragmas. Foreign keys are always enabled.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        if let Some(mode) = &config.journal_mode {
            quote_identifier(mode)?;
        }
        if let Some(sync) = &config.synchronous {
            quote_identifier(sync)?;
        }
        let connection = connect(&config)?;
        Ok(Self {
            config,
            connection: Mutex::new(Some(connection)),
        })
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(DatabaseConfig {
            path: PathBuf::from(":memory:"),
            ..DatabaseConfig::default()
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Start a session: the connection stays locked until the session is
    /// dropped, and everything run through it is committed together.
    pub fn session(&self) -> Result<Session<'_>> {
        let mut guard = self.lock();
        let conn = ensure_open(&mut guard, &self.config)?;
        conn.execute_batch("BEGIN")?;
        Ok(Session {
            guard,
            finished: false,
        })
    }

    /// Run `f` in a session, committing on `Ok` and rolling back on `Err`.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Session<'_>) -> Result<T>,
    {
        let session = self.session()?;
        match f(&session) {
            Ok(value) => {
                session.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = session.rollback() {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Close the connection. Uncommitted work is discarded.
    pub fn close(&self) -> Result<()> {
        if let Some(conn) = self.lock().take() {
            conn.close().map_err(|(_, e)| DatabaseError::Sqlite(e))?;
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    // A panicking session has already rolled back, so a poisoned lock still
    // guards a usable connection.
    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Executor for Database {
    fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut guard = self.lock();
        let conn = ensure_open(&mut guard, &self.config)?;
        f(conn)
    }
}

fn connect(config: &DatabaseConfig) -> Result<Connection> {
    debug!(path = %config.path.display(), "Opening database");
    let conn = Connection::open(&config.path)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    collect_rows(&conn, "PRAGMA foreign_keys = ON;", &[])?;
    if let Some(mode) = &config.journal_mode {
        collect_rows(&conn, &format!("PRAGMA journal_mode = {mode};"), &[])?;
    }
    if let Some(sync) = &config.synchronous {
        collect_rows(&conn, &format!("PRAGMA synchronous = {sync};"), &[])?;
    }
    Ok(conn)
}

fn ensure_open<'a>(slot: &'a mut Option<Connection>, config: &DatabaseConfig) -> Result<&'a Connection> {
    if slot.is_none() {
        *slot = Some(connect(config)?);
    }
    slot.as_ref().ok_or(DatabaseError::Closed)
}

/// Exclusive, transactional use of a [`Database`].
///
/// Dropping the session commits, unless the thread is panicking, in which
/// case the work is rolled back. Use [`Session::rollback`] to discard
/// explicitly.
pub struct Session<'db> {
    guard: MutexGuard<'db, Option<Connection>>,
    finished: bool,
}

impl Session<'_> {
    pub fn commit(mut self) -> Result<()> {
        self.finish("COMMIT")
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finish("ROLLBACK")
    }

    fn finish(&mut self, sql: &str) -> Result<()> {
        self.finished = true;
        let conn = self.guard.as_ref().ok_or(DatabaseError::Closed)?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

impl Executor for Session<'_> {
    fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.guard.as_ref().ok_or(DatabaseError::Closed)?;
        f(conn)
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let sql = if thread::panicking() { "ROLLBACK" } else { "COMMIT" };
        if let Err(e) = self.finish(sql) {
            warn!(error = %e, statement = sql, "Failed to end database session");
        }
    }
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("finished", &self.finished).finish()
    }
}
