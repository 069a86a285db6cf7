use std::sync::Arc;

use anyhow::Result;
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use kompass_core::error::QueryError;
use kompass_core::event::AnalyticsEvent;
use kompass_core::table::{
    ColumnInfo, DbStatus, PageRequest, PageResult, QueryOutput, TableRef, EXPORT_HARD_CAP,
    MAX_PAGE_LIMIT, QUERY_ROW_CAP,
};

use crate::catalog;
use crate::guard;
use crate::ident::safe_table;
use crate::reader;
use crate::schema::{init_sql, MIGRATIONS_TABLE_SQL};

/// Map a driver error to the storage bucket of the error taxonomy.
pub(crate) fn storage(err: duckdb::Error) -> QueryError {
    QueryError::StorageUnavailable(err.to_string())
}

/// A DuckDB backend for Kompass.
///
/// DuckDB is single-writer: concurrent reads are fine, but concurrent writes
/// cause contention. We wrap the connection in `Arc<Mutex<_>>` so the async
/// runtime serialises all access while the struct stays cheaply cloneable
/// across Axum handlers.
///
/// Memory and thread limits are enforced by [`init_sql`] at open time.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) a DuckDB database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`.
    /// It is read from `Config.duckdb_memory_limit` at the call site.
    /// Runs [`MIGRATIONS_TABLE_SQL`] then the schema init SQL on the
    /// connection so all tables and indexes are created if they do not
    /// already exist.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(MIGRATIONS_TABLE_SQL)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        Self::seed_migrations_sync(&conn)?;
        info!(
            "DuckDB opened at {} with memory_limit={}, threads=2",
            path, memory_limit
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an **in-memory** DuckDB database.
    ///
    /// Intended for unit tests only. Data is discarded when the struct is
    /// dropped. Uses a 1GB memory limit (tests are not memory-constrained).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(MIGRATIONS_TABLE_SQL)?;
        conn.execute_batch(&init_sql("1GB"))?;
        Self::seed_migrations_sync(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Record the bootstrap migration in the ledger if this is a fresh
    /// database. `INSERT OR IGNORE` keeps re-runs on every startup safe.
    fn seed_migrations_sync(conn: &Connection) -> Result<()> {
        conn.execute(
            "INSERT OR IGNORE INTO _migrations (id) VALUES (?1)",
            duckdb::params!["m001_initial"],
        )?;
        Ok(())
    }

    /// Execute `SELECT 1` as a lightweight liveness check.
    ///
    /// Called by the `/health` endpoint. Returns an error if the connection
    /// is unavailable (file locked, disk full, etc.).
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// List base tables in the configured browsable schemas.
    pub async fn list_tables(&self, allow_list: &[String]) -> Result<Vec<TableRef>, QueryError> {
        let conn = self.conn.lock().await;
        catalog::list_tables(&conn, allow_list)
    }

    /// Column descriptors for one browsable table, in ordinal order.
    pub async fn table_columns(
        &self,
        table: &TableRef,
        allow_list: &[String],
    ) -> Result<Vec<ColumnInfo>, QueryError> {
        let (schema, name) = safe_table(table, allow_list)?;
        let conn = self.conn.lock().await;
        catalog::table_columns(&conn, &schema, &name)
    }

    /// Read one filtered, sorted page of a browsable table.
    pub async fn read_page(
        &self,
        table: &TableRef,
        req: &PageRequest,
        allow_list: &[String],
        count_threshold: i64,
    ) -> Result<PageResult, QueryError> {
        let (schema, name) = safe_table(table, allow_list)?;
        let conn = self.conn.lock().await;
        reader::read_page(
            &conn,
            &schema,
            &name,
            req,
            MAX_PAGE_LIMIT,
            count_threshold,
            true,
        )
    }

    /// Read a large page for export. No total count; the export row cap
    /// replaces the interactive page limit.
    pub async fn export_page(
        &self,
        table: &TableRef,
        req: &PageRequest,
        allow_list: &[String],
    ) -> Result<PageResult, QueryError> {
        let (schema, name) = safe_table(table, allow_list)?;
        let conn = self.conn.lock().await;
        reader::read_page(&conn, &schema, &name, req, EXPORT_HARD_CAP, 0, false)
    }

    /// Run one read-only SQL statement through the gate, capped at
    /// [`QUERY_ROW_CAP`] rows.
    pub async fn run_query(&self, sql: &str) -> Result<QueryOutput, QueryError> {
        let conn = self.conn.lock().await;
        guard::run_query(&conn, sql, QUERY_ROW_CAP)
    }

    /// Insert a batch of enriched events in a single transaction.
    ///
    /// Called synchronously from the ingestion handler. Each event must
    /// already carry its UUID, session ID, and enrichment fields.
    ///
    /// Returns immediately (no-op) if `events` is empty.
    pub async fn insert_events(&self, events: &[AnalyticsEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().await;

        // One transaction per batch: atomicity plus a single fsync.
        let tx = conn.transaction()?;

        for event in events {
            let props = if event.props.is_null() {
                None
            } else {
                Some(event.props.to_string())
            };
            tx.execute(
                r#"INSERT INTO public.events (
                    id, name, props, path, referrer, user_agent, session_id,
                    ip, country_code, country_name, org, asn, hostname,
                    created_at
                ) VALUES (
                    ?1,  ?2,  ?3,  ?4,  ?5,  ?6,  ?7,
                    ?8,  ?9,  ?10, ?11, ?12, ?13,
                    ?14
                )"#,
                duckdb::params![
                    event.id,
                    event.name,
                    props,
                    event.path,
                    event.referrer,
                    event.user_agent,
                    event.session_id,
                    event.ip,
                    event.country_code,
                    event.country_name,
                    event.org,
                    event.asn,
                    event.hostname,
                    event.created_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        info!("Inserted {} events into DuckDB", events.len());
        Ok(())
    }

    /// Storage snapshot for the admin dashboard.
    pub async fn db_status(&self) -> Result<DbStatus> {
        let conn = self.conn.lock().await;
        let version: String = conn.query_row("SELECT version()", [], |row| row.get(0))?;
        let services_count: i64 =
            conn.query_row("SELECT count(*) FROM public.services", [], |row| row.get(0))?;
        let services_last_updated: Option<String> = conn.query_row(
            "SELECT strftime(max(updated_at), '%Y-%m-%dT%H:%M:%SZ') FROM public.services",
            [],
            |row| row.get(0),
        )?;
        Ok(DbStatus {
            version,
            services_count,
            services_last_updated,
        })
    }

    /// Acquire the DuckDB connection lock for direct queries.
    ///
    /// Intended for integration tests that need to seed or verify stored
    /// data. Production code should use the typed methods above.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
