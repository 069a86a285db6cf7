/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup (idempotent).
///
/// `memory_limit` is passed at runtime from `Config.duckdb_memory_limit`
/// (env `KOMPASS_DUCKDB_MEMORY_LIMIT`, default `"512MB"`). DuckDB accepts any
/// size string it supports, e.g. `"512MB"` or `"4GB"`. Always set an
/// explicit limit; the DuckDB default (80% of system RAM) is not acceptable
/// for a server process.
///
/// All application tables live in the `public` schema: that is the schema the
/// admin browser's allow-list exposes, and keeping `main` for internal
/// bookkeeping (`_migrations`) means the ledger never shows up in the table
/// list. `search_path` is set so unqualified user SQL in the read-only query
/// endpoint resolves `public` tables first.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

CREATE SCHEMA IF NOT EXISTS public;
SET search_path = 'public,main';

-- ===========================================
-- CONTENT TABLES (managed by external editors)
-- ===========================================
-- Rows are written by the CRUD tooling outside this service; the admin
-- browser only reads them. JSON columns are declared as JSON so the
-- introspection layer marks them eligible for path filtering.
CREATE TABLE IF NOT EXISTS public.services (
    id              VARCHAR PRIMARY KEY,
    title           VARCHAR NOT NULL,
    slug            VARCHAR NOT NULL UNIQUE,
    category        VARCHAR NOT NULL,              -- 'Beratung' | 'Entwicklung' | 'Workshops'
    summary         VARCHAR,
    body            VARCHAR,
    tags            JSON,                          -- {{"level": ..., "topics": [...]}}
    position        INTEGER NOT NULL DEFAULT 0,
    published       BOOLEAN NOT NULL DEFAULT false,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_services_category ON public.services(category);
CREATE INDEX IF NOT EXISTS idx_services_updated  ON public.services(updated_at DESC);

CREATE TABLE IF NOT EXISTS public.workshops (
    id              VARCHAR PRIMARY KEY,
    title           VARCHAR NOT NULL,
    slug            VARCHAR NOT NULL UNIQUE,
    format          VARCHAR NOT NULL,              -- 'online' | 'onsite' | 'hybrid'
    duration_hours  INTEGER,
    audience        VARCHAR,
    outline         JSON,                          -- ordered agenda blocks
    position        INTEGER NOT NULL DEFAULT 0,
    published       BOOLEAN NOT NULL DEFAULT false,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS public.experts (
    id              VARCHAR PRIMARY KEY,
    name            VARCHAR NOT NULL,
    role            VARCHAR NOT NULL,
    focus           VARCHAR,
    bio             VARCHAR,
    links           JSON,                          -- {{"linkedin": ..., "website": ...}}
    position        INTEGER NOT NULL DEFAULT 0,
    published       BOOLEAN NOT NULL DEFAULT false,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS public.case_studies (
    id              VARCHAR PRIMARY KEY,
    title           VARCHAR NOT NULL,
    slug            VARCHAR NOT NULL UNIQUE,
    client          VARCHAR,
    industry        VARCHAR,
    challenge       VARCHAR,
    approach        VARCHAR,
    outcome         VARCHAR,
    metrics         JSON,                          -- {{"duration_weeks": ..., "roi": ...}}
    published       BOOLEAN NOT NULL DEFAULT false,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS public.hub_articles (
    id              VARCHAR PRIMARY KEY,
    title           VARCHAR NOT NULL,
    slug            VARCHAR NOT NULL UNIQUE,
    kind            VARCHAR NOT NULL,              -- 'article' | 'download' | 'video'
    teaser          VARCHAR,
    body            VARCHAR,
    meta            JSON,                          -- {{"reading_minutes": ..., "topics": [...]}}
    published_at    TIMESTAMP,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS public.unit_cards (
    id              VARCHAR PRIMARY KEY,
    title           VARCHAR NOT NULL,
    slug            VARCHAR NOT NULL UNIQUE,
    claim           VARCHAR,
    description     VARCHAR,
    accent          VARCHAR,                       -- brand color token
    details         JSON,
    position        INTEGER NOT NULL DEFAULT 0,
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- ===========================================
-- EVENTS (append-only analytics log)
-- ===========================================
-- Never updated or deleted by normal flow. `props` is opaque client JSON;
-- it is only ever read through json_extract, never trusted as SQL.
CREATE TABLE IF NOT EXISTS public.events (
    id              VARCHAR NOT NULL,              -- UUID v4, assigned at insert
    name            VARCHAR NOT NULL,
    props           JSON,
    path            VARCHAR,
    referrer        VARCHAR,
    user_agent      VARCHAR,
    session_id      VARCHAR NOT NULL,
    ip              VARCHAR,

    -- Best-effort IP enrichment; NULL when no lookup source is configured.
    country_code    VARCHAR(2),                    -- ISO 3166-1 alpha-2
    country_name    VARCHAR,
    org             VARCHAR,
    asn             BIGINT,
    hostname        VARCHAR,

    created_at      TIMESTAMP NOT NULL
);

-- Primary query pattern: date range, optionally narrowed by name
CREATE INDEX IF NOT EXISTS idx_events_time      ON public.events(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_events_name_time ON public.events(name, created_at DESC);
-- Accelerates unique-session aggregation
CREATE INDEX IF NOT EXISTS idx_events_session   ON public.events(session_id);
"#
    )
}

/// Migrations tracking table SQL.
///
/// Runs before [`init_sql`] so the ledger exists on the very first open.
/// Deliberately unqualified: at that point `search_path` is still the DuckDB
/// default, so the table lands in `main` and stays out of the browsable set.
pub const MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
    id          VARCHAR PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#;
