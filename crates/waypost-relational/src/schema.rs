/// DuckDB initialization SQL for the embedded relational store.
///
/// Executed once at open time via `Connection::execute_batch`. Every
/// statement uses `IF NOT EXISTS`, so re-running it on startup is a no-op.
///
/// The layout mirrors the Postgres schema the engine reads in production:
/// UUID identifiers, UTC `TIMESTAMP` columns and session attributes kept on
/// `session` rather than on each event. A visit (`visit_id`) groups the
/// contiguous page views of one session.
///
/// Always set an explicit memory limit; the DuckDB default (80% of system
/// RAM) is not acceptable for a server process.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

CREATE TABLE IF NOT EXISTS website (
    website_id      UUID PRIMARY KEY,
    name            VARCHAR NOT NULL,
    domain          VARCHAR NOT NULL,
    created_at      TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS session (
    session_id      UUID PRIMARY KEY,
    website_id      UUID NOT NULL,
    browser         VARCHAR,
    os              VARCHAR,
    device          VARCHAR,
    country         VARCHAR,
    created_at      TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS website_event (
    event_id        UUID PRIMARY KEY,
    website_id      UUID NOT NULL,
    session_id      UUID NOT NULL,
    visit_id        UUID NOT NULL,
    event_type      INTEGER NOT NULL,   -- 1 = page view, 2 = custom event
    event_name      VARCHAR,            -- NULL for page views
    url_path        VARCHAR NOT NULL,
    referrer_domain VARCHAR,
    utm_source      VARCHAR,
    utm_medium      VARCHAR,
    utm_campaign    VARCHAR,
    created_at      TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS revenue (
    revenue_id      UUID PRIMARY KEY,
    website_id      UUID NOT NULL,
    session_id      UUID NOT NULL,
    event_id        UUID,
    event_name      VARCHAR,
    currency        VARCHAR(3) NOT NULL DEFAULT 'USD',
    revenue         DECIMAL(19, 4) NOT NULL,
    created_at      TIMESTAMP NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_website_created ON session(website_id, created_at);
CREATE INDEX IF NOT EXISTS idx_event_website_created ON website_event(website_id, created_at);
CREATE INDEX IF NOT EXISTS idx_event_session ON website_event(session_id);
CREATE INDEX IF NOT EXISTS idx_event_visit ON website_event(visit_id);
CREATE INDEX IF NOT EXISTS idx_revenue_website_created ON revenue(website_id, created_at);
"#
    )
}
