//! Row seeding for the embedded store.
//!
//! The engine itself never writes. These helpers exist for integration tests
//! and for loading demo data into a local DuckDB file.

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use waypost_core::analytics::EventType;

use crate::store::EmbeddedStore;

fn ts(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

#[derive(Debug, Clone)]
pub struct SeedSession {
    pub session_id: Uuid,
    pub website_id: Uuid,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub device: Option<String>,
    pub country: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SeedSession {
    pub fn new(website_id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            website_id,
            browser: Some("Chrome".to_string()),
            os: Some("macOS".to_string()),
            device: Some("desktop".to_string()),
            country: None,
            created_at,
        }
    }

    pub fn country(mut self, country: &str) -> Self {
        self.country = Some(country.to_string());
        self
    }

    pub fn device(mut self, device: &str) -> Self {
        self.device = Some(device.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct SeedEvent {
    pub website_id: Uuid,
    pub session_id: Uuid,
    pub visit_id: Uuid,
    pub event_type: EventType,
    pub event_name: Option<String>,
    pub url_path: String,
    pub referrer_domain: Option<String>,
    pub utm_source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SeedEvent {
    pub fn page_view(
        session: &SeedSession,
        visit_id: Uuid,
        url_path: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            website_id: session.website_id,
            session_id: session.session_id,
            visit_id,
            event_type: EventType::PageView,
            event_name: None,
            url_path: url_path.to_string(),
            referrer_domain: None,
            utm_source: None,
            created_at,
        }
    }

    pub fn custom(
        session: &SeedSession,
        visit_id: Uuid,
        name: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type: EventType::CustomEvent,
            event_name: Some(name.to_string()),
            ..Self::page_view(session, visit_id, "/", created_at)
        }
    }

    pub fn utm_source(mut self, source: &str) -> Self {
        self.utm_source = Some(source.to_string());
        self
    }
}

impl EmbeddedStore {
    pub async fn seed_website(&self, website_id: Uuid, domain: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO website (website_id, name, domain, created_at)
               VALUES (?1, ?2, ?3, ?4)
               ON CONFLICT (website_id) DO UPDATE SET domain = EXCLUDED.domain"#,
            duckdb::params![website_id.to_string(), domain, domain, ts(Utc::now())],
        )?;
        Ok(())
    }

    pub async fn seed_session(&self, session: &SeedSession) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO session (session_id, website_id, browser, os, device, country, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            duckdb::params![
                session.session_id.to_string(),
                session.website_id.to_string(),
                session.browser,
                session.os,
                session.device,
                session.country,
                ts(session.created_at)
            ],
        )?;
        Ok(())
    }

    /// Insert one event and return its generated id.
    pub async fn seed_event(&self, event: &SeedEvent) -> Result<Uuid> {
        let event_id = Uuid::new_v4();
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO website_event (
                   event_id, website_id, session_id, visit_id, event_type, event_name,
                   url_path, referrer_domain, utm_source, utm_medium, utm_campaign, created_at
               ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, NULL, ?10)"#,
            duckdb::params![
                event_id.to_string(),
                event.website_id.to_string(),
                event.session_id.to_string(),
                event.visit_id.to_string(),
                event.event_type.code(),
                event.event_name,
                event.url_path,
                event.referrer_domain,
                event.utm_source,
                ts(event.created_at)
            ],
        )?;
        Ok(event_id)
    }

    pub async fn seed_revenue(
        &self,
        session: &SeedSession,
        amount: f64,
        created_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO revenue (revenue_id, website_id, session_id, event_name, revenue, created_at)
               VALUES (?1, ?2, ?3, 'purchase', ?4, ?5)"#,
            duckdb::params![
                Uuid::new_v4().to_string(),
                session.website_id.to_string(),
                session.session_id.to_string(),
                amount,
                ts(created_at)
            ],
        )?;
        Ok(())
    }
}
