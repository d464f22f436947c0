use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use waypost_core::analytics::{
    ActivationQuery, ChurnQuery, EventType, FunnelQuery, Granularity, PathQuery, QueryFilters,
    UserModel,
};
use waypost_core::AnalyticsEngine;
use waypost_relational::fixtures::{SeedEvent, SeedSession};
use waypost_relational::{EmbeddedStore, RelationalBackend};

fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, day, hour, minute, 0)
        .single()
        .expect("valid timestamp")
}

fn july(website_id: Uuid) -> QueryFilters {
    QueryFilters::new(
        website_id.to_string(),
        NaiveDate::from_ymd_opt(2025, 7, 1).expect("date"),
        NaiveDate::from_ymd_opt(2025, 7, 31).expect("date"),
    )
}

async fn setup() -> (EmbeddedStore, AnalyticsEngine, Uuid) {
    let store = EmbeddedStore::open_in_memory().expect("db");
    let website_id = Uuid::new_v4();
    store
        .seed_website(website_id, "example.com")
        .await
        .expect("seed website");
    let backend = RelationalBackend::new(Arc::new(store.clone()));
    let engine = AnalyticsEngine::new(Arc::new(backend), Duration::from_secs(10));
    (store, engine, website_id)
}

async fn session(store: &EmbeddedStore, website_id: Uuid, created_at: DateTime<Utc>) -> SeedSession {
    let session = SeedSession::new(website_id, created_at);
    store.seed_session(&session).await.expect("seed session");
    session
}

async fn custom(store: &EmbeddedStore, s: &SeedSession, name: &str, at: DateTime<Utc>) {
    store
        .seed_event(&SeedEvent::custom(s, s.session_id, name, at))
        .await
        .expect("seed event");
}

async fn view(store: &EmbeddedStore, s: &SeedSession, visit: Uuid, path: &str, at: DateTime<Utc>) {
    store
        .seed_event(&SeedEvent::page_view(s, visit, path, at))
        .await
        .expect("seed event");
}

#[tokio::test]
async fn funnel_counts_only_later_completions() {
    let (store, engine, website_id) = setup().await;
    for i in 0..100u32 {
        let s = session(&store, website_id, at(2, 9, 0)).await;
        match i {
            0..=17 => {
                custom(&store, &s, "Start Free Trial", at(2, 10, 0)).await;
                custom(&store, &s, "Purchase", at(2, 10, 5)).await;
            }
            // Purchase before the trial start does not convert.
            18 => {
                custom(&store, &s, "Purchase", at(2, 9, 30)).await;
                custom(&store, &s, "Start Free Trial", at(2, 10, 0)).await;
            }
            _ => custom(&store, &s, "Start Free Trial", at(2, 10, 0)).await,
        }
    }

    let query = FunnelQuery {
        from_event: "Start Free Trial".to_string(),
        to_event: "Purchase".to_string(),
    };
    let result = engine.funnel(&july(website_id), &query).await.expect("funnel");
    assert_eq!(result.started, 100);
    assert_eq!(result.converted, 18);
    assert_eq!(result.conversion_rate, 18.0);
}

#[tokio::test]
async fn funnel_with_no_starts_is_zero_not_error() {
    let (_store, engine, website_id) = setup().await;
    let query = FunnelQuery {
        from_event: "Nothing".to_string(),
        to_event: "Purchase".to_string(),
    };
    let result = engine.funnel(&july(website_id), &query).await.expect("funnel");
    assert_eq!(result.started, 0);
    assert_eq!(result.converted, 0);
    assert_eq!(result.conversion_rate, 0.0);
}

#[tokio::test]
async fn dropoff_sessions_partition_sessions_with_events() {
    let (store, engine, website_id) = setup().await;
    let journeys: [&[&str]; 4] = [&["A", "B", "C"], &["A", "B"], &["A"], &["B", "A"]];
    for journey in journeys {
        let s = session(&store, website_id, at(3, 8, 0)).await;
        for (i, name) in journey.iter().enumerate() {
            custom(&store, &s, name, at(3, 9, i as u32)).await;
        }
    }

    let rows = engine.dropoff(&july(website_id)).await.expect("dropoff");
    let summary: Vec<_> = rows
        .iter()
        .map(|r| (r.event_name.as_str(), r.sessions_with_event, r.dropoff_sessions))
        .collect();
    assert_eq!(summary, [("A", 4, 2), ("B", 3, 1), ("C", 1, 1)]);
    assert!(rows.iter().all(|r| r.dropoff_sessions <= r.sessions_with_event));
    assert_eq!(rows.iter().map(|r| r.dropoff_sessions).sum::<i64>(), 4);
    assert_eq!(rows[0].dropoff_rate, 50.0);

    let again = engine.dropoff(&july(website_id)).await.expect("dropoff");
    assert_eq!(rows, again);
}

#[tokio::test]
async fn activation_requires_same_day_as_first_touch() {
    let (store, engine, website_id) = setup().await;

    let same_day = session(&store, website_id, at(4, 8, 0)).await;
    view(&store, &same_day, Uuid::new_v4(), "/", at(4, 9, 0)).await;
    custom(&store, &same_day, "signup", at(4, 23, 0)).await;

    let next_day = session(&store, website_id, at(4, 8, 0)).await;
    view(&store, &next_day, Uuid::new_v4(), "/", at(4, 9, 0)).await;
    custom(&store, &next_day, "signup", at(5, 0, 30)).await;

    let never = session(&store, website_id, at(4, 8, 0)).await;
    view(&store, &never, Uuid::new_v4(), "/", at(4, 9, 0)).await;

    let query = ActivationQuery {
        event_name: "signup".to_string(),
    };
    let result = engine
        .activation(&july(website_id), &query)
        .await
        .expect("activation");
    assert_eq!(result.total_sessions, 3);
    assert_eq!(result.activated_sessions, 1);
    assert_eq!(result.activation_rate, 33.33);
}

#[tokio::test]
async fn path_transitions_include_exit_edge() {
    let (store, engine, website_id) = setup().await;
    let s = session(&store, website_id, at(6, 8, 0)).await;
    let visit = Uuid::new_v4();
    view(&store, &s, visit, "/a", at(6, 9, 0)).await;
    view(&store, &s, visit, "/b", at(6, 9, 1)).await;
    view(&store, &s, visit, "/c", at(6, 9, 2)).await;

    let rows = engine
        .path_transitions(&july(website_id), &PathQuery::default())
        .await
        .expect("paths");
    let edges: Vec<_> = rows
        .iter()
        .map(|r| (r.from_path.as_deref(), r.to_path.as_deref(), r.transitions))
        .collect();
    assert_eq!(
        edges,
        [
            (Some("/a"), Some("/b"), 1),
            (Some("/b"), Some("/c"), 1),
            (Some("/c"), None, 1),
        ]
    );
    assert_eq!(rows.iter().map(|r| r.transitions).sum::<i64>(), 3);
}

#[tokio::test]
async fn path_normalization_is_opt_in() {
    let (store, engine, website_id) = setup().await;
    let s = session(&store, website_id, at(6, 8, 0)).await;
    let visit = Uuid::new_v4();
    view(&store, &s, visit, "/Pricing?ref=ad", at(6, 9, 0)).await;
    view(&store, &s, visit, "/docs#Intro", at(6, 9, 1)).await;

    let raw = engine
        .path_transitions(&july(website_id), &PathQuery { normalize: false })
        .await
        .expect("raw paths");
    let step = raw.iter().find(|r| r.to_path.is_some()).expect("inner transition");
    assert_eq!(step.from_path.as_deref(), Some("/Pricing?ref=ad"));
    assert_eq!(step.to_path.as_deref(), Some("/docs#Intro"));

    let normalized = engine
        .path_transitions(&july(website_id), &PathQuery { normalize: true })
        .await
        .expect("normalized paths");
    let step = normalized
        .iter()
        .find(|r| r.to_path.is_some())
        .expect("inner transition");
    assert_eq!(step.from_path.as_deref(), Some("/pricing"));
    assert_eq!(step.to_path.as_deref(), Some("/docs"));
}

#[tokio::test]
async fn bounce_rate_counts_single_view_visits() {
    let (store, engine, website_id) = setup().await;
    for i in 0..50u32 {
        let s = session(&store, website_id, at(7, 8, 0)).await;
        let visit = Uuid::new_v4();
        view(&store, &s, visit, "/", at(7, 9, 0)).await;
        if i >= 12 {
            view(&store, &s, visit, "/pricing", at(7, 9, 1)).await;
        }
    }

    let buckets = engine
        .bounce_rate(&july(website_id), Granularity::Day)
        .await
        .expect("bounce");
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].bucket_start, "2025-07-07");
    assert_eq!(buckets[0].visits, 50);
    assert_eq!(buckets[0].bounces, 12);
    assert_eq!(buckets[0].bounce_rate, 24.0);
}

#[tokio::test]
async fn bounce_visit_spanning_midnight_is_counted_once_by_first_view() {
    let (store, engine, website_id) = setup().await;
    let s = session(&store, website_id, at(8, 23, 0)).await;
    let visit = Uuid::new_v4();
    view(&store, &s, visit, "/", at(8, 23, 59)).await;
    view(&store, &s, visit, "/next", at(9, 0, 1)).await;

    let buckets = engine
        .bounce_rate(&july(website_id), Granularity::Day)
        .await
        .expect("bounce");
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].bucket_start, "2025-07-08");
    assert_eq!(buckets[0].bounces, 0);
}

#[tokio::test]
async fn bounce_measures_whole_visits_across_window_edges() {
    let (store, engine, website_id) = setup().await;
    let june_30 = Utc
        .with_ymd_and_hms(2025, 6, 30, 23, 59, 0)
        .single()
        .expect("valid timestamp");
    let aug_1 = Utc
        .with_ymd_and_hms(2025, 8, 1, 0, 1, 0)
        .single()
        .expect("valid timestamp");

    // Starts before the window: not reported, and never a July bounce.
    let early = session(&store, website_id, june_30).await;
    let early_visit = Uuid::new_v4();
    view(&store, &early, early_visit, "/", june_30).await;
    view(&store, &early, early_visit, "/pricing", at(1, 0, 1)).await;

    // Starts inside the window: its August view still counts.
    let late = session(&store, website_id, at(31, 23, 58)).await;
    let late_visit = Uuid::new_v4();
    view(&store, &late, late_visit, "/", at(31, 23, 59)).await;
    view(&store, &late, late_visit, "/docs", aug_1).await;

    let buckets = engine
        .bounce_rate(&july(website_id), Granularity::Day)
        .await
        .expect("bounce");
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].bucket_start, "2025-07-31");
    assert_eq!(buckets[0].visits, 1);
    assert_eq!(buckets[0].bounces, 0);
}

#[tokio::test]
async fn revenue_buckets_sum_to_single_shot_total() {
    let (store, engine, website_id) = setup().await;
    let amounts = [(1, 10.5), (2, 20.25), (9, 5.0), (15, 100.0), (30, 0.25)];
    for (day, amount) in amounts {
        let s = session(&store, website_id, at(day, 8, 0)).await;
        store
            .seed_revenue(&s, amount, at(day, 9, 0))
            .await
            .expect("seed revenue");
    }

    let daily = engine
        .arpu_revenue(&july(website_id), Granularity::Day)
        .await
        .expect("daily");
    let weekly = engine
        .arpu_revenue(&july(website_id), Granularity::Week)
        .await
        .expect("weekly");
    let monthly = engine
        .arpu_revenue(&july(website_id), Granularity::Month)
        .await
        .expect("monthly");

    assert_eq!(daily.len(), 31);
    assert_eq!(daily.iter().filter(|b| b.revenue > 0.0).count(), 5);
    assert_eq!(daily[2].bucket_start, "2025-07-03");
    assert_eq!(daily[2].revenue, 0.0);
    assert_eq!(weekly.len(), 5);
    assert_eq!(monthly.len(), 1);
    assert_eq!(monthly[0].bucket_start, "2025-07-01");
    let total = monthly[0].revenue;
    assert!((total - 136.0).abs() < 1e-9);
    assert!((daily.iter().map(|b| b.revenue).sum::<f64>() - total).abs() < 1e-9);
    assert!((weekly.iter().map(|b| b.revenue).sum::<f64>() - total).abs() < 1e-9);
    // Weeks start on Monday: 2025-07-01 is a Tuesday.
    assert_eq!(weekly[0].bucket_start, "2025-06-30");
}

#[tokio::test]
async fn paying_model_ignores_zero_revenue() {
    let (store, engine, website_id) = setup().await;
    let payer = session(&store, website_id, at(10, 8, 0)).await;
    store.seed_revenue(&payer, 12.0, at(10, 9, 0)).await.expect("revenue");
    store.seed_revenue(&payer, 3.0, at(10, 9, 5)).await.expect("revenue");
    let freebie = session(&store, website_id, at(10, 8, 0)).await;
    store.seed_revenue(&freebie, 0.0, at(10, 9, 0)).await.expect("revenue");
    custom(&store, &freebie, "visit", at(10, 9, 0)).await;
    custom(&store, &payer, "visit", at(10, 9, 0)).await;

    let paying = engine
        .arpu_users(&july(website_id), Granularity::Day, UserModel::Paying)
        .await
        .expect("paying");
    assert_eq!(paying.len(), 31);
    assert_eq!(paying[9].bucket_start, "2025-07-10");
    assert_eq!(paying[9].user_count, 1);
    assert_eq!(paying.iter().map(|b| b.user_count).sum::<i64>(), 1);

    let active = engine
        .arpu_users(&july(website_id), Granularity::Day, UserModel::Active)
        .await
        .expect("active");
    assert_eq!(active[9].user_count, 2);

    let arpu = engine
        .arpu(&july(website_id), Granularity::Day, UserModel::Paying)
        .await
        .expect("arpu");
    assert_eq!(arpu[9].revenue, 15.0);
    assert_eq!(arpu[9].arpu, 15.0);
    assert_eq!(arpu[0].users, 0);
    assert_eq!(arpu[0].arpu, 0.0);
}

#[tokio::test]
async fn revenue_honors_segment_and_event_filters() {
    let (store, engine, website_id) = setup().await;
    let german = SeedSession::new(website_id, at(12, 8, 0)).country("DE");
    store.seed_session(&german).await.expect("seed session");
    let american = SeedSession::new(website_id, at(12, 8, 0)).country("US");
    store.seed_session(&american).await.expect("seed session");
    for s in [&german, &american] {
        view(&store, s, s.session_id, "/checkout", at(12, 9, 0)).await;
    }
    custom(&store, &german, "Checkout", at(12, 9, 1)).await;
    custom(&store, &american, "Browse", at(12, 9, 1)).await;
    store.seed_revenue(&german, 10.0, at(12, 9, 2)).await.expect("revenue");
    store.seed_revenue(&american, 20.0, at(12, 9, 2)).await.expect("revenue");

    let mut by_country = july(website_id);
    by_country.segment.country = Some("DE".to_string());
    let revenue = engine
        .arpu_revenue(&by_country, Granularity::Month)
        .await
        .expect("revenue by country");
    assert_eq!(revenue[0].revenue, 10.0);
    let payers = engine
        .arpu_users(&by_country, Granularity::Month, UserModel::Paying)
        .await
        .expect("payers by country");
    assert_eq!(payers[0].user_count, 1);

    let mut by_event = july(website_id);
    by_event.event_name = Some("Checkout".to_string());
    let arpu = engine
        .arpu(&by_event, Granularity::Month, UserModel::Paying)
        .await
        .expect("arpu by event");
    assert_eq!(arpu.len(), 1);
    assert_eq!(arpu[0].revenue, 10.0);
    assert_eq!(arpu[0].users, 1);
    assert_eq!(arpu[0].arpu, 10.0);

    let unfiltered = engine
        .arpu_revenue(&july(website_id), Granularity::Month)
        .await
        .expect("revenue");
    assert_eq!(unfiltered[0].revenue, 30.0);
}

#[tokio::test]
async fn churn_input_returns_raw_session_event_rows() {
    let (store, engine, website_id) = setup().await;
    let quiet = session(&store, website_id, at(1, 8, 0)).await;
    let busy = session(&store, website_id, at(2, 8, 0)).await;
    custom(&store, &busy, "open", at(2, 9, 0)).await;
    custom(&store, &busy, "close", at(2, 9, 5)).await;

    let filters = QueryFilters::new(
        website_id.to_string(),
        NaiveDate::from_ymd_opt(2025, 7, 20).expect("date"),
        NaiveDate::from_ymd_opt(2025, 7, 31).expect("date"),
    );

    let rows = engine
        .churn_input(&filters, &ChurnQuery { lookback_days: 30 })
        .await
        .expect("churn");
    let quiet_rows: Vec<_> = rows
        .iter()
        .filter(|r| r.session_id == quiet.session_id.to_string())
        .collect();
    assert_eq!(quiet_rows.len(), 1);
    assert!(quiet_rows[0].event_created_at.is_none());
    assert_eq!(quiet_rows[0].session_created_at, at(1, 8, 0));

    let busy_rows = rows
        .iter()
        .filter(|r| r.session_id == busy.session_id.to_string())
        .count();
    assert_eq!(busy_rows, 2);

    // A short lookback excludes both sessions.
    let rows = engine
        .churn_input(&filters, &ChurnQuery { lookback_days: 5 })
        .await
        .expect("churn");
    assert!(rows.is_empty());
}

#[tokio::test]
async fn click_through_rows_carry_session_attributes() {
    let (store, engine, website_id) = setup().await;
    let s = SeedSession::new(website_id, at(11, 8, 0))
        .country("DE")
        .device("mobile");
    store.seed_session(&s).await.expect("session");
    store
        .seed_event(&SeedEvent::page_view(&s, Uuid::new_v4(), "/landing", at(11, 9, 0)).utm_source("newsletter"))
        .await
        .expect("event");
    custom(&store, &s, "cta_click", at(11, 9, 1)).await;

    let rows = engine
        .click_through(&july(website_id))
        .await
        .expect("click-through");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].session_id, s.session_id.to_string());
    assert_eq!(rows[0].event_type, EventType::PageView);
    assert_eq!(rows[0].url_path, "/landing");
    assert_eq!(rows[0].utm_source.as_deref(), Some("newsletter"));
    assert_eq!(rows[0].country.as_deref(), Some("DE"));
    assert_eq!(rows[0].device.as_deref(), Some("mobile"));
    assert_eq!(rows[1].event_name.as_deref(), Some("cta_click"));
    assert_eq!(rows[1].created_at, at(11, 9, 1));
}

#[tokio::test]
async fn filters_are_conjunctive_and_window_is_half_open() {
    let (store, engine, website_id) = setup().await;
    let german = SeedSession::new(website_id, at(12, 8, 0)).country("DE");
    store.seed_session(&german).await.expect("session");
    let french = SeedSession::new(website_id, at(12, 8, 0)).country("FR");
    store.seed_session(&french).await.expect("session");
    custom(&store, &german, "signup", at(12, 9, 0)).await;
    custom(&store, &german, "other", at(12, 9, 1)).await;
    custom(&store, &french, "signup", at(12, 9, 0)).await;
    // Midnight after date_to falls outside the window.
    custom(&store, &german, "signup", at(13, 0, 0)).await;

    let mut filters = QueryFilters::new(
        website_id.to_string(),
        NaiveDate::from_ymd_opt(2025, 7, 12).expect("date"),
        NaiveDate::from_ymd_opt(2025, 7, 12).expect("date"),
    );
    filters.event_name = Some("signup".to_string());
    filters.segment.country = Some("DE".to_string());

    let rows = engine.click_through(&filters).await.expect("click-through");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].session_id, german.session_id.to_string());
    assert_eq!(rows[0].event_name.as_deref(), Some("signup"));
}

#[tokio::test]
async fn hostile_filter_values_are_bound_not_interpolated() {
    let (store, engine, website_id) = setup().await;
    let s = session(&store, website_id, at(14, 8, 0)).await;
    custom(&store, &s, "ok", at(14, 9, 0)).await;

    let mut filters = july(website_id);
    filters.event_name = Some("x'; DROP TABLE website_event; --".to_string());
    let rows = engine.dropoff(&filters).await.expect("dropoff");
    assert!(rows.is_empty());

    let still_there = engine.dropoff(&july(website_id)).await.expect("dropoff");
    assert_eq!(still_there.len(), 1);
}
