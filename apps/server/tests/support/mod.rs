pub mod assertions;
pub mod properties;
pub mod shared;

use anyhow::Context as _;
use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use futures::FutureExt as _;
use sqlx::Connection as _;
use std::sync::Arc;
use clinic_queue::{
    api::create_router,
    config::QueueBackendKind,
    db::{MemoryQueueStore, MemorySequenceAllocator},
    queue::FixedClock,
    services::QueueService,
    AppState, Config,
};
use tower::ServiceExt as _;
use url::Url;
use uuid::Uuid;

pub use assertions::*;

/// Monday morning; every memory-backed app starts its clock here
pub fn start_of_clinic() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    /// Only memory-backed apps run on a controllable clock
    pub clock: Option<Arc<FixedClock>>,
    schema: Option<PostgresSchema>,
}

struct PostgresSchema {
    name: String,
    admin_database_url: String,
}

impl TestApp {
    /// Memory backend on a fixed clock
    pub async fn memory() -> anyhow::Result<Self> {
        let shared = shared::shared().await?;
        let config = shared.base_config.clone();

        let clock = Arc::new(FixedClock::new(start_of_clinic()));
        let queue = QueueService::builder(
            Arc::new(MemoryQueueStore::new()),
            Arc::new(MemorySequenceAllocator::new()),
        )
        .clock(clock.clone())
        .default_service_type(config.queue.default_service_type.clone())
        .build();

        let state = AppState::from_service(config, queue, None);
        let router = create_router(state.clone());

        Ok(Self {
            router,
            state,
            clock: Some(clock),
            schema: None,
        })
    }

    /// Postgres backend in a fresh schema, or `None` without a test database
    pub async fn postgres(configure: impl FnOnce(&mut Config)) -> anyhow::Result<Option<Self>> {
        let shared = shared::shared().await?;
        let Some(admin_database_url) = shared.database_url.clone() else {
            return Ok(None);
        };

        let mut config = shared.base_config.clone();
        config.queue.backend = QueueBackendKind::Postgres;
        configure(&mut config);

        // Per-test schema and DB pool.
        let schema = format!("test_{}", Uuid::new_v4().simple());
        let mut admin_conn = sqlx::PgConnection::connect(&admin_database_url)
            .await
            .context("connect admin db for schema create")?;
        sqlx::query(&format!(r#"CREATE SCHEMA "{}""#, schema))
            .execute(&mut admin_conn)
            .await
            .context("create test schema")?;

        config.database.url = with_search_path(&admin_database_url, &schema)?;
        config.database.run_migrations = true;
        config.database.pool_min_size = 0;
        // Concurrent claim tests need more than one connection
        config.database.pool_max_size = 8;
        config.database.pool_timeout_seconds = 30;
        config.database.statement_timeout_seconds = 30;
        config.database.lock_timeout_seconds = 5;

        let state = AppState::new(config)
            .await
            .context("initialize AppState")?;
        let router = create_router(state.clone());

        Ok(Some(Self {
            router,
            state,
            clock: None,
            schema: Some(PostgresSchema {
                name: schema,
                admin_database_url,
            }),
        }))
    }

    pub async fn cleanup(self) -> anyhow::Result<()> {
        if let Some(pool) = &self.state.db_pool {
            pool.close().await;
        }

        let Some(schema) = self.schema else {
            return Ok(());
        };
        let mut admin_conn = sqlx::PgConnection::connect(&schema.admin_database_url)
            .await
            .context("connect admin db for schema drop")?;
        sqlx::query(&format!(r#"DROP SCHEMA "{}" CASCADE"#, schema.name))
            .execute(&mut admin_conn)
            .await
            .context("drop test schema")?;

        Ok(())
    }

    /// Move the fixed clock forward; no-op for postgres-backed apps
    pub fn advance_minutes(&self, minutes: i64) {
        if let Some(clock) = &self.clock {
            clock.advance(chrono::Duration::minutes(minutes));
        }
    }

    pub async fn request(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<Bytes>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Bytes)> {
        self.request_with_extra_headers(method, path_and_query, body, &[])
            .await
    }

    pub async fn request_with_extra_headers(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<Bytes>,
        extra_headers: &[(&str, &str)],
    ) -> anyhow::Result<(StatusCode, HeaderMap, Bytes)> {
        let mut request = Request::builder()
            .method(method)
            .uri(path_and_query)
            .header("host", "clinic.example.org")
            .header("accept", "application/json")
            .header("content-type", "application/json")
            .body(match body {
                Some(bytes) => Body::from(bytes),
                None => Body::empty(),
            })
            .context("build request")?;

        for (name, value) in extra_headers {
            request.headers_mut().insert(
                name.parse::<HeaderName>().context("parse header name")?,
                value.parse::<HeaderValue>().context("parse header value")?,
            );
        }

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .context("dispatch request")?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .context("read response body")?;

        Ok((status, headers, body))
    }

    /// POST /queue/entries and return the created entry
    pub async fn enqueue(
        &self,
        patient_ref: &str,
        department: &str,
        priority: i32,
    ) -> anyhow::Result<serde_json::Value> {
        let body = serde_json::json!({
            "patient_ref": patient_ref,
            "department": department,
            "priority": priority,
        });
        let (status, _, body) = self
            .request(Method::POST, "/queue/entries", Some(to_json_body(&body)?))
            .await?;
        assert_status(status, StatusCode::CREATED, "enqueue");
        json_body(&body)
    }

    /// POST /queue/departments/{department}/claim
    pub async fn claim(
        &self,
        department: &str,
        caller_id: &str,
    ) -> anyhow::Result<(StatusCode, Bytes)> {
        let body = serde_json::json!({ "caller_id": caller_id });
        let (status, _, body) = self
            .request(
                Method::POST,
                &format!("/queue/departments/{department}/claim"),
                Some(to_json_body(&body)?),
            )
            .await?;
        Ok((status, body))
    }

    /// POST /queue/entries/{id}/transition
    pub async fn transition(
        &self,
        id: &str,
        status: &str,
        caller_id: &str,
    ) -> anyhow::Result<(StatusCode, Bytes)> {
        let body = serde_json::json!({ "status": status, "caller_id": caller_id });
        let (status, _, body) = self
            .request(
                Method::POST,
                &format!("/queue/entries/{id}/transition"),
                Some(to_json_body(&body)?),
            )
            .await?;
        Ok((status, body))
    }
}

type TestFn<'a> =
    std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + 'a>>;

/// Run `f` against a memory-backed app
pub async fn with_test_app<F>(f: F) -> anyhow::Result<()>
where
    F: for<'a> FnOnce(&'a TestApp) -> TestFn<'a>,
{
    let app = TestApp::memory().await?;
    run_and_cleanup(app, f).await
}

/// Run `f` against a postgres-backed app; skipped without TEST_DATABASE_URL
pub async fn with_postgres_app<F>(f: F) -> anyhow::Result<()>
where
    F: for<'a> FnOnce(&'a TestApp) -> TestFn<'a>,
{
    with_postgres_app_with_config(|_| {}, f).await
}

pub async fn with_postgres_app_with_config<C, F>(configure: C, f: F) -> anyhow::Result<()>
where
    C: FnOnce(&mut Config),
    F: for<'a> FnOnce(&'a TestApp) -> TestFn<'a>,
{
    let Some(app) = TestApp::postgres(configure).await? else {
        eprintln!("TEST_DATABASE_URL not set; skipping postgres test");
        return Ok(());
    };
    run_and_cleanup(app, f).await
}

async fn run_and_cleanup<F>(app: TestApp, f: F) -> anyhow::Result<()>
where
    F: for<'a> FnOnce(&'a TestApp) -> TestFn<'a>,
{
    let result = std::panic::AssertUnwindSafe(f(&app)).catch_unwind().await;
    let cleanup_result = app.cleanup().await;

    if let Err(e) = cleanup_result {
        eprintln!("test schema cleanup failed: {e:?}");
    }

    match result {
        Ok(r) => r,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

fn with_search_path(database_url: &str, schema: &str) -> anyhow::Result<String> {
    let mut url = Url::parse(database_url).context("parse database URL")?;
    url.query_pairs_mut()
        .append_pair("options", &format!("-c search_path={}", schema));
    Ok(url.to_string())
}
