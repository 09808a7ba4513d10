//! Shared fixtures for the exportsrv integration tests

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, Response};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use common::sqlite::{SqliteClient, SqlitePool};
use common::test_utils::memory_pool;
use exportsrv::config::ExportsrvConfig;
use exportsrv::{create_routes, AppState, ExceptionLogger, ExportError};
use http_body_util::BodyExt;
use tower::util::ServiceExt;
use xda_model::codec::encode_time_domain;

/// Keeps every reported exception for assertions
#[derive(Default)]
pub struct RecordingLogger {
    pub errors: Mutex<Vec<String>>,
}

impl ExceptionLogger for RecordingLogger {
    fn log_exception(&self, err: &ExportError) {
        self.errors.lock().unwrap().push(err.to_string());
    }
}

impl RecordingLogger {
    pub fn count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub pool: SqlitePool,
    pub logger: Arc<RecordingLogger>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(ExportsrvConfig::default()).await
    }

    pub async fn with_config(config: ExportsrvConfig) -> Self {
        let pool = memory_pool().await.unwrap();
        let logger = Arc::new(RecordingLogger::default());
        let state = Arc::new(AppState::with_exception_logger(
            config,
            SqliteClient::from_pool(pool.clone()),
            logger.clone(),
        ));
        Self {
            state,
            pool,
            logger,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> Response<Body> {
        create_routes(self.state.clone()).oneshot(req).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

pub async fn body_text(resp: Response<Body>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(resp).await).unwrap()
}

pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

pub fn ms(n: i64) -> NaiveDateTime {
    t0() + Duration::milliseconds(n)
}

/// Meter 1 "M1" with an instantaneous VA (channel 1) and IA (channel 2)
pub async fn seed_meter(pool: &SqlitePool) {
    sqlx::query("INSERT INTO Meter (ID, AssetKey, Name) VALUES (1, 'M1-KEY', 'M1')")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO Channel (ID, MeterID, MeasurementTypeID, MeasurementCharacteristicID, PhaseID, Name)
         VALUES (1, 1, 1, 1, 1, 'VA'), (2, 1, 2, 1, 1, 'IA')",
    )
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_event(pool: &SqlitePool, id: i64, event_type_id: i64, start: NaiveDateTime, end: NaiveDateTime) {
    sqlx::query(
        "INSERT INTO Event (ID, MeterID, LineID, EventTypeID, StartTime, EndTime) VALUES (?, 1, NULL, ?, ?, ?)",
    )
    .bind(id)
    .bind(event_type_id)
    .bind(start)
    .bind(end)
    .execute(pool)
    .await
    .unwrap();
}

pub async fn seed_block(pool: &SqlitePool, event_id: i64, times: &[NaiveDateTime], channels: &[(i64, &[f64])]) {
    let blob = encode_time_domain(times, channels).unwrap();
    sqlx::query("INSERT INTO ChannelData (EventID, TimeDomainData) VALUES (?, ?)")
        .bind(event_id)
        .bind(blob)
        .execute(pool)
        .await
        .unwrap();
}

/// Event 42 on meter M1: VA has 3 samples, IA has 2
pub async fn seed_waveform_event(pool: &SqlitePool) {
    seed_meter(pool).await;
    seed_event(pool, 42, 1, ms(0), ms(2)).await;
    let va = [1.0, 2.0, 3.0];
    let ia = [0.5, -0.25];
    seed_block(pool, 42, &[ms(0), ms(1), ms(2)], &[(1, va.as_slice())]).await;
    seed_block(pool, 42, &[ms(0), ms(1)], &[(2, ia.as_slice())]).await;
}
