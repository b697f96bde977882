//! Read-only report endpoints.
//!
//! Each report is a fixed query. Running it is delegated to a
//! [`ReportSource`]; this module only maps routes to reports and rows to
//! JSON.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use super::router::AppState;

/// One result row, column name to value.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// The fixed reports served over HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Report {
    EventsHourly,
    EventsDaily,
    StatsHourly,
    StatsDaily,
    Poi,
}

impl Report {
    pub const ALL: [Report; 5] = [
        Report::EventsHourly,
        Report::EventsDaily,
        Report::StatsHourly,
        Report::StatsDaily,
        Report::Poi,
    ];

    pub fn route(&self) -> &'static str {
        match self {
            Report::EventsHourly => "/events/hourly",
            Report::EventsDaily => "/events/daily",
            Report::StatsHourly => "/stats/hourly",
            Report::StatsDaily => "/stats/daily",
            Report::Poi => "/poi",
        }
    }

    /// The query a SQL-backed source should run.
    pub fn query(&self) -> &'static str {
        match self {
            Report::EventsHourly => {
                "SELECT date, hour, events FROM public.hourly_events ORDER BY date, hour LIMIT 168"
            }
            Report::EventsDaily => {
                "SELECT date, SUM(events) AS events FROM public.hourly_events \
                 GROUP BY date ORDER BY date LIMIT 7"
            }
            Report::StatsHourly => {
                "SELECT date, hour, impressions, clicks, revenue FROM public.hourly_stats \
                 ORDER BY date, hour LIMIT 168"
            }
            Report::StatsDaily => {
                "SELECT date, SUM(impressions) AS impressions, SUM(clicks) AS clicks, \
                 SUM(revenue) AS revenue FROM public.hourly_stats \
                 GROUP BY date ORDER BY date LIMIT 7"
            }
            Report::Poi => "SELECT * FROM public.poi",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report {0:?} is not available")]
    Missing(Report),

    #[error("query failed: {0}")]
    Query(String),
}

/// Runs report queries.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch(&self, report: Report) -> Result<Vec<Row>, ReportError>;
}

/// Serves rows from a JSON snapshot keyed by report name:
///
/// ```json
/// { "events_daily": [ { "date": "2017-01-01", "events": 43 } ], "poi": [] }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SnapshotSource {
    rows: HashMap<Report, Vec<Row>>,
}

impl SnapshotSource {
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        let rows: HashMap<Report, Vec<Row>> = serde_json::from_str(json)
            .map_err(|e| crate::error::TollgateError::Config(format!("invalid report snapshot: {}", e)))?;
        Ok(Self { rows })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading report snapshot");

        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

#[async_trait]
impl ReportSource for SnapshotSource {
    async fn fetch(&self, report: Report) -> Result<Vec<Row>, ReportError> {
        self.rows
            .get(&report)
            .cloned()
            .ok_or(ReportError::Missing(report))
    }
}

pub async fn index() -> &'static str {
    "Welcome to EQ Works 😎"
}

pub async fn events_hourly(State(state): State<AppState>) -> Response {
    serve(&state, Report::EventsHourly).await
}

pub async fn events_daily(State(state): State<AppState>) -> Response {
    serve(&state, Report::EventsDaily).await
}

pub async fn stats_hourly(State(state): State<AppState>) -> Response {
    serve(&state, Report::StatsHourly).await
}

pub async fn stats_daily(State(state): State<AppState>) -> Response {
    serve(&state, Report::StatsDaily).await
}

pub async fn poi(State(state): State<AppState>) -> Response {
    serve(&state, Report::Poi).await
}

async fn serve(state: &AppState, report: Report) -> Response {
    let Some(source) = &state.reports else {
        return (StatusCode::SERVICE_UNAVAILABLE, "no report source configured").into_response();
    };

    match source.fetch(report).await {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => {
            error!(report = ?report, error = %e, "Report query failed");
            (StatusCode::BAD_GATEWAY, "report unavailable").into_response()
        }
    }
}
