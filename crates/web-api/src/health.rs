//! Keeper health endpoint.
//!
//! Grades every keeper job from its recent runs and rolls the grades up
//! together with disabled vaults and recent error counts.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use vault_keeper::JOB_NAMES;
use vault_keeper_core::{AuditLevel, LevelCount, WorkerHealth};

use crate::state::AppState;

const DEFAULT_WINDOW_MINUTES: i64 = 60;

/// Job whose failure alone makes the keeper unhealthy.
const CRITICAL_WORKER: &str = "safety-check";

#[derive(Debug, Clone, Deserialize)]
pub struct WindowQuery {
    pub window_minutes: Option<i64>,
}

impl WindowQuery {
    fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let minutes = self
            .window_minutes
            .unwrap_or(DEFAULT_WINDOW_MINUTES)
            .clamp(1, 7 * 24 * 60);
        now - Duration::minutes(minutes)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    #[serde(flatten)]
    pub health: WorkerHealth,
    /// Seconds since the last run started.
    pub staleness_seconds: Option<i64>,
    /// "healthy", "degraded", or "unhealthy".
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DisabledVaultView {
    pub vault: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    /// WARN and above in the window.
    pub errors_in_window: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub workers: Vec<WorkerStatus>,
    pub error_counts: Vec<LevelCount>,
    pub disabled_vaults: Vec<DisabledVaultView>,
    pub summary: HealthSummary,
}

struct HealthThresholds {
    /// Minimum success rate for "healthy".
    healthy_rate: f64,
    /// Minimum success rate for "degraded".
    degraded_rate: f64,
}

const THRESHOLDS: HealthThresholds = HealthThresholds {
    healthy_rate: 0.95,
    degraded_rate: 0.5,
};

fn determine_status(health: &WorkerHealth, thresholds: &HealthThresholds) -> String {
    if health.runs == 0 {
        return "unhealthy".to_string();
    }
    match health.success_rate {
        r if r >= thresholds.healthy_rate => "healthy".to_string(),
        r if r >= thresholds.degraded_rate => "degraded".to_string(),
        _ => "unhealthy".to_string(),
    }
}

/// Grades every keeper job, including jobs with no runs in the window.
fn grade_workers(mut observed: Vec<WorkerHealth>, now: DateTime<Utc>) -> Vec<WorkerStatus> {
    for name in JOB_NAMES {
        if !observed.iter().any(|w| w.worker_name == name) {
            observed.push(WorkerHealth::from_counts(name.to_string(), 0, 0, None, None));
        }
    }
    observed.sort_by(|a, b| a.worker_name.cmp(&b.worker_name));

    observed
        .into_iter()
        .map(|health| WorkerStatus {
            staleness_seconds: health.last_seen.map(|seen| (now - seen).num_seconds()),
            status: determine_status(&health, &THRESHOLDS),
            health,
        })
        .collect()
}

fn overall_status(workers: &[WorkerStatus], disabled_vaults: usize) -> &'static str {
    if workers
        .iter()
        .any(|w| w.status == "unhealthy" && w.health.worker_name == CRITICAL_WORKER)
    {
        "unhealthy"
    } else if disabled_vaults > 0 || workers.iter().any(|w| w.status != "healthy") {
        "degraded"
    } else {
        "healthy"
    }
}

/// GET /api/health
///
/// # Errors
/// Returns `StatusCode::INTERNAL_SERVER_ERROR` if the store queries fail.
pub async fn health(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let now = Utc::now();
    let since = query.since(now);

    let observed = state.reports.worker_health(since).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to query worker health");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let error_counts = state.reports.error_counts(since).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to query error counts");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let workers = grade_workers(observed, now);
    let disabled_vaults: Vec<DisabledVaultView> = state
        .gateway
        .disabled_vaults()
        .into_iter()
        .map(|d| DisabledVaultView {
            vault: d.vault.to_raw(),
            reason: d.reason,
        })
        .collect();

    let summary = HealthSummary {
        healthy: workers.iter().filter(|w| w.status == "healthy").count(),
        degraded: workers.iter().filter(|w| w.status == "degraded").count(),
        unhealthy: workers.iter().filter(|w| w.status == "unhealthy").count(),
        errors_in_window: error_counts
            .iter()
            .filter(|c| c.level >= AuditLevel::Warn)
            .map(|c| c.count)
            .sum(),
    };

    Ok(Json(HealthResponse {
        status: overall_status(&workers, disabled_vaults.len()).to_string(),
        timestamp: now,
        workers,
        error_counts,
        disabled_vaults,
        summary,
    }))
}

/// GET /api/health/workers
///
/// # Errors
/// Returns `StatusCode::INTERNAL_SERVER_ERROR` if the store query fails.
pub async fn workers(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<WorkerHealth>>, StatusCode> {
    let since = query.since(Utc::now());
    let workers = state.reports.worker_health(since).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to query worker health");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(workers))
}
