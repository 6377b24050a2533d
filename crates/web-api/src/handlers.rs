use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vault_keeper::PositionError;
use vault_keeper_core::{
    AuditFilter, AuditLevel, AuditLogEntry, NewPosition, PnlSummary, Position, VaultAddress,
};

use crate::state::AppState;

fn internal_error(context: &str, e: impl std::fmt::Display) -> StatusCode {
    tracing::error!(error = %e, "{context}");
    StatusCode::INTERNAL_SERVER_ERROR
}

fn position_error_status(e: &PositionError) -> StatusCode {
    match e {
        PositionError::NotFound(_) => StatusCode::NOT_FOUND,
        PositionError::InvalidTransition(_) | PositionError::Conflict(_) => StatusCode::CONFLICT,
        PositionError::InvalidDeposit(_) => StatusCode::BAD_REQUEST,
        PositionError::Store(e) => internal_error("Position store failure", e),
    }
}

fn parse_vault(address: &str) -> Result<VaultAddress, StatusCode> {
    VaultAddress::parse(address).map_err(|_| StatusCode::BAD_REQUEST)
}

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub level: Option<String>,
    pub component: Option<String>,
    /// Vault address in any accepted form.
    pub wallet: Option<String>,
    pub pair_id: Option<String>,
    pub position_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl AuditLogQuery {
    fn into_filter(self) -> Result<AuditFilter, StatusCode> {
        let level = self
            .level
            .map(|l| l.to_ascii_uppercase().parse::<AuditLevel>())
            .transpose()
            .map_err(|_| StatusCode::BAD_REQUEST)?;
        // Stored rows carry the raw form.
        let wallet = self
            .wallet
            .map(|w| parse_vault(&w).map(|v| v.to_raw()))
            .transpose()?;

        Ok(AuditFilter {
            level,
            component: self.component,
            wallet,
            pair_id: self.pair_id,
            position_id: self.position_id,
            from: self.from,
            to: self.to,
            limit: self.limit,
        })
    }
}

/// Lists audit rows, newest first.
///
/// # Errors
/// Returns `StatusCode::BAD_REQUEST` for an unknown level or unparsable
/// wallet, or `StatusCode::INTERNAL_SERVER_ERROR` if the query fails.
pub async fn audit_logs(
    State(state): State<AppState>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, StatusCode> {
    let filter = query.into_filter()?;
    let entries = state
        .reports
        .query_audit_logs(&filter)
        .await
        .map_err(|e| internal_error("Failed to query audit logs", e))?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub user_id: String,
    pub pair_id: String,
    pub vault_address: String,
    pub principal: Decimal,
    pub strategy_id: Option<i32>,
}

/// Records a user deposit as a `pending_entry` position.
///
/// # Errors
/// Returns `StatusCode::BAD_REQUEST` for an invalid address or deposit.
pub async fn create_position(
    State(state): State<AppState>,
    Json(req): Json<DepositRequest>,
) -> Result<(StatusCode, Json<Position>), StatusCode> {
    let new = NewPosition {
        user_id: req.user_id,
        pair_id: req.pair_id,
        vault_address: parse_vault(&req.vault_address)?,
        strategy_id: req.strategy_id.unwrap_or(1),
        principal: req.principal,
    };
    let position = state
        .positions
        .deposit(new)
        .await
        .map_err(|e| position_error_status(&e))?;
    Ok((StatusCode::CREATED, Json(position)))
}

/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the position does not exist.
pub async fn get_position(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Position>, StatusCode> {
    state
        .store
        .get_position(id)
        .await
        .map_err(|e| internal_error("Failed to load position", e))?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the position does not exist.
pub async fn position_pnl(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PnlSummary>, StatusCode> {
    state
        .store
        .get_position(id)
        .await
        .map_err(|e| internal_error("Failed to load position", e))?
        .ok_or(StatusCode::NOT_FOUND)?;

    let summary = state
        .reports
        .pnl_summary(id)
        .await
        .map_err(|e| internal_error("Failed to aggregate PnL", e))?;
    Ok(Json(summary))
}

/// Moves a live position to `processing_exit` after a user-confirmed exit.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the position does not exist, or
/// `StatusCode::CONFLICT` if its status cannot move to `processing_exit`.
pub async fn confirm_exit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Position>, StatusCode> {
    state
        .positions
        .confirm_exit(id)
        .await
        .map(Json)
        .map_err(|e| position_error_status(&e))
}

/// Closes a position whose exit settled.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the position does not exist, or
/// `StatusCode::CONFLICT` if it is not in `processing_exit`.
pub async fn confirm_closed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Position>, StatusCode> {
    state
        .positions
        .confirm_closed(id)
        .await
        .map(Json)
        .map_err(|e| position_error_status(&e))
}

#[derive(Debug, Serialize)]
pub struct EnableVaultResponse {
    pub vault: String,
    /// False if the vault was not disabled.
    pub was_disabled: bool,
}

/// Re-enables rebalancing for a vault disabled after a permanent failure.
///
/// # Errors
/// Returns `StatusCode::BAD_REQUEST` if the address does not parse.
pub async fn enable_vault(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<EnableVaultResponse>, StatusCode> {
    let vault = parse_vault(&address)?;
    let was_disabled = state.gateway.enable(&vault);
    Ok(Json(EnableVaultResponse {
        vault: vault.to_raw(),
        was_disabled,
    }))
}
