//! Credit endpoints: balance snapshot, ledger history.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::models::{FreezeStatus, TransactionView};
use crate::auth::AuthUser;
use crate::gateway::state::AppState;
use crate::gateway::types::{ApiError, ApiResult, PageQuery, ok};
use crate::user::BalanceSnapshot;

/// Optional narrowing of the ledger history.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TransactionFilter {
    /// FROZEN, SETTLED or REFUNDED; absent means all.
    pub status: Option<String>,
}

impl TransactionFilter {
    fn status_enum(&self) -> Result<Option<FreezeStatus>, String> {
        match self.status.as_deref() {
            None | Some("") => Ok(None),
            Some("FROZEN") => Ok(Some(FreezeStatus::Frozen)),
            Some("SETTLED") => Ok(Some(FreezeStatus::Settled)),
            Some("REFUNDED") => Ok(Some(FreezeStatus::Refunded)),
            Some(other) => Err(format!("unknown status {other:?}")),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionPage {
    pub items: Vec<TransactionView>,
    pub total: i64,
    pub page_num: i64,
    pub page_size: i64,
}

/// Balance snapshot
#[utoipa::path(
    get,
    path = "/api/v1/client/coin/balance",
    responses(
        (status = 200, description = "Balance, frozen and available", body = BalanceSnapshot)
    ),
    security(("bearer_auth" = [])),
    tag = "Credits"
)]
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<BalanceSnapshot> {
    match state.ledger.get_balance(auth.user_id).await {
        Ok(snapshot) => ok(snapshot),
        Err(e) => ApiError::db_error(e.to_string()).into_err(),
    }
}

/// Paginated ledger history
#[utoipa::path(
    get,
    path = "/api/v1/client/coin/transactions",
    params(PageQuery, TransactionFilter),
    responses(
        (status = 200, description = "Page of ledger entries", body = TransactionPage)
    ),
    security(("bearer_auth" = [])),
    tag = "Credits"
)]
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Query(page): Query<PageQuery>,
    Query(filter): Query<TransactionFilter>,
) -> ApiResult<TransactionPage> {
    let (page_num, page_size, _offset) = page.normalized();
    let status = match filter.status_enum() {
        Ok(status) => status,
        Err(msg) => return ApiError::bad_request(msg).into_err(),
    };
    match state
        .ledger
        .list_transactions(auth.user_id, status, page_num, Some(page_size))
        .await
    {
        Ok((items, total)) => ok(TransactionPage {
            items,
            total,
            page_num,
            page_size,
        }),
        Err(e) => ApiError::db_error(e.to_string()).into_err(),
    }
}
