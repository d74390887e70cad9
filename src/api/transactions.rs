//! Admin transaction reporting. These routes never fail: an unreadable
//! backend degrades to an empty page, zero stats or zero counts.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::adapters::payment::adapt_payment_for_reporting;
use crate::api::{bearer_token, AppState};
use crate::backend::client::{BackendCall, BackendError};
use crate::services::transactions::{
    compute_stats, count_by_status, filter_and_page, TransactionCounts, TransactionPage,
    TransactionQuery, TransactionStats, WindowStats,
};

/// `data` of a backend payment list, or an error for non-2xx replies.
async fn fetch_payments(call: BackendCall) -> Result<Vec<JsonValue>, BackendError> {
    let body = call.send().await?.into_result()?;
    Ok(body
        .get("data")
        .and_then(|d| d.as_array())
        .cloned()
        .unwrap_or_default())
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// GET /api/admin/transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Json<TransactionPage> {
    let query = TransactionQuery::from_params(&params);
    info!(
        page = query.page,
        limit = query.limit,
        status = ?query.status,
        search = ?query.search,
        sort_by = %query.sort_by,
        "Fetching transactions"
    );

    let token = bearer_token(&headers);
    let call = state
        .backend
        .get("/payments")
        .bearer(token.as_deref())
        .query_opt("status", query.status.as_deref())
        .query_opt("from", query.start_date.as_deref())
        .query_opt("to", query.end_date.as_deref());

    match fetch_payments(call).await {
        Ok(payments) => {
            let adapted = payments.iter().map(adapt_payment_for_reporting).collect();
            let page = filter_and_page(adapted, &query);
            info!(
                total = page.pagination.total,
                returned = page.transactions.len(),
                "Transactions fetched"
            );
            Json(page)
        }
        Err(e) => {
            warn!(error = %e, "Failed to fetch transactions");
            Json(TransactionPage::empty())
        }
    }
}

/// GET /api/admin/transactions/stats
///
/// Compares the last seven days with the seven days before.
pub async fn transaction_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<TransactionStats> {
    let token = bearer_token(&headers);
    let now = Utc::now();
    let current_start = now - Duration::days(7);
    let previous_start = current_start - Duration::days(7);

    let current = state
        .backend
        .get("/payments")
        .bearer(token.as_deref())
        .query("from", iso(current_start));
    let previous = state
        .backend
        .get("/payments")
        .bearer(token.as_deref())
        .query("from", iso(previous_start))
        .query("to", iso(current_start));

    let (current, previous) = futures::join!(fetch_payments(current), fetch_payments(previous));

    let window = |result: Result<Vec<JsonValue>, BackendError>, label: &str| match result {
        Ok(payments) => WindowStats::from_payments(&payments),
        Err(BackendError::Status { status, .. }) => {
            warn!(window = label, status, "stats window unavailable, counting as empty");
            WindowStats::default()
        }
        Err(e) => {
            warn!(window = label, error = %e, "Failed to fetch transaction stats");
            WindowStats::default()
        }
    };

    let stats = compute_stats(&window(current, "current"), &window(previous, "previous"));
    info!(
        completed = stats.completed_transactions,
        failed = stats.failed_transactions,
        pending = stats.pending_transactions,
        "Transaction stats computed"
    );
    Json(stats)
}

/// GET /api/admin/transactions/counts
pub async fn transaction_counts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<TransactionCounts> {
    let token = bearer_token(&headers);
    let call = state.backend.get("/payments").bearer(token.as_deref());

    match fetch_payments(call).await {
        Ok(payments) => Json(count_by_status(&payments)),
        Err(e) => {
            warn!(error = %e, "Failed to fetch transaction counts");
            Json(TransactionCounts::default())
        }
    }
}
