//! Admin transaction reporting over the backend payment list: search, sort
//! and paging done locally, weekly stats and per-status counts.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::adapters::user::decimal_value;

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    pub page: u32,
    pub limit: u32,
    pub status: Option<String>,
    pub search: Option<String>,
    pub sort_by: String,
    pub sort_order: SortOrder,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
            status: None,
            search: None,
            sort_by: "createdAt".to_string(),
            sort_order: SortOrder::Desc,
            start_date: None,
            end_date: None,
        }
    }
}

impl TransactionQuery {
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        let text = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(|v| v.to_string())
        };
        let positive = |key: &str, default: u32| {
            text(key)
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(default)
        };

        let defaults = Self::default();
        Self {
            page: positive("page", DEFAULT_PAGE),
            limit: positive("limit", DEFAULT_LIMIT),
            status: text("status"),
            search: text("search"),
            sort_by: text("sortBy").unwrap_or(defaults.sort_by),
            sort_order: match text("sortOrder").as_deref() {
                Some("asc") => SortOrder::Asc,
                _ => SortOrder::Desc,
            },
            start_date: text("startDate").or_else(|| text("from")),
            end_date: text("endDate").or_else(|| text("to")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: usize,
    pub pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<JsonValue>,
    pub pagination: Pagination,
}

impl TransactionPage {
    /// What the listing answers with when the backend cannot be read.
    pub fn empty() -> Self {
        Self {
            transactions: Vec::new(),
            pagination: Pagination {
                page: DEFAULT_PAGE,
                limit: DEFAULT_LIMIT,
                total: 0,
                pages: 1,
            },
        }
    }
}

/// `createdAt` -> `created_at`.
pub fn to_snake_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 4);
    for ch in field.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn matches_search(payment: &JsonValue, needle: &str) -> bool {
    [
        "reference",
        "customer_name",
        "customerName",
        "customer_email",
        "kpay_transaction_id",
    ]
    .iter()
    .any(|field| {
        payment
            .get(*field)
            .and_then(|v| v.as_str())
            .map(|v| v.to_lowercase().contains(needle))
            .unwrap_or(false)
    })
}

fn sort_value<'a>(payment: &'a JsonValue, snake: &str, original: &str) -> Option<&'a JsonValue> {
    [snake, original]
        .iter()
        .filter_map(|field| payment.get(*field))
        .find(|v| crate::adapters::is_truthy(v))
}

fn compare_values(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(x)), Some(JsonValue::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => text_of(a).cmp(&text_of(b)),
    }
}

fn text_of(value: Option<&JsonValue>) -> String {
    match value {
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Applies search, sort and paging to already adapted payments.
pub fn filter_and_page(payments: Vec<JsonValue>, query: &TransactionQuery) -> TransactionPage {
    let mut filtered: Vec<JsonValue> = match &query.search {
        Some(search) => {
            let needle = search.to_lowercase();
            payments
                .into_iter()
                .filter(|p| matches_search(p, &needle))
                .collect()
        }
        None => payments,
    };

    let snake = to_snake_case(&query.sort_by);
    filtered.sort_by(|a, b| {
        let ordering = compare_values(
            sort_value(a, &snake, &query.sort_by),
            sort_value(b, &snake, &query.sort_by),
        );
        match query.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });

    let total = filtered.len();
    let limit = query.limit.max(1) as usize;
    let start = (query.page.max(1) as usize - 1).saturating_mul(limit);
    let transactions = filtered.into_iter().skip(start).take(limit).collect();

    TransactionPage {
        transactions,
        pagination: Pagination {
            page: query.page,
            limit: query.limit,
            total,
            pages: total.div_ceil(limit),
        },
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowStats {
    pub total_revenue: Decimal,
    pub completed: u64,
    pub failed: u64,
    pub pending: u64,
}

impl WindowStats {
    pub fn from_payments(payments: &[JsonValue]) -> Self {
        let mut stats = Self::default();
        for payment in payments {
            match payment.get("status").and_then(|v| v.as_str()) {
                Some("completed") => {
                    stats.completed += 1;
                    stats.total_revenue += decimal_value(payment.get("amount"));
                }
                Some("failed") => stats.failed += 1,
                Some("pending") => stats.pending += 1,
                _ => {}
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStats {
    #[serde(with = "rust_decimal::serde::float")]
    pub total_revenue: Decimal,
    pub completed_transactions: u64,
    pub failed_transactions: u64,
    pub pending_transactions: u64,
    pub revenue_change: f64,
    pub completed_change: f64,
    pub failed_change: f64,
    pub pending_change: f64,
}

/// Relative change in percent; zero when there is no previous value.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else {
        0.0
    }
}

pub fn compute_stats(current: &WindowStats, previous: &WindowStats) -> TransactionStats {
    let as_f64 = |d: Decimal| d.to_f64().unwrap_or(0.0);
    TransactionStats {
        total_revenue: current.total_revenue,
        completed_transactions: current.completed,
        failed_transactions: current.failed,
        pending_transactions: current.pending,
        revenue_change: percent_change(
            as_f64(current.total_revenue),
            as_f64(previous.total_revenue),
        ),
        completed_change: percent_change(current.completed as f64, previous.completed as f64),
        failed_change: percent_change(current.failed as f64, previous.failed as f64),
        pending_change: percent_change(current.pending as f64, previous.pending as f64),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionCounts {
    pub all: usize,
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub timeout: usize,
    pub total: usize,
}

pub fn count_by_status(payments: &[JsonValue]) -> TransactionCounts {
    let mut counts = TransactionCounts {
        all: payments.len(),
        total: payments.len(),
        ..Default::default()
    };
    for payment in payments {
        let status = payment
            .get("status")
            .and_then(|v| v.as_str())
            .map(|s| s.to_lowercase());
        match status.as_deref() {
            Some("pending") => counts.pending += 1,
            Some("completed") => counts.completed += 1,
            Some("failed") => counts.failed += 1,
            Some("timeout") => counts.timeout += 1,
            _ => {}
        }
    }
    counts
}
