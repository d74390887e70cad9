use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::str::FromStr;

use crate::payments::gateway::string_field;

/// Admin user listing row with order aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UserSummary {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub phone: String,
    pub created_at: Option<String>,
    pub role: String,
    pub roles: Vec<String>,
    #[serde(rename = "orderCount")]
    pub order_count: u64,
    #[serde(rename = "totalSpend", with = "rust_decimal::serde::float")]
    pub total_spend: Decimal,
}

/// Reads a JSON number or numeric string; anything else is zero.
pub fn decimal_value(value: Option<&JsonValue>) -> Decimal {
    match value {
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(Decimal::from_f64))
            .unwrap_or_default(),
        Some(JsonValue::String(s)) => Decimal::from_str(s.trim()).unwrap_or_default(),
        _ => Decimal::ZERO,
    }
}

/// Joins users with per-user order counts and spend.
pub fn summarize_users(users: &[JsonValue], orders: &[JsonValue]) -> Vec<UserSummary> {
    let mut stats: HashMap<String, (u64, Decimal)> = HashMap::new();
    for order in orders {
        let user_id = string_field(order, "userId").or_else(|| string_field(order, "user_id"));
        if let Some(user_id) = user_id {
            let entry = stats.entry(user_id).or_insert((0, Decimal::ZERO));
            entry.0 += 1;
            entry.1 += decimal_value(order.get("total"));
        }
    }

    users
        .iter()
        .filter_map(|user| {
            let id = string_field(user, "id")?;
            let roles: Vec<String> = match user.get("roles").and_then(|v| v.as_array()) {
                Some(list) => list
                    .iter()
                    .filter_map(|r| r.as_str().map(|s| s.to_string()))
                    .collect(),
                None => string_field(user, "role").into_iter().collect(),
            };
            let role = roles
                .first()
                .cloned()
                .or_else(|| string_field(user, "role"))
                .unwrap_or_else(|| "user".to_string());
            let (order_count, total_spend) =
                stats.get(&id).cloned().unwrap_or((0, Decimal::ZERO));

            Some(UserSummary {
                email: string_field(user, "email").unwrap_or_default(),
                full_name: string_field(user, "fullName")
                    .or_else(|| string_field(user, "full_name"))
                    .unwrap_or_default(),
                phone: string_field(user, "phone").unwrap_or_default(),
                created_at: string_field(user, "createdAt")
                    .or_else(|| string_field(user, "created_at")),
                role,
                roles,
                order_count,
                total_spend,
                id,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_summarize_users_aggregates_orders() {
        let users = vec![
            json!({ "id": "u1", "email": "a@b.rw", "fullName": "Aline", "roles": ["admin", "user"] }),
            json!({ "id": "u2", "role": "rider" }),
            json!({ "id": "u3" }),
        ];
        let orders = vec![
            json!({ "userId": "u1", "total": 1500 }),
            json!({ "user_id": "u1", "total": "2500.50" }),
            json!({ "userId": "u2", "total": null }),
            json!({ "total": 999 }),
        ];

        let summary = summarize_users(&users, &orders);

        assert_eq!(summary[0].role, "admin");
        assert_eq!(summary[0].order_count, 2);
        assert_eq!(summary[0].total_spend, Decimal::from_str("4000.50").unwrap());
        assert_eq!(summary[1].role, "rider");
        assert_eq!(summary[1].roles, vec!["rider".to_string()]);
        assert_eq!(summary[1].order_count, 1);
        assert_eq!(summary[2].role, "user");
        assert_eq!(summary[2].email, "");
    }

    #[test]
    fn test_summary_serializes_aggregates_in_camel_case() {
        let summary = summarize_users(&[json!({ "id": "u1" })], &[]);
        let value = serde_json::to_value(&summary[0]).unwrap();
        assert_eq!(value["orderCount"], 0);
        assert_eq!(value["totalSpend"], json!(0.0));
        assert_eq!(value["full_name"], "");
    }
}
