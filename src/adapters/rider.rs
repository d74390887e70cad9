use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Rider profile; accepts either backend casing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiderView {
    pub id: String,
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    #[serde(default, alias = "fullName")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub vehicle: Option<String>,
    #[serde(default, alias = "imageUrl")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub active: bool,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
    #[serde(default, alias = "updatedAt")]
    pub updated_at: Option<String>,
}

/// Riders from `data` or the whole body; unreadable entries are skipped.
pub fn adapt_riders(body: &JsonValue) -> Vec<RiderView> {
    let list = match body.get("data") {
        Some(data) if data.is_array() => data,
        _ => body,
    };
    list.as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_adapt_riders_accepts_both_casings() {
        let body = json!({
            "data": [
                { "id": "r1", "fullName": "Eric", "active": true, "imageUrl": "https://img" },
                { "id": "r2", "full_name": "Divine", "user_id": "u2" },
                { "name": "missing id" }
            ]
        });

        let riders = adapt_riders(&body);

        assert_eq!(riders.len(), 2);
        assert_eq!(riders[0].full_name.as_deref(), Some("Eric"));
        assert_eq!(riders[0].image_url.as_deref(), Some("https://img"));
        assert!(riders[0].active);
        assert_eq!(riders[1].user_id.as_deref(), Some("u2"));
        assert!(!riders[1].active);
    }
}
