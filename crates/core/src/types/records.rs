//! Row types of the hosted tables read by the back office.
//!
//! Field names match the table columns so rows deserialize straight from the
//! table store's JSON.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{Item86Id, SpecialId, UserId, WineId};

/// Wine list category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WineCategory {
    Red,
    White,
    Sparkling,
}

/// A wine on the list (`wines`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wine {
    pub id: WineId,
    pub name: String,
    #[serde(default)]
    pub vintage: Option<String>,
    #[serde(default)]
    pub varietal: Option<String>,
    pub price: Decimal,
    pub category: WineCategory,
    #[serde(default)]
    pub region: Option<String>,
    /// Bin code printed on the menu (e.g. "R013").
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Wine {
    /// Price as shown on the dashboard, e.g. `$185` or `$12.5`.
    #[must_use]
    pub fn display_price(&self) -> String {
        format!("${}", self.price.normalize())
    }

    /// Region and vintage joined for display, skipping whichever is missing.
    #[must_use]
    pub fn origin_line(&self) -> String {
        [self.region.as_deref(), self.vintage.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// An item marked unavailable (`items_86`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item86 {
    pub id: Item86Id,
    pub name: String,
    #[serde(default)]
    pub added_by: Option<UserId>,
    #[serde(default)]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A happy hour special (`happy_hour_specials`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HappyHourSpecial {
    pub id: SpecialId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form display price ("$40", "Various").
    #[serde(default)]
    pub price: Option<String>,
    /// 0 = Sunday through 6 = Saturday.
    #[serde(default)]
    pub day_of_week: Option<u8>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_wine_from_table_json() {
        let json = r#"{
            "id": "3f2a1b7c-0d4e-4f5a-8b6c-9d0e1f2a3b4c",
            "name": "CRISTOM, EILEEN VYD., PINOT NOIR",
            "vintage": "2019",
            "price": 185,
            "category": "red",
            "region": "Eola-Amity Hills, Willamette Valley, OR",
            "code": "R013",
            "created_at": "2025-06-01T18:30:00.123456+00:00"
        }"#;

        let wine: Wine = serde_json::from_str(json).unwrap();
        assert_eq!(wine.category, WineCategory::Red);
        assert_eq!(wine.varietal, None);
        assert_eq!(wine.display_price(), "$185");
        assert_eq!(
            wine.origin_line(),
            "Eola-Amity Hills, Willamette Valley, OR, 2019"
        );
    }

    #[test]
    fn test_wine_fractional_price() {
        let json = r#"{
            "id": "3f2a1b7c-0d4e-4f5a-8b6c-9d0e1f2a3b4c",
            "name": "House Red",
            "price": 12.50,
            "category": "red",
            "created_at": "2025-06-01T18:30:00Z"
        }"#;

        let wine: Wine = serde_json::from_str(json).unwrap();
        assert_eq!(wine.display_price(), "$12.5");
        assert_eq!(wine.origin_line(), "");
    }

    #[test]
    fn test_item86_optional_columns() {
        let json = r#"{
            "id": "9a8b7c6d-5e4f-4a3b-2c1d-0e9f8a7b6c5d",
            "name": "Oysters",
            "created_at": "2025-06-02T01:00:00+00:00"
        }"#;

        let item: Item86 = serde_json::from_str(json).unwrap();
        assert_eq!(item.name, "Oysters");
        assert!(item.reason.is_none());
        assert!(item.added_by.is_none());
    }
}
