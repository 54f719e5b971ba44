//! Happy hour specials: what the dashboard shows for a given day.
//!
//! An active special stored for today always wins. Without one, a fixed
//! per-weekday table supplies the house specials; days missing from that
//! table have no special at all.

use chrono::Weekday;
use serde::Serialize;

use crate::types::HappyHourSpecial;

/// A special ready to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplaySpecial {
    pub name: String,
    pub description: String,
    pub price: String,
    /// Serving window, e.g. `4p – 8p`.
    pub time: Option<String>,
}

impl DisplaySpecial {
    fn fallback(name: &str, description: &str, price: &str, time: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            price: price.to_string(),
            time: Some(time.to_string()),
        }
    }
}

impl From<&HappyHourSpecial> for DisplaySpecial {
    fn from(record: &HappyHourSpecial) -> Self {
        let time = match (record.start_time.as_deref(), record.end_time.as_deref()) {
            (Some(start), Some(end)) => Some(format!("{start} – {end}")),
            (Some(only), None) | (None, Some(only)) => Some(only.to_string()),
            (None, None) => None,
        };

        Self {
            name: record.name.clone(),
            description: record.description.clone().unwrap_or_default(),
            price: record.price.clone().unwrap_or_default(),
            time,
        }
    }
}

/// Day index as stored in `happy_hour_specials.day_of_week` (0 = Sunday).
#[must_use]
pub fn day_index(weekday: Weekday) -> u8 {
    // num_days_from_sunday is always < 7
    u8::try_from(weekday.num_days_from_sunday()).unwrap_or(0)
}

/// The house special for `weekday` when nothing is stored for it.
#[must_use]
pub fn default_special(weekday: Weekday) -> Option<DisplaySpecial> {
    match weekday {
        Weekday::Sun => Some(DisplaySpecial::fallback(
            "Sunday Steak Night",
            "Garden Salad • Steak Frites • Glass of House Wine",
            "$40",
            "4p – 8p",
        )),
        Weekday::Wed => Some(DisplaySpecial::fallback(
            "Date Night",
            "2-Dine for $89 • 3-Course Menu • $5 Draft Beer • $10 House Wine",
            "$89",
            "4p – 8p",
        )),
        Weekday::Thu => Some(DisplaySpecial::fallback(
            "1837 Bar & Burger Night",
            "$12.50 Signature Burger OR Crispy Chicken • $5 Draft Beer • $10 House Wine",
            "$12.50",
            "4p – 8p",
        )),
        Weekday::Fri | Weekday::Sat => Some(DisplaySpecial::fallback(
            "Late Night Happy Hour",
            "$5 Draft Beer • $10 House Wines • $10 House Winner Cocktails • $2 Off Curated Cocktails",
            "Various",
            "8p – 11p",
        )),
        Weekday::Mon | Weekday::Tue => None,
    }
}

/// Pick what to show for `weekday`.
///
/// `record` is the stored active special for that day, if any. It is shown
/// verbatim; otherwise the house table applies.
#[must_use]
pub fn resolve_special(
    record: Option<&HappyHourSpecial>,
    weekday: Weekday,
) -> Option<DisplaySpecial> {
    record.map_or_else(|| default_special(weekday), |r| Some(r.into()))
}
