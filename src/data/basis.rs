//! Futures-basis feed.
//!
//! The endpoint answers with `{"data": {...}}` where `data` holds parallel arrays:
//! one for the date axis, one for the futures price and one for the basis. Key names
//! drift between deployments, so they are resolved by fragment instead of by name.

use super::series::{parse_date, value_as_f64, RawSeries, SeriesPoint};
use chrono::{Datelike, NaiveDate};
use serde_json::{Map, Value};
use tracing::warn;

pub const BASIS_ENDPOINT: &str = "https://www.jiaoyifamen.com/tools/api/future-basis/query";

pub const BASIS_HEADERS: [(&str, &str); 4] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36 Edge/16.16299",
    ),
    ("Referer", "https://www.jiaoyifamen.com/"),
    ("Accept", "application/json, text/javascript, */*; q=0.01"),
    ("X-Requested-With", "XMLHttpRequest"),
];

pub const DATE_FRAGMENTS: &[&str] = &["category"];
pub const PRICE_FRAGMENTS: &[&str] = &["price"];
pub const BASIS_FRAGMENTS: &[&str] = &["basis"];

/// Commodities served by the basis feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasisKind {
    SoybeanOil,
    SoybeanMeal,
}

impl BasisKind {
    /// Commodity type code expected by the endpoint.
    pub fn code(&self) -> &'static str {
        match self {
            BasisKind::SoybeanOil => "Y",
            BasisKind::SoybeanMeal => "M",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BasisKind::SoybeanOil => "soybean oil",
            BasisKind::SoybeanMeal => "soybean meal",
        }
    }
}

/// Query URL for one commodity; `millis` busts intermediary caches.
pub fn basis_url(kind: BasisKind, millis: i64) -> String {
    format!("{}?type={}&t={}", BASIS_ENDPOINT, kind.code(), millis)
}

/// Resolves the first key containing any of `fragments`, compared case-insensitively.
///
/// Fragments are tried in order; within a fragment, keys are tried in document order.
pub fn resolve_key<'a>(keys: &[&'a str], fragments: &[&str]) -> Option<&'a str> {
    fragments.iter().find_map(|fragment| {
        let fragment = fragment.to_lowercase();
        keys.iter()
            .copied()
            .find(|key| key.to_lowercase().contains(&fragment))
    })
}

/// Completes a bare `MM-DD` date with the year it most plausibly belongs to.
///
/// A month later than `today`'s month can only be last year's, since the feed
/// never carries future dates.
pub fn infer_year(month: u32, day: u32, today: NaiveDate) -> Option<NaiveDate> {
    let year = if today.month() < month {
        today.year() - 1
    } else {
        today.year()
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn normalize_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.contains('-') && raw.chars().count() <= 5 {
        let (month, day) = raw.split_once('-')?;
        return infer_year(month.parse().ok()?, day.parse().ok()?, today);
    }
    parse_date(raw)
}

fn data_object(text: &str) -> Option<Map<String, Value>> {
    let envelope: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "basis response is not valid JSON");
            return None;
        }
    };

    match envelope {
        Value::Object(mut root) => match root.remove("data") {
            Some(Value::Object(data)) if !data.is_empty() => Some(data),
            _ => None,
        },
        _ => None,
    }
}

/// Parses a basis response into a `price`/`basis` series.
///
/// Any structural mismatch yields an empty series. Rows whose date cannot be
/// resolved or whose values are not numeric are dropped individually.
pub fn parse_basis(text: &str, today: NaiveDate) -> RawSeries {
    let Some(data) = data_object(text) else {
        warn!("basis response carries no data object");
        return RawSeries::empty();
    };

    let keys: Vec<&str> = data.keys().map(String::as_str).collect();
    let (Some(date_key), Some(price_key), Some(basis_key)) = (
        resolve_key(&keys, DATE_FRAGMENTS),
        resolve_key(&keys, PRICE_FRAGMENTS),
        resolve_key(&keys, BASIS_FRAGMENTS),
    ) else {
        warn!(keys = ?keys, "basis response is missing a date, price or basis column");
        return RawSeries::empty();
    };

    let (Some(dates), Some(prices), Some(bases)) = (
        data[date_key].as_array(),
        data[price_key].as_array(),
        data[basis_key].as_array(),
    ) else {
        warn!("basis columns are not arrays");
        return RawSeries::empty();
    };

    let points = dates
        .iter()
        .zip(prices)
        .zip(bases)
        .filter_map(|((date, price), basis)| {
            let date = normalize_date(date.as_str()?, today)?;
            Some(
                SeriesPoint::new(date)
                    .with("price", value_as_f64(price)?)
                    .with("basis", value_as_f64(basis)?),
            )
        })
        .collect();

    RawSeries::from_points(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn month_after_current_month_belongs_to_last_year() {
        let today = day(2024, 2, 10);
        assert_eq!(infer_year(12, 15, today), Some(day(2023, 12, 15)));
        assert_eq!(infer_year(1, 5, today), Some(day(2024, 1, 5)));
        assert_eq!(infer_year(2, 20, today), Some(day(2024, 2, 20)));
        assert_eq!(infer_year(2, 30, today), None);
    }

    #[test]
    fn key_resolution_is_case_insensitive_substring() {
        let keys = ["Category", "futuresPrice", "basisValue"];
        assert_eq!(resolve_key(&keys, DATE_FRAGMENTS), Some("Category"));
        assert_eq!(resolve_key(&keys, PRICE_FRAGMENTS), Some("futuresPrice"));
        assert_eq!(resolve_key(&keys, BASIS_FRAGMENTS), Some("basisValue"));
        assert_eq!(resolve_key(&keys, &["volume"]), None);
    }

    #[test]
    fn parses_and_sorts_with_inferred_years() {
        let text = r#"{"data": {
            "category": ["12-30", "01-02", "01-03"],
            "futuresPrice": [7100, "7200", 7300],
            "basisValue": [150, 160, 170, 999]
        }}"#;
        let series = parse_basis(text, day(2024, 2, 10));

        let dates: Vec<_> = series.points().iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(2023, 12, 30), day(2024, 1, 2), day(2024, 1, 3)]);
        assert_eq!(series.points()[1].field("price"), Some(7200.0));
        assert_eq!(series.points()[1].field("basis"), Some(160.0));
    }

    #[test]
    fn zips_to_shortest_column() {
        let text = r#"{"data": {"category": ["2024-01-02", "2024-01-03"], "price": [1], "basis": [2, 3]}}"#;
        assert_eq!(parse_basis(text, day(2024, 2, 10)).len(), 1);
    }

    #[test]
    fn full_dates_pass_through_and_bad_rows_are_dropped() {
        let text = r#"{"data": {
            "category": ["2024-01-02", "not-a-date", "13-40", "2024-01-05"],
            "price": [1, 2, 3, "x"],
            "basis": [1, 2, 3, 4]
        }}"#;
        let series = parse_basis(text, day(2024, 2, 10));
        assert_eq!(series.len(), 1);
        assert_eq!(series.points()[0].date, day(2024, 1, 2));
    }

    #[test]
    fn malformed_input_yields_empty_series() {
        let today = day(2024, 2, 10);
        assert!(parse_basis("", today).is_empty());
        assert!(parse_basis("<html>blocked</html>", today).is_empty());
        assert!(parse_basis(r#"{"data": {}}"#, today).is_empty());
        assert!(parse_basis(r#"{"data": null}"#, today).is_empty());
        assert!(parse_basis(r#"[1, 2]"#, today).is_empty());
        assert!(parse_basis(r#"{"data": {"category": ["2024-01-02"], "price": [1]}}"#, today).is_empty());
        assert!(parse_basis(r#"{"data": {"category": "x", "price": [1], "basis": [1]}}"#, today).is_empty());
    }

    #[test]
    fn url_carries_type_and_timestamp() {
        assert_eq!(
            basis_url(BasisKind::SoybeanMeal, 42),
            "https://www.jiaoyifamen.com/tools/api/future-basis/query?type=M&t=42"
        );
    }
}
