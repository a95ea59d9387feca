use chrono::NaiveDate;
use serde_json::Value;
use std::collections::BTreeMap;

/// One dated observation from an upstream source.
///
/// Field names are source-specific (`price`/`basis` for the basis feed, `close`
/// for the k-line feed) and are mapped to their destination names at merge time.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub fields: BTreeMap<String, f64>,
}

impl SeriesPoint {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            fields: BTreeMap::new(),
        }
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.fields.insert(name.to_string(), value);
        self
    }

    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.get(name).copied()
    }
}

/// A normalized series from one source, ascending by date.
///
/// Duplicate dates are kept as delivered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSeries {
    points: Vec<SeriesPoint>,
}

impl RawSeries {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a series, sorting the points by date. The sort is stable so duplicate
    /// dates keep their delivery order.
    pub fn from_points(mut points: Vec<SeriesPoint>) -> Self {
        points.sort_by_key(|p| p.date);
        Self { points }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }
}

/// Parses the date formats the upstream feeds emit.
///
/// Accepts `YYYY-MM-DD`, `YYYY/MM/DD`, and either of those followed by a time part.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day_part = raw.split(|c| c == ' ' || c == 'T').next().unwrap_or(raw);

    NaiveDate::parse_from_str(day_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(day_part, "%Y/%m/%d"))
        .ok()
}

/// Reads a JSON number, or a string holding one. Non-finite values are rejected.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;

    number.is_finite().then_some(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_supported_date_shapes() {
        assert_eq!(parse_date("2024-01-05"), Some(day(2024, 1, 5)));
        assert_eq!(parse_date(" 2024/01/05 "), Some(day(2024, 1, 5)));
        assert_eq!(parse_date("2024-01-05 00:00:00"), Some(day(2024, 1, 5)));
        assert_eq!(parse_date("2024-02-30"), None);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn numeric_values_from_numbers_and_strings() {
        assert_eq!(value_as_f64(&json!(7000)), Some(7000.0));
        assert_eq!(value_as_f64(&json!("3012.5")), Some(3012.5));
        assert_eq!(value_as_f64(&json!("n/a")), None);
        assert_eq!(value_as_f64(&json!(null)), None);
        assert_eq!(value_as_f64(&json!("NaN")), None);
    }

    #[test]
    fn series_is_sorted_on_construction() {
        let series = RawSeries::from_points(vec![
            SeriesPoint::new(day(2024, 1, 3)).with("close", 3.0),
            SeriesPoint::new(day(2024, 1, 1)).with("close", 1.0),
        ]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.points()[0].date, day(2024, 1, 1));
        assert_eq!(series.points()[1].field("close"), Some(3.0));
    }
}
