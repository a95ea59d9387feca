//! Exchange daily k-line feed, served as JSONP.

use super::series::{parse_date, value_as_f64, RawSeries, SeriesPoint};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Soybean No.2 continuous contract.
pub const SOYBEAN_NO2_SYMBOL: &str = "B0";

pub const KLINE_HEADERS: [(&str, &str); 2] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    ),
    ("Referer", "https://finance.sina.com.cn/"),
];

pub fn kline_url(symbol: &str, millis: i64) -> String {
    format!(
        "https://stock2.finance.sina.com.cn/futures/api/jsonp.php/var%20_{symbol}=/InnerFuturesNewService.getDailyKLine?symbol={symbol}&_={millis}"
    )
}

/// One candle as the feed spells it; only the fields we use are kept.
#[derive(Debug, Deserialize)]
struct KlineEntry {
    #[serde(rename = "d")]
    date: Option<String>,
    #[serde(rename = "c")]
    close: Option<Value>,
}

/// Slice from the first `[` through the last `]`, dropping the JSONP wrapper.
fn extract_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

/// Parses a k-line response into a `close` series.
///
/// A response without a bracketed array, or whose array is not a list of objects,
/// yields an empty series.
pub fn parse_kline(text: &str) -> RawSeries {
    let Some(payload) = extract_array(text) else {
        warn!("k-line response has no JSON array");
        return RawSeries::empty();
    };

    let entries: Vec<KlineEntry> = match serde_json::from_str(payload) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "k-line array could not be decoded");
            return RawSeries::empty();
        }
    };

    let points = entries
        .into_iter()
        .filter_map(|entry| {
            let date = parse_date(entry.date.as_deref()?)?;
            let close = value_as_f64(entry.close.as_ref()?)?;
            Some(SeriesPoint::new(date).with("close", close))
        })
        .collect();

    RawSeries::from_points(points)
}
