use super::basis::{basis_url, parse_basis, BasisKind, BASIS_HEADERS};
use super::kline::{kline_url, parse_kline, KLINE_HEADERS, SOYBEAN_NO2_SYMBOL};
use super::series::RawSeries;
use crate::transport::{fetch_text, Transport};
use chrono::{Local, Utc};
use std::sync::Arc;
use tracing::{error, info};

/// The three input series of one sync run.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    pub oil: RawSeries,
    pub meal: RawSeries,
    pub bean: RawSeries,
}

impl SourceSet {
    /// Labels of the sources that came back empty.
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("soybean oil", &self.oil),
            ("soybean meal", &self.meal),
            ("soybean no.2", &self.bean),
        ]
        .into_iter()
        .filter(|(_, series)| series.is_empty())
        .map(|(label, _)| label)
        .collect()
    }
}

/// Fetches and normalizes the upstream quote feeds.
///
/// Every fetch is infallible from the caller's point of view: a source that cannot
/// be reached or parsed comes back as an empty series, and the failure is logged.
///
/// # Key Features
/// * Basis and futures price for soybean oil and soybean meal
/// * Daily closes for the soybean No.2 contract
/// * Shares one transport (with its fallback policy) across all sources
pub struct DataIngestion {
    transport: Arc<dyn Transport>,
}

impl DataIngestion {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Fetches the basis series for one commodity.
    ///
    /// Bare `MM-DD` dates are completed against today's local date.
    pub async fn fetch_basis(&self, kind: BasisKind) -> RawSeries {
        let url = basis_url(kind, Utc::now().timestamp_millis());
        info!(commodity = kind.label(), "fetching basis data");

        match fetch_text(self.transport.as_ref(), &url, &BASIS_HEADERS).await {
            Ok(text) => {
                let series = parse_basis(&text, Local::now().date_naive());
                info!(commodity = kind.label(), rows = series.len(), "basis data fetched");
                series
            }
            Err(e) => {
                error!(commodity = kind.label(), error = %e, "basis source unavailable");
                RawSeries::empty()
            }
        }
    }

    /// Fetches the daily k-line closes for `symbol`.
    pub async fn fetch_kline(&self, symbol: &str) -> RawSeries {
        let url = kline_url(symbol, Utc::now().timestamp_millis());
        info!(symbol, "fetching k-line data");

        match fetch_text(self.transport.as_ref(), &url, &KLINE_HEADERS).await {
            Ok(text) => {
                let series = parse_kline(&text);
                info!(symbol, rows = series.len(), "k-line data fetched");
                series
            }
            Err(e) => {
                error!(symbol, error = %e, "k-line source unavailable");
                RawSeries::empty()
            }
        }
    }

    /// Fetches all three sources one after another.
    pub async fn fetch_all(&self) -> SourceSet {
        SourceSet {
            oil: self.fetch_basis(BasisKind::SoybeanOil).await,
            meal: self.fetch_basis(BasisKind::SoybeanMeal).await,
            bean: self.fetch_kline(SOYBEAN_NO2_SYMBOL).await,
        }
    }
}
