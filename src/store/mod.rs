pub mod rest;
pub mod writer;

pub use rest::RestStore;
pub use writer::BatchWriter;

use crate::data::DerivedRow;
use crate::transport::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::str::FromStr;
use thiserror::Error;
use tracing::{info, warn};

/// Table holding one crush-margin row per trading date.
pub const MARGIN_TABLE: &str = "crush_margins";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Transport(#[from] FetchError),

    #[error("store rejected request with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("row for this date already exists: {0}")]
    UniqueViolation(String),

    #[error("store response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation(_))
    }
}

/// How a batch is sent to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Plain insert; duplicate dates are rejected by the table's unique key.
    #[default]
    Insert,
    /// Insert, replacing the existing row on a duplicate date.
    Upsert,
    /// Insert, leaving the existing row in place on a duplicate date.
    SkipExisting,
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "insert" => Ok(WriteMode::Insert),
            "upsert" => Ok(WriteMode::Upsert),
            "skip" | "skip-existing" => Ok(WriteMode::SkipExisting),
            other => Err(format!("unknown write mode '{}'", other)),
        }
    }
}

/// A derived row as stored in the margin table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersistedRecord {
    pub date: NaiveDate,
    pub soybean_oil_price: f64,
    pub soybean_meal_price: f64,
    pub soybean_no2_price: f64,
    pub oil_basis: f64,
    pub meal_basis: f64,
    pub gross_margin: f64,
    pub futures_margin: f64,
    pub oil_meal_ratio: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedRecord {
    pub fn from_row(row: &DerivedRow, updated_at: DateTime<Utc>) -> Self {
        Self {
            date: row.date,
            soybean_oil_price: row.soybean_oil_price,
            soybean_meal_price: row.soybean_meal_price,
            soybean_no2_price: row.soybean_no2_price,
            oil_basis: row.oil_basis,
            meal_basis: row.meal_basis,
            gross_margin: row.gross_margin,
            futures_margin: row.futures_margin,
            oil_meal_ratio: row.oil_meal_ratio,
            updated_at,
        }
    }
}

/// Remote table the pipeline reads its watermark from and appends to.
#[async_trait]
pub trait MarginStore: Send + Sync {
    /// Most recent persisted date, or `None` for an empty table.
    async fn latest_date(&self) -> Result<Option<NaiveDate>, StoreError>;

    /// Sends one batch and returns how many of its rows the table now holds from it.
    async fn insert_batch(
        &self,
        records: &[PersistedRecord],
        mode: WriteMode,
    ) -> Result<usize, StoreError>;
}

/// Reads the watermark, treating a failed read as "no watermark".
///
/// Failing open means a store outage leads to a full resend rather than a skipped
/// run; duplicates are then rejected by the table's unique key.
pub async fn read_watermark(store: &dyn MarginStore) -> Option<NaiveDate> {
    match store.latest_date().await {
        Ok(Some(date)) => {
            info!(%date, "latest persisted date");
            Some(date)
        }
        Ok(None) => {
            info!("margin table is empty");
            None
        }
        Err(e) => {
            warn!(error = %e, "watermark read failed, treating every row as new");
            None
        }
    }
}

/// Keeps rows strictly newer than `watermark`; all rows when there is none.
pub fn filter_new(rows: Vec<DerivedRow>, watermark: Option<NaiveDate>) -> Vec<DerivedRow> {
    match watermark {
        Some(latest) => rows.into_iter().filter(|row| row.date > latest).collect(),
        None => rows,
    }
}
