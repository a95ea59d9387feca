use crate::config::Config;
use crate::data::{merge, DataIngestion};
use crate::store::{filter_new, read_watermark, BatchWriter, MarginStore, RestStore, WriteMode};
use crate::transport::{FallbackTransport, FetchError, Transport};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Error,
}

/// Structured outcome of one sync, relayed verbatim by the triggers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResult {
    pub status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_records: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SyncResult {
    pub fn success(new_records: usize) -> Self {
        Self {
            status: SyncStatus::Success,
            new_records: Some(new_records),
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Error,
            new_records: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }
}

/// The crush-margin sync pipeline.
///
/// Holds no data between runs; the only state is the watermark kept in the store.
pub struct CrushSync {
    ingestion: DataIngestion,
    store: Arc<dyn MarginStore>,
    batch_size: usize,
    write_mode: WriteMode,
}

impl CrushSync {
    pub fn new(
        ingestion: DataIngestion,
        store: Arc<dyn MarginStore>,
        batch_size: usize,
        write_mode: WriteMode,
    ) -> Self {
        Self {
            ingestion,
            store,
            batch_size,
            write_mode,
        }
    }

    /// Wires the pipeline to the live endpoints described by `config`.
    ///
    /// Sources and store share one transport: native HTTP with `curl` as fallback.
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let transport: Arc<dyn Transport> = Arc::new(FallbackTransport::standard(config.timeout)?);
        let store = RestStore::new(
            config.store_url.clone(),
            config.api_key.clone(),
            config.bearer_token.clone(),
            transport.clone(),
        );

        Ok(Self::new(
            DataIngestion::new(transport),
            Arc::new(store),
            config.batch_size,
            config.write_mode,
        ))
    }

    /// Runs one fetch, merge, filter and write cycle.
    ///
    /// # Behavior
    /// - Any empty source aborts the run before merging; nothing is written
    /// - A failed watermark read treats every merged row as new
    /// - No rows newer than the watermark reports zero new records
    /// - A failed batch stops the write and reports how many rows made it
    pub async fn sync(&self) -> SyncResult {
        info!("starting crush margin sync");

        let sources = self.ingestion.fetch_all().await;
        let missing = sources.missing();
        if !missing.is_empty() {
            error!(missing = ?missing, "one or more data sources failed, aborting sync");
            return SyncResult::error("Failed to fetch source data");
        }

        let rows = match merge(&sources.oil, &sources.meal, &sources.bean) {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "error processing source data");
                return SyncResult::error(format!("Processing fail: {}", e));
            }
        };
        info!(rows = rows.len(), "merged source data");

        if let Some(latest) = rows.last() {
            info!(
                date = %latest.date,
                spot_oil = latest.spot_oil,
                spot_meal = latest.spot_meal,
                gross_margin = latest.gross_margin,
                futures_margin = latest.futures_margin,
                oil_basis_rate = ?latest.oil_basis_rate(),
                "latest crush margin"
            );
        }

        let watermark = read_watermark(self.store.as_ref()).await;
        let new_rows = filter_new(rows, watermark);
        if new_rows.is_empty() {
            info!("no new records to sync");
            return SyncResult::success(0);
        }

        let writer = BatchWriter::new(self.store.as_ref(), self.batch_size, self.write_mode);
        match writer.write(&new_rows).await {
            Ok(report) => {
                info!(
                    written = report.written,
                    already_present = report.already_present,
                    batches = report.batches,
                    "sync complete"
                );
                SyncResult::success(report.written)
            }
            Err(e) => SyncResult::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::MemoryStore;
    use crate::store::StoreError;
    use crate::transport::testing::StubTransport;
    use chrono::NaiveDate;

    const OIL: &str = r#"{"data": {"category": ["2024-01-02", "2024-01-03", "2024-01-04"],
        "price": [7000, 7010, 7020], "basis": [200, 200, 200]}}"#;
    const MEAL: &str = r#"{"data": {"category": ["2024-01-02", "2024-01-03", "2024-01-04"],
        "price": [3000, 3010, 3020], "basis": [100, 100, 100]}}"#;
    const BEAN: &str = r#"var _B0=([{"d":"2024-01-02","c":"4500"},{"d":"2024-01-03","c":"4510"},{"d":"2024-01-04","c":"4520"}]);"#;

    fn live_sources() -> StubTransport {
        StubTransport::new()
            .route("type=Y", 200, OIL)
            .route("type=M", 200, MEAL)
            .route("getDailyKLine", 200, BEAN)
    }

    fn pipeline(transport: StubTransport, store: Arc<MemoryStore>) -> CrushSync {
        CrushSync::new(
            DataIngestion::new(Arc::new(transport)),
            store,
            50,
            WriteMode::Insert,
        )
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[tokio::test]
    async fn all_sources_empty_is_an_error_without_writes() {
        let store = Arc::new(MemoryStore::default());
        let transport = StubTransport::new().fail("https://", "offline");
        let result = pipeline(transport, store.clone()).sync().await;

        assert_eq!(result.status, SyncStatus::Error);
        assert_eq!(result.message.as_deref(), Some("Failed to fetch source data"));
        assert!(store.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn one_empty_source_aborts() {
        let store = Arc::new(MemoryStore::default());
        let transport = StubTransport::new()
            .route("type=Y", 200, OIL)
            .route("type=M", 200, MEAL)
            .route("getDailyKLine", 200, "var _B0=null;");
        let result = pipeline(transport, store.clone()).sync().await;

        assert!(!result.is_success());
        assert!(store.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn rows_at_or_before_watermark_are_not_written() {
        let store = Arc::new(MemoryStore::with_latest(Some(day(4))));
        let result = pipeline(live_sources(), store.clone()).sync().await;

        assert_eq!(result, SyncResult::success(0));
        assert!(store.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn only_rows_after_watermark_are_written() {
        let store = Arc::new(MemoryStore::with_latest(Some(day(2))));
        let result = pipeline(live_sources(), store.clone()).sync().await;

        assert_eq!(result, SyncResult::success(2));
        let batches = store.batches.lock().unwrap();
        let dates: Vec<_> = batches[0].0.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![day(3), day(4)]);
    }

    #[tokio::test]
    async fn unreadable_watermark_writes_everything() {
        let store = Arc::new(MemoryStore::failing_reads());
        let result = pipeline(live_sources(), store.clone()).sync().await;

        assert_eq!(result, SyncResult::success(3));
        assert_eq!(store.batch_sizes(), vec![3]);
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let store = Arc::new(MemoryStore::default().then(Err(StoreError::Status {
            status: 500,
            body: "down".to_string(),
        })));
        let result = pipeline(live_sources(), store.clone()).sync().await;

        assert_eq!(result.status, SyncStatus::Error);
        assert!(result.message.unwrap().contains("after 0 of 3 rows"));
    }

    #[tokio::test]
    async fn rows_already_synced_elsewhere_count_as_done() {
        let store = Arc::new(MemoryStore::default().holding([day(2), day(3), day(4)]));
        let result = pipeline(live_sources(), store.clone()).sync().await;

        assert_eq!(result, SyncResult::success(0));
        assert_eq!(store.persisted(), vec![day(2), day(3), day(4)]);
    }

    #[tokio::test]
    async fn unreadable_watermark_still_fills_gaps_next_to_existing_dates() {
        let store = Arc::new(MemoryStore::failing_reads().holding([day(2)]));
        let result = pipeline(live_sources(), store.clone()).sync().await;

        assert_eq!(result, SyncResult::success(2));
        assert_eq!(store.persisted(), vec![day(2), day(3), day(4)]);
    }

    #[test]
    fn result_serializes_without_absent_fields() {
        let value = serde_json::to_value(SyncResult::success(4)).unwrap();
        assert_eq!(value, serde_json::json!({"status": "success", "new_records": 4}));

        let value = serde_json::to_value(SyncResult::error("boom")).unwrap();
        assert_eq!(value, serde_json::json!({"status": "error", "message": "boom"}));
    }
}
