use super::{MarginStore, PersistedRecord, StoreError, WriteMode};
use crate::data::DerivedRow;
use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, warn};

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Outcome of a completed write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Rows accepted by the store.
    pub written: usize,
    /// Rows whose date the table already held.
    pub already_present: usize,
    pub batches: usize,
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("write stopped after {committed} of {attempted} rows: {source}")]
    Partial {
        committed: usize,
        attempted: usize,
        #[source]
        source: StoreError,
    },
}

/// Appends rows to the store in bounded batches.
pub struct BatchWriter<'a> {
    store: &'a dyn MarginStore,
    batch_size: usize,
    mode: WriteMode,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn MarginStore, batch_size: usize, mode: WriteMode) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            mode,
        }
    }

    /// Writes `rows` batch by batch, stamping each batch as it is serialized.
    ///
    /// A plain insert the store rejects over a duplicate date is sent again with
    /// `WriteMode::SkipExisting`, so the new rows in it still land and only the dates
    /// the table already holds count towards `WriteReport::already_present`.
    /// Any other failure stops the remaining batches.
    ///
    /// # Errors
    /// Returns `WriteError::Partial` with the number of rows committed before the failure
    pub async fn write(&self, rows: &[DerivedRow]) -> Result<WriteReport, WriteError> {
        let mut report = WriteReport::default();
        info!(rows = rows.len(), batch_size = self.batch_size, "writing new rows");

        for chunk in rows.chunks(self.batch_size) {
            let stamp = Utc::now();
            let records: Vec<PersistedRecord> = chunk
                .iter()
                .map(|row| PersistedRecord::from_row(row, stamp))
                .collect();

            let outcome = match self.store.insert_batch(&records, self.mode).await {
                Err(e) if e.is_unique_violation() && self.mode == WriteMode::Insert => {
                    warn!(
                        rows = records.len(),
                        error = %e,
                        "batch hit existing dates, resending without them"
                    );
                    self.store
                        .insert_batch(&records, WriteMode::SkipExisting)
                        .await
                }
                outcome => outcome,
            };

            match outcome {
                Ok(written) => {
                    let skipped = records.len().saturating_sub(written);
                    if skipped > 0 {
                        info!(skipped, "rows already present");
                    }
                    report.written += written;
                    report.already_present += skipped;
                }
                Err(e) => {
                    error!(
                        committed = report.written,
                        attempted = rows.len(),
                        error = %e,
                        "batch write failed, aborting remaining batches"
                    );
                    return Err(WriteError::Partial {
                        committed: report.written,
                        attempted: rows.len(),
                        source: e,
                    });
                }
            }
            report.batches += 1;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::processing::MergedRow;
    use crate::store::testing::MemoryStore;
    use chrono::{Duration, NaiveDate};

    fn rows(count: usize) -> Vec<DerivedRow> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..count)
            .map(|i| {
                DerivedRow::derive(MergedRow {
                    date: start + Duration::days(i as i64),
                    soybean_oil_price: 7000.0,
                    oil_basis: 200.0,
                    soybean_meal_price: 3000.0,
                    meal_basis: 100.0,
                    soybean_no2_price: 4500.0,
                })
            })
            .collect()
    }

    fn unavailable() -> StoreError {
        StoreError::Status {
            status: 500,
            body: "down".to_string(),
        }
    }

    #[tokio::test]
    async fn splits_rows_into_bounded_batches() {
        let store = MemoryStore::default();
        let report = BatchWriter::new(&store, DEFAULT_BATCH_SIZE, WriteMode::Insert)
            .write(&rows(120))
            .await
            .unwrap();

        assert_eq!(store.batch_sizes(), vec![50, 50, 20]);
        assert_eq!(
            report,
            WriteReport {
                written: 120,
                already_present: 0,
                batches: 3
            }
        );
    }

    #[tokio::test]
    async fn fully_present_batch_is_not_fatal() {
        let existing = rows(2).into_iter().map(|r| r.date);
        let store = MemoryStore::default().holding(existing);
        let report = BatchWriter::new(&store, 2, WriteMode::Insert)
            .write(&rows(4))
            .await
            .unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.already_present, 2);
        assert_eq!(
            store.batch_modes(),
            vec![WriteMode::Insert, WriteMode::SkipExisting, WriteMode::Insert]
        );
    }

    #[tokio::test]
    async fn existing_dates_do_not_drop_new_rows_in_the_same_batch() {
        let all = rows(100);
        let store = MemoryStore::default().holding(all[..10].iter().map(|r| r.date));
        let report = BatchWriter::new(&store, DEFAULT_BATCH_SIZE, WriteMode::Insert)
            .write(&all)
            .await
            .unwrap();

        assert_eq!(
            report,
            WriteReport {
                written: 90,
                already_present: 10,
                batches: 2
            }
        );
        let expected: Vec<_> = all.iter().map(|r| r.date).collect();
        assert_eq!(store.persisted(), expected);
    }

    #[tokio::test]
    async fn failed_resend_aborts_the_rest() {
        let store = MemoryStore::default()
            .holding(rows(1).into_iter().map(|r| r.date))
            .then(Ok(()))
            .then(Err(unavailable()));
        let err = BatchWriter::new(&store, 2, WriteMode::Insert)
            .write(&rows(4))
            .await
            .unwrap_err();

        let WriteError::Partial { committed, .. } = err;
        assert_eq!(committed, 0);
        assert_eq!(store.batch_sizes(), vec![2, 2]);
    }

    #[tokio::test]
    async fn failed_batch_aborts_the_rest() {
        let store = MemoryStore::default().then(Ok(())).then(Err(unavailable()));
        let err = BatchWriter::new(&store, 2, WriteMode::Insert)
            .write(&rows(6))
            .await
            .unwrap_err();

        let WriteError::Partial {
            committed,
            attempted,
            ..
        } = err;
        assert_eq!((committed, attempted), (2, 6));
        assert_eq!(store.batch_sizes(), vec![2, 2]);
    }

    #[tokio::test]
    async fn mode_is_passed_through() {
        let store = MemoryStore::default();
        BatchWriter::new(&store, 10, WriteMode::Upsert)
            .write(&rows(1))
            .await
            .unwrap();
        assert_eq!(store.batches.lock().unwrap()[0].1, WriteMode::Upsert);
    }
}
