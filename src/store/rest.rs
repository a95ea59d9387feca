use super::{MarginStore, PersistedRecord, StoreError, WriteMode, MARGIN_TABLE};
use crate::data::series::parse_date;
use crate::transport::{HttpRequest, HttpResponse, Transport};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Postgres error code for a unique-key violation, echoed by the REST layer.
const UNIQUE_VIOLATION_CODE: &str = "23505";

#[derive(Debug, Deserialize)]
struct DateRow {
    date: String,
}

/// Error body returned by PostgREST on a failed request.
#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<String>,
}

/// Client for a PostgREST-style table API.
///
/// Every request carries the public API key in `apikey` and the write credential
/// as a bearer token.
pub struct RestStore {
    base_url: String,
    api_key: String,
    bearer_token: String,
    table: String,
    transport: Arc<dyn Transport>,
}

impl RestStore {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        bearer_token: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            bearer_token: bearer_token.into(),
            table: MARGIN_TABLE.to_string(),
            transport,
        }
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url.trim_end_matches('/'), self.table)
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.bearer_token))
            .header("Content-Type", "application/json")
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, StoreError> {
        let request = self.authorize(request);
        debug!(method = request.method.as_str(), url = %request.url, "store request");
        Ok(self.transport.execute(&request).await?)
    }
}

fn is_unique_violation(response: &HttpResponse) -> bool {
    if response.status == 409 {
        return true;
    }
    serde_json::from_str::<ApiError>(&response.body)
        .ok()
        .and_then(|error| error.code)
        .as_deref()
        == Some(UNIQUE_VIOLATION_CODE)
}

#[async_trait]
impl MarginStore for RestStore {
    async fn latest_date(&self) -> Result<Option<NaiveDate>, StoreError> {
        let url = format!("{}?select=date&order=date.desc&limit=1", self.table_url());
        let response = self.send(HttpRequest::get(url)).await?;

        if !response.is_success() {
            return Err(StoreError::Status {
                status: response.status,
                body: response.body,
            });
        }

        let rows: Vec<DateRow> = serde_json::from_str(&response.body)?;
        Ok(rows.first().and_then(|row| parse_date(&row.date)))
    }

    async fn insert_batch(
        &self,
        records: &[PersistedRecord],
        mode: WriteMode,
    ) -> Result<usize, StoreError> {
        let body = serde_json::to_string(records)?;
        let request = match mode {
            WriteMode::Insert => HttpRequest::post(self.table_url(), body)
                .header("Prefer", "return=minimal"),
            WriteMode::Upsert => {
                HttpRequest::post(format!("{}?on_conflict=date", self.table_url()), body)
                    .header("Prefer", "resolution=merge-duplicates,return=minimal")
            }
            // Only the inserted rows come back, which is how skipped dates are counted.
            WriteMode::SkipExisting => HttpRequest::post(
                format!("{}?on_conflict=date&select=date", self.table_url()),
                body,
            )
            .header("Prefer", "resolution=ignore-duplicates,return=representation"),
        };

        let response = self.send(request).await?;
        if response.is_success() {
            let written = match mode {
                WriteMode::SkipExisting => {
                    serde_json::from_str::<Vec<DateRow>>(&response.body)?.len()
                }
                WriteMode::Insert | WriteMode::Upsert => records.len(),
            };
            info!(rows = records.len(), written, ?mode, "batch written");
            return Ok(written);
        }

        if is_unique_violation(&response) {
            return Err(StoreError::UniqueViolation(response.body));
        }

        Err(StoreError::Status {
            status: response.status,
            body: response.body,
        })
    }
}
