//! Blocking client for the parts of the Dune API the pipeline needs:
//! query execution, result paging, table deletion and CSV upload.

use crate::config::OpmetaConfig;
use crate::error::{Error, Result};
use crate::models::MetadataPointerRow;
use crate::publish::{CsvUpload, TableSink};
use crate::source::QuerySource;
use diagnostics::*;
use reqwest::blocking::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::marker::PhantomData;
use std::time::Duration;

const API_KEY_HEADER: &str = "X-Dune-API-Key";
const TIMEOUT_SECONDS: u64 = 60;

/// Execution states reported by the API.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    #[serde(rename = "QUERY_STATE_PENDING")]
    Pending,
    #[serde(rename = "QUERY_STATE_EXECUTING")]
    Executing,
    #[serde(rename = "QUERY_STATE_COMPLETED")]
    Completed,
    #[serde(rename = "QUERY_STATE_COMPLETED_PARTIAL")]
    CompletedPartial,
    #[serde(rename = "QUERY_STATE_FAILED")]
    Failed,
    #[serde(rename = "QUERY_STATE_CANCELLED")]
    Cancelled,
    #[serde(rename = "QUERY_STATE_EXPIRED")]
    Expired,
    #[serde(other)]
    Unknown,
}

impl ExecutionState {
    /// Anything other than pending or executing, including unrecognised states.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionState::Pending | ExecutionState::Executing)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExecutionStarted {
    pub execution_id: String,
    pub state: ExecutionState,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExecutionStatus {
    pub execution_id: String,
    pub state: ExecutionState,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
#[serde(bound = "T: DeserializeOwned")]
pub struct ResultsPage<T> {
    pub state: ExecutionState,
    #[serde(default = "no_result")]
    pub result: ResultRows<T>,
    #[serde(default)]
    pub next_uri: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(bound = "T: DeserializeOwned")]
pub struct ResultRows<T> {
    #[serde(default = "Vec::new")]
    pub rows: Vec<T>,
}

fn no_result<T>() -> ResultRows<T> {
    ResultRows { rows: Vec::new() }
}

#[derive(Deserialize, Debug)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
}

pub struct DuneClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
}

/// Walks the pages of an execution's results, following `next_uri`.
pub struct ResultPages<'a, T> {
    client: &'a DuneClient,
    next: Option<String>,
    phantom: PhantomData<T>,
}

impl DuneClient {
    pub fn new(base_url: &str, api_key: String, poll_interval: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECONDS))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            poll_interval,
        })
    }

    pub fn from_config(config: &OpmetaConfig, api_key: String) -> Result<Self> {
        Self::new(&config.api_base_url, api_key, config.poll_interval())
    }

    /// Start an execution of a saved query.
    pub fn execute_query(&self, query_id: u64) -> Result<ExecutionStarted> {
        let url = self.execute_url(query_id);
        let started: ExecutionStarted = self.call_api(self.http.post(&url), &url)?;
        let execution_id = started.execution_id.as_str();
        debug!(
            "Query {query_id} started as execution {execution_id}",
            query_id: query_id,
            execution_id: execution_id
        );
        Ok(started)
    }

    pub fn execution_status(&self, execution_id: &str) -> Result<ExecutionStatus> {
        let url = self.status_url(execution_id);
        self.call_api(self.http.get(&url), &url)
    }

    /// Poll until the execution reaches a terminal state; only a completed
    /// execution is `Ok`.
    pub fn wait_for_completion(&self, query_id: u64, execution_id: &str) -> Result<()> {
        loop {
            let status = self.execution_status(execution_id)?;
            match status.state {
                ExecutionState::Completed | ExecutionState::CompletedPartial => return Ok(()),
                state if state.is_terminal() => {
                    let detail = status
                        .error
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no error detail".to_string());
                    return Err(Error::query_failed(
                        query_id,
                        format!("execution {execution_id} ended in {state:?}: {detail}"),
                    ));
                }
                _ => std::thread::sleep(self.poll_interval),
            }
        }
    }

    pub fn result_pages<T: DeserializeOwned>(&self, execution_id: &str) -> ResultPages<'_, T> {
        ResultPages {
            client: self,
            next: Some(self.results_url(execution_id)),
            phantom: PhantomData,
        }
    }

    /// Execute, wait, then gather every result row.
    pub fn run_query<T: DeserializeOwned>(&self, query_id: u64) -> Result<Vec<T>> {
        let started = self.execute_query(query_id)?;
        self.wait_for_completion(query_id, &started.execution_id)?;

        let mut rows = Vec::new();
        for page in self.result_pages::<T>(&started.execution_id) {
            rows.extend(page?);
        }
        let count = rows.len();
        info!(
            "Query {query_id} returned {count} rows",
            query_id: query_id,
            count: count
        );
        Ok(rows)
    }

    fn call_api<T: DeserializeOwned>(&self, request: RequestBuilder, url: &str) -> Result<T> {
        let response = request.header(API_KEY_HEADER, &self.api_key).send()?;
        let text = checked_text(response, url)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn combine(&self, path: &str) -> String {
        format!("{}/api/v1/{path}", self.base_url)
    }

    fn execute_url(&self, query_id: u64) -> String {
        self.combine(&format!("query/{query_id}/execute"))
    }

    fn status_url(&self, execution_id: &str) -> String {
        self.combine(&format!("execution/{execution_id}/status"))
    }

    fn results_url(&self, execution_id: &str) -> String {
        self.combine(&format!("execution/{execution_id}/results"))
    }

    fn delete_url(&self, namespace: &str, table_name: &str) -> String {
        self.combine(&format!("table/{namespace}/{table_name}"))
    }

    fn upload_url(&self) -> String {
        self.combine("table/upload/csv")
    }
}

fn checked_text(response: Response, url: &str) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(Error::Api {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }
    Ok(response.text()?)
}

impl<T: DeserializeOwned> Iterator for ResultPages<'_, T> {
    type Item = Result<Vec<T>>;

    fn next(&mut self) -> Option<Result<Vec<T>>> {
        let url = self.next.take()?;
        let page: Result<ResultsPage<T>> =
            self.client.call_api(self.client.http.get(&url), &url);
        match page {
            Ok(page) => {
                self.next = page.next_uri;
                Some(Ok(page.result.rows))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

impl QuerySource for DuneClient {
    fn fetch_pointer_rows(&self, query_id: u64) -> Result<Vec<MetadataPointerRow>> {
        self.run_query(query_id)
    }
}

impl TableSink for DuneClient {
    fn delete_table(&self, namespace: &str, table_name: &str) -> Result<()> {
        let url = self.delete_url(namespace, table_name);
        let response = self
            .http
            .delete(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()?;
        checked_text(response, &url)?;
        Ok(())
    }

    fn upload_csv(&self, upload: &CsvUpload<'_>) -> Result<bool> {
        let url = self.upload_url();
        let body = serde_json::to_string(upload)?;
        let request = self
            .http
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        let response: UploadResponse = self.call_api(request, &url)?;
        Ok(response.success)
    }
}
