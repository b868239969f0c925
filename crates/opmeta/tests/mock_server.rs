#![allow(dead_code)]

use anyhow::Result;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use warp::Filter;
use warp::Reply;
use warp::http::StatusCode;
use warp::reply::Response;

pub const API_KEY: &str = "mock-dune-api-key";
pub const EXECUTION_ID: &str = "01HMOCKEXECUTION";

type Shared = Arc<Mutex<MockState>>;

/// Scripted behavior and recorded traffic of the mock server.
#[derive(Debug, Clone)]
pub struct MockState {
    /// Metadata documents by name, served at `/metadata/{name}`.
    pub documents: HashMap<String, (u16, String)>,
    /// Rows returned by the query.
    pub rows: Vec<Value>,
    /// Rows per results page; 0 returns everything at once.
    pub page_size: usize,
    /// Execute calls that answer 500 before one succeeds.
    pub execute_failures: usize,
    /// Status polls that report EXECUTING before the final state.
    pub pending_polls: usize,
    pub final_state: String,
    pub delete_status: u16,
    pub upload_success: bool,
    /// "METHOD what" lines, in arrival order.
    pub requests: Vec<String>,
    /// Upload request bodies.
    pub uploads: Vec<Value>,
    base_url: String,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            documents: HashMap::new(),
            rows: Vec::new(),
            page_size: 0,
            execute_failures: 0,
            pending_polls: 0,
            final_state: "QUERY_STATE_COMPLETED".to_string(),
            delete_status: 200,
            upload_success: true,
            requests: Vec::new(),
            uploads: Vec::new(),
            base_url: String::new(),
        }
    }
}

impl MockState {
    pub fn document(mut self, name: &str, status: u16, body: &str) -> Self {
        self.documents
            .insert(name.to_string(), (status, body.to_string()));
        self
    }

    pub fn row(mut self, metadata_uri: Option<&str>, operator: &str) -> Self {
        self.rows
            .push(json!({"metadataURI": metadata_uri, "operator": operator, "registered": true}));
        self
    }
}

/// Mock metadata host and Dune API, served from a private tokio runtime so
/// blocking clients can call it from ordinary test threads.
pub struct MockServer {
    runtime: Runtime,
    handle: Option<JoinHandle<()>>,
    state: Shared,
    base_url: String,
}

fn with_state(state: Shared) -> impl Filter<Extract = (Shared,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn api_key() -> impl Filter<Extract = (Option<String>,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("x-dune-api-key")
}

fn authorized(key: &Option<String>) -> bool {
    key.as_deref() == Some(API_KEY)
}

fn status_code(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn json_reply(status: u16, body: &Value) -> Response {
    warp::reply::with_status(warp::reply::json(body), status_code(status)).into_response()
}

fn text_reply(status: u16, body: String) -> Response {
    warp::reply::with_status(body, status_code(status)).into_response()
}

fn unauthorized() -> Response {
    json_reply(401, &json!({"error": "invalid API Key"}))
}

impl MockServer {
    pub fn start(state: MockState) -> Result<Self> {
        let shared: Shared = Arc::new(Mutex::new(state));

        let metadata = warp::path!("metadata" / String)
            .and(warp::get())
            .and(with_state(shared.clone()))
            .map(|name: String, state: Shared| {
                let mut state = state.lock().unwrap();
                state.requests.push(format!("GET metadata/{name}"));
                match state.documents.get(&name) {
                    Some((status, body)) => text_reply(*status, body.clone()),
                    None => text_reply(404, "not found".to_string()),
                }
            });

        let execute = warp::path!("api" / "v1" / "query" / u64 / "execute")
            .and(warp::post())
            .and(api_key())
            .and(with_state(shared.clone()))
            .map(|query_id: u64, key: Option<String>, state: Shared| {
                let mut state = state.lock().unwrap();
                state.requests.push(format!("POST execute {query_id}"));
                if !authorized(&key) {
                    return unauthorized();
                }
                if state.execute_failures > 0 {
                    state.execute_failures -= 1;
                    return json_reply(500, &json!({"error": "internal error"}));
                }
                json_reply(
                    200,
                    &json!({"execution_id": EXECUTION_ID, "state": "QUERY_STATE_PENDING"}),
                )
            });

        let status = warp::path!("api" / "v1" / "execution" / String / "status")
            .and(warp::get())
            .and(api_key())
            .and(with_state(shared.clone()))
            .map(|execution_id: String, key: Option<String>, state: Shared| {
                let mut state = state.lock().unwrap();
                state.requests.push(format!("GET status {execution_id}"));
                if !authorized(&key) {
                    return unauthorized();
                }
                let current = if state.pending_polls > 0 {
                    state.pending_polls -= 1;
                    "QUERY_STATE_EXECUTING".to_string()
                } else {
                    state.final_state.clone()
                };
                json_reply(
                    200,
                    &json!({"execution_id": execution_id, "state": current}),
                )
            });

        let results = warp::path!("api" / "v1" / "execution" / String / "results")
            .and(warp::get())
            .and(warp::query::<HashMap<String, String>>())
            .and(api_key())
            .and(with_state(shared.clone()))
            .map(
                |execution_id: String,
                 params: HashMap<String, String>,
                 key: Option<String>,
                 state: Shared| {
                    let mut state = state.lock().unwrap();
                    let offset: usize = params
                        .get("offset")
                        .and_then(|o| o.parse().ok())
                        .unwrap_or(0);
                    state
                        .requests
                        .push(format!("GET results {execution_id} offset={offset}"));
                    if !authorized(&key) {
                        return unauthorized();
                    }

                    let total = state.rows.len();
                    let page = if state.page_size == 0 {
                        total
                    } else {
                        state.page_size
                    };
                    let start = offset.min(total);
                    let end = (start + page).min(total);
                    let next_uri = (end < total).then(|| {
                        format!(
                            "{}/api/v1/execution/{execution_id}/results?offset={end}",
                            state.base_url
                        )
                    });
                    let rows = state.rows[start..end].to_vec();
                    json_reply(
                        200,
                        &json!({
                            "execution_id": execution_id,
                            "state": "QUERY_STATE_COMPLETED",
                            "result": {
                                "rows": rows,
                                "metadata": {
                                    "column_names": ["metadataURI", "operator", "registered"]
                                }
                            },
                            "next_uri": next_uri
                        }),
                    )
                },
            );

        let delete = warp::path!("api" / "v1" / "table" / String / String)
            .and(warp::delete())
            .and(api_key())
            .and(with_state(shared.clone()))
            .map(
                |namespace: String, table_name: String, key: Option<String>, state: Shared| {
                    let mut state = state.lock().unwrap();
                    state
                        .requests
                        .push(format!("DELETE {namespace}/{table_name}"));
                    if !authorized(&key) {
                        return unauthorized();
                    }
                    let status = state.delete_status;
                    if status == 200 {
                        let message = format!("Table {namespace}.{table_name} deleted");
                        json_reply(200, &json!({"message": message}))
                    } else {
                        json_reply(status, &json!({"error": "Table not found"}))
                    }
                },
            );

        let upload = warp::path!("api" / "v1" / "table" / "upload" / "csv")
            .and(warp::post())
            .and(api_key())
            .and(warp::body::json::<Value>())
            .and(with_state(shared.clone()))
            .map(|key: Option<String>, body: Value, state: Shared| {
                let mut state = state.lock().unwrap();
                let table_name = body["table_name"].as_str().unwrap_or("").to_string();
                state.requests.push(format!("POST upload {table_name}"));
                if !authorized(&key) {
                    return unauthorized();
                }
                state.uploads.push(body);
                let success = state.upload_success;
                json_reply(200, &json!({"success": success, "table_name": table_name}))
            });

        let routes = metadata
            .or(execute)
            .or(status)
            .or(results)
            .or(delete)
            .or(upload);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;

        let (addr, server) = {
            let _guard = runtime.enter();
            warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0))
        };
        let handle = runtime.spawn(server);

        let base_url = format!("http://127.0.0.1:{}", addr.port());
        shared.lock().unwrap().base_url = base_url.clone();

        Ok(MockServer {
            runtime,
            handle: Some(handle),
            state: shared,
            base_url,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a metadata document served by this server.
    pub fn metadata_url(&self, name: &str) -> String {
        format!("{}/metadata/{name}", self.base_url)
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn uploads(&self) -> Vec<Value> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn update<F: FnOnce(&mut MockState)>(&self, change: F) {
        change(&mut self.state.lock().unwrap());
    }

    pub fn clear_requests(&self) {
        self.update(|state| {
            state.requests.clear();
            state.uploads.clear();
        });
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// A URL on localhost that refuses connections.
pub fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/metadata.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_server_startup() {
        let server = MockServer::start(MockState::default()).unwrap();
        assert!(server.base_url().starts_with("http://127.0.0.1:"));
        assert!(server.requests().is_empty());
    }
}
