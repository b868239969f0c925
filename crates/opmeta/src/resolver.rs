//! Metadata pointer resolution.
//!
//! Every row yields exactly one [`Resolution`]. Failures are absorbed into a
//! default record tagged with a [`DefaultReason`] and never propagate.

use crate::error::Result;
use crate::models::{DefaultReason, MetadataPointerRow, OperatorMetadataRecord, Resolution};
use diagnostics::*;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Status and body of one metadata GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub status: u16,
    pub body: String,
}

/// Fetches metadata documents. An `Err` is a transport failure.
pub trait MetadataFetcher {
    fn fetch(&self, uri: &Url) -> Result<FetchedDocument>;
}

/// Blocking HTTP fetcher, one attempt per pointer.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// `timeout == None` waits as long as the server takes.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl MetadataFetcher for HttpFetcher {
    fn fetch(&self, uri: &Url) -> Result<FetchedDocument> {
        let response = self.client.get(uri.clone()).send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        Ok(FetchedDocument { status, body })
    }
}

/// Counts of how a batch of rows resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    pub resolved: usize,
    pub defaulted: usize,
}

impl ResolveSummary {
    pub fn of(resolutions: &[Resolution]) -> Self {
        let defaulted = resolutions.iter().filter(|r| r.is_defaulted()).count();
        Self {
            resolved: resolutions.len() - defaulted,
            defaulted,
        }
    }
}

fn parse_pointer(pointer: &str) -> std::result::Result<Url, DefaultReason> {
    let url = Url::parse(pointer).map_err(|e| DefaultReason::InvalidPointer(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(DefaultReason::InvalidPointer(format!(
            "unsupported scheme {scheme}"
        ))),
    }
}

fn interpret(document: FetchedDocument, operator: &str) -> Resolution {
    if document.status != 200 {
        return Resolution::defaulted(operator, DefaultReason::HttpStatus(document.status));
    }
    match serde_json::from_str::<Value>(&document.body) {
        Ok(Value::Object(map)) => {
            Resolution::Resolved(OperatorMetadataRecord::from_document(&map, operator))
        }
        Ok(_) => Resolution::defaulted(operator, DefaultReason::NotAnObject),
        Err(e) => Resolution::defaulted(operator, DefaultReason::MalformedBody(e.to_string())),
    }
}

/// Resolve one row into exactly one record.
pub fn resolve_row(fetcher: &dyn MetadataFetcher, row: &MetadataPointerRow) -> Resolution {
    let operator = row.operator.as_str();

    let resolution = match row.pointer() {
        None => Resolution::defaulted(operator, DefaultReason::MissingPointer),
        Some(pointer) => match parse_pointer(pointer) {
            Err(reason) => Resolution::defaulted(operator, reason),
            Ok(url) => {
                debug!(
                    "Fetching metadata for {operator} from {pointer}",
                    operator: operator,
                    pointer: pointer
                );
                match fetcher.fetch(&url) {
                    Ok(document) => interpret(document, operator),
                    Err(e) => {
                        Resolution::defaulted(operator, DefaultReason::Transport(e.to_string()))
                    }
                }
            }
        },
    };

    if let Some(reason) = resolution.default_reason() {
        let uri = row.metadata_uri.as_deref().unwrap_or("");
        let reason = reason.to_string();
        warn!(
            "Using default metadata for {operator} at {uri}: {reason}",
            operator: operator,
            uri: uri,
            reason: reason
        );
    }
    resolution
}

/// Resolve every row, in order.
pub fn resolve_all(fetcher: &dyn MetadataFetcher, rows: &[MetadataPointerRow]) -> Vec<Resolution> {
    let total = rows.len();
    info!("Resolving metadata for {total} operators", total: total);
    let resolutions: Vec<Resolution> = rows.iter().map(|row| resolve_row(fetcher, row)).collect();

    let ResolveSummary { resolved, defaulted } = ResolveSummary::of(&resolutions);
    info!(
        "Resolved {resolved} operators, defaulted {defaulted}",
        resolved: resolved,
        defaulted: defaulted
    );
    resolutions
}
