use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Output columns, in published order.
pub const COLUMNS: [&str; 6] = [
    "operator_name",
    "operator_contract_address",
    "website",
    "twitter",
    "logo",
    "description",
];

/// One row of the source query: an operator and where its metadata lives.
///
/// Columns other than `metadataURI` and `operator` are ignored. A null or
/// missing operator reads as "".
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetadataPointerRow {
    #[serde(rename = "metadataURI", default)]
    pub metadata_uri: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub operator: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl MetadataPointerRow {
    pub fn new<S: Into<String>>(metadata_uri: Option<S>, operator: S) -> Self {
        Self {
            metadata_uri: metadata_uri.map(Into::into),
            operator: operator.into(),
        }
    }

    /// The pointer, if it holds anything other than whitespace.
    pub fn pointer(&self) -> Option<&str> {
        self.metadata_uri
            .as_deref()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
    }
}

/// Flattened operator metadata, one per source row.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OperatorMetadataRecord {
    pub operator_name: String,
    pub operator_contract_address: String,
    pub website: String,
    pub twitter: String,
    pub logo: String,
    pub description: String,
}

impl OperatorMetadataRecord {
    /// The record used whenever metadata cannot be obtained: only the
    /// operator address is filled in.
    pub fn for_operator<S: Into<String>>(operator: S) -> Self {
        Self {
            operator_name: String::new(),
            operator_contract_address: operator.into(),
            website: String::new(),
            twitter: String::new(),
            logo: String::new(),
            description: String::new(),
        }
    }

    /// Build a record from a metadata document. The operator address always
    /// comes from the source row, never from the document.
    pub fn from_document<S: Into<String>>(document: &Map<String, Value>, operator: S) -> Self {
        Self {
            operator_name: document_field(document, "name"),
            operator_contract_address: operator.into(),
            website: document_field(document, "website"),
            twitter: document_field(document, "twitter"),
            logo: document_field(document, "logo"),
            description: document_field(document, "description"),
        }
    }

    /// Field values in [`COLUMNS`] order.
    pub fn values(&self) -> [&str; 6] {
        [
            self.operator_name.as_str(),
            self.operator_contract_address.as_str(),
            self.website.as_str(),
            self.twitter.as_str(),
            self.logo.as_str(),
            self.description.as_str(),
        ]
    }
}

// Absent and null keys become "", strings are taken verbatim and any other
// value keeps its JSON spelling.
fn document_field(document: &Map<String, Value>, key: &str) -> String {
    match document.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Why a row fell back to the default record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultReason {
    /// No pointer, or an empty one.
    MissingPointer,
    /// The pointer is not an http(s) URL.
    InvalidPointer(String),
    /// The endpoint answered with something other than 200.
    HttpStatus(u16),
    /// The request never produced a readable response.
    Transport(String),
    /// The body is not JSON.
    MalformedBody(String),
    /// The body is JSON but not an object.
    NotAnObject,
}

impl fmt::Display for DefaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultReason::MissingPointer => write!(f, "missing metadata URI"),
            DefaultReason::InvalidPointer(detail) => write!(f, "invalid metadata URI: {detail}"),
            DefaultReason::HttpStatus(status) => write!(f, "status code {status}"),
            DefaultReason::Transport(detail) => write!(f, "request failed: {detail}"),
            DefaultReason::MalformedBody(detail) => write!(f, "malformed JSON: {detail}"),
            DefaultReason::NotAnObject => write!(f, "JSON body is not an object"),
        }
    }
}

/// Outcome of resolving one pointer row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(OperatorMetadataRecord),
    Defaulted {
        record: OperatorMetadataRecord,
        reason: DefaultReason,
    },
}

impl Resolution {
    pub fn defaulted<S: Into<String>>(operator: S, reason: DefaultReason) -> Self {
        Resolution::Defaulted {
            record: OperatorMetadataRecord::for_operator(operator),
            reason,
        }
    }

    pub fn record(&self) -> &OperatorMetadataRecord {
        match self {
            Resolution::Resolved(record) => record,
            Resolution::Defaulted { record, .. } => record,
        }
    }

    pub fn into_record(self) -> OperatorMetadataRecord {
        match self {
            Resolution::Resolved(record) => record,
            Resolution::Defaulted { record, .. } => record,
        }
    }

    pub fn default_reason(&self) -> Option<&DefaultReason> {
        match self {
            Resolution::Resolved(_) => None,
            Resolution::Defaulted { reason, .. } => Some(reason),
        }
    }

    pub fn is_defaulted(&self) -> bool {
        matches!(self, Resolution::Defaulted { .. })
    }
}
