//! Operator metadata ETL.
//!
//! Runs a Dune query listing operators and their metadata URIs, fetches each
//! URI, flattens the JSON documents into a fixed six-column table and
//! replaces a Dune table with the result.

pub mod config;
pub mod dune;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod publish;
pub mod resolver;
pub mod retry;
pub mod source;
pub mod table;

// Re-export key types for use in tests and external applications
pub use crate::config::{OpmetaConfig, UploadFailurePolicy, load_config, load_config_or_default};
pub use crate::dune::DuneClient;
pub use crate::error::{Error, Result};
pub use crate::models::{
    COLUMNS, DefaultReason, MetadataPointerRow, OperatorMetadataRecord, Resolution,
};
pub use crate::pipeline::{Pipeline, PipelineSettings, RunReport};
pub use crate::publish::{Destination, PublishOutcome, TableSink};
pub use crate::resolver::{HttpFetcher, MetadataFetcher};
pub use crate::retry::RetryPolicy;
pub use crate::source::QuerySource;
pub use crate::table::ResultTable;
