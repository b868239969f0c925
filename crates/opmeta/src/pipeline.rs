use crate::config::{OpmetaConfig, UploadFailurePolicy};
use crate::error::{Error, Result};
use crate::publish::{Destination, PublishOutcome, TableSink, publish};
use crate::resolver::{MetadataFetcher, ResolveSummary, resolve_all};
use crate::retry::RetryPolicy;
use crate::source::{QuerySource, run_source_query};
use crate::table::ResultTable;
use diagnostics::*;

/// The parts of the configuration a run needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub query_id: u64,
    pub retry: RetryPolicy,
    pub destination: Destination,
    pub upload_failure: UploadFailurePolicy,
}

impl From<&OpmetaConfig> for PipelineSettings {
    fn from(config: &OpmetaConfig) -> Self {
        Self {
            query_id: config.query_id,
            retry: config.retry.clone(),
            destination: Destination {
                namespace: config.namespace.clone(),
                table_name: config.table_name.clone(),
                description: config.table_description.clone(),
                is_private: config.is_private,
            },
            upload_failure: config.upload_failure,
        }
    }
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub rows: usize,
    pub summary: ResolveSummary,
    pub csv_bytes: usize,
    pub publish: PublishOutcome,
}

/// An assembled table and its serialized form, before publishing.
#[derive(Debug, Clone)]
pub struct Assembled {
    pub table: ResultTable,
    pub summary: ResolveSummary,
    pub csv: String,
}

/// query → resolve → assemble → publish, one pass.
pub struct Pipeline<'a> {
    source: &'a dyn QuerySource,
    fetcher: &'a dyn MetadataFetcher,
    settings: PipelineSettings,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        source: &'a dyn QuerySource,
        fetcher: &'a dyn MetadataFetcher,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            fetcher,
            settings,
        }
    }

    /// Query, resolve and serialize, without touching the destination.
    pub fn assemble(&self) -> Result<Assembled> {
        let rows = run_source_query(self.source, self.settings.query_id, &self.settings.retry)?;
        let resolutions = resolve_all(self.fetcher, &rows);
        let summary = ResolveSummary::of(&resolutions);

        let table = ResultTable::assemble(resolutions);
        let csv = table.to_csv()?;
        Ok(Assembled {
            table,
            summary,
            csv,
        })
    }

    /// Full run. Fails when the query is exhausted, and on a failed upload
    /// only under [`UploadFailurePolicy::Strict`].
    pub fn run(&self, sink: &dyn TableSink) -> Result<RunReport> {
        let Assembled {
            table,
            summary,
            csv,
        } = self.assemble()?;

        let outcome = publish(sink, &self.settings.destination, &csv);
        if !outcome.uploaded && self.settings.upload_failure == UploadFailurePolicy::Strict {
            return Err(Error::UploadRejected {
                table_name: self.settings.destination.table_name.clone(),
            });
        }

        let report = RunReport {
            rows: table.len(),
            summary,
            csv_bytes: csv.len(),
            publish: outcome,
        };
        let rows = report.rows;
        let defaulted = report.summary.defaulted;
        info!(
            "Run complete: {rows} rows, {defaulted} defaulted",
            rows: rows,
            defaulted: defaulted
        );
        Ok(report)
    }
}
