use crate::error::{Error, Result};
use crate::models::MetadataPointerRow;
use crate::retry::RetryPolicy;
use diagnostics::*;

/// A remote engine that runs the pointer query.
pub trait QuerySource {
    fn fetch_pointer_rows(&self, query_id: u64) -> Result<Vec<MetadataPointerRow>>;
}

/// Run the pointer query under `policy`. Either every row comes back or the
/// result is [`Error::QueryExhausted`].
pub fn run_source_query(
    source: &dyn QuerySource,
    query_id: u64,
    policy: &RetryPolicy,
) -> Result<Vec<MetadataPointerRow>> {
    info!("Fetching metadata URIs from query {query_id}", query_id: query_id);

    policy
        .run("Fetching metadata URIs", || source.fetch_pointer_rows(query_id))
        .map_err(|exhausted| {
            let attempts = exhausted.attempts;
            error!(
                "Failed to fetch metadata URIs after {attempts} attempts",
                attempts: attempts
            );
            Error::QueryExhausted {
                query_id,
                attempts,
                last: Box::new(exhausted.last),
            }
        })
}
