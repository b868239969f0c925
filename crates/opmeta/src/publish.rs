use crate::error::Result;
use diagnostics::*;
use serde::Serialize;

/// Request body for a CSV table upload.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct CsvUpload<'a> {
    pub table_name: &'a str,
    pub data: &'a str,
    pub description: &'a str,
    pub is_private: bool,
}

/// A warehouse that can drop and (re)create named tables.
pub trait TableSink {
    fn delete_table(&self, namespace: &str, table_name: &str) -> Result<()>;

    /// `Ok(false)` means the service answered but did not accept the table.
    fn upload_csv(&self, upload: &CsvUpload<'_>) -> Result<bool>;
}

/// Where the table is published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub namespace: String,
    pub table_name: String,
    pub description: String,
    pub is_private: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub deleted: bool,
    pub uploaded: bool,
}

/// Replace the destination table with `csv`: delete first, then upload.
///
/// Delete failures are logged and ignored. The two steps are not atomic; a
/// failed upload after a successful delete leaves no table behind.
pub fn publish(sink: &dyn TableSink, destination: &Destination, csv: &str) -> PublishOutcome {
    let namespace = destination.namespace.as_str();
    let table_name = destination.table_name.as_str();

    let deleted = match sink.delete_table(namespace, table_name) {
        Ok(()) => {
            info!(
                "Deleted table {namespace}.{table_name}",
                namespace: namespace,
                table_name: table_name
            );
            true
        }
        Err(e) => {
            let cause = e.to_string();
            warn!(
                "Failed to delete table {namespace}.{table_name}: {cause}",
                namespace: namespace,
                table_name: table_name,
                cause: cause
            );
            false
        }
    };

    let upload = CsvUpload {
        table_name,
        data: csv,
        description: &destination.description,
        is_private: destination.is_private,
    };
    let uploaded = match sink.upload_csv(&upload) {
        Ok(accepted) => accepted,
        Err(e) => {
            let cause = e.to_string();
            error!(
                "Upload of table {table_name} failed: {cause}",
                table_name: table_name,
                cause: cause
            );
            false
        }
    };

    if !uploaded && deleted {
        warn!(
            "Table {namespace}.{table_name} was deleted and not replaced",
            namespace: namespace,
            table_name: table_name
        );
    }
    info!("Upload successful: {uploaded}", uploaded: uploaded);

    PublishOutcome { deleted, uploaded }
}
