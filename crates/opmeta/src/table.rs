use crate::error::Result;
use crate::models::{COLUMNS, OperatorMetadataRecord, Resolution};
use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_csv::WriterBuilder;
use arrow_schema::{DataType, Field, Schema};
use diagnostics::*;
use std::sync::Arc;

/// Arrow schema of the published table: six non-null Utf8 columns.
pub fn result_schema() -> Schema {
    Schema::new(
        COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false))
            .collect::<Vec<_>>(),
    )
}

/// Resolved records in source-row order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultTable {
    records: Vec<OperatorMetadataRecord>,
}

impl ResultTable {
    pub fn assemble<I>(resolutions: I) -> Self
    where
        I: IntoIterator<Item = Resolution>,
    {
        Self::from_records(resolutions.into_iter().map(Resolution::into_record).collect())
    }

    pub fn from_records(records: Vec<OperatorMetadataRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[OperatorMetadataRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = (0..COLUMNS.len())
            .map(|index| {
                let values: Vec<&str> = self
                    .records
                    .iter()
                    .map(|record| record.values()[index])
                    .collect();
                Arc::new(StringArray::from(values)) as ArrayRef
            })
            .collect();

        Ok(RecordBatch::try_new(Arc::new(result_schema()), columns)?)
    }

    /// Comma-separated text with a header row. Fields are quoted only when
    /// they contain a delimiter, quote or line break.
    pub fn to_csv(&self) -> Result<String> {
        let batch = self.to_record_batch()?;
        let mut writer = WriterBuilder::new().with_header(true).build(Vec::new());
        writer.write(&batch)?;
        let bytes = writer.into_inner();

        let rows = self.len();
        let size = bytes.len();
        debug!(
            "Serialized {rows} rows into {size} bytes of CSV",
            rows: rows,
            size: size
        );

        String::from_utf8(bytes).map_err(|e| {
            arrow_schema::ArrowError::CsvError(format!("CSV output is not UTF-8: {e}")).into()
        })
    }
}
