// src/aggregate/table.rs

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::records::Record;

/// Column type inferred from the non-null values seen under one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Only nulls (or nothing) seen so far.
    Null,
    Boolean,
    Int64,
    Float64,
    Utf8,
    /// Objects, arrays or a mix of scalar kinds; stored as JSON text.
    Json,
}

impl ColumnKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ColumnKind::Null,
            Value::Bool(_) => ColumnKind::Boolean,
            Value::Number(n) if n.is_i64() => ColumnKind::Int64,
            Value::Number(_) => ColumnKind::Float64,
            Value::String(_) => ColumnKind::Utf8,
            Value::Array(_) | Value::Object(_) => ColumnKind::Json,
        }
    }

    pub fn merge(self, other: ColumnKind) -> ColumnKind {
        use ColumnKind::*;
        match (self, other) {
            (Null, k) | (k, Null) => k,
            (a, b) if a == b => a,
            (Int64, Float64) | (Float64, Int64) => Float64,
            _ => Json,
        }
    }

    /// Arrow type used for the column. All-null columns become strings.
    pub fn data_type(self) -> DataType {
        match self {
            ColumnKind::Boolean => DataType::Boolean,
            ColumnKind::Int64 => DataType::Int64,
            ColumnKind::Float64 => DataType::Float64,
            ColumnKind::Null | ColumnKind::Utf8 | ColumnKind::Json => DataType::Utf8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// Union of keys across `records`, in first-seen order, each with the kind
/// merged over all of its values.
pub fn union_columns(records: &[Record]) -> Vec<Column> {
    let mut columns: Vec<Column> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        for (key, value) in record {
            let kind = ColumnKind::of(value);
            match index.get(key) {
                Some(&i) => columns[i].kind = columns[i].kind.merge(kind),
                None => {
                    index.insert(key.clone(), columns.len());
                    columns.push(Column {
                        name: key.clone(),
                        kind,
                    });
                }
            }
        }
    }
    columns
}

pub fn build_schema(columns: &[Column]) -> Arc<Schema> {
    let fields: Vec<Field> = columns
        .iter()
        .map(|c| Field::new(&c.name, c.kind.data_type(), /* nullable = */ true))
        .collect();
    Arc::new(Schema::new(fields))
}

/// One row per record, in order. A key a record lacks (or holds `null` for)
/// becomes a null cell.
pub fn build_table(records: &[Record]) -> Result<RecordBatch> {
    let columns = union_columns(records);
    let schema = build_schema(&columns);
    let arrays: Vec<ArrayRef> = columns.iter().map(|c| build_array(c, records)).collect();

    // row count must be explicit when no column exists
    let options = RecordBatchOptions::new().with_row_count(Some(records.len()));
    RecordBatch::try_new_with_options(schema, arrays, &options)
        .context("assembling aggregate table")
}

fn build_array(column: &Column, records: &[Record]) -> ArrayRef {
    let n = records.len();
    let cells = records
        .iter()
        .map(|r| r.get(&column.name).filter(|v| !v.is_null()));

    match column.kind {
        ColumnKind::Boolean => {
            let mut b = BooleanBuilder::with_capacity(n);
            for cell in cells {
                b.append_option(cell.and_then(Value::as_bool));
            }
            Arc::new(b.finish()) as ArrayRef
        }
        ColumnKind::Int64 => {
            let mut b = Int64Builder::with_capacity(n);
            for cell in cells {
                b.append_option(cell.and_then(Value::as_i64));
            }
            Arc::new(b.finish()) as ArrayRef
        }
        ColumnKind::Float64 => {
            let mut b = Float64Builder::with_capacity(n);
            for cell in cells {
                b.append_option(cell.and_then(Value::as_f64));
            }
            Arc::new(b.finish()) as ArrayRef
        }
        ColumnKind::Null | ColumnKind::Utf8 => {
            let mut b = StringBuilder::new();
            for cell in cells {
                b.append_option(cell.and_then(Value::as_str));
            }
            Arc::new(b.finish()) as ArrayRef
        }
        ColumnKind::Json => {
            let mut b = StringBuilder::new();
            for cell in cells {
                b.append_option(cell.map(json_text));
            }
            Arc::new(b.finish()) as ArrayRef
        }
    }
}

/// Strings keep their raw text; everything else is compact JSON.
fn json_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
