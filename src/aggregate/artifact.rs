// src/aggregate/artifact.rs

use anyhow::{Context, Result};
use arrow::compute::concat_batches;
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::metadata::{FileMetaData, KeyValue};
use parquet::file::properties::WriterProperties;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Key-value entry holding the row count, which a table without columns
/// cannot otherwise carry through Parquet.
const ROW_COUNT_KEY: &str = "nsfscraper.num_rows";

fn writer_props(rows: usize) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_dictionary_enabled(true)
        .set_key_value_metadata(Some(vec![KeyValue::new(
            ROW_COUNT_KEY.to_string(),
            rows.to_string(),
        )]))
        .build()
}

fn write_batch<W: Write + Send>(batch: &RecordBatch, sink: W) -> Result<()> {
    let mut writer = ArrowWriter::try_new(sink, batch.schema(), Some(writer_props(batch.num_rows())))
        .context("creating Parquet writer")?;
    writer.write(batch).context("writing record batch")?;
    writer.close().context("closing Parquet writer")?;
    Ok(())
}

/// Write `batch` to `path`, replacing any existing file. The data goes to a
/// sibling temp file first and is renamed into place once complete.
pub fn write_parquet(batch: &RecordBatch, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let tmp_path = path.with_extension("parquet.tmp");
    let file = File::create(&tmp_path)
        .with_context(|| format!("creating {}", tmp_path.display()))?;
    let written = write_batch(batch, file)
        .with_context(|| format!("writing {}", tmp_path.display()))
        .and_then(|()| {
            fs::rename(&tmp_path, path).with_context(|| {
                format!("renaming {} -> {}", tmp_path.display(), path.display())
            })
        });
    if let Err(err) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    debug!(path = %path.display(), rows = batch.num_rows(), "wrote parquet");
    Ok(())
}

/// Parquet encoding of `batch` held in memory.
pub fn encode_parquet(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write_batch(batch, &mut buf)?;
    Ok(buf)
}

/// Read a whole Parquet file back into a single batch.
pub fn read_parquet(path: &Path) -> Result<RecordBatch> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("reading Parquet metadata from {}", path.display()))?;
    let schema = builder.schema().clone();

    if schema.fields().is_empty() {
        let rows = stored_row_count(builder.metadata().file_metadata());
        let options = RecordBatchOptions::new().with_row_count(Some(rows));
        return RecordBatch::try_new_with_options(schema, Vec::new(), &options)
            .with_context(|| format!("rebuilding column-less table from {}", path.display()));
    }

    let reader = builder.build().context("building Parquet reader")?;
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("decoding {}", path.display()))?;
    concat_batches(&schema, &batches).context("concatenating record batches")
}

fn stored_row_count(meta: &FileMetaData) -> usize {
    meta.key_value_metadata()
        .and_then(|kvs| kvs.iter().find(|kv| kv.key == ROW_COUNT_KEY))
        .and_then(|kv| kv.value.as_deref())
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| usize::try_from(meta.num_rows()).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::table::build_table;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    #[test]
    fn round_trip_preserves_rows_columns_and_cells() -> Result<()> {
        let records: Vec<_> = [
            json!({"AwardID": "2000001", "AwardAmount": 250000, "rate": 0.25, "active": true,
                   "pi": [{"pi_first_name": "Grace"}]}),
            json!({"AwardID": "2000002", "rate": 1.5}),
            json!({"AwardID": "2000003", "AwardAmount": 9, "active": false}),
        ]
        .into_iter()
        .map(|v| match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        })
        .collect();
        let table = build_table(&records)?;
        let dir = tempdir()?;
        let path = dir.path().join("nsf.parquet");

        write_parquet(&table, &path)?;
        let back = read_parquet(&path)?;

        assert_eq!(back.num_rows(), table.num_rows());
        assert_eq!(back.schema().fields(), table.schema().fields());
        assert_eq!(back.columns(), table.columns());
        assert!(!path.with_extension("parquet.tmp").exists());
        Ok(())
    }

    #[test]
    fn keyless_records_keep_their_row_count() -> Result<()> {
        let records: Vec<_> = (0..3)
            .map(|_| match json!({}) {
                Value::Object(m) => m,
                _ => unreachable!(),
            })
            .collect();
        let table = build_table(&records)?;
        let dir = tempdir()?;
        let path = dir.path().join("nsf.parquet");

        write_parquet(&table, &path)?;
        let back = read_parquet(&path)?;

        assert_eq!(back.num_columns(), 0);
        assert_eq!(back.num_rows(), 3);

        let shard = dir.path().join("shard.parquet");
        fs::write(&shard, encode_parquet(&back)?)?;
        assert_eq!(read_parquet(&shard)?.num_rows(), 3);
        Ok(())
    }

    #[test]
    fn failed_write_leaves_no_temp_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nsf.parquet");
        // a non-empty directory in the way makes the final rename fail
        fs::create_dir_all(path.join("occupied"))?;
        let record = match json!({"id": "A"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let table = build_table(&[record])?;

        assert!(write_parquet(&table, &path).is_err());

        assert!(!path.with_extension("parquet.tmp").exists());
        assert!(path.join("occupied").is_dir());
        Ok(())
    }

    #[test]
    fn existing_file_is_replaced() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("out").join("nsf.parquet");
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(&path, b"old junk")?;
        let record = match json!({"id": "A"}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let table = build_table(&[record])?;

        write_parquet(&table, &path)?;

        assert_eq!(read_parquet(&path)?.num_rows(), 1);
        Ok(())
    }

    #[test]
    fn in_memory_encoding_is_valid_parquet() -> Result<()> {
        let record = match json!({"id": "A", "amount": 100}) {
            Value::Object(m) => m,
            _ => unreachable!(),
        };
        let table = build_table(&[record])?;
        let dir = tempdir()?;
        let path = dir.path().join("shard.parquet");

        fs::write(&path, encode_parquet(&table)?)?;

        assert_eq!(read_parquet(&path)?.columns(), table.columns());
        Ok(())
    }
}
