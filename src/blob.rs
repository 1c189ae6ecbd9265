//! Columnar, immutable, per-scan storage: one Parquet file per scan, sorted
//! by `(depth, path)`, with the `depth` column pushed down on read so a
//! depth-bounded subtree query never decodes the whole file.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow_array::cast::AsArray;
use arrow_array::types::{Float64Type, UInt32Type, UInt64Type};
use arrow_array::{ArrayRef, BooleanArray, RecordBatch, StringArray, UInt32Array, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::arrow_reader::{ArrowPredicateFn, ParquetRecordBatchReaderBuilder, ProjectionMask, RowFilter};
use parquet::arrow::arrow_writer::ArrowWriter;

use crate::entry::{Entry, EntryKind};
use crate::error::BlobError;

pub const DEPTH_COLUMN: &str = "depth";

fn schema() -> Schema {
    Schema::new(vec![
        Field::new("path", DataType::Utf8, false),
        Field::new("parent", DataType::Utf8, false),
        Field::new("uri", DataType::Utf8, false),
        Field::new("kind", DataType::Utf8, false),
        Field::new("size", DataType::UInt64, false),
        Field::new("mtime", DataType::Float64, false),
        Field::new("n_desc", DataType::UInt64, false),
        Field::new("n_children", DataType::UInt32, false),
        Field::new(DEPTH_COLUMN, DataType::UInt32, false),
    ])
}

/// Generates a new blob filename. Scan blobs are immutable and written
/// exactly once, so collisions would indicate a UUID bug, not contention.
pub fn new_blob_filename() -> String {
    format!("{}.parquet", uuid::Uuid::new_v4())
}

pub fn write_blob(path: &Path, entries: &[Entry]) -> Result<(), BlobError> {
    let schema = Arc::new(schema());
    let batch = entries_to_batch(&schema, entries)?;

    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

fn entries_to_batch(schema: &Arc<Schema>, entries: &[Entry]) -> Result<RecordBatch, BlobError> {
    let path: ArrayRef = Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.path.as_str())));
    let parent: ArrayRef = Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.parent.as_str())));
    let uri: ArrayRef = Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.uri.as_str())));
    let kind: ArrayRef = Arc::new(StringArray::from_iter_values(entries.iter().map(|e| kind_str(e.kind))));
    let size: ArrayRef = Arc::new(UInt64Array::from_iter_values(entries.iter().map(|e| e.size)));
    let mtime: ArrayRef = Arc::new(arrow_array::Float64Array::from_iter_values(entries.iter().map(|e| e.mtime)));
    let n_desc: ArrayRef = Arc::new(UInt64Array::from_iter_values(entries.iter().map(|e| e.n_desc)));
    let n_children: ArrayRef = Arc::new(UInt32Array::from_iter_values(entries.iter().map(|e| e.n_children)));
    let depth: ArrayRef = Arc::new(UInt32Array::from_iter_values(entries.iter().map(|e| e.depth)));

    RecordBatch::try_new(
        Arc::clone(schema),
        vec![path, parent, uri, kind, size, mtime, n_desc, n_children, depth],
    )
    .map_err(|e| BlobError::SchemaMismatch(e.to_string()))
}

fn kind_str(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::File => "file",
        EntryKind::Dir => "dir",
    }
}

fn kind_from_str(s: &str) -> EntryKind {
    match s {
        "dir" => EntryKind::Dir,
        _ => EntryKind::File,
    }
}

/// True if the blob predates the `depth` column (legacy blob requiring
/// `migration::add_depth_column` before pushdown reads are possible).
pub fn has_depth_column(path: &Path) -> Result<bool, BlobError> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    Ok(builder.schema().field_with_name(DEPTH_COLUMN).is_ok())
}

/// Reads every row, optionally pushing a `[min_depth, max_depth]` filter
/// down to the column reader. Falls back to a full read for legacy blobs
/// missing the depth column.
pub fn read_blob(path: &Path, depth_range: Option<(u32, u32)>) -> Result<Vec<Entry>, BlobError> {
    let file = File::open(path)?;
    let mut builder = ParquetRecordBatchReaderBuilder::try_new(file)?;

    let has_depth = builder.schema().field_with_name(DEPTH_COLUMN).is_ok();

    if let (Some((min_depth, max_depth)), true) = (depth_range, has_depth) {
        let parquet_schema = builder.parquet_schema().clone();
        let depth_idx = builder
            .schema()
            .index_of(DEPTH_COLUMN)
            .map_err(|_| BlobError::MissingColumn(DEPTH_COLUMN.to_string()))?;
        let mask = ProjectionMask::leaves(&parquet_schema, [depth_idx]);
        let predicate = ArrowPredicateFn::new(mask, move |batch: RecordBatch| {
            let depth_col = batch.column(0).as_primitive::<UInt32Type>();
            let mut flags = Vec::with_capacity(depth_col.len());
            for i in 0..depth_col.len() {
                let d = depth_col.value(i);
                flags.push(d >= min_depth && d <= max_depth);
            }
            Ok(BooleanArray::from(flags))
        });
        builder = builder.with_row_filter(RowFilter::new(vec![Box::new(predicate)]));
    }

    let reader = builder.build()?;
    let mut entries = Vec::new();
    for batch_result in reader {
        let batch = batch_result?;
        append_entries(&batch, &mut entries)?;
    }
    Ok(entries)
}

fn append_entries(batch: &RecordBatch, out: &mut Vec<Entry>) -> Result<(), BlobError> {
    let path = batch.column_by_name("path").ok_or_else(|| BlobError::MissingColumn("path".into()))?.as_string::<i32>();
    let parent = batch.column_by_name("parent").ok_or_else(|| BlobError::MissingColumn("parent".into()))?.as_string::<i32>();
    let uri = batch.column_by_name("uri").ok_or_else(|| BlobError::MissingColumn("uri".into()))?.as_string::<i32>();
    let kind = batch.column_by_name("kind").ok_or_else(|| BlobError::MissingColumn("kind".into()))?.as_string::<i32>();
    let size = batch.column_by_name("size").ok_or_else(|| BlobError::MissingColumn("size".into()))?.as_primitive::<UInt64Type>();
    let mtime = batch.column_by_name("mtime").ok_or_else(|| BlobError::MissingColumn("mtime".into()))?.as_primitive::<Float64Type>();
    let n_desc = batch.column_by_name("n_desc").ok_or_else(|| BlobError::MissingColumn("n_desc".into()))?.as_primitive::<UInt64Type>();
    let n_children = batch.column_by_name("n_children").ok_or_else(|| BlobError::MissingColumn("n_children".into()))?.as_primitive::<UInt32Type>();
    let depth = match batch.column_by_name(DEPTH_COLUMN) {
        Some(col) => col.as_primitive::<UInt32Type>().clone(),
        None => UInt32Array::from(vec![0u32; batch.num_rows()]),
    };

    for i in 0..batch.num_rows() {
        out.push(Entry {
            path: path.value(i).to_string(),
            parent: parent.value(i).to_string(),
            uri: uri.value(i).to_string(),
            kind: kind_from_str(kind.value(i)),
            size: size.value(i),
            mtime: mtime.value(i),
            n_desc: n_desc.value(i),
            n_children: n_children.value(i),
            depth: if depth.len() > i { depth.value(i) } else { Entry::depth_of(path.value(i)) },
        });
    }
    Ok(())
}

pub fn blob_path(scans_dir: &Path, filename: &str) -> PathBuf {
    scans_dir.join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_entries() -> Vec<Entry> {
        vec![
            Entry { path: ".".into(), parent: "".into(), uri: "/t".into(), kind: EntryKind::Dir, size: 300, mtime: 2.0, n_desc: 3, n_children: 1, depth: 0 },
            Entry { path: "child".into(), parent: ".".into(), uri: "/t/child".into(), kind: EntryKind::Dir, size: 300, mtime: 2.0, n_desc: 2, n_children: 1, depth: 1 },
            Entry { path: "child/a.txt".into(), parent: "child".into(), uri: "/t/child/a.txt".into(), kind: EntryKind::File, size: 300, mtime: 2.0, n_desc: 1, n_children: 0, depth: 2 },
        ]
    }

    #[test]
    fn round_trips_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.parquet");
        write_blob(&path, &sample_entries()).unwrap();
        assert!(has_depth_column(&path).unwrap());

        let loaded = read_blob(&path, None).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].path, ".");
    }

    #[test]
    fn depth_pushdown_filters_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.parquet");
        write_blob(&path, &sample_entries()).unwrap();

        let loaded = read_blob(&path, Some((0, 1))).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|e| e.depth <= 1));
    }
}
