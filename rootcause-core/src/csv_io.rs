//! Thin CSV read/write helpers over [`RawRecords`]. Kept separate from
//! `table.rs` so the schema logic stays independent of the on-disk format.

use std::path::Path;

use crate::error::Result;
use crate::table::RawRecords;

pub fn read_csv_file(path: &Path) -> Result<RawRecords> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|s| s.to_string()).collect());
    }
    RawRecords::from_csv_rows(headers, rows)
}

/// Writes `line_id` as the first column, followed by `raw.headers` in
/// order (spec §6: "the first column of the persisted CSVs is `line_id`").
pub fn write_csv_file(path: &Path, raw: &RawRecords) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().from_path(path)?;
    let mut header_row = vec!["line_id".to_string()];
    header_row.extend(raw.headers.iter().cloned());
    writer.write_record(&header_row)?;
    for (line_id, row) in raw.line_ids.iter().zip(raw.rows.iter()) {
        let mut record = vec![line_id.to_string()];
        record.extend(row.iter().cloned());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let raw = RawRecords::from_csv_rows(
            vec!["timestamp".into(), "content".into(), "service".into()],
            vec![
                vec!["2024-01-01 00:00:00.000000".into(), "hello".into(), "db".into()],
                vec!["2024-01-01 00:00:01.000000".into(), "world".into(), "db".into()],
            ],
        )
        .unwrap();
        write_csv_file(&path, &raw).unwrap();
        let reread = read_csv_file(&path).unwrap();
        assert_eq!(reread.rows.len(), 2);
        assert_eq!(reread.line_ids, vec![0, 1]);
        assert_eq!(reread.column_index("content"), Some(1));
    }
}
