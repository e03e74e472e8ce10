use std::{fs::File, io::Read, path::Path};

use tariff_model::TableRecord;

use crate::error::BillingResult;

/// Parse a headed, delimited table into records keyed by header name.
///
/// Cells are kept as text; typed accessors on [`TableRecord`] coerce them.
pub fn read_records<R: Read>(reader: R, delimiter: u8) -> BillingResult<Vec<TableRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();

    let mut out = Vec::new();
    for result in rdr.records() {
        let row = match result {
            Ok(row) => row,
            Err(e) => {
                metrics::counter!("table_csv_parse_errors_total").increment(1);
                return Err(e.into());
            }
        };
        let mut record = TableRecord::new();
        for (name, value) in headers.iter().zip(row.iter()) {
            record.insert(name, value);
        }
        out.push(record);
    }
    Ok(out)
}

/// Read a table file; `.dat` extracts are pipe-delimited, anything else is CSV.
pub fn read_table_file(path: impl AsRef<Path>) -> BillingResult<Vec<TableRecord>> {
    let path = path.as_ref();
    let delimiter = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("dat") => b'|',
        _ => b',',
    };
    let file = File::open(path)?;
    let records = read_records(file, delimiter)?;
    tracing::debug!(path = %path.display(), rows = records.len(), "loaded table file");
    Ok(records)
}
