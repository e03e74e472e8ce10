pub mod job_list;
pub mod table_csv;

pub use job_list::JobListSource;
pub use table_csv::{read_records, read_table_file};

use tariff_model::TableRecord;

/// Keep the records that apply to `utility`: rows without a `utility` cell
/// apply to every utility.
pub fn scope_to_utility(records: Vec<TableRecord>, utility: &str) -> Vec<TableRecord> {
    records
        .into_iter()
        .filter(|r| r.text("utility").map_or(true, |u| u == utility))
        .collect()
}
