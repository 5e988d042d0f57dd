pub mod aggregate;
pub mod output;

pub use aggregate::{aggregate, sorted_records, summarize_files};
pub use output::{
    render_csv, render_file_sections, render_file_summary_csv, render_markdown, write_output,
};
