pub mod api;
pub mod csv;

pub use api::ApiIngestor;
pub use csv::{generate_sample_csv, CsvIngestor};
