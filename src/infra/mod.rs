pub mod csv_source_adapter;
pub mod http_explainer_adapter;
pub mod ndjson_sink_adapter;

pub use csv_source_adapter::CsvClaimSource;
pub use http_explainer_adapter::HttpExplainer;
pub use ndjson_sink_adapter::NdjsonPartitionSink;
