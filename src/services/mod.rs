pub mod analyzer;
pub mod anomaly_writer;
pub mod answer_key_builder;
pub mod result_store;

pub use analyzer::analyze;
pub use anomaly_writer::AnomalyWriter;
pub use answer_key_builder::{expected_score, AnswerKeyBuilder, KeyReport};
pub use result_store::ResultStore;
