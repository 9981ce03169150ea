pub mod prediction;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod sse_parser;
pub mod types;

pub use prediction::{parse_prediction, Prediction, PredictionParseError};
pub use provider::ModelClient;
pub use types::{HistoryTurn, PredictionRequest};
