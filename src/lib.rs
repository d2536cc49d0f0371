pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod loader;
pub mod output;

pub use analysis::{analyze, analyze_candles};
pub use config::{AnalysisParams, ScoreWeights, Tolerance};
pub use data::{AnalysisResult, Candle, Series};
pub use error::AnalysisError;
