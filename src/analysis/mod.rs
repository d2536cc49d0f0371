pub mod engine;
pub mod global_trend;
mod line;
pub mod local_trend;
pub mod moving_average;
pub mod peaks;
pub mod psychological;

pub use engine::{analyze, analyze_candles};
pub use global_trend::score_global_line;
pub use local_trend::fit_local_line;
pub use moving_average::{detect_reversal, simple_moving_average, TrendRegime};
pub use peaks::{detect_peaks, PeakSet};
pub use psychological::{find_psychological_levels, interval_width};
