//! Parsers for semi-structured model output.
//!
//! Two families: final-block extraction ([`heuristic`]), which scans the
//! streamed reply for the last anchor, and side-channel extraction
//! ([`side_channel`]), which reads a YAML file the model wrote under the run
//! directory. [`markers`] is the fallback for replies that inline their file.

pub mod answer;
pub mod heuristic;
pub mod kv;
pub mod markers;
pub mod side_channel;

pub use heuristic::{HeuristicItems, HeuristicResult};
