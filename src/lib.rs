// GEMMSCALE LIBRARY
// SCALING-MEASUREMENT PIPELINE: PLAN, RUN, DERIVE, PLOT.
// THE BINARY (main.rs) ONLY ADDS CLI PARSING, LOGGING AND SIGNAL HANDLING.

pub mod chart;
pub mod config;
pub mod error;
pub mod metrics;
pub mod plan;
pub mod report;
pub mod runner;
pub mod study;
pub mod topology;

pub use error::{Result, StudyError};
