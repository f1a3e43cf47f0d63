//! Monitoring Loop
//!
//! Wires a `SampleSource` to the history store, analysis and detection, and
//! exposes the pull-based views a reporting layer needs.
//!
//! - **source**: the `SampleSource` trait
//! - **replay**: CSV-backed source for recorded samples
//! - **scheduler**: the `Monitor` sampling loop
//! - **report**: entity summaries, tracking reports, suggestions

pub mod replay;
pub mod report;
pub mod scheduler;
pub mod source;

pub use replay::CsvReplaySource;
pub use report::{
    suggestions, EntitySummary, MemoryDistribution, Suggestion, SuggestionCategory, TrackingReport,
};
pub use scheduler::{Monitor, MonitorSettings, RunOptions, TickSummary};
pub use source::SampleSource;
