//! Incremental step-density and stream-breakdown tracking for a rhythm-game
//! chart editor.
//!
//! A [`DensityTracker`] is owned 1:1 by a chart (see [`ChartDocument`]) and
//! keeps per-measure step counts, measure start times and stream segments in
//! sync as notes are added and removed, so a single edit never rescans the
//! whole chart.

pub mod chart;
pub mod config;
pub mod density;

pub use chart::{
    Chart, ChartDocument, ChartEvent, ChartView, NoteEvent, NoteKind, TempoMap, TimingEvent,
};
pub use config::{Accumulation, BreakStyle, DensityPrefs};
pub use density::{DensityEvent, DensitySnapshot, DensityTracker};
