//! Step density and stream breakdown, kept up to date as a chart is edited.
//!
//! The chart reports every mutation after applying it; the tracker updates
//! the affected measure counts, moves stream boundaries when a measure
//! crosses the threshold and only re-renders the breakdown when a stream
//! actually changed. Observers are told about changes over `mpsc` channels.

pub mod accumulation;
pub mod breakdown;
pub mod measures;
pub mod resolver;
pub mod stats;
pub mod streams;

use crate::chart::{ChartEvent, ChartView};
use crate::config::{DensityPrefs, measure_of_row};
use accumulation::StreamRule;
use breakdown::Breakdown;
use log::{debug, info};
use measures::{Measure, MeasureStore};
use serde::Serialize;
use stats::{StreamCounts, StreamSummary};
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender, channel};
use streams::{StreamSegment, StreamTracker};

/// Sent to subscribers after each mutation batch or recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DensityEvent {
    /// Counts changed after an add/delete call.
    MeasuresChanged { measure_count: usize },
    /// Every measure start time was recomputed.
    TimingRecomputed,
    /// Stream segments were rebuilt from scratch.
    StreamsRebuilt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edit {
    Add,
    Delete,
}

/// Everything a density graph or stats panel needs, in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct DensitySnapshot {
    pub measures: Vec<Measure>,
    pub measure_nps: Vec<f64>,
    pub peak_nps: f64,
    pub segments: Vec<StreamSegment>,
    pub breakdown: String,
    pub summary: StreamSummary,
    pub counts: StreamCounts,
}

pub struct DensityTracker {
    prefs: DensityPrefs,
    rule: StreamRule,
    measures: MeasureStore,
    streams: StreamTracker,
    breakdown: Breakdown,
    rendered_revision: Option<u64>,
    subscribers: Vec<Sender<DensityEvent>>,
}

impl DensityTracker {
    pub fn new<C: ChartView>(chart: &C, prefs: DensityPrefs) -> Self {
        let rule = StreamRule::new(prefs.accumulation, prefs.threshold());
        let measures = MeasureStore::from_chart(chart);
        let streams = StreamTracker::from_chart(chart, &rule);
        info!(
            "Density tracker ready: {} measures, {} stream segments.",
            measures.len(),
            streams.len()
        );
        Self {
            prefs,
            rule,
            measures,
            streams,
            breakdown: Breakdown::new(),
            rendered_revision: None,
            subscribers: Vec::new(),
        }
    }

    pub fn prefs(&self) -> &DensityPrefs {
        &self.prefs
    }

    pub fn rule(&self) -> &StreamRule {
        &self.rule
    }

    /// Per-measure aggregates for `[0, last measure]`.
    pub fn measures(&self) -> &[Measure] {
        self.measures.as_slice()
    }

    pub fn measure_store(&self) -> &MeasureStore {
        &self.measures
    }

    pub fn streams(&self) -> &StreamTracker {
        &self.streams
    }

    pub fn segments(&self) -> Vec<StreamSegment> {
        self.streams.segments()
    }

    pub fn subscribe(&mut self) -> Receiver<DensityEvent> {
        let (tx, rx) = channel();
        self.subscribers.push(tx);
        rx
    }

    /// The formatted breakdown; recomputed only if something changed since
    /// the last call.
    pub fn breakdown(&mut self) -> &str {
        let revision = self.streams.revision();
        if self.rendered_revision != Some(revision) {
            self.breakdown.mark_dirty();
            self.rendered_revision = Some(revision);
        }
        self.breakdown.render(self.streams.iter(), &self.prefs)
    }

    /// Times the breakdown text has been recomputed.
    pub fn render_count(&self) -> u64 {
        self.breakdown.render_count()
    }

    pub fn add_event<C: ChartView>(&mut self, chart: &C, event: &ChartEvent) {
        self.add_events(chart, std::slice::from_ref(event));
    }

    /// Same result as adding each event in turn, with a single notification.
    pub fn add_events<C: ChartView>(&mut self, chart: &C, events: &[ChartEvent]) {
        self.measures
            .resize_to(chart.last_measure(), chart.tempo_map());
        self.apply(chart, events, Edit::Add);
        self.finish_edit();
    }

    pub fn delete_event<C: ChartView>(&mut self, chart: &C, event: &ChartEvent) {
        self.delete_events(chart, std::slice::from_ref(event));
    }

    /// Same result as deleting each event in turn, with a single notification.
    pub fn delete_events<C: ChartView>(&mut self, chart: &C, events: &[ChartEvent]) {
        self.apply(chart, events, Edit::Delete);
        self.measures
            .resize_to(chart.last_measure(), chart.tempo_map());
        self.finish_edit();
    }

    /// The chart's tempo map changed: re-resolve every measure start time.
    pub fn on_timing_changed<C: ChartView>(&mut self, chart: &C) {
        self.measures
            .resize_to(chart.last_measure(), chart.tempo_map());
        self.measures.retime(chart.tempo_map());
        debug!(
            "Measure start times recomputed for {} measures.",
            self.measures.len()
        );
        self.emit(DensityEvent::TimingRecomputed);
    }

    /// Applies new preferences, rebuilding streams only when qualification
    /// changed and re-rendering only when the display changed.
    pub fn set_prefs<C: ChartView>(&mut self, chart: &C, prefs: DensityPrefs) {
        let rebuild = self.prefs.stream_settings_differ(&prefs);
        let redisplay = self.prefs.display_settings_differ(&prefs);
        self.prefs = prefs;
        if rebuild {
            self.rebuild_streams(chart);
        } else if redisplay {
            self.breakdown.mark_dirty();
        }
    }

    /// Re-derives every stream from the chart's notes under the current prefs.
    pub fn rebuild_streams<C: ChartView>(&mut self, chart: &C) {
        self.rule = StreamRule::new(self.prefs.accumulation, self.prefs.threshold());
        self.streams.rebuild(chart, &self.rule);
        self.breakdown.mark_dirty();
        self.emit(DensityEvent::StreamsRebuilt);
    }

    pub fn stream_summary(&self) -> StreamSummary {
        stats::summarize_streams(self.streams.iter())
    }

    pub fn stream_counts(&self) -> StreamCounts {
        stats::compute_stream_counts(&self.measures, &self.rule)
    }

    pub fn measure_nps(&self) -> Vec<f64> {
        stats::compute_measure_nps(&self.measures)
    }

    pub fn snapshot(&mut self) -> DensitySnapshot {
        let measure_nps = self.measure_nps();
        DensitySnapshot {
            measures: self.measures().to_vec(),
            peak_nps: stats::peak_nps(&measure_nps),
            measure_nps,
            segments: self.segments(),
            breakdown: self.breakdown().to_string(),
            summary: self.stream_summary(),
            counts: self.stream_counts(),
        }
    }

    fn apply<C: ChartView>(&mut self, chart: &C, events: &[ChartEvent], edit: Edit) {
        // Steps per row within this batch, to tell when a row gained its
        // first step or lost its last one.
        let mut batch_rows: HashMap<i32, u32> = HashMap::new();
        for note in events.iter().filter_map(ChartEvent::step) {
            *batch_rows.entry(note.row).or_insert(0) += 1;
        }

        for note in events.iter().filter_map(ChartEvent::step) {
            let Some(remaining) = batch_rows.get_mut(&note.row) else {
                continue;
            };
            let first_at_row = *remaining > 0;
            let row_flipped = first_at_row
                && match edit {
                    Edit::Add => chart.steps_at_row(note.row) == *remaining,
                    Edit::Delete => chart.steps_at_row(note.row) == 0,
                };
            // Only the first event seen for a row may flip it.
            *remaining = 0;
            self.update_measure(measure_of_row(note.row), edit, row_flipped);
        }
    }

    fn update_measure(&mut self, index: usize, edit: Edit, row_flipped: bool) {
        let old = *self.measures.get(index);
        let mut new = old;
        match edit {
            Edit::Add => {
                new.step_count += 1;
                new.rows_with_steps += row_flipped as u16;
            }
            Edit::Delete => {
                new.step_count = old
                    .step_count
                    .checked_sub(1)
                    .unwrap_or_else(|| panic!("step count underflow in measure {}", index));
                new.rows_with_steps = old
                    .rows_with_steps
                    .checked_sub(row_flipped as u16)
                    .unwrap_or_else(|| panic!("row count underflow in measure {}", index));
            }
        }
        self.measures.set(index, new);

        match (self.rule.qualifies(&old), self.rule.qualifies(&new)) {
            (false, true) => self.streams.measure_qualified(index),
            (true, false) => self.streams.measure_disqualified(index),
            _ => {}
        }
    }

    fn finish_edit(&mut self) {
        self.emit(DensityEvent::MeasuresChanged {
            measure_count: self.measures.len(),
        });
    }

    fn emit(&mut self, event: DensityEvent) {
        self.subscribers.retain(|tx| tx.send(event).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{Chart, NoteEvent, TempoMap};

    fn tap(row: i32, lane: u8) -> ChartEvent {
        ChartEvent::Note(NoteEvent::tap(row, lane))
    }

    fn add(chart: &mut Chart, tracker: &mut DensityTracker, event: ChartEvent) {
        if let ChartEvent::Note(note) = event {
            chart.insert(note).unwrap();
        }
        tracker.add_event(chart, &event);
    }

    #[test]
    fn jump_counts_one_row() {
        let mut chart = Chart::new(TempoMap::constant(120.0));
        let mut tracker = DensityTracker::new(&chart, DensityPrefs::default());
        add(&mut chart, &mut tracker, tap(0, 0));
        add(&mut chart, &mut tracker, tap(0, 3));
        assert_eq!(tracker.measures()[0].step_count, 2);
        assert_eq!(tracker.measures()[0].rows_with_steps, 1);
    }

    #[test]
    fn batch_jump_counts_one_row() {
        let mut chart = Chart::new(TempoMap::constant(120.0));
        let mut tracker = DensityTracker::new(&chart, DensityPrefs::default());
        let events = [tap(0, 0), tap(0, 1), tap(0, 2), tap(48, 0)];
        for e in &events {
            if let ChartEvent::Note(n) = e {
                chart.insert(*n).unwrap();
            }
        }
        tracker.add_events(&chart, &events);
        assert_eq!(tracker.measures()[0].step_count, 4);
        assert_eq!(tracker.measures()[0].rows_with_steps, 2);

        chart.remove(0, 0);
        chart.remove(0, 1);
        tracker.delete_events(&chart, &[tap(0, 0), tap(0, 1)]);
        assert_eq!(tracker.measures()[0].rows_with_steps, 2);
        chart.remove(0, 2);
        tracker.delete_event(&chart, &tap(0, 2));
        assert_eq!(tracker.measures()[0].step_count, 1);
        assert_eq!(tracker.measures()[0].rows_with_steps, 1);
    }

    #[test]
    fn end_marker_only_resizes() {
        let mut chart = Chart::new(TempoMap::constant(120.0));
        let mut tracker = DensityTracker::new(&chart, DensityPrefs::default());
        chart.set_end_marker(Some(192 * 9));
        tracker.add_event(&chart, &ChartEvent::EndMarker { row: 192 * 9 });
        assert_eq!(tracker.measures().len(), 10);
        assert!(tracker.measures().iter().all(|m| m.step_count == 0));

        chart.set_end_marker(None);
        tracker.delete_event(&chart, &ChartEvent::EndMarker { row: 192 * 9 });
        assert_eq!(tracker.measures().len(), 1);
    }

    #[test]
    fn one_notification_per_batch() {
        let mut chart = Chart::new(TempoMap::constant(120.0));
        let mut tracker = DensityTracker::new(&chart, DensityPrefs::default());
        let rx = tracker.subscribe();
        let events: Vec<ChartEvent> = (0..32).map(|i| tap(i * 12, 0)).collect();
        for e in &events {
            if let ChartEvent::Note(n) = e {
                chart.insert(*n).unwrap();
            }
        }
        tracker.add_events(&chart, &events);
        let received: Vec<DensityEvent> = rx.try_iter().collect();
        assert_eq!(received, vec![DensityEvent::MeasuresChanged { measure_count: 2 }]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let chart = Chart::default();
        let mut tracker = DensityTracker::new(&chart, DensityPrefs::default());
        let rx = tracker.subscribe();
        drop(tracker.subscribe());
        tracker.on_timing_changed(&chart);
        assert_eq!(tracker.subscribers.len(), 1);
        assert_eq!(rx.try_recv(), Ok(DensityEvent::TimingRecomputed));
    }

    #[test]
    fn timing_change_moves_start_times() {
        let mut chart = Chart::new(TempoMap::constant(120.0));
        let mut tracker = DensityTracker::new(&chart, DensityPrefs::default());
        add(&mut chart, &mut tracker, tap(192 * 3, 0));
        assert!((tracker.measures()[3].start_sec - 6.0).abs() < 1e-9);

        chart.set_tempo_map(TempoMap::constant(240.0));
        tracker.on_timing_changed(&chart);
        assert!((tracker.measures()[3].start_sec - 3.0).abs() < 1e-9);
        // Preallocated measures past the end follow too.
        assert!((tracker.measure_store().end_sec(3) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn display_prefs_rerender_without_rebuild() {
        let mut chart = Chart::new(TempoMap::constant(120.0));
        let mut tracker = DensityTracker::new(&chart, DensityPrefs::default());
        for measure in [0, 5] {
            for i in 0..16 {
                add(&mut chart, &mut tracker, tap(measure * 192 + i * 12, 0));
            }
        }
        assert_eq!(tracker.breakdown(), "1-1");
        let rx = tracker.subscribe();

        let prefs = DensityPrefs {
            short_break_cutoff: 3,
            ..DensityPrefs::default()
        };
        tracker.set_prefs(&chart, prefs);
        assert_eq!(tracker.breakdown(), "1/1");
        assert!(rx.try_recv().is_err());
        assert_eq!(tracker.rule().threshold(), 16);

        let prefs = DensityPrefs {
            stream_subdivision: 17,
            ..tracker.prefs().clone()
        };
        tracker.set_prefs(&chart, prefs);
        assert_eq!(rx.try_recv(), Ok(DensityEvent::StreamsRebuilt));
        assert_eq!(tracker.rule().threshold(), 17);
        assert_eq!(tracker.breakdown(), "No streams");
    }
}
