use crate::chart::{Chart, ChartEvent, NoteEvent, TempoMap};
use crate::config::DensityPrefs;
use crate::density::DensityTracker;
use log::warn;

/// A chart together with its density tracker. The tracker is created with the
/// chart, sees every edit right after the chart applies it and is dropped
/// with it.
pub struct ChartDocument {
    chart: Chart,
    density: DensityTracker,
}

impl ChartDocument {
    pub fn new(chart: Chart, prefs: DensityPrefs) -> Self {
        let density = DensityTracker::new(&chart, prefs);
        Self { chart, density }
    }

    pub fn chart(&self) -> &Chart {
        &self.chart
    }

    pub fn density(&self) -> &DensityTracker {
        &self.density
    }

    pub fn density_mut(&mut self) -> &mut DensityTracker {
        &mut self.density
    }

    pub fn breakdown(&mut self) -> &str {
        self.density.breakdown()
    }

    pub fn add_note(&mut self, note: NoteEvent) -> Result<(), NoteEvent> {
        self.chart.insert(note)?;
        self.density.add_event(&self.chart, &ChartEvent::Note(note));
        Ok(())
    }

    /// Adds every note that fits; notes landing on an occupied lane and row
    /// are returned unapplied.
    pub fn add_notes(&mut self, notes: &[NoteEvent]) -> Vec<NoteEvent> {
        let mut added = Vec::with_capacity(notes.len());
        let mut rejected = Vec::new();
        for &note in notes {
            match self.chart.insert(note) {
                Ok(()) => added.push(ChartEvent::Note(note)),
                Err(note) => rejected.push(note),
            }
        }
        if !rejected.is_empty() {
            warn!(
                "{} notes skipped: before row 0 or lane already taken.",
                rejected.len()
            );
        }
        if !added.is_empty() {
            self.density.add_events(&self.chart, &added);
        }
        rejected
    }

    pub fn remove_note(&mut self, row: i32, lane: u8) -> Option<NoteEvent> {
        let note = self.chart.remove(row, lane)?;
        self.density
            .delete_event(&self.chart, &ChartEvent::Note(note));
        Some(note)
    }

    /// Removes the notes at each `(row, lane)`, returning the ones that existed.
    pub fn remove_notes(&mut self, positions: &[(i32, u8)]) -> Vec<NoteEvent> {
        let removed: Vec<NoteEvent> = positions
            .iter()
            .filter_map(|&(row, lane)| self.chart.remove(row, lane))
            .collect();
        if !removed.is_empty() {
            let events: Vec<ChartEvent> = removed.iter().copied().map(ChartEvent::Note).collect();
            self.density.delete_events(&self.chart, &events);
        }
        removed
    }

    /// Moves the end marker. Moving it earlier or clearing it is reported as
    /// a delete of the old marker, moving it later as an add.
    pub fn set_end_marker(&mut self, row: Option<i32>) {
        let old = self.chart.end_marker();
        self.chart.set_end_marker(row);
        match (old, row) {
            (Some(old), Some(new)) if new == old => {}
            (Some(old), Some(new)) if new < old => self.removed_end_marker(old),
            (_, Some(new)) => {
                let event = ChartEvent::EndMarker { row: new };
                self.density.add_event(&self.chart, &event);
            }
            (Some(old), None) => self.removed_end_marker(old),
            (None, None) => {}
        }
    }

    fn removed_end_marker(&mut self, old: i32) {
        let event = ChartEvent::EndMarker { row: old };
        self.density.delete_event(&self.chart, &event);
    }

    pub fn set_tempo_map(&mut self, tempo: TempoMap) {
        self.chart.set_tempo_map(tempo);
        self.density.on_timing_changed(&self.chart);
    }

    pub fn set_prefs(&mut self, prefs: DensityPrefs) {
        self.density.set_prefs(&self.chart, prefs);
    }
}
