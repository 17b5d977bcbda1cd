//! The chart side of the density tracker: what the tracker reads from a chart,
//! plus a small in-memory chart and the document that ties one to its tracker.

pub mod document;
pub mod note;
pub mod tempo;

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

pub use document::ChartDocument;
pub use note::{ChartEvent, NoteEvent, NoteKind};
pub use tempo::{TempoMap, TimePoint, TimingEvent};

use crate::config::measure_of_row;
use log::warn;

/// Read access the density tracker needs from the chart it belongs to.
///
/// Every query reflects the chart *after* the mutation being reported.
pub trait ChartView {
    /// All notes, ordered by row (then lane).
    fn notes(&self) -> impl Iterator<Item = &NoteEvent> + '_;

    fn tempo_map(&self) -> &TempoMap;

    /// Number of step-bearing notes on `row`.
    fn steps_at_row(&self, row: i32) -> u32;

    /// Last row holding anything: a note, a hold tail or the end marker.
    fn last_row(&self) -> i32;

    fn last_measure(&self) -> usize {
        measure_of_row(self.last_row().max(0))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Chart {
    notes: BTreeMap<(i32, u8), NoteEvent>,
    steps_per_row: BTreeMap<i32, u32>,
    /// Multiset of note end rows, for cheap last-row queries.
    end_rows: BTreeMap<i32, u32>,
    end_marker: Option<i32>,
    tempo: TempoMap,
}

impl Chart {
    pub fn new(tempo: TempoMap) -> Self {
        Self {
            tempo,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn note_at(&self, row: i32, lane: u8) -> Option<&NoteEvent> {
        self.notes.get(&(row, lane))
    }

    /// Inserts a note. Notes before row 0 are refused, and a note already
    /// occupying the same lane and row wins; the rejected note is handed back.
    pub fn insert(&mut self, note: NoteEvent) -> Result<(), NoteEvent> {
        if note.row < 0 {
            warn!("Refusing note before row 0: {:?}", note);
            return Err(note);
        }
        match self.notes.entry((note.row, note.lane)) {
            Entry::Occupied(_) => return Err(note),
            Entry::Vacant(slot) => {
                slot.insert(note);
            }
        }
        if note.is_step() {
            *self.steps_per_row.entry(note.row).or_insert(0) += 1;
        }
        *self.end_rows.entry(note.end_row()).or_insert(0) += 1;
        Ok(())
    }

    /// Removes the note on `lane` at `row`, returning what was stored there.
    pub fn remove(&mut self, row: i32, lane: u8) -> Option<NoteEvent> {
        let note = self.notes.remove(&(row, lane))?;
        if note.is_step() {
            decrement(&mut self.steps_per_row, note.row);
        }
        decrement(&mut self.end_rows, note.end_row());
        Some(note)
    }

    pub fn end_marker(&self) -> Option<i32> {
        self.end_marker
    }

    pub fn set_end_marker(&mut self, row: Option<i32>) {
        self.end_marker = row;
    }

    pub fn set_tempo_map(&mut self, tempo: TempoMap) {
        self.tempo = tempo;
    }
}

fn decrement(counts: &mut BTreeMap<i32, u32>, key: i32) {
    if let Entry::Occupied(mut entry) = counts.entry(key) {
        *entry.get_mut() -= 1;
        if *entry.get() == 0 {
            entry.remove();
        }
    }
}

impl ChartView for Chart {
    fn notes(&self) -> impl Iterator<Item = &NoteEvent> + '_ {
        self.notes.values()
    }

    fn tempo_map(&self) -> &TempoMap {
        &self.tempo
    }

    fn steps_at_row(&self, row: i32) -> u32 {
        self.steps_per_row.get(&row).copied().unwrap_or(0)
    }

    fn last_row(&self) -> i32 {
        let last_note = self.end_rows.keys().next_back().copied().unwrap_or(0);
        last_note.max(self.end_marker.unwrap_or(0))
    }
}
