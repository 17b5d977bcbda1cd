//! Measure start times from the chart's tempo map.
//!
//! Both entry points walk measures in order with a cursor into the time
//! points that only ever moves forward, so resolving `n` measures costs
//! `O(n + points)`.

use crate::chart::TempoMap;
use crate::config::first_row_of_measure;
use crate::density::measures::Measure;

/// Recomputes the start time of every measure in `measures`.
pub fn resolve_all(tempo: &TempoMap, measures: &mut [Measure]) {
    walk(tempo, measures, 0, 0);
}

/// Resolves `measures[first..]` only, for when storage grew and nothing
/// before `first` changed.
pub fn resolve_from(tempo: &TempoMap, measures: &mut [Measure], first: usize) {
    if first >= measures.len() {
        return;
    }
    let cursor = tempo.active_index(first_row_of_measure(first));
    walk(tempo, measures, first, cursor);
}

fn walk(tempo: &TempoMap, measures: &mut [Measure], first: usize, mut cursor: usize) {
    let points = tempo.points();
    assert!(!points.is_empty(), "tempo map has no initial tempo");

    for (index, measure) in measures.iter_mut().enumerate().skip(first) {
        let row = first_row_of_measure(index);
        while cursor + 1 < points.len() && points[cursor + 1].row <= row {
            cursor += 1;
        }
        measure.start_sec = points[cursor].time_at(row);
    }
}
