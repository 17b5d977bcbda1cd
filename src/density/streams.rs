//! Stream intervals: maximal runs of consecutive qualifying measures.
//!
//! Segments live in a generational arena and are addressed by [`SegmentId`],
//! so removing "this segment" never depends on comparing start/last values.
//! A `BTreeMap` keyed by start measure keeps them ordered for lookups.
//!
//! Stored segments never overlap and never touch: two qualifying measures
//! next to each other always share a segment. Every lookup that relies on
//! that checks it and panics if it doesn't hold.

use crate::chart::ChartView;
use crate::config::measure_of_row;
use crate::density::accumulation::StreamRule;
use crate::density::measures::Measure;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// Inclusive measure range `[start, last]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamSegment {
    pub start: usize,
    pub last: usize,
}

impl StreamSegment {
    pub fn new(start: usize, last: usize) -> Self {
        assert!(start <= last, "segment start {} after last {}", start, last);
        Self { start, last }
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.last - self.start + 1
    }

    #[inline(always)]
    pub fn contains(&self, measure: usize) -> bool {
        self.start <= measure && measure <= self.last
    }
}

/// Stable handle to a stored segment. Goes stale once the segment is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    segment: Option<StreamSegment>,
}

#[derive(Debug, Clone, Default)]
pub struct StreamTracker {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_start: BTreeMap<usize, SegmentId>,
    revision: u64,
}

impl StreamTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the segments for `chart` from scratch.
    pub fn from_chart<C: ChartView>(chart: &C, rule: &StreamRule) -> Self {
        let mut tracker = Self::new();
        tracker.rebuild(chart, rule);
        tracker
    }

    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }

    /// Bumped on every change to the stored segments.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, id: SegmentId) -> Option<&StreamSegment> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.segment.as_ref())
    }

    /// Segments in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = StreamSegment> + '_ {
        self.by_start.values().map(|&id| *self.resolve(id))
    }

    pub fn segments(&self) -> Vec<StreamSegment> {
        self.iter().collect()
    }

    /// Total measures covered by streams.
    pub fn qualifying_measures(&self) -> usize {
        self.iter().map(|s| s.len()).sum()
    }

    /// Segments overlapping `[lo, hi]`, in descending order.
    pub fn overlapping(&self, lo: usize, hi: usize) -> Vec<SegmentId> {
        self.by_start
            .range(..=hi)
            .rev()
            .map(|(_, &id)| id)
            .take_while(|&id| self.resolve(id).last >= lo)
            .collect()
    }

    /// The segment containing `measure`, if any.
    pub fn containing(&self, measure: usize) -> Option<SegmentId> {
        let ids = self.overlapping(measure, measure);
        assert!(
            ids.len() <= 1,
            "{} segments overlap measure {}",
            ids.len(),
            measure
        );
        ids.first().copied()
    }

    pub fn insert(&mut self, segment: StreamSegment) -> SegmentId {
        let touching = self.overlapping(segment.start.saturating_sub(1), segment.last + 1);
        assert!(
            touching.is_empty(),
            "segment {:?} would overlap or touch {:?}",
            segment,
            touching
                .iter()
                .map(|&id| *self.resolve(id))
                .collect::<Vec<_>>()
        );

        let id = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.segment = Some(segment);
                SegmentId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    segment: Some(segment),
                });
                SegmentId {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        self.by_start.insert(segment.start, id);
        self.revision += 1;
        id
    }

    pub fn remove(&mut self, id: SegmentId) -> StreamSegment {
        let slot = match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation && slot.segment.is_some() => slot,
            _ => panic!("stale segment handle {:?}", id),
        };
        let segment = match slot.segment.take() {
            Some(segment) => segment,
            None => unreachable!(),
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);

        let indexed = self.by_start.remove(&segment.start);
        assert_eq!(
            indexed,
            Some(id),
            "segment {:?} missing from start index",
            segment
        );
        self.revision += 1;
        segment
    }

    pub fn clear(&mut self) {
        for id in std::mem::take(&mut self.by_start).into_values() {
            let slot = &mut self.slots[id.index as usize];
            slot.segment = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(id.index);
        }
        self.revision += 1;
    }

    /// `measure` just reached the threshold.
    pub fn measure_qualified(&mut self, measure: usize) {
        assert!(
            self.containing(measure).is_none(),
            "measure {} already inside a stream",
            measure
        );

        let before = measure.checked_sub(1).and_then(|m| self.containing(m));
        let after = self.containing(measure + 1);

        let merged = match (before, after) {
            (Some(before), Some(after)) => {
                let before = self.remove(before);
                let after = self.remove(after);
                StreamSegment::new(before.start, after.last)
            }
            (Some(before), None) => StreamSegment::new(self.remove(before).start, measure),
            (None, Some(after)) => StreamSegment::new(measure, self.remove(after).last),
            (None, None) => StreamSegment::new(measure, measure),
        };
        self.insert(merged);
    }

    /// `measure` just dropped below the threshold.
    pub fn measure_disqualified(&mut self, measure: usize) {
        let ids = self.overlapping(measure, measure);
        assert_eq!(
            ids.len(),
            1,
            "expected exactly one segment over measure {}",
            measure
        );
        let segment = self.remove(ids[0]);

        if segment.start == measure && segment.last == measure {
            return;
        }
        if measure == segment.start {
            self.insert(StreamSegment::new(measure + 1, segment.last));
        } else if measure == segment.last {
            self.insert(StreamSegment::new(segment.start, measure - 1));
        } else {
            self.insert(StreamSegment::new(segment.start, measure - 1));
            self.insert(StreamSegment::new(measure + 1, segment.last));
        }
    }

    /// Throws everything away and rescans the chart's step notes in one pass.
    pub fn rebuild<C: ChartView>(&mut self, chart: &C, rule: &StreamRule) {
        self.clear();

        let mut runs = RunBuilder::default();
        let mut current: Option<(usize, Measure)> = None;
        let mut prev_row = None;

        for note in chart.notes().filter(|n| n.is_step()) {
            let index = measure_of_row(note.row);
            if current.is_some_and(|(m, _)| m != index) {
                if let Some((done, acc)) = current.take() {
                    runs.push(done, rule.qualifies(&acc));
                }
            }
            let (_, acc) = current.get_or_insert((index, Measure::default()));
            acc.step_count = acc.step_count.saturating_add(1);
            if prev_row != Some(note.row) {
                acc.rows_with_steps = acc.rows_with_steps.saturating_add(1);
                prev_row = Some(note.row);
            }
        }
        if let Some((done, acc)) = current {
            runs.push(done, rule.qualifies(&acc));
        }

        for segment in runs.finish() {
            self.insert(segment);
        }
        debug!(
            "Rebuilt {} stream segments ({:?} mode, threshold {}).",
            self.len(),
            rule.mode(),
            rule.threshold()
        );
    }

    /// Panics unless segments are sorted, non-overlapping and non-adjacent.
    pub fn assert_invariants(&self) {
        let mut prev: Option<StreamSegment> = None;
        for (&start, &id) in &self.by_start {
            let segment = *self.resolve(id);
            assert_eq!(
                segment.start,
                start,
                "start index out of sync for {:?}",
                segment
            );
            if let Some(prev) = prev {
                assert!(
                    prev.last + 1 < segment.start,
                    "segments {:?} and {:?} touch",
                    prev,
                    segment
                );
            }
            prev = Some(segment);
        }
        let live = self.slots.iter().filter(|s| s.segment.is_some()).count();
        assert_eq!(live, self.by_start.len(), "arena holds unindexed segments");
    }

    fn resolve(&self, id: SegmentId) -> &StreamSegment {
        match self.get(id) {
            Some(segment) => segment,
            None => panic!("stale segment handle {:?}", id),
        }
    }
}

/// Greedily extends or closes runs as measures arrive in ascending order.
#[derive(Default)]
struct RunBuilder {
    done: Vec<StreamSegment>,
    open: Option<StreamSegment>,
}

impl RunBuilder {
    fn push(&mut self, measure: usize, qualifies: bool) {
        if !qualifies {
            self.done.extend(self.open.take());
            return;
        }
        if let Some(run) = self.open.as_mut().filter(|run| run.last + 1 == measure) {
            run.last = measure;
            return;
        }
        self.done.extend(self.open.take());
        self.open = Some(StreamSegment::new(measure, measure));
    }

    fn finish(mut self) -> Vec<StreamSegment> {
        self.done.extend(self.open.take());
        self.done
    }
}
