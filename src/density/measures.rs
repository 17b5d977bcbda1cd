use crate::chart::{ChartView, TempoMap};
use crate::config::{HISTOGRAM_BUCKETS, MIN_MEASURE_CAPACITY, measure_of_row};
use crate::density::resolver;
use log::debug;
use serde::Serialize;

/// Per-measure aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Measure {
    /// Chart time of the measure's first row, in seconds.
    pub start_sec: f64,
    /// Step notes in the measure.
    pub step_count: u16,
    /// Distinct rows holding at least one step.
    pub rows_with_steps: u16,
}

impl Measure {
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.step_count == 0 && self.rows_with_steps == 0
    }
}

#[inline(always)]
fn bucket(step_count: u16) -> usize {
    (step_count as usize).min(HISTOGRAM_BUCKETS - 1)
}

/// Densely indexed per-measure aggregates for `[0, last measure]`.
///
/// Storage is preallocated past the visible range (at least
/// [`MIN_MEASURE_CAPACITY`], and always one measure of lookahead) and every
/// stored measure carries a resolved start time.
#[derive(Debug, Clone)]
pub struct MeasureStore {
    measures: Vec<Measure>,
    visible: usize,
    histogram: Vec<u32>,
}

impl MeasureStore {
    pub fn new(tempo: &TempoMap) -> Self {
        let mut measures = vec![Measure::default(); MIN_MEASURE_CAPACITY];
        resolver::resolve_all(tempo, &mut measures);
        Self {
            measures,
            visible: 0,
            histogram: vec![0; HISTOGRAM_BUCKETS],
        }
    }

    /// Builds a store sized to `chart` with every step counted.
    pub fn from_chart<C: ChartView>(chart: &C) -> Self {
        let mut store = Self::new(chart.tempo_map());
        store.resize_to(chart.last_measure(), chart.tempo_map());

        let mut prev_row = None;
        for note in chart.notes().filter(|n| n.is_step()) {
            let index = measure_of_row(note.row);
            let mut measure = *store.get(index);
            measure.step_count = measure.step_count.saturating_add(1);
            if prev_row != Some(note.row) {
                measure.rows_with_steps = measure.rows_with_steps.saturating_add(1);
                prev_row = Some(note.row);
            }
            store.set(index, measure);
        }
        store
    }

    /// Number of visible measures (`last measure + 1`).
    #[inline]
    pub fn len(&self) -> usize {
        self.visible
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.visible == 0
    }

    /// Allocated measures, including the preallocated tail.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.measures.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Measure] {
        &self.measures[..self.visible]
    }

    pub fn get(&self, index: usize) -> &Measure {
        assert!(
            index < self.visible,
            "measure {} out of range (len {})",
            index,
            self.visible
        );
        &self.measures[index]
    }

    pub fn set(&mut self, index: usize, measure: Measure) {
        assert!(
            index < self.visible,
            "measure {} out of range (len {})",
            index,
            self.visible
        );
        let old = std::mem::replace(&mut self.measures[index], measure);
        self.histogram[bucket(old.step_count)] -= 1;
        self.histogram[bucket(measure.step_count)] += 1;
    }

    /// Start time of the measure after `index`; always stored.
    pub fn end_sec(&self, index: usize) -> f64 {
        self.measures[index + 1].start_sec
    }

    /// Grows or shrinks the visible range to cover `[0, last_measure]`.
    ///
    /// Measures dropped from the end must already be empty; that holds as long
    /// as `last_measure` comes from the same chart the counts were taken from.
    pub fn resize_to(&mut self, last_measure: usize, tempo: &TempoMap) {
        let needed = last_measure + 1;
        if needed > self.visible {
            self.reserve(needed + 1, tempo);
            self.histogram[0] += (needed - self.visible) as u32;
            self.visible = needed;
        } else if needed < self.visible {
            for (offset, m) in self.measures[needed..self.visible].iter().enumerate() {
                assert!(
                    m.is_empty(),
                    "dropping non-empty measure {} on shrink",
                    needed + offset
                );
            }
            self.histogram[0] -= (self.visible - needed) as u32;
            self.visible = needed;

            let keep = MIN_MEASURE_CAPACITY.max((needed + 1) * 2);
            if self.measures.len() > keep * 2 {
                debug!(
                    "Measure store trimmed from {} to {} measures.",
                    self.measures.len(),
                    keep
                );
                self.measures.truncate(keep);
            }
        }
    }

    /// Makes sure at least `wanted` measures are stored, at least doubling
    /// storage whenever it has to grow.
    fn reserve(&mut self, wanted: usize, tempo: &TempoMap) {
        let stored = self.measures.len();
        if wanted <= stored {
            return;
        }
        let grown = wanted.max(stored * 2).max(MIN_MEASURE_CAPACITY);
        debug!("Measure store grown from {} to {} measures.", stored, grown);
        self.measures.resize(grown, Measure::default());
        resolver::resolve_from(tempo, &mut self.measures, stored);
    }

    /// Re-resolves every stored start time after a timing change.
    pub fn retime(&mut self, tempo: &TempoMap) {
        resolver::resolve_all(tempo, &mut self.measures);
    }

    /// How many visible measures hold each exact step count; the last bucket
    /// also collects anything denser than one step per row.
    pub fn histogram(&self) -> &[u32] {
        &self.histogram
    }

    /// Visible measures with at least `steps` steps.
    pub fn measures_with_at_least(&self, steps: u16) -> u32 {
        self.histogram[bucket(steps)..].iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{Chart, NoteEvent};

    #[test]
    fn new_store_is_preallocated() {
        let store = MeasureStore::new(&TempoMap::constant(120.0));
        assert_eq!(store.len(), 0);
        assert_eq!(store.capacity(), MIN_MEASURE_CAPACITY);
        assert_eq!(store.histogram().iter().sum::<u32>(), 0);
    }

    #[test]
    fn growth_at_least_doubles() {
        let tempo = TempoMap::constant(120.0);
        let mut store = MeasureStore::new(&tempo);
        store.resize_to(MIN_MEASURE_CAPACITY, &tempo);
        assert_eq!(store.capacity(), MIN_MEASURE_CAPACITY * 2);
        assert_eq!(store.len(), MIN_MEASURE_CAPACITY + 1);
        // Freshly appended measures are timed: 2s per measure at 120 BPM.
        let last = store.len() - 1;
        assert!((store.get(last).start_sec - last as f64 * 2.0).abs() < 1e-9);
    }

    #[test]
    fn histogram_follows_visible_range() {
        let tempo = TempoMap::constant(120.0);
        let mut store = MeasureStore::new(&tempo);
        store.resize_to(9, &tempo);
        assert_eq!(store.histogram()[0], 10);

        let measure = Measure {
            step_count: 16,
            rows_with_steps: 16,
            ..*store.get(3)
        };
        store.set(3, measure);
        assert_eq!(store.histogram()[0], 9);
        assert_eq!(store.histogram()[16], 1);
        assert_eq!(store.measures_with_at_least(16), 1);
        assert_eq!(store.measures_with_at_least(0), 10);

        let measure = Measure {
            step_count: 0,
            rows_with_steps: 0,
            ..*store.get(3)
        };
        store.set(3, measure);
        store.resize_to(2, &tempo);
        assert_eq!(store.histogram()[0], 3);
        assert_eq!(store.len(), 3);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_read_panics() {
        let tempo = TempoMap::constant(120.0);
        let mut store = MeasureStore::new(&tempo);
        store.resize_to(1, &tempo);
        store.get(2);
    }

    #[test]
    #[should_panic(expected = "non-empty")]
    fn shrinking_over_counts_panics() {
        let tempo = TempoMap::constant(120.0);
        let mut store = MeasureStore::new(&tempo);
        store.resize_to(4, &tempo);
        let measure = Measure {
            step_count: 1,
            rows_with_steps: 1,
            ..*store.get(4)
        };
        store.set(4, measure);
        store.resize_to(1, &tempo);
    }

    #[test]
    fn counts_steps_and_rows() {
        let mut chart = Chart::new(TempoMap::constant(120.0));
        chart.insert(NoteEvent::tap(0, 0)).unwrap();
        chart.insert(NoteEvent::tap(0, 3)).unwrap();
        chart.insert(NoteEvent::tap(12, 1)).unwrap();
        chart.insert(NoteEvent::tap(200, 2)).unwrap();

        let store = MeasureStore::from_chart(&chart);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(0).step_count, 3);
        assert_eq!(store.get(0).rows_with_steps, 2);
        assert_eq!(store.get(1).step_count, 1);
        assert!((store.end_sec(1) - 4.0).abs() < 1e-9);
    }
}
