use crate::config::{RUN16_MIN, RUN20_MIN, RUN24_MIN, RUN32_MIN};
use crate::density::accumulation::StreamRule;
use crate::density::measures::MeasureStore;
use crate::density::streams::StreamSegment;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunDensity {
    Run32,
    Run24,
    Run20,
    Run16,
    Break,
}

#[inline]
pub fn categorize_measure_density(units: u16) -> RunDensity {
    match units {
        d if d >= RUN32_MIN => RunDensity::Run32,
        d if d >= RUN24_MIN => RunDensity::Run24,
        d if d >= RUN20_MIN => RunDensity::Run20,
        d if d >= RUN16_MIN => RunDensity::Run16,
        _ => RunDensity::Break,
    }
}

/// Measures per density class between the first and last non-break measure.
#[derive(Default, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StreamCounts {
    pub run16_streams: u32,
    pub run20_streams: u32,
    pub run24_streams: u32,
    pub run32_streams: u32,
    pub total_breaks: u32,
}

pub fn compute_stream_counts(store: &MeasureStore, rule: &StreamRule) -> StreamCounts {
    let mut sc = StreamCounts::default();

    let cats: Vec<RunDensity> = store
        .as_slice()
        .iter()
        .map(|m| categorize_measure_density(rule.units(m)))
        .collect();

    let (Some(start), Some(end)) = (
        cats.iter().position(|&c| c != RunDensity::Break),
        cats.iter().rposition(|&c| c != RunDensity::Break),
    ) else {
        return sc;
    };

    for &cat in &cats[start..=end] {
        match cat {
            RunDensity::Run16 => sc.run16_streams += 1,
            RunDensity::Run20 => sc.run20_streams += 1,
            RunDensity::Run24 => sc.run24_streams += 1,
            RunDensity::Run32 => sc.run32_streams += 1,
            RunDensity::Break => sc.total_breaks += 1,
        }
    }
    sc
}

/// Stream totals over the tracked segments.
#[derive(Default, Clone, Debug, PartialEq, Serialize)]
pub struct StreamSummary {
    pub stream_measures: usize,
    /// Non-stream measures between the first and last segment.
    pub break_measures: usize,
    /// Share of `stream_measures + break_measures` that is stream, 0..=100.
    pub stream_percent: f64,
}

pub fn summarize_streams<I>(segments: I) -> StreamSummary
where
    I: IntoIterator<Item = StreamSegment>,
{
    let mut stream_measures = 0;
    let mut span: Option<(usize, usize)> = None;
    for segment in segments {
        stream_measures += segment.len();
        span = Some(match span {
            Some((first, _)) => (first, segment.last),
            None => (segment.start, segment.last),
        });
    }
    let Some((first, last)) = span else {
        return StreamSummary::default();
    };

    let covered = last - first + 1;
    StreamSummary {
        stream_measures,
        break_measures: covered - stream_measures,
        stream_percent: stream_measures as f64 * 100.0 / covered as f64,
    }
}

/// Steps per second for each visible measure, from resolved start times.
/// Measures that take no time (warped over) report zero.
pub fn compute_measure_nps(store: &MeasureStore) -> Vec<f64> {
    (0..store.len())
        .map(|i| {
            let measure = store.get(i);
            let duration = store.end_sec(i) - measure.start_sec;
            if duration <= 0.0 {
                0.0
            } else {
                f64::from(measure.step_count) / duration
            }
        })
        .collect()
}

pub fn peak_nps(measure_nps: &[f64]) -> f64 {
    measure_nps.iter().copied().fold(0.0, f64::max)
}
