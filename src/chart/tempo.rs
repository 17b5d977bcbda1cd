use crate::config::ROWS_PER_BEAT;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BPM: f64 = 120.0;

/// A rate-altering event, positioned by row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TimingEvent {
    Tempo { row: i32, bpm: f64 },
    Stop { row: i32, seconds: f64 },
    /// Rows in `[row, row + length)` are skipped over in zero time.
    Warp { row: i32, length: i32 },
}

impl TimingEvent {
    pub fn row(&self) -> i32 {
        match *self {
            TimingEvent::Tempo { row, .. }
            | TimingEvent::Stop { row, .. }
            | TimingEvent::Warp { row, .. } => row,
        }
    }
}

/// A row where the rate changes, with the chart time on arrival and on
/// departure (they differ when a stop sits on the row).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePoint {
    pub row: i32,
    pub arrival_sec: f64,
    pub departure_sec: f64,
    pub bpm: f64,
    pub seconds_per_row: f64,
}

impl TimePoint {
    #[inline(always)]
    pub fn time_at(&self, row: i32) -> f64 {
        if row == self.row {
            self.arrival_sec
        } else if row > self.row {
            self.departure_sec + (row - self.row) as f64 * self.seconds_per_row
        } else {
            self.arrival_sec - (self.row - row) as f64 * self.seconds_per_row
        }
    }
}

/// The chart's ordered rate-event list, resolved into time points.
///
/// There is always a point at row 0 carrying the initial tempo.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    events: Vec<TimingEvent>,
    points: Vec<TimePoint>,
    offset_sec: f64,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::new(Vec::new(), 0.0)
    }
}

impl TempoMap {
    pub fn new(mut events: Vec<TimingEvent>, offset_sec: f64) -> Self {
        events.retain(|e| match *e {
            e if e.row() < 0 => {
                warn!("Ignoring timing event before row 0: {:?}", e);
                false
            }
            TimingEvent::Tempo { row, bpm } if !(bpm.is_finite() && bpm > 0.0) => {
                warn!("Ignoring non-positive BPM {} at row {}.", bpm, row);
                false
            }
            TimingEvent::Stop { row, seconds } if !seconds.is_finite() => {
                warn!("Ignoring non-finite stop at row {}.", row);
                false
            }
            TimingEvent::Warp { length, .. } => length > 0,
            _ => true,
        });
        events.sort_by_key(TimingEvent::row);

        let first_tempo = events.iter().find_map(|e| match *e {
            TimingEvent::Tempo { row, bpm } => Some((row, bpm)),
            _ => None,
        });
        match first_tempo {
            Some((0, _)) => {}
            Some((_, bpm)) => events.insert(0, TimingEvent::Tempo { row: 0, bpm }),
            None => events.insert(
                0,
                TimingEvent::Tempo {
                    row: 0,
                    bpm: DEFAULT_BPM,
                },
            ),
        }

        let points = build_points(&events, offset_sec);
        debug!(
            "Tempo map resolved {} events into {} time points.",
            events.len(),
            points.len()
        );
        Self {
            events,
            points,
            offset_sec,
        }
    }

    /// A single constant tempo from row 0.
    pub fn constant(bpm: f64) -> Self {
        Self::new(vec![TimingEvent::Tempo { row: 0, bpm }], 0.0)
    }

    pub fn events(&self) -> &[TimingEvent] {
        &self.events
    }

    pub fn points(&self) -> &[TimePoint] {
        &self.points
    }

    pub fn offset_sec(&self) -> f64 {
        self.offset_sec
    }

    /// Index of the last time point at or before `row`.
    pub fn active_index(&self, row: i32) -> usize {
        self.points
            .partition_point(|p| p.row <= row)
            .saturating_sub(1)
    }

    pub fn time_at_row(&self, row: i32) -> f64 {
        self.points[self.active_index(row)].time_at(row)
    }

    pub fn bpm_at_row(&self, row: i32) -> f64 {
        self.points[self.active_index(row)].bpm
    }

    pub fn max_bpm(&self) -> f64 {
        self.points.iter().map(|p| p.bpm).fold(0.0, f64::max)
    }
}

fn build_points(events: &[TimingEvent], offset_sec: f64) -> Vec<TimePoint> {
    let warps: Vec<(i32, i32)> = events
        .iter()
        .filter_map(|e| match *e {
            TimingEvent::Warp { row, length } => Some((row, row + length)),
            _ => None,
        })
        .collect();
    let in_warp = |row: i32| warps.iter().any(|&(start, end)| row >= start && row < end);

    let mut rows: Vec<i32> = events.iter().map(TimingEvent::row).collect();
    rows.extend(warps.iter().map(|&(_, end)| end));
    rows.sort_unstable();
    rows.dedup();

    let mut points: Vec<TimePoint> = Vec::with_capacity(rows.len());
    let mut event_idx = 0;
    let mut bpm = DEFAULT_BPM;
    let mut time = offset_sec;
    let mut prev_row = 0;
    let mut prev_spr = 0.0;

    for row in rows {
        let mut stop_sec = 0.0;
        while event_idx < events.len() && events[event_idx].row() == row {
            match events[event_idx] {
                TimingEvent::Tempo { bpm: b, .. } => bpm = b,
                TimingEvent::Stop { seconds, .. } => stop_sec += seconds,
                TimingEvent::Warp { .. } => {}
            }
            event_idx += 1;
        }

        let arrival_sec = time + (row - prev_row) as f64 * prev_spr;
        let departure_sec = arrival_sec + stop_sec;
        let seconds_per_row = if in_warp(row) {
            0.0
        } else {
            60.0 / (bpm * ROWS_PER_BEAT as f64)
        };

        points.push(TimePoint {
            row,
            arrival_sec,
            departure_sec,
            bpm,
            seconds_per_row,
        });
        time = departure_sec;
        prev_row = row;
        prev_spr = seconds_per_row;
    }
    points
}
