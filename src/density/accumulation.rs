use crate::config::Accumulation;
use crate::density::measures::Measure;

type UnitCounter = fn(&Measure) -> u16;

fn steps(m: &Measure) -> u16 {
    m.step_count
}

fn rows(m: &Measure) -> u16 {
    m.rows_with_steps
}

/// Decides whether a measure belongs to a stream.
///
/// Chosen once per accumulation mode and threshold, and shared by the
/// incremental path and the full rebuild so both always agree.
#[derive(Debug, Clone, Copy)]
pub struct StreamRule {
    mode: Accumulation,
    units: UnitCounter,
    threshold: u32,
}

impl StreamRule {
    pub fn new(mode: Accumulation, threshold: u32) -> Self {
        let units: UnitCounter = match mode {
            Accumulation::Step => steps,
            Accumulation::Row => rows,
        };
        Self {
            mode,
            units,
            threshold,
        }
    }

    pub fn mode(&self) -> Accumulation {
        self.mode
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// The measure's count in this rule's mode.
    #[inline(always)]
    pub fn units(&self, measure: &Measure) -> u16 {
        (self.units)(measure)
    }

    /// A zero threshold disables streams entirely.
    #[inline(always)]
    pub fn qualifies(&self, measure: &Measure) -> bool {
        self.threshold > 0 && u32::from(self.units(measure)) >= self.threshold
    }
}
