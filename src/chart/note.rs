use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteKind {
    Tap,
    Hold { length: i32 },
    Roll { length: i32 },
    Mine,
    Lift,
    Fake,
}

impl NoteKind {
    /// Taps, hold heads and roll heads are the notes a player steps on.
    #[inline(always)]
    pub fn is_step(self) -> bool {
        matches!(
            self,
            NoteKind::Tap | NoteKind::Hold { .. } | NoteKind::Roll { .. }
        )
    }

    #[inline(always)]
    pub fn tail_length(self) -> i32 {
        match self {
            NoteKind::Hold { length } | NoteKind::Roll { length } => length.max(0),
            _ => 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub row: i32,
    pub lane: u8,
    pub kind: NoteKind,
}

impl NoteEvent {
    pub fn tap(row: i32, lane: u8) -> Self {
        Self {
            row,
            lane,
            kind: NoteKind::Tap,
        }
    }

    #[inline(always)]
    pub fn is_step(&self) -> bool {
        self.kind.is_step()
    }

    /// Last row this note occupies (the tail row for holds and rolls).
    #[inline(always)]
    pub fn end_row(&self) -> i32 {
        self.row + self.kind.tail_length()
    }
}

/// Anything the chart reports to the density tracker.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartEvent {
    Note(NoteEvent),
    /// Structural end-of-chart marker; moves the chart end but holds no steps.
    EndMarker { row: i32 },
}

impl ChartEvent {
    pub fn row(&self) -> i32 {
        match self {
            ChartEvent::Note(note) => note.row,
            ChartEvent::EndMarker { row } => *row,
        }
    }

    pub fn step(&self) -> Option<&NoteEvent> {
        match self {
            ChartEvent::Note(note) if note.is_step() => Some(note),
            _ => None,
        }
    }
}

impl From<NoteEvent> for ChartEvent {
    fn from(note: NoteEvent) -> Self {
        ChartEvent::Note(note)
    }
}
