use crate::config::{BreakStyle, DensityPrefs};
use crate::density::streams::StreamSegment;

/// Renders stream segments into the compact breakdown string, e.g. `16-8/32`.
///
/// Segments shorter than `min_stream_length` are skipped, but the measures
/// they cover still count towards the break around them.
pub fn format_breakdown<I>(segments: I, prefs: &DensityPrefs) -> String
where
    I: IntoIterator<Item = StreamSegment>,
{
    let mut tokens: Vec<String> = Vec::new();
    let mut prev_last: Option<usize> = None;

    for segment in segments {
        if (segment.len() as u64) < u64::from(prefs.min_stream_length) {
            continue;
        }
        if let Some(prev_last) = prev_last {
            let gap = segment.start - prev_last - 1;
            tokens.push(format_break(gap, prefs));
        }
        tokens.push(segment.len().to_string());
        prev_last = Some(segment.last);
    }

    if tokens.is_empty() {
        return prefs.no_streams_text.clone();
    }
    tokens.join(&prefs.segment_separator)
}

fn format_break(gap: usize, prefs: &DensityPrefs) -> String {
    if gap as u64 <= u64::from(prefs.short_break_cutoff) {
        return prefs.short_break_char.to_string();
    }
    match prefs.break_style {
        BreakStyle::Marker => prefs.long_break_char.to_string(),
        BreakStyle::Length => format!("({})", gap),
    }
}

/// Cached breakdown text, recomputed only after being marked dirty.
#[derive(Debug, Clone)]
pub struct Breakdown {
    text: String,
    dirty: bool,
    renders: u64,
}

impl Default for Breakdown {
    fn default() -> Self {
        Self {
            text: String::new(),
            dirty: true,
            renders: 0,
        }
    }
}

impl Breakdown {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// How many times the text has actually been recomputed.
    pub fn render_count(&self) -> u64 {
        self.renders
    }

    pub fn render<I>(&mut self, segments: I, prefs: &DensityPrefs) -> &str
    where
        I: IntoIterator<Item = StreamSegment>,
    {
        if self.dirty {
            self.text = format_breakdown(segments, prefs);
            self.dirty = false;
            self.renders += 1;
        }
        &self.text
    }
}
