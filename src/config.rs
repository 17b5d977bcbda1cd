use configparser::ini::Ini;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// Chart Format
pub const ROWS_PER_BEAT: i32 = 48;
pub const BEATS_PER_MEASURE: i32 = 4;
pub const ROWS_PER_MEASURE: i32 = ROWS_PER_BEAT * BEATS_PER_MEASURE;

// Measure Store
/// Measures preallocated up front; typical charts never outgrow this.
pub const MIN_MEASURE_CAPACITY: usize = 256;
/// Histogram buckets, one per possible step count up to a fully-filled measure.
pub const HISTOGRAM_BUCKETS: usize = ROWS_PER_MEASURE as usize + 1;

// Stream Breakdown Defaults
pub const DEFAULT_STREAM_SUBDIVISION: u32 = 16;
pub const DEFAULT_MIN_STREAM_LENGTH: u32 = 1;
pub const DEFAULT_SHORT_BREAK_CUTOFF: u32 = 4;
pub const DEFAULT_SHORT_BREAK_CHAR: char = '-';
pub const DEFAULT_LONG_BREAK_CHAR: char = '/';
pub const NO_STREAMS_TEXT: &str = "No streams";

// Run Density Classes (qualifying units per measure)
pub const RUN16_MIN: u16 = 16;
pub const RUN20_MIN: u16 = 20;
pub const RUN24_MIN: u16 = 24;
pub const RUN32_MIN: u16 = 32;

const PREFS_SECTION: &str = "StreamBreakdown";

#[inline(always)]
pub fn measure_of_row(row: i32) -> usize {
    assert!(row >= 0, "negative row {row}");
    (row / ROWS_PER_MEASURE) as usize
}

#[inline(always)]
pub fn first_row_of_measure(measure: usize) -> i32 {
    measure as i32 * ROWS_PER_MEASURE
}

/// What a measure's stream qualification counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Accumulation {
    /// Every step note counts.
    #[default]
    Step,
    /// Simultaneous steps on one row count once.
    Row,
}

/// How breaks between displayed streams are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BreakStyle {
    /// Short breaks get `short_break_char`, long ones `long_break_char`.
    #[default]
    Marker,
    /// Short breaks get `short_break_char`, long ones their length as `(n)`.
    Length,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityPrefs {
    pub stream_subdivision: u32,
    pub accumulation: Accumulation,
    pub min_stream_length: u32,
    pub short_break_cutoff: u32,
    pub break_style: BreakStyle,
    pub short_break_char: char,
    pub long_break_char: char,
    pub segment_separator: String,
    pub no_streams_text: String,
}

impl Default for DensityPrefs {
    fn default() -> Self {
        Self {
            stream_subdivision: DEFAULT_STREAM_SUBDIVISION,
            accumulation: Accumulation::Step,
            min_stream_length: DEFAULT_MIN_STREAM_LENGTH,
            short_break_cutoff: DEFAULT_SHORT_BREAK_CUTOFF,
            break_style: BreakStyle::Marker,
            short_break_char: DEFAULT_SHORT_BREAK_CHAR,
            long_break_char: DEFAULT_LONG_BREAK_CHAR,
            segment_separator: String::new(),
            no_streams_text: NO_STREAMS_TEXT.to_string(),
        }
    }
}

impl DensityPrefs {
    /// Minimum qualifying units a measure needs to be part of a stream.
    /// Zero means stream detection is off.
    #[inline]
    pub fn threshold(&self) -> u32 {
        self.stream_subdivision
    }

    /// True when switching from `self` to `other` changes which measures qualify.
    pub fn stream_settings_differ(&self, other: &Self) -> bool {
        self.stream_subdivision != other.stream_subdivision
            || self.accumulation != other.accumulation
    }

    /// True when switching from `self` to `other` only changes how the breakdown reads.
    pub fn display_settings_differ(&self, other: &Self) -> bool {
        self.min_stream_length != other.min_stream_length
            || self.short_break_cutoff != other.short_break_cutoff
            || self.break_style != other.break_style
            || self.short_break_char != other.short_break_char
            || self.long_break_char != other.long_break_char
            || self.segment_separator != other.segment_separator
            || self.no_streams_text != other.no_streams_text
    }

    /// Loads preferences from an INI file, writing the defaults out first if it
    /// doesn't exist yet. Keys that fail to parse keep their default.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!(
                "Density preferences not found, creating defaults at '{}'.",
                path.display()
            );
            let defaults = Self::default();
            if let Err(e) = defaults.save(path) {
                warn!("Failed to write default density preferences: {}", e);
            }
            return defaults;
        }

        let mut conf = Ini::new();
        match conf.load(path) {
            Ok(_) => Self::from_ini(&conf),
            Err(e) => {
                warn!(
                    "Failed to load '{}' ({}), using default density preferences.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn from_ini_str(text: &str) -> Result<Self, String> {
        let mut conf = Ini::new();
        conf.read(text.to_string())?;
        Ok(Self::from_ini(&conf))
    }

    fn from_ini(conf: &Ini) -> Self {
        let mut prefs = Self::default();

        if let Some(v) = read_key(conf, "StreamSubdivision", |s| s.parse::<u32>().ok()) {
            prefs.stream_subdivision = v;
        }
        if let Some(v) = read_key(conf, "Accumulation", parse_accumulation) {
            prefs.accumulation = v;
        }
        if let Some(v) = read_key(conf, "MinStreamLength", |s| s.parse::<u32>().ok()) {
            prefs.min_stream_length = v;
        }
        if let Some(v) = read_key(conf, "ShortBreakCutoff", |s| s.parse::<u32>().ok()) {
            prefs.short_break_cutoff = v;
        }
        if let Some(v) = read_key(conf, "BreakStyle", parse_break_style) {
            prefs.break_style = v;
        }
        if let Some(v) = read_key(conf, "ShortBreakChar", single_char) {
            prefs.short_break_char = v;
        }
        if let Some(v) = read_key(conf, "LongBreakChar", single_char) {
            prefs.long_break_char = v;
        }
        if let Some(v) = conf.get(PREFS_SECTION, "SegmentSeparator") {
            prefs.segment_separator = v;
        }
        if let Some(v) = conf.get(PREFS_SECTION, "NoStreamsText") {
            prefs.no_streams_text = v;
        }
        prefs
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        self.to_ini().write(path)
    }

    fn to_ini(&self) -> Ini {
        let mut conf = Ini::new();
        let mut put = |key: &str, value: String| {
            conf.set(PREFS_SECTION, key, Some(value));
        };
        put("StreamSubdivision", self.stream_subdivision.to_string());
        put("Accumulation", match self.accumulation {
            Accumulation::Step => "Step".to_string(),
            Accumulation::Row => "Row".to_string(),
        });
        put("MinStreamLength", self.min_stream_length.to_string());
        put("ShortBreakCutoff", self.short_break_cutoff.to_string());
        put("BreakStyle", match self.break_style {
            BreakStyle::Marker => "Marker".to_string(),
            BreakStyle::Length => "Length".to_string(),
        });
        put("ShortBreakChar", self.short_break_char.to_string());
        put("LongBreakChar", self.long_break_char.to_string());
        put("SegmentSeparator", self.segment_separator.clone());
        put("NoStreamsText", self.no_streams_text.clone());
        conf
    }
}

fn read_key<T>(conf: &Ini, key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let raw = conf.get(PREFS_SECTION, key)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        warn!(
            "Ignoring invalid value '{}' for density preference '{}'.",
            raw,
            key
        );
    }
    parsed
}

fn parse_accumulation(s: &str) -> Option<Accumulation> {
    match s.to_ascii_lowercase().as_str() {
        "step" | "steps" => Some(Accumulation::Step),
        "row" | "rows" => Some(Accumulation::Row),
        _ => None,
    }
}

fn parse_break_style(s: &str) -> Option<BreakStyle> {
    match s.to_ascii_lowercase().as_str() {
        "marker" | "char" => Some(BreakStyle::Marker),
        "length" | "count" => Some(BreakStyle::Length),
        _ => None,
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}
