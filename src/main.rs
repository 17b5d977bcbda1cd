use log::{LevelFilter, error, info, warn};
use serde::Deserialize;
use std::error::Error;
use std::path::Path;
use stepdensity::{Chart, ChartDocument, DensityPrefs, NoteEvent, TempoMap, TimingEvent};

const DEFAULT_PREFS_PATH: &str = "save/density.ini";

/// Notes and timing to load into a document, as JSON.
#[derive(Debug, Deserialize)]
struct ChartInput {
    #[serde(default)]
    offset_sec: f64,
    #[serde(default)]
    timing: Vec<TimingEvent>,
    notes: Vec<NoteEvent>,
    #[serde(default)]
    end_row: Option<i32>,
}

fn main() -> Result<(), Box<dyn Error>> {
    // --- Logging Setup ---
    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .filter_module("stepdensity::density", LevelFilter::Debug)
        .init();

    // --- Arguments ---
    let mut args = std::env::args().skip(1);
    let Some(input_path) = args.next() else {
        error!("Usage: stepdensity <chart.json> [density.ini]");
        return Err("missing chart input".into());
    };
    let prefs_path = args
        .next()
        .unwrap_or_else(|| DEFAULT_PREFS_PATH.to_string());

    // --- Load Preferences and Chart ---
    let prefs = DensityPrefs::load(Path::new(&prefs_path));
    let text = std::fs::read_to_string(&input_path)?;
    let input: ChartInput = match serde_json::from_str(&text) {
        Ok(input) => input,
        Err(e) => {
            error!("Failed to parse chart '{}': {}", input_path, e);
            return Err(e.into());
        }
    };
    info!(
        "Loaded {} notes and {} timing events from '{}'.",
        input.notes.len(),
        input.timing.len(),
        input_path
    );

    // --- Build Document ---
    let chart = Chart::new(TempoMap::new(input.timing, input.offset_sec));
    let mut doc = ChartDocument::new(chart, prefs);
    let rejected = doc.add_notes(&input.notes);
    if !rejected.is_empty() {
        info!("Skipped {} notes that could not be placed.", rejected.len());
    }
    match input.end_row {
        Some(row) if row < 0 => warn!("Ignoring end marker at negative row {}.", row),
        Some(row) => doc.set_end_marker(Some(row)),
        None => {}
    }

    // --- Report ---
    info!("Stream breakdown: {}", doc.breakdown());
    let snapshot = doc.density_mut().snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
