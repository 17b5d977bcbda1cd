use proptest::prelude::*;
use stepdensity::density::accumulation::StreamRule;
use stepdensity::density::streams::StreamTracker;
use stepdensity::{
    Accumulation, BreakStyle, Chart, ChartDocument, ChartView, DensityPrefs, DensityTracker,
    NoteEvent, NoteKind, TempoMap, TimingEvent,
};

#[derive(Debug, Clone)]
enum Op {
    Add(Vec<NoteEvent>),
    /// Indices into the chart's current notes, wrapped to its length.
    Remove(Vec<usize>),
}

fn tempo() -> TempoMap {
    TempoMap::new(
        vec![
            TimingEvent::Tempo { row: 0, bpm: 140.0 },
            TimingEvent::Stop {
                row: 384,
                seconds: 0.75,
            },
            TimingEvent::Tempo {
                row: 960,
                bpm: 210.0,
            },
            TimingEvent::Warp {
                row: 1152,
                length: 96,
            },
        ],
        0.1,
    )
}

fn kind_strategy() -> impl Strategy<Value = NoteKind> {
    prop_oneof![
        6 => Just(NoteKind::Tap),
        1 => (0i32..400).prop_map(|length| NoteKind::Hold { length }),
        1 => (0i32..400).prop_map(|length| NoteKind::Roll { length }),
        1 => Just(NoteKind::Mine),
        1 => Just(NoteKind::Lift),
        1 => Just(NoteKind::Fake),
    ]
}

fn note_strategy() -> impl Strategy<Value = NoteEvent> {
    // Eight measures of 16th slots across four lanes, plus one measure before
    // row 0 that the chart has to refuse.
    (-1i32..8, 0i32..16, 0u8..4, kind_strategy())
        .prop_map(|(measure, slot, lane, kind)| NoteEvent {
            row: measure * 192 + slot * 12,
            lane,
            kind,
        })
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => note_strategy().prop_map(|n| Op::Add(vec![n])),
        1 => prop::collection::vec(note_strategy(), 1..32).prop_map(Op::Add),
        2 => any::<usize>().prop_map(|i| Op::Remove(vec![i])),
        1 => prop::collection::vec(any::<usize>(), 1..16).prop_map(Op::Remove),
    ]
}

fn prefs_strategy() -> impl Strategy<Value = DensityPrefs> {
    (
        prop_oneof![Just(Accumulation::Step), Just(Accumulation::Row)],
        0u32..24,
        0u32..3,
        0u32..6,
        any::<bool>(),
    )
        .prop_map(|(accumulation, subdivision, min_length, cutoff, length_style)| {
            let break_style = if length_style {
                BreakStyle::Length
            } else {
                BreakStyle::Marker
            };
            DensityPrefs {
                accumulation,
                stream_subdivision: subdivision,
                min_stream_length: min_length,
                short_break_cutoff: cutoff,
                break_style,
                ..DensityPrefs::default()
            }
        })
}

fn apply(doc: &mut ChartDocument, op: &Op) {
    match op {
        Op::Add(notes) => {
            if notes.len() == 1 {
                let _ = doc.add_note(notes[0]);
            } else {
                doc.add_notes(notes);
            }
        }
        Op::Remove(indices) => {
            let len = doc.chart().len();
            if len == 0 {
                return;
            }
            let positions: Vec<(i32, u8)> = indices
                .iter()
                .filter_map(|i| doc.chart().notes().nth(i % len))
                .map(|n| (n.row, n.lane))
                .collect();
            if positions.len() == 1 {
                doc.remove_note(positions[0].0, positions[0].1);
            } else {
                doc.remove_notes(&positions);
            }
        }
    }
}

/// Asserts `tracker` holds exactly what a from-scratch build over `chart` would.
fn assert_matches_rebuild(tracker: &mut DensityTracker, chart: &Chart) {
    let mut fresh = DensityTracker::new(chart, tracker.prefs().clone());
    assert_eq!(tracker.measures(), fresh.measures());
    assert_eq!(
        tracker.measure_store().histogram(),
        fresh.measure_store().histogram()
    );
    assert_eq!(tracker.segments(), fresh.segments());
    assert_eq!(tracker.breakdown(), fresh.breakdown());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn incremental_matches_rebuild(
        prefs in prefs_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..48),
    ) {
        let mut doc = ChartDocument::new(Chart::new(tempo()), prefs);
        for op in &ops {
            apply(&mut doc, op);
            doc.density().streams().assert_invariants();
        }
        let chart = doc.chart().clone();
        assert_matches_rebuild(doc.density_mut(), &chart);
    }

    #[test]
    fn prefs_and_timing_changes_match_rebuild(
        before in prefs_strategy(),
        after in prefs_strategy(),
        ops in prop::collection::vec(op_strategy(), 1..32),
    ) {
        let mut doc = ChartDocument::new(Chart::new(TempoMap::constant(120.0)), before);
        for op in &ops {
            apply(&mut doc, op);
        }
        doc.breakdown();
        doc.set_prefs(after);
        doc.set_tempo_map(tempo());
        doc.density().streams().assert_invariants();

        let chart = doc.chart().clone();
        assert_matches_rebuild(doc.density_mut(), &chart);
    }

    #[test]
    fn add_then_delete_restores_state(
        prefs in prefs_strategy(),
        base in prop::collection::vec(note_strategy(), 0..64),
        extra in prop::collection::vec(note_strategy(), 1..64),
    ) {
        let mut doc = ChartDocument::new(Chart::new(tempo()), prefs);
        doc.add_notes(&base);

        let measures = doc.density().measures().to_vec();
        let histogram = doc.density().measure_store().histogram().to_vec();
        let segments = doc.density().segments();
        let breakdown = doc.breakdown().to_string();

        let mut added = Vec::new();
        for note in extra {
            if doc.add_note(note).is_ok() {
                added.push((note.row, note.lane));
            }
        }
        for &(row, lane) in added.iter().rev() {
            doc.remove_note(row, lane);
        }

        prop_assert_eq!(doc.density().measures(), &measures[..]);
        prop_assert_eq!(doc.density().measure_store().histogram(), &histogram[..]);
        prop_assert_eq!(doc.density().segments(), segments);
        prop_assert_eq!(doc.breakdown(), breakdown);
    }

    #[test]
    fn raising_threshold_never_adds_stream_measures(
        notes in prop::collection::vec(note_strategy(), 0..160),
        mode in prop_oneof![Just(Accumulation::Step), Just(Accumulation::Row)],
        threshold in 1u32..40,
    ) {
        let mut chart = Chart::new(tempo());
        for note in notes {
            let _ = chart.insert(note);
        }
        let lower = StreamTracker::from_chart(&chart, &StreamRule::new(mode, threshold));
        let higher = StreamTracker::from_chart(&chart, &StreamRule::new(mode, threshold + 1));
        prop_assert!(higher.qualifying_measures() <= lower.qualifying_measures());
    }
}
