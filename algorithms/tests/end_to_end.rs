//! Whole-sequence scenarios over registry banks and JSON events.

use std::collections::BTreeSet;
use std::fs;

use bankseq::{AlgorithmSequence, BankList, Error, ErrorKind, OptionValue};
use bankseq_algorithms::event_io::Event;
use bankseq_algorithms::{
    DEFAULT_BANKS, EventBuilderFilter, MomentumScaleCorrection, SectorFinder, ZVertexFilter,
    factory,
};
use serde_json::{Value as Json, json};

fn event(value: Json) -> Event {
    serde_json::from_value(value).unwrap()
}

fn particle_event(pids: &[i32]) -> Event {
    event(json!({ "REC::Particle": { "pid": pids } }))
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

#[test]
fn test_filter_scenario() {
    let mut banks = BankList::from_registry(&["REC::Particle"]).unwrap();
    particle_event(&[11, 211, 13]).fill(&mut banks).unwrap();

    let mut sequence = AlgorithmSequence::new("filter");
    sequence.add(EventBuilderFilter::new()).unwrap();
    sequence
        .set_option("clas12::EventBuilderFilter", "pids", BTreeSet::from([11, 211]))
        .unwrap();
    sequence.start(&mut banks).unwrap();
    sequence.run(&mut banks).unwrap();

    assert_eq!(banks.get(0).unwrap().row_list(), vec![0, 1]);
    sequence.stop().unwrap();
}

#[test]
fn test_filters_narrow_monotonically_and_are_idempotent() {
    let mut banks = BankList::from_registry(&["REC::Particle"]).unwrap();
    event(json!({
        "REC::Particle": {
            "pid":    [11,   211,  11,   2212, 11],
            "vz":     [0.0,  0.0,  -30,  0.0,  5.0],
            "status": [2100, 2100, 2100, 2100, 1100]
        }
    }))
    .fill(&mut banks)
    .unwrap();

    let mut sequence = AlgorithmSequence::new("narrowing");
    sequence.add(EventBuilderFilter::new()).unwrap();
    sequence.add(ZVertexFilter::new()).unwrap();
    sequence.start(&mut banks).unwrap();

    let steps = sequence.run_traced(&mut banks).unwrap();
    let active: Vec<usize> = steps.iter().map(|s| s.active_rows[0].1).collect();
    assert_eq!(active, vec![4, 3]);
    let after_first = banks.get(0).unwrap().row_list();
    assert_eq!(after_first, vec![0, 1, 4]);

    // same event again, without a reset
    sequence.run(&mut banks).unwrap();
    assert_eq!(banks.get(0).unwrap().row_list(), after_first);
}

#[test]
fn test_later_filter_not_seen_by_earlier_creator() {
    let mut banks = BankList::from_registry(&DEFAULT_BANKS).unwrap();
    let mut sequence = AlgorithmSequence::new("ordering");
    sequence.add(SectorFinder::new()).unwrap();
    sequence.add(EventBuilderFilter::new()).unwrap();
    sequence.start(&mut banks).unwrap();
    let sector_bank = sequence
        .created_bank_index(&banks, "clas12::SectorFinder")
        .unwrap();

    for pids in [&[11, 13, 2212][..], &[13, 211, 22, 11][..]] {
        event(json!({
            "REC::Particle": { "pid": pids, "charge": vec![-1; pids.len()] },
            "RUN::config": { "torus": [-1.0] }
        }))
        .fill(&mut banks)
        .unwrap();
        sequence.run(&mut banks).unwrap();

        let particles = banks.bank("REC::Particle").unwrap();
        let sectors = banks.get(sector_bank).unwrap();
        assert!(particles.active_rows() < pids.len());
        // the creator ran before the filter, on every row
        assert_eq!(sectors.row_list(), (0..pids.len()).collect::<Vec<_>>());
    }
}

// ---------------------------------------------------------------------------
// Creators
// ---------------------------------------------------------------------------

#[test]
fn test_created_bank_scenario() {
    let mut banks = BankList::from_registry(&["REC::Particle", "REC::Track"]).unwrap();
    let mut sequence = AlgorithmSequence::new("creator");
    sequence.add(SectorFinder::new()).unwrap();
    for option in ["bank_charged", "bank_uncharged"] {
        sequence.set_option("clas12::SectorFinder", option, "REC::Track").unwrap();
    }
    sequence.start(&mut banks).unwrap();

    let index = sequence
        .created_bank_index(&banks, "clas12::SectorFinder")
        .unwrap();
    assert_eq!(index, 2);
    assert_eq!(banks.get(index).unwrap().name(), "REC::Particle::Sector");

    for (pids, sectors) in [(vec![11, 211, 2212], vec![4, 0, 2]), (vec![22], vec![4])] {
        event(json!({
            "REC::Particle": { "pid": pids, "charge": vec![1; pids.len()] },
            "REC::Track": { "detector": [6, 6, 5], "sector": [4, 2, 1], "pindex": [0, 2, 1] }
        }))
        .fill(&mut banks)
        .unwrap();
        sequence.run(&mut banks).unwrap();

        assert_eq!(
            sequence.created_bank_index(&banks, "clas12::SectorFinder").unwrap(),
            index
        );
        let created = banks.get(index).unwrap();
        assert_eq!(created.rows(), banks.bank("REC::Particle").unwrap().rows());
        assert_eq!(created.column::<i32>("sector").unwrap(), sectors.as_slice());
    }
}

#[test]
fn test_not_a_creator() {
    let mut banks = BankList::from_registry(&["REC::Particle"]).unwrap();
    let mut sequence = AlgorithmSequence::new("lookup");
    sequence.add(EventBuilderFilter::new()).unwrap();
    sequence.start(&mut banks).unwrap();
    assert!(matches!(
        sequence.created_bank_index(&banks, "clas12::EventBuilderFilter"),
        Err(Error::NotACreator(_))
    ));
    assert!(matches!(
        sequence.created_bank_index(&banks, "nothing"),
        Err(Error::AlgorithmNotFound { .. })
    ));
}

#[test]
fn test_creator_placed_too_late() {
    let mut banks = BankList::from_registry(&DEFAULT_BANKS).unwrap();
    let mut sequence = AlgorithmSequence::new("late");
    sequence.add(MomentumScaleCorrection::new()).unwrap();
    sequence.add(SectorFinder::new()).unwrap();
    let err = sequence.start(&mut banks).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert!(matches!(
        err.root(),
        Error::BankNotFound { bank, .. } if bank == "REC::Particle::Sector"
    ));
    assert!(sequence.is_started());
    // only the first stage tried to start; stopping skips the rest
    assert!(sequence.stop().is_ok());
}

// ---------------------------------------------------------------------------
// Building and configuration
// ---------------------------------------------------------------------------

#[test]
fn test_duplicate_add_leaves_sequence_unchanged() {
    let factory = factory().unwrap();
    let mut sequence = AlgorithmSequence::new("dup");
    sequence
        .add_from_factory(&factory, "clas12::ZVertexFilter", Some("vz"))
        .unwrap();
    sequence.add(EventBuilderFilter::new()).unwrap();
    let before = sequence.to_string();

    let err = sequence
        .add_from_factory(&factory, "clas12::EventBuilderFilter", Some("vz"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateName);
    let err = sequence.add(EventBuilderFilter::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateName);

    assert_eq!(sequence.len(), 2);
    assert_eq!(sequence.to_string(), before);
}

#[test]
fn test_configuration_precedence() {
    let dir = tempfile::tempdir().unwrap();
    let sequence_file = dir.path().join("sequence.json");
    let algorithm_file = dir.path().join("ebf.json");
    fs::write(&sequence_file, r#"{"clas12::EventBuilderFilter": {"pids": [2112]}}"#).unwrap();
    fs::write(&algorithm_file, r#"{"ebf": {"pids": [2212, 22]}}"#).unwrap();

    // layers: 3 = override, 2 = algorithm file, 1 = sequence file, 0 = default
    let resolved = |layers: usize| {
        let mut sequence = AlgorithmSequence::new("precedence");
        if layers >= 1 {
            sequence.set_config_file_for_each_algorithm(&sequence_file);
        }
        sequence.add_named("ebf", EventBuilderFilter::new()).unwrap();
        if layers >= 2 {
            sequence.set_config_file("ebf", &algorithm_file).unwrap();
        }
        if layers >= 3 {
            sequence.set_option("ebf", "pids", BTreeSet::from([-11])).unwrap();
        }
        let mut banks = BankList::from_registry(&["REC::Particle"]).unwrap();
        sequence.start(&mut banks).unwrap();
        sequence.get("ebf").unwrap().resolved_options()["pids"].clone()
    };

    assert_eq!(resolved(3), OptionValue::IntSet(BTreeSet::from([-11])));
    assert_eq!(resolved(2), OptionValue::IntSet(BTreeSet::from([22, 2212])));
    assert_eq!(resolved(1), OptionValue::IntSet(BTreeSet::from([2112])));
    assert_eq!(resolved(0), OptionValue::IntSet(BTreeSet::from([11, 211])));
}

#[test]
fn test_mistyped_file_value() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("cfg.json"), r#"{"clas12::ZVertexFilter": {"cuts": "wide"}}"#)
        .unwrap();

    let mut sequence = AlgorithmSequence::new("typed");
    sequence.set_config_directory_for_each_algorithm(dir.path());
    sequence.set_config_file_for_each_algorithm("cfg.json");
    sequence.add(ZVertexFilter::new()).unwrap();
    let mut banks = BankList::from_registry(&["REC::Particle"]).unwrap();
    let err = sequence.start(&mut banks).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(matches!(
        err.root(),
        Error::OptionTypeMismatch { option, .. } if option == "cuts"
    ));
}

// ---------------------------------------------------------------------------
// Full chain
// ---------------------------------------------------------------------------

#[test]
fn test_full_chain() {
    let factory = factory().unwrap();
    let mut banks = BankList::from_registry(&DEFAULT_BANKS).unwrap();
    let mut sequence = AlgorithmSequence::new("chain");
    for class in [
        "clas12::SectorFinder",
        "clas12::MomentumScaleCorrection",
        "clas12::EventBuilderFilter",
        "clas12::ZVertexFilter",
    ] {
        sequence.add_from_factory(&factory, class, None).unwrap();
    }
    sequence.start(&mut banks).unwrap();

    event(json!({
        "REC::Particle": {
            "pid":    [11,   211,  2212, 11],
            "charge": [-1,   1,    1,    -1],
            "px":     [1.0,  0.0,  0.0,  0.0],
            "pz":     [2.0,  3.0,  4.0,  5.0],
            "vz":     [0.0,  0.0,  0.0,  -20.0],
            "status": [2100, 2100, 2100, 2100]
        },
        "RUN::config": { "torus": [-1.0] },
        "REC::Track": { "detector": [6, 6], "sector": [3, 5], "pindex": [0, 2] }
    }))
    .fill(&mut banks)
    .unwrap();
    sequence.run(&mut banks).unwrap();

    let particles = banks.bank("REC::Particle").unwrap();
    assert_eq!(particles.row_list(), vec![0, 1]);

    let correction = MomentumScaleCorrection::new();
    let (px, _, pz) = correction.transform(1.0, 0.0, 2.0, 3, 11, -1.0);
    assert_eq!(particles.get::<f32>("px", 0).unwrap(), px);
    assert_eq!(particles.get::<f32>("pz", 0).unwrap(), pz);
    // no sector, so no correction
    assert_eq!(particles.get::<f32>("pz", 1).unwrap(), 3.0);
    let (_, _, pz) = correction.transform(0.0, 0.0, 4.0, 5, 2212, -1.0);
    assert_eq!(particles.get::<f32>("pz", 2).unwrap(), pz);

    let out = Event::from_banks(&banks).unwrap();
    assert_eq!(out.banks["REC::Particle"]["pid"], vec![json!(11), json!(211)]);
    assert_eq!(
        out.banks["REC::Particle::Sector"]["sector"],
        vec![json!(3), json!(0), json!(5), json!(0)]
    );

    sequence.stop().unwrap();
}

#[test]
fn test_empty_run_config_is_a_data_error() {
    let mut banks = BankList::from_registry(&DEFAULT_BANKS).unwrap();
    let mut sequence = AlgorithmSequence::new("no-config");
    sequence.add(SectorFinder::new()).unwrap();
    sequence.add(MomentumScaleCorrection::new()).unwrap();
    sequence.start(&mut banks).unwrap();

    particle_event(&[11]).fill(&mut banks).unwrap();
    let err = sequence.run(&mut banks).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Data);
    assert!(matches!(
        err,
        Error::Run { ref algorithm, .. } if algorithm == "clas12::MomentumScaleCorrection"
    ));
}
