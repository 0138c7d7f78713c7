use std::fs;

use fileconv::backend::Backends;
use fileconv::command::{CommandRunner, StageCommand};
use fileconv::config::Config;
use fileconv::error::ConvError;
use fileconv::pipeline::Pipeline;
use tempfile::TempDir;

fn runner() -> CommandRunner {
    CommandRunner::new(Backends::from_config(&Config::default()))
}

#[test]
fn three_stage_pipeline_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("work");

    let mut pipeline = Pipeline::create(&dir);
    pipeline.add_stage("stage_1", StageCommand::parse("text convert toml").unwrap()).unwrap();
    pipeline.add_stage("stage_2", StageCommand::parse("text compress").unwrap()).unwrap();
    pipeline.add_stage("stage_3", StageCommand::parse("hash create").unwrap()).unwrap();
    pipeline.save_config().unwrap();

    fs::write(dir.join("one.json"), r#"{"name": "one", "size": 1}"#).unwrap();
    fs::write(dir.join("two.json"), r#"{"name": "two", "size": 2}"#).unwrap();

    let loaded = Pipeline::load(&dir).unwrap();
    let mut progress = Vec::new();
    let report = loaded.execute(&runner(), false, &mut |p: f64| progress.push(p)).unwrap();

    assert_eq!(report.stages_run, 3);
    assert_eq!(report.outputs, vec![dir.join("stage_3").join("CHECKSUM.sha256")]);
    assert!(dir.join("stage_1").join("one.toml").exists());
    assert!(dir.join("stage_2").join("two_compressed.toml").exists());

    let listing = fs::read_to_string(dir.join("stage_3").join("CHECKSUM.sha256")).unwrap();
    assert!(listing.contains("one_compressed.toml"));
    assert!(listing.contains("two_compressed.toml"));

    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(progress.last().copied(), Some(100.0));
    assert!(progress.iter().all(|p| (0.0..=100.0).contains(p)));

    // The pipeline never touches its inputs
    assert!(dir.join("one.json").exists());
}

#[test]
fn failing_stage_reports_its_index_and_stops() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();

    let mut pipeline = Pipeline::create(dir);
    pipeline.add_stage("stage_1", StageCommand::parse("text compress").unwrap()).unwrap();
    pipeline.add_stage("stage_2", StageCommand::parse("text convert toml").unwrap()).unwrap();
    pipeline.add_stage("stage_3", StageCommand::parse("hash create").unwrap()).unwrap();
    pipeline.save_config().unwrap();

    // A top-level array has no TOML representation
    fs::write(dir.join("list.json"), "[1, 2, 3]").unwrap();

    let err = pipeline.execute(&runner(), false, &mut |_: f64| {}).unwrap_err();
    match err {
        ConvError::Stage { stage, file, .. } => {
            assert_eq!(stage, 2);
            assert_eq!(file, Some(dir.join("stage_1").join("list_compressed.json")));
        }
        other => panic!("expected a stage error, got {:?}", other),
    }
    assert!(!dir.join("stage_3").join("CHECKSUM.sha256").exists());
}
