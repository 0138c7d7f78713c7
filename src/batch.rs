use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConvError, Result};
use crate::output_path::Naming;
use crate::progress::{ProgressAggregator, ProgressScope};

/// One input file (or file set) and the output it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    inputs: Vec<PathBuf>,
    output: PathBuf,
    overwrite: bool,
    index: usize,
}

impl WorkItem {
    /// First (for per-file batches, only) input.
    pub fn input(&self) -> &Path {
        &self.inputs[0]
    }

    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// Position of this item in processing order.
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// One output per input
    PerFile,
    /// All inputs feed a single output (merge, checksum list)
    Aggregate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Directory(PathBuf),
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct BatchDescriptor {
    pub inputs: Vec<PathBuf>,
    pub target: OutputTarget,
    pub naming: Naming,
    pub mode: BatchMode,
    pub overwrite: bool,
    pub steps_per_unit: usize,
    /// False for checks: nothing is written, inputs pass through
    pub writes_output: bool,
}

impl BatchDescriptor {
    pub fn per_file<P: Into<PathBuf>>(inputs: Vec<PathBuf>, output_dir: P) -> Self {
        Self {
            inputs,
            target: OutputTarget::Directory(output_dir.into()),
            naming: Naming::default(),
            mode: BatchMode::PerFile,
            overwrite: false,
            steps_per_unit: 1,
            writes_output: true,
        }
    }

    pub fn aggregate(inputs: Vec<PathBuf>, target: OutputTarget) -> Self {
        Self {
            inputs,
            target,
            naming: Naming::default(),
            mode: BatchMode::Aggregate,
            overwrite: false,
            steps_per_unit: 1,
            writes_output: true,
        }
    }

    pub fn naming(mut self, naming: Naming) -> Self {
        self.naming = naming;
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn steps_per_unit(mut self, steps: usize) -> Self {
        self.steps_per_unit = steps;
        self
    }

    pub fn check_only(mut self) -> Self {
        self.writes_output = false;
        self
    }
}

/// Outputs produced by a finished batch, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outputs: Vec<PathBuf>,
}

pub struct BatchProcessor {
    descriptor: BatchDescriptor,
}

impl BatchProcessor {
    /// Validate the descriptor and that every input exists.
    pub fn new(descriptor: BatchDescriptor) -> Result<Self> {
        if descriptor.inputs.is_empty() {
            return Err(ConvError::NoInputFiles);
        }
        if descriptor.steps_per_unit < 1 {
            return Err(ConvError::InvalidArgument(
                "steps per file must be >= 1".to_string(),
            ));
        }
        if descriptor.mode == BatchMode::PerFile
            && descriptor.inputs.len() > 1
            && matches!(descriptor.target, OutputTarget::File(_))
        {
            return Err(ConvError::InvalidArgument(
                "an explicit output file needs exactly one input".to_string(),
            ));
        }

        for input in &descriptor.inputs {
            if !input.exists() {
                return Err(ConvError::FileNotFound(input.clone()));
            }
        }

        Ok(Self { descriptor })
    }

    pub fn descriptor(&self) -> &BatchDescriptor {
        &self.descriptor
    }

    /// Resolve every work item without touching the filesystem.
    pub fn work_items(&self) -> Vec<WorkItem> {
        let d = &self.descriptor;
        match d.mode {
            BatchMode::PerFile => d
                .inputs
                .iter()
                .enumerate()
                .map(|(index, input)| WorkItem {
                    inputs: vec![input.clone()],
                    output: self.output_for(input),
                    overwrite: d.overwrite,
                    index,
                })
                .collect(),
            BatchMode::Aggregate => vec![WorkItem {
                inputs: d.inputs.clone(),
                output: self.output_for(&d.inputs[0]),
                overwrite: d.overwrite,
                index: 0,
            }],
        }
    }

    fn output_for(&self, input: &Path) -> PathBuf {
        match &self.descriptor.target {
            OutputTarget::File(path) => path.clone(),
            OutputTarget::Directory(dir) => self.descriptor.naming.resolve(input, dir),
        }
    }

    /// Pre-flight checks; nothing has been processed when this fails.
    pub fn validate(&self, items: &[WorkItem]) -> Result<()> {
        if !self.descriptor.writes_output {
            return Ok(());
        }

        if let OutputTarget::Directory(dir) = &self.descriptor.target {
            if dir.exists() && !dir.is_dir() {
                return Err(ConvError::NotADirectory(dir.clone()));
            }
        }

        let mut seen = HashSet::new();
        for item in items {
            if !seen.insert(output_key(item.output())) {
                return Err(ConvError::DuplicateOutput(item.output().to_path_buf()));
            }
            for input in item.inputs() {
                if same_file(input, item.output()) {
                    return Err(ConvError::SamePath(item.output().to_path_buf()));
                }
            }
            if !item.overwrite && item.output().exists() {
                return Err(ConvError::FileExists(item.output().to_path_buf()));
            }
        }
        Ok(())
    }

    /// Run `callback` once per work item, in input order.
    ///
    /// Overall progress goes to `sink`. The first callback error aborts the
    /// batch and is returned unchanged.
    pub fn execute<F>(&self, sink: &mut dyn FnMut(f64), mut callback: F) -> Result<BatchReport>
    where
        F: FnMut(&WorkItem, &mut ProgressScope<'_>) -> Result<()>,
    {
        let items = self.work_items();
        self.validate(&items)?;

        if self.descriptor.writes_output {
            for item in &items {
                let parent = item.output().parent().filter(|p| !p.as_os_str().is_empty());
                if let Some(parent) = parent {
                    fs::create_dir_all(parent)?;
                }
            }
        }

        info!("Processing {} file(s) ...", self.descriptor.inputs.len());
        let mut aggregator = ProgressAggregator::new(items.len(), self.descriptor.steps_per_unit)?;
        let mut report = BatchReport::default();

        for item in &items {
            debug!("Processing '{}' -> '{}'", item.input().display(), item.output().display());

            let mut scope = ProgressScope::new(&mut aggregator, sink, item.index);
            callback(item, &mut scope)?;
            scope.finish_unit()?;

            if self.descriptor.writes_output {
                report.outputs.push(item.output().to_path_buf());
            } else {
                report.outputs.extend(item.inputs().iter().cloned());
            }
        }

        info!("Processed {} work item(s)", items.len());
        Ok(report)
    }
}

// Outputs don't exist yet, so only the parent can be canonicalized.
fn output_key(path: &Path) -> PathBuf {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, name).unwrap();
        path
    }

    #[test]
    fn test_empty_input_list_is_rejected() {
        let result = BatchProcessor::new(BatchDescriptor::per_file(vec![], "out"));
        assert!(matches!(result, Err(ConvError::NoInputFiles)));
    }

    #[test]
    fn test_missing_input_is_rejected_at_construction() {
        let tmp = TempDir::new().unwrap();
        let present = touch(tmp.path(), "a.txt");
        let missing = tmp.path().join("missing.txt");

        let result = BatchProcessor::new(BatchDescriptor::per_file(
            vec![present, missing.clone()],
            tmp.path().join("out"),
        ));
        match result {
            Err(ConvError::FileNotFound(path)) => assert_eq!(path, missing),
            other => panic!("expected FileNotFound, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_conflict_aborts_before_any_callback() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "a.txt");
        let b = touch(tmp.path(), "b.txt");
        let out = tmp.path().join("out");
        fs::create_dir(&out).unwrap();
        let conflicting = touch(&out, "b_x.txt");

        let processor = BatchProcessor::new(
            BatchDescriptor::per_file(vec![a, b], &out).naming(Naming::with_suffix("_x")),
        )
        .unwrap();

        let mut calls = 0;
        let result = processor.execute(&mut |_: f64| {}, |_, _| {
            calls += 1;
            Ok(())
        });

        match result {
            Err(ConvError::FileExists(path)) => assert_eq!(path, conflicting),
            other => panic!("expected FileExists, got {:?}", other),
        }
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_inputs_sharing_a_name_are_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("one")).unwrap();
        fs::create_dir(tmp.path().join("two")).unwrap();
        let first = touch(tmp.path(), "one/data.json");
        let second = touch(tmp.path(), "two/data.json");
        let out = tmp.path().join("out");

        for overwrite in [false, true] {
            let processor = BatchProcessor::new(
                BatchDescriptor::per_file(vec![first.clone(), second.clone()], &out)
                    .naming(Naming::with_suffix("_compressed"))
                    .overwrite(overwrite),
            )
            .unwrap();

            let mut calls = 0;
            let result = processor.execute(&mut |_: f64| {}, |_, _| {
                calls += 1;
                Ok(())
            });
            match result {
                Err(ConvError::DuplicateOutput(path)) => {
                    assert_eq!(path, out.join("data_compressed.json"))
                }
                other => panic!("expected DuplicateOutput, got {:?}", other),
            }
            assert_eq!(calls, 0);
        }
    }

    #[test]
    fn test_extension_override_collision_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let json = touch(tmp.path(), "cfg.json");
        let toml = touch(tmp.path(), "cfg.toml");

        let processor = BatchProcessor::new(
            BatchDescriptor::per_file(vec![json, toml], tmp.path().join("out"))
                .naming(Naming::with_extension("toml")),
        )
        .unwrap();
        let result = processor.execute(&mut |_: f64| {}, |_, _| Ok(()));
        assert!(matches!(result, Err(ConvError::DuplicateOutput(_))));
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn test_overwrite_allows_existing_output() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "a.txt");
        let out = tmp.path().join("out");
        fs::create_dir(&out).unwrap();
        touch(&out, "a.txt");

        let processor =
            BatchProcessor::new(BatchDescriptor::per_file(vec![a], &out).overwrite(true)).unwrap();
        let report = processor.execute(&mut |_: f64| {}, |_, _| Ok(())).unwrap();
        assert_eq!(report.outputs, vec![out.join("a.txt")]);
    }

    #[test]
    fn test_same_path_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "a.txt");

        let processor = BatchProcessor::new(
            BatchDescriptor::per_file(vec![a.clone()], tmp.path()).overwrite(true),
        )
        .unwrap();
        let result = processor.execute(&mut |_: f64| {}, |_, _| Ok(()));
        assert!(matches!(result, Err(ConvError::SamePath(p)) if p == a));
    }

    #[test]
    fn test_callbacks_run_in_input_order_with_progress() {
        let tmp = TempDir::new().unwrap();
        let inputs: Vec<PathBuf> = ["c.txt", "a.txt", "b.txt"]
            .iter()
            .map(|n| touch(tmp.path(), n))
            .collect();
        let out = tmp.path().join("nested/out");

        let processor = BatchProcessor::new(
            BatchDescriptor::per_file(inputs.clone(), &out).naming(Naming::with_extension("md")),
        )
        .unwrap();

        let mut seen = Vec::new();
        let mut progress = Vec::new();
        let report = processor
            .execute(&mut |p: f64| progress.push(p), |item, scope| {
                seen.push(item.input().to_path_buf());
                scope.update(50.0)?;
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, inputs);
        assert!(out.is_dir());
        assert_eq!(
            report.outputs,
            vec![out.join("c.md"), out.join("a.md"), out.join("b.md")]
        );
        assert_eq!(progress.last().copied(), Some(100.0));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_callback_error_stops_the_batch() {
        let tmp = TempDir::new().unwrap();
        let inputs: Vec<PathBuf> = ["1.txt", "2.txt", "3.txt"]
            .iter()
            .map(|n| touch(tmp.path(), n))
            .collect();

        let processor =
            BatchProcessor::new(BatchDescriptor::per_file(inputs, tmp.path().join("out"))).unwrap();

        let mut calls = 0;
        let result = processor.execute(&mut |_: f64| {}, |item, _| {
            calls += 1;
            if item.index() == 1 {
                return Err(ConvError::UnsupportedFormat("xyz".to_string()));
            }
            Ok(())
        });

        assert!(matches!(result, Err(ConvError::UnsupportedFormat(f)) if f == "xyz"));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_aggregate_single_item() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "first.pdf");
        let b = touch(tmp.path(), "second.pdf");
        let out = tmp.path().join("out");

        let processor = BatchProcessor::new(
            BatchDescriptor::aggregate(
                vec![a.clone(), b.clone()],
                OutputTarget::Directory(out.clone()),
            )
            .naming(Naming::with_suffix("_merged")),
        )
        .unwrap();

        let items = processor.work_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].inputs(), &[a, b]);
        assert_eq!(items[0].output(), out.join("first_merged.pdf"));

        let mut progress = Vec::new();
        processor.execute(&mut |p: f64| progress.push(p), |_, _| Ok(())).unwrap();
        assert_eq!(progress, vec![100.0]);
    }

    #[test]
    fn test_explicit_file_needs_single_input() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "a.txt");
        let b = touch(tmp.path(), "b.txt");

        let mut descriptor = BatchDescriptor::per_file(vec![a, b], tmp.path());
        descriptor.target = OutputTarget::File(tmp.path().join("x.txt"));
        assert!(matches!(
            BatchProcessor::new(descriptor),
            Err(ConvError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_check_only_passes_inputs_through() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "a.sha256");

        let processor = BatchProcessor::new(
            BatchDescriptor::per_file(vec![a.clone()], tmp.path()).check_only(),
        )
        .unwrap();
        let report = processor.execute(&mut |_: f64| {}, |_, _| Ok(())).unwrap();
        assert_eq!(report.outputs, vec![a]);
    }

    #[test]
    fn test_output_dir_that_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let a = touch(tmp.path(), "a.txt");
        let not_dir = touch(tmp.path(), "out");

        let processor = BatchProcessor::new(BatchDescriptor::per_file(vec![a], &not_dir)).unwrap();
        let result = processor.execute(&mut |_: f64| {}, |_, _| Ok(()));
        assert!(matches!(result, Err(ConvError::NotADirectory(p)) if p == not_dir));
    }
}
