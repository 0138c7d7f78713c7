//! Persisted multi-stage pipelines.
//!
//! A pipeline lives in a directory: the files directly inside it feed
//! stage 1, `pipeline.toml` lists the stages, and every stage writes into
//! its own subdirectory. Each stage consumes exactly what the previous
//! stage produced in the same run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use walkdir::WalkDir;

use crate::batch::BatchProcessor;
use crate::command::{Dispatch, StageCommand};
use crate::error::{ConvError, Result};
use crate::progress::stage_progress;

pub const PIPELINE_CONFIG_FILENAME: &str = "pipeline.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Output subdirectory, relative to the pipeline directory
    pub out_dir: String,
    pub command: StageCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub stages_run: usize,
    /// Outputs of the last stage
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    dir: PathBuf,
    config: PipelineConfig,
}

impl Pipeline {
    /// A new, empty pipeline for `dir`.
    ///
    /// Nothing is written until [`save_config`](Self::save_config).
    pub fn create<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: dir.into(),
            config: PipelineConfig {
                created_at: Utc::now(),
                stages: Vec::new(),
            },
        }
    }

    pub fn load<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        let path = dir.join(PIPELINE_CONFIG_FILENAME);
        if !path.is_file() {
            return Err(ConvError::Config(format!(
                "Pipeline config '{}' does not exist",
                path.display()
            )));
        }

        let content = fs::read_to_string(&path)?;
        let config: PipelineConfig = toml::from_str(&content)?;
        info!("Loaded pipeline {} with {} stage(s)", dir.display(), config.stages.len());
        Ok(Self { dir, config })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(PIPELINE_CONFIG_FILENAME)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.config.stages
    }

    pub fn stage_dir(&self, stage: &Stage) -> PathBuf {
        self.dir.join(&stage.out_dir)
    }

    /// Append a stage writing into `<dir>/<out_dir>`.
    pub fn add_stage(&mut self, out_dir: &str, command: StageCommand) -> Result<()> {
        let name = out_dir.trim();
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || name == PIPELINE_CONFIG_FILENAME;
        if invalid {
            return Err(ConvError::InvalidArgument(format!(
                "'{}' is not a valid stage directory name",
                out_dir
            )));
        }
        if self.config.stages.iter().any(|s| s.out_dir == name) {
            return Err(ConvError::InvalidArgument(format!(
                "stage directory '{}' is used twice",
                name
            )));
        }

        debug!("Adding stage {}: {} -> {}", self.config.stages.len() + 1, command, name);
        self.config.stages.push(Stage {
            out_dir: name.to_string(),
            command,
        });
        Ok(())
    }

    /// Write `pipeline.toml` and create the stage directories.
    pub fn save_config(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        for stage in &self.config.stages {
            fs::create_dir_all(self.stage_dir(stage))?;
        }

        fs::write(self.config_path(), toml::to_string_pretty(&self.config)?)?;
        info!("Pipeline saved to {}", self.config_path().display());
        Ok(())
    }

    /// Regular, non-hidden files directly in the pipeline directory, sorted by name.
    pub fn initial_inputs(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.is_dir() {
            return Err(ConvError::NotADirectory(self.dir.clone()));
        }

        let mut inputs = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let name = entry.file_name().to_string_lossy();
            let skipped = name.starts_with('.') || name == PIPELINE_CONFIG_FILENAME;
            if !entry.file_type().is_file() || skipped {
                continue;
            }
            inputs.push(entry.into_path());
        }
        Ok(inputs)
    }

    /// Run every stage in order; the first failure stops the pipeline.
    ///
    /// `sink` receives overall progress, with each stage weighted equally.
    pub fn execute(
        &self,
        dispatch: &dyn Dispatch,
        overwrite: bool,
        sink: &mut dyn FnMut(f64),
    ) -> Result<PipelineReport> {
        let stages = &self.config.stages;
        if stages.is_empty() {
            return Err(ConvError::Config(format!(
                "Pipeline {} has no stages",
                self.dir.display()
            )));
        }

        let total = stages.len();
        let mut inputs = self.initial_inputs()?;
        info!(
            "Executing pipeline {} ({} stage(s), {} input file(s))",
            self.dir.display(),
            total,
            inputs.len()
        );

        for (i, stage) in stages.iter().enumerate() {
            let number = i + 1;
            info!("Stage {}/{}: {} -> {}", number, total, stage.command, stage.out_dir);

            if inputs.is_empty() {
                return Err(ConvError::NoInputFiles.in_stage(number, None));
            }

            let descriptor = stage
                .command
                .descriptor(inputs, &self.stage_dir(stage), None, overwrite);
            let writes_output = descriptor.writes_output;

            let mut current: Option<PathBuf> = None;
            let mut stage_sink = |p: f64| sink(stage_progress(number, total, p));
            let result = BatchProcessor::new(descriptor).and_then(|processor| {
                processor.execute(&mut stage_sink, |item, scope| {
                    current = Some(item.input().to_path_buf());
                    dispatch.dispatch(&stage.command, item, scope)
                })
            });

            let report = match result {
                Ok(report) => report,
                Err(e) => {
                    error!("Stage {} failed: {}", number, e);
                    return Err(e.in_stage(number, current));
                }
            };

            if writes_output {
                if let Some(missing) = report.outputs.iter().find(|p| !p.exists()) {
                    let file = Some(missing.clone());
                    return Err(ConvError::MissingOutput(missing.clone()).in_stage(number, file));
                }
            }

            sink(stage_progress(number, total, 100.0));
            inputs = report.outputs;
        }

        info!("Pipeline finished: {} file(s) in final stage", inputs.len());
        Ok(PipelineReport {
            stages_run: total,
            outputs: inputs,
        })
    }

    /// Human-readable summary for `pipeline show`.
    pub fn describe(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "Pipeline: {}", self.dir.display());
        let _ = writeln!(text, "Created:  {}", self.config.created_at.to_rfc3339());
        if self.config.stages.is_empty() {
            let _ = writeln!(text, "No stages.");
            return text;
        }

        let _ = writeln!(text, "Stages:");
        for (i, stage) in self.config.stages.iter().enumerate() {
            let command = stage.command.to_string();
            let _ = writeln!(text, "  {}. {:<24} -> {}/", i + 1, command, stage.out_dir);
        }
        text
    }
}
