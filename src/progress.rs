//! Overall progress accounting for batches and pipelines.
//!
//! A batch produces `total_output_units` outputs, each taking
//! `steps_per_unit` steps. Backends only ever report how far along their
//! current step is (0-100); the aggregator folds that into one monotonic
//! 0-100 figure for the whole batch.

use tracing::warn;

use crate::error::{ConvError, Result};

#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    total_output_units: usize,
    steps_per_unit: usize,
    completed_units: usize,
    current_step: usize,
}

impl ProgressAggregator {
    pub fn new(total_output_units: usize, steps_per_unit: usize) -> Result<Self> {
        if total_output_units < 1 {
            return Err(ConvError::InvalidArgument(
                "total output units must be >= 1".to_string(),
            ));
        }
        if steps_per_unit < 1 {
            return Err(ConvError::InvalidArgument(
                "steps per unit must be >= 1".to_string(),
            ));
        }

        Ok(Self {
            total_output_units,
            steps_per_unit,
            completed_units: 0,
            current_step: 1,
        })
    }

    pub fn total_output_units(&self) -> usize {
        self.total_output_units
    }

    pub fn steps_per_unit(&self) -> usize {
        self.steps_per_unit
    }

    pub fn completed_units(&self) -> usize {
        self.completed_units
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// True once every step of every unit has been completed.
    pub fn is_finished(&self) -> bool {
        self.completed_units >= self.total_output_units
    }

    /// Overall progress (0-100) given how far along the current step is.
    ///
    /// Equivalent to `completed * unit_share + (step - 1) * step_share +
    /// fraction * step_share`, computed over the total step count so the
    /// last step lands on exactly 100.0.
    pub fn get_progress(&self, step_progress: f64) -> Result<f64> {
        if self.completed_units > self.total_output_units {
            return Err(ConvError::ProgressInvariant {
                completed: self.completed_units,
                total: self.total_output_units,
            });
        }

        let fraction = if step_progress.is_nan() {
            0.0
        } else {
            step_progress.clamp(0.0, 100.0) / 100.0
        };

        let total_steps = (self.total_output_units * self.steps_per_unit) as f64;
        let done_steps =
            (self.completed_units * self.steps_per_unit + (self.current_step - 1)) as f64;

        Ok((done_steps + fraction) * 100.0 / total_steps)
    }

    /// Move to the next step, rolling over into the next unit.
    pub fn advance_step(&mut self) -> Result<()> {
        if self.is_finished() {
            return Err(ConvError::ProgressInvariant {
                completed: self.completed_units + 1,
                total: self.total_output_units,
            });
        }

        self.current_step += 1;
        if self.current_step > self.steps_per_unit {
            self.current_step = 1;
            self.completed_units += 1;
        }
        Ok(())
    }

    /// Mark the current step as done; returns the progress at 100% of it.
    pub fn complete_step(&mut self) -> Result<f64> {
        let progress = self.get_progress(100.0)?;
        self.advance_step()?;
        Ok(progress)
    }
}

/// Per-unit view of the aggregator handed to batch callbacks.
///
/// Every value computed here is forwarded to the caller's sink.
pub struct ProgressScope<'a> {
    aggregator: &'a mut ProgressAggregator,
    sink: &'a mut dyn FnMut(f64),
    unit: usize,
}

impl<'a> ProgressScope<'a> {
    pub(crate) fn new(
        aggregator: &'a mut ProgressAggregator,
        sink: &'a mut dyn FnMut(f64),
        unit: usize,
    ) -> Self {
        Self {
            aggregator,
            sink,
            unit,
        }
    }

    /// Index of the unit this scope is bound to.
    pub fn unit(&self) -> usize {
        self.unit
    }

    /// Report progress of the current step and return the overall value.
    pub fn update(&mut self, step_progress: f64) -> Result<f64> {
        let overall = self.aggregator.get_progress(step_progress)?;
        (self.sink)(overall);
        Ok(overall)
    }

    /// Finish the current step of this unit.
    pub fn complete_step(&mut self) -> Result<f64> {
        if self.unit_done() {
            return Err(ConvError::ProgressInvariant {
                completed: self.aggregator.completed_units() + 1,
                total: self.unit + 1,
            });
        }
        let overall = self.aggregator.complete_step()?;
        (self.sink)(overall);
        Ok(overall)
    }

    /// A plain step sink for backends that report 0-100 for one step.
    pub fn step_sink(&mut self) -> impl FnMut(f64) + '_ {
        move |step_progress| match self.update(step_progress) {
            Ok(_) => {}
            Err(e) => warn!("Dropping progress update: {}", e),
        }
    }

    /// Complete whatever steps of this unit the callback left open.
    pub(crate) fn finish_unit(&mut self) -> Result<()> {
        while !self.unit_done() {
            self.complete_step()?;
        }
        Ok(())
    }

    fn unit_done(&self) -> bool {
        self.aggregator.completed_units() > self.unit
    }
}

/// Weight a stage's own progress into the overall pipeline figure.
///
/// `stage` is 1-based; stage `i` of `n` covers `[100*(i-1)/n, 100*i/n]`.
pub fn stage_progress(stage: usize, total_stages: usize, stage_progress: f64) -> f64 {
    let total_stages = total_stages.max(1);
    let stage = stage.clamp(1, total_stages);
    let p = if stage_progress.is_nan() {
        0.0
    } else {
        stage_progress.clamp(0.0, 100.0)
    };
    (p + 100.0 * (stage - 1) as f64) / total_stages as f64
}
