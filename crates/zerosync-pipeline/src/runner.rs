//! Sequential pipeline execution with per-step outcomes.

use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use zerosync_program_input::{prepare_bootloader_input, prepare_increment_input, PedersenHasher};

use crate::command::{run_command, CommandOptions};
use crate::download::Downloader;
use crate::error::StepError;
use crate::step::{Action, Pipeline, Step};

/// What to do with the remaining steps once a step failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Skip every step after the first failure
    #[default]
    Halt,
    /// Run every step regardless of earlier failures
    KeepGoing,
}

#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    pub failure_policy: FailurePolicy,
    pub command: CommandOptions,
}

#[derive(Debug)]
pub enum StepStatus {
    Succeeded { elapsed: Duration },
    Failed(StepError),
    Skipped,
}

#[derive(Debug)]
pub struct StepOutcome {
    pub description: String,
    pub status: StepStatus,
}

/// Outcomes of all steps of a pipeline run, in pipeline order
#[derive(Debug)]
pub struct PipelineReport {
    pub name: String,
    pub outcomes: Vec<StepOutcome>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.outcomes
            .iter()
            .all(|o| matches!(o.status, StepStatus::Succeeded { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &StepError)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            StepStatus::Failed(err) => Some((o.description.as_str(), err)),
            _ => None,
        })
    }

    pub fn count(&self, pred: impl Fn(&StepStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }
}

/// Runs the actions of a single step
#[derive(Clone)]
pub struct StepExecutor {
    config: RunnerConfig,
    downloader: Downloader,
}

impl StepExecutor {
    pub fn new(config: RunnerConfig, downloader: Downloader) -> Self {
        Self { config, downloader }
    }

    /// Check inputs, run actions until the first failure, check outputs
    pub async fn run_step(&self, step: &Step) -> Result<Duration, StepError> {
        let start_time = Instant::now();

        if let Some(missing) = step.inputs.iter().find(|p| !p.exists()) {
            return Err(StepError::MissingInput(missing.clone()));
        }

        for action in &step.actions {
            self.run_action(action).await?;
        }

        if let Some(missing) = step.outputs.iter().find(|p| !p.exists()) {
            return Err(StepError::MissingOutput(missing.clone()));
        }

        Ok(start_time.elapsed())
    }

    async fn run_action(&self, action: &Action) -> Result<(), StepError> {
        match action {
            Action::PrepareIncrementInput(files) => {
                let files = files.clone();
                tokio::task::spawn_blocking(move || prepare_increment_input(&PedersenHasher, &files))
                    .await??;
            }
            Action::PrepareBootloaderInput(files) => {
                let files = files.clone();
                tokio::task::spawn_blocking(move || prepare_bootloader_input(&files)).await??;
            }
            Action::Download { url, output } => {
                self.downloader.fetch_to_file(url, output).await?;
            }
            Action::Run(command) => {
                info!("Command: {}", command);
                run_command(command, &self.config.command).await?;
            }
        }
        Ok(())
    }
}

/// Runs pipelines step by step, honoring the failure policy and shutdown signals
pub struct Sequencer {
    executor: StepExecutor,
    failure_policy: FailurePolicy,
    rx_shutdown: Option<broadcast::Receiver<()>>,
}

impl Sequencer {
    pub fn new(config: RunnerConfig, downloader: Downloader) -> Self {
        let failure_policy = config.failure_policy;
        Self {
            executor: StepExecutor::new(config, downloader),
            failure_policy,
            rx_shutdown: None,
        }
    }

    /// Cancel the running step and skip the rest when a shutdown is broadcast
    pub fn with_shutdown(mut self, rx_shutdown: broadcast::Receiver<()>) -> Self {
        self.rx_shutdown = Some(rx_shutdown);
        self
    }

    pub async fn run(&mut self, pipeline: &Pipeline) -> PipelineReport {
        info!(
            "Starting pipeline '{}' with {} steps",
            pipeline.name,
            pipeline.steps.len()
        );

        let mut outcomes = Vec::with_capacity(pipeline.steps.len());
        let mut halted = false;

        for (idx, step) in pipeline.steps.iter().enumerate() {
            let job_info = format!("[{}/{}] {}", idx + 1, pipeline.steps.len(), step.description);

            if halted {
                debug!("{} skipped", job_info);
                outcomes.push(StepOutcome {
                    description: step.description.clone(),
                    status: StepStatus::Skipped,
                });
                continue;
            }

            info!("{} starting...", job_info);
            let result = match self.rx_shutdown.as_mut() {
                Some(rx_shutdown) => tokio::select! {
                    res = self.executor.run_step(step) => res,
                    Ok(()) = rx_shutdown.recv() => Err(StepError::Cancelled),
                },
                None => self.executor.run_step(step).await,
            };

            let status = match result {
                Ok(elapsed) => {
                    info!("{} done in {:.2}s", job_info, elapsed.as_secs_f64());
                    StepStatus::Succeeded { elapsed }
                }
                Err(err) => {
                    error!("{} failed: {}", job_info, err);
                    if matches!(err, StepError::Cancelled) {
                        warn!("Shutdown requested, skipping remaining steps");
                        halted = true;
                    } else if self.failure_policy == FailurePolicy::Halt {
                        info!("Stopping further processing due to step failure");
                        halted = true;
                    }
                    StepStatus::Failed(err)
                }
            };
            outcomes.push(StepOutcome {
                description: step.description.clone(),
                status,
            });
        }

        let report = PipelineReport {
            name: pipeline.name.clone(),
            outcomes,
        };
        info!(
            "Pipeline '{}' finished: {} succeeded, {} failed, {} skipped",
            report.name,
            report.count(|s| matches!(s, StepStatus::Succeeded { .. })),
            report.count(|s| matches!(s, StepStatus::Failed(_))),
            report.count(|s| matches!(s, StepStatus::Skipped)),
        );
        report
    }
}
