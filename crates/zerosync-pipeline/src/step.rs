//! Pipeline steps with explicit file contracts.

use std::path::PathBuf;

use zerosync_program_input::{BootloaderInputFiles, IncrementInputFiles};

use crate::command::ExternalCommand;

/// A unit of work inside a step
#[derive(Debug, Clone)]
pub enum Action {
    /// Build the increment program input from the previous proof
    PrepareIncrementInput(IncrementInputFiles),
    /// Wrap a compiled program and its input into a bootloader task
    PrepareBootloaderInput(BootloaderInputFiles),
    /// Fetch a remote artifact
    Download { url: String, output: PathBuf },
    /// Run an external tool
    Run(ExternalCommand),
}

/// A named group of actions, run in order until the first failure
#[derive(Debug, Clone)]
pub struct Step {
    pub description: String,
    /// Files that must exist before the step starts
    pub inputs: Vec<PathBuf>,
    /// Files the step must have produced once all actions succeeded
    pub outputs: Vec<PathBuf>,
    pub actions: Vec<Action>,
}

impl Step {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn run(self, command: ExternalCommand) -> Self {
        self.action(Action::Run(command))
    }
}

/// An ordered list of steps
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn extend(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }
}
