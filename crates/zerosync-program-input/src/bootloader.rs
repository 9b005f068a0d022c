//! Simple bootloader program input.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::InputError;
use crate::json_file::{read_json, write_json_atomic};

/// A single task run by the simple bootloader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BootloaderTask {
    /// Run a compiled Cairo program with the given program input
    RunProgramTask {
        program: Value,
        program_input: Value,
        use_poseidon: bool,
    },
}

/// Program input of the simple bootloader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootloaderInput {
    pub tasks: Vec<BootloaderTask>,
    pub single_page: bool,
}

impl BootloaderInput {
    /// Bootloader input running exactly one program, Pedersen-hashed, on a single page
    pub fn single_task(program: Value, program_input: Value) -> Self {
        Self {
            tasks: vec![BootloaderTask::RunProgramTask {
                program,
                program_input,
                use_poseidon: false,
            }],
            single_page: true,
        }
    }
}

/// Files consumed and produced by the bootloader input preparer
#[derive(Debug, Clone)]
pub struct BootloaderInputFiles {
    /// Compiled program run by the bootloader
    pub program: PathBuf,
    /// Input of that program
    pub program_input: PathBuf,
    /// Where the bootloader input is written
    pub output: PathBuf,
}

/// Wrap the compiled program and its input into a single-task bootloader input
pub fn prepare_bootloader_input(files: &BootloaderInputFiles) -> Result<BootloaderInput, InputError> {
    let program = read_json(&files.program)?;
    let program_input = read_json(&files.program_input)?;

    let input = BootloaderInput::single_task(program, program_input);
    write_json_atomic(&files.output, &input)?;

    info!("Bootloader input written to {}", files.output.display());
    Ok(input)
}
