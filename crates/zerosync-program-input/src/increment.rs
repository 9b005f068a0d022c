//! Input of the increment program, which verifies the previous batch proof
//! and extends the header chain by one batch.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::{debug, info};

use crate::error::InputError;
use crate::hash_chain::ChainHasher;
use crate::json_file::{read_json, write_json_atomic};
use crate::program::{felt_to_decimal, CompiledProgram};

/// Number of header batches aggregated per increment step
pub const INCREMENT_BATCH_SIZE: u32 = 8;

/// Program input of the increment program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncrementInput {
    /// Hash chain of the increment program itself, as a decimal JSON integer
    pub increment_program_hash: Number,
    /// Previous proof, passed through untouched
    pub prev_proof: Value,
    pub batch_size: u32,
}

impl IncrementInput {
    /// Build the increment input from the compiled increment program and the previous proof
    pub fn new<H: ChainHasher + ?Sized>(
        hasher: &H,
        program: &Value,
        prev_proof: Value,
    ) -> Result<Self, InputError> {
        let program = CompiledProgram::from_json(program)?;
        let program_hash = felt_to_decimal(&program.hash_chain(hasher)?);
        debug!(
            "Increment program hash over {} words: {}",
            program.data.len(),
            program_hash
        );

        // Relies on serde_json `arbitrary_precision`, a 252-bit hash does not fit in a u64/f64
        let increment_program_hash =
            Number::from_str(&program_hash).map_err(|e| InputError::HashEncoding(e.to_string()))?;

        Ok(Self {
            increment_program_hash,
            prev_proof,
            batch_size: INCREMENT_BATCH_SIZE,
        })
    }
}

/// Files consumed and produced by the increment input preparer
#[derive(Debug, Clone)]
pub struct IncrementInputFiles {
    /// Compiled increment program
    pub program: PathBuf,
    /// Proof of the previous increment step
    pub prev_proof: PathBuf,
    /// Where the increment input is written
    pub output: PathBuf,
}

impl IncrementInputFiles {
    /// Conventional file names inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            program: dir.join("increment_batch.json"),
            prev_proof: dir.join("increment_batch_proof.json"),
            output: dir.join("increment_batch_input.json"),
        }
    }
}

/// Read the previous proof and compiled program, write the increment input
///
/// The output file is overwritten unconditionally. Nothing is written if any
/// input is missing or invalid.
pub fn prepare_increment_input<H: ChainHasher + ?Sized>(
    hasher: &H,
    files: &IncrementInputFiles,
) -> Result<IncrementInput, InputError> {
    let prev_proof = read_json(&files.prev_proof)?;
    let program = read_json(&files.program)?;

    let input = IncrementInput::new(hasher, &program, prev_proof)?;
    write_json_atomic(&files.output, &input)?;

    info!("Increment input written to {}", files.output.display());
    Ok(input)
}
