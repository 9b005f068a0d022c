//! Zerosync program inputs - prepare Cairo program inputs for chained proofs
//!
//! This library provides functionality to:
//! 1. Compute the hash chain identifying a compiled Cairo program
//! 2. Build the increment program input from a previous proof
//! 3. Wrap a compiled program and its input into a simple bootloader task

pub mod bootloader;
pub mod error;
pub mod hash_chain;
pub mod increment;
pub mod json_file;
pub mod program;

pub use bootloader::{prepare_bootloader_input, BootloaderInput, BootloaderInputFiles, BootloaderTask};
pub use error::InputError;
pub use hash_chain::{compute_hash_chain, ChainHasher, PedersenHasher};
pub use increment::{prepare_increment_input, IncrementInput, IncrementInputFiles, INCREMENT_BATCH_SIZE};
pub use json_file::temporary_sibling;
pub use program::CompiledProgram;
