use std::path::PathBuf;

use thiserror::Error;

/// Error types for program input preparation
#[derive(Error, Debug)]
pub enum InputError {
    /// Input file could not be read or output file could not be written
    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// File content is not valid JSON, or the record could not be serialized
    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Compiled program has no `data` array
    #[error("Compiled program has no `data` array")]
    MissingProgramData,
    /// A program data word is not a valid field element
    #[error("Invalid program data word at index {index}: {value}")]
    InvalidDataWord { index: usize, value: String },
    /// Hash chain requested over an empty word list
    #[error("Cannot compute a hash chain over empty data")]
    EmptyHashChain,
    /// Hash could not be represented as a JSON number
    #[error("Failed to encode program hash as a JSON number: {0}")]
    HashEncoding(String),
}
