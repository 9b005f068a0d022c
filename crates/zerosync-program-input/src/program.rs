//! Compiled Cairo program words.

use num_bigint::BigUint;
use serde_json::Value;
use starknet_ff::FieldElement;

use crate::error::InputError;
use crate::hash_chain::{compute_hash_chain, ChainHasher};

/// The instruction/data stream of a compiled Cairo program
///
/// Only the `data` array of the compiled program JSON is interpreted, everything
/// else is left to the program runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledProgram {
    pub data: Vec<FieldElement>,
}

impl CompiledProgram {
    /// Extract program words from compiled program JSON
    ///
    /// Words can be hex strings (`"0x..."`, as emitted by the Cairo compiler),
    /// decimal strings or non-negative JSON integers.
    pub fn from_json(program: &Value) -> Result<Self, InputError> {
        let words = program
            .get("data")
            .and_then(Value::as_array)
            .ok_or(InputError::MissingProgramData)?;

        let data = words
            .iter()
            .enumerate()
            .map(|(index, word)| parse_data_word(index, word))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { data })
    }

    /// Hash chain over the program words
    pub fn hash_chain<H: ChainHasher + ?Sized>(&self, hasher: &H) -> Result<FieldElement, InputError> {
        compute_hash_chain(hasher, &self.data)
    }
}

fn parse_data_word(index: usize, word: &Value) -> Result<FieldElement, InputError> {
    let invalid = || InputError::InvalidDataWord {
        index,
        value: word.to_string(),
    };

    match word {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Err(invalid());
            }
            if let Some(digits) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                if digits.is_empty() {
                    return Err(invalid());
                }
                FieldElement::from_hex_be(digits).map_err(|_| invalid())
            } else {
                FieldElement::from_dec_str(s).map_err(|_| invalid())
            }
        }
        Value::Number(n) => FieldElement::from_dec_str(&n.to_string()).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Render a field element as a decimal integer string
pub fn felt_to_decimal(felt: &FieldElement) -> String {
    BigUint::from_bytes_be(&felt.to_bytes_be()).to_string()
}
