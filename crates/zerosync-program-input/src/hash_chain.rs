//! Hash chain over Cairo program words, used as the program identity.

use starknet_ff::FieldElement;

use crate::error::InputError;

/// Two-to-one hash function the chain is built from
pub trait ChainHasher {
    fn hash(&self, x: &FieldElement, y: &FieldElement) -> FieldElement;
}

/// Starknet Pedersen hash, the function Cairo uses for program hash chains
#[derive(Debug, Default, Clone, Copy)]
pub struct PedersenHasher;

impl ChainHasher for PedersenHasher {
    fn hash(&self, x: &FieldElement, y: &FieldElement) -> FieldElement {
        starknet_crypto::pedersen_hash(x, y)
    }
}

/// Compute `h(data[0], h(data[1], h(..., h(data[n-2], data[n-1]))))`
///
/// A single word is its own hash chain. Empty data is rejected.
pub fn compute_hash_chain<H>(hasher: &H, data: &[FieldElement]) -> Result<FieldElement, InputError>
where
    H: ChainHasher + ?Sized,
{
    let (last, rest) = data.split_last().ok_or(InputError::EmptyHashChain)?;
    Ok(rest
        .iter()
        .rev()
        .fold(*last, |acc, word| hasher.hash(word, &acc)))
}
