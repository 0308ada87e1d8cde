//! Reading the parent-chain transaction embedded in a withdrawal proof.

use bitcoin::{
    consensus::{self, Decodable},
    Transaction, Txid,
};
use thiserror::Error;

/// Why an embedded transaction couldn’t be read.
#[derive(Debug, Error)]
pub enum Error {
    /// The bytes aren’t a consensus-encoded transaction.
    #[error("malformed parent transaction: {0}")]
    Decode(#[from] consensus::encode::Error),
}

/// The parts of a parent-chain transaction that a withdrawal proof refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParentTransaction {
    /// The (non-witness) transaction id.
    pub txid: Txid,
    /// How many outputs the transaction has.
    pub output_count: usize,
}

impl From<&Transaction> for ParentTransaction {
    fn from(tx: &Transaction) -> Self {
        ParentTransaction {
            txid: tx.compute_txid(),
            output_count: tx.output.len(),
        }
    }
}

/// Turns the bytes carried by a withdrawal proof into a [`ParentTransaction`].
pub trait TransactionDecoder {
    /// Decode the transaction at the start of `bytes`.
    fn decode(&self, bytes: &[u8]) -> Result<ParentTransaction, Error>;
}

/// Decodes transactions with the parent chain’s consensus encoding.
///
/// __NB__: Bytes after the transaction are ignored, and a transaction with no inputs is read as
///         the segwit marker, so it only decodes if the rest is a valid segwit transaction.
#[derive(Clone, Copy, Debug, Default)]
pub struct BitcoinDecoder;

impl TransactionDecoder for BitcoinDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<ParentTransaction, Error> {
        let mut reader = bytes;
        Transaction::consensus_decode(&mut reader)
            .map(|tx| ParentTransaction::from(&tx))
            .map_err(Error::from)
    }
}
