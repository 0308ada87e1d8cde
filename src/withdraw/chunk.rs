//! Values larger than a single push, split across consecutive pushes followed by a count.

use thiserror::Error;

use super::MAX_WITHDRAW_CHUNKS;
use crate::{
    num::{self, ScriptNum},
    script::{Script, MAX_SCRIPT_ELEMENT_SIZE},
};

/// Why a chunked value couldn’t be read off the stack.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("no chunk count on the stack")]
    MissingCount,

    #[error("unreadable chunk count: {0}")]
    Count(num::Error),

    #[error("chunk count {0} is out of range")]
    InvalidCount(i32),

    #[error("expected {expected} chunks, but only {available} values are on the stack")]
    NotEnoughChunks { expected: usize, available: usize },

    #[error("chunk {index} has {size} bytes, but only the last chunk may be shorter than 520")]
    ShortChunk { index: usize, size: usize },
}

/// Checks the chunked value on top of `stack`, returning the number of values it occupies below
/// the count.
fn chunk_count(stack: &[Vec<u8>]) -> Result<usize, Error> {
    let (count, rest) = stack.split_last().ok_or(Error::MissingCount)?;
    let count = ScriptNum::new(count, false, None)
        .map_err(Error::Count)?
        .getint();
    let chunks = usize::try_from(count)
        .ok()
        .filter(|n| *n <= MAX_WITHDRAW_CHUNKS)
        .ok_or(Error::InvalidCount(count))?;
    if rest.len() < chunks {
        return Err(Error::NotEnoughChunks {
            expected: chunks,
            available: rest.len(),
        });
    }

    // The chunk nearest the count is the last one written, so it’s the only one that may be short.
    let first = rest.len() - chunks;
    for (index, chunk) in rest[first..].iter().enumerate() {
        if index + 1 != chunks && chunk.len() != MAX_SCRIPT_ELEMENT_SIZE {
            return Err(Error::ShortChunk {
                index,
                size: chunk.len(),
            });
        }
    }
    Ok(chunks)
}

/// Removes a chunked value from the top of `stack` and reassembles it. `stack` is left untouched on
/// failure.
pub fn pop_chunked(stack: &mut Vec<Vec<u8>>) -> Result<Vec<u8>, Error> {
    let chunks = chunk_count(stack)?;
    stack.pop();
    let first = stack.len() - chunks;
    Ok(stack.drain(first..).flatten().collect())
}

/// Like [`pop_chunked`], but discards the value.
pub fn drop_chunked(stack: &mut Vec<Vec<u8>>) -> Result<(), Error> {
    let chunks = chunk_count(stack)?;
    stack.truncate(stack.len() - chunks - 1);
    Ok(())
}

impl Script {
    /// Appends `value` as consecutive pushes of at most [`MAX_SCRIPT_ELEMENT_SIZE`] bytes, followed
    /// by the number of pushes. Only the last push may be shorter than the limit, and an empty
    /// value is just a count of zero.
    pub fn push_withdraw(self, value: &[u8]) -> Self {
        let chunks = value.chunks(MAX_SCRIPT_ELEMENT_SIZE);
        let count = chunks.len();
        chunks
            .fold(self, |script, chunk| script.push_slice(chunk))
            .push_int(i64::try_from(count).expect("a slice has fewer than 2^63 chunks"))
    }
}
