//! Two-way peg withdrawals.
//!
//! The withdrawal opcodes are only allowed to execute in scripts with a rigid shape, and the
//! values those scripts commit to are read back by position rather than by evaluation:
//!
//! - a __lock__ on the parent chain sends coins to a sidechain,
//!   `[<"P2SH" + destination> OP_DROP] <genesis hash> <script hash> OP_WITHDRAWPROOFVERIFY`;
//! - a __proof__ is the push-only script that claims a lock on the sidechain, ending with the
//!   chunked parent transaction, the index of the locked output, the chunked coinbase and, with
//!   [`Flags::SpvProof`], a chunked SPV proof;
//! - an __output__ holds the claimed coins on the sidechain until it’s either challenged with
//!   `OP_REORGPROOFVERIFY` or its relative lock time passes.

pub mod chunk;
mod template;

use bitcoin::OutPoint;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    num::{self, ScriptNum},
    opcode::{Operation::*, OP_CHECKSEQUENCEVERIFY},
    pattern,
    script::{self, get_op, Script},
    tx::{self, BitcoinDecoder, TransactionDecoder},
};
use template::{Field, Template, Trailing, Value};

/// The most chunks a single value may be split into.
pub const MAX_WITHDRAW_CHUNKS: usize = 2000;

/// The fewest pushes a withdrawal proof can have.
pub const MIN_WITHDRAW_PROOF_PUSHES: usize = 10;

/// The largest encoding of the fraud bounty in a withdrawal output.
pub const MAX_BOUNTY_SIZE: usize = 8; // bytes

/// The size of a lock’s destination tag: four bytes of type followed by a 20-byte hash.
const DESTINATION_TAG_SIZE: u8 = 24;

/// The type of destination tag that a sidechain accepts.
const DESTINATION_TYPE: &[u8] = b"P2SH";

bitflags::bitflags! {
    /// Selects which shape of withdrawal scripts is in force.
    #[derive(Copy, Clone, Debug, PartialEq, Eq)]
    pub struct Flags: u32 {
        /// The sidechain checks SPV proofs of the parent chain, rather than trusting a
        /// federation. Outputs carry the amount of work in the proof, and proofs end with the SPV
        /// proof itself.
        const SpvProof = 1 << 0;
    }
}

/// Why a withdrawal proof doesn’t identify a parent-chain output.
#[derive(Debug, Error)]
pub enum Error {
    /// The proof isn’t a sequence of pushes.
    #[error("malformed proof script: {0}")]
    Script(#[from] script::Error),

    /// One of the chunked values is malformed.
    #[error("malformed chunked value: {0}")]
    Chunk(#[from] chunk::Error),

    /// The output index isn’t a number.
    #[error("malformed output index: {0}")]
    Num(#[from] num::Error),

    /// The parent transaction doesn’t decode.
    #[error(transparent)]
    Transaction(#[from] tx::Error),

    /// The proof runs out of values before the output index.
    #[error("no output index in proof")]
    MissingOutputIndex,

    /// The output index doesn’t refer to an output of the parent transaction.
    #[error("output index {index} is out of range for a transaction with {outputs} outputs")]
    OutputIndexOutOfRange {
        /// The index from the proof.
        index: i32,
        /// The number of outputs in the parent transaction.
        outputs: usize,
    },
}

fn output_template(flags: Flags) -> Template<'static> {
    let mut fields = vec![
        Field::operation("if", OP_IF),
        Field::number("lock height", None),
        Field::data("lock tx", 32),
        Field::number("lock tx out", None),
    ];
    if flags.contains(Flags::SpvProof) {
        fields.push(Field::number("work amount", None));
    }
    fields.extend([
        Field::number("bounty", Some(MAX_BOUNTY_SIZE)),
        Field::data("script hash", 20),
        Field::data("genesis hash", 32),
        Field::operation("reorg proof verify", OP_REORGPROOFVERIFY),
        Field::operation("else", OP_ELSE),
        Field::number("relative lock", None),
        Field::operation("check sequence verify", OP_CHECKSEQUENCEVERIFY),
        Field::operation("drop", OP_DROP),
        Field::operation("hash160", OP_HASH160),
        Field::data("destination", 20),
        Field::operation("equal", OP_EQUAL),
        Field::operation("endif", OP_ENDIF),
    ]);
    Template {
        fields,
        trailing: Trailing::Forbidden,
    }
}

/// `genesis_hash` and `script_hash` are only checked when given.
fn lock_template<'a>(
    has_destination: bool,
    genesis_hash: Option<&'a [u8; 32]>,
    script_hash: Option<&'a [u8; 20]>,
) -> Template<'a> {
    let pinned = genesis_hash.is_some();
    let mut fields = vec![];
    if has_destination {
        fields.extend([
            Field::direct_push("destination", DESTINATION_TAG_SIZE).with_value(if pinned {
                Value::StartsWith(DESTINATION_TYPE)
            } else {
                Value::Any
            }),
            Field::operation("drop", OP_DROP),
        ]);
    }
    fields.extend([
        Field::direct_push("genesis hash", 32)
            .with_value(genesis_hash.map_or(Value::Any, |hash| Value::Equals(hash))),
        Field::data("script hash", 20)
            .with_value(script_hash.map_or(Value::Any, |hash| Value::Equals(hash))),
        Field::operation("withdraw proof verify", OP_WITHDRAWPROOFVERIFY),
    ]);
    Template {
        fields,
        trailing: if pinned {
            Trailing::Undecodable
        } else {
            Trailing::Allowed
        },
    }
}

impl Script {
    /// Whether this could be a withdrawal proof: at least [`MIN_WITHDRAW_PROOF_PUSHES`] pushes and
    /// nothing else (not even `OP_RESERVED`).
    pub fn is_withdraw_proof(&self) -> bool {
        let mut pc = self.as_bytes();
        let mut pushes = 0;
        while !pc.is_empty() {
            match get_op(&mut pc) {
                Ok(opcode) if opcode.is_push_value() => pushes += 1,
                _ => return false,
            }
        }
        if pushes < MIN_WITHDRAW_PROOF_PUSHES {
            trace!(pushes, "too few pushes for a withdrawal proof");
        }
        pushes >= MIN_WITHDRAW_PROOF_PUSHES
    }

    /// Whether this is a withdrawal output, which `OP_REORGPROOFVERIFY` requires.
    ///
    /// __NB__: Pushes don’t need to be minimally encoded here, unlike in
    ///         [`Self::is_withdraw_lock`].
    pub fn is_withdraw_output(&self, flags: Flags) -> bool {
        output_template(flags).matches(self)
    }

    /// Whether this is a withdrawal lock, which `OP_WITHDRAWPROOFVERIFY` requires.
    ///
    /// With `require_destination`, the lock must start with a destination tag. With
    /// `require_to_us`, the lock must be for the sidechain with `genesis_hash`, must commit to
    /// [`pattern::canonical_withdraw_script`], must have a `"P2SH"` destination (if any), and
    /// mustn’t be followed by another complete opcode (a truncated push is ignored). Otherwise, `genesis_hash` is ignored and anything may
    /// follow the lock.
    pub fn is_withdraw_lock(
        &self,
        genesis_hash: &[u8; 32],
        require_destination: bool,
        require_to_us: bool,
    ) -> bool {
        let has_destination = self.as_bytes().first() == Some(&DESTINATION_TAG_SIZE);
        if require_destination && !has_destination {
            trace!("withdrawal lock has no destination");
            return false;
        }
        if require_to_us {
            let script_hash = pattern::withdraw_script_hash();
            lock_template(has_destination, Some(genesis_hash), Some(&script_hash)).matches(self)
        } else {
            lock_template(has_destination, None, None).matches(self)
        }
    }

    /// The fraud bounty committed to by a withdrawal output.
    ///
    /// Panics if `self` isn’t a withdrawal output for `flags`.
    pub fn get_fraud_bounty(&self, flags: Flags) -> i64 {
        let captures = output_template(flags)
            .captures(self)
            .expect("`get_fraud_bounty` requires a withdrawal output");
        captures
            .get("bounty")
            .map(|bounty| num::parse(bounty, false, Some(MAX_BOUNTY_SIZE)))
            .and_then(Result::ok)
            .expect("the template bounds the size of the bounty")
    }

    /// The genesis hash of the sidechain a withdrawal lock sends coins to.
    ///
    /// Panics if `self` isn’t a withdrawal lock.
    pub fn get_withdraw_lock_genesis_hash(&self) -> [u8; 32] {
        let has_destination = self.as_bytes().first() == Some(&DESTINATION_TAG_SIZE);
        lock_template(has_destination, None, None)
            .captures(self)
            .and_then(|captures| captures.get("genesis hash").map(<[u8; 32]>::try_from))
            .and_then(Result::ok)
            .expect("`get_withdraw_lock_genesis_hash` requires a withdrawal lock")
    }

    /// The parent-chain output claimed by a withdrawal proof, or `None` if the proof doesn’t
    /// identify one.
    ///
    /// Panics if `self` isn’t a withdrawal proof.
    pub fn get_withdraw_spent(&self, flags: Flags) -> Option<OutPoint> {
        match self.withdraw_spent(flags, &BitcoinDecoder) {
            Ok(outpoint) => Some(outpoint),
            Err(err) => {
                debug!(%err, "withdrawal proof doesn’t identify a parent output");
                None
            }
        }
    }

    /// Like [`Self::get_withdraw_spent`], but with a custom transaction decoder, and explaining why
    /// the proof doesn’t identify an output.
    pub fn withdraw_spent(
        &self,
        flags: Flags,
        decoder: &dyn TransactionDecoder,
    ) -> Result<OutPoint, Error> {
        assert!(
            self.is_withdraw_proof(),
            "`withdraw_spent` requires a withdrawal proof"
        );

        // The proof is read from the end, the same way it would be popped off the stack.
        let mut stack = self.push_values()?;
        if flags.contains(Flags::SpvProof) {
            chunk::drop_chunked(&mut stack)?;
        }
        // coinbase
        chunk::drop_chunked(&mut stack)?;

        let index = stack.pop().ok_or(Error::MissingOutputIndex)?;
        let index = ScriptNum::new(&index, false, None)?.getint();

        let parent = decoder.decode(&chunk::pop_chunked(&mut stack)?)?;
        u32::try_from(index)
            .ok()
            .filter(|vout| usize::try_from(*vout).is_ok_and(|vout| vout < parent.output_count))
            .map(|vout| OutPoint {
                txid: parent.txid,
                vout,
            })
            .ok_or(Error::OutputIndexOutOfRange {
                index,
                outputs: parent.output_count,
            })
    }
}
