//! Reusable bits of scripts, to avoid writing hex strings.
//!
//! Many of these are annotated with the stack effect of the script, using this decoder ring:
//!
//! * `Bool`, `Hash160`, and other capitalized WordsSmashedTogether – an individual stack value,
//!   with a particular shape
//! * `[]` – a comma-separated sequence of stack values
//! * `->` – input on the left, output on the right
//! * `💥` – terminates evaluation, if followed by `?`, it _may_ terminate evaluation
//! * `_` – any type, each occurrence can represent a different type

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::{
    num::ScriptNum,
    opcode::{Operation::*, OP_CHECKSEQUENCEVERIFY},
    script::Script,
    withdraw::Flags,
};

/// How many blocks deep a lock must be before it can be withdrawn on the sidechain.
pub const WITHDRAW_LOCK_DEPTH: i64 = 144;

/// RIPEMD-160 of SHA-256, as used by `OP_HASH160`.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(Sha256::digest(data)).into()
}

/// The script every lock must commit to before a sidechain accepts it. It’s never executed by the
/// parent chain, only hashed.
///
/// __NB__: The depth is pushed as data, not as an opcode, so this is exactly `75 02 90 00 a1`.
///
/// type: `[_, Depth] -> [Bool]`
pub fn canonical_withdraw_script() -> Script {
    Script::new()
        .push_opcode(OP_DROP)
        .push_script_num(&ScriptNum::from(WITHDRAW_LOCK_DEPTH))
        .push_opcode(OP_LESSTHANOREQUAL)
}

/// The hash of [`canonical_withdraw_script`].
pub fn withdraw_script_hash() -> [u8; 20] {
    hash160(canonical_withdraw_script().as_bytes())
}

/// P2SH
///
/// type: `[_] -> [Bool]`
pub fn pay_to_script_hash(redeem_script: &Script) -> Script {
    Script::new()
        .push_opcode(OP_HASH160)
        .push_slice(&hash160(redeem_script.as_bytes()))
        .push_opcode(OP_EQUAL)
}

/// Sends coins from the parent chain to the sidechain identified by `genesis_hash`, optionally
/// tagged with the P2SH `destination` they’re meant for on the sidechain.
///
/// type: `[WithdrawProof] -> 💥?`
pub fn withdraw_lock(
    destination: Option<&[u8; 20]>,
    genesis_hash: &[u8; 32],
    script_hash: &[u8; 20],
) -> Script {
    destination
        .map_or(Script::new(), |dest| {
            Script::new()
                .push_slice(&[&b"P2SH"[..], &dest[..]].concat())
                .push_opcode(OP_DROP)
        })
        .push_slice(genesis_hash)
        .push_slice(script_hash)
        .push_opcode(OP_WITHDRAWPROOFVERIFY)
}

/// The values committed to by a withdrawal output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawOutput {
    /// The parent-chain height of the lock being withdrawn.
    pub lock_height: i64,
    /// The id of the parent-chain transaction holding the lock.
    pub lock_tx: [u8; 32],
    /// The index of the lock in that transaction.
    pub lock_tx_out: i64,
    /// The amount of work proven by the withdrawal. Only included with [`Flags::SpvProof`].
    pub work_amount: i64,
    /// Paid to whoever proves the withdrawal was based on a reorganized-away lock.
    pub bounty: i64,
    /// The script the lock committed to.
    pub script_hash: [u8; 20],
    /// The genesis hash of the sidechain.
    pub genesis_hash: [u8; 32],
    /// How many blocks the output must age before it can be spent to `destination`.
    pub relative_lock: i64,
    /// The P2SH hash that can spend the output once it has aged.
    pub destination: [u8; 20],
}

/// A sidechain output that can either be challenged or, after `relative_lock` blocks, spent to
/// `destination`.
///
/// type: `[ReorgProof, Bool] -> 💥?`
///   ∪ `[_, Bool] -> [Bool] ∪ 💥`
pub fn withdraw_output(output: &WithdrawOutput, flags: Flags) -> Script {
    let mut script = Script::new()
        .push_opcode(OP_IF)
        .push_int(output.lock_height)
        .push_slice(&output.lock_tx)
        .push_int(output.lock_tx_out);
    if flags.contains(Flags::SpvProof) {
        script = script.push_int(output.work_amount);
    }
    script
        .push_int(output.bounty)
        .push_slice(&output.script_hash)
        .push_slice(&output.genesis_hash)
        .push_opcode(OP_REORGPROOFVERIFY)
        .push_opcode(OP_ELSE)
        .push_int(output.relative_lock)
        .push_opcode(OP_CHECKSEQUENCEVERIFY)
        .push_opcode(OP_DROP)
        .push_opcode(OP_HASH160)
        .push_slice(&output.destination)
        .push_opcode(OP_EQUAL)
        .push_opcode(OP_ENDIF)
}

/// The values carried by a withdrawal proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawProof {
    /// Whatever satisfies the committed script, pushed first.
    pub script_sig: Vec<Vec<u8>>,
    /// The serialized parent-chain transaction holding the lock.
    pub parent_tx: Vec<u8>,
    /// The index of the lock in `parent_tx`.
    pub output_index: u32,
    /// The serialized coinbase of the block holding `parent_tx`.
    pub coinbase: Vec<u8>,
    /// Only included with [`Flags::SpvProof`].
    pub spv_proof: Vec<u8>,
}

/// The push-only script that claims a lock on the sidechain.
pub fn withdraw_proof(proof: &WithdrawProof, flags: Flags) -> Script {
    let script = proof
        .script_sig
        .iter()
        .fold(Script::new(), |script, value| script.push_slice(value))
        .push_withdraw(&proof.parent_tx)
        .push_int(proof.output_index.into())
        .push_withdraw(&proof.coinbase);
    if flags.contains(Flags::SpvProof) {
        script.push_withdraw(&proof.spv_proof)
    } else {
        script
    }
}
