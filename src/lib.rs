//! Script decoding and two-way peg withdrawal validation for sidechains.
//!
//! This crate doesn’t execute scripts. It walks their byte stream, classifies them, and checks
//! the rigid templates that gate the withdrawal opcodes (`OP_WITHDRAWPROOFVERIFY` and
//! `OP_REORGPROOFVERIFY`) before an interpreter is allowed to run them. Once a script matches a
//! template, the extractors in [`withdraw`] recover the values it commits to.

#![doc(html_root_url = "https://docs.rs/peg_script/0.1.0")]
#![deny(missing_docs)]

#[macro_use]
extern crate enum_primitive;

pub mod num;
#[allow(missing_docs)]
pub mod opcode;
pub mod pattern;
pub mod script;
pub mod tx;
pub mod withdraw;

use core::fmt;

use enum_primitive::FromPrimitive;

use opcode::{Operation, PushValue};

/// Script opcodes
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Opcode {
    /// Opcodes that push a value onto the stack, including `OP_RESERVED`.
    PushValue(PushValue),
    /// Everything above `OP_16` that has a meaning.
    Operation(Operation),
    /// A byte with no assigned meaning.
    Unknown(u8),
}

impl Opcode {
    /// Whether this is in the push range (at most `OP_16`).
    pub fn is_push(&self) -> bool {
        matches!(self, Opcode::PushValue(_))
    }

    /// Whether this pushes a number or data, which excludes `OP_RESERVED` from the push range.
    pub fn is_push_value(&self) -> bool {
        matches!(self, Opcode::PushValue(pv) if *pv != PushValue::OP_RESERVED)
    }
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        PushValue::try_from(value).map_or_else(
            |()| Operation::from_u8(value).map_or(Opcode::Unknown(value), Opcode::Operation),
            Opcode::PushValue,
        )
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::PushValue(pv) => pv.into(),
            Opcode::Operation(op) => op.into(),
            Opcode::Unknown(byte) => byte,
        }
    }
}

impl From<PushValue> for Opcode {
    fn from(value: PushValue) -> Self {
        Opcode::PushValue(value)
    }
}

impl From<Operation> for Opcode {
    fn from(value: Operation) -> Self {
        Opcode::Operation(value)
    }
}

/// The mnemonic of the opcode, for diagnostics. Bytes without a meaning are all `OP_UNKNOWN`.
impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::PushValue(pv) => pv.fmt(f),
            Opcode::Operation(op) => op.fmt(f),
            Opcode::Unknown(_) => f.write_str("OP_UNKNOWN"),
        }
    }
}

/// Utilities useful for tests in other modules and crates.
#[cfg(any(test, feature = "test-dependencies"))]
pub mod testing {
    use bitcoin::{
        absolute::LockTime, consensus, transaction::Version, Amount, OutPoint, ScriptBuf,
        Sequence, Transaction, TxIn, TxOut, Witness,
    };
    use hex::FromHex;

    use crate::{
        pattern::{self, WithdrawOutput, WithdrawProof},
        script::Script,
        withdraw::Flags,
    };

    /// The genesis block hash of the sidechain used by the fixtures.
    pub const GENESIS_HASH: [u8; 32] = [0x4e; 32];

    /// A parent-chain transaction with `outputs` outputs, each paying to `pattern::withdraw_lock`.
    pub fn parent_transaction(outputs: usize) -> Transaction {
        Transaction {
            version: Version::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::from_bytes(vec![0x51]),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: (0..outputs)
                .map(|i| TxOut {
                    value: Amount::from_sat(100_000 * (u64::try_from(i).unwrap_or(0) + 1)),
                    script_pubkey: ScriptBuf::from_bytes(LOCK.as_bytes().to_vec()),
                })
                .collect(),
        }
    }

    /// A proof that spends output `index` of `tx`, in the shape selected by `flags`.
    pub fn withdraw_proof(tx: &Transaction, index: u32, flags: Flags) -> Script {
        pattern::withdraw_proof(
            &WithdrawProof {
                script_sig: vec![vec![], SIGNATURE.clone(), pattern::canonical_withdraw_script().into()],
                parent_tx: consensus::serialize(tx),
                output_index: index,
                coinbase: vec![0xcb; 1100],
                spv_proof: vec![0x5f; 1100],
            },
            flags,
        )
    }

    lazy_static::lazy_static! {
        /// A DER signature, used as opaque filler.
        pub static ref SIGNATURE: Vec<u8> = <Vec<u8>>::from_hex(
            "3045022100d2ab3e6258fe244fa442cfb38f6cef9ac9a18c54e70b2f508e83fa87e20d040502200eead947521de943831d07a350e45af8e36c2166984a8636f0a8811ff03ed09401"
        ).expect("valid hex");
        /// A lock on the parent chain that commits funds to the fixture sidechain.
        pub static ref LOCK: Script = pattern::withdraw_lock(
            Some(&[0x11; 20]),
            &GENESIS_HASH,
            &pattern::withdraw_script_hash(),
        );
        /// The output a withdrawal creates on the sidechain.
        pub static ref OUTPUT: WithdrawOutput = WithdrawOutput {
            lock_height: 1,
            lock_tx: [0xaa; 32],
            lock_tx_out: 1,
            work_amount: 3,
            bounty: 0x0102_0304,
            script_hash: [0xbb; 20],
            genesis_hash: GENESIS_HASH,
            relative_lock: 1,
            destination: [0xcc; 20],
        };
    }
}
