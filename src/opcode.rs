#![allow(non_camel_case_types)]

use core::fmt;

/// Opcodes that push a value onto the stack, either carried inline or implied by the opcode.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum PushValue {
    /// Pushes the empty byte sequence.
    OP_0,
    /// Pushes the following 1–75 bytes. The byte is the length.
    PushdataBytelength(u8),
    OP_PUSHDATA1,
    OP_PUSHDATA2,
    OP_PUSHDATA4,
    OP_1NEGATE,
    /// Fails when executed, but is classified with the pushes.
    OP_RESERVED,
    OP_1,
    OP_2,
    OP_3,
    OP_4,
    OP_5,
    OP_6,
    OP_7,
    OP_8,
    OP_9,
    OP_10,
    OP_11,
    OP_12,
    OP_13,
    OP_14,
    OP_15,
    OP_16,
}

use PushValue::*;

impl PushValue {
    /// Returns the value of `OP_1NEGATE` and `OP_1`..`OP_16`.
    pub fn small_int(&self) -> Option<i64> {
        match self {
            OP_1NEGATE => Some(-1),
            OP_RESERVED | OP_0 | PushdataBytelength(_) | OP_PUSHDATA1 | OP_PUSHDATA2
            | OP_PUSHDATA4 => None,
            _ => Some(i64::from(u8::from(*self) - (u8::from(OP_1) - 1))),
        }
    }

    /// The minimally-encoded stack value of an opcode that carries no inline data, or `None` for
    /// `OP_0` and the explicit pushes.
    pub fn small_int_value(&self) -> Option<u8> {
        match self {
            OP_1NEGATE => Some(0x81),
            _ => self
                .small_int()
                .filter(|n| *n > 0)
                .map(|n| u8::try_from(n).unwrap_or_else(|_| unreachable!())),
        }
    }

    /// The opcode for the small integer `n`, if there is one.
    pub fn from_small_int(n: i64) -> Option<PushValue> {
        match n {
            -1 => Some(OP_1NEGATE),
            0 => Some(OP_0),
            1..=16 => PushValue::try_from(
                u8::try_from(n).unwrap_or_else(|_| unreachable!()) + (u8::from(OP_1) - 1),
            )
            .ok(),
            _ => None,
        }
    }
}

impl From<PushValue> for u8 {
    fn from(value: PushValue) -> Self {
        match value {
            OP_0 => 0x00,
            PushdataBytelength(byte) => byte,
            OP_PUSHDATA1 => 0x4c,
            OP_PUSHDATA2 => 0x4d,
            OP_PUSHDATA4 => 0x4e,
            OP_1NEGATE => 0x4f,
            OP_RESERVED => 0x50,
            OP_1 => 0x51,
            OP_2 => 0x52,
            OP_3 => 0x53,
            OP_4 => 0x54,
            OP_5 => 0x55,
            OP_6 => 0x56,
            OP_7 => 0x57,
            OP_8 => 0x58,
            OP_9 => 0x59,
            OP_10 => 0x5a,
            OP_11 => 0x5b,
            OP_12 => 0x5c,
            OP_13 => 0x5d,
            OP_14 => 0x5e,
            OP_15 => 0x5f,
            OP_16 => 0x60,
        }
    }
}

impl TryFrom<u8> for PushValue {
    type Error = ();
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(OP_0),
            0x4c => Ok(OP_PUSHDATA1),
            0x4d => Ok(OP_PUSHDATA2),
            0x4e => Ok(OP_PUSHDATA4),
            0x4f => Ok(OP_1NEGATE),
            0x50 => Ok(OP_RESERVED),
            0x51 => Ok(OP_1),
            0x52 => Ok(OP_2),
            0x53 => Ok(OP_3),
            0x54 => Ok(OP_4),
            0x55 => Ok(OP_5),
            0x56 => Ok(OP_6),
            0x57 => Ok(OP_7),
            0x58 => Ok(OP_8),
            0x59 => Ok(OP_9),
            0x5a => Ok(OP_10),
            0x5b => Ok(OP_11),
            0x5c => Ok(OP_12),
            0x5d => Ok(OP_13),
            0x5e => Ok(OP_14),
            0x5f => Ok(OP_15),
            0x60 => Ok(OP_16),
            0x01..=0x4b => Ok(PushdataBytelength(value)),
            _ => Err(()),
        }
    }
}

impl fmt::Display for PushValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OP_0 => f.write_str("0"),
            OP_1NEGATE => f.write_str("-1"),
            // The length bytes have no name of their own.
            PushdataBytelength(_) => f.write_str("OP_UNKNOWN"),
            OP_PUSHDATA1 | OP_PUSHDATA2 | OP_PUSHDATA4 | OP_RESERVED => write!(f, "{:?}", self),
            _ => write!(f, "{}", self.small_int().unwrap_or_else(|| unreachable!())),
        }
    }
}

enum_from_primitive! {
/// Every opcode outside the push range that has a meaning.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
#[repr(u8)]
pub enum Operation {
    // control
    OP_NOP = 0x61,
    OP_VER = 0x62,
    OP_IF = 0x63,
    OP_NOTIF = 0x64,
    OP_VERIF = 0x65,
    OP_VERNOTIF = 0x66,
    OP_ELSE = 0x67,
    OP_ENDIF = 0x68,
    OP_VERIFY = 0x69,
    OP_RETURN = 0x6a,

    // stack ops
    OP_TOALTSTACK = 0x6b,
    OP_FROMALTSTACK = 0x6c,
    OP_2DROP = 0x6d,
    OP_2DUP = 0x6e,
    OP_3DUP = 0x6f,
    OP_2OVER = 0x70,
    OP_2ROT = 0x71,
    OP_2SWAP = 0x72,
    OP_IFDUP = 0x73,
    OP_DEPTH = 0x74,
    OP_DROP = 0x75,
    OP_DUP = 0x76,
    OP_NIP = 0x77,
    OP_OVER = 0x78,
    OP_PICK = 0x79,
    OP_ROLL = 0x7a,
    OP_ROT = 0x7b,
    OP_SWAP = 0x7c,
    OP_TUCK = 0x7d,

    // splice ops
    OP_CAT = 0x7e,
    OP_SUBSTR = 0x7f,
    OP_LEFT = 0x80,
    OP_RIGHT = 0x81,
    OP_SIZE = 0x82,

    // bit logic
    OP_INVERT = 0x83,
    OP_AND = 0x84,
    OP_OR = 0x85,
    OP_XOR = 0x86,
    OP_EQUAL = 0x87,
    OP_EQUALVERIFY = 0x88,
    OP_RESERVED1 = 0x89,
    OP_RESERVED2 = 0x8a,

    // numeric
    OP_1ADD = 0x8b,
    OP_1SUB = 0x8c,
    OP_2MUL = 0x8d,
    OP_2DIV = 0x8e,
    OP_NEGATE = 0x8f,
    OP_ABS = 0x90,
    OP_NOT = 0x91,
    OP_0NOTEQUAL = 0x92,

    OP_ADD = 0x93,
    OP_SUB = 0x94,
    OP_MUL = 0x95,
    OP_DIV = 0x96,
    OP_MOD = 0x97,
    OP_LSHIFT = 0x98,
    OP_RSHIFT = 0x99,

    OP_BOOLAND = 0x9a,
    OP_BOOLOR = 0x9b,
    OP_NUMEQUAL = 0x9c,
    OP_NUMEQUALVERIFY = 0x9d,
    OP_NUMNOTEQUAL = 0x9e,
    OP_LESSTHAN = 0x9f,
    OP_GREATERTHAN = 0xa0,
    OP_LESSTHANOREQUAL = 0xa1,
    OP_GREATERTHANOREQUAL = 0xa2,
    OP_MIN = 0xa3,
    OP_MAX = 0xa4,

    OP_WITHIN = 0xa5,

    // crypto
    OP_RIPEMD160 = 0xa6,
    OP_SHA1 = 0xa7,
    OP_SHA256 = 0xa8,
    OP_HASH160 = 0xa9,
    OP_HASH256 = 0xaa,
    OP_CODESEPARATOR = 0xab,
    OP_CHECKSIG = 0xac,
    OP_CHECKSIGVERIFY = 0xad,
    OP_CHECKMULTISIG = 0xae,
    OP_CHECKMULTISIGVERIFY = 0xaf,

    // expansion
    OP_NOP1 = 0xb0,
    OP_NOP2 = 0xb1,
    OP_NOP3 = 0xb2,

    // sidechain withdrawals
    OP_WITHDRAWPROOFVERIFY = 0xb3,
    OP_REORGPROOFVERIFY = 0xb4,

    OP_NOP6 = 0xb5,
    OP_NOP7 = 0xb6,
    OP_NOP8 = 0xb7,
    OP_NOP9 = 0xb8,
    OP_NOP10 = 0xb9,

    OP_DETERMINISTICRANDOM = 0xc0,
    OP_CHECKSIGFROMSTACK = 0xc1,
    OP_CHECKSIGFROMSTACKVERIFY = 0xc2,
    OP_SUBSTR_LAZY = 0xc3,

    OP_INVALIDOPCODE = 0xff,
}
}

use Operation::*;

pub const OP_CHECKLOCKTIMEVERIFY: Operation = OP_NOP2;
pub const OP_CHECKSEQUENCEVERIFY: Operation = OP_NOP3;
pub const OP_NOP4: Operation = OP_WITHDRAWPROOFVERIFY;
pub const OP_NOP5: Operation = OP_REORGPROOFVERIFY;

impl From<Operation> for u8 {
    fn from(value: Operation) -> Self {
        // This is how you get the discriminant, but using `as` everywhere is too much code smell
        value as u8
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The variants are named after their mnemonics.
        write!(f, "{:?}", self)
    }
}
