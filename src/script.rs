//! Managing sequences of opcodes.

use core::fmt;

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

use crate::{
    num,
    opcode::{Operation::*, PushValue::*},
    Opcode,
};

/// The largest value a single push may place on the stack.
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520; // bytes

/// The number of signature operations a `CHECKMULTISIG` is assumed to perform when the key count
/// isn’t known.
pub const MAX_PUBKEY_COUNT: u8 = 20;

/// Errors that can occur while walking a script.
#[allow(missing_docs)]
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    #[error("expected {expected_bytes} bytes, but only {available_bytes} bytes available")]
    ReadError {
        expected_bytes: usize,
        available_bytes: usize,
    },

    #[error("non-push opcode encountered when push-only required: {0}")]
    NotPushOnly(Opcode),
}

fn split_value(script: &[u8], needed_bytes: usize) -> Result<(&[u8], &[u8]), Error> {
    script
        .split_at_checked(needed_bytes)
        .ok_or(Error::ReadError {
            expected_bytes: needed_bytes,
            available_bytes: script.len(),
        })
}

/// Reads the little-endian length prefix of an `OP_PUSHDATAn`.
fn split_size(script: &mut &[u8], size_size: usize) -> Result<usize, Error> {
    let (bytes, rem) = split_value(script, size_size)?;
    *script = rem;
    Ok(usize::try_from(LittleEndian::read_uint(bytes, size_size)).unwrap_or(usize::MAX))
}

/// Decodes the opcode at the cursor, advancing past it, and returns its inline operand without
/// copying it.
fn split_op<'a>(pc: &mut &'a [u8]) -> Result<(Opcode, &'a [u8]), Error> {
    let bytes: &'a [u8] = *pc;
    let (leading_byte, mut script) = bytes.split_first().ok_or(Error::ReadError {
        expected_bytes: 1,
        available_bytes: 0,
    })?;

    let opcode = Opcode::from(*leading_byte);
    let size = match opcode {
        Opcode::PushValue(PushdataBytelength(size)) => usize::from(size),
        Opcode::PushValue(OP_PUSHDATA1) => split_size(&mut script, 1)?,
        Opcode::PushValue(OP_PUSHDATA2) => split_size(&mut script, 2)?,
        Opcode::PushValue(OP_PUSHDATA4) => split_size(&mut script, 4)?,
        _ => 0,
    };
    let (value, rem) = split_value(script, size)?;

    *pc = rem;
    Ok((opcode, value))
}

/// Decodes the opcode at the cursor without capturing its operand.
pub fn get_op(pc: &mut &[u8]) -> Result<Opcode, Error> {
    split_op(pc).map(|(opcode, _)| opcode)
}

/// Decodes the opcode at the cursor, advancing the cursor past it and replacing the contents of
/// `buffer` with the inline operand. Opcodes without an operand (including `OP_0` and the
/// small-integer opcodes) leave `buffer` empty.
///
/// This fails if the script ends before the opcode, its length prefix, or its operand does. The
/// cursor is only advanced on success.
pub fn get_op2(pc: &mut &[u8], buffer: &mut Vec<u8>) -> Result<Opcode, Error> {
    buffer.clear();
    let (opcode, value) = split_op(pc)?;
    buffer.extend_from_slice(value);
    Ok(opcode)
}

/// The opcodes of a script along with their operands. A decoding failure is yielded once and ends
/// the iteration.
#[derive(Clone, Debug)]
pub struct Instructions<'a> {
    pc: &'a [u8],
    failed: bool,
}

impl Iterator for Instructions<'_> {
    type Item = Result<(Opcode, Vec<u8>), Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pc.is_empty() {
            None
        } else {
            let mut data = vec![];
            let res = get_op2(&mut self.pc, &mut data).map(|op| (op, data));
            self.failed = res.is_err();
            Some(res)
        }
    }
}

/// Serialized script, used inside transaction inputs and outputs.
///
/// Scripts are built by appending and are otherwise immutable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Script(Vec<u8>);

impl Script {
    /// An empty script.
    pub fn new() -> Self {
        Script(vec![])
    }

    /// The serialized script.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Take the serialized script.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// The length of the serialized script.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the script has no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Walk the script.
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            pc: &self.0,
            failed: false,
        }
    }

    /// Appends a single opcode byte.
    pub fn push_opcode(mut self, opcode: impl Into<Opcode>) -> Self {
        let opcode: Opcode = opcode.into();
        self.0.push(opcode.into());
        self
    }

    /// Appends a push of `data`, using the shortest length prefix. Unlike [`Self::push_int`], this
    /// never uses the small-integer opcodes, so `[5]` is pushed as `0x01 0x05`.
    pub fn push_slice(mut self, data: &[u8]) -> Self {
        let len = data.len();
        if len < usize::from(u8::from(OP_PUSHDATA1)) {
            self.0.push(u8::try_from(len).unwrap_or_else(|_| unreachable!()));
        } else if let Ok(len) = u8::try_from(len) {
            self.0.extend([OP_PUSHDATA1.into(), len]);
        } else if let Ok(len) = u16::try_from(len) {
            let mut size = [0; 2];
            LittleEndian::write_u16(&mut size, len);
            self.0.push(OP_PUSHDATA2.into());
            self.0.extend(size);
        } else {
            let mut size = [0; 4];
            LittleEndian::write_u32(
                &mut size,
                u32::try_from(len).expect("pushes are smaller than 4 GiB"),
            );
            self.0.push(OP_PUSHDATA4.into());
            self.0.extend(size);
        }
        self.0.extend_from_slice(data);
        self
    }

    /// Appends the shortest push of `n`: an opcode for `-1..=16`, otherwise the minimal
    /// [`num::serialize`] encoding.
    pub fn push_int(self, n: i64) -> Self {
        match crate::opcode::PushValue::from_small_int(n) {
            Some(pv) => self.push_opcode(pv),
            None => self.push_slice(&num::serialize(n)),
        }
    }

    /// Appends the encoding of `num` as data, even when an opcode could represent it.
    pub fn push_script_num(self, num: &num::ScriptNum) -> Self {
        self.push_slice(&num.getvch())
    }

    /// The stack values of a push-only script, bottom first. The small-integer opcodes are
    /// replaced by the single-byte value they push.
    pub fn push_values(&self) -> Result<Vec<Vec<u8>>, Error> {
        self.instructions()
            .map(|res| {
                res.and_then(|(opcode, mut data)| match opcode {
                    Opcode::PushValue(pv) => {
                        data.extend(pv.small_int_value());
                        Ok(data)
                    }
                    _ => Err(Error::NotPushOnly(opcode)),
                })
            })
            .collect()
    }

    /// Pre-version-0.6, Bitcoin always counted CHECKMULTISIGs
    /// as 20 sigops. With pay-to-script-hash, that changed:
    /// CHECKMULTISIGs serialized in script_sigs are
    /// counted more accurately, assuming they are of the form
    ///  ... OP_N CHECKMULTISIG ...
    pub fn sig_op_count(&self, accurate: bool) -> u32 {
        let mut n = 0;
        let mut pc = self.as_bytes();
        let mut last_opcode = Opcode::Operation(OP_INVALIDOPCODE);
        while !pc.is_empty() {
            let opcode = match get_op(&mut pc) {
                Ok(o) => o,
                Err(_) => break,
            };
            if let Opcode::Operation(op) = opcode {
                if op == OP_CHECKSIG || op == OP_CHECKSIGVERIFY {
                    n += 1;
                } else if op == OP_CHECKMULTISIG || op == OP_CHECKMULTISIGVERIFY {
                    n += match last_opcode {
                        Opcode::PushValue(pv) if accurate => pv
                            .small_int()
                            .and_then(|keys| u32::try_from(keys).ok())
                            .filter(|keys| *keys >= 1)
                            .unwrap_or(MAX_PUBKEY_COUNT.into()),
                        _ => MAX_PUBKEY_COUNT.into(),
                    };
                }
            }
            last_opcode = opcode;
        }
        n
    }

    /// The signature operations performed by spending `self` with `script_sig`. For P2SH, that’s
    /// the accurate count of the redeem script, which is the last value `script_sig` pushes. A
    /// `script_sig` that isn’t push-only counts as 0, since it can’t spend a P2SH output.
    pub fn p2sh_sig_op_count(&self, script_sig: &Script) -> u32 {
        if !self.is_pay_to_script_hash() {
            return self.sig_op_count(true);
        }

        let mut pc = script_sig.as_bytes();
        let mut data = vec![];
        while !pc.is_empty() {
            match get_op2(&mut pc, &mut data) {
                Ok(opcode) if opcode.is_push() => (),
                _ => return 0,
            }
        }

        Script(data).sig_op_count(true)
    }

    /// Returns true iff this script is P2SH.
    pub fn is_pay_to_script_hash(&self) -> bool {
        self.0.len() == 23
            && self.0[0] == OP_HASH160.into()
            && self.0[1] == 0x14
            && self.0[22] == OP_EQUAL.into()
    }

    /// Whether the script decodes completely into opcodes no greater than `OP_16`.
    ///
    /// __NB__: `OP_RESERVED` counts as a push here, even though executing it fails.
    pub fn is_push_only(&self) -> bool {
        self.instructions()
            .all(|res| res.is_ok_and(|(opcode, _)| opcode.is_push()))
    }
}

impl From<Vec<u8>> for Script {
    fn from(value: Vec<u8>) -> Self {
        Script(value)
    }
}

impl From<&[u8]> for Script {
    fn from(value: &[u8]) -> Self {
        Script(value.to_vec())
    }
}

impl From<Script> for Vec<u8> {
    fn from(value: Script) -> Self {
        value.0
    }
}

impl AsRef<[u8]> for Script {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Renders the script as space-separated asm. Pushes of up to 4 bytes are shown as numbers, longer
/// ones as hex, and a decoding failure ends the output with `[error]`.
impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, res) in self.instructions().enumerate() {
            if i != 0 {
                f.write_str(" ")?;
            }
            match res {
                Err(_) => return f.write_str("[error]"),
                Ok((Opcode::PushValue(pv), data)) if u8::from(pv) <= u8::from(OP_PUSHDATA4) => {
                    if data.len() <= num::DEFAULT_MAX_SIZE {
                        write!(f, "{}", num::parse(&data, false, None).unwrap_or(0))?;
                    } else {
                        for byte in data {
                            write!(f, "{:02x}", byte)?;
                        }
                    }
                }
                Ok((opcode, _)) => write!(f, "{}", opcode)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hex::FromHex;
    use proptest::prelude::{prop, prop_assert, prop_assert_eq, proptest, ProptestConfig};

    use super::{get_op, get_op2, Error, Script, MAX_PUBKEY_COUNT};
    use crate::{
        opcode::{Operation::*, PushValue::*},
        pattern, Opcode,
    };

    fn script(hex: &str) -> Script {
        Script::from(<Vec<u8>>::from_hex(hex).expect("valid hex"))
    }

    #[test]
    fn decodes_each_push_form() {
        let s = script("0003aabbcc4c02ddee4d0100ff4e01000000115160");
        let mut pc = s.as_bytes();
        let mut data = vec![];

        assert_eq!(get_op2(&mut pc, &mut data), Ok(Opcode::PushValue(OP_0)));
        assert!(data.is_empty());
        assert_eq!(
            get_op2(&mut pc, &mut data),
            Ok(Opcode::PushValue(PushdataBytelength(3)))
        );
        assert_eq!(data, [0xaa, 0xbb, 0xcc]);
        assert_eq!(get_op2(&mut pc, &mut data), Ok(Opcode::PushValue(OP_PUSHDATA1)));
        assert_eq!(data, [0xdd, 0xee]);
        assert_eq!(get_op2(&mut pc, &mut data), Ok(Opcode::PushValue(OP_PUSHDATA2)));
        assert_eq!(data, [0xff]);
        assert_eq!(get_op2(&mut pc, &mut data), Ok(Opcode::PushValue(OP_PUSHDATA4)));
        assert_eq!(data, [0x11]);
        assert_eq!(get_op2(&mut pc, &mut data), Ok(Opcode::PushValue(OP_1)));
        assert!(data.is_empty());
        assert_eq!(get_op(&mut pc), Ok(Opcode::PushValue(OP_16)));
        assert!(pc.is_empty());
        assert_eq!(
            get_op(&mut pc),
            Err(Error::ReadError {
                expected_bytes: 1,
                available_bytes: 0
            })
        );
    }

    #[test]
    fn truncated_pushes_fail_without_advancing() {
        for hex in ["05aabb", "4c", "4d01", "4e010000", "4c05aa", "4d0200aa", "4e02000000aa"] {
            let s = script(hex);
            let mut pc = s.as_bytes();
            assert!(get_op(&mut pc).is_err(), "{hex} should fail to decode");
            assert_eq!(pc, s.as_bytes());
        }
    }

    #[test]
    fn get_op_skips_operands_like_get_op2() {
        let big = Script::new().push_slice(&[0x42; 70_000]);
        let s = Script::from(
            [&script("0003aabbcc4c02ddee4d0100ff51").as_bytes()[..], big.as_bytes()].concat(),
        );
        let mut skipping = s.as_bytes();
        let mut copying = s.as_bytes();
        let mut data = vec![0xee];
        while !skipping.is_empty() {
            assert_eq!(get_op(&mut skipping), get_op2(&mut copying, &mut data));
            assert_eq!(skipping, copying);
        }
        assert_eq!(data.len(), 70_000);
        assert!(copying.is_empty());
    }

    #[test]
    fn push_slice_uses_the_shortest_prefix() {
        assert_eq!(Script::new().push_slice(&[]).as_bytes(), [0x00]);
        assert_eq!(Script::new().push_slice(&[5]).as_bytes(), [0x01, 0x05]);
        assert_eq!(Script::new().push_slice(&[7; 75]).as_bytes()[0], 75);
        assert_eq!(Script::new().push_slice(&[7; 76]).as_bytes()[..2], [0x4c, 76]);
        assert_eq!(
            Script::new().push_slice(&[7; 520]).as_bytes()[..3],
            [0x4d, 0x08, 0x02]
        );
        assert_eq!(
            Script::new().push_slice(&[7; 0x10000]).as_bytes()[..5],
            [0x4e, 0x00, 0x00, 0x01, 0x00]
        );
    }

    #[test]
    fn push_int_prefers_opcodes() {
        assert_eq!(Script::new().push_int(0).as_bytes(), [0x00]);
        assert_eq!(Script::new().push_int(-1).as_bytes(), [0x4f]);
        assert_eq!(Script::new().push_int(16).as_bytes(), [0x60]);
        assert_eq!(Script::new().push_int(17).as_bytes(), [0x01, 0x11]);
        assert_eq!(Script::new().push_int(-2).as_bytes(), [0x01, 0x82]);
        assert_eq!(Script::new().push_int(144).as_bytes(), [0x02, 0x90, 0x00]);
    }

    #[test]
    fn push_values_synthesizes_small_ints() {
        let s = Script::new()
            .push_int(-1)
            .push_int(0)
            .push_int(7)
            .push_slice(&[7])
            .push_slice(&[1, 2, 3]);
        assert_eq!(
            s.push_values(),
            Ok(vec![vec![0x81], vec![], vec![7], vec![7], vec![1, 2, 3]])
        );
        assert_eq!(
            s.push_opcode(OP_DROP).push_values(),
            Err(Error::NotPushOnly(Opcode::Operation(OP_DROP)))
        );
    }

    #[test]
    fn p2sh_detection_is_byte_exact() {
        let p2sh = pattern::pay_to_script_hash(&Script::new().push_opcode(OP_1));
        assert_eq!(p2sh.len(), 23);
        assert!(p2sh.is_pay_to_script_hash());

        for (i, byte) in [(0, 0xa8), (1, 0x15), (22, 0x88)] {
            let mut bytes: Vec<u8> = p2sh.clone().into();
            bytes[i] = byte;
            assert!(!Script::from(bytes).is_pay_to_script_hash());
        }
        let mut longer: Vec<u8> = p2sh.into();
        longer.push(0x87);
        assert!(!Script::from(longer).is_pay_to_script_hash());
    }

    #[test]
    fn push_only() {
        assert!(Script::new().is_push_only());
        assert!(script("00510350aabb4f60").is_push_only());
        // `OP_RESERVED` is classified by shape, not by whether it executes.
        assert!(script("50").is_push_only());
        assert!(!script("5175").is_push_only());
        assert!(!script("51ba").is_push_only());
        assert!(!script("5103aabb").is_push_only());
    }

    #[test]
    fn sig_op_counts() {
        let multisig = |n: i64| {
            Script::new()
                .push_int(1)
                .push_slice(&[2; 33])
                .push_int(n)
                .push_opcode(OP_CHECKMULTISIG)
        };
        assert_eq!(multisig(3).sig_op_count(true), 3);
        assert_eq!(multisig(3).sig_op_count(false), 20);
        assert_eq!(multisig(16).sig_op_count(true), 16);
        // Anything but `OP_1`..`OP_16` is assumed to be the maximum.
        assert_eq!(multisig(0).sig_op_count(true), MAX_PUBKEY_COUNT.into());
        assert_eq!(multisig(-1).sig_op_count(true), MAX_PUBKEY_COUNT.into());
        assert_eq!(multisig(17).sig_op_count(true), MAX_PUBKEY_COUNT.into());
        assert_eq!(
            Script::new()
                .push_opcode(OP_CHECKMULTISIGVERIFY)
                .sig_op_count(true),
            20
        );

        let singles = Script::new()
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_opcode(OP_CHECKSIGFROMSTACK);
        assert_eq!(singles.sig_op_count(false), 2);

        // Counting stops at the first decoding failure.
        let mut truncated: Vec<u8> = Script::new().push_opcode(OP_CHECKSIG).into();
        truncated.extend([0x05, 0xac, 0xac]);
        assert_eq!(Script::from(truncated).sig_op_count(true), 1);
    }

    #[test]
    fn p2sh_sig_op_count_reads_the_redeem_script() {
        let redeem = Script::new()
            .push_int(2)
            .push_slice(&[2; 33])
            .push_slice(&[3; 33])
            .push_slice(&[2; 33])
            .push_int(3)
            .push_opcode(OP_CHECKMULTISIG);
        let pub_key = pattern::pay_to_script_hash(&redeem);
        let sig = Script::new()
            .push_int(0)
            .push_slice(&[0x30; 71])
            .push_slice(&[0x30; 72])
            .push_slice(redeem.as_bytes());

        assert_eq!(pub_key.p2sh_sig_op_count(&sig), 3);
        assert_eq!(
            pub_key.p2sh_sig_op_count(&sig.clone().push_opcode(OP_NOP)),
            0
        );
        assert_eq!(pub_key.p2sh_sig_op_count(&script("0201")), 0);
        // A non-P2SH script is counted on its own.
        assert_eq!(redeem.p2sh_sig_op_count(&sig), 3);
    }

    #[test]
    fn asm() {
        let s = Script::new()
            .push_opcode(OP_IF)
            .push_int(0)
            .push_int(-1)
            .push_int(16)
            .push_slice(&[0x90, 0x00])
            .push_slice(&[0xde, 0xad, 0xbe, 0xef, 0x01])
            .push_opcode(OP_WITHDRAWPROOFVERIFY)
            .push_opcode(0xba)
            .push_opcode(OP_ENDIF);
        assert_eq!(
            s.to_string(),
            "OP_IF 0 -1 16 144 deadbeef01 OP_WITHDRAWPROOFVERIFY OP_UNKNOWN OP_ENDIF"
        );
        assert_eq!(script("5104aabb").to_string(), "1 [error]");
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 2_000, .. ProptestConfig::default()
        })]

        #[test]
        fn decoding_never_overreads(bytes in prop::collection::vec(0..=0xffu8, 0..=600)) {
            let mut pc = &bytes[..];
            let mut consumed = 0;
            let mut data = vec![];
            while !pc.is_empty() {
                let before = pc.len();
                match get_op2(&mut pc, &mut data) {
                    Ok(_) => {
                        prop_assert!(pc.len() < before);
                        prop_assert!(data.len() < before);
                        consumed += before - pc.len();
                    }
                    Err(_) => {
                        prop_assert_eq!(pc.len(), before);
                        break;
                    }
                }
            }
            prop_assert!(consumed <= bytes.len());
        }

        #[test]
        fn decoding_failures_are_not_push_only(bytes in prop::collection::vec(0..=0x60u8, 0..=100)) {
            let s = Script::from(bytes);
            let decodes = s.instructions().all(|res| res.is_ok());
            prop_assert_eq!(s.is_push_only(), decodes);
            prop_assert_eq!(s.push_values().is_ok(), decodes);
        }

        #[test]
        fn pushes_decode_to_their_data(data in prop::collection::vec(0..=0xffu8, 0..=1_000)) {
            let s = Script::new().push_slice(&data);
            let mut pc = s.as_bytes();
            let mut decoded = vec![];
            prop_assert!(get_op2(&mut pc, &mut decoded).is_ok());
            prop_assert!(pc.is_empty());
            prop_assert_eq!(decoded, data);
        }
    }
}
