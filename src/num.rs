//! The variable-length signed-magnitude integers used on the stack and inside withdrawal
//! templates.

use thiserror::Error;

/// Things that can go wrong when decoding a [`ScriptNum`].
#[allow(missing_docs)]
#[derive(Clone, PartialEq, Eq, Debug, Error)]
pub enum Error {
    #[error("non-minimal encoding of script number")]
    NonMinimalEncoding(Option<Vec<u8>>),

    #[error("script number overflow: max: {max_size}, actual: {actual}")]
    Overflow { max_size: usize, actual: usize },
}

/// The size limit used when none is given, which covers every 32-bit value.
pub const DEFAULT_MAX_SIZE: usize = 4;

/// Convert bytes to the integer they encode.
///
/// __NB__: Setting `max_size` to more than `9` has no effect, and the special encoding of
///         [`i64::MIN`] is the only allowed 9-byte value.
pub fn parse(vch: &[u8], require_minimal: bool, max_size: Option<usize>) -> Result<i64, Error> {
    match vch.last() {
        None => Ok(0),
        Some(vch_back) => {
            let max_size = max_size.unwrap_or(DEFAULT_MAX_SIZE);
            if vch.len() > max_size {
                return Err(Error::Overflow {
                    max_size,
                    actual: vch.len(),
                });
            }
            if require_minimal {
                // If the most-significant-byte - excluding the sign bit - is zero then we're not
                // minimal. Note how this test also rejects the negative-zero encoding, 0x80.
                if (vch_back & 0x7F) == 0 {
                    // One exception: if there's more than one byte and the most significant bit of
                    // the second-most-significant-byte is set then it would have conflicted with
                    // the sign bit if one fewer byte were used, and so such encodings are minimal.
                    // An example of this is +-255, which have minimal encodings [0xff, 0x00] and
                    // [0xff, 0x80] respectively.
                    if vch.len() <= 1 || (vch[vch.len() - 2] & 0x80) == 0 {
                        return Err(Error::NonMinimalEncoding(Some(vch.to_vec())));
                    }
                }
            }

            if *vch == [0, 0, 0, 0, 0, 0, 0, 128, 128] {
                return Ok(i64::MIN);
            };

            // Left shift of `i64` by 64 bits overflows. The above encoding of `i64::MIN` is the
            // only allowed 9-byte encoding.
            if vch.len() > 8 {
                return Err(Error::Overflow {
                    max_size: 8,
                    actual: vch.len(),
                });
            };

            let mut result: i64 = 0;
            for (i, vch_i) in vch.iter().enumerate() {
                result |= i64::from(*vch_i) << (8 * i);
            }

            // If the input vector's most significant byte is 0x80, remove it from the result's msb
            // and return a negative.
            if vch_back & 0x80 != 0 {
                return Ok(-(result & !(0x80 << (8 * (vch.len() - 1)))));
            };

            Ok(result)
        }
    }
}

/// The minimal encoding of `value`.
pub fn serialize(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }

    if value == i64::MIN {
        // The general case below can’t negate `i64::MIN`. This is the result it would produce with
        // wrapping arithmetic, and is what `parse` special-cases.
        return vec![0, 0, 0, 0, 0, 0, 0, 128, 128];
    }

    let mut result = Vec::new();
    let neg = value < 0;
    let mut absvalue = value.abs();

    while absvalue != 0 {
        result.push(
            (absvalue & 0xff)
                .try_into()
                .unwrap_or_else(|_| unreachable!()),
        );
        absvalue >>= 8;
    }

    // - If the most significant byte is >= 0x80 and the value is positive, push a new zero-byte to
    //   make the significant byte < 0x80 again.
    // - If the most significant byte is >= 0x80 and the value is negative, push a new 0x80 byte
    //   that will be popped off when converting to an integral.
    // - If the most significant byte is < 0x80 and the value is negative, add 0x80 to it, since it
    //   will be subtracted and interpreted as a negative when converting to an integral.
    if result.last().map_or(true, |last| last & 0x80 != 0) {
        result.push(if neg { 0x80 } else { 0 });
    } else if neg {
        if let Some(last) = result.last_mut() {
            *last |= 0x80;
        }
    }

    result
}

/// A decoded script number.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct ScriptNum(i64);

impl ScriptNum {
    /// Decode a script number, see [`parse`].
    pub fn new(vch: &[u8], require_minimal: bool, max_size: Option<usize>) -> Result<Self, Error> {
        parse(vch, require_minimal, max_size).map(ScriptNum)
    }

    /// The value, saturated to the range of `i32`.
    pub fn getint(&self) -> i32 {
        if self.0 > i32::MAX.into() {
            i32::MAX
        } else if self.0 < i32::MIN.into() {
            i32::MIN
        } else {
            self.0.try_into().unwrap_or_else(|_| unreachable!())
        }
    }

    /// The exact value.
    pub fn getint64(&self) -> i64 {
        self.0
    }

    /// The minimal encoding of this number.
    pub fn getvch(&self) -> Vec<u8> {
        serialize(self.0)
    }
}

impl From<i64> for ScriptNum {
    fn from(value: i64) -> Self {
        ScriptNum(value)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::{prop, prop_assert_eq, proptest, ProptestConfig};

    use super::{parse, serialize, Error, ScriptNum};

    #[test]
    fn parse_known_encodings() {
        assert_eq!(parse(&[], true, None), Ok(0));
        assert_eq!(parse(&[0x81], true, None), Ok(-1));
        assert_eq!(parse(&[0x90, 0x00], true, None), Ok(144));
        assert_eq!(parse(&[0xff, 0x00], true, None), Ok(255));
        assert_eq!(parse(&[0xff, 0x80], true, None), Ok(-255));
        assert_eq!(parse(&[0xff, 0xff, 0xff, 0x7f], true, None), Ok(i32::MAX.into()));
    }

    #[test]
    fn non_minimal_encodings_are_only_rejected_when_required() {
        assert_eq!(
            parse(&[0x05, 0x00], true, None),
            Err(Error::NonMinimalEncoding(Some(vec![0x05, 0x00])))
        );
        assert_eq!(parse(&[0x05, 0x00], false, None), Ok(5));
        assert_eq!(
            parse(&[0x80], true, None),
            Err(Error::NonMinimalEncoding(Some(vec![0x80])))
        );
        assert_eq!(parse(&[0x80], false, None), Ok(0));
    }

    #[test]
    fn overlong_encodings_overflow() {
        assert_eq!(
            parse(&[1, 2, 3, 4, 5], false, None),
            Err(Error::Overflow {
                max_size: 4,
                actual: 5
            })
        );
        assert_eq!(
            parse(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f], false, Some(8)),
            Ok(i64::MAX)
        );
    }

    #[test]
    fn getint_saturates() {
        let big = ScriptNum::from(i64::from(i32::MAX) + 10);
        assert_eq!(big.getint(), i32::MAX);
        assert_eq!(big.getint64(), i64::from(i32::MAX) + 10);
        assert_eq!(ScriptNum::from(i64::MIN).getint(), i32::MIN);
    }

    #[test]
    fn serialize_boundaries() {
        assert_eq!(serialize(0), Vec::<u8>::new());
        assert_eq!(serialize(-1), vec![0x81]);
        assert_eq!(serialize(127), vec![0x7f]);
        assert_eq!(serialize(128), vec![0x80, 0x00]);
        assert_eq!(serialize(-128), vec![0x80, 0x80]);
        assert_eq!(serialize(i64::MIN), vec![0, 0, 0, 0, 0, 0, 0, 128, 128]);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 5_000, .. ProptestConfig::default()
        })]

        #[test]
        fn minimal_encodings_round_trip(n in prop::num::i64::ANY) {
            let vch = serialize(n);
            prop_assert_eq!(parse(&vch, true, Some(9)), Ok(n));
            prop_assert_eq!(ScriptNum::new(&vch, true, Some(9)).map(|num| num.getvch()), Ok(vch));
        }
    }
}
