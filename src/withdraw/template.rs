//! Fixed-shape scripts, described as a sequence of fields that each match exactly one opcode.

use tracing::trace;

use crate::{
    opcode::Operation,
    script::{get_op, get_op2, Script},
    Opcode,
};

/// What a single opcode must look like.
#[derive(Clone, Copy, Debug)]
pub enum Shape {
    /// Exactly this operation.
    Operation(Operation),
    /// Any push except `OP_RESERVED`, with an operand of at most `max_size` bytes, if given. The
    /// encoding doesn’t need to be minimal.
    Number { max_size: Option<usize> },
    /// Any opcode with an operand of exactly this many bytes.
    Data(usize),
    /// The direct push of exactly this many bytes, so the opcode byte is also the size.
    DirectPush(u8),
}

/// A constraint on the operand, beyond its shape.
#[derive(Clone, Copy, Debug)]
pub enum Value<'a> {
    Any,
    Equals(&'a [u8]),
    StartsWith(&'a [u8]),
}

impl Value<'_> {
    fn matches(&self, data: &[u8]) -> bool {
        match self {
            Value::Any => true,
            Value::Equals(expected) => data == *expected,
            Value::StartsWith(prefix) => data.starts_with(prefix),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Field<'a> {
    pub name: &'static str,
    pub shape: Shape,
    pub value: Value<'a>,
}

impl<'a> Field<'a> {
    pub const fn operation(name: &'static str, op: Operation) -> Self {
        Field {
            name,
            shape: Shape::Operation(op),
            value: Value::Any,
        }
    }

    pub const fn number(name: &'static str, max_size: Option<usize>) -> Self {
        Field {
            name,
            shape: Shape::Number { max_size },
            value: Value::Any,
        }
    }

    pub const fn data(name: &'static str, size: usize) -> Self {
        Field {
            name,
            shape: Shape::Data(size),
            value: Value::Any,
        }
    }

    pub const fn direct_push(name: &'static str, size: u8) -> Self {
        Field {
            name,
            shape: Shape::DirectPush(size),
            value: Value::Any,
        }
    }

    pub fn with_value(self, value: Value<'a>) -> Self {
        Field { value, ..self }
    }

    fn matches(&self, opcode: Opcode, data: &[u8]) -> bool {
        let shaped = match self.shape {
            Shape::Operation(op) => opcode == Opcode::Operation(op),
            Shape::Number { max_size } => {
                opcode.is_push_value() && max_size.map_or(true, |max| data.len() <= max)
            }
            Shape::Data(size) => data.len() == size,
            Shape::DirectPush(size) => u8::from(opcode) == size && data.len() == usize::from(size),
        };
        shaped && self.value.matches(data)
    }
}

/// The stack values of the matched fields, with the small-integer opcodes replaced by the value
/// they push.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Captures(Vec<(&'static str, Vec<u8>)>);

impl Captures {
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| &value[..])
    }
}

/// What may follow the last field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trailing {
    /// Anything.
    Allowed,
    /// Nothing, the script must end after the last field.
    Forbidden,
    /// Only bytes that don’t decode as an opcode.
    Undecodable,
}

#[derive(Clone, Debug)]
pub struct Template<'a> {
    pub fields: Vec<Field<'a>>,
    pub trailing: Trailing,
}

impl Template<'_> {
    /// Matches the fields in order against the start of `script`, stopping at the first one that
    /// doesn’t match.
    pub fn captures(&self, script: &Script) -> Option<Captures> {
        let mut pc = script.as_bytes();
        let mut captures = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let mut data = vec![];
            match get_op2(&mut pc, &mut data) {
                Ok(opcode) if field.matches(opcode, &data) => {
                    if let Opcode::PushValue(pv) = opcode {
                        data.extend(pv.small_int_value());
                    }
                    captures.push((field.name, data));
                }
                Ok(opcode) => {
                    trace!(field = field.name, %opcode, "unexpected opcode in template");
                    return None;
                }
                Err(err) => {
                    trace!(field = field.name, %err, "script ended before template");
                    return None;
                }
            }
        }
        let rejected = match self.trailing {
            Trailing::Allowed => false,
            Trailing::Forbidden => !pc.is_empty(),
            Trailing::Undecodable => get_op(&mut pc).is_ok(),
        };
        if rejected {
            trace!(remaining = pc.len(), trailing = ?self.trailing, "trailing bytes after template");
            return None;
        }
        Some(Captures(captures))
    }

    pub fn matches(&self, script: &Script) -> bool {
        self.captures(script).is_some()
    }
}
