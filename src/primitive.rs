// src/primitive.rs
//! Primitive type alphabet used by method shorties.
//!
//! A shorty is the compressed form of a method descriptor: the return type
//! followed by one character per declared parameter. All reference types
//! collapse to `L`.

use std::fmt;

use serde::Serialize;

use crate::error::{Error, Result};

/// Size in bytes of a compressed heap reference.
pub const HEAP_REFERENCE_SIZE: usize = 4;

/// Type of a value as seen by the calling convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Primitive {
    /// Object reference (`L`)
    Not,
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl Primitive {
    /// Map a shorty character to its type, `None` if it is not part of the alphabet
    pub fn from_shorty_char(ch: char) -> Option<Primitive> {
        match ch {
            'L' => Some(Primitive::Not),
            'Z' => Some(Primitive::Boolean),
            'B' => Some(Primitive::Byte),
            'C' => Some(Primitive::Char),
            'S' => Some(Primitive::Short),
            'I' => Some(Primitive::Int),
            'J' => Some(Primitive::Long),
            'F' => Some(Primitive::Float),
            'D' => Some(Primitive::Double),
            'V' => Some(Primitive::Void),
            _ => None,
        }
    }

    pub fn shorty_char(self) -> char {
        match self {
            Primitive::Not => 'L',
            Primitive::Boolean => 'Z',
            Primitive::Byte => 'B',
            Primitive::Char => 'C',
            Primitive::Short => 'S',
            Primitive::Int => 'I',
            Primitive::Long => 'J',
            Primitive::Float => 'F',
            Primitive::Double => 'D',
            Primitive::Void => 'V',
        }
    }

    /// Size of one element of this type in an array or field
    pub fn component_size(self) -> usize {
        match self {
            Primitive::Not => HEAP_REFERENCE_SIZE,
            Primitive::Boolean | Primitive::Byte => 1,
            Primitive::Char | Primitive::Short => 2,
            Primitive::Int | Primitive::Float => 4,
            Primitive::Long | Primitive::Double => 8,
            Primitive::Void => 0,
        }
    }

    /// Component size widened to a 32-bit slot. Void stays 0.
    pub fn slot_size(self) -> usize {
        match self.component_size() {
            1..=3 => 4,
            size => size,
        }
    }

    pub fn is_wide(self) -> bool {
        matches!(self, Primitive::Long | Primitive::Double)
    }

    pub fn is_floating_point(self) -> bool {
        matches!(self, Primitive::Float | Primitive::Double)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Primitive::Not => "reference",
            Primitive::Boolean => "boolean",
            Primitive::Byte => "byte",
            Primitive::Char => "char",
            Primitive::Short => "short",
            Primitive::Int => "int",
            Primitive::Long => "long",
            Primitive::Float => "float",
            Primitive::Double => "double",
            Primitive::Void => "void",
        };
        f.write_str(name)
    }
}

/// A validated method shorty. Byte indexing is safe since the alphabet is ASCII.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Shorty(String);

impl Shorty {
    pub fn parse(shorty: &str) -> Result<Shorty> {
        if shorty.is_empty() {
            return Err(Error::EmptyShorty);
        }
        for (position, ch) in shorty.chars().enumerate() {
            match Primitive::from_shorty_char(ch) {
                None => {
                    return Err(Error::InvalidShortyChar {
                        shorty: shorty.to_string(),
                        position,
                        ch,
                    })
                }
                Some(Primitive::Void) if position > 0 => {
                    return Err(Error::VoidParameter {
                        shorty: shorty.to_string(),
                        position,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(Shorty(shorty.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Character at `index`, where 0 is the return type
    pub fn char_at(&self, index: usize) -> char {
        self.0.as_bytes()[index] as char
    }

    pub fn return_type(&self) -> Primitive {
        self.type_at(0)
    }

    /// Type at `index`, where 0 is the return type
    pub fn type_at(&self, index: usize) -> Primitive {
        match Primitive::from_shorty_char(self.char_at(index)) {
            Some(ty) => ty,
            None => unreachable!("shorty {:?} was validated on construction", self.0),
        }
    }

    /// Declared parameter types, without the return type
    pub fn params(&self) -> impl Iterator<Item = Primitive> + '_ {
        (1..self.0.len()).map(move |i| self.type_at(i))
    }

    /// Length including the return type
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Shorty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Shorty {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Shorty::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slot_size_widens_small_types() {
        assert_eq!(Primitive::Boolean.slot_size(), 4);
        assert_eq!(Primitive::Char.slot_size(), 4);
        assert_eq!(Primitive::Not.slot_size(), 4);
        assert_eq!(Primitive::Double.slot_size(), 8);
        assert_eq!(Primitive::Void.slot_size(), 0);
    }

    #[test]
    fn test_parse_rejects_bad_shorties() {
        assert_eq!(Shorty::parse(""), Err(Error::EmptyShorty));
        assert_eq!(
            Shorty::parse("VIQ"),
            Err(Error::InvalidShortyChar {
                shorty: "VIQ".to_string(),
                position: 2,
                ch: 'Q',
            })
        );
        assert_eq!(
            Shorty::parse("IV"),
            Err(Error::VoidParameter {
                shorty: "IV".to_string(),
                position: 1,
            })
        );
    }

    #[test]
    fn test_params_skip_return_type() {
        let shorty = Shorty::parse("JLFD").unwrap();
        assert_eq!(shorty.return_type(), Primitive::Long);
        let params: Vec<_> = shorty.params().collect();
        assert_eq!(params, vec![Primitive::Not, Primitive::Float, Primitive::Double]);
    }
}
