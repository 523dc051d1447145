//! Data types carried by identifiers.

use std::fmt;

/// The interpretation of a primitive value's bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Domain {
    /// Bits of unknown interpretation.
    Word,
    /// Signed integer.
    SignedInt,
    /// Unsigned integer.
    UnsignedInt,
    /// Floating point.
    Real,
    /// Boolean.
    Boolean,
}

/// A primitive type: a domain plus a bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrimitiveType {
    pub domain: Domain,
    pub bit_size: u32,
}

impl PrimitiveType {
    /// Creates a primitive type.
    pub fn create(domain: Domain, bit_size: u32) -> Self {
        Self { domain, bit_size }
    }

    /// A word of unknown interpretation.
    pub fn word(bit_size: u32) -> Self {
        Self::create(Domain::Word, bit_size)
    }

    /// Returns the C-like name of this type, e.g. `word32` or `int16`.
    pub fn name(&self) -> String {
        match (self.domain, self.bit_size) {
            (Domain::Word, 8) => "byte".to_string(),
            (Domain::Word, n) => format!("word{n}"),
            (Domain::SignedInt, n) => format!("int{n}"),
            (Domain::UnsignedInt, n) => format!("uint{n}"),
            (Domain::Real, n) => format!("real{n}"),
            (Domain::Boolean, _) => "bool".to_string(),
        }
    }
}

/// The type of an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    /// A primitive value.
    Primitive(PrimitiveType),
    /// A pointer to another type.
    Pointer {
        pointee: Box<DataType>,
        bit_size: u32,
    },
}

impl DataType {
    /// A word of unknown interpretation.
    pub fn word(bit_size: u32) -> Self {
        DataType::Primitive(PrimitiveType::word(bit_size))
    }

    /// A floating point value.
    pub fn real(bit_size: u32) -> Self {
        DataType::Primitive(PrimitiveType::create(Domain::Real, bit_size))
    }

    /// A boolean.
    pub fn bool() -> Self {
        DataType::Primitive(PrimitiveType::create(Domain::Boolean, 8))
    }

    /// A pointer to `pointee`.
    pub fn pointer_to(pointee: DataType, bit_size: u32) -> Self {
        DataType::Pointer {
            pointee: Box::new(pointee),
            bit_size,
        }
    }

    /// Size in bits.
    pub fn bit_size(&self) -> u32 {
        match self {
            DataType::Primitive(p) => p.bit_size,
            DataType::Pointer { bit_size, .. } => *bit_size,
        }
    }

    /// Size in bytes.
    pub fn byte_size(&self) -> u32 {
        self.bit_size().div_ceil(8)
    }

    /// Returns the primitive type, if this is one.
    pub fn as_primitive(&self) -> Option<&PrimitiveType> {
        match self {
            DataType::Primitive(p) => Some(p),
            DataType::Pointer { .. } => None,
        }
    }

    /// Short prefix used when naming stack variables of this type
    /// (`dw` for 32-bit words, `r` for reals, ...).
    pub fn name_prefix(&self) -> &'static str {
        match self {
            DataType::Pointer { .. } => "ptr",
            DataType::Primitive(p) if p.domain == Domain::Real => "r",
            DataType::Primitive(p) => match p.bit_size {
                8 => "b",
                16 => "w",
                32 => "dw",
                64 => "qw",
                _ => "n",
            },
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Primitive(p) => f.write_str(&p.name()),
            DataType::Pointer { pointee, .. } => write!(f, "({pointee} *)"),
        }
    }
}
