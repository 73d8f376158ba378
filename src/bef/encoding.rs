//! BEF wire-format constants: magic bytes, section identifiers, attribute
//! descriptors, scalar type codes, and the reverse variable-byte length
//! prefix used by length-prefixed attributes.

use std::fmt;

use crate::error::DecodeError;
use crate::ir::types::DType;

/// First magic byte of a BEF file.
pub const BEF_MAGIC_1: u8 = 0xBE;
/// Second magic byte of a BEF file.
pub const BEF_MAGIC_2: u8 = 0xF0;

/// The only format version this decoder accepts.
pub const BEF_VERSION_0: u8 = 0;

/// Kernel entries are arrays of 4-byte words; kernel-table offsets are
/// byte offsets into that array and must be multiples of this.
pub const KERNEL_ENTRY_ALIGNMENT: usize = 4;

/// Name of the terminator kernel. A trailing kernel with this name is
/// folded into the block terminator; when absent, the decoder
/// synthesizes one from the function's result registers.
pub const RETURN_KERNEL: &str = "hex.return";

/// Bit pattern substituted for attributes that cannot be resolved.
pub const PLACEHOLDER_ATTRIBUTE: u32 = 0xDEAD_BEEF;

/// Special-attribute byte values in the AttributeNames stream.
pub const SPECIAL_ATTRIBUTE_NONE: u8 = 0;
pub const SPECIAL_ATTRIBUTE_NON_STRICT: u8 = 1;

// ---------------------------------------------------------------------------
// Section identifiers
// ---------------------------------------------------------------------------

/// The closed set of known section identifiers. Unknown identifiers are
/// retained as raw bytes and warned about, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SectionId {
    FormatVersion = 0,
    LocationFilenames = 1,
    LocationPositions = 2,
    Strings = 3,
    Attributes = 4,
    Kernels = 5,
    Types = 6,
    FunctionIndex = 7,
    Functions = 8,
    AttributeTypes = 9,
    AttributeNames = 10,
    RegisterTypes = 11,
}

impl SectionId {
    pub const COUNT: usize = 12;

    pub fn from_u8(id: u8) -> Option<SectionId> {
        match id {
            0 => Some(SectionId::FormatVersion),
            1 => Some(SectionId::LocationFilenames),
            2 => Some(SectionId::LocationPositions),
            3 => Some(SectionId::Strings),
            4 => Some(SectionId::Attributes),
            5 => Some(SectionId::Kernels),
            6 => Some(SectionId::Types),
            7 => Some(SectionId::FunctionIndex),
            8 => Some(SectionId::Functions),
            9 => Some(SectionId::AttributeTypes),
            10 => Some(SectionId::AttributeNames),
            11 => Some(SectionId::RegisterTypes),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SectionId::FormatVersion => "FormatVersion",
            SectionId::LocationFilenames => "LocationFilenames",
            SectionId::LocationPositions => "LocationPositions",
            SectionId::Strings => "Strings",
            SectionId::Attributes => "Attributes",
            SectionId::Kernels => "Kernels",
            SectionId::Types => "Types",
            SectionId::FunctionIndex => "FunctionIndex",
            SectionId::Functions => "Functions",
            SectionId::AttributeTypes => "AttributeTypes",
            SectionId::AttributeNames => "AttributeNames",
            SectionId::RegisterTypes => "RegisterTypes",
        }
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Attribute descriptors
// ---------------------------------------------------------------------------

/// Attribute kinds carried in the low bits of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Standard = 0,
    Bool = 1,
    String = 2,
    Type = 3,
    DenseElements = 4,
    FlatArray = 5,
    OffsetArray = 6,
}

const ATTR_KIND_MASK: u64 = 0x7;
const ATTR_KIND_SHIFT: u32 = 3;

/// An unpacked `(kind, payload)` attribute type descriptor. The payload
/// is a type-pool handle for `Standard` and `FlatArray` and unused for
/// the other kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrDescriptor {
    pub kind: AttrKind,
    pub payload: u64,
}

impl AttrDescriptor {
    pub fn unpack(raw: u64) -> Option<AttrDescriptor> {
        let kind = match raw & ATTR_KIND_MASK {
            0 => AttrKind::Standard,
            1 => AttrKind::Bool,
            2 => AttrKind::String,
            3 => AttrKind::Type,
            4 => AttrKind::DenseElements,
            5 => AttrKind::FlatArray,
            6 => AttrKind::OffsetArray,
            _ => return None,
        };
        Some(AttrDescriptor {
            kind,
            payload: raw >> ATTR_KIND_SHIFT,
        })
    }
}

// ---------------------------------------------------------------------------
// Scalar type codes
// ---------------------------------------------------------------------------

/// Decodes the one-byte scalar type code used by Type attributes and the
/// dense-elements header dtype.
pub fn decode_dtype(code: u8) -> Option<DType> {
    match code {
        0 => Some(DType::I1),
        1 => Some(DType::I32),
        2 => Some(DType::I64),
        3 => Some(DType::F16),
        4 => Some(DType::F32),
        5 => Some(DType::F64),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Function kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Bef = 0,
    /// External declaration with no body in the Functions section.
    Native = 1,
}

impl FunctionKind {
    pub fn from_u8(kind: u8) -> Option<FunctionKind> {
        match kind {
            0 => Some(FunctionKind::Bef),
            1 => Some(FunctionKind::Native),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Reverse variable-byte length prefix
// ---------------------------------------------------------------------------

/// Reads the length prefix of a length-prefixed attribute.
///
/// The prefix occupies the bytes immediately before `offset`, read with
/// the cursor decreasing: the byte at `offset - 1` holds the most
/// significant 7-bit group and has its high bit set whenever another
/// byte follows further back; the terminating byte has the high bit
/// clear and holds the least significant group. Fixed-offset consumers
/// can therefore find the length without a pre-scan of the pool.
pub fn read_reverse_length(pool: &[u8], offset: usize) -> Result<usize, DecodeError> {
    if offset == 0 || offset > pool.len() {
        return Err(DecodeError::Truncated { offset });
    }
    let mut pos = offset - 1;
    let mut value: u64 = 0;
    let mut groups = 0u32;
    while pool[pos] & 0x80 != 0 {
        value = (value << 7) | u64::from(pool[pos] & 0x7F);
        groups += 1;
        if groups > 9 {
            return Err(DecodeError::VarintOverflow { offset });
        }
        if pos == 0 {
            return Err(DecodeError::Truncated { offset: 0 });
        }
        pos -= 1;
    }
    value = (value << 7) | u64::from(pool[pos] & 0x7F);
    Ok(value as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_byte_length() {
        // "abc" preceded by its length byte, as in a string attribute.
        let pool = [0x03, b'a', b'b', b'c'];
        assert_eq!(read_reverse_length(&pool, 1).unwrap(), 3);
    }

    #[test]
    fn multi_byte_length() {
        // 300 = (2 << 7) | 44: least significant group first in memory,
        // most significant group (with the continuation bit) at offset-1.
        let pool = [0x2C, 0x82, 0xAA];
        assert_eq!(read_reverse_length(&pool, 2).unwrap(), 300);

        // Three groups: 100_000 = (6 << 14) | (13 << 7) | 32.
        let pool = [0x20, 0x8D, 0x86, 0xAA];
        assert_eq!(read_reverse_length(&pool, 3).unwrap(), 100_000);
    }

    #[test]
    fn length_running_off_the_front_is_truncated() {
        assert!(matches!(
            read_reverse_length(&[0x83], 1),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(matches!(
            read_reverse_length(&[0x01], 0),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn descriptor_roundtrip() {
        let desc = AttrDescriptor::unpack((7 << 3) | 0).unwrap();
        assert_eq!(desc.kind, AttrKind::Standard);
        assert_eq!(desc.payload, 7);
        let desc = AttrDescriptor::unpack(6).unwrap();
        assert_eq!(desc.kind, AttrKind::OffsetArray);
        assert!(AttrDescriptor::unpack(7).is_none());
    }
}
