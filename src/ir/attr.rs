use std::fmt;

use crate::ir::types::{DType, IrType};

/// A decoded attribute value.
///
/// Integer and float attributes carry their declared scalar type next to
/// the raw value: integers keep the encoded bit pattern (sign handling
/// is a concern of the consumer), floats are widened to `f64` with f16
/// and f32 payloads converted losslessly.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Bool(bool),
    Integer { ty: IrType, value: u64 },
    Float { ty: IrType, value: f64 },
    Str(String),
    Type(IrType),
    Array(Vec<Attribute>),
    DenseElements {
        dtype: DType,
        dims: Vec<u64>,
        elements: Vec<Attribute>,
    },
}

impl Attribute {
    /// The i32 integer with bit pattern `value`.
    pub fn i32(value: u32) -> Self {
        Attribute::Integer {
            ty: IrType::Scalar(DType::I32),
            value: u64::from(value),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attribute::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<u64> {
        match self {
            Attribute::Integer { value, .. } => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Bool(b) => write!(f, "{}", b),
            Attribute::Integer { ty, value } => match ty {
                // Sign-extend by declared width for display.
                IrType::Scalar(DType::I32) => write!(f, "{} : {}", *value as u32 as i32, ty),
                IrType::Scalar(DType::I64) => write!(f, "{} : {}", *value as i64, ty),
                _ => write!(f, "{} : {}", value, ty),
            },
            Attribute::Float { ty, value } => write!(f, "{} : {}", value, ty),
            Attribute::Str(s) => write!(f, "{:?}", s),
            Attribute::Type(ty) => write!(f, "{}", ty),
            Attribute::Array(elements) => {
                f.write_str("[")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                f.write_str("]")
            }
            Attribute::DenseElements {
                dtype,
                dims,
                elements,
            } => {
                f.write_str("dense<")?;
                for dim in dims {
                    write!(f, "{}x", dim)?;
                }
                write!(f, "{}; {} elements>", dtype, elements.len())
            }
        }
    }
}
