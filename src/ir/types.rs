use std::fmt;

/// Scalar element types understood by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    I1,
    I32,
    I64,
    F16,
    F32,
    F64,
}

impl DType {
    /// Width of one encoded element in bytes.
    pub fn byte_width(self) -> usize {
        match self {
            DType::I1 => 1,
            DType::F16 => 2,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F16 | DType::F32 | DType::F64)
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::I1 => "i1",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::F16 => "f16",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }

    fn parse(text: &str) -> Option<DType> {
        match text {
            "i1" => Some(DType::I1),
            "i32" => Some(DType::I32),
            "i64" => Some(DType::I64),
            "f16" => Some(DType::F16),
            "f32" => Some(DType::F32),
            "f64" => Some(DType::F64),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One dimension of a ranked tensor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Fixed(u64),
    /// Printed as `?`.
    Dynamic,
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(n) => write!(f, "{}", n),
            Dim::Dynamic => f.write_str("?"),
        }
    }
}

/// A decoded IR type.
///
/// Type-pool entries are stored as strings in the file; anything that is
/// not a builtin scalar, `none`, or a ranked tensor is kept verbatim as
/// `Opaque` (dialect types such as `!hex.chain` are routine in real
/// modules and round-trip through the decoder untouched).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    /// The placeholder type of registers with no type information.
    None,
    Scalar(DType),
    Tensor { dtype: DType, dims: Vec<Dim> },
    Opaque(String),
}

impl IrType {
    /// Parses a type-pool string. Returns `None` only for the empty
    /// string; unrecognized non-empty strings parse as `Opaque`.
    pub fn parse(text: &str) -> Option<IrType> {
        if text.is_empty() {
            return None;
        }
        if text == "none" {
            return Some(IrType::None);
        }
        if let Some(dtype) = DType::parse(text) {
            return Some(IrType::Scalar(dtype));
        }
        if let Some(tensor) = parse_tensor(text) {
            return Some(tensor);
        }
        Some(IrType::Opaque(text.to_owned()))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, IrType::None)
    }
}

/// Parses `tensor<2x?xf32>` style strings. Any deviation from the ranked
/// tensor grammar makes the caller fall back to an opaque type.
fn parse_tensor(text: &str) -> Option<IrType> {
    let inner = text.strip_prefix("tensor<")?.strip_suffix('>')?;
    let mut parts: Vec<&str> = inner.split('x').collect();
    let dtype = DType::parse(parts.pop()?)?;
    let mut dims = Vec::with_capacity(parts.len());
    for part in parts {
        if part == "?" {
            dims.push(Dim::Dynamic);
        } else {
            dims.push(Dim::Fixed(part.parse().ok()?));
        }
    }
    Some(IrType::Tensor { dtype, dims })
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::None => f.write_str("none"),
            IrType::Scalar(dtype) => write!(f, "{}", dtype),
            IrType::Tensor { dtype, dims } => {
                f.write_str("tensor<")?;
                for dim in dims {
                    write!(f, "{}x", dim)?;
                }
                write!(f, "{}>", dtype)
            }
            IrType::Opaque(text) => f.write_str(text),
        }
    }
}
