//! Attribute pool decoding, driven by the AttributeTypes descriptors.
//!
//! The writer guarantees that any attribute referenced by an offset
//! array sits at a strictly smaller offset than the array itself, so a
//! single forward pass over the descriptor table resolves every
//! reference out of the growing `offset -> attribute` map.

use rustc_hash::FxHashMap;

use crate::bef::encoding::{
    decode_dtype, read_reverse_length, AttrDescriptor, AttrKind, SectionId,
    PLACEHOLDER_ATTRIBUTE,
};
use crate::bef::reader::BefReader;
use crate::bef::Sink;
use crate::error::DecodeError;
use crate::ir::attr::Attribute;
use crate::ir::types::{DType, IrType};

/// The placeholder substituted for attributes that cannot be resolved.
pub(crate) fn placeholder() -> Attribute {
    Attribute::i32(PLACEHOLDER_ATTRIBUTE)
}

/// Decodes the attribute pool. Returns a partial map when the
/// descriptor table is malformed under the lenient policy; references
/// to anything missing substitute placeholders later.
pub(crate) fn read_attribute_pool(
    pool: &[u8],
    attribute_types: &[u8],
    types: &[IrType],
    sink: &mut Sink,
) -> Result<FxHashMap<usize, Attribute>, DecodeError> {
    let mut attributes = FxHashMap::default();
    if attribute_types.is_empty() {
        return Ok(attributes);
    }

    let mut reader = BefReader::new(attribute_types);
    let degraded = |e: DecodeError| DecodeError::section(SectionId::AttributeTypes, e.to_string());
    let count = match reader.read_varint() {
        Ok(count) => count,
        Err(e) => {
            sink.recoverable(None, degraded(e))?;
            return Ok(attributes);
        }
    };
    for _ in 0..count {
        let (offset, raw) = match (reader.read_varint(), reader.read_varint()) {
            (Ok(offset), Ok(raw)) => (offset as usize, raw),
            (Err(e), _) | (_, Err(e)) => {
                sink.recoverable(None, degraded(e))?;
                return Ok(attributes);
            }
        };
        let Some(descriptor) = AttrDescriptor::unpack(raw) else {
            sink.recoverable(None, DecodeError::UnknownAttribute { offset })?;
            continue;
        };
        match read_attribute(pool, offset, descriptor, types, &attributes, sink) {
            Ok(attr) => {
                attributes.insert(offset, attr);
            }
            Err(e) => {
                // Skip this attribute; a later reference yields a
                // placeholder plus its own warning.
                sink.recoverable(None, DecodeError::section(SectionId::Attributes, e.to_string()))?;
            }
        }
    }
    Ok(attributes)
}

/// Decodes one attribute at `offset` in the pool.
fn read_attribute(
    pool: &[u8],
    offset: usize,
    descriptor: AttrDescriptor,
    types: &[IrType],
    decoded: &FxHashMap<usize, Attribute>,
    sink: &mut Sink,
) -> Result<Attribute, DecodeError> {
    let tail = pool
        .get(offset..)
        .ok_or(DecodeError::Truncated { offset })?;
    let mut reader = BefReader::with_base(tail, offset);
    read_attribute_at(&mut reader, pool, offset, descriptor, types, decoded, sink)
}

fn read_attribute_at(
    reader: &mut BefReader<'_>,
    pool: &[u8],
    offset: usize,
    descriptor: AttrDescriptor,
    types: &[IrType],
    decoded: &FxHashMap<usize, Attribute>,
    sink: &mut Sink,
) -> Result<Attribute, DecodeError> {
    match descriptor.kind {
        AttrKind::Standard => {
            let index = descriptor.payload as usize;
            let ty = types
                .get(index)
                .ok_or(DecodeError::TypeOutOfRange { index })?;
            read_standard(reader, ty)
        }
        AttrKind::Bool => Ok(Attribute::Bool(reader.read_u8()? != 0)),
        AttrKind::String => {
            let length = read_reverse_length(pool, offset)?;
            let bytes = reader.take(length)?;
            Ok(Attribute::Str(String::from_utf8_lossy(bytes).into_owned()))
        }
        AttrKind::Type => {
            let code = reader.read_u8()?;
            let dtype = decode_dtype(code).ok_or_else(|| {
                DecodeError::section(SectionId::Attributes, format!("bad type code {}", code))
            })?;
            Ok(Attribute::Type(IrType::Scalar(dtype)))
        }
        AttrKind::DenseElements => read_dense_elements(reader),
        AttrKind::FlatArray => {
            let length = read_reverse_length(pool, offset)?;
            // Elements are standard attributes of the payload type,
            // packed back to back.
            let element = AttrDescriptor {
                kind: AttrKind::Standard,
                payload: descriptor.payload,
            };
            let mut elements = Vec::with_capacity(length.min(reader.remaining()));
            for _ in 0..length {
                elements.push(read_attribute_at(
                    reader, pool, offset, element, types, decoded, sink,
                )?);
            }
            Ok(Attribute::Array(elements))
        }
        AttrKind::OffsetArray => {
            let length = read_reverse_length(pool, offset)?;
            let mut elements = Vec::with_capacity(length.min(reader.remaining()));
            // Elements were decoded already: the writer places them at
            // strictly smaller offsets than the array itself.
            for _ in 0..length {
                let element_offset = reader.read_u32()? as usize;
                match decoded.get(&element_offset) {
                    Some(attr) => elements.push(attr.clone()),
                    None => {
                        sink.recoverable(
                            None,
                            DecodeError::UnknownAttribute {
                                offset: element_offset,
                            },
                        )?;
                        elements.push(placeholder());
                    }
                }
            }
            Ok(Attribute::Array(elements))
        }
    }
}

/// Reads a fixed-width integer or float of the given scalar type.
fn read_standard(reader: &mut BefReader<'_>, ty: &IrType) -> Result<Attribute, DecodeError> {
    let dtype = match ty {
        IrType::Scalar(dtype) => *dtype,
        other => {
            return Err(DecodeError::section(
                SectionId::Attributes,
                format!("standard attribute of non-scalar type {}", other),
            ))
        }
    };
    let ty = IrType::Scalar(dtype);
    let attr = match dtype {
        DType::I1 => Attribute::Integer {
            ty,
            value: u64::from(reader.read_u8()?),
        },
        DType::I32 => Attribute::Integer {
            ty,
            value: u64::from(reader.read_u32()?),
        },
        DType::I64 => Attribute::Integer {
            ty,
            value: reader.read_u64()?,
        },
        DType::F16 => Attribute::Float {
            ty,
            value: f16_bits_to_f64(reader.read_u16()?),
        },
        DType::F32 => Attribute::Float {
            ty,
            value: f64::from(f32::from_bits(reader.read_u32()?)),
        },
        DType::F64 => Attribute::Float {
            ty,
            value: f64::from_bits(reader.read_u64()?),
        },
    };
    Ok(attr)
}

/// Dense elements: an 8-byte `(dtype:8 | rank:56)` header, an 8-byte
/// element count, `rank` 8-byte dimensions, then the packed elements.
fn read_dense_elements(reader: &mut BefReader<'_>) -> Result<Attribute, DecodeError> {
    let header = reader.read_u64()?;
    let code = (header >> 56) as u8;
    let rank = (header & ((1 << 56) - 1)) as usize;
    let dtype = decode_dtype(code).ok_or_else(|| {
        DecodeError::section(
            SectionId::Attributes,
            format!("bad dense element type code {}", code),
        )
    })?;
    let count = reader.read_u64()? as usize;
    let mut dims = Vec::with_capacity(rank.min(reader.remaining() / 8));
    for _ in 0..rank {
        dims.push(reader.read_u64()?);
    }
    let scalar = IrType::Scalar(dtype);
    let mut elements = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        elements.push(read_standard(reader, &scalar)?);
    }
    Ok(Attribute::DenseElements {
        dtype,
        dims,
        elements,
    })
}

/// Widens an IEEE 754 binary16 bit pattern to f64.
fn f16_bits_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exp = ((bits >> 10) & 0x1F) as i32;
    let frac = f64::from(bits & 0x3FF);
    let magnitude = match exp {
        0 => frac * (-24f64).exp2(),
        0x1F => {
            if frac == 0.0 {
                f64::INFINITY
            } else {
                return f64::NAN;
            }
        }
        _ => (1.0 + frac * (-10f64).exp2()) * f64::from(exp - 15).exp2(),
    };
    sign * magnitude
}
