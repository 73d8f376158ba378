//! Phase one: the non-function tables.
//!
//! `BefFile` owns every pool the later phases resolve handles against:
//! location filenames and positions, the string pool, the parsed type
//! pool, kernel names, decoded attributes, and the function index.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::bef::attrs;
use crate::bef::encoding::{FunctionKind, SectionId, BEF_VERSION_0};
use crate::bef::reader::BefReader;
use crate::bef::Sink;
use crate::error::DecodeError;
use crate::ir::attr::Attribute;
use crate::ir::location::Location;
use crate::ir::types::IrType;

/// One entry of the function index: offset, name, kind, and signature.
#[derive(Debug)]
pub struct BefFunction {
    pub kind: FunctionKind,
    /// Byte offset of the body within the Functions section.
    pub offset: usize,
    pub name: String,
    pub arg_types: SmallVec<[IrType; 4]>,
    pub result_types: SmallVec<[IrType; 4]>,
}

impl BefFunction {
    /// Named functions become top-level entities; unnamed functions are
    /// inlined as nested regions.
    pub fn is_named(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn is_native(&self) -> bool {
        self.kind == FunctionKind::Native
    }
}

/// The decoded tables of a BEF file.
#[derive(Debug)]
pub struct BefFile<'a> {
    pub origin: Location,
    /// Whether the AttributeTypes section was present; governs whether a
    /// missed attribute lookup warns per reference or was already
    /// covered by the missing-table warning.
    pub have_attribute_types: bool,
    location_filenames: Vec<&'a [u8]>,
    location_positions: FxHashMap<usize, Location>,
    strings: FxHashMap<usize, &'a [u8]>,
    types: Vec<IrType>,
    kernels: Vec<String>,
    attributes: FxHashMap<usize, Attribute>,
    functions: Vec<BefFunction>,
}

impl<'a> BefFile<'a> {
    pub fn new(origin: Location) -> Self {
        Self {
            origin,
            have_attribute_types: false,
            location_filenames: Vec::new(),
            location_positions: FxHashMap::default(),
            strings: FxHashMap::default(),
            types: Vec::new(),
            kernels: Vec::new(),
            attributes: FxHashMap::default(),
            functions: Vec::new(),
        }
    }

    // -- handle resolution ---------------------------------------------------

    /// The location at `offset` into the LocationPositions section.
    pub fn location(&self, offset: usize) -> Option<&Location> {
        self.location_positions.get(&offset)
    }

    /// The string at `offset` into the Strings section.
    pub fn string(&self, offset: usize) -> Option<&'a [u8]> {
        self.strings.get(&offset).copied()
    }

    /// The type at `index` into the Types section.
    pub fn ir_type(&self, index: usize) -> Option<&IrType> {
        self.types.get(index)
    }

    /// The kernel name at `index` into the Kernels section.
    pub fn kernel_name(&self, index: usize) -> Option<&str> {
        self.kernels.get(index).map(String::as_str)
    }

    /// The attribute at `offset` into the Attributes section.
    pub fn attribute(&self, offset: usize) -> Option<&Attribute> {
        self.attributes.get(&offset)
    }

    pub fn function(&self, index: usize) -> Option<&BefFunction> {
        self.functions.get(index)
    }

    pub fn functions(&self) -> &[BefFunction] {
        &self.functions
    }

    // -- table loaders -------------------------------------------------------

    /// FormatVersion: exactly one byte holding the supported version.
    pub fn read_format_version(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
        if payload.len() != 1 {
            return Err(DecodeError::section(
                SectionId::FormatVersion,
                format!("expected exactly one byte, found {}", payload.len()),
            ));
        }
        if payload[0] != BEF_VERSION_0 {
            return Err(DecodeError::UnsupportedVersion { found: payload[0] });
        }
        Ok(())
    }

    pub fn read_location_filenames(&mut self, payload: &'a [u8]) -> Result<(), DecodeError> {
        read_null_terminated(payload, SectionId::LocationFilenames, |_, bytes| {
            self.location_filenames.push(bytes);
        })
    }

    /// LocationPositions: `(filename_index, line, column)` varint records.
    /// The handle stored elsewhere is each record's byte offset within
    /// this payload.
    pub fn read_location_positions(&mut self, payload: &'a [u8]) -> Result<(), DecodeError> {
        let mut reader = BefReader::new(payload);
        while !reader.is_empty() {
            let offset = reader.offset();
            let filename_index = reader.read_varint()? as usize;
            let line = reader.read_varint()?;
            let col = reader.read_varint()?;
            let filename = self.location_filenames.get(filename_index).ok_or_else(|| {
                DecodeError::section(
                    SectionId::LocationPositions,
                    format!("filename index {} out of range", filename_index),
                )
            })?;
            self.location_positions.insert(
                offset,
                Location::FileLineCol {
                    filename: String::from_utf8_lossy(filename).into_owned(),
                    line,
                    col,
                },
            );
        }
        Ok(())
    }

    pub fn read_strings(&mut self, payload: &'a [u8]) -> Result<(), DecodeError> {
        read_null_terminated(payload, SectionId::Strings, |offset, bytes| {
            self.strings.insert(offset, bytes);
        })
    }

    /// Types: string handles parsed into IR types. Unparseable entries
    /// degrade to the none type under the lenient policy.
    pub fn read_types(&mut self, payload: &[u8], sink: &mut Sink) -> Result<(), DecodeError> {
        if payload.is_empty() {
            return Ok(());
        }
        let mut reader = BefReader::new(payload);
        let offsets = reader
            .read_int_array()
            .map_err(|e| DecodeError::section(SectionId::Types, e.to_string()))?;
        for offset in offsets {
            let bytes = self
                .string(offset as usize)
                .ok_or(DecodeError::StringOutOfRange {
                    offset: offset as usize,
                })?;
            let text = String::from_utf8_lossy(bytes);
            match IrType::parse(&text) {
                Some(ty) => self.types.push(ty),
                None => {
                    sink.recoverable(
                        None,
                        DecodeError::UnknownType {
                            text: text.into_owned(),
                        },
                    )?;
                    self.types.push(IrType::None);
                }
            }
        }
        Ok(())
    }

    pub fn read_kernels(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
        if payload.is_empty() {
            return Ok(());
        }
        let mut reader = BefReader::new(payload);
        let offsets = reader
            .read_int_array()
            .map_err(|e| DecodeError::section(SectionId::Kernels, e.to_string()))?;
        for offset in offsets {
            let bytes = self
                .string(offset as usize)
                .ok_or(DecodeError::StringOutOfRange {
                    offset: offset as usize,
                })?;
            self.kernels
                .push(String::from_utf8_lossy(bytes).into_owned());
        }
        Ok(())
    }

    /// Attributes, driven by the AttributeTypes descriptors. With the
    /// descriptors missing the pool stays empty and every reference
    /// later substitutes a placeholder.
    pub fn read_attributes(
        &mut self,
        pool: &'a [u8],
        attribute_types: &[u8],
        sink: &mut Sink,
    ) -> Result<(), DecodeError> {
        self.attributes = attrs::read_attribute_pool(pool, attribute_types, &self.types, sink)?;
        Ok(())
    }

    pub fn read_function_index(&mut self, payload: &[u8]) -> Result<(), DecodeError> {
        if payload.is_empty() {
            return Ok(());
        }
        let mut reader = BefReader::new(payload);
        let bad = |detail: String| DecodeError::section(SectionId::FunctionIndex, detail);
        let count = reader.read_varint().map_err(|e| bad(e.to_string()))?;
        for _ in 0..count {
            let kind_byte = reader.read_u8().map_err(|e| bad(e.to_string()))?;
            let kind = FunctionKind::from_u8(kind_byte)
                .ok_or_else(|| bad(format!("bad function kind {}", kind_byte)))?;
            let offset = reader.read_varint().map_err(|e| bad(e.to_string()))? as usize;
            let name_offset = reader.read_varint().map_err(|e| bad(e.to_string()))? as usize;
            let name = self
                .string(name_offset)
                .ok_or(DecodeError::StringOutOfRange {
                    offset: name_offset,
                })?;
            let mut function = BefFunction {
                kind,
                offset,
                name: String::from_utf8_lossy(name).into_owned(),
                arg_types: SmallVec::new(),
                result_types: SmallVec::new(),
            };
            function.arg_types = self.read_signature_types(&mut reader)?;
            function.result_types = self.read_signature_types(&mut reader)?;
            self.functions.push(function);
        }
        Ok(())
    }

    fn read_signature_types(
        &self,
        reader: &mut BefReader<'_>,
    ) -> Result<SmallVec<[IrType; 4]>, DecodeError> {
        let indices = reader
            .read_int_array()
            .map_err(|e| DecodeError::section(SectionId::FunctionIndex, e.to_string()))?;
        let mut types = SmallVec::with_capacity(indices.len());
        for index in indices {
            let ty = self
                .ir_type(index as usize)
                .ok_or(DecodeError::TypeOutOfRange {
                    index: index as usize,
                })?;
            types.push(ty.clone());
        }
        Ok(types)
    }
}

/// Walks a pool of NUL-terminated strings, calling `action` with each
/// string's byte offset and contents.
fn read_null_terminated<'a>(
    payload: &'a [u8],
    section: SectionId,
    mut action: impl FnMut(usize, &'a [u8]),
) -> Result<(), DecodeError> {
    let mut pos = 0;
    while pos < payload.len() {
        let len = payload[pos..]
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| DecodeError::section(section, "unterminated string".to_owned()))?;
        action(pos, &payload[pos..pos + len]);
        pos += len + 1;
    }
    Ok(())
}
