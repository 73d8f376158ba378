//! Phase two: function bodies.
//!
//! Each function decodes independently into an unrooted region. The
//! layout of a body is: location offset, register-uses array, kernel
//! table, result registers, padding to 4 bytes, then the kernel entry
//! stream viewed as an array of little-endian 32-bit words. Nested
//! region references are not resolved here; they are recorded for the
//! stitcher.

use smallvec::SmallVec;

use crate::bef::encoding::{
    SectionId, KERNEL_ENTRY_ALIGNMENT, RETURN_KERNEL, SPECIAL_ATTRIBUTE_NON_STRICT,
};
use crate::bef::file::{BefFile, BefFunction};
use crate::bef::reader::BefReader;
use crate::bef::stitch::DeferredOp;
use crate::bef::{attrs, Sink};
use crate::error::DecodeError;
use crate::ir::location::Location;
use crate::ir::op::IrOp;
use crate::ir::region::IrRegion;
use crate::ir::types::IrType;
use crate::ir::value::ValueId;

// ---------------------------------------------------------------------------
// Shared side streams
// ---------------------------------------------------------------------------

/// Cursor over the AttributeNames section, shared by all functions in
/// index order. Degrades to synthesized `attrN` names when the section
/// is missing or runs dry.
pub(crate) struct AttributeNames<'a> {
    reader: Option<BefReader<'a>>,
}

impl<'a> AttributeNames<'a> {
    pub(crate) fn new(payload: &'a [u8]) -> Self {
        if payload.is_empty() {
            return Self { reader: None };
        }
        let mut reader = BefReader::new(payload);
        // Table count; the per-function kernel counts do the real framing.
        match reader.read_varint() {
            Ok(_) => Self {
                reader: Some(reader),
            },
            Err(_) => Self { reader: None },
        }
    }

    fn read_kernel_count(&mut self) -> Option<u64> {
        self.reader.as_mut()?.read_varint().ok()
    }

    /// The special-attribute byte preceding each kernel's names.
    fn read_special(&mut self) -> u8 {
        match self.reader.as_mut() {
            Some(reader) => reader.read_u8().unwrap_or(0),
            None => 0,
        }
    }

    fn read_name_offset(&mut self) -> Option<u64> {
        self.reader.as_mut()?.read_varint().ok()
    }
}

/// Cursor over the RegisterTypes section: one type-handle array per
/// BEF-kind function, in index order.
pub(crate) struct RegisterTypeTables<'a> {
    reader: Option<BefReader<'a>>,
    present: bool,
}

impl<'a> RegisterTypeTables<'a> {
    pub(crate) fn new(payload: &'a [u8]) -> Self {
        if payload.is_empty() {
            return Self {
                reader: None,
                present: false,
            };
        }
        let mut reader = BefReader::new(payload);
        match reader.read_varint() {
            Ok(_) => Self {
                reader: Some(reader),
                present: true,
            },
            Err(_) => Self {
                reader: None,
                present: true,
            },
        }
    }

    fn next_table(&mut self) -> Option<Vec<u64>> {
        self.reader.as_mut()?.read_int_array().ok()
    }
}

// ---------------------------------------------------------------------------
// Kernel stream
// ---------------------------------------------------------------------------

/// The kernel entry stream of one function, addressed in 4-byte words.
struct KernelStream<'a> {
    bytes: &'a [u8],
}

impl KernelStream<'_> {
    fn word(&self, index: usize) -> Result<u32, DecodeError> {
        let bytes = index
            .checked_mul(4)
            .and_then(|at| self.bytes.get(at..at.checked_add(4)?))
            .ok_or_else(|| {
                DecodeError::section(
                    SectionId::Functions,
                    "kernel entry out of bounds".to_owned(),
                )
            })?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

/// The fixed six-word header of a kernel entry, followed in the stream
/// by `num_results` used-by counts and then the flat entry words.
struct KernelHeader {
    name: u32,
    location: u32,
    num_arguments: u32,
    num_attributes: u32,
    num_functions: u32,
    num_results: u32,
    /// Word index of the first flat entry.
    entries_base: usize,
    /// Word index of the used-by counts.
    counts_base: usize,
}

impl KernelHeader {
    fn read(stream: &KernelStream<'_>, base: usize) -> Result<KernelHeader, DecodeError> {
        let num_results = stream.word(base + 5)?;
        Ok(KernelHeader {
            name: stream.word(base)?,
            location: stream.word(base + 1)?,
            num_arguments: stream.word(base + 2)?,
            num_attributes: stream.word(base + 3)?,
            num_functions: stream.word(base + 4)?,
            num_results,
            counts_base: base + 6,
            entries_base: base + 6 + num_results as usize,
        })
    }

    fn used_by_count(&self, stream: &KernelStream<'_>, result: usize) -> Result<u32, DecodeError> {
        stream.word(self.counts_base + result)
    }

    fn entry(&self, stream: &KernelStream<'_>, entry_offset: usize) -> Result<u32, DecodeError> {
        stream.word(self.entries_base + entry_offset)
    }
}

// ---------------------------------------------------------------------------
// Registers
// ---------------------------------------------------------------------------

/// Per-register decode state: `Declared -> Defined -> Used*`.
/// `value` is write-once; the setter rejects redefinition.
struct RegisterInfo {
    ty: IrType,
    declared_uses: u64,
    observed_uses: u64,
    used_by: SmallVec<[u32; 4]>,
    value: Option<ValueId>,
}

// ---------------------------------------------------------------------------
// Function reader
// ---------------------------------------------------------------------------

pub(crate) struct FunctionReader<'a, 'f> {
    reader: BefReader<'a>,
    file: &'f BefFile<'a>,
    func: &'f BefFunction,
    registers: Vec<RegisterInfo>,
    kernel_table: Vec<usize>,
    result_regs: SmallVec<[usize; 2]>,
    location: Location,
}

impl<'a, 'f> FunctionReader<'a, 'f> {
    pub(crate) fn new(payload: &'a [u8], file: &'f BefFile<'a>, func: &'f BefFunction) -> Self {
        Self {
            reader: BefReader::new(payload),
            file,
            func,
            registers: Vec::new(),
            kernel_table: Vec::new(),
            result_regs: SmallVec::new(),
            location: Location::Unknown,
        }
    }

    /// Decodes the function body into an unrooted region, plus the
    /// nested-region references for the stitcher.
    pub(crate) fn read(
        mut self,
        names: &mut AttributeNames<'a>,
        register_types: &mut RegisterTypeTables<'a>,
        sink: &mut Sink,
    ) -> Result<(IrRegion, Vec<DeferredOp>), DecodeError> {
        let location_offset = self.reader.read_varint()? as usize;
        self.location = self
            .file
            .location(location_offset)
            .ok_or_else(|| {
                DecodeError::section(
                    SectionId::Functions,
                    format!("unresolved function location offset {}", location_offset),
                )
            })?
            .clone();

        self.read_register_table(register_types, sink)?;
        self.read_kernel_table()?;
        self.read_result_regs(sink)?;

        // Kernel entries are 4-byte aligned within the function record.
        self.reader.align_to(KERNEL_ENTRY_ALIGNMENT)?;
        let stream = KernelStream {
            bytes: self.reader.take_rest(),
        };

        let mut region = IrRegion::new(self.location.clone());
        let mut deferred = Vec::new();

        if let Some(count) = names.read_kernel_count() {
            if count as usize != self.kernel_table.len() {
                sink.note(format!(
                    "attribute-name table lists {} kernels, kernel table has {}",
                    count,
                    self.kernel_table.len()
                ));
            }
        }

        let mut kernel_start = 0;
        if !self.func.arg_types.is_empty() {
            self.read_arguments_pseudo_kernel(&stream, &mut region, sink)?;
            // The pseudo kernel carries no attributes; its special byte
            // is consumed and ignored.
            names.read_special();
            kernel_start = 1;
        }

        for i in kernel_start..self.kernel_table.len() {
            let offset = self.kernel_table[i];
            self.read_kernel(&stream, offset, names, &mut region, &mut deferred, sink)?;
        }

        self.append_return(&mut region, sink)?;
        self.check_use_counts(sink);

        Ok((region, deferred))
    }

    /// Zips the register-uses array with this function's RegisterTypes
    /// sub-array. Registers default to the none type when no type
    /// information exists.
    fn read_register_table(
        &mut self,
        register_types: &mut RegisterTypeTables<'a>,
        sink: &mut Sink,
    ) -> Result<(), DecodeError> {
        let type_indices = match register_types.next_table() {
            Some(indices) => indices,
            None => {
                if register_types.present {
                    sink.recoverable(
                        Some(&self.location),
                        DecodeError::section(
                            SectionId::RegisterTypes,
                            "malformed register type table".to_owned(),
                        ),
                    )?;
                }
                Vec::new()
            }
        };
        let uses = self.reader.read_int_array()?;
        if !type_indices.is_empty() && type_indices.len() != uses.len() {
            sink.recoverable(
                Some(&self.location),
                DecodeError::section(
                    SectionId::RegisterTypes,
                    format!(
                        "{} register types for {} registers",
                        type_indices.len(),
                        uses.len()
                    ),
                ),
            )?;
        }
        for (i, declared_uses) in uses.iter().enumerate() {
            let ty = match type_indices.get(i) {
                Some(&index) => match self.file.ir_type(index as usize) {
                    Some(ty) => ty.clone(),
                    None => {
                        sink.recoverable(
                            Some(&self.location),
                            DecodeError::TypeOutOfRange {
                                index: index as usize,
                            },
                        )?;
                        IrType::None
                    }
                },
                None => IrType::None,
            };
            self.registers.push(RegisterInfo {
                ty,
                declared_uses: *declared_uses,
                observed_uses: 0,
                used_by: SmallVec::new(),
                value: None,
            });
        }
        Ok(())
    }

    fn read_kernel_table(&mut self) -> Result<(), DecodeError> {
        let count = self.reader.read_varint()?;
        for _ in 0..count {
            let offset = self.reader.read_varint()? as usize;
            // The operand count is executor bookkeeping; the kernel
            // header carries the counts the decoder needs.
            let _num_operands = self.reader.read_varint()?;
            self.kernel_table.push(offset);
        }
        Ok(())
    }

    fn read_result_regs(&mut self, sink: &mut Sink) -> Result<(), DecodeError> {
        for _ in 0..self.func.result_types.len() {
            let index = self.reader.read_varint()? as usize;
            if index >= self.registers.len() {
                return Err(sink.fatal(
                    Some(&self.location),
                    DecodeError::UndefinedRegister { index },
                ));
            }
            self.result_regs.push(index);
        }
        Ok(())
    }

    /// The synthetic first kernel that defines the block-argument
    /// registers. It has no arguments, attributes, or nested functions;
    /// its result slots are the function's arguments.
    fn read_arguments_pseudo_kernel(
        &mut self,
        stream: &KernelStream<'a>,
        region: &mut IrRegion,
        sink: &mut Sink,
    ) -> Result<(), DecodeError> {
        let offset = *self.kernel_table.first().ok_or_else(|| {
            DecodeError::section(
                SectionId::Functions,
                "missing arguments pseudo-kernel".to_owned(),
            )
        })?;
        let header = self.kernel_at(stream, offset)?;
        if header.num_arguments != 0
            || header.num_attributes != 0
            || header.num_functions != 0
            || header.num_results as usize != self.func.arg_types.len()
        {
            return Err(DecodeError::section(
                SectionId::Functions,
                "malformed arguments pseudo-kernel".to_owned(),
            ));
        }

        let num_results = header.num_results as usize;
        let mut result_regs: SmallVec<[usize; 4]> = SmallVec::with_capacity(num_results);
        let func = self.func;
        for (i, arg_ty) in func.arg_types.iter().enumerate() {
            let register_index = header.entry(stream, i)? as usize;
            let value = region.new_value(arg_ty.clone());
            region.block.args.push(value);
            self.add_definition(register_index, value, arg_ty, sink)?;
            result_regs.push(register_index);
        }

        let mut entry_offset = num_results;
        for (i, register_index) in result_regs.iter().enumerate() {
            let count = header.used_by_count(stream, i)? as usize;
            let mut used_by = SmallVec::with_capacity(count);
            for k in 0..count {
                used_by.push(header.entry(stream, entry_offset + k)?);
            }
            self.registers[*register_index].used_by = used_by;
            entry_offset += count;
        }
        Ok(())
    }

    /// Decodes one ordinary kernel into an operation appended to the
    /// block. The entry cursor advances through arguments, attributes,
    /// function references, results, then the per-result used-by lists;
    /// this cursor arithmetic is the only framing the format provides.
    #[allow(clippy::too_many_arguments)]
    fn read_kernel(
        &mut self,
        stream: &KernelStream<'a>,
        offset: usize,
        names: &mut AttributeNames<'a>,
        region: &mut IrRegion,
        deferred: &mut Vec<DeferredOp>,
        sink: &mut Sink,
    ) -> Result<(), DecodeError> {
        let header = self.kernel_at(stream, offset)?;
        let name = self
            .file
            .kernel_name(header.name as usize)
            .ok_or(DecodeError::StringOutOfRange {
                offset: header.name as usize,
            })?
            .to_owned();
        let location = self
            .file
            .location(header.location as usize)
            .ok_or_else(|| {
                DecodeError::section(
                    SectionId::Functions,
                    format!("unresolved kernel location offset {}", header.location),
                )
            })?
            .clone();
        let mut op = IrOp::new(name, location);

        // Operands: registers already defined earlier in decode order.
        let mut entry_offset = 0;
        for i in 0..header.num_arguments as usize {
            let register_index = header.entry(stream, entry_offset + i)? as usize;
            let value = self.use_register(register_index).map_err(|e| {
                sink.fatal(Some(&op.location), e)
            })?;
            op.operands.push(value);
        }
        entry_offset += header.num_arguments as usize;

        if names.read_special() == SPECIAL_ATTRIBUTE_NON_STRICT {
            op.non_strict = true;
        }

        // Attributes, paired with names from the AttributeNames stream.
        for i in 0..header.num_attributes as usize {
            let attribute_offset = header.entry(stream, entry_offset + i)? as usize;
            let name = names
                .read_name_offset()
                .and_then(|offset| self.file.string(offset as usize))
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .unwrap_or_else(|| format!("attr{}", i));
            let attr = match self.file.attribute(attribute_offset) {
                Some(attr) => attr.clone(),
                None => {
                    if self.file.have_attribute_types {
                        sink.recoverable(
                            Some(&op.location),
                            DecodeError::UnknownAttribute {
                                offset: attribute_offset,
                            },
                        )?;
                    }
                    attrs::placeholder()
                }
            };
            op.attributes.push((name, attr));
        }
        entry_offset += header.num_attributes as usize;

        // Function references: named callees become symbol references,
        // unnamed ones become nested-region slots filled by the stitcher.
        let mut unnamed: Vec<u32> = Vec::new();
        for i in 0..header.num_functions as usize {
            let function_index = header.entry(stream, entry_offset + i)? as usize;
            let callee = self.file.function(function_index).ok_or_else(|| {
                sink.fatal(
                    Some(&op.location),
                    DecodeError::FunctionOutOfRange {
                        index: function_index,
                    },
                )
            })?;
            if callee.is_named() {
                op.callees.push(callee.name.clone());
            } else {
                unnamed.push(function_index as u32);
            }
        }
        entry_offset += header.num_functions as usize;

        // Results: each defines a register with the register's declared
        // type.
        let mut result_regs: SmallVec<[(usize, IrType); 2]> = SmallVec::new();
        for i in 0..header.num_results as usize {
            let register_index = header.entry(stream, entry_offset + i)? as usize;
            let ty = self
                .registers
                .get(register_index)
                .ok_or_else(|| {
                    sink.fatal(
                        Some(&op.location),
                        DecodeError::UndefinedRegister {
                            index: register_index,
                        },
                    )
                })?
                .ty
                .clone();
            let value = region.new_value(ty.clone());
            op.results.push(value);
            result_regs.push((register_index, ty));
        }
        entry_offset += header.num_results as usize;

        for (i, (register_index, ty)) in result_regs.iter().enumerate() {
            let value = op.results[i];
            self.add_definition(*register_index, value, ty, sink)?;
            let count = header.used_by_count(stream, i)? as usize;
            let mut used_by = SmallVec::with_capacity(count);
            for k in 0..count {
                used_by.push(header.entry(stream, entry_offset + k)?);
            }
            self.registers[*register_index].used_by = used_by;
            entry_offset += count;
        }

        if !unnamed.is_empty() {
            deferred.push(DeferredOp {
                op_index: region.block.ops.len(),
                functions: unnamed,
            });
        }
        region.block.ops.push(op);
        Ok(())
    }

    /// Appends the terminator. A trailing return kernel decoded from the
    /// stream already is one; otherwise a return is synthesized from the
    /// result registers at the region's defining location.
    fn append_return(&mut self, region: &mut IrRegion, sink: &mut Sink) -> Result<(), DecodeError> {
        if region
            .block
            .terminator()
            .is_some_and(|op| op.name == RETURN_KERNEL)
        {
            return Ok(());
        }
        let mut ret = IrOp::new(RETURN_KERNEL, self.location.clone());
        for index in self.result_regs.clone() {
            let value = self.use_register(index).map_err(|e| {
                sink.fatal(Some(&self.location), e)
            })?;
            ret.operands.push(value);
        }
        region.block.ops.push(ret);
        Ok(())
    }

    /// Surfaces writer-contract violations: the declared use count of a
    /// register should match the operand positions that referenced it.
    /// Never fatal; the decoder does not enforce the writer's contract.
    fn check_use_counts(&self, sink: &mut Sink) {
        for (index, reg) in self.registers.iter().enumerate() {
            if reg.value.is_some() && reg.declared_uses != reg.observed_uses {
                sink.note_at(
                    self.location.clone(),
                    format!(
                        "register {} declares {} uses but {} were decoded",
                        index, reg.declared_uses, reg.observed_uses
                    ),
                );
            }
        }
    }

    fn kernel_at(
        &self,
        stream: &KernelStream<'a>,
        offset: usize,
    ) -> Result<KernelHeader, DecodeError> {
        if offset % KERNEL_ENTRY_ALIGNMENT != 0 {
            return Err(DecodeError::section(
                SectionId::Functions,
                format!("kernel entry offset {} is not 4-byte aligned", offset),
            ));
        }
        KernelHeader::read(stream, offset / KERNEL_ENTRY_ALIGNMENT)
    }

    /// Resolves an operand register to its defined value and counts the
    /// use.
    fn use_register(&mut self, index: usize) -> Result<ValueId, DecodeError> {
        let reg = self
            .registers
            .get_mut(index)
            .ok_or(DecodeError::UndefinedRegister { index })?;
        let value = reg.value.ok_or(DecodeError::UndefinedRegister { index })?;
        reg.observed_uses += 1;
        Ok(value)
    }

    /// Marks a register defined. Rejects redefinition; a none-typed
    /// register adopts the defining value's type.
    fn add_definition(
        &mut self,
        index: usize,
        value: ValueId,
        value_ty: &IrType,
        sink: &mut Sink,
    ) -> Result<(), DecodeError> {
        let reg = match self.registers.get_mut(index) {
            Some(reg) => reg,
            None => {
                return Err(sink.fatal(
                    Some(&self.location),
                    DecodeError::UndefinedRegister { index },
                ))
            }
        };
        if reg.value.is_some() {
            return Err(sink.fatal(
                Some(&self.location),
                DecodeError::RegisterRedefined { index },
            ));
        }
        if reg.ty.is_none() {
            reg.ty = value_ty.clone();
        } else if reg.ty != *value_ty {
            return Err(sink.fatal(
                Some(&self.location),
                DecodeError::RegisterTypeMismatch {
                    index,
                    declared: reg.ty.clone(),
                    found: value_ty.clone(),
                },
            ));
        }
        reg.value = Some(value);
        Ok(())
    }
}
