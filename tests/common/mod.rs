//! Byte-level BEF builders shared by the decoder tests.
//!
//! These mirror the writer side of the format contract closely enough to
//! produce valid files for every scenario the tests exercise: varints,
//! reverse variable-byte length prefixes, string pools, attribute pools
//! with descriptor tables, function bodies with 4-byte-aligned kernel
//! streams, and the outer section framing.

#![allow(dead_code)]

use std::collections::HashMap;

use weft::bef::encoding::SectionId;

pub const MAGIC: [u8; 2] = [0xBE, 0xF0];

pub fn push_varint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7F) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

pub fn varint(v: u64) -> Vec<u8> {
    let mut out = Vec::new();
    push_varint(&mut out, v);
    out
}

/// A varint count followed by varint items.
pub fn int_array(items: &[u64]) -> Vec<u8> {
    let mut out = varint(items.len() as u64);
    for item in items {
        push_varint(&mut out, *item);
    }
    out
}

// ---------------------------------------------------------------------------
// Outer container
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Bef {
    sections: Vec<(u8, Vec<u8>)>,
}

impl Bef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(mut self, id: SectionId, payload: Vec<u8>) -> Self {
        self.sections.push((id as u8, payload));
        self
    }

    pub fn raw_section(mut self, id: u8, payload: Vec<u8>) -> Self {
        self.sections.push((id, payload));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        for (id, payload) in self.sections {
            out.push(id);
            push_varint(&mut out, payload.len() as u64);
            out.extend_from_slice(&payload);
        }
        out
    }
}

/// The skeleton every well-formed test file starts from: version plus
/// empty optional tables, so no missing-table warning fires.
pub fn base() -> Bef {
    Bef::new()
        .section(SectionId::FormatVersion, vec![0])
        .section(SectionId::AttributeTypes, varint(0))
        .section(SectionId::AttributeNames, varint(0))
        .section(SectionId::RegisterTypes, varint(0))
}

// ---------------------------------------------------------------------------
// String and location pools
// ---------------------------------------------------------------------------

/// NUL-terminated string pool; handles are byte offsets of string starts.
#[derive(Default)]
pub struct StringPool {
    bytes: Vec<u8>,
    offsets: HashMap<String, usize>,
}

impl StringPool {
    /// A pool whose first entry is the empty string, at offset 0, the
    /// way unnamed functions expect it.
    pub fn new() -> Self {
        let mut pool = Self::default();
        pool.add("");
        pool
    }

    pub fn add(&mut self, s: &str) -> usize {
        if let Some(offset) = self.offsets.get(s) {
            return *offset;
        }
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self.offsets.insert(s.to_owned(), offset);
        offset
    }

    pub fn payload(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

/// LocationFilenames plus LocationPositions.
#[derive(Default)]
pub struct Locations {
    filenames: Vec<u8>,
    filename_count: u64,
    positions: Vec<u8>,
}

impl Locations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filename(&mut self, name: &str) -> u64 {
        self.filenames.extend_from_slice(name.as_bytes());
        self.filenames.push(0);
        let index = self.filename_count;
        self.filename_count += 1;
        index
    }

    /// Returns the position's handle: its byte offset in the payload.
    pub fn position(&mut self, filename_index: u64, line: u64, col: u64) -> usize {
        let offset = self.positions.len();
        push_varint(&mut self.positions, filename_index);
        push_varint(&mut self.positions, line);
        push_varint(&mut self.positions, col);
        offset
    }

    pub fn filenames_payload(&self) -> Vec<u8> {
        self.filenames.clone()
    }

    pub fn positions_payload(&self) -> Vec<u8> {
        self.positions.clone()
    }
}

// ---------------------------------------------------------------------------
// Attribute pool
// ---------------------------------------------------------------------------

const KIND_STANDARD: u64 = 0;
const KIND_BOOL: u64 = 1;
const KIND_STRING: u64 = 2;
const KIND_TYPE: u64 = 3;
const KIND_DENSE: u64 = 4;
const KIND_FLAT_ARRAY: u64 = 5;
const KIND_OFFSET_ARRAY: u64 = 6;

fn descriptor(kind: u64, payload: u64) -> u64 {
    kind | (payload << 3)
}

/// The Attributes byte pool and its AttributeTypes descriptor table.
#[derive(Default)]
pub struct AttrPool {
    bytes: Vec<u8>,
    entries: Vec<(usize, u64)>,
}

impl AttrPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the reverse variable-byte length prefix for a
    /// length-prefixed attribute starting at the current position: the
    /// least significant 7-bit group first (high bit clear), then
    /// increasingly significant groups with the high bit set, so the
    /// group nearest the attribute is the most significant.
    fn reverse_length(&mut self, mut v: usize) {
        self.bytes.push((v & 0x7F) as u8);
        v >>= 7;
        while v != 0 {
            self.bytes.push(((v & 0x7F) as u8) | 0x80);
            v >>= 7;
        }
    }

    pub fn std_i32(&mut self, type_index: u64, value: i32) -> usize {
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self.entries.push((offset, descriptor(KIND_STANDARD, type_index)));
        offset
    }

    pub fn std_i64(&mut self, type_index: u64, value: i64) -> usize {
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self.entries.push((offset, descriptor(KIND_STANDARD, type_index)));
        offset
    }

    pub fn std_f32(&mut self, type_index: u64, value: f32) -> usize {
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(&value.to_bits().to_le_bytes());
        self.entries.push((offset, descriptor(KIND_STANDARD, type_index)));
        offset
    }

    pub fn std_f64(&mut self, type_index: u64, value: f64) -> usize {
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(&value.to_bits().to_le_bytes());
        self.entries.push((offset, descriptor(KIND_STANDARD, type_index)));
        offset
    }

    pub fn std_f16(&mut self, type_index: u64, bits: u16) -> usize {
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(&bits.to_le_bytes());
        self.entries.push((offset, descriptor(KIND_STANDARD, type_index)));
        offset
    }

    pub fn boolean(&mut self, value: bool) -> usize {
        let offset = self.bytes.len();
        self.bytes.push(value as u8);
        self.entries.push((offset, descriptor(KIND_BOOL, 0)));
        offset
    }

    pub fn string(&mut self, value: &str) -> usize {
        self.reverse_length(value.len());
        let offset = self.bytes.len();
        self.bytes.extend_from_slice(value.as_bytes());
        self.entries.push((offset, descriptor(KIND_STRING, 0)));
        offset
    }

    pub fn type_attr(&mut self, code: u8) -> usize {
        let offset = self.bytes.len();
        self.bytes.push(code);
        self.entries.push((offset, descriptor(KIND_TYPE, 0)));
        offset
    }

    /// Dense elements of i32: the 8-byte `(dtype:8 | rank:56)` header,
    /// the element count, the dimensions, then the packed elements.
    pub fn dense_i32(&mut self, dims: &[u64], values: &[i32]) -> usize {
        let offset = self.bytes.len();
        let header = (1u64 << 56) | dims.len() as u64;
        self.bytes.extend_from_slice(&header.to_le_bytes());
        self.bytes
            .extend_from_slice(&(values.len() as u64).to_le_bytes());
        for dim in dims {
            self.bytes.extend_from_slice(&dim.to_le_bytes());
        }
        for value in values {
            self.bytes.extend_from_slice(&value.to_le_bytes());
        }
        self.entries.push((offset, descriptor(KIND_DENSE, 0)));
        offset
    }

    pub fn flat_array_i32(&mut self, type_index: u64, values: &[i32]) -> usize {
        self.reverse_length(values.len());
        let offset = self.bytes.len();
        for value in values {
            self.bytes.extend_from_slice(&value.to_le_bytes());
        }
        self.entries
            .push((offset, descriptor(KIND_FLAT_ARRAY, type_index)));
        offset
    }

    /// An offset array over already-written attributes.
    pub fn offset_array(&mut self, elements: &[usize]) -> usize {
        self.reverse_length(elements.len());
        let offset = self.bytes.len();
        for element in elements {
            self.bytes
                .extend_from_slice(&(*element as u32).to_le_bytes());
        }
        self.entries
            .push((offset, descriptor(KIND_OFFSET_ARRAY, 0)));
        offset
    }

    pub fn pool_payload(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    pub fn types_payload(&self) -> Vec<u8> {
        let mut out = varint(self.entries.len() as u64);
        for (offset, desc) in &self.entries {
            push_varint(&mut out, *offset as u64);
            push_varint(&mut out, *desc);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Function bodies and the function index
// ---------------------------------------------------------------------------

/// One function body: header fields plus the 4-byte-aligned kernel word
/// stream. Kernel-table offsets are byte offsets into the word stream.
pub struct FunctionBody {
    location: u64,
    reg_uses: Vec<u64>,
    result_regs: Vec<u64>,
    kernel_table: Vec<(u64, u64)>,
    words: Vec<u32>,
}

impl FunctionBody {
    pub fn new(location_offset: usize) -> Self {
        Self {
            location: location_offset as u64,
            reg_uses: Vec::new(),
            result_regs: Vec::new(),
            kernel_table: Vec::new(),
            words: Vec::new(),
        }
    }

    pub fn reg_uses(mut self, uses: &[u64]) -> Self {
        self.reg_uses = uses.to_vec();
        self
    }

    pub fn result_regs(mut self, regs: &[u64]) -> Self {
        self.result_regs = regs.to_vec();
        self
    }

    /// Appends a kernel entry and registers it in the kernel table.
    /// `used_bys` must have one list per result.
    pub fn kernel(
        &mut self,
        name: u32,
        location: u32,
        args: &[u32],
        attrs: &[u32],
        funcs: &[u32],
        results: &[u32],
        used_bys: &[&[u32]],
    ) {
        assert_eq!(used_bys.len(), results.len());
        let offset = (self.words.len() * 4) as u64;
        self.words.extend_from_slice(&[
            name,
            location,
            args.len() as u32,
            attrs.len() as u32,
            funcs.len() as u32,
            results.len() as u32,
        ]);
        for used_by in used_bys {
            self.words.push(used_by.len() as u32);
        }
        self.words.extend_from_slice(args);
        self.words.extend_from_slice(attrs);
        self.words.extend_from_slice(funcs);
        self.words.extend_from_slice(results);
        for used_by in used_bys {
            self.words.extend_from_slice(used_by);
        }
        self.kernel_table.push((offset, args.len() as u64));
    }

    /// The synthetic first kernel defining the argument registers.
    pub fn pseudo_kernel(&mut self, results: &[u32], used_bys: &[&[u32]]) {
        self.kernel(0, 0, &[], &[], &[], results, used_bys);
    }

    pub fn num_kernels(&self) -> u64 {
        self.kernel_table.len() as u64
    }

    pub fn payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        push_varint(&mut out, self.location);
        out.extend(int_array(&self.reg_uses));
        push_varint(&mut out, self.kernel_table.len() as u64);
        for (offset, num_operands) in &self.kernel_table {
            push_varint(&mut out, *offset);
            push_varint(&mut out, *num_operands);
        }
        for reg in &self.result_regs {
            push_varint(&mut out, *reg);
        }
        while out.len() % 4 != 0 {
            out.push(0);
        }
        for word in &self.words {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out
    }
}

/// The Functions section: concatenated bodies, offsets recorded.
#[derive(Default)]
pub struct FunctionsSection {
    bytes: Vec<u8>,
}

impl FunctionsSection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a body and returns its function offset.
    pub fn add(&mut self, body: &FunctionBody) -> usize {
        let offset = self.bytes.len();
        self.bytes.extend(body.payload());
        offset
    }

    pub fn payload(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

pub const KIND_BEF: u8 = 0;
pub const KIND_NATIVE: u8 = 1;

/// The FunctionIndex section.
#[derive(Default)]
pub struct FunctionIndex {
    count: u64,
    bytes: Vec<u8>,
}

impl FunctionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(
        &mut self,
        kind: u8,
        offset: usize,
        name_offset: usize,
        arg_types: &[u64],
        result_types: &[u64],
    ) {
        self.count += 1;
        self.bytes.push(kind);
        push_varint(&mut self.bytes, offset as u64);
        push_varint(&mut self.bytes, name_offset as u64);
        self.bytes.extend(int_array(arg_types));
        self.bytes.extend(int_array(result_types));
    }

    pub fn payload(&self) -> Vec<u8> {
        let mut out = varint(self.count);
        out.extend_from_slice(&self.bytes);
        out
    }
}

// ---------------------------------------------------------------------------
// Side streams
// ---------------------------------------------------------------------------

/// The AttributeNames section: a table count, then per function a kernel
/// count and per kernel a special byte plus name offsets.
pub struct AttributeNames {
    bytes: Vec<u8>,
}

impl AttributeNames {
    pub fn new(num_tables: u64) -> Self {
        Self {
            bytes: varint(num_tables),
        }
    }

    pub fn function(&mut self, num_kernels: u64) {
        push_varint(&mut self.bytes, num_kernels);
    }

    pub fn kernel(&mut self, special: u8, name_offsets: &[usize]) {
        self.bytes.push(special);
        for offset in name_offsets {
            push_varint(&mut self.bytes, *offset as u64);
        }
    }

    pub fn payload(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

/// The RegisterTypes section: a table count, then one type-handle array
/// per BEF-kind function.
pub struct RegisterTypes {
    bytes: Vec<u8>,
}

impl RegisterTypes {
    pub fn new(num_tables: u64) -> Self {
        Self {
            bytes: varint(num_tables),
        }
    }

    pub fn table(&mut self, type_indices: &[u64]) {
        self.bytes.extend(int_array(type_indices));
    }

    pub fn payload(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}
