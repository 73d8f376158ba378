use crate::ir::location::Location;
use crate::ir::op::IrOp;
use crate::ir::types::IrType;
use crate::ir::value::ValueId;

/// A region: one block of operations plus the value table both the block
/// arguments and the operation results live in.
///
/// Invariants maintained by the decoder:
/// 1. `ValueId(n)` indexes `values[n]`.
/// 2. Every operand of every op is defined earlier in the block or is a
///    block argument.
/// 3. The last op of the block is the region's return.
#[derive(Debug, Clone)]
pub struct IrRegion {
    pub location: Location,
    pub block: IrBlock,
    values: Vec<IrType>,
}

impl IrRegion {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            block: IrBlock::default(),
            values: Vec::new(),
        }
    }

    /// Allocates a fresh value of the given type.
    pub fn new_value(&mut self, ty: IrType) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ty);
        id
    }

    pub fn value_type(&self, value: ValueId) -> Option<&IrType> {
        self.values.get(value.0 as usize)
    }

    pub fn num_values(&self) -> usize {
        self.values.len()
    }
}

/// The single block of a region.
#[derive(Debug, Clone, Default)]
pub struct IrBlock {
    /// Block arguments, in declaration order. For a function body these
    /// match the function's argument types.
    pub args: Vec<ValueId>,
    /// Operations in program order. The terminator is last.
    pub ops: Vec<IrOp>,
}

impl IrBlock {
    /// The trailing return operation, if the block is non-empty.
    pub fn terminator(&self) -> Option<&IrOp> {
        self.ops.last()
    }
}
