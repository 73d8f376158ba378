//! Phase three: region stitching.
//!
//! Named functions become top-level module entities in function-index
//! order; unnamed regions move into the operations that referenced them.
//! Every unnamed region must move exactly once. The original layout of
//! this pass patched regions through operation pointers; with value-owned
//! IR the pass instead resolves regions recursively from the named
//! roots, so a child region is fully stitched before its owner moves.

use std::mem;

use rustc_hash::FxHashMap;

use crate::bef::encoding::SectionId;
use crate::bef::file::BefFile;
use crate::error::DecodeError;
use crate::ir::function::{FuncId, IrFunction};
use crate::ir::location::Location;
use crate::ir::module::IrModule;
use crate::ir::region::IrRegion;
use crate::ir::types::IrType;

/// Where a function's decoded region currently lives.
#[derive(Debug)]
pub(crate) enum RegionSlot {
    /// Native function: no body exists.
    External,
    /// Decoded and waiting to be attached.
    Ready(IrRegion),
    /// Already moved into the module or an operation.
    Taken,
}

/// A nested-region reference recorded during phase two: the operation at
/// `op_index` in the owner's block takes the regions of `functions`, in
/// order.
#[derive(Debug)]
pub(crate) struct DeferredOp {
    pub op_index: usize,
    pub functions: Vec<u32>,
}

/// Cross-function state handed from phase two to phase three. The
/// deferred table is append-only during phase two and drained once here.
#[derive(Debug, Default)]
pub(crate) struct FunctionContext {
    pub slots: Vec<RegionSlot>,
    pub deferred: FxHashMap<usize, Vec<DeferredOp>>,
}

/// Resolves every function: named ones into the module, unnamed ones
/// into their referencing operations. Leftover unnamed regions are
/// fatal.
pub(crate) fn stitch(
    file: &BefFile<'_>,
    mut ctx: FunctionContext,
    origin: Location,
) -> Result<IrModule, DecodeError> {
    let mut module = IrModule::new(origin);

    for (index, func) in file.functions().iter().enumerate() {
        if !func.is_named() {
            continue;
        }
        let (location, body) = if func.is_native() {
            (Location::Unknown, None)
        } else {
            let region = take_region(index, &mut ctx)?;
            (region.location.clone(), Some(region))
        };
        let result_types = match &body {
            // The terminator's operand types are the authoritative
            // result types of a decoded body.
            Some(region) => terminator_types(region),
            None => func.result_types.to_vec(),
        };
        module
            .add_function(IrFunction {
                id: FuncId(0),
                name: func.name.clone(),
                arg_types: func.arg_types.to_vec(),
                result_types,
                location,
                body,
            })
            .map_err(|name| {
                DecodeError::section(
                    SectionId::FunctionIndex,
                    format!("duplicate function name {:?}", name),
                )
            })?;
    }

    // Every unnamed region must have been consumed by now.
    for (index, slot) in ctx.slots.iter().enumerate() {
        if matches!(slot, RegionSlot::Ready(_)) {
            return Err(DecodeError::UnresolvedRegion { index });
        }
    }

    Ok(module)
}

/// Takes the region of function `index` out of its slot, recursively
/// attaching its own nested regions first. A slot that is already empty
/// means a region was referenced twice, or a native function was used
/// as a nested region; both leave the IR unresolvable.
fn take_region(index: usize, ctx: &mut FunctionContext) -> Result<IrRegion, DecodeError> {
    match mem::replace(&mut ctx.slots[index], RegionSlot::Taken) {
        RegionSlot::Ready(mut region) => {
            for d in ctx.deferred.remove(&index).unwrap_or_default() {
                let mut children = Vec::with_capacity(d.functions.len());
                for child_index in &d.functions {
                    children.push(take_region(*child_index as usize, ctx)?);
                }
                region.block.ops[d.op_index].regions = children;
            }
            Ok(region)
        }
        RegionSlot::External | RegionSlot::Taken => Err(DecodeError::UnresolvedRegion { index }),
    }
}

/// Result types of a stitched body: the operand types of its return.
fn terminator_types(region: &IrRegion) -> Vec<IrType> {
    match region.block.terminator() {
        Some(ret) => ret
            .operands
            .iter()
            .filter_map(|v| region.value_type(*v).cloned())
            .collect(),
        None => Vec::new(),
    }
}
