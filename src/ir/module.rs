use rustc_hash::FxHashMap;

use crate::ir::function::{FuncId, IrFunction};
use crate::ir::location::Location;

/// The top-level IR container produced by a decode.
///
/// Invariants:
/// - Function names are unique within a module.
/// - `FuncId(n)` always indexes `functions[n]`.
/// - Functions appear in the order the file's function index listed them.
#[derive(Debug, Default)]
pub struct IrModule {
    pub location: Location,
    functions: Vec<IrFunction>,
    function_index: FxHashMap<String, FuncId>,
}

impl IrModule {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            functions: Vec::new(),
            function_index: FxHashMap::default(),
        }
    }

    pub fn function(&self, id: FuncId) -> Option<&IrFunction> {
        self.functions.get(id.0 as usize)
    }

    pub fn function_by_name(&self, name: &str) -> Option<&IrFunction> {
        let id = self.function_index.get(name)?;
        self.functions.get(id.0 as usize)
    }

    pub fn functions(&self) -> &[IrFunction] {
        &self.functions
    }

    /// Registers a function. Returns `Err` with the offending name if it
    /// is already taken.
    pub fn add_function(&mut self, mut func: IrFunction) -> Result<FuncId, String> {
        if self.function_index.contains_key(&func.name) {
            return Err(func.name);
        }
        let id = FuncId(self.functions.len() as u32);
        func.id = id;
        self.function_index.insert(func.name.clone(), id);
        self.functions.push(func);
        Ok(id)
    }
}
