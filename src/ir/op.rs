use crate::ir::attr::Attribute;
use crate::ir::location::Location;
use crate::ir::region::IrRegion;
use crate::ir::value::ValueId;

/// A decoded operation.
///
/// Operands and results are `ValueId`s into the owning region's value
/// table. The attribute dictionary keeps the order in which attributes
/// were decoded. `callees` holds symbol references to named functions;
/// `regions` holds nested regions attached by the stitcher, in the order
/// the operation referenced them.
#[derive(Debug, Clone)]
pub struct IrOp {
    pub name: String,
    pub location: Location,
    pub operands: Vec<ValueId>,
    pub results: Vec<ValueId>,
    pub attributes: Vec<(String, Attribute)>,
    /// Set when the writer marked the kernel non-strict.
    pub non_strict: bool,
    pub callees: Vec<String>,
    pub regions: Vec<IrRegion>,
}

impl IrOp {
    pub fn new(name: impl Into<String>, location: Location) -> Self {
        Self {
            name: name.into(),
            location,
            operands: Vec::new(),
            results: Vec::new(),
            attributes: Vec::new(),
            non_strict: false,
            callees: Vec::new(),
            regions: Vec::new(),
        }
    }

    /// Looks up an attribute by name.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, a)| a)
    }
}
