pub mod attr;
pub mod function;
pub mod location;
pub mod module;
pub mod op;
pub mod region;
pub mod types;
pub mod value;

pub use attr::Attribute;
pub use function::{FuncId, IrFunction};
pub use location::Location;
pub use module::IrModule;
pub use op::IrOp;
pub use region::{IrBlock, IrRegion};
pub use types::{DType, Dim, IrType};
pub use value::ValueId;
