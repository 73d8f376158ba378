//! WEFT: a decoder toolkit for BEF, the binary executable format used to
//! ship machine-learning dataflow graphs to a runtime.
//!
//! Decode pipeline:
//!
//! ```text
//! BEF bytes → BefReader → [SectionMap] → table loaders → [BefFile]
//!   → FunctionReader (per function) → [IrRegion] → stitcher → IrModule
//! ```
//!
//! The decoder is a pure function from bytes to IR plus diagnostics: no
//! I/O, no configuration, no shared state. A BEF file is self-describing
//! and offset-linked; one forward pass over its sections reconstructs
//! functions, operations, operands, attributes, nested regions, and
//! source locations.
//!
//! ```
//! use weft::{decode, Location};
//!
//! // A minimal file: magic, FormatVersion, an empty FunctionIndex, and
//! // the optional tables present but empty.
//! let bytes = [
//!     0xBE, 0xF0,       // magic
//!     0, 1, 0,          // FormatVersion = [0]
//!     7, 1, 0,          // FunctionIndex: zero functions
//!     9, 1, 0,          // AttributeTypes: zero entries
//!     10, 1, 0,         // AttributeNames: zero tables
//!     11, 1, 0,         // RegisterTypes: zero tables
//! ];
//! let module = decode(&bytes, Location::origin("model.bef")).unwrap();
//! assert!(module.functions().is_empty());
//! ```

pub mod bef;
pub mod diagnostics;
pub mod error;
pub mod ir;

pub use bef::{decode, decode_with, DecodeOutcome, DecodePolicy};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::DecodeError;
pub use ir::{Attribute, IrFunction, IrModule, IrOp, IrRegion, IrType, Location};
