use thiserror::Error;

use crate::bef::encoding::SectionId;
use crate::ir::types::IrType;

/// Errors raised while decoding a BEF file.
///
/// The container-level and handle-resolution kinds abort the decode at
/// their site of detection. `UnknownAttribute`, `UnknownType` and
/// `MissingOptionalTable` are recoverable: under the default lenient
/// policy they are downgraded to warnings and a placeholder is
/// substituted; under the strict policy they abort like the rest.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("invalid BEF file header")]
    BadMagic,

    #[error("unsupported BEF format version {found}")]
    UnsupportedVersion { found: u8 },

    #[error("unexpected end of input at byte {offset}")]
    Truncated { offset: usize },

    #[error("variable-length integer at byte {offset} overflows 64 bits")]
    VarintOverflow { offset: usize },

    #[error("malformed {section} section: {detail}")]
    BadSection { section: SectionId, detail: String },

    #[error("string offset {offset} is not a string start")]
    StringOutOfRange { offset: usize },

    #[error("type index {index} is out of range")]
    TypeOutOfRange { index: usize },

    #[error("function index {index} is out of range")]
    FunctionOutOfRange { index: usize },

    #[error("use of undefined register {index}")]
    UndefinedRegister { index: usize },

    #[error("redefinition of register {index}")]
    RegisterRedefined { index: usize },

    #[error("register {index} is declared {declared} but defined with a {found} value")]
    RegisterTypeMismatch {
        index: usize,
        declared: IrType,
        found: IrType,
    },

    #[error("region of function {index} was never resolved")]
    UnresolvedRegion { index: usize },

    #[error("no attribute was decoded at offset {offset}")]
    UnknownAttribute { offset: usize },

    #[error("cannot parse type string {text:?}")]
    UnknownType { text: String },

    #[error("missing optional section(s): {tables}")]
    MissingOptionalTable { tables: String },
}

impl DecodeError {
    /// Section-structure shorthand used throughout the decoder.
    pub(crate) fn section(section: SectionId, detail: impl Into<String>) -> Self {
        DecodeError::BadSection {
            section,
            detail: detail.into(),
        }
    }
}
