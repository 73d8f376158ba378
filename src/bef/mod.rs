//! BEF decoding: from a borrowed byte buffer to an owned [`IrModule`].
//!
//! The decoder runs in three phases over five components:
//!
//! ```text
//! bytes → BefReader → SectionMap → BefFile tables      (phase 1)
//!       → FunctionReader per function → IrRegion        (phase 2)
//!       → stitch: named → module, unnamed → nested      (phase 3)
//! ```
//!
//! Decoding is a pure, single-threaded transformation; independent
//! decoders may run in parallel with no coordination. The input buffer
//! is borrowed for the duration of the decode and the returned IR owns
//! all of its strings.

pub mod encoding;
pub mod reader;
pub mod sections;

mod attrs;
mod file;
mod function;
mod stitch;

pub use file::{BefFile, BefFunction};

use crate::bef::encoding::SectionId;
use crate::bef::function::{AttributeNames, FunctionReader, RegisterTypeTables};
use crate::bef::reader::BefReader;
use crate::bef::sections::SectionMap;
use crate::bef::stitch::{FunctionContext, RegionSlot};
use crate::diagnostics::Diagnostics;
use crate::error::DecodeError;
use crate::ir::location::Location;
use crate::ir::module::IrModule;

/// How the decoder treats recoverable conditions.
///
/// `Lenient` (the default) downgrades them to warnings and substitutes
/// placeholders: missing optional tables, unknown attributes, and
/// unparseable types all leave a degraded but well-formed module.
/// `Strict` promotes them to fatal errors at their site of detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    Strict,
    #[default]
    Lenient,
}

/// A successful decode: the module plus any warnings issued on the way.
#[derive(Debug)]
pub struct DecodeOutcome {
    pub module: IrModule,
    pub warnings: Diagnostics,
}

/// Decodes a BEF buffer under the lenient policy.
///
/// `origin` anchors diagnostics that have no decoded source position,
/// typically the path the buffer was read from. On failure the returned
/// bundle holds every warning issued before the fatal error, then the
/// fatal error itself, in issuance order.
pub fn decode(bytes: &[u8], origin: Location) -> Result<IrModule, Diagnostics> {
    decode_with(bytes, origin, DecodePolicy::Lenient).map(|outcome| outcome.module)
}

/// Decodes a BEF buffer under an explicit policy, returning the decoded
/// module together with the warnings.
pub fn decode_with(
    bytes: &[u8],
    origin: Location,
    policy: DecodePolicy,
) -> Result<DecodeOutcome, Diagnostics> {
    let mut sink = Sink::new(policy, origin.clone());
    match run(bytes, origin, &mut sink) {
        Ok(module) => Ok(DecodeOutcome {
            module,
            warnings: sink.into_diagnostics(),
        }),
        Err(err) => {
            sink.record_fatal_fallback(err);
            Err(sink.into_diagnostics())
        }
    }
}

fn run(bytes: &[u8], origin: Location, sink: &mut Sink) -> Result<IrModule, DecodeError> {
    let mut reader = BefReader::new(bytes);
    sections::read_header(&mut reader)?;
    let sections = sections::split_sections(&mut reader, sink)?;

    // Phase 1: every table except Functions.
    let mut file = BefFile::new(sink.origin().clone());
    file.have_attribute_types = sections.has(SectionId::AttributeTypes);
    file.read_format_version(sections.get(SectionId::FormatVersion))?;
    file.read_location_filenames(sections.get(SectionId::LocationFilenames))?;
    file.read_location_positions(sections.get(SectionId::LocationPositions))?;
    file.read_strings(sections.get(SectionId::Strings))?;
    file.read_types(sections.get(SectionId::Types), sink)?;
    file.read_attributes(
        sections.get(SectionId::Attributes),
        sections.get(SectionId::AttributeTypes),
        sink,
    )?;
    file.read_kernels(sections.get(SectionId::Kernels))?;
    file.read_function_index(sections.get(SectionId::FunctionIndex))?;

    // Phase 2: function bodies, each into an unrooted region.
    let ctx = read_functions(&file, &sections, sink)?;

    // Phase 3: attach named regions to the module, nested regions to
    // their operations.
    stitch::stitch(&file, ctx, origin)
}

/// Decodes every BEF-kind function body. The AttributeNames and
/// RegisterTypes side streams are shared across functions and consumed
/// in function-index order; native functions do not consume from them.
fn read_functions<'a>(
    file: &BefFile<'a>,
    sections: &SectionMap<'a>,
    sink: &mut Sink,
) -> Result<FunctionContext, DecodeError> {
    let payload = sections.get(SectionId::Functions);
    let mut names = AttributeNames::new(sections.get(SectionId::AttributeNames));
    let mut register_types = RegisterTypeTables::new(sections.get(SectionId::RegisterTypes));

    let mut ctx = FunctionContext::default();
    for (index, func) in file.functions().iter().enumerate() {
        if func.is_native() {
            ctx.slots.push(RegionSlot::External);
            continue;
        }
        let body = payload.get(func.offset..).ok_or_else(|| {
            DecodeError::section(
                SectionId::Functions,
                format!("function offset {} out of range", func.offset),
            )
        })?;
        let reader = FunctionReader::new(body, file, func);
        let (region, deferred) = reader.read(&mut names, &mut register_types, sink)?;
        if !deferred.is_empty() {
            ctx.deferred.insert(index, deferred);
        }
        ctx.slots.push(RegionSlot::Ready(region));
    }
    Ok(ctx)
}

// ---------------------------------------------------------------------------
// Diagnostic sink
// ---------------------------------------------------------------------------

/// Collects diagnostics during a decode and applies the policy: a
/// recoverable condition is a warning under `Lenient` and a fatal error
/// under `Strict`. Order of issuance is preserved.
pub(crate) struct Sink {
    policy: DecodePolicy,
    origin: Location,
    diags: Diagnostics,
    fatal_recorded: bool,
}

impl Sink {
    pub(crate) fn new(policy: DecodePolicy, origin: Location) -> Self {
        Self {
            policy,
            origin,
            diags: Diagnostics::new(),
            fatal_recorded: false,
        }
    }

    pub(crate) fn origin(&self) -> &Location {
        &self.origin
    }

    /// A plain warning at the origin location. Never promoted.
    pub(crate) fn note(&mut self, message: impl Into<String>) {
        self.diags.warning(self.origin.clone(), message);
    }

    /// A plain warning at a decoded location. Never promoted.
    pub(crate) fn note_at(&mut self, location: Location, message: impl Into<String>) {
        self.diags.warning(location, message);
    }

    /// A recoverable condition: warning under `Lenient`, fatal under
    /// `Strict`. Callers substitute a placeholder on `Ok(())`.
    pub(crate) fn recoverable(
        &mut self,
        location: Option<&Location>,
        err: DecodeError,
    ) -> Result<(), DecodeError> {
        match self.policy {
            DecodePolicy::Lenient => {
                let location = location.unwrap_or(&self.origin).clone();
                self.diags.warning(location, err.to_string());
                Ok(())
            }
            DecodePolicy::Strict => Err(self.fatal(location, err)),
        }
    }

    /// Records a fatal error at the given location and hands it back for
    /// propagation.
    pub(crate) fn fatal(&mut self, location: Option<&Location>, err: DecodeError) -> DecodeError {
        let location = location.unwrap_or(&self.origin).clone();
        self.diags.error(location, err.to_string());
        self.fatal_recorded = true;
        err
    }

    /// Records a propagated fatal error that no decode site anchored to
    /// a location.
    fn record_fatal_fallback(&mut self, err: DecodeError) {
        if !self.fatal_recorded {
            self.diags.error(self.origin.clone(), err.to_string());
            self.fatal_recorded = true;
        }
    }

    #[cfg(test)]
    pub(crate) fn diagnostics(&self) -> &Diagnostics {
        &self.diags
    }

    fn into_diagnostics(self) -> Diagnostics {
        self.diags
    }
}
