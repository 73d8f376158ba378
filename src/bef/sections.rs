//! Outer container parsing: magic check and the section table.

use crate::bef::encoding::{SectionId, BEF_MAGIC_1, BEF_MAGIC_2};
use crate::bef::reader::BefReader;
use crate::bef::Sink;
use crate::error::DecodeError;

/// The raw payload of every section in the file, keyed by identifier.
///
/// Duplicate sections are last-writer-wins. Unknown identifiers are kept
/// as raw byte slices so future sections survive a decode-reencode trip.
#[derive(Debug, Default)]
pub struct SectionMap<'a> {
    table: [Option<&'a [u8]>; SectionId::COUNT],
    unknown: Vec<(u8, &'a [u8])>,
}

impl<'a> SectionMap<'a> {
    /// The payload of `id`, or an empty slice if the section is absent.
    pub fn get(&self, id: SectionId) -> &'a [u8] {
        self.table[id as usize].unwrap_or(&[])
    }

    pub fn has(&self, id: SectionId) -> bool {
        self.table[id as usize].is_some()
    }

    fn set(&mut self, id: SectionId, payload: &'a [u8]) {
        self.table[id as usize] = Some(payload);
    }

    /// Sections with unrecognized identifiers, in file order.
    pub fn unknown(&self) -> &[(u8, &'a [u8])] {
        &self.unknown
    }
}

/// Checks the two-byte magic prefix.
pub(crate) fn read_header(reader: &mut BefReader<'_>) -> Result<(), DecodeError> {
    let magic = |r: &mut BefReader<'_>| r.read_u8().map_err(|_| DecodeError::BadMagic);
    if magic(reader)? != BEF_MAGIC_1 || magic(reader)? != BEF_MAGIC_2 {
        return Err(DecodeError::BadMagic);
    }
    Ok(())
}

/// Splits the rest of the file into sections.
///
/// Emits one warning covering all missing optional tables; the later
/// phases degrade when those payloads come back empty.
pub(crate) fn split_sections<'a>(
    reader: &mut BefReader<'a>,
    sink: &mut Sink,
) -> Result<SectionMap<'a>, DecodeError> {
    let mut sections = SectionMap::default();
    while !reader.is_empty() {
        let (id, payload) = reader.read_section()?;
        match SectionId::from_u8(id) {
            Some(id) => sections.set(id, payload),
            None => {
                sink.note(format!("skipping unknown section id {}", id));
                sections.unknown.push((id, payload));
            }
        }
    }

    let missing: Vec<&str> = [
        SectionId::AttributeTypes,
        SectionId::AttributeNames,
        SectionId::RegisterTypes,
    ]
    .iter()
    .filter(|id| !sections.has(**id))
    .map(|id| id.name())
    .collect();
    if !missing.is_empty() {
        sink.recoverable(
            None,
            DecodeError::MissingOptionalTable {
                tables: missing.join(", "),
            },
        )?;
    }

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bef::DecodePolicy;
    use crate::ir::location::Location;

    #[test]
    fn magic_mismatch_is_bad_magic() {
        let mut reader = BefReader::new(&[0xBE, 0x00]);
        assert!(matches!(read_header(&mut reader), Err(DecodeError::BadMagic)));
        let mut reader = BefReader::new(&[0xBE]);
        assert!(matches!(read_header(&mut reader), Err(DecodeError::BadMagic)));
    }

    #[test]
    fn duplicate_sections_are_last_writer_wins() {
        let mut sink = Sink::new(DecodePolicy::Lenient, Location::Unknown);
        // Strings twice, second one wins.
        let bytes = [3, 1, 0xAA, 3, 1, 0xBB, 9, 0, 10, 0, 11, 0];
        let mut reader = BefReader::new(&bytes);
        let sections = split_sections(&mut reader, &mut sink).unwrap();
        assert_eq!(sections.get(SectionId::Strings), &[0xBB]);
        assert!(sink.diagnostics().is_empty());
    }

    #[test]
    fn unknown_sections_are_retained_and_warned() {
        let mut sink = Sink::new(DecodePolicy::Lenient, Location::Unknown);
        let bytes = [99, 2, 0x01, 0x02, 9, 0, 10, 0, 11, 0];
        let mut reader = BefReader::new(&bytes);
        let sections = split_sections(&mut reader, &mut sink).unwrap();
        assert_eq!(sections.unknown(), &[(99u8, &[0x01u8, 0x02][..])]);
        assert_eq!(sink.diagnostics().len(), 1);
    }

    #[test]
    fn missing_optional_tables_warn_once() {
        let mut sink = Sink::new(DecodePolicy::Lenient, Location::Unknown);
        let mut reader = BefReader::new(&[]);
        let sections = split_sections(&mut reader, &mut sink).unwrap();
        assert!(!sections.has(SectionId::AttributeTypes));
        let warnings: Vec<_> = sink.diagnostics().warnings().collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("AttributeTypes"));
        assert!(warnings[0].message.contains("RegisterTypes"));
    }
}
