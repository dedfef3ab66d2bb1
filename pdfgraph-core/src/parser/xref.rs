//! PDF Cross-Reference Table Parser
//!
//! Parses classic xref sections (ISO 32000-1 Section 7.5.4) and the trailer
//! dictionary that follows each of them.

use super::lexer::{is_whitespace, rfind_bytes, Lexer, Token};
use super::objects::ObjectParser;
use super::{ParseError, ParseResult};
use crate::objects::{Dictionary, Object};
use std::collections::BTreeMap;
use tracing::warn;

/// How far from the end of the file `startxref` is searched for.
const STARTXREF_WINDOW: usize = 1024;

/// Cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XRefEntry {
    /// Byte offset in the file (for in-use entries)
    pub offset: u64,
    pub generation: u16,
    pub in_use: bool,
}

/// One `xref ... trailer << ... >>` section
#[derive(Debug, Clone)]
pub struct XRefSection {
    pub entries: BTreeMap<u32, XRefEntry>,
    pub trailer: Dictionary,
}

/// Offset recorded after the last `startxref` keyword.
pub fn find_startxref(data: &[u8]) -> ParseResult<u64> {
    let window_start = data.len().saturating_sub(STARTXREF_WINDOW);
    let window = &data[window_start..];
    let keyword = rfind_bytes(window, b"startxref").ok_or(ParseError::InvalidXRef)?;

    let mut lexer = Lexer::at(data, window_start + keyword + b"startxref".len());
    match lexer.next_significant() {
        Ok(Token::Integer(offset)) if offset >= 0 => Ok(offset as u64),
        _ => Err(ParseError::InvalidXRef),
    }
}

/// Parses the section starting at `offset`, which must point at `xref`.
pub fn parse_section(data: &[u8], offset: usize, lenient: bool) -> ParseResult<XRefSection> {
    let mut lexer = Lexer::at(data, offset);
    match lexer.next_significant() {
        Ok(Token::XRef) => {}
        _ => return Err(ParseError::InvalidXRef),
    }

    let mut entries = BTreeMap::new();
    loop {
        let before = lexer.position();
        match lexer.next_significant()? {
            Token::Trailer => break,
            Token::Integer(first) => {
                let count = match lexer.next_significant()? {
                    Token::Integer(count) if count >= 0 => count,
                    _ => return Err(ParseError::InvalidXRef),
                };
                let first = u32::try_from(first).map_err(|_| ParseError::InvalidXRef)?;

                let mut position = lexer.position();
                for index in 0..count {
                    let (entry, next) = parse_entry(data, position, lenient).ok_or_else(|| {
                        ParseError::syntax(position, "Malformed xref entry")
                    })?;
                    let number = first
                        .checked_add(index as u32)
                        .ok_or(ParseError::InvalidXRef)?;
                    entries.insert(number, entry);
                    position = next;
                }
                lexer.set_position(position);
            }
            _ => {
                return Err(ParseError::syntax(
                    before,
                    "Expected xref subsection or trailer",
                ))
            }
        }
    }

    let trailer = match ObjectParser::at(data, lexer.position())
        .with_lenient(lenient)
        .parse_object()?
    {
        Object::Dictionary(dict) => dict,
        _ => return Err(ParseError::InvalidTrailer),
    };

    Ok(XRefSection { entries, trailer })
}

/// Reads one `oooooooooo ggggg n` entry starting at `position` (leading
/// end-of-line bytes are skipped). Returns the entry and the offset after it.
///
/// Entries must be exactly 20 bytes long; lenient mode also accepts the
/// 19 and 21 byte variants some writers produce, and any digit widths.
fn parse_entry(data: &[u8], position: usize, lenient: bool) -> Option<(XRefEntry, usize)> {
    let mut pos = position;
    while pos < data.len() && is_whitespace(data[pos]) {
        pos += 1;
    }
    let start = pos;

    let read_digits = |pos: &mut usize| -> Option<u64> {
        let begin = *pos;
        while *pos < data.len() && data[*pos].is_ascii_digit() {
            *pos += 1;
        }
        std::str::from_utf8(&data[begin..*pos]).ok()?.parse().ok()
    };
    let skip_spaces = |pos: &mut usize| {
        while *pos < data.len() && data[*pos] == b' ' {
            *pos += 1;
        }
    };

    let offset_start = pos;
    let offset = read_digits(&mut pos)?;
    let offset_width = pos - offset_start;
    skip_spaces(&mut pos);
    let generation_start = pos;
    let generation = u16::try_from(read_digits(&mut pos)?).ok()?;
    let generation_width = pos - generation_start;
    skip_spaces(&mut pos);

    let in_use = match data.get(pos)? {
        b'n' => true,
        b'f' => false,
        _ => return None,
    };
    pos += 1;

    let body_end = pos;
    while pos < data.len() && pos - body_end < 2 && is_whitespace(data[pos]) {
        pos += 1;
    }

    let width = pos - start;
    let canonical = offset_width == 10 && generation_width == 5 && body_end - start == 18;
    if !(canonical && width == 20) {
        if !lenient {
            return None;
        }
        warn!(offset = start, width, "non-standard xref entry");
    }

    Some((
        XRefEntry {
            offset,
            generation,
            in_use,
        },
        pos,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::ObjectId;

    const SECTION: &[u8] = b"xref\n0 3\n0000000000 65535 f \n0000000015 00000 n \n0000000094 00002 n \n7 1\n0000000200 00000 n \ntrailer\n<< /Size 8 /Root 1 0 R >>\nstartxref\n0\n%%EOF\n";

    #[test]
    fn test_parse_section() {
        let section = parse_section(SECTION, 0, false).unwrap();

        assert_eq!(section.entries.len(), 4);
        assert!(!section.entries[&0].in_use);
        assert_eq!(
            section.entries[&2],
            XRefEntry {
                offset: 94,
                generation: 2,
                in_use: true
            }
        );
        assert_eq!(section.entries[&7].offset, 200);
        assert_eq!(section.trailer.get_integer("Size"), Some(8));
        assert_eq!(
            section.trailer.get_reference("Root"),
            Some(ObjectId::new(1, 0))
        );
    }

    #[test]
    fn test_find_startxref() {
        assert_eq!(find_startxref(SECTION).unwrap(), 0);
        assert!(find_startxref(b"%PDF-1.4\nno tail").is_err());
    }

    #[test]
    fn test_startxref_only_searched_near_end() {
        let mut data = b"startxref\n77\n".to_vec();
        data.extend(std::iter::repeat(b' ').take(2 * STARTXREF_WINDOW));
        assert!(find_startxref(&data).is_err());
    }

    #[test]
    fn test_short_entries_need_lenient_mode() {
        // 19-byte entries: single-byte EOL without the trailing space
        let data = b"xref\n0 2\n0000000000 65535 f\n0000000017 00000 n\ntrailer\n<< /Size 2 >>";

        assert!(parse_section(data, 0, false).is_err());

        let section = parse_section(data, 0, true).unwrap();
        assert_eq!(section.entries[&1].offset, 17);
        assert!(section.entries[&1].in_use);
    }

    #[test]
    fn test_section_must_start_with_xref() {
        assert!(matches!(
            parse_section(b"1 0 obj null endobj", 0, true),
            Err(ParseError::InvalidXRef)
        ));
    }

    #[test]
    fn test_trailer_must_be_dictionary() {
        let data = b"xref\n0 1\n0000000000 65535 f \ntrailer\n[1 2]";
        assert!(matches!(
            parse_section(data, 0, true),
            Err(ParseError::InvalidTrailer)
        ));
    }
}
