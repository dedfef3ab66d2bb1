//! Byte-level scanner locating object definitions and trailers.

use crate::error::{PdfError, Result};
use crate::objects::ObjectId;
use regex::bytes::Regex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Bytes examined per chunk.
pub const CHUNK_SIZE: usize = 64 * 1024;
/// Context added on both sides of a chunk so that matches straddling a
/// boundary are seen whole.
pub const CHUNK_OVERLAP: usize = 256;

const OBJECT_PATTERN: &str = r"(?-u)\b(\d{1,10})[ \t\r\n\f\x00]+(\d{1,5})[ \t\r\n\f\x00]+obj\b";
const TRAILER_PATTERN: &str = r"(?-u)\btrailer[ \t\r\n\f\x00]*<<";

/// Scan statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    pub bytes_scanned: u64,
    pub chunks: usize,
    /// Object headers matched, duplicates included
    pub objects_found: usize,
    /// Headers whose identifier had already been seen earlier in the file
    pub duplicates: usize,
    pub trailers_found: usize,
}

/// Result of scanning operation
#[derive(Debug, Default, Clone)]
pub struct ScanResult {
    /// Identifier → offset of its physically last definition
    pub objects: BTreeMap<ObjectId, u64>,
    /// Offset of the `<<` opening the physically last trailer dictionary
    pub last_trailer: Option<u64>,
    pub stats: ScanStats,
}

impl ScanResult {
    /// Identifiers ordered by their offset in the file
    pub fn in_file_order(&self) -> Vec<(ObjectId, u64)> {
        let mut ordered: Vec<_> = self.objects.iter().map(|(id, pos)| (*id, *pos)).collect();
        ordered.sort_by_key(|(_, pos)| *pos);
        ordered
    }
}

/// Scanner for finding `n g obj` headers and `trailer <<` markers
pub struct ObjectScanner {
    object_pattern: Regex,
    trailer_pattern: Regex,
    chunk_size: usize,
}

impl ObjectScanner {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| PdfError::InvalidStructure(format!("scanner pattern: {e}")))
        };
        Ok(Self {
            object_pattern: compile(OBJECT_PATTERN)?,
            trailer_pattern: compile(TRAILER_PATTERN)?,
            chunk_size: CHUNK_SIZE,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Scans `data` chunk by chunk. Later definitions of an identifier
    /// replace earlier ones.
    pub fn scan(&self, data: &[u8]) -> ScanResult {
        let mut result = ScanResult::default();

        let mut chunk_start = 0;
        while chunk_start < data.len() {
            let chunk_end = (chunk_start + self.chunk_size).min(data.len());
            let window_start = chunk_start.saturating_sub(CHUNK_OVERLAP);
            let window_end = (chunk_end + CHUNK_OVERLAP).min(data.len());
            let window = &data[window_start..window_end];
            let owns = |start: usize| (chunk_start..chunk_end).contains(&(window_start + start));

            for captures in self.object_pattern.captures_iter(window) {
                let Some(whole) = captures.get(0) else {
                    continue;
                };
                if !owns(whole.start()) {
                    continue;
                }
                let number = captures.get(1).and_then(|m| parse_number::<u32>(m.as_bytes()));
                let generation = captures.get(2).and_then(|m| parse_number::<u16>(m.as_bytes()));
                let (Some(number), Some(generation)) = (number, generation) else {
                    continue;
                };

                let id = ObjectId::new(number, generation);
                let offset = (window_start + whole.start()) as u64;
                result.stats.objects_found += 1;
                if let Some(previous) = result.objects.insert(id, offset) {
                    result.stats.duplicates += 1;
                    warn!(object = %id, previous, offset, "object defined twice, keeping the later definition");
                }
            }

            for found in self.trailer_pattern.find_iter(window) {
                if owns(found.start()) {
                    result.stats.trailers_found += 1;
                    result.last_trailer = Some((window_start + found.end() - 2) as u64);
                }
            }

            result.stats.chunks += 1;
            result.stats.bytes_scanned += (chunk_end - chunk_start) as u64;
            chunk_start = chunk_end;
        }

        debug!(
            objects = result.objects.len(),
            duplicates = result.stats.duplicates,
            trailers = result.stats.trailers_found,
            "scanned file for object definitions"
        );
        result
    }
}

fn parse_number<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    std::str::from_utf8(digits).ok()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_finds_objects_and_trailer() {
        let data = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n12 3 obj 5 endobj\ntrailer\n<< /Size 13 >>";
        let result = ObjectScanner::new().unwrap().scan(data);

        assert_eq!(result.objects.len(), 2);
        assert_eq!(result.objects[&ObjectId::new(1, 0)], 9);
        assert!(result.objects.contains_key(&ObjectId::new(12, 3)));
        let trailer_at = result.last_trailer.unwrap() as usize;
        assert!(data[trailer_at..].starts_with(b"<< /Size"));
    }

    #[test]
    fn test_last_definition_wins() {
        let data = b"4 0 obj 1 endobj\n4 0 obj 2 endobj\n";
        let result = ObjectScanner::new().unwrap().scan(data);

        assert_eq!(result.objects[&ObjectId::new(4, 0)], 17);
        assert_eq!(result.stats.objects_found, 2);
        assert_eq!(result.stats.duplicates, 1);
    }

    #[test]
    fn test_number_suffixes_are_not_matched() {
        let data = b"x312 0 obj endobj 7 0 objection";
        let result = ObjectScanner::new().unwrap().scan(data);
        assert!(result.objects.is_empty());
    }

    #[test]
    fn test_matches_across_chunk_boundaries_are_found_once() {
        let mut data = Vec::new();
        let mut expected = Vec::new();
        for number in 1..=200u32 {
            expected.push((ObjectId::new(number, 0), data.len() as u64));
            data.extend_from_slice(format!("{number} 0 obj\n<< /N {number} >>\nendobj\n").as_bytes());
        }

        for chunk_size in [7, 16, 100, CHUNK_SIZE] {
            let result = ObjectScanner::new()
                .unwrap()
                .with_chunk_size(chunk_size)
                .scan(&data);
            assert_eq!(result.in_file_order(), expected, "chunk size {chunk_size}");
            assert_eq!(result.stats.duplicates, 0);
        }
    }
}
