use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object, ObjectId, StringFormat};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Options applied when a document is saved.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Drop objects unreachable from the trailer before writing
    pub compact: bool,
    /// Renumber objects densely from 1 before writing
    pub renumber: bool,
    /// Flate-compress unfiltered streams
    pub compress_streams: bool,
    /// Header version; the document's own version when unset
    pub version: Option<String>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compact: true,
            renumber: false,
            compress_streams: false,
            version: None,
        }
    }
}

impl WriteOptions {
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    pub fn with_renumber(mut self, renumber: bool) -> Self {
        self.renumber = renumber;
        self
    }

    pub fn with_compress_streams(mut self, compress: bool) -> Self {
        self.compress_streams = compress;
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Serializes a document as a classic PDF file: header, every indirect
/// object of the cross-reference table, one xref section and the trailer.
pub struct PdfWriter<W: Write> {
    writer: W,
    xref_positions: BTreeMap<ObjectId, u64>,
    current_position: u64,
}

impl<W: Write> PdfWriter<W> {
    pub fn new_with_writer(writer: W) -> Self {
        Self {
            writer,
            xref_positions: BTreeMap::new(),
            current_position: 0,
        }
    }

    /// Offsets of the objects written so far
    pub fn positions(&self) -> &BTreeMap<ObjectId, u64> {
        &self.xref_positions
    }

    pub fn write_document(&mut self, document: &Document, options: &WriteOptions) -> Result<()> {
        let version = options
            .version
            .as_deref()
            .unwrap_or_else(|| document.version());
        self.write_header(version)?;

        let security = document
            .security_handler()
            .filter(|handler| handler.is_encryption_active());
        let encrypt_dict = document.trailer().encrypt();

        for reference in document.xref().iter() {
            let id = reference.id();
            let mut object = reference
                .value()
                .cloned()
                .ok_or_else(|| PdfError::InvalidStructure(format!("object {id} is unbound")))?;

            #[cfg(feature = "compression")]
            if options.compress_streams {
                if let Object::Stream(stream) = &mut object {
                    if !stream.is_filtered() {
                        stream.compress_flate()?;
                    }
                }
            }

            // The encryption dictionary itself is stored in clear text
            if let Some(handler) = security {
                if Some(id) != encrypt_dict {
                    handler.encrypt_object(id, &mut object)?;
                }
            }

            self.write_object(id, &object)?;
        }

        let xref_position = self.current_position;
        self.write_xref()?;

        let size = self
            .xref_positions
            .keys()
            .map(ObjectId::number)
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .ok_or_else(|| PdfError::InvalidStructure("object number overflows /Size".to_string()))?;
        let trailer = document.trailer().dictionary_for_writing(size);
        self.write_trailer(&trailer, xref_position)?;

        self.writer.flush()?;
        debug!(
            objects = self.xref_positions.len(),
            bytes = self.current_position,
            "wrote document"
        );
        Ok(())
    }

    fn write_header(&mut self, version: &str) -> Result<()> {
        self.write_bytes(format!("%PDF-{version}\n").as_bytes())?;
        // Binary comment to ensure file is treated as binary
        self.write_bytes(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n'])?;
        Ok(())
    }
}

impl PdfWriter<BufWriter<std::fs::File>> {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new_with_writer(BufWriter::new(file)))
    }
}

impl<W: Write> PdfWriter<W> {
    fn write_object(&mut self, id: ObjectId, object: &Object) -> Result<()> {
        self.xref_positions.insert(id, self.current_position);

        let header = format!("{} {} obj\n", id.number(), id.generation());
        self.write_bytes(header.as_bytes())?;

        self.write_object_value(object)?;

        self.write_bytes(b"\nendobj\n")?;
        Ok(())
    }

    fn write_object_value(&mut self, object: &Object) -> Result<()> {
        match object {
            Object::Null => self.write_bytes(b"null")?,
            Object::Boolean(b) => self.write_bytes(if *b { b"true" } else { b"false" })?,
            Object::Integer(i) => self.write_bytes(i.to_string().as_bytes())?,
            Object::Real(f) => self.write_bytes(format_real(*f).as_bytes())?,
            Object::String(bytes, StringFormat::Literal) => {
                self.write_bytes(&escape_literal_string(bytes))?;
            }
            Object::String(bytes, StringFormat::Hexadecimal) => {
                self.write_bytes(b"<")?;
                self.write_bytes(hex::encode_upper(bytes).as_bytes())?;
                self.write_bytes(b">")?;
            }
            Object::Name(n) => self.write_bytes(&escape_name(n))?,
            Object::Array(arr) => {
                self.write_bytes(b"[")?;
                for (i, obj) in arr.iter().enumerate() {
                    if i > 0 {
                        self.write_bytes(b" ")?;
                    }
                    self.write_object_value(obj)?;
                }
                self.write_bytes(b"]")?;
            }
            Object::Dictionary(dict) => self.write_dictionary(dict)?,
            Object::Stream(stream) => {
                // /Length always describes the bytes actually written
                let mut dict = stream.dictionary().clone();
                dict.set("Length", stream.data().len());
                self.write_dictionary(&dict)?;
                self.write_bytes(b"\nstream\n")?;
                self.write_bytes(stream.data())?;
                self.write_bytes(b"\nendstream")?;
            }
            Object::Reference(id) => {
                let ref_str = format!("{} {} R", id.number(), id.generation());
                self.write_bytes(ref_str.as_bytes())?;
            }
        }
        Ok(())
    }

    fn write_dictionary(&mut self, dict: &Dictionary) -> Result<()> {
        self.write_bytes(b"<<")?;
        for (key, value) in dict.iter() {
            self.write_bytes(b"\n")?;
            self.write_bytes(&escape_name(key))?;
            self.write_bytes(b" ")?;
            self.write_object_value(value)?;
        }
        self.write_bytes(b"\n>>")?;
        Ok(())
    }

    /// One subsection per run of consecutive object numbers. Every entry
    /// line is exactly 20 bytes.
    fn write_xref(&mut self) -> Result<()> {
        self.write_bytes(b"xref\n")?;

        let mut entries: Vec<(u32, u16, u64)> = vec![(0, 65535, 0)];
        entries.extend(
            self.xref_positions
                .iter()
                .map(|(id, pos)| (id.number(), id.generation(), *pos)),
        );

        let mut start = 0;
        while start < entries.len() {
            let mut end = start + 1;
            while end < entries.len() && entries[end].0 == entries[end - 1].0 + 1 {
                end += 1;
            }

            let header = format!("{} {}\n", entries[start].0, end - start);
            self.write_bytes(header.as_bytes())?;
            for &(number, generation, position) in &entries[start..end] {
                let line = if number == 0 {
                    "0000000000 65535 f \n".to_string()
                } else {
                    format!("{position:010} {generation:05} n \n")
                };
                self.write_bytes(line.as_bytes())?;
            }
            start = end;
        }

        Ok(())
    }

    fn write_trailer(&mut self, trailer: &Dictionary, xref_position: u64) -> Result<()> {
        self.write_bytes(b"trailer\n")?;
        self.write_dictionary(trailer)?;
        self.write_bytes(b"\nstartxref\n")?;
        self.write_bytes(xref_position.to_string().as_bytes())?;
        self.write_bytes(b"\n%%EOF\n")?;
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.current_position += data.len() as u64;
        Ok(())
    }
}

fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let formatted = format!("{value:.6}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "" | "-" | "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

fn escape_literal_string(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.push(b'(');
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(byte);
            }
            // A raw CR would be read back as LF
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(byte),
        }
    }
    out.push(b')');
    out
}

fn escape_name(name: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 1);
    out.push(b'/');
    for &byte in name.as_bytes() {
        let regular = (0x21..=0x7E).contains(&byte)
            && !matches!(
                byte,
                b'#' | b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
            );
        if regular {
            out.push(byte);
        } else {
            out.extend_from_slice(format!("#{byte:02X}").as_bytes());
        }
    }
    out
}

/// Format a DateTime as a PDF date string (D:YYYYMMDDHHmmSSOHH'mm)
pub(crate) fn format_pdf_date(date: DateTime<Utc>) -> String {
    let formatted = date.format("D:%Y%m%d%H%M%S");
    format!("{formatted}+00'00")
}
