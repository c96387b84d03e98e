//! Record-level access to an open Level-1B file.
//!
//! Translates `(record, field name)` into a byte range through the file
//! layout and performs exactly one positioned read per request. No read
//! buffer survives a call, so a store can be shared between threads.

use crate::io::detect::DetectedFormat;
use crate::io::layout::{self, FieldDef, FieldTable, FieldType, FileLayout};
use crate::io::source::ByteSource;
use crate::types::{AvhrrError, AvhrrResult};
use std::sync::Arc;

/// A record of the file: the header (virtual scan line -1) or a data record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Header,
    Line(usize),
}

/// Raw scan line index bound to its byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLine {
    pub index: usize,
    pub offset: u64,
}

/// Positioned field reads over the records of one file
#[derive(Clone)]
pub struct ScanLineStore {
    source: Arc<dyn ByteSource>,
    layout: Arc<FileLayout>,
    format: DetectedFormat,
}

impl ScanLineStore {
    pub fn new(source: Arc<dyn ByteSource>, layout: Arc<FileLayout>, format: DetectedFormat) -> Self {
        Self { source, layout, format }
    }

    pub fn layout(&self) -> &FileLayout {
        &self.layout
    }

    pub fn format(&self) -> &DetectedFormat {
        &self.format
    }

    pub fn record_count(&self) -> usize {
        self.format.record_count
    }

    pub fn scan_line(&self, index: usize) -> AvhrrResult<ScanLine> {
        self.check_index(index)?;
        Ok(ScanLine { index, offset: self.format.line_offset(index) })
    }

    fn check_index(&self, index: usize) -> AvhrrResult<()> {
        if index >= self.format.record_count {
            return Err(AvhrrError::OutOfRange { index, count: self.format.record_count });
        }
        Ok(())
    }

    fn table(&self, record: Record) -> &FieldTable {
        match record {
            Record::Header => &self.layout.header,
            Record::Line(_) => &self.layout.record,
        }
    }

    /// Absolute byte offset and definition of a field
    pub fn locate(&self, record: Record, name: &str) -> AvhrrResult<(u64, &FieldDef)> {
        let base = match record {
            Record::Header => self.format.header_offset(),
            Record::Line(index) => self.scan_line(index)?.offset,
        };
        let def = self.table(record).get(name)?;
        Ok((base + def.offset as u64, def))
    }

    /// Bytes of the archive prefix, empty when the file has none
    pub fn prefix_bytes(&self) -> AvhrrResult<Vec<u8>> {
        let mut buf = vec![0u8; self.format.prefix_length];
        self.source.read_at(0, &mut buf)?;
        Ok(buf)
    }

    /// Raw bytes of a field
    pub fn field(&self, record: Record, name: &str) -> AvhrrResult<Vec<u8>> {
        let (offset, def) = self.locate(record, name)?;
        let mut buf = vec![0u8; def.byte_width()];
        self.source.read_at(offset, &mut buf)?;
        Ok(buf)
    }

    /// Integer elements of a numeric field (scalars yield one element)
    pub fn integers(&self, record: Record, name: &str) -> AvhrrResult<Vec<i64>> {
        let (offset, def) = self.locate(record, name)?;
        let mut buf = vec![0u8; def.byte_width()];
        self.source.read_at(offset, &mut buf)?;
        decode_integers(def, &buf)
    }

    fn scalar(&self, record: Record, name: &str) -> AvhrrResult<i64> {
        let values = self.integers(record, name)?;
        values
            .first()
            .copied()
            .ok_or_else(|| AvhrrError::InvalidRequest(format!("field '{}' is empty", name)))
    }

    pub fn read_u8(&self, record: Record, name: &str) -> AvhrrResult<u8> {
        Ok(self.scalar(record, name)? as u8)
    }

    pub fn read_u16(&self, record: Record, name: &str) -> AvhrrResult<u16> {
        Ok(self.scalar(record, name)? as u16)
    }

    pub fn read_i16(&self, record: Record, name: &str) -> AvhrrResult<i16> {
        Ok(self.scalar(record, name)? as i16)
    }

    pub fn read_u32(&self, record: Record, name: &str) -> AvhrrResult<u32> {
        Ok(self.scalar(record, name)? as u32)
    }

    pub fn read_i32(&self, record: Record, name: &str) -> AvhrrResult<i32> {
        Ok(self.scalar(record, name)? as i32)
    }

    pub fn read_i32_array(&self, record: Record, name: &str) -> AvhrrResult<Vec<i32>> {
        Ok(self.integers(record, name)?.into_iter().map(|v| v as i32).collect())
    }

    pub fn read_ascii(&self, record: Record, name: &str) -> AvhrrResult<String> {
        Ok(layout::ascii(&self.field(record, name)?))
    }

    /// Physical value of a scalar field (stored value times its scale factor)
    pub fn read_scaled(&self, record: Record, name: &str) -> AvhrrResult<f64> {
        let scale = self.table(record).get(name)?.scale.unwrap_or(1.0);
        Ok(self.scalar(record, name)? as f64 * scale)
    }

    /// Physical values of every element of a numeric field
    pub fn read_scaled_array(&self, record: Record, name: &str) -> AvhrrResult<Vec<f64>> {
        let scale = self.table(record).get(name)?.scale.unwrap_or(1.0);
        Ok(self.integers(record, name)?.into_iter().map(|v| v as f64 * scale).collect())
    }
}

fn decode_integers(def: &FieldDef, buf: &[u8]) -> AvhrrResult<Vec<i64>> {
    let values = match def.kind {
        FieldType::U8 | FieldType::U8Array(_) => buf.iter().map(|&b| i64::from(b)).collect(),
        FieldType::U16 => buf
            .chunks_exact(2)
            .map(|c| i64::from(u16::from_be_bytes([c[0], c[1]])))
            .collect(),
        FieldType::I16 | FieldType::I16Array(_) => buf
            .chunks_exact(2)
            .map(|c| i64::from(i16::from_be_bytes([c[0], c[1]])))
            .collect(),
        FieldType::U32 => buf
            .chunks_exact(4)
            .map(|c| i64::from(u32::from_be_bytes([c[0], c[1], c[2], c[3]])))
            .collect(),
        FieldType::I32 | FieldType::I32Array(_) => buf
            .chunks_exact(4)
            .map(|c| i64::from(i32::from_be_bytes([c[0], c[1], c[2], c[3]])))
            .collect(),
        FieldType::Ascii(_) | FieldType::Bytes(_) => {
            return Err(AvhrrError::InvalidRequest(format!(
                "field '{}' is not numeric",
                def.name
            )))
        }
    };
    Ok(values)
}
