//! Metadata tree assembled from the header record.

use crate::core::band::flags;
use crate::io::codes::{self, CodeTable};
use crate::io::layout::{self, field, FieldDef, FieldTable, FieldType};
use crate::io::store::{Record, ScanLineStore};
use crate::types::{utc_from_day_of_year, AvhrrResult, FormatFamily, Orientation};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Value of a metadata attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(i64),
    Float(f64),
    Text(String),
    Time(DateTime<Utc>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataAttribute {
    pub name: String,
    pub value: AttributeValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl MetadataAttribute {
    pub fn new(name: impl Into<String>, value: AttributeValue) -> Self {
        Self { name: name.into(), value, description: None }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Named node of the metadata tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataElement {
    pub name: String,
    pub attributes: Vec<MetadataAttribute>,
    pub elements: Vec<MetadataElement>,
}

impl MetadataElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: Vec::new(), elements: Vec::new() }
    }

    pub fn add_attribute(&mut self, attribute: MetadataAttribute) {
        self.attributes.push(attribute);
    }

    pub fn add(&mut self, name: &str, value: AttributeValue) {
        self.add_attribute(MetadataAttribute::new(name, value));
    }

    pub fn add_element(&mut self, element: MetadataElement) {
        self.elements.push(element);
    }

    pub fn attribute(&self, name: &str) -> Option<&MetadataAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn element(&self, name: &str) -> Option<&MetadataElement> {
        self.elements.iter().find(|e| e.name == name)
    }
}

/// File-level facts the header alone does not give
#[derive(Debug, Clone)]
pub struct ProductSummary {
    pub product_name: String,
    pub family: FormatFamily,
    pub format_version: u16,
    pub spacecraft: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub width: usize,
    pub height: usize,
    pub orientation: Orientation,
    pub has_cloud_band: bool,
}

pub const ROOT: &str = "metadata";
pub const PRODUCT: &str = "PRODUCT_INFO";
pub const HEADER: &str = "DATA_SET_HEADER";
pub const ARCHIVE_HEADER: &str = "ARCHIVE_HEADER";
pub const FLAG_CODING: &str = "FLAG_CODING";
pub const CLOUD_CODING: &str = "CLOUD_CODING";

/// Build the full metadata tree of an open file
pub fn assemble(store: &ScanLineStore, summary: &ProductSummary) -> AvhrrResult<MetadataElement> {
    let mut root = MetadataElement::new(ROOT);
    root.add_element(product_element(store, summary));
    root.add_element(header_element(store)?);
    if store.format().has_archive_prefix {
        root.add_element(archive_element(store)?);
    }
    root.add_element(flag_coding());
    if summary.has_cloud_band {
        root.add_element(code_element(CLOUD_CODING, codes::CLAVR_CLASSES));
    }
    Ok(root)
}

fn product_element(store: &ScanLineStore, summary: &ProductSummary) -> MetadataElement {
    let format = store.format();
    let mut el = MetadataElement::new(PRODUCT);
    el.add("product_name", AttributeValue::Text(summary.product_name.clone()));
    el.add("format", AttributeValue::Text(summary.family.to_string()));
    el.add("format_version", AttributeValue::Int(i64::from(summary.format_version)));
    el.add("spacecraft", AttributeValue::Text(summary.spacecraft.clone()));
    el.add("product_type", AttributeValue::Text(format!("{:?}", format.dimension).to_uppercase()));
    el.add("bits_per_count", AttributeValue::Int(i64::from(format.packing.bits())));
    el.add("scene_width", AttributeValue::Int(summary.width as i64));
    el.add("scene_height", AttributeValue::Int(summary.height as i64));
    el.add("orientation", AttributeValue::Text(format!("{:?}", summary.orientation).to_lowercase()));
    el.add("archive_prefix_length", AttributeValue::Int(format.prefix_length as i64));
    if let Some(t) = summary.start_time {
        el.add("start_time", AttributeValue::Time(t));
    }
    if let Some(t) = summary.end_time {
        el.add("end_time", AttributeValue::Time(t));
    }
    el
}

fn header_element(store: &ScanLineStore) -> AvhrrResult<MetadataElement> {
    let mut el = MetadataElement::new(HEADER);
    for def in store.layout().header.iter() {
        let value = header_value(store, def)?;
        el.add_attribute(MetadataAttribute::new(def.name, value));
    }
    Ok(el)
}

fn header_value(store: &ScanLineStore, def: &FieldDef) -> AvhrrResult<AttributeValue> {
    let record = Record::Header;
    let family = store.layout().family;
    Ok(match def.kind {
        FieldType::Ascii(_) => {
            let text = store.read_ascii(record, def.name)?;
            match def.codes {
                Some(table) => AttributeValue::Text(coded_site(table, &text)),
                None => AttributeValue::Text(text),
            }
        }
        FieldType::Bytes(_) => {
            let bytes = store.field(record, def.name)?;
            match layout::pod_time_code(&bytes).and_then(|(y, d, ms)| utc_from_day_of_year(y, d, ms)) {
                Some(t) => AttributeValue::Time(t),
                None => AttributeValue::IntArray(bytes.iter().map(|&b| i64::from(b)).collect()),
            }
        }
        FieldType::U8Array(_) | FieldType::I16Array(_) | FieldType::I32Array(_) => match def.scale {
            Some(_) => AttributeValue::FloatArray(store.read_scaled_array(record, def.name)?),
            None => AttributeValue::IntArray(store.integers(record, def.name)?),
        },
        _ if family == FormatFamily::Pod && def.name == field::DATA_TYPE => {
            let code = i64::from(store.read_u8(record, def.name)? >> 4);
            AttributeValue::Text(codes::lookup(codes::POD_DATA_TYPES, code))
        }
        _ => {
            let raw = store.integers(record, def.name)?.first().copied().unwrap_or(0);
            match (def.codes, def.scale) {
                (Some(table), _) => AttributeValue::Text(codes::lookup(table, raw)),
                (None, Some(scale)) => AttributeValue::Float(raw as f64 * scale),
                (None, None) => AttributeValue::Int(raw),
            }
        }
    })
}

/// Creation sites are keyed by the index of their 3-letter code
fn coded_site(table: CodeTable, code: &str) -> String {
    match codes::creation_site_index(code.as_bytes()) {
        Some(index) => codes::lookup(table, index as i64),
        None => format!("unknown code: {}", code),
    }
}

fn archive_element(store: &ScanLineStore) -> AvhrrResult<MetadataElement> {
    let mut el = MetadataElement::new(ARCHIVE_HEADER);
    let prefix_length = store.format().prefix_length;
    el.add("length", AttributeValue::Int(prefix_length as i64));
    if store.layout().family == FormatFamily::Pod {
        let tbm: FieldTable = layout::tbm_fields();
        let bytes = store.prefix_bytes()?;
        for def in tbm.iter() {
            if let Some(slice) = def.slice(&bytes) {
                el.add(def.name, AttributeValue::Text(layout::ascii(slice)));
            }
        }
    }
    Ok(el)
}

fn flag_coding() -> MetadataElement {
    let mut el = MetadataElement::new(FLAG_CODING);
    for (name, mask, description) in flags::CODING {
        let attribute = MetadataAttribute::new(name, AttributeValue::Int(i64::from(mask)));
        el.add_attribute(attribute.with_description(description));
    }
    el
}

fn code_element(name: &str, table: CodeTable) -> MetadataElement {
    let mut el = MetadataElement::new(name);
    for &(code, label) in table {
        el.add(label, AttributeValue::Int(code));
    }
    el
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_lookup() {
        let mut root = MetadataElement::new(ROOT);
        let mut child = MetadataElement::new(HEADER);
        child.add("spacecraft_id", AttributeValue::Text(codes::lookup(codes::KLM_SPACECRAFT, 99)));
        root.add_element(child);
        let value = &root.element(HEADER).unwrap().attribute("spacecraft_id").unwrap().value;
        assert_eq!(value, &AttributeValue::Text("unknown code: 99".to_string()));
        assert!(root.element("missing").is_none());
    }

    #[test]
    fn test_flag_coding_lists_every_flag() {
        let el = flag_coding();
        assert_eq!(el.attributes.len(), 6);
        let three_a = el.attribute("CHANNEL_3A").unwrap();
        assert_eq!(three_a.value, AttributeValue::Int(0x20));
        assert!(three_a.description.is_some());
    }

    #[test]
    fn test_coded_site() {
        assert!(coded_site(codes::CREATION_SITES, "NSS").starts_with("National Environmental"));
        assert_eq!(coded_site(codes::CREATION_SITES, "XYZ"), "unknown code: XYZ");
    }
}
