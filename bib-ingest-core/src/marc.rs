//! In-memory MARC record model and the MARCXML codec used on both ends of the
//! pipeline: parsing harvested `<collection>` pages and serialising the records
//! we send to the platform.
//!
//! Parsing accepts default-namespace (`<record xmlns="...">`), prefixed
//! (`<marc:record>`) and un-namespaced documents.

use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::se::to_string as xml_to_string;
use quick_xml::Reader;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

/// The MARCXML namespace URI.
pub const MARCXML_NS: &str = "http://www.loc.gov/MARC21/slim";

static XMLNS_DECL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\s+xmlns(?::\w+)?="[^"]*""#).expect("static regex"));
static NS_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<(/?)(\w+):").expect("static regex"));

#[derive(Debug, Error)]
pub enum MarcXmlError {
    #[error("invalid MARCXML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("cannot serialise MARCXML: {0}")]
    Serialize(#[from] quick_xml::DeError),
    #[error("expected <collection> or <record>, found <{0}>")]
    UnexpectedRoot(String),
    #[error("document ends inside an open element")]
    Truncated,
    #[error("no <record> in document")]
    NoRecord,
    #[error("subfield in field {0} has no code")]
    MissingSubfieldCode(String),
}

/// A MARC record: leader, control fields (001-009) and data fields, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarcRecord {
    pub leader: String,
    pub control_fields: Vec<ControlField>,
    pub data_fields: Vec<DataField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlField {
    pub tag: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataField {
    pub tag: String,
    pub ind1: char,
    pub ind2: char,
    pub subfields: Vec<Subfield>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subfield {
    pub code: char,
    pub value: String,
}

impl MarcRecord {
    pub fn new(leader: impl Into<String>) -> Self {
        Self {
            leader: leader.into(),
            ..Self::default()
        }
    }

    pub fn add_control_field(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        self.control_fields.push(ControlField {
            tag: tag.into(),
            value: value.into(),
        });
    }

    pub fn add_field(&mut self, field: DataField) {
        self.data_fields.push(field);
    }

    pub fn control_field(&self, tag: &str) -> Option<&str> {
        self.control_fields
            .iter()
            .find(|f| f.tag == tag)
            .map(|f| f.value.as_str())
    }

    /// All data fields carrying `tag`.
    pub fn fields<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a DataField> + 'a {
        self.data_fields.iter().filter(move |f| f.tag == tag)
    }

    pub fn fields_mut<'a>(&'a mut self, tag: &'a str) -> impl Iterator<Item = &'a mut DataField> + 'a {
        self.data_fields.iter_mut().filter(move |f| f.tag == tag)
    }

    pub fn field(&self, tag: &str) -> Option<&DataField> {
        self.data_fields.iter().find(|f| f.tag == tag)
    }

    /// First `$code` of the *first* field tagged `tag`.
    pub fn subfield(&self, tag: &str, code: char) -> Option<&str> {
        self.field(tag).and_then(|f| f.subfield(code))
    }

    /// Every `$code` value across all repetitions of `tag`.
    pub fn subfields_all(&self, tag: &str, code: char) -> Vec<&str> {
        self.data_fields
            .iter()
            .filter(|f| f.tag == tag)
            .flat_map(|f| f.subfields.iter())
            .filter(|sf| sf.code == code)
            .map(|sf| sf.value.as_str())
            .collect()
    }

    /// Serialise as a namespaced `<record>` element, without XML declaration,
    /// ready to be embedded into a larger document.
    pub fn to_marcxml(&self) -> Result<String, MarcXmlError> {
        let xml_record = XmlRecord {
            leader: self.leader.clone(),
            controlfield: self
                .control_fields
                .iter()
                .map(|cf| XmlControlField {
                    tag: cf.tag.clone(),
                    value: cf.value.clone(),
                })
                .collect(),
            datafield: self
                .data_fields
                .iter()
                .map(|df| XmlDataField {
                    tag: df.tag.clone(),
                    ind1: df.ind1.to_string(),
                    ind2: df.ind2.to_string(),
                    subfield: df
                        .subfields
                        .iter()
                        .map(|sf| XmlSubfield {
                            code: sf.code.to_string(),
                            value: sf.value.clone(),
                        })
                        .collect(),
                })
                .collect(),
        };
        let body = xml_to_string(&xml_record)?;
        Ok(body.replacen("<record>", &format!("<record xmlns=\"{MARCXML_NS}\">"), 1))
    }
}

impl DataField {
    pub fn new(tag: impl Into<String>, ind1: char, ind2: char) -> Self {
        Self {
            tag: tag.into(),
            ind1,
            ind2,
            subfields: Vec::new(),
        }
    }

    /// Builder-style append.
    pub fn with_subfield(mut self, code: char, value: impl Into<String>) -> Self {
        self.add_subfield(code, value);
        self
    }

    pub fn add_subfield(&mut self, code: char, value: impl Into<String>) {
        self.subfields.push(Subfield {
            code,
            value: value.into(),
        });
    }

    pub fn subfield(&self, code: char) -> Option<&str> {
        self.subfields
            .iter()
            .find(|sf| sf.code == code)
            .map(|sf| sf.value.as_str())
    }

    pub fn has_subfield(&self, code: char) -> bool {
        self.subfields.iter().any(|sf| sf.code == code)
    }
}

// ---------------------------------------------------------------------------
// Serialisation shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename = "record")]
struct XmlRecord {
    leader: String,
    controlfield: Vec<XmlControlField>,
    datafield: Vec<XmlDataField>,
}

#[derive(Debug, Serialize)]
struct XmlControlField {
    #[serde(rename = "@tag")]
    tag: String,
    #[serde(rename = "$value")]
    value: String,
}

#[derive(Debug, Serialize)]
struct XmlDataField {
    #[serde(rename = "@tag")]
    tag: String,
    #[serde(rename = "@ind1")]
    ind1: String,
    #[serde(rename = "@ind2")]
    ind2: String,
    subfield: Vec<XmlSubfield>,
}

#[derive(Debug, Serialize)]
struct XmlSubfield {
    #[serde(rename = "@code")]
    code: String,
    #[serde(rename = "$value")]
    value: String,
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Element whose text is being collected.
enum OpenText {
    Leader,
    Control(String),
    Subfield(char),
}

/// A `<record>` being read. Records that never receive a leader or a field
/// (e.g. the SRU envelope `<record>`) are dropped when they close.
#[derive(Default)]
struct PartialRecord {
    record: MarcRecord,
    has_content: bool,
    field: Option<DataField>,
}

impl PartialRecord {
    fn close_text(&mut self, open: OpenText, text: String) {
        match open {
            OpenText::Leader => self.record.leader = text,
            OpenText::Control(tag) => self.record.add_control_field(tag, text),
            OpenText::Subfield(code) => {
                if let Some(field) = self.field.as_mut() {
                    field.add_subfield(code, text);
                }
                return;
            }
        }
        self.has_content = true;
    }

    fn close_field(&mut self) {
        if let Some(field) = self.field.take() {
            self.record.add_field(field);
            self.has_content = true;
        }
    }
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, quick_xml::Error> {
    match e.try_get_attribute(name)? {
        Some(attr) => Ok(Some(attr.unescape_value()?.into_owned())),
        None => Ok(None),
    }
}

fn indicator(e: &BytesStart<'_>, name: &str) -> Result<char, quick_xml::Error> {
    Ok(attribute(e, name)?.and_then(|v| v.chars().next()).unwrap_or(' '))
}

/// Every MARC `<record>` in `xml`, at any depth, in document order.
///
/// Text is kept verbatim, so fixed-length control fields keep their padding.
/// Fields may appear in any order. With `marc_root`, the document element
/// must be `<collection>` or `<record>`.
fn read_records(xml: &str, marc_root: bool) -> Result<Vec<MarcRecord>, MarcXmlError> {
    let mut reader = Reader::from_str(xml);
    let mut records = Vec::new();
    let mut stack: Vec<PartialRecord> = Vec::new();
    let mut open: Option<OpenText> = None;
    let mut text = String::new();
    let mut depth = 0usize;

    loop {
        let (e, empty) = match reader.read_event()? {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::Text(t) if open.is_some() => {
                text.push_str(&t.unescape()?);
                continue;
            }
            Event::CData(t) if open.is_some() => {
                text.push_str(&String::from_utf8_lossy(&t));
                continue;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                match e.local_name().as_ref() {
                    b"leader" | b"controlfield" | b"subfield" => {
                        if let (Some(o), Some(current)) = (open.take(), stack.last_mut()) {
                            current.close_text(o, std::mem::take(&mut text));
                        }
                    }
                    b"datafield" => {
                        if let Some(current) = stack.last_mut() {
                            current.close_field();
                        }
                    }
                    b"record" => {
                        if let Some(done) = stack.pop().filter(|p| p.has_content) {
                            records.push(done.record);
                        }
                    }
                    _ => {}
                }
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        let name = e.local_name();
        if depth == 0 && marc_root && !matches!(name.as_ref(), b"collection" | b"record") {
            return Err(MarcXmlError::UnexpectedRoot(
                String::from_utf8_lossy(name.as_ref()).into_owned(),
            ));
        }
        if !empty {
            depth += 1;
        }

        if name.as_ref() == b"record" {
            if !empty {
                stack.push(PartialRecord::default());
            }
            continue;
        }
        let Some(current) = stack.last_mut() else {
            continue;
        };
        let opened = match name.as_ref() {
            b"leader" => Some(OpenText::Leader),
            b"controlfield" => Some(OpenText::Control(attribute(&e, "tag")?.unwrap_or_default())),
            b"datafield" => {
                let tag = attribute(&e, "tag")?.unwrap_or_default();
                current.field = Some(DataField::new(tag, indicator(&e, "ind1")?, indicator(&e, "ind2")?));
                if empty {
                    current.close_field();
                }
                None
            }
            b"subfield" => {
                let code = attribute(&e, "code")?.and_then(|c| c.chars().next()).ok_or_else(|| {
                    let tag = current.field.as_ref().map(|f| f.tag.clone()).unwrap_or_default();
                    MarcXmlError::MissingSubfieldCode(tag)
                })?;
                Some(OpenText::Subfield(code))
            }
            _ => None,
        };
        if let Some(o) = opened {
            if empty {
                current.close_text(o, String::new());
            } else {
                text.clear();
                open = Some(o);
            }
        }
    }

    if depth != 0 {
        return Err(MarcXmlError::Truncated);
    }
    Ok(records)
}

/// Drop namespace declarations and element prefixes (`<marc:record>` → `<record>`).
pub fn strip_namespaces(xml: &str) -> String {
    let stripped = XMLNS_DECL.replace_all(xml, "");
    NS_PREFIX.replace_all(&stripped, "<$1").into_owned()
}

/// Parse a MARCXML page. Accepts a `<collection>` or a lone `<record>`; an
/// empty body is an empty page.
pub fn parse_collection(xml: &str) -> Result<Vec<MarcRecord>, MarcXmlError> {
    if xml.trim().is_empty() {
        return Ok(Vec::new());
    }
    read_records(xml, true)
}

/// Parse one `<record>` element.
pub fn parse_record(xml: &str) -> Result<MarcRecord, MarcXmlError> {
    read_records(xml, true)?
        .into_iter()
        .next()
        .ok_or(MarcXmlError::NoRecord)
}

/// MARC records embedded anywhere in another document, such as an SRU response.
pub fn parse_embedded_records(xml: &str) -> Result<Vec<MarcRecord>, MarcXmlError> {
    read_records(xml, false)
}
