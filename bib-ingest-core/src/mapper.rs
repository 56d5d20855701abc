//! Builds the target bibliographic record from a normalized repository record.
//!
//! The mapping is pure: the same record and [`MappingConfig`] always produce the
//! same [`MappedRecord`]. Missing required fields fail that record only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MappingError;
use crate::marc::{DataField, MarcRecord};
use crate::record::{MappedRecord, NormalizedRecord, RecordSummary};

pub const BIB_LEADER: &str = "00000nam a2200000 c 4500";

/// Static, per-deployment values stamped onto every mapped record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// `040$a` and `520$5`.
    pub cataloging_agency: String,
    /// `040$b`.
    pub cataloging_language: String,
    /// Language of the resource, `008/35-37`.
    pub content_language: String,
    /// Place of publication code, `008/15-17`.
    pub country_code: String,
    /// Used in `008/07-10` when `260$c` has no year.
    pub fallback_year: Option<u16>,
    /// Publisher short names expanded in `264$b`, matched case-insensitively.
    pub publisher_aliases: BTreeMap<String, String>,
    /// Replaces the repository's `theses` genre in `502$b`.
    pub degree_label: String,
    pub keyword_prefix: String,
    pub physical_details: String,
    pub dimensions: String,
    pub genre_terms: Vec<GenreTerm>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreTerm {
    pub term: String,
    #[serde(default)]
    pub authority_id: Option<String>,
    pub source: String,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            cataloging_agency: "CH-ZuSLS EPFL".to_string(),
            cataloging_language: "fre".to_string(),
            content_language: "eng".to_string(),
            country_code: "sz".to_string(),
            fallback_year: None,
            publisher_aliases: BTreeMap::from([(
                "EPFL".to_string(),
                "Ecole Polytechnique Fédérale de Lausanne".to_string(),
            )]),
            degree_label: "Thèse".to_string(),
            keyword_prefix: "Mots-clés de l'auteur : ".to_string(),
            physical_details: "illustrations".to_string(),
            dimensions: "28 cm".to_string(),
            genre_terms: vec![
                GenreTerm {
                    term: "Thèses et écrits académiques".to_string(),
                    authority_id: Some("(IDREF)027253139".to_string()),
                    source: "idref".to_string(),
                },
                GenreTerm {
                    term: "Hochschulschrift".to_string(),
                    authority_id: None,
                    source: "gnd-content".to_string(),
                },
                GenreTerm {
                    term: "Tesi".to_string(),
                    authority_id: None,
                    source: "sbt12-content".to_string(),
                },
            ],
        }
    }
}

pub fn map(source: &NormalizedRecord, config: &MappingConfig) -> Result<MappedRecord, MappingError> {
    let src = source.marc();

    let source_id = required_identifier(src)?;
    let title = src
        .subfield("245", 'a')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(MappingError::MissingField("245$a"))?;

    let mut dst = MarcRecord::new(BIB_LEADER);
    dst.add_control_field("001", source_id.clone());
    dst.add_control_field("008", fixed_length_data(src, config));

    dst.add_field(
        DataField::new("040", ' ', ' ')
            .with_subfield('a', &config.cataloging_agency)
            .with_subfield('b', &config.cataloging_language)
            .with_subfield('e', "rda"),
    );

    let first_author = src
        .fields("700")
        .find_map(|f| f.subfield('a'))
        .map(str::to_string);

    let mut f100 = DataField::new("100", '1', ' ');
    if let Some(author) = &first_author {
        f100.add_subfield('a', author);
    }
    f100.add_subfield('4', "aut");
    dst.add_field(f100);

    let mut f245 = DataField::new("245", '1', '0').with_subfield('a', title);
    if let Some(subtitle) = src.subfield("245", 'b').filter(|s| !s.is_empty()) {
        f245.add_subfield('b', subtitle);
    }
    if let Some(statement) = first_author.as_deref().map(invert_name) {
        f245.add_subfield('c', statement);
    }
    dst.add_field(f245);

    let place = src.subfield("260", 'a');
    let publisher = src.subfield("260", 'b');
    let date = src.subfield("260", 'c');
    let mut f264 = DataField::new("264", ' ', '1');
    if let Some(place) = place {
        f264.add_subfield('a', place);
    }
    if let Some(publisher) = publisher {
        f264.add_subfield('b', expand_publisher(publisher, &config.publisher_aliases));
    }
    if let Some(date) = date {
        f264.add_subfield('c', date);
    }
    if !f264.subfields.is_empty() {
        dst.add_field(f264);
    }

    let mut f300 = DataField::new("300", ' ', ' ');
    if let Some(extent) = src.subfield("300", 'a').filter(|s| !s.trim().is_empty()) {
        f300.add_subfield('a', with_pages_suffix(extent));
    }
    f300.add_subfield('b', &config.physical_details);
    f300.add_subfield('c', &config.dimensions);
    dst.add_field(f300);

    dst.add_field(rda_field("336", "txt", "rdacontent"));
    dst.add_field(rda_field("337", "n", "rdamedia"));
    dst.add_field(rda_field("338", "nc", "rdacarrier"));

    let f502 = dissertation_note(src, config);
    if !f502.subfields.is_empty() {
        dst.add_field(f502);
    }

    dst.add_field(keywords_summary(src, config));

    for genre in &config.genre_terms {
        let mut f655 = DataField::new("655", ' ', '7').with_subfield('a', &genre.term);
        if let Some(id) = &genre.authority_id {
            f655.add_subfield('0', id);
        }
        f655.add_subfield('2', &genre.source);
        dst.add_field(f655);
    }

    dst.add_field(thesis_director(src));

    let summary = summarize(&dst);
    debug!(source_id = %source_id, fields = dst.data_fields.len(), "Mapped record");

    Ok(MappedRecord {
        source_id,
        record: dst,
        summary,
    })
}

fn required_identifier(src: &MarcRecord) -> Result<String, MappingError> {
    let id = src
        .control_field("001")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(MappingError::MissingField("001"))?;
    if id.chars().any(char::is_whitespace) {
        return Err(MappingError::Malformed {
            field: "001",
            reason: format!("identifier {id:?} contains whitespace"),
        });
    }
    Ok(id.to_string())
}

fn fixed_length_data(src: &MarcRecord, config: &MappingConfig) -> String {
    let year = src
        .subfield("260", 'c')
        .and_then(first_year)
        .or_else(|| config.fallback_year.map(|y| format!("{y:04}")))
        .unwrap_or_else(|| "uuuu".to_string());
    format!(
        "||||||s{year}    {country:<3}  a   m    00| | {lang:<3}  ",
        country = truncate(&config.country_code, 3),
        lang = truncate(&config.content_language, 3),
    )
}

fn truncate(value: &str, len: usize) -> String {
    value.chars().take(len).collect()
}

fn first_year(date: &str) -> Option<String> {
    let digits: Vec<char> = date.chars().collect();
    digits
        .windows(4)
        .find(|w| w.iter().all(char::is_ascii_digit))
        .map(|w| w.iter().collect())
}

fn rda_field(tag: &str, code: &str, vocabulary: &str) -> DataField {
    DataField::new(tag, ' ', ' ')
        .with_subfield('b', code)
        .with_subfield('2', vocabulary)
}

fn dissertation_note(src: &MarcRecord, config: &MappingConfig) -> DataField {
    let mut f502 = DataField::new("502", ' ', ' ');
    if let Some(genre) = src.subfield("336", 'a') {
        if genre.trim().eq_ignore_ascii_case("theses") {
            f502.add_subfield('b', &config.degree_label);
        } else {
            f502.add_subfield('b', genre);
        }
    }
    let place = src.subfield("260", 'a');
    let publisher = src.subfield("260", 'b');
    if place.is_some() || publisher.is_some() {
        let granting = format!("{} {}", publisher.unwrap_or(""), place.unwrap_or(""));
        f502.add_subfield('c', granting.trim());
    }
    if let Some(year) = src.subfield("920", 'b') {
        f502.add_subfield('d', year);
    }
    if let Some(number) = src.subfield("088", 'a') {
        f502.add_subfield('o', format!("n° {number}"));
    }
    f502
}

fn keywords_summary(src: &MarcRecord, config: &MappingConfig) -> DataField {
    let mut keywords: Vec<&str> = Vec::new();
    for kw in src.subfields_all("653", 'a').into_iter().map(str::trim) {
        if !kw.is_empty() && !keywords.contains(&kw) {
            keywords.push(kw);
        }
    }
    let mut f520 = DataField::new("520", ' ', ' ');
    if !keywords.is_empty() {
        let joined = keywords.join("; ").replace("||", "; ");
        f520.add_subfield('a', format!("{}{joined}", config.keyword_prefix));
    }
    f520.add_subfield('5', &config.cataloging_agency);
    f520
}

/// `720` with second indicator `2` wins, then any `720` with `$a`.
fn thesis_director(src: &MarcRecord) -> DataField {
    let director = src
        .fields("720")
        .find(|f| f.ind2 == '2' && f.has_subfield('a'))
        .or_else(|| src.fields("720").find(|f| f.has_subfield('a')))
        .and_then(|f| f.subfield('a'));

    let mut f700 = DataField::new("700", '1', ' ');
    if let Some(name) = director {
        f700.add_subfield('a', name);
    }
    f700.add_subfield('4', "dgs");
    f700
}

fn expand_publisher(publisher: &str, aliases: &BTreeMap<String, String>) -> String {
    let key = publisher.trim();
    aliases
        .iter()
        .find(|(short, _)| short.eq_ignore_ascii_case(key))
        .map(|(_, long)| long.clone())
        .unwrap_or_else(|| publisher.to_string())
}

/// `"Last, First Middle"` → `"First Middle Last"`.
pub fn invert_name(name: &str) -> String {
    let parts: Vec<&str> = name.split(',').map(str::trim).collect();
    if parts.len() < 2 {
        return name.to_string();
    }
    let firsts = parts[1..].join(" ");
    format!("{} {}", firsts.trim(), parts[0]).trim().to_string()
}

fn with_pages_suffix(extent: &str) -> String {
    if extent.to_lowercase().contains("pages") {
        extent.to_string()
    } else {
        format!("{} pages", extent.trim())
    }
}

/// Title, author and statement of responsibility of a target record.
pub fn summarize(record: &MarcRecord) -> RecordSummary {
    let (title, responsibility) = match record.field("245") {
        Some(f245) => {
            let joined = [f245.subfield('a'), f245.subfield('b')]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
            let title = joined.trim_matches(|c| c == ' ' || c == '/').to_string();
            (
                Some(title).filter(|t| !t.is_empty()),
                f245.subfield('c').map(str::to_string),
            )
        }
        None => (None, None),
    };
    RecordSummary {
        title,
        author: record.subfield("100", 'a').map(str::to_string),
        responsibility,
    }
}
