//! Markup sanitizer for the title statement.
//!
//! Repository exports carry HTML fragments (`<i>`, `<sup>`, `&amp;`, ...) in
//! titles. [`normalize`] strips tags, decodes or drops entities and collapses
//! whitespace, repeating until the text stops changing. Every pass that changes
//! the text makes it strictly shorter, so the loop terminates and the result is
//! a fixed point: `normalize(normalize(x)) == normalize(x)`.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::record::{NormalizedRecord, SourceRecord};

static COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));
static TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?([A-Za-z][A-Za-z0-9]*)\b[^<>]*>").expect("static regex"));
static ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9A-Fa-f]{1,6}|[A-Za-z][A-Za-z0-9]{1,31});")
        .expect("static regex")
});
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Title subfields that are sanitized; everything else passes through.
const TITLE_SUBFIELDS: [char; 3] = ['a', 'b', 'c'];

/// Tags whose removal should leave a word break behind.
const BLOCK_TAGS: [&str; 10] = ["br", "p", "div", "li", "ul", "ol", "tr", "td", "h1", "h2"];

pub fn normalize(text: &str) -> String {
    let mut current = single_pass(text);
    loop {
        let next = single_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn single_pass(text: &str) -> String {
    let without_comments = COMMENT.replace_all(text, "");
    let without_tags = TAG.replace_all(&without_comments, |caps: &Captures| {
        let name = caps[1].to_ascii_lowercase();
        if BLOCK_TAGS.contains(&name.as_str()) {
            " "
        } else {
            ""
        }
    });
    let decoded = ENTITY.replace_all(&without_tags, |caps: &Captures| decode_entity(&caps[1]));
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}

/// Decode one entity body (the part between `&` and `;`). Unknown names and
/// control characters decode to nothing.
fn decode_entity(body: &str) -> String {
    let decoded = if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
    } else if let Some(dec) = body.strip_prefix('#') {
        dec.parse::<u32>().ok().and_then(char::from_u32)
    } else {
        named_entity(body)
    };
    match decoded {
        Some(c) if c.is_control() && !c.is_whitespace() => String::new(),
        Some(c) => c.to_string(),
        None => String::new(),
    }
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '–',
        "mdash" => '—',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "laquo" => '«',
        "raquo" => '»',
        "hellip" => '…',
        "middot" => '·',
        "deg" => '°',
        "times" => '×',
        "copy" => '©',
        "reg" => '®',
        "agrave" => 'à',
        "acirc" => 'â',
        "auml" => 'ä',
        "ccedil" => 'ç',
        "eacute" => 'é',
        "egrave" => 'è',
        "ecirc" => 'ê',
        "euml" => 'ë',
        "icirc" => 'î',
        "iuml" => 'ï',
        "ocirc" => 'ô',
        "ouml" => 'ö',
        "ucirc" => 'û',
        "ugrave" => 'ù',
        "uuml" => 'ü',
        "szlig" => 'ß',
        "Agrave" => 'À',
        "Auml" => 'Ä',
        "Eacute" => 'É',
        "Egrave" => 'È',
        "Ouml" => 'Ö',
        "Uuml" => 'Ü',
        "alpha" => 'α',
        "beta" => 'β',
        "gamma" => 'γ',
        "delta" => 'δ',
        "mu" => 'μ',
        "pi" => 'π',
        _ => return None,
    };
    Some(c)
}

/// Sanitize `245$a`, `$b` and `$c` of every `245` field; all other fields
/// are left untouched.
pub fn normalize_record(source: SourceRecord) -> NormalizedRecord {
    let mut marc = source.into_marc();
    for field in marc.fields_mut("245") {
        for sf in field
            .subfields
            .iter_mut()
            .filter(|sf| TITLE_SUBFIELDS.contains(&sf.code))
        {
            sf.value = normalize(&sf.value);
        }
    }
    NormalizedRecord::from_clean(marc)
}
