//! Small pull-parser helpers for the XML answers of the platform and its
//! analytics API. Element names are matched on their local name, so prefixed
//! and default-namespace documents behave the same.

use std::collections::BTreeMap;

use quick_xml::events::Event;
use quick_xml::Reader;

/// Text of the first `child` element inside the first `parent` element.
pub fn first_text_in(xml: &str, parent: &str, child: &str) -> Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let (parent, child) = (parent.as_bytes(), child.as_bytes());
    let mut in_parent = false;
    let mut in_child = false;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name();
                if !in_parent && name.as_ref() == parent {
                    in_parent = true;
                } else if in_parent && name.as_ref() == child {
                    in_child = true;
                }
            }
            Event::Empty(e) if in_parent && e.local_name().as_ref() == child => {
                return Ok(Some(String::new()));
            }
            Event::Text(t) if in_child => text.push_str(&t.unescape()?),
            Event::CData(t) if in_child => text.push_str(&String::from_utf8_lossy(&t)),
            Event::End(e) => {
                let name = e.local_name();
                if in_child && name.as_ref() == child {
                    return Ok(Some(text));
                }
                if in_parent && name.as_ref() == parent {
                    return Ok(None);
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Direct children of the first `parent` element, name → text. Empty elements
/// map to an empty string; grandchildren are ignored.
pub fn child_texts(xml: &str, parent: &str) -> Result<BTreeMap<String, String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let parent = parent.as_bytes();
    let mut children = BTreeMap::new();
    // 0: outside parent, 1: inside parent, 2+: inside a child
    let mut depth = 0usize;
    let mut current: Option<String> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if depth == 0 {
                    if e.local_name().as_ref() == parent {
                        depth = 1;
                    }
                    continue;
                }
                if depth == 1 {
                    current = Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                    text.clear();
                }
                depth += 1;
            }
            Event::Empty(e) if depth == 1 => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                children.entry(name).or_insert_with(String::new);
            }
            Event::Text(t) if depth == 2 => text.push_str(&t.unescape()?),
            Event::End(_) if depth > 0 => {
                depth -= 1;
                match depth {
                    0 => return Ok(children),
                    1 => {
                        if let Some(name) = current.take() {
                            children.entry(name).or_insert_with(|| text.trim().to_string());
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => return Ok(children),
            _ => {}
        }
    }
}
