//! Parsing of Celcat event descriptions.
//!
//! Celcat packs the useful fields of an event into an HTML snippet where
//! every field sits on its own `<br />`-separated line:
//!
//! ```text
//! CM<br />Amphi A<br />Algorithmique [IN301]<br />...
//! ```

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Node};

use crate::DescriptionFields;

static UE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\w+)\]").expect("UE pattern is a valid regex"));

const LINE_BREAK_TAG: &str = "<br />";

/// Extract `Type`, `Salle` and `UE` from a raw description.
pub fn extract(raw_description: &str) -> DescriptionFields {
    let text = decode_html(raw_description);
    let lines: Vec<&str> = text
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let mut fields = DescriptionFields::default();
    let Some((first, rest)) = lines.split_first() else {
        return fields;
    };
    fields.event_type = Some((*first).to_string());
    fields.room = rest.first().map(|line| (*line).to_string());
    fields.course_code = rest.iter().skip(1).find_map(|line| {
        UE_PATTERN
            .captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    });
    fields
}

/// Decode entities and turn `<br>` tags into newlines.
///
/// A `<br />` that only appears once entities are decoded (`&lt;br /&gt;`)
/// counts as a line break too. Any other raw markup is parsed as HTML and
/// only its text survives: `TD <Groupe A>` reads as `TD`. A `<` that cannot
/// open a tag (`a < b`) stays as text.
fn decode_html(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let mut text = String::with_capacity(raw.len());
    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Text(t) => text.push_str(t),
            Node::Element(e) if e.name() == "br" => text.push('\n'),
            _ => {}
        }
    }
    text.replace(LINE_BREAK_TAG, "\n")
}
