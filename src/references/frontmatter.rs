//! Collection path lookup in a markdown document's frontmatter.

use crate::models::CollectionPath;
use serde_yaml::{Mapping, Value};
use tracing::debug;

/// The YAML between the opening `---` and the closing `---` or `...` fence
fn header(text: &str) -> Option<String> {
    let mut lines = text.lines();
    if lines.next()?.trim_start_matches('\u{feff}').trim_end() != "---" {
        return None;
    }

    let mut header = Vec::new();
    for line in lines {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            return Some(header.join("\n"));
        }
        header.push(line);
    }

    None
}

fn parse_header(yaml: &str) -> Option<Mapping> {
    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(map)) => Some(map),
        Ok(_) => None,
        Err(e) => {
            debug!("Ignoring unparseable frontmatter: {}", e);
            None
        }
    }
}

/// Collection path stored under the top-level `field` of the frontmatter.
///
/// Returns `None` when the document has no frontmatter, the header is not a
/// YAML mapping, or the field is absent, null, non-string or empty.
pub fn collection_path(text: &str, field: &str) -> Option<CollectionPath> {
    let map = parse_header(&header(text)?)?;
    let value = map.get(field)?.as_str()?.trim();
    (!value.is_empty()).then(|| CollectionPath::new(value))
}
