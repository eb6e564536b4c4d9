//! Bibliographic items, attachments and annotations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Citation key, e.g. `smith2020deep`
pub type CitationKey = String;

/// One exported record, untouched apart from being a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawItem(pub serde_json::Map<String, Value>);

impl RawItem {
    /// The citation key: CSL-JSON uses `id`, Better BibTeX JSON uses `citationKey`.
    pub fn citation_key(&self) -> Option<&str> {
        self.str_field("citationKey")
            .or_else(|| self.str_field("id"))
            .filter(|key| !key.is_empty())
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }
}

/// Publication date as exported: CSL `date-parts`, a literal, or nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssuedDate {
    DateParts(Vec<Vec<i32>>),
    Literal(String),
    Unknown,
}

impl IssuedDate {
    fn from_value(value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return IssuedDate::Unknown;
        };

        if let Some(parts) = value.get("date-parts").and_then(Value::as_array) {
            let parts: Vec<Vec<i32>> = parts
                .iter()
                .filter_map(Value::as_array)
                .map(|part| part.iter().filter_map(date_part).collect())
                .collect();
            return IssuedDate::DateParts(parts);
        }

        if let Some(literal) = value.get("literal").and_then(Value::as_str) {
            return IssuedDate::Literal(literal.to_string());
        }

        // Better BibTeX JSON carries a plain `date` string
        if let Some(literal) = value.as_str() {
            return IssuedDate::Literal(literal.to_string());
        }

        IssuedDate::Unknown
    }

    /// Year for display; empty when the date carries no year.
    pub fn year(&self) -> String {
        match self {
            IssuedDate::DateParts(parts) => parts
                .first()
                .and_then(|p| p.first())
                .map(|y| y.to_string())
                .unwrap_or_default(),
            IssuedDate::Literal(literal) => literal
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string(),
            IssuedDate::Unknown => String::new(),
        }
    }
}

fn date_part(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The fields the reference view needs from one exported record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographicItem {
    pub id: CitationKey,
    pub title: String,
    #[serde(rename = "container-title")]
    pub container_title: String,
    #[serde(rename = "container-title-short")]
    pub container_title_short: String,
    pub issued: IssuedDate,
}

impl BibliographicItem {
    /// Build from a CSL-JSON or Better BibTeX JSON record.
    ///
    /// Fails only when the record has no citation key.
    pub fn from_raw(raw: &RawItem) -> Result<Self, String> {
        let id = raw
            .citation_key()
            .ok_or_else(|| "exported item has no citation key".to_string())?
            .to_string();

        let text = |csl: &str, bbt: &str| {
            raw.str_field(csl)
                .or_else(|| raw.str_field(bbt))
                .unwrap_or_default()
                .to_string()
        };

        let issued = match raw.get("issued") {
            Some(value) => IssuedDate::from_value(Some(value)),
            None => IssuedDate::from_value(raw.get("date")),
        };

        Ok(Self {
            title: text("title", "title"),
            container_title: text("container-title", "publicationTitle"),
            container_title_short: text("container-title-short", "journalAbbreviation"),
            issued,
            id,
        })
    }

    /// Short container title when present, the full one otherwise
    pub fn journal(&self) -> &str {
        if self.container_title_short.is_empty() {
            &self.container_title
        } else {
            &self.container_title_short
        }
    }
}

/// A file attached to an item, with its annotations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRecord {
    /// `zotero://open-pdf/...` link
    pub open_link: String,
    pub annotations: Vec<AnnotationRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AnnotationKind {
    Highlight { text: String, color: String },
    Image { image_path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub key: String,
    pub comment: String,
    #[serde(flatten)]
    pub kind: AnnotationKind,
}

impl AnnotationRecord {
    /// Link that opens the attachment scrolled to this annotation
    pub fn deep_link(&self, open_link: &str) -> String {
        format!("{}?annotation={}", open_link, self.key)
    }

    /// Markdown quote of a highlight, cited and linked back to the annotation.
    pub fn quote(&self, citekey: &str, open_link: &str) -> Option<String> {
        match &self.kind {
            AnnotationKind::Highlight { text, .. } => Some(format!(
                "{}[@{}]\n[Link]({})\n",
                text,
                citekey,
                self.deep_link(open_link)
            )),
            AnnotationKind::Image { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawItem {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_csl_item() {
        let item = BibliographicItem::from_raw(&raw(json!({
            "id": "smith2020",
            "title": "Deep Things",
            "container-title": "Journal of Things",
            "container-title-short": "J. Things",
            "issued": {"date-parts": [[2020, 3]]}
        })))
        .unwrap();

        assert_eq!(item.id, "smith2020");
        assert_eq!(item.journal(), "J. Things");
        assert_eq!(item.issued.year(), "2020");
    }

    #[test]
    fn test_better_bibtex_item() {
        let item = BibliographicItem::from_raw(&raw(json!({
            "citationKey": "doe2019",
            "title": "Shallow Things",
            "publicationTitle": "Things Quarterly",
            "date": "2019-05-01"
        })))
        .unwrap();

        assert_eq!(item.id, "doe2019");
        assert_eq!(item.journal(), "Things Quarterly");
        assert_eq!(item.issued.year(), "2019-05-01");
    }

    #[test]
    fn test_literal_and_string_date_parts() {
        let literal = IssuedDate::from_value(Some(&json!({"literal": "Spring 2021"})));
        assert_eq!(literal.year(), "Spring");

        let parts = IssuedDate::from_value(Some(&json!({"date-parts": [["1999", "12"]]})));
        assert_eq!(parts, IssuedDate::DateParts(vec![vec![1999, 12]]));

        assert_eq!(IssuedDate::from_value(None).year(), "");
        assert_eq!(IssuedDate::DateParts(vec![vec![]]).year(), "");
    }

    #[test]
    fn test_item_without_key_is_rejected() {
        assert!(BibliographicItem::from_raw(&raw(json!({"title": "Nameless"}))).is_err());
        assert!(BibliographicItem::from_raw(&raw(json!({"id": ""}))).is_err());
    }

    #[test]
    fn test_annotation_quote() {
        let highlight = AnnotationRecord {
            key: "ANN1".to_string(),
            comment: String::new(),
            kind: AnnotationKind::Highlight {
                text: "important".to_string(),
                color: "#ffd400".to_string(),
            },
        };
        let open = "zotero://open-pdf/library/items/PDF1";

        assert_eq!(
            highlight.deep_link(open),
            "zotero://open-pdf/library/items/PDF1?annotation=ANN1"
        );
        assert_eq!(
            highlight.quote("smith2020", open).unwrap(),
            "important[@smith2020]\n[Link](zotero://open-pdf/library/items/PDF1?annotation=ANN1)\n"
        );

        let image = AnnotationRecord {
            key: "ANN2".to_string(),
            comment: "figure".to_string(),
            kind: AnnotationKind::Image {
                image_path: "/tmp/a.png".to_string(),
            },
        };
        assert!(image.quote("smith2020", open).is_none());
    }
}
