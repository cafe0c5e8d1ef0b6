//! Stored record shapes, field-for-field compatible with the live catalog.

use serde::{Deserialize, Serialize};

fn default_title_type() -> String {
    "comic".to_string()
}

/// Root catalog record, one per title, keyed by the title identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, rename = "genre")]
    pub genres: Vec<String>,
    #[serde(default)]
    pub cover_image: String,
    /// Older records were read under the misspelled `heroLandScapeImage` key
    #[serde(default, rename = "heroLandscapeImage", alias = "heroLandScapeImage")]
    pub banner_image: String,
    #[serde(default)]
    pub is_hero: bool,
    #[serde(default)]
    pub is_new: bool,
    #[serde(default)]
    pub is_recommended: bool,
    #[serde(default = "default_title_type", rename = "type")]
    pub kind: String,
}

impl Default for TitleRecord {
    fn default() -> Self {
        Self {
            title: String::new(),
            author: String::new(),
            genres: Vec::new(),
            cover_image: String::new(),
            banner_image: String::new(),
            is_hero: false,
            is_new: false,
            is_recommended: false,
            kind: default_title_type(),
        }
    }
}

/// An episode or chapter of a title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRecord {
    pub number: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub preview_image: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_title_record_wire_names() {
        let record = TitleRecord {
            title: "Foo".to_string(),
            author: "Ann".to_string(),
            genres: vec!["Action".to_string()],
            cover_image: "c".to_string(),
            banner_image: "b".to_string(),
            is_hero: true,
            ..TitleRecord::default()
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["genre"], json!(["Action"]));
        assert_eq!(value["coverImage"], "c");
        assert_eq!(value["heroLandscapeImage"], "b");
        assert_eq!(value["isHero"], true);
        assert_eq!(value["isRecommended"], false);
        assert_eq!(value["type"], "comic");
    }

    #[test]
    fn test_title_record_accepts_legacy_banner_key() {
        let record: TitleRecord = serde_json::from_value(json!({
            "title": "Foo",
            "heroLandScapeImage": "legacy-banner"
        }))
        .unwrap();
        assert_eq!(record.banner_image, "legacy-banner");
        assert!(record.genres.is_empty());
        assert_eq!(record.kind, "comic");
    }

    #[test]
    fn test_unit_record_wire_names() {
        let unit = UnitRecord {
            number: 3,
            title: "Third".to_string(),
            preview_image: "a".to_string(),
            images: vec!["a".to_string(), "b".to_string()],
        };
        let value = serde_json::to_value(&unit).unwrap();
        assert_eq!(value, json!({
            "number": 3,
            "title": "Third",
            "previewImage": "a",
            "images": ["a", "b"]
        }));
    }
}
