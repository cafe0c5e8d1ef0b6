//! Storage path convention shared by the object store and the document database.
//!
//! A title's assets live under a folder named after the title identifier; each
//! unit gets a sub-folder `<Kind> <NN>` and a unit document `<kind><NN>`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Unit terminology used by a deployment. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    #[default]
    Episode,
    Chapter,
}

impl UnitKind {
    /// Capitalised label used in storage folder names ("Episode 03")
    pub fn label(&self) -> &'static str {
        match self {
            UnitKind::Episode => "Episode",
            UnitKind::Chapter => "Chapter",
        }
    }

    /// Lowercase prefix of unit document ids ("episode03")
    pub fn doc_prefix(&self) -> &'static str {
        match self {
            UnitKind::Episode => "episode",
            UnitKind::Chapter => "chapter",
        }
    }

    /// Name of the per-title sub-collection holding unit documents
    pub fn collection(&self) -> &'static str {
        match self {
            UnitKind::Episode => "episodes",
            UnitKind::Chapter => "chapters",
        }
    }
}

/// Content type of a title, derived from the files in its storage folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Comic,
    Webnovel,
}

/// Zero-pad a unit number to two digits
pub fn pad_number(number: u32) -> String {
    format!("{:02}", number)
}

/// Storage folder of a unit: `<title>/<Kind> <NN>`
pub fn unit_path(title: &str, kind: UnitKind, number: u32) -> String {
    format!("{}/{} {}", title, kind.label(), pad_number(number))
}

/// Storage path of a file inside a unit folder
pub fn unit_file_path(title: &str, kind: UnitKind, number: u32, filename: &str) -> String {
    format!("{}/{}", unit_path(title, kind, number), filename)
}

/// Storage path of a title-level asset (cover, banner): `<title>/<filename>`
pub fn title_asset_path(title: &str, filename: &str) -> String {
    format!("{}/{}", title, filename)
}

/// Document id of a unit: `<kind><NN>`
pub fn unit_doc_id(kind: UnitKind, number: u32) -> String {
    format!("{}{}", kind.doc_prefix(), pad_number(number))
}

/// True when a file name marks its title as a webnovel (`.doc` / `.docx`)
pub fn is_webnovel_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.ends_with(".doc") || lower.ends_with(".docx")
}

/// Last path component of a storage path
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn unit_folder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(episode|chapter|ep|ch)[\s._-]*0*(\d+)\s*$").expect("Invalid regex pattern")
    })
}

/// Recognise a unit folder name such as `Episode 07`, `chapter 7` or `Ch-12`.
pub fn parse_unit_folder(name: &str) -> Option<(UnitKind, u32)> {
    let caps = unit_folder_regex().captures(name)?;
    let kind = match caps.get(1)?.as_str().to_lowercase().as_str() {
        "episode" | "ep" => UnitKind::Episode,
        _ => UnitKind::Chapter,
    };
    let number = caps.get(2)?.as_str().parse().ok()?;
    Some((kind, number))
}
