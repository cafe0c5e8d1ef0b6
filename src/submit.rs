//! Title metadata submission, the second step of the new-title flow.

use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::{ComicdeskError, Result};
use crate::model::TitleRecord;
use crate::upload::TitleHandoff;

/// Metadata entered for a title, plus the image URLs handed over from the
/// upload step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TitleSubmission {
    pub id: String,
    pub title: String,
    pub author: String,
    pub genres: Vec<String>,
    pub is_hero: bool,
    pub is_new: bool,
    pub is_recommended: bool,
    pub cover_image: Option<String>,
    pub banner_image: Option<String>,
}

impl TitleSubmission {
    /// Fill in whatever the form left out from the upload handoff
    pub fn with_handoff(mut self, handoff: &TitleHandoff) -> Self {
        if self.id.trim().is_empty() {
            self.id = handoff.title_id.clone();
        }
        if self.title.trim().is_empty() {
            self.title = self.id.clone();
        }
        if self.cover_image.is_none() {
            self.cover_image = handoff.cover_image_url.clone();
        }
        if self.banner_image.is_none() {
            self.banner_image = handoff.banner_image_url.clone();
        }
        self
    }

    /// Check in the order the form reports problems
    pub fn validate(&self) -> Result<()> {
        let missing = |url: &Option<String>| url.as_deref().map_or(true, |u| u.trim().is_empty());
        if missing(&self.cover_image) || missing(&self.banner_image) {
            return Err(ComicdeskError::HandoffMissing(
                "No image URLs provided. Please upload images first.".to_string(),
            ));
        }

        if self.title.trim().is_empty()
            || self.author.trim().is_empty()
            || self.genres.iter().all(|g| g.trim().is_empty())
        {
            return Err(ComicdeskError::Validation(
                "Please fill all fields and add at least one genre.".to_string(),
            ));
        }

        if self.id.trim().is_empty() {
            return Err(ComicdeskError::Validation(
                "Comic name is missing. Please check your input.".to_string(),
            ));
        }
        if self.id.contains('/') {
            return Err(ComicdeskError::Validation(format!(
                "Title identifier must not contain '/': {}",
                self.id
            )));
        }
        Ok(())
    }

    pub fn to_record(&self) -> TitleRecord {
        let mut genres = GenreList::default();
        for genre in &self.genres {
            genres.add(genre);
        }

        TitleRecord {
            title: self.title.trim().to_string(),
            author: self.author.trim().to_string(),
            genres: genres.into_vec(),
            cover_image: self.cover_image.clone().unwrap_or_default(),
            banner_image: self.banner_image.clone().unwrap_or_default(),
            is_hero: self.is_hero,
            is_new: self.is_new,
            is_recommended: self.is_recommended,
            ..TitleRecord::default()
        }
    }
}

/// Validate and write the root record of a title.
///
/// The write is a full overwrite: resubmitting an existing title replaces its
/// record without warning.
pub async fn submit_title(ctx: &AppContext, submission: &TitleSubmission) -> Result<TitleRecord> {
    submission.validate()?;
    let record = submission.to_record();
    let id = submission.id.trim();

    ctx.documents
        .set(&ctx.layout.root_collection, id, serde_json::to_value(&record)?)
        .await?;

    log::info!(
        "Submitted title '{}' ({} genres, hero={}, new={}, recommended={})",
        id,
        record.genres.len(),
        record.is_hero,
        record.is_new,
        record.is_recommended
    );
    Ok(record)
}

/// Ordered genre tags without blanks or duplicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenreList(Vec<String>);

impl GenreList {
    /// Returns false when the genre was blank or already present
    pub fn add(&mut self, genre: &str) -> bool {
        let genre = genre.trim();
        if genre.is_empty() || self.0.iter().any(|g| g == genre) {
            return false;
        }
        self.0.push(genre.to_string());
        true
    }

    pub fn remove(&mut self, genre: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|g| g != genre.trim());
        self.0.len() != before
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}
