//! Upload coordinator.
//!
//! Every file of a batch is uploaded concurrently and the batch is joined once
//! all uploads have settled. What happens next depends on [`FailurePolicy`]:
//! with `Abort` a single failure leaves storage as it is (no cleanup) and no
//! record is written; with `Partial` the unit is finalized from whatever made
//! it into storage. Storage writes always precede the database write.
//!
//! All input checks (title id, unit title, file names) run before the first
//! backend call.

pub mod bulk;

use futures_util::future::try_join_all;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::catalog::{get_title, next_unit_number};
use crate::context::AppContext;
use crate::error::{ComicdeskError, Result};
use crate::model::UnitRecord;
use crate::paths::{title_asset_path, unit_doc_id, unit_file_path, unit_path};
use crate::storage::{join_path, ObjectStore};

pub use bulk::{collect_unit_folders, upload_units_in_bulk, LocalUnitFolder};

/// What to do with a batch where some uploads failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Write nothing to the database and report the failures
    #[default]
    Abort,
    /// Finalize with the files that did land in storage
    Partial,
}

/// A file waiting to be uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Content type is guessed from the file name
    pub fn new(name: &str, bytes: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            content_type: guess_content_type(name).to_string(),
            bytes,
        }
    }

    /// Read a local file; the upload keeps the file's base name
    pub async fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ComicdeskError::Validation(format!("Invalid file name: {}", path.display())))?;
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(name, bytes))
    }
}

pub fn guess_content_type(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_lowercase()).unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "avif" => "image/avif",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// One entry of a batch: where a file goes
#[derive(Debug, Clone)]
pub struct PlannedUpload {
    pub path: String,
    pub file: UploadFile,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedObject {
    pub path: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUpload {
    pub path: String,
    pub error: String,
}

/// Settled result of a batch, in submission order
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub uploaded: Vec<UploadedObject>,
    pub failed: Vec<FailedUpload>,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.uploaded.len() + self.failed.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn url_of(&self, path: &str) -> Option<&str> {
        self.uploaded.iter().find(|u| u.path == path).map(|u| u.url.as_str())
    }

    pub fn failed_path(&self, path: &str) -> bool {
        self.failed.iter().any(|f| f.path == path)
    }

    pub fn to_error(&self) -> ComicdeskError {
        ComicdeskError::UploadBatch {
            failed: self.failed.len(),
            total: self.total(),
            first_error: self
                .failed
                .first()
                .map(|f| format!("{}: {}", f.path, f.error))
                .unwrap_or_default(),
        }
    }
}

/// Reported once for every upload of a batch as it settles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    /// Uploads settled so far, this one included
    pub completed: usize,
    pub total: usize,
    pub path: String,
    pub succeeded: bool,
}

impl BatchProgress {
    pub fn percent(&self) -> usize {
        if self.total == 0 {
            100
        } else {
            self.completed * 100 / self.total
        }
    }
}

/// Upload every planned file concurrently and wait until all have settled,
/// logging progress as each upload finishes.
pub async fn upload_batch(store: &dyn ObjectStore, items: Vec<PlannedUpload>) -> BatchOutcome {
    upload_batch_with_progress(store, items, |p| {
        log::info!(
            "Uploading {}... {}% ({}/{})",
            p.path,
            p.percent(),
            p.completed,
            p.total
        );
    })
    .await
}

/// Same as [`upload_batch`] with a caller-supplied progress hook.
///
/// Each upload resolves its download URL right after the write succeeds; a
/// failure in either step marks that item failed without affecting the others.
pub async fn upload_batch_with_progress<F>(
    store: &dyn ObjectStore,
    items: Vec<PlannedUpload>,
    mut on_progress: F,
) -> BatchOutcome
where
    F: FnMut(&BatchProgress),
{
    let total = items.len();
    log::info!("Uploading {} files", total);

    let mut in_flight: FuturesUnordered<_> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| async move {
            let PlannedUpload { path, file } = item;
            let size = file.bytes.len();
            let result = match store.upload(&path, file.bytes, &file.content_type).await {
                Ok(()) => store.download_url(&path).await,
                Err(e) => Err(e),
            };
            (index, path, size, result)
        })
        .collect();

    let mut settled = Vec::with_capacity(total);
    while let Some((index, path, size, result)) = in_flight.next().await {
        on_progress(&BatchProgress {
            completed: settled.len() + 1,
            total,
            path: path.clone(),
            succeeded: result.is_ok(),
        });
        settled.push((index, path, size, result));
    }
    settled.sort_by_key(|(index, ..)| *index);

    let mut outcome = BatchOutcome::default();
    for (_, path, size, result) in settled {
        match result {
            Ok(url) => {
                log::debug!("Uploaded {} ({} bytes)", path, size);
                outcome.uploaded.push(UploadedObject { path, url });
            }
            Err(e) => {
                log::error!("Upload failed for {}: {}", path, e);
                outcome.failed.push(FailedUpload {
                    path,
                    error: e.to_string(),
                });
            }
        }
    }

    log::info!(
        "Batch settled: {}/{} uploaded, {} failed",
        outcome.uploaded.len(),
        total,
        outcome.failed.len()
    );
    outcome
}

/// Request to create the next unit of a title from local files
#[derive(Debug, Clone)]
pub struct UnitRequest {
    pub title_id: String,
    pub unit_title: String,
    pub files: Vec<UploadFile>,
}

/// A unit record that was written to the database
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitOutcome {
    pub doc_id: String,
    pub unit: UnitRecord,
    /// Uploads that failed but were tolerated under `FailurePolicy::Partial`
    pub failed: Vec<FailedUpload>,
}

fn require(value: &str, message: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ComicdeskError::Validation(message.to_string()));
    }
    Ok(())
}

/// Normalised title id: the same trimmed value names the storage folder and
/// the title record
pub fn require_title_id(title_id: &str) -> Result<&str> {
    let title_id = title_id.trim();
    require(title_id, "Title identifier is required")?;
    if title_id.contains('/') || title_id == "." || title_id == ".." {
        return Err(ComicdeskError::Validation(format!(
            "Title identifier must be a single folder name: {}",
            title_id
        )));
    }
    Ok(title_id)
}

/// File names become the last path segment in storage, and names within one
/// folder must be distinct
fn require_file_names<'a>(files: impl IntoIterator<Item = &'a UploadFile>) -> Result<()> {
    let mut seen = HashSet::new();
    for file in files {
        let name = file.name.as_str();
        if name.trim().is_empty() || name.contains('/') || name == "." || name == ".." {
            return Err(ComicdeskError::Validation(format!(
                "Invalid file name '{}': it must be a plain file name without folders",
                name
            )));
        }
        if !seen.insert(name) {
            return Err(ComicdeskError::Validation(format!(
                "File name '{}' is used more than once in the same folder",
                name
            )));
        }
    }
    Ok(())
}

/// Units can only be added to titles that are in the catalog
async fn require_title(ctx: &AppContext, title_id: &str) -> Result<()> {
    if get_title(ctx, title_id).await?.is_none() {
        return Err(ComicdeskError::NotFound(format!(
            "Title '{}' is not in the catalog. Submit its details first.",
            title_id
        )));
    }
    Ok(())
}

/// Upload a batch of files as the next unit of a title and write its record.
pub async fn create_unit(ctx: &AppContext, request: UnitRequest) -> Result<UnitOutcome> {
    let UnitRequest {
        title_id,
        unit_title,
        files,
    } = request;

    let title_id = require_title_id(&title_id)?;
    require(&unit_title, "Please enter a unit title")?;
    if files.is_empty() {
        return Err(ComicdeskError::Validation("Please upload at least one file.".to_string()));
    }
    require_file_names(&files)?;

    require_title(ctx, title_id).await?;
    let kind = ctx.layout.unit_kind;
    let number = next_unit_number(ctx, title_id).await?;
    let folder = unit_path(title_id, kind, number);
    log::info!("Creating {} as unit {} of '{}'", folder, number, title_id);

    let planned = files
        .into_iter()
        .map(|file| PlannedUpload {
            path: join_path(&folder, &file.name),
            file,
        })
        .collect();
    let outcome = upload_batch(ctx.storage.as_ref(), planned).await;

    if !outcome.is_complete() {
        match ctx.failure_policy {
            FailurePolicy::Abort => {
                log::error!(
                    "Not writing unit record for {}: {} of {} uploads failed, {} files left in storage",
                    folder,
                    outcome.failed.len(),
                    outcome.total(),
                    outcome.uploaded.len()
                );
                return Err(outcome.to_error());
            }
            FailurePolicy::Partial if outcome.uploaded.is_empty() => {
                return Err(outcome.to_error());
            }
            FailurePolicy::Partial => {
                log::warn!(
                    "Finalizing {} with {} of {} files",
                    folder,
                    outcome.uploaded.len(),
                    outcome.total()
                );
            }
        }
    }

    let (doc_id, unit) = finalize_unit(ctx, title_id, number, &unit_title).await?;
    Ok(UnitOutcome {
        doc_id,
        unit,
        failed: outcome.failed,
    })
}

/// Build and write the unit record from what is currently in the unit folder.
///
/// Image order is the lexicographic order of the download URLs; the first
/// one becomes the preview image.
pub async fn finalize_unit(
    ctx: &AppContext,
    title_id: &str,
    number: u32,
    unit_title: &str,
) -> Result<(String, UnitRecord)> {
    let kind = ctx.layout.unit_kind;
    let folder = unit_path(title_id, kind, number);
    let listing = ctx.storage.list(&folder).await?;

    if listing.files.is_empty() {
        return Err(ComicdeskError::Validation(format!(
            "No images found for this unit in storage ({})",
            folder
        )));
    }

    let mut images = try_join_all(
        listing
            .files
            .iter()
            .map(|file| ctx.storage.download_url(&file.path)),
    )
    .await?;
    images.sort();

    let unit = UnitRecord {
        number,
        title: unit_title.to_string(),
        preview_image: images[0].clone(),
        images,
    };
    let doc_id = unit_doc_id(kind, number);

    ctx.documents
        .set(&ctx.layout.units_collection(title_id), &doc_id, serde_json::to_value(&unit)?)
        .await?;

    log::info!("Wrote {}/{} with {} images", title_id, doc_id, unit.images.len());
    Ok((doc_id, unit))
}

/// Register the next unit from files already sitting in storage
pub async fn register_unit_from_storage(
    ctx: &AppContext,
    title_id: &str,
    unit_title: &str,
) -> Result<(String, UnitRecord)> {
    let title_id = require_title_id(title_id)?;
    require(unit_title, "Please enter a unit title")?;

    require_title(ctx, title_id).await?;
    let number = next_unit_number(ctx, title_id).await?;
    finalize_unit(ctx, title_id, number, unit_title).await
}

/// Everything uploaded by the new-title flow
#[derive(Debug, Clone, Default)]
pub struct NewTitleUpload {
    pub title_id: String,
    pub cover: Option<UploadFile>,
    pub banner: Option<UploadFile>,
    /// Files of units 1..=N, in order
    pub units: Vec<Vec<UploadFile>>,
}

/// State carried from the upload step to the metadata step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleHandoff {
    pub title_id: String,
    pub cover_image_url: Option<String>,
    pub banner_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTitleOutcome {
    pub handoff: TitleHandoff,
    pub uploaded: usize,
    pub failed: Vec<FailedUpload>,
}

/// Upload the title-level images and every unit folder of a new title.
///
/// No unit records are written here; units are registered afterwards from
/// storage (or by `create_unit` for later uploads).
pub async fn upload_new_title(ctx: &AppContext, request: NewTitleUpload) -> Result<NewTitleOutcome> {
    let NewTitleUpload {
        title_id,
        cover,
        banner,
        units,
    } = request;

    let title_id = require_title_id(&title_id)?.to_string();
    let file_count = units.iter().map(Vec::len).sum::<usize>()
        + usize::from(cover.is_some())
        + usize::from(banner.is_some());
    if file_count == 0 {
        return Err(ComicdeskError::Validation("Please upload at least one file.".to_string()));
    }
    // Cover and banner share the title folder
    require_file_names(cover.iter().chain(banner.iter()))?;
    for files in &units {
        require_file_names(files)?;
    }

    let kind = ctx.layout.unit_kind;
    let mut planned = Vec::with_capacity(file_count);

    let cover_path = cover.map(|file| {
        let path = title_asset_path(&title_id, &file.name);
        planned.push(PlannedUpload { path: path.clone(), file });
        path
    });
    let banner_path = banner.map(|file| {
        let path = title_asset_path(&title_id, &file.name);
        planned.push(PlannedUpload { path: path.clone(), file });
        path
    });
    for (index, files) in units.into_iter().enumerate() {
        let number = index as u32 + 1;
        for file in files {
            planned.push(PlannedUpload {
                path: unit_file_path(&title_id, kind, number, &file.name),
                file,
            });
        }
    }

    log::info!("Uploading new title '{}' ({} files)", title_id, file_count);
    let outcome = upload_batch(ctx.storage.as_ref(), planned).await;

    let asset_failed = [&cover_path, &banner_path]
        .into_iter()
        .flatten()
        .any(|path| outcome.failed_path(path));
    if asset_failed || (!outcome.is_complete() && ctx.failure_policy == FailurePolicy::Abort) {
        return Err(outcome.to_error());
    }

    let handoff = TitleHandoff {
        title_id,
        cover_image_url: cover_path.as_deref().and_then(|p| outcome.url_of(p)).map(String::from),
        banner_image_url: banner_path.as_deref().and_then(|p| outcome.url_of(p)).map(String::from),
    };

    Ok(NewTitleOutcome {
        handoff,
        uploaded: outcome.uploaded.len(),
        failed: outcome.failed,
    })
}
