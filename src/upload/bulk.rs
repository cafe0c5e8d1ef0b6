use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{create_unit, UnitOutcome, UnitRequest, UploadFile};
use crate::context::AppContext;
use crate::error::{ComicdeskError, Result};
use crate::paths::parse_unit_folder;

/// A local directory holding the pages of one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUnitFolder {
    pub name: String,
    /// Number parsed from names like `Episode 03` or `ch_7`
    pub number_hint: Option<u32>,
    pub files: Vec<PathBuf>,
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// Find the unit folders directly under `root`.
///
/// Each immediate subdirectory is one unit; its files (at any depth) are the
/// unit's pages, sorted by relative path. Folders with a recognizable unit
/// number come first in number order, the rest follow by name.
pub fn collect_unit_folders(root: &Path) -> Result<Vec<LocalUnitFolder>> {
    if !root.is_dir() {
        return Err(ComicdeskError::Validation(format!(
            "Not a directory: {}",
            root.display()
        )));
    }

    let mut folders = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if !path.is_dir() || is_hidden(&name) {
            continue;
        }

        let mut files: Vec<PathBuf> = WalkDir::new(&path)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(&e.file_name().to_string_lossy()))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect();
        if files.is_empty() {
            log::warn!("Skipping empty folder {}", path.display());
            continue;
        }
        files.sort();

        folders.push(LocalUnitFolder {
            number_hint: parse_unit_folder(&name).map(|(_, number)| number),
            name,
            files,
        });
    }

    folders.sort_by(|a, b| match (a.number_hint, b.number_hint) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    });
    Ok(folders)
}

async fn read_files(paths: &[PathBuf]) -> Result<Vec<UploadFile>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(UploadFile::from_path(path).await?);
    }
    Ok(files)
}

/// Create one unit per local folder, in order.
///
/// Units are created one after another so each picks up the number the
/// previous one took. Stops at the first unit that fails.
pub async fn upload_units_in_bulk(
    ctx: &AppContext,
    title_id: &str,
    folders: &[LocalUnitFolder],
) -> Result<Vec<UnitOutcome>> {
    let mut created = Vec::with_capacity(folders.len());

    for folder in folders {
        let files = read_files(&folder.files).await?;
        log::info!("Uploading folder '{}' ({} files)", folder.name, files.len());

        let outcome = create_unit(
            ctx,
            UnitRequest {
                title_id: title_id.to_string(),
                unit_title: folder.name.clone(),
                files,
            },
        )
        .await
        .map_err(|e| {
            log::error!(
                "Bulk upload stopped at '{}' after {} units: {}",
                folder.name,
                created.len(),
                e
            );
            e
        })?;
        created.push(outcome);
    }

    Ok(created)
}
