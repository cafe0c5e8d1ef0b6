//! Folder classifier: a title is a webnovel when any file under its storage
//! folder is a Word document, otherwise it is a comic.

use serde::Serialize;

use crate::context::AppContext;
use crate::error::Result;
use crate::paths::{is_webnovel_file, ContentType};
use crate::storage::ObjectStore;

/// Aggregate counts shown on the dashboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeCounts {
    pub comics: usize,
    pub webnovels: usize,
}

/// Classify one folder tree.
///
/// Walks with an explicit worklist so arbitrarily deep trees cannot exhaust
/// the stack; returns on the first Word document found.
pub async fn classify_folder(store: &dyn ObjectStore, folder: &str) -> Result<ContentType> {
    let mut pending = vec![folder.to_string()];
    let mut visited = 0usize;

    while let Some(current) = pending.pop() {
        let listing = store.list(&current).await?;
        visited += 1;

        if let Some(doc) = listing.files.iter().find(|f| is_webnovel_file(&f.name)) {
            log::debug!("{} is a webnovel ({} found after {} folders)", folder, doc.path, visited);
            return Ok(ContentType::Webnovel);
        }

        pending.extend(listing.folders);
    }

    log::debug!("{} is a comic ({} folders walked)", folder, visited);
    Ok(ContentType::Comic)
}

/// Classify every top-level storage folder and tally the results.
///
/// No caching: each call re-walks the whole tree.
pub async fn count_by_type(ctx: &AppContext) -> Result<TypeCounts> {
    let root = ctx.storage.list("").await?;
    let mut counts = TypeCounts::default();

    for folder in &root.folders {
        match classify_folder(ctx.storage.as_ref(), folder).await? {
            ContentType::Comic => counts.comics += 1,
            ContentType::Webnovel => counts.webnovels += 1,
        }
    }

    log::info!("Storage holds {} comics and {} webnovels", counts.comics, counts.webnovels);
    Ok(counts)
}
