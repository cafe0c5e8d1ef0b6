//! Catalog reader: joins title records with their unit sub-collections.

use serde::Serialize;

use crate::context::AppContext;
use crate::documents::Document;
use crate::error::{ComicdeskError, Result};
use crate::model::{TitleRecord, UnitRecord};

/// A unit as shown in the catalog tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogUnit {
    pub id: String,
    #[serde(flatten)]
    pub record: UnitRecord,
}

/// A title with its units ordered by number
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogTitle {
    pub id: String,
    #[serde(flatten)]
    pub record: TitleRecord,
    pub units: Vec<CatalogUnit>,
}

impl CatalogTitle {
    /// Display name, falling back to the identifier for records without a title
    pub fn display_title(&self) -> &str {
        if self.record.title.is_empty() {
            &self.id
        } else {
            &self.record.title
        }
    }
}

fn parse_title(doc: Document) -> Result<(String, TitleRecord)> {
    let record = serde_json::from_value(doc.data).map_err(|e| {
        ComicdeskError::Documents(format!("Malformed title record '{}': {}", doc.id, e))
    })?;
    Ok((doc.id, record))
}

fn parse_unit(title_id: &str, doc: Document) -> Result<CatalogUnit> {
    let record = serde_json::from_value(doc.data).map_err(|e| {
        ComicdeskError::Documents(format!("Malformed unit record '{}/{}': {}", title_id, doc.id, e))
    })?;
    Ok(CatalogUnit { id: doc.id, record })
}

/// Load every title and all of its units.
///
/// Any failed fetch aborts the whole load; there is no partial catalog.
pub async fn load_catalog(ctx: &AppContext) -> Result<Vec<CatalogTitle>> {
    let titles = ctx.documents.list(&ctx.layout.root_collection).await?;
    let mut catalog = Vec::with_capacity(titles.len());

    for doc in titles {
        let (id, record) = parse_title(doc)?;
        let units = load_units(ctx, &id).await?;
        catalog.push(CatalogTitle { id, record, units });
    }

    log::info!(
        "Loaded catalog: {} titles, {} units",
        catalog.len(),
        catalog.iter().map(|t| t.units.len()).sum::<usize>()
    );
    Ok(catalog)
}

/// Units of one title, ordered by number
pub async fn load_units(ctx: &AppContext, title_id: &str) -> Result<Vec<CatalogUnit>> {
    let docs = ctx.documents.list(&ctx.layout.units_collection(title_id)).await?;
    let mut units = docs
        .into_iter()
        .map(|doc| parse_unit(title_id, doc))
        .collect::<Result<Vec<_>>>()?;
    units.sort_by_key(|u| u.record.number);
    Ok(units)
}

/// Single title record, `None` when the title was never submitted
pub async fn get_title(ctx: &AppContext, title_id: &str) -> Result<Option<TitleRecord>> {
    match ctx.documents.get(&ctx.layout.root_collection, title_id).await? {
        Some(doc) => parse_title(doc).map(|(_, record)| Some(record)),
        None => Ok(None),
    }
}

/// Number of unit records a title currently has, read fresh from the database
pub async fn unit_count(ctx: &AppContext, title_id: &str) -> Result<u32> {
    let docs = ctx.documents.list(&ctx.layout.units_collection(title_id)).await?;
    Ok(docs.len() as u32)
}

/// Next unit number: existing count + 1. Not compacted if numbers have gaps.
pub async fn next_unit_number(ctx: &AppContext, title_id: &str) -> Result<u32> {
    Ok(unit_count(ctx, title_id).await? + 1)
}

pub fn find_title<'a>(catalog: &'a [CatalogTitle], id: &str) -> Option<&'a CatalogTitle> {
    catalog.iter().find(|t| t.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CatalogLayout;
    use crate::documents::{DocumentStore, MemoryDocumentStore};
    use crate::storage::MemoryObjectStore;
    use crate::upload::FailurePolicy;
    use serde_json::json;
    use std::sync::Arc;

    fn context(docs: Arc<MemoryDocumentStore>) -> AppContext {
        AppContext::new(
            Arc::new(MemoryObjectStore::new()),
            docs,
            CatalogLayout::default(),
            FailurePolicy::Abort,
        )
    }

    #[tokio::test]
    async fn test_load_catalog_joins_and_orders_units() {
        let docs = Arc::new(MemoryDocumentStore::new());
        docs.set("comics", "foo", json!({"title": "Foo", "author": "Ann", "genre": ["Action"]}))
            .await
            .unwrap();
        docs.set("comics", "bar", json!({"title": "Bar"})).await.unwrap();
        docs.set("comics/foo/episodes", "episode10", json!({"number": 10, "title": "Ten"}))
            .await
            .unwrap();
        docs.set("comics/foo/episodes", "episode02", json!({"number": 2, "title": "Two"}))
            .await
            .unwrap();

        let ctx = context(docs);
        let catalog = load_catalog(&ctx).await.unwrap();
        assert_eq!(catalog.len(), 2);

        let foo = find_title(&catalog, "foo").unwrap();
        assert_eq!(foo.record.author, "Ann");
        let numbers: Vec<u32> = foo.units.iter().map(|u| u.record.number).collect();
        assert_eq!(numbers, vec![2, 10]);

        let bar = find_title(&catalog, "bar").unwrap();
        assert!(bar.units.is_empty());
    }

    #[tokio::test]
    async fn test_any_fetch_error_aborts_load() {
        let docs = Arc::new(MemoryDocumentStore::new());
        docs.set("comics", "foo", json!({"title": "Foo"})).await.unwrap();
        docs.fail_reads_of("comics/foo/episodes");

        let ctx = context(docs);
        assert!(load_catalog(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_next_unit_number() {
        let docs = Arc::new(MemoryDocumentStore::new());
        let ctx = context(docs.clone());
        assert_eq!(next_unit_number(&ctx, "foo").await.unwrap(), 1);

        docs.set("comics/foo/episodes", "episode01", json!({"number": 1})).await.unwrap();
        docs.set("comics/foo/episodes", "episode02", json!({"number": 2})).await.unwrap();
        assert_eq!(unit_count(&ctx, "foo").await.unwrap(), 2);
        assert_eq!(next_unit_number(&ctx, "foo").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_display_title_falls_back_to_id() {
        let docs = Arc::new(MemoryDocumentStore::new());
        docs.set("comics", "untitled", json!({})).await.unwrap();
        let ctx = context(docs);

        let catalog = load_catalog(&ctx).await.unwrap();
        assert_eq!(catalog[0].display_title(), "untitled");
        assert!(get_title(&ctx, "missing").await.unwrap().is_none());
    }

    #[test]
    fn test_catalog_title_serializes_flat() {
        let title = CatalogTitle {
            id: "foo".to_string(),
            record: TitleRecord {
                title: "Foo".to_string(),
                ..TitleRecord::default()
            },
            units: vec![],
        };
        let value = serde_json::to_value(&title).unwrap();
        assert_eq!(value["id"], "foo");
        assert_eq!(value["title"], "Foo");
        assert_eq!(value["units"], json!([]));
    }
}
