// src/listing.rs
//
// Cursor-driven pagination over objects and containers.

use tracing::debug;

use crate::blob_store::{BlobStore, ResourceKind};
use crate::constants::DEFAULT_PAGE_SIZE;
use crate::error::{Result, TransferError};

/// Drives `BlobStore::list_page` until the backend reports exhaustion.
#[derive(Clone, Copy)]
pub struct PaginatedLister<'a> {
    store: &'a dyn BlobStore,
    page_size: usize,
}

impl<'a> PaginatedLister<'a> {
    pub fn new(store: &'a dyn BlobStore) -> Self {
        Self { store, page_size: DEFAULT_PAGE_SIZE }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Collect every entry of `kind` starting with `prefix`.
    ///
    /// Stops on an empty cursor or an empty page, whichever comes first. Any page
    /// failure fails the whole listing; partial results are never returned.
    pub async fn list_all(&self, kind: &ResourceKind, prefix: &str) -> Result<Vec<String>> {
        let mut entries = Vec::new();
        let mut cursor = String::new();
        let mut pages = 0usize;

        loop {
            let page = self.store.list_page(kind, prefix, &cursor, self.page_size).await?;
            pages += 1;
            debug!(
                "list {} page {}: {} entries, cursor {:?}",
                kind,
                pages,
                page.entries.len(),
                page.next_cursor
            );

            let exhausted = page.is_exhausted();
            if !exhausted && page.next_cursor == cursor {
                return Err(TransferError::io(
                    "list",
                    format!("backend repeated cursor {cursor:?} while listing {kind}"),
                ));
            }

            entries.extend(page.entries);
            if exhausted {
                break;
            }
            cursor = page.next_cursor;
        }

        debug!("list {} complete: {} entries over {} pages", kind, entries.len(), pages);
        Ok(entries)
    }
}

/// Every object key in `container` starting with `prefix`.
pub async fn list_objects(
    store: &dyn BlobStore,
    container: &str,
    prefix: &str,
    page_size: usize,
) -> Result<Vec<String>> {
    let kind = ResourceKind::Objects { container: container.to_string() };
    PaginatedLister::new(store).with_page_size(page_size).list_all(&kind, prefix).await
}

/// Every container name in the account.
pub async fn list_containers(store: &dyn BlobStore, page_size: usize) -> Result<Vec<String>> {
    PaginatedLister::new(store)
        .with_page_size(page_size)
        .list_all(&ResourceKind::Containers, "")
        .await
}
