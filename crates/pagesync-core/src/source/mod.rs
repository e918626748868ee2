//! Remote content sources.
//!
//! A [`ContentSource`] exposes two paginated reads: the page listing and the
//! direct children of a block. [`collect_pages`] and [`fetch_block_tree`]
//! drive the pagination and recursion on top of them, so a source only has
//! to map one request onto one [`Listing`].

pub mod notion;

#[cfg(test)]
pub(crate) mod memory;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use crate::Result;
use crate::block::Block;
use crate::types::PageRecord;

pub use notion::{DatabaseReport, NotionClient};

/// Nesting depth beyond which children are not requested.
pub const MAX_DEPTH: usize = 32;

/// One page of a paginated response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing<T> {
    /// Items in remote order.
    pub items: Vec<T>,
    /// Cursor for the next page, `None` on the last one.
    pub next_cursor: Option<String>,
}

/// A block as returned by a children request, before recursion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildBlock {
    /// The block, with no children attached yet.
    pub block: Block,
    /// Whether the remote reports nested children.
    pub has_children: bool,
}

/// Read-only access to a remote page collection.
#[async_trait::async_trait]
pub trait ContentSource: Send + Sync {
    /// One page of the page listing, starting at `cursor`.
    async fn list_pages(&self, cursor: Option<&str>) -> Result<Listing<PageRecord>>;

    /// One page of the direct children of `block_id`, starting at `cursor`.
    async fn block_children(
        &self,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<Listing<ChildBlock>>;
}

/// Drain the page listing.
pub async fn collect_pages(source: &dyn ContentSource) -> Result<Vec<PageRecord>> {
    let mut pages = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let listing = source.list_pages(cursor.as_deref()).await?;
        pages.extend(listing.items);
        match listing.next_cursor {
            Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
            _ => break,
        }
    }
    debug!(count = pages.len(), "Listed pages");
    Ok(pages)
}

/// A page's block tree and how much of it could not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockTree {
    /// Top-level blocks with their children attached.
    pub blocks: Vec<Block>,
    /// Nested subtrees left empty because their fetch failed.
    pub missing_subtrees: usize,
}

impl BlockTree {
    /// Whether every nested subtree was fetched.
    pub const fn is_complete(&self) -> bool {
        self.missing_subtrees == 0
    }
}

/// Full block tree under `root_id`.
///
/// Errors fetching the root's own children propagate. A failing nested
/// subtree degrades to an empty child list with a warning so the page can
/// still be produced; [`BlockTree::missing_subtrees`] counts those holes.
pub async fn fetch_block_tree(source: &dyn ContentSource, root_id: &str) -> Result<BlockTree> {
    let mut missing = 0;
    let blocks = fetch_children(source, root_id.to_string(), 0, &mut missing).await?;
    Ok(BlockTree {
        blocks,
        missing_subtrees: missing,
    })
}

fn fetch_children<'a>(
    source: &'a dyn ContentSource,
    block_id: String,
    depth: usize,
    missing: &'a mut usize,
) -> BoxFuture<'a, Result<Vec<Block>>> {
    async move {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let listing = source.block_children(&block_id, cursor.as_deref()).await?;
            for child in listing.items {
                let mut block = child.block;
                if child.has_children && depth < MAX_DEPTH {
                    match fetch_children(source, block.id.clone(), depth + 1, &mut *missing).await {
                        Ok(children) => block.children = children,
                        Err(e) => {
                            *missing += 1;
                            warn!(block_id = %block.id, error = %e, "Failed to fetch nested blocks");
                        },
                    }
                }
                blocks.push(block);
            }
            match listing.next_cursor {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(blocks)
    }
    .boxed()
}
