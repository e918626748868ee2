//! In-memory [`ContentSource`] for engine and pagination tests.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{TimeZone, Utc};

use super::{ChildBlock, ContentSource, Listing};
use crate::block::Block;
use crate::types::{PageMeta, PageRecord};
use crate::{Error, Result};

#[derive(Default)]
struct State {
    pages: Vec<(PageRecord, Vec<Block>)>,
    failing: HashSet<String>,
    listing_fails: bool,
}

pub struct MemorySource {
    state: Mutex<State>,
    page_size: usize,
    children_calls: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: 100,
            children_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Published page `id` with slug `id` and revision `rev`.
    pub fn page(id: &str, rev: &str) -> PageRecord {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        PageRecord {
            id: id.to_string(),
            revision: Some(rev.to_string()),
            meta: PageMeta {
                title: format!("Page {id}"),
                slug: id.to_string(),
                date: at,
                last_edited: at,
                tags: Vec::new(),
                published: true,
                cover: None,
            },
        }
    }

    /// Add or replace a page.
    pub fn add_page(&self, record: PageRecord, blocks: Vec<Block>) {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.pages.iter_mut().find(|(p, _)| p.id == record.id) {
            *slot = (record, blocks);
        } else {
            state.pages.push((record, blocks));
        }
    }

    pub fn remove_page(&self, id: &str) {
        self.state.lock().unwrap().pages.retain(|(p, _)| p.id != id);
    }

    /// Children requests for `id` fail with a fatal remote error.
    pub fn fail_children(&self, id: &str) {
        self.state.lock().unwrap().failing.insert(id.to_string());
    }

    pub fn heal_children(&self, id: &str) {
        self.state.lock().unwrap().failing.remove(id);
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().listing_fails = true;
    }

    pub fn children_calls(&self) -> usize {
        self.children_calls.load(Ordering::SeqCst)
    }

    fn window<T: Clone>(&self, items: &[T], cursor: Option<&str>) -> Listing<T> {
        let start = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let end = (start + self.page_size).min(items.len());
        Listing {
            items: items.get(start..end).unwrap_or_default().to_vec(),
            next_cursor: (end < items.len()).then(|| end.to_string()),
        }
    }
}

fn find<'a>(blocks: &'a [Block], id: &str) -> Option<&'a Block> {
    blocks.iter().find_map(|b| {
        if b.id == id {
            Some(b)
        } else {
            find(&b.children, id)
        }
    })
}

#[async_trait::async_trait]
impl ContentSource for MemorySource {
    async fn list_pages(&self, cursor: Option<&str>) -> Result<Listing<PageRecord>> {
        let state = self.state.lock().unwrap();
        if state.listing_fails {
            return Err(Error::Unauthorized("token rejected".to_string()));
        }
        let records: Vec<PageRecord> = state.pages.iter().map(|(p, _)| p.clone()).collect();
        Ok(self.window(&records, cursor))
    }

    async fn block_children(
        &self,
        block_id: &str,
        cursor: Option<&str>,
    ) -> Result<Listing<ChildBlock>> {
        self.children_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.failing.contains(block_id) {
            return Err(Error::NotFound(block_id.to_string()));
        }
        let children = state
            .pages
            .iter()
            .find_map(|(page, blocks)| {
                if page.id == block_id {
                    Some(blocks.as_slice())
                } else {
                    find(blocks, block_id).map(|b| b.children.as_slice())
                }
            })
            .ok_or_else(|| Error::NotFound(block_id.to_string()))?;

        let shallow: Vec<ChildBlock> = children
            .iter()
            .map(|b| ChildBlock {
                block: Block {
                    children: Vec::new(),
                    ..b.clone()
                },
                has_children: !b.children.is_empty(),
            })
            .collect();
        Ok(self.window(&shallow, cursor))
    }
}
