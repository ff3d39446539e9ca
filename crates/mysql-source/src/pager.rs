//! Pull-based fingerprint stream over a table.
//!
//! Fetches one page at a time by key and hands out fingerprints one by one.
//! The stream is forward-only; restarting it means building a new pager.

use crate::store::TableStore;
use anyhow::Result;
use rowsync_core::{KeyRange, RowFingerprint, RowKey, TableDefinition};
use std::collections::VecDeque;

pub struct FingerprintPager<'a, S: TableStore + ?Sized> {
    store: &'a mut S,
    table: &'a TableDefinition,
    page_size: usize,
    limit: Option<u64>,
    after: Option<RowKey>,
    buffer: VecDeque<RowFingerprint>,
    exhausted: bool,
    yielded: u64,
    pages: u64,
}

impl<'a, S: TableStore + ?Sized> FingerprintPager<'a, S> {
    pub fn new(store: &'a mut S, table: &'a TableDefinition, page_size: usize) -> Self {
        Self {
            store,
            table,
            page_size: page_size.max(1),
            limit: None,
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
            yielded: 0,
            pages: 0,
        }
    }

    /// Stop after `limit` fingerprints.
    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Start strictly after `key`.
    pub fn starting_after(mut self, key: Option<RowKey>) -> Self {
        self.after = key;
        self
    }

    pub fn pages(&self) -> u64 {
        self.pages
    }

    pub async fn next(&mut self) -> Result<Option<RowFingerprint>> {
        if self.limit.is_some_and(|limit| self.yielded >= limit) {
            return Ok(None);
        }
        if self.buffer.is_empty() && !self.exhausted {
            let range = KeyRange::after(self.after.clone());
            let page = self
                .store
                .fingerprints(self.table, &range, Some(self.page_size))
                .await?;
            self.pages += 1;
            if page.len() < self.page_size {
                self.exhausted = true;
            }
            if let Some(last) = page.last() {
                self.after = Some(last.key.clone());
            }
            self.buffer.extend(page);
        }
        let next = self.buffer.pop_front();
        if next.is_some() {
            self.yielded += 1;
        }
        Ok(next)
    }
}
