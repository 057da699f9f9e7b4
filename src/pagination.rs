//! Paging over list endpoints.
//!
//! Close list endpoints come in two flavours: offset based (`_skip`, `_limit`,
//! `has_more`) and cursor based (`_cursor`, `cursor_next`). Both pagers here hand
//! out one page of `data` items at a time.

use log::debug;
use serde_json::Value;
use std::time::Duration;

use crate::api::Api;
use crate::http::{ApiError, Query};

/// Wait between pages of a changing result set, so the search index reflects
/// the writes made on the previous page.
pub const INDEXER_PAUSE: Duration = Duration::from_secs(2);

/// How the offset moves between pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The result set does not change while we walk it.
    Stable,
    /// Items may disappear or be rewritten while we walk (updates, merges).
    /// Pages overlap by one item so nothing is skipped at page boundaries.
    Changing,
}

/// Number of items to skip forward after a page of `len` items.
///
/// For a changing result set the offset moves back by one for overlap, and by
/// every item that was removed from the set while the page was processed.
pub fn next_offset_step(advance: Advance, len: usize, removed: usize) -> usize {
    match advance {
        Advance::Stable => len,
        Advance::Changing => len.saturating_sub(1 + removed),
    }
}

/// Walks an offset-paginated list endpoint (`_skip`, `_limit`, `has_more`).
///
/// In [`Advance::Changing`] mode the pager pauses for [`INDEXER_PAUSE`] before
/// every page after the first, and drops the item repeated by the page overlap.
pub struct OffsetPages<'a, A: Api + ?Sized> {
    api: &'a A,
    endpoint: String,
    query: Query,
    limit: Option<usize>,
    advance: Advance,
    skip: usize,
    last_len: Option<usize>,
    last_id: Option<String>,
    removed: usize,
    has_more: bool,
}

impl<'a, A: Api + ?Sized> OffsetPages<'a, A> {
    /// Starts at offset 0 with `query` sent on every request.
    pub fn new(api: &'a A, endpoint: impl Into<String>, query: Query) -> Self {
        Self {
            api,
            endpoint: endpoint.into(),
            query,
            limit: None,
            advance: Advance::Stable,
            skip: 0,
            last_len: None,
            last_id: None,
            removed: 0,
            has_more: true,
        }
    }

    /// Request pages of at most `limit` items.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Walk a result set that the caller is modifying.
    pub fn changing(mut self) -> Self {
        self.advance = Advance::Changing;
        self
    }

    /// Reports that `count` items of the current page left the result set.
    pub fn removed(&mut self, count: usize) {
        self.removed += count;
    }

    pub fn offset(&self) -> usize {
        self.skip
    }

    /// Next page of `data` items, or `None` once the server reports no more.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, ApiError> {
        let first_page = self.last_len.is_none();
        if let Some(len) = self.last_len.take() {
            self.skip += next_offset_step(self.advance, len, self.removed);
            self.removed = 0;
        }
        if !self.has_more {
            return Ok(None);
        }
        if self.advance == Advance::Changing && !first_page {
            self.api
                .pause(
                    INDEXER_PAUSE,
                    "Pausing for 2s to give the search indexer some time to catch up with the changes",
                )
                .await;
        }

        let mut query = self.query.clone();
        query.push(("_skip".to_string(), self.skip.to_string()));
        if let Some(limit) = self.limit {
            query.push(("_limit".to_string(), limit.to_string()));
        }

        debug!("Fetching {} page at offset {}", self.endpoint, self.skip);
        let resp = self.api.get(&self.endpoint, &query).await?;
        let mut data = page_data(&resp);

        self.has_more = match resp.get("has_more").and_then(Value::as_bool) {
            Some(has_more) => has_more,
            None => self.limit.is_some_and(|limit| data.len() >= limit),
        };
        self.last_len = Some(data.len());

        if self.advance == Advance::Changing {
            let last_id = data.last().and_then(item_id);
            // The overlap item was already handed out with the previous page.
            if self.last_id.is_some() && data.first().and_then(item_id) == self.last_id {
                data.remove(0);
            }
            self.last_id = last_id;
        }

        Ok(Some(data))
    }
}

/// Walks a cursor-paginated list endpoint (`_cursor`, `cursor_next`).
pub struct CursorPages<'a, A: Api + ?Sized> {
    api: &'a A,
    endpoint: String,
    query: Query,
    cursor: Option<String>,
    done: bool,
}

impl<'a, A: Api + ?Sized> CursorPages<'a, A> {
    pub fn new(api: &'a A, endpoint: impl Into<String>, query: Query) -> Self {
        Self {
            api,
            endpoint: endpoint.into(),
            query,
            cursor: None,
            done: false,
        }
    }

    pub async fn next_page(&mut self) -> Result<Option<Vec<Value>>, ApiError> {
        if self.done {
            return Ok(None);
        }

        let mut query = self.query.clone();
        if let Some(cursor) = &self.cursor {
            query.push(("_cursor".to_string(), cursor.clone()));
        }

        debug!("Fetching {} page at cursor {:?}", self.endpoint, self.cursor);
        let resp = self.api.get(&self.endpoint, &query).await?;

        self.cursor = resp
            .get("cursor_next")
            .and_then(Value::as_str)
            .filter(|cursor| !cursor.is_empty())
            .map(str::to_string);
        self.done = self.cursor.is_none();

        Ok(Some(page_data(&resp)))
    }
}

/// Fetches every item of a stable result set.
pub async fn collect_all<A: Api + ?Sized>(
    api: &A,
    endpoint: &str,
    query: Query,
) -> Result<Vec<Value>, ApiError> {
    let mut pages = OffsetPages::new(api, endpoint, query);
    let mut items = Vec::new();
    while let Some(page) = pages.next_page().await? {
        items.extend(page);
    }
    Ok(items)
}

fn item_id(item: &Value) -> Option<String> {
    item.get("id").and_then(Value::as_str).map(str::to_string)
}

fn page_data(resp: &Value) -> Vec<Value> {
    resp.get("data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}
