use tracing::debug;
use uuid::Uuid;

use gigdesk_api::{ApiError, ChatApi};
use gigdesk_types::models::Message;

/// Messages per history page.
pub const PAGE_SIZE: u32 = 20;

/// One page of history in chronological order.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub messages: Vec<Message>,
    pub is_last_page: bool,
}

/// Fetch page `page` (1-based) of a chat's history.
///
/// The server answers newest-first; the page is reversed so it can be
/// prepended as-is. A short page is the last one.
pub async fn load_page<A>(api: &A, chat_id: Uuid, page: u32) -> Result<Page, ApiError>
where
    A: ChatApi + ?Sized,
{
    let mut messages = api.messages(chat_id, page, PAGE_SIZE).await?;
    let is_last_page = messages.len() < PAGE_SIZE as usize;
    messages.reverse();
    debug!(
        "loaded history page {} of chat {} ({} messages, last: {})",
        page,
        chat_id,
        messages.len(),
        is_last_page
    );
    Ok(Page {
        messages,
        is_last_page,
    })
}

/// Ticket for an in-flight page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    generation: u64,
}

/// Paging cursor for backward history loading.
///
/// Requests are split into `begin_*` (claims the single in-flight slot) and
/// [`complete`](Self::complete) (releases it), so the network call itself
/// runs without holding the fetcher.
#[derive(Debug)]
pub struct HistoryFetcher {
    cursor: u32,
    has_more: bool,
    in_flight: bool,
    generation: u64,
}

impl Default for HistoryFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryFetcher {
    pub fn new() -> Self {
        Self {
            cursor: 0,
            has_more: true,
            in_flight: false,
            generation: 0,
        }
    }

    /// A fetcher with the initial page already claimed.
    pub fn start() -> (Self, PageRequest) {
        let mut fetcher = Self::new();
        fetcher.in_flight = true;
        let request = PageRequest {
            page: 1,
            generation: fetcher.generation,
        };
        (fetcher, request)
    }

    /// Last page loaded, 0 before the initial load.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Claim the initial page. `None` if it was already loaded or is loading.
    pub fn begin_initial(&mut self) -> Option<PageRequest> {
        if self.cursor != 0 {
            return None;
        }
        self.claim(1)
    }

    /// Claim the next older page. `None` while a request is in flight, before
    /// the initial load, or once the history is exhausted.
    pub fn begin_older(&mut self) -> Option<PageRequest> {
        if self.cursor == 0 || !self.has_more {
            return None;
        }
        self.claim(self.cursor + 1)
    }

    fn claim(&mut self, page: u32) -> Option<PageRequest> {
        if self.in_flight {
            return None;
        }
        self.in_flight = true;
        Some(PageRequest {
            page,
            generation: self.generation,
        })
    }

    /// Settle a request. Returns `None` for a response that belongs to an
    /// invalidated generation; it must be dropped.
    ///
    /// On failure cursor and `has_more` are untouched so the same page is
    /// requested again next time.
    pub fn complete<E>(
        &mut self,
        request: PageRequest,
        result: Result<Page, E>,
    ) -> Option<Result<Vec<Message>, E>> {
        if request.generation != self.generation {
            debug!("discarding stale history page {}", request.page);
            return None;
        }
        self.in_flight = false;
        Some(result.map(|page| {
            self.cursor = request.page;
            if page.is_last_page {
                self.has_more = false;
            }
            page.messages
        }))
    }

    /// Forget everything and reject responses still in flight.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.cursor = 0;
        self.has_more = true;
        self.in_flight = false;
    }
}
