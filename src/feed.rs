//! the pagination state machine driving an author's note feed
//!
//! one `Feed` owns all mutable state of the client. commands come in
//! from the presentation side (`submit`, `load_more`,
//! `set_zapped_only`), pages come back from the relay session, and
//! everything meets in a single update entry point so the state
//! invariants hold: the cursor always matches the oldest note, and at
//! most one page is in flight at a time.

use crate::{
    nip19,
    page::{self, PageOutcome},
    session::{Session, SessionError},
    Event, Filter, PubKey, Timestamp, TEXT_NOTE,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::Mutex;

pub const MSG_INVALID_NPUB: &str = "Invalid npub.";
pub const MSG_NO_NOTES: &str = "No notes found for this npub on the connected relay.";

/// the observable state of the feed: one writer, many readers
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    /// accumulated notes, append-only across pages, in relay delivery order
    pub notes: Vec<Event>,
    pub loading: bool,
    pub error: Option<String>,
    pub has_more: bool,
    /// `created_at` of the oldest accumulated note
    pub cursor: Option<Timestamp>,
}

/// everything a query run reads or writes, behind one lock: claiming a
/// page, picking its author and generation, and applying its result all
/// observe the same snapshot
#[derive(Debug, Default)]
struct FeedInner {
    state: FeedState,
    author: Option<PubKey>,
    // each query run gets a generation; results of a superseded run are
    // never applied
    generation: u64,
}

#[derive(Debug, Clone)]
pub struct Feed {
    relays: Vec<String>,
    session: Arc<Mutex<Option<Session>>>,
    inner: Arc<Mutex<FeedInner>>,
    zapped_only: Arc<AtomicBool>,
}

impl Feed {
    /// a feed over the given relay endpoints; connections are opened
    /// lazily on the first query
    pub fn new(relays: Vec<String>) -> Self {
        Self {
            relays,
            session: Arc::new(Mutex::new(None)),
            inner: Arc::new(Mutex::new(FeedInner::default())),
            zapped_only: Arc::new(AtomicBool::new(false)),
        }
    }

    /// snapshot of the current state
    pub async fn state(&self) -> FeedState {
        self.inner.lock().await.state.clone()
    }

    /// stored but not applied to the query or the results; zap
    /// filtering is not implemented
    pub fn set_zapped_only(&self, zapped_only: bool) {
        self.zapped_only.store(zapped_only, Ordering::Relaxed);
    }

    pub fn zapped_only(&self) -> bool {
        self.zapped_only.load(Ordering::Relaxed)
    }

    /// start a fresh feed for the given npub, replacing whatever query
    /// was running before
    pub async fn submit(&self, input: &str) {
        let decoded = nip19::decode_npub(input.trim());

        // the generation bump and the state reset happen under the same
        // lock, so no in-flight page can see one without the other
        let (generation, pubkey) = {
            let mut inner = self.inner.lock().await;
            inner.generation += 1;

            match decoded {
                Ok(pubkey) => {
                    inner.author = Some(pubkey);
                    inner.state = FeedState {
                        loading: true,
                        has_more: true,
                        ..FeedState::default()
                    };
                    (inner.generation, pubkey)
                }
                Err(err) => {
                    log::debug!("rejected author identifier: {}", err);
                    inner.author = None;
                    inner.state = FeedState {
                        error: Some(MSG_INVALID_NPUB.to_string()),
                        ..FeedState::default()
                    };
                    return;
                }
            }
        };

        self.fetch_page(generation, pubkey, None).await;
    }

    /// fetch the next older page, keyed off the current cursor
    ///
    /// a no-op while a page is loading, when the relay said there is
    /// nothing more, or when there is nothing to page from.
    pub async fn load_more(&self) {
        let (generation, author, since) = {
            // check, claim and snapshot under one lock: the guard keeps
            // two pages from racing to extend the same cursor, and the
            // snapshot ties the claimed page to the query it belongs to
            let mut inner = self.inner.lock().await;
            if inner.state.loading || !inner.state.has_more || inner.state.notes.is_empty() {
                return;
            }
            let author = match inner.author {
                Some(pubkey) => pubkey,
                None => return,
            };
            inner.state.loading = true;
            (inner.generation, author, inner.state.cursor)
        };

        self.fetch_page(generation, author, since).await;
    }

    async fn fetch_page(&self, generation: u64, author: PubKey, since: Option<Timestamp>) {
        let session = match self.ensure_session().await {
            Ok(session) => session,
            Err(err) => {
                let mut inner = self.inner.lock().await;
                if inner.generation == generation {
                    inner.state.loading = false;
                    inner.state.error = Some(format!("Failed to connect: {}", err));
                }
                return;
            }
        };

        let filter = Filter {
            kinds: Some(vec![TEXT_NOTE]),
            authors: Some(vec![author]),
            since,
            ..Default::default()
        };
        log::debug!("fetching page with {}", filter);

        let mut sub = session.subscribe(filter).await;
        let outcome = page::collect_page(&mut sub).await;
        sub.stop();

        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            log::debug!("discarding page from a superseded query");
            return;
        }
        apply_outcome(&mut inner.state, since, outcome);
    }

    async fn ensure_session(&self) -> Result<Session, SessionError> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let session = Session::connect(&self.relays).await?;
        *guard = Some(session.clone());
        Ok(session)
    }
}

/// the transition table: fold one page's outcome into the feed state
///
/// every path lands on `loading = false`. `since` tells whether this
/// was the very first page of the query.
fn apply_outcome(state: &mut FeedState, since: Option<Timestamp>, outcome: PageOutcome) {
    state.loading = false;

    match outcome {
        PageOutcome::NonEmpty(events) => {
            state.notes.extend(events);
            state.cursor = state.notes.last().map(|note| note.created_at);
        }
        PageOutcome::Empty => {
            state.has_more = false;
            if since.is_none() {
                state.error = Some(MSG_NO_NOTES.to_string());
            }
        }
        PageOutcome::RelayError(msg) => {
            // has_more is left alone so the user can retry load_more
            state.error = Some(format!("Relay error: {}", msg));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(seed: u8, created_at: u32) -> Event {
        serde_json::from_str(&format!(
            "{{\"id\":\"{}\",\"pubkey\":\"d91191e30e00444b942c0e82cad470b32af171764c2275bee0bd99377efd4075\",\"created_at\":{},\"kind\":1,\"tags\":[],\"content\":\"note {}\",\"sig\":\"{}\"}}",
            format!("{:02x}", seed).repeat(32),
            created_at,
            seed,
            "0".repeat(128),
        ))
        .unwrap()
    }

    fn fetching_state() -> FeedState {
        FeedState {
            loading: true,
            has_more: true,
            ..FeedState::default()
        }
    }

    #[test]
    fn test_empty_first_page_settles_with_message() {
        let mut state = fetching_state();
        apply_outcome(&mut state, None, PageOutcome::Empty);

        assert!(state.notes.is_empty());
        assert!(!state.loading);
        assert!(!state.has_more);
        assert_eq!(state.error.as_deref(), Some(MSG_NO_NOTES));
    }

    #[test]
    fn test_nonempty_page_appends_and_moves_cursor() {
        let mut state = fetching_state();
        apply_outcome(
            &mut state,
            None,
            PageOutcome::NonEmpty(vec![note(1, 100), note(2, 90)]),
        );

        assert_eq!(state.notes.len(), 2);
        assert!(!state.loading);
        assert!(state.has_more);
        assert_eq!(state.cursor, Some(Timestamp(90)));
        assert!(state.error.is_none());

        // next page appends after the existing notes and the cursor
        // follows the new oldest one
        state.loading = true;
        apply_outcome(
            &mut state,
            Some(Timestamp(90)),
            PageOutcome::NonEmpty(vec![note(3, 80)]),
        );
        assert_eq!(state.notes.len(), 3);
        assert_eq!(state.cursor, Some(Timestamp(80)));
        assert_eq!(state.notes[2].created_at, Timestamp(80));
    }

    #[test]
    fn test_empty_continuation_is_silent() {
        let mut state = fetching_state();
        apply_outcome(
            &mut state,
            None,
            PageOutcome::NonEmpty(vec![note(1, 100), note(2, 90)]),
        );

        state.loading = true;
        apply_outcome(&mut state, Some(Timestamp(90)), PageOutcome::Empty);

        assert_eq!(state.notes.len(), 2);
        assert!(!state.loading);
        assert!(!state.has_more);
        assert!(state.error.is_none());
    }

    #[test]
    fn test_relay_error_keeps_notes_and_has_more() {
        let mut state = fetching_state();
        apply_outcome(&mut state, None, PageOutcome::NonEmpty(vec![note(1, 100)]));

        state.loading = true;
        apply_outcome(
            &mut state,
            Some(Timestamp(100)),
            PageOutcome::RelayError("timeout".to_string()),
        );

        assert_eq!(state.notes.len(), 1);
        assert!(!state.loading);
        assert!(state.has_more);
        assert_eq!(state.error.as_deref(), Some("Relay error: timeout"));
    }

    #[tokio::test]
    async fn test_submit_invalid_npub_never_queries() {
        let feed = Feed::new(vec![]);
        feed.submit("abc123").await;

        let state = feed.state().await;
        assert!(state.notes.is_empty());
        assert!(!state.loading);
        assert!(!state.has_more);
        assert_eq!(state.error.as_deref(), Some(MSG_INVALID_NPUB));
    }

    #[tokio::test]
    async fn test_submit_without_reachable_relay_reports_connection_failure() {
        let feed = Feed::new(vec![]);
        feed.submit("npub1mygerccwqpzyh9pvp6pv44rskv40zutkfs38t0hqhkvnwlhagp6s3psn5p")
            .await;

        let state = feed.state().await;
        assert!(state.notes.is_empty());
        assert!(!state.loading);
        assert_eq!(
            state.error.as_deref(),
            Some("Failed to connect: no relay endpoint reachable")
        );
    }

    #[tokio::test]
    async fn test_load_more_before_any_submit_is_a_noop() {
        let feed = Feed::new(vec![]);
        feed.load_more().await;

        let state = feed.state().await;
        assert!(state.notes.is_empty());
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_zapped_only_is_stored_only() {
        let feed = Feed::new(vec![]);
        assert!(!feed.zapped_only());
        feed.set_zapped_only(true);
        assert!(feed.zapped_only());

        // the toggle never touches the observable feed state
        let state = feed.state().await;
        assert!(state.notes.is_empty());
        assert!(state.error.is_none());
    }
}
