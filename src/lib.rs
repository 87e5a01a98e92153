//! # notefeed
//!
//! a session-scoped client for reading one author's text notes from
//! nostr relays, one page at a time.
//!
//! the entry point is [`Feed`]: give it relay endpoints, submit an
//! npub, observe [`FeedState`], call [`Feed::load_more`] to walk back
//! through older notes.

pub mod envelopes;
pub mod event;
pub mod feed;
pub mod filter;
pub mod keys;
pub mod nip19;
pub mod page;
pub mod timestamp;
pub mod types;
pub mod view;

mod normalize;
mod relay;
mod session;

// re-export commonly used types
pub use event::Event;
pub use feed::{Feed, FeedState};
pub use filter::Filter;
pub use keys::PubKey;
pub use normalize::normalize_url;
pub use page::{PageEnd, PageOutcome};
pub use relay::{CloseReason, ConnectError, Occurrence, Relay, Subscription};
pub use session::{Session, SessionError, SessionSubscription};
pub use timestamp::Timestamp;
pub use types::*;
