//! classification of what one page's subscription delivered
//!
//! kept apart from the feed state machine so the "what happened"
//! decision can be tested without any relay wiring.

use crate::{
    relay::{CloseReason, Occurrence},
    session::SessionSubscription,
    Event,
};

/// how one page's query lifetime ended
#[derive(Debug)]
pub enum PageEnd {
    Eose,
    Close(CloseReason),
    Disconnected,
}

/// the outcome of one page, as fed into the feed transition table
#[derive(Debug)]
pub enum PageOutcome {
    NonEmpty(Vec<Event>),
    Empty,
    RelayError(String),
}

/// pure classification of a finished page
///
/// a close before EOSE is a relay failure and discards the partial
/// batch: events only ever reach the feed through a completed page.
pub fn classify(events: Vec<Event>, end: PageEnd) -> PageOutcome {
    match end {
        PageEnd::Eose => {
            if events.is_empty() {
                PageOutcome::Empty
            } else {
                PageOutcome::NonEmpty(events)
            }
        }
        PageEnd::Close(reason) => PageOutcome::RelayError(reason.to_string()),
        PageEnd::Disconnected => PageOutcome::RelayError("connection closed".to_string()),
    }
}

/// drain a page's subscription until its terminal signal
///
/// the relay contract guarantees all events of a page arrive before
/// EOSE or an error, so batching here is safe.
pub async fn collect_page(sub: &mut SessionSubscription) -> PageOutcome {
    let mut events = Vec::new();

    loop {
        match sub.occurrences.recv().await {
            Some(Occurrence::Event(event)) => events.push(event),
            Some(Occurrence::Eose) => return classify(events, PageEnd::Eose),
            Some(Occurrence::Close(reason)) => return classify(events, PageEnd::Close(reason)),
            None => return classify(events, PageEnd::Disconnected),
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

    #[test]
    fn test_classify_eose() {
        assert!(matches!(classify(vec![], PageEnd::Eose), PageOutcome::Empty));

        match classify(vec![note(1, 100), note(2, 90)], PageEnd::Eose) {
            PageOutcome::NonEmpty(events) => {
                assert_eq!(events.len(), 2);
                assert_eq!(events[0].created_at.0, 100);
                assert_eq!(events[1].created_at.0, 90);
            }
            other => panic!("expected NonEmpty, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_close_discards_partial_batch() {
        match classify(
            vec![note(1, 100)],
            PageEnd::Close(CloseReason::ClosedByThemWithReason("timeout".to_string())),
        ) {
            PageOutcome::RelayError(msg) => assert_eq!(msg, "timeout"),
            other => panic!("expected RelayError, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_disconnect() {
        assert!(matches!(
            classify(vec![], PageEnd::Disconnected),
            PageOutcome::RelayError(_)
        ));
    }
}
