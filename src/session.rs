use crate::{
    relay::{CloseReason, Occurrence, Relay},
    Filter, ID,
};
use dashmap::DashSet;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use tokio::sync::mpsc;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("invalid relay URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("no relay endpoint reachable")]
    NoRelayReachable,
}

/// a set of live relay connections serving one feed
#[derive(Debug, Clone)]
pub struct Session {
    relays: Vec<Relay>,
}

impl Session {
    /// connect to every endpoint that answers; fails only when none does
    pub async fn connect(urls: &[String]) -> Result<Self, SessionError> {
        let mut candidates = Vec::with_capacity(urls.len());
        for url in urls {
            candidates.push(crate::normalize_url(url)?);
        }

        let attempts = candidates.into_iter().map(|url| async move {
            match Relay::connect(url.clone(), None).await {
                Ok(relay) => Some(relay),
                Err(err) => {
                    log::info!("[{}] connect failed: {}", url.as_str(), err);
                    None
                }
            }
        });

        let relays: Vec<Relay> = futures::future::join_all(attempts)
            .await
            .into_iter()
            .flatten()
            .collect();

        if relays.is_empty() {
            return Err(SessionError::NoRelayReachable);
        }

        Ok(Self { relays })
    }

    pub fn relay_count(&self) -> usize {
        self.relays.len()
    }

    /// subscribe on all connected relays, merged into one stream
    ///
    /// events are deduplicated by id; one EOSE is emitted after every
    /// relay has either EOSE'd or dropped out. a Close is surfaced only
    /// when no relay managed to deliver an EOSE, so a single flaky
    /// relay does not fail a page that others completed.
    pub async fn subscribe(&self, filter: Filter) -> SessionSubscription {
        let (tx, rx) = mpsc::channel(256);
        let seen_ids = Arc::new(DashSet::<ID>::new());
        let remaining = Arc::new(AtomicUsize::new(self.relays.len()));
        let any_eose = Arc::new(AtomicBool::new(false));

        for relay in &self.relays {
            let filter = filter.clone();
            let relay = relay.clone();
            let tx = tx.clone();
            let seen_ids = seen_ids.clone();
            let remaining = remaining.clone();
            let any_eose = any_eose.clone();

            tokio::spawn(async move {
                let mut sub = relay.subscribe(filter).await;
                let mut eosed = false;
                let mut close_reason = None;

                while let Some(occ) = sub.occurrences.recv().await {
                    match occ {
                        Occurrence::Event(event) => {
                            if !seen_ids.insert(event.id) {
                                // another relay already delivered this one
                                continue;
                            }
                            if tx.send(Occurrence::Event(event)).await.is_err() {
                                // listener went away
                                sub.stop().await;
                                return;
                            }
                        }
                        Occurrence::Eose => {
                            eosed = true;
                            any_eose.store(true, Ordering::SeqCst);
                            break;
                        }
                        Occurrence::Close(reason) => {
                            close_reason = Some(reason);
                            break;
                        }
                    }
                }

                sub.stop().await;

                if !eosed && close_reason.is_none() {
                    // channel ended without a terminal signal
                    close_reason = Some(CloseReason::ConnectionError);
                }

                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    // last relay to settle decides the terminal signal
                    if any_eose.load(Ordering::SeqCst) {
                        let _ = tx.send(Occurrence::Eose).await;
                    } else if let Some(reason) = close_reason {
                        let _ = tx.send(Occurrence::Close(reason)).await;
                    }
                }
            });
        }

        drop(tx);
        SessionSubscription { occurrences: rx }
    }
}

/// the merged subscription for one page
#[derive(Debug)]
pub struct SessionSubscription {
    pub occurrences: mpsc::Receiver<Occurrence>,
}

impl SessionSubscription {
    /// stop the page: closes the merged stream, which makes every
    /// per-relay forwarder send CLOSE and exit. idempotent.
    pub fn stop(&mut self) {
        self.occurrences.close();
    }
}
