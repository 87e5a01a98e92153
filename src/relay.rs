use crate::{
    envelopes::{self, Envelope},
    Filter,
};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::{
    connect_async_tls_with_config,
    tungstenite::{client::IntoClientRequest, Message},
};
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(7);

#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("relay connection error")]
    Websocket,

    #[error("relay connection timed out")]
    Timeout,
}

/// why a subscription stopped delivering
#[derive(Debug, Clone)]
pub enum CloseReason {
    ConnectionClosedByThem(Option<String>),
    ConnectionError,
    ClosedByThemWithReason(String),
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloseReason::ConnectionClosedByThem(Some(msg)) => write!(f, "{}", msg),
            CloseReason::ConnectionClosedByThem(None) => write!(f, "connection closed"),
            CloseReason::ConnectionError => write!(f, "connection error"),
            CloseReason::ClosedByThemWithReason(reason) => write!(f, "{}", reason),
        }
    }
}

/// what a subscription emits: zero or more events, then either a single
/// EOSE or a close
#[derive(Debug)]
pub enum Occurrence {
    Event(crate::Event),
    Eose,
    Close(CloseReason),
}

#[derive(Debug)]
struct SubSender {
    occurrences_sender: mpsc::Sender<Occurrence>,
    filter: Filter,
}

#[derive(Debug, Clone)]
pub struct Relay {
    pub url: Url,
    // by connection
    write_queue: mpsc::Sender<String>,

    // by subscription
    subs: Arc<DashMap<String, SubSender>>,
    serial: Arc<AtomicU64>,
}

impl Relay {
    pub async fn connect(
        url: Url,
        mut on_close: Option<oneshot::Sender<String>>,
    ) -> Result<Self, ConnectError> {
        let (write_sender, mut write_receiver) = mpsc::channel(1);

        // connect
        let (ws_stream, _) = tokio::time::timeout(
            CONNECT_TIMEOUT,
            connect_async_tls_with_config(
                url.as_str()
                    .into_client_request()
                    .map_err(|_| ConnectError::Websocket)?,
                None,
                false,
                None,
            ),
        )
        .await
        .map_err(|_| ConnectError::Timeout)?
        .map_err(|_| ConnectError::Websocket)?;

        let (conn_write, mut conn_read) = ws_stream.split();
        let writer = Arc::new(Mutex::new(conn_write));

        let relay = Self {
            url: url.clone(),
            write_queue: write_sender,
            subs: Arc::new(DashMap::new()),
            serial: Arc::new(AtomicU64::new(0)),
        };

        // start write queue handler
        let queue_writer = writer.clone();
        tokio::spawn(async move {
            while let Some(text) = write_receiver.recv().await {
                let _ = queue_writer.lock().await.send(Message::text(text)).await;
            }
        });

        // start ping handler
        let ping_writer = writer.clone();
        tokio::spawn(async move {
            let mut ping_interval = tokio::time::interval(Duration::from_secs(29));
            ping_interval.tick().await; // first tick fires immediately
            loop {
                ping_interval.tick().await;
                if let Err(err) = ping_writer
                    .lock()
                    .await
                    .send(Message::Ping(vec![].into()))
                    .await
                {
                    log::info!("ping failed: {}", err);
                    break;
                }
            }
        });

        // start message reader
        let pong_writer = writer.clone();
        let subs = relay.subs.clone();
        let relay_url = relay.url.clone();
        tokio::spawn(async move {
            loop {
                match conn_read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        log::debug!("got message from {}: {}", &relay_url, text.as_str());
                        handle_relay_message(text.as_str(), &subs, &relay_url).await;
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = pong_writer.lock().await.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let close_msg = frame.map_or("broken close".to_string(), |c| {
                            format!("close ({}) {}", c.code, c.reason)
                        });

                        if let Some(on_close) = on_close.take() {
                            let _ = on_close.send(close_msg.clone());
                        }
                        drain_subs(
                            &subs,
                            CloseReason::ConnectionClosedByThem(Some(close_msg)),
                        )
                        .await;
                        return;
                    }
                    Some(Err(err)) => {
                        if let Some(on_close) = on_close.take() {
                            let _ = on_close.send(format!("error: {}", err));
                        }
                        drain_subs(&subs, CloseReason::ConnectionError).await;
                        return;
                    }
                    Some(Ok(_)) => continue,
                    None => {
                        if let Some(on_close) = on_close.take() {
                            let _ = on_close.send("stream ended".to_string());
                        }
                        drain_subs(&subs, CloseReason::ConnectionClosedByThem(None)).await;
                        return;
                    }
                }
            }
        });

        Ok(relay)
    }

    /// open a subscription for events matching a filter
    ///
    /// the subscription does not end by itself on EOSE; the caller
    /// decides when to stop it.
    pub async fn subscribe(&self, filter: Filter) -> Subscription {
        let id = format!("{}", self.serial.fetch_add(1, Ordering::Relaxed));
        let (occurrences_sender, occurrences) = mpsc::channel::<Occurrence>(1);

        let reqmsg = format!(
            "[\"REQ\",\"{}\",{}]",
            id,
            serde_json::to_string(&filter).unwrap()
        );
        let closemsg = format!("[\"CLOSE\",\"{}\"]", id);

        self.subs.insert(
            id.clone(),
            SubSender {
                occurrences_sender: occurrences_sender.clone(),
                filter,
            },
        );

        // when the listener stops listening from this subscription we close it automatically
        let write_queue = self.write_queue.clone();
        let subs = self.subs.clone();
        let auto_id = id.clone();
        let auto_closemsg = closemsg.clone();
        tokio::spawn(async move {
            occurrences_sender.closed().await;
            if subs.remove(&auto_id).is_some() {
                let _ = write_queue.send(auto_closemsg).await;
            }
        });

        let _ = self.write_queue.send(reqmsg).await.map_err(|err| {
            log::warn!(
                "[{}] failed to fire subscription: {}",
                self.url.as_str(),
                err
            )
        });

        Subscription {
            id,
            occurrences,
            closemsg,
            write_queue: self.write_queue.clone(),
            subs: self.subs.clone(),
            stopped: false,
        }
    }
}

impl std::fmt::Display for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<relay url={}>", self.url)
    }
}

/// a single open REQ against one relay
pub struct Subscription {
    pub id: String,
    pub occurrences: mpsc::Receiver<Occurrence>,

    closemsg: String,
    write_queue: mpsc::Sender<String>,
    subs: Arc<DashMap<String, SubSender>>,
    stopped: bool,
}

impl Subscription {
    /// stop this subscription, releasing the relay-side resources
    ///
    /// idempotent; late events for the old id are dropped by the relay
    /// reader since the registry entry is gone.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        if self.subs.remove(&self.id).is_some() {
            let _ = self.write_queue.send(self.closemsg.clone()).await;
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("stopped", &self.stopped)
            .finish()
    }
}

async fn drain_subs(subs: &DashMap<String, SubSender>, reason: CloseReason) {
    let ids: Vec<String> = subs.iter().map(|entry| entry.key().clone()).collect();
    for id in ids {
        if let Some((_, sub)) = subs.remove(&id) {
            let _ = sub
                .occurrences_sender
                .send(Occurrence::Close(reason.clone()))
                .await;
        }
    }
}

#[inline]
async fn handle_relay_message(message: &str, subs: &DashMap<String, SubSender>, relay_url: &Url) {
    match envelopes::parse_message(message) {
        Ok(Envelope::Event {
            subscription_id,
            event,
        }) => {
            let sender = match subs.get(&subscription_id) {
                Some(sub) => {
                    if !sub.filter.matches(&event) {
                        // relay sent something we didn't ask for
                        return;
                    }
                    sub.occurrences_sender.clone()
                }
                None => return, // stale subscription, already stopped
            };
            let _ = sender.send(Occurrence::Event(event)).await;
        }
        Ok(Envelope::Eose { subscription_id }) => {
            let sender = match subs.get(&subscription_id) {
                Some(sub) => sub.occurrences_sender.clone(),
                None => return,
            };
            let _ = sender.send(Occurrence::Eose).await;
        }
        Ok(Envelope::Closed {
            subscription_id,
            reason,
        }) => {
            if let Some((_, sub)) = subs.remove(&subscription_id) {
                let _ = sub
                    .occurrences_sender
                    .send(Occurrence::Close(CloseReason::ClosedByThemWithReason(
                        reason,
                    )))
                    .await;
            }
        }
        Ok(Envelope::Notice(notice)) => {
            log::info!("[{}] received notice: {}", relay_url.as_str(), notice);
        }
        Err(err) => {
            log::info!("[{}] wrong message: {}", relay_url.as_str(), err);
        }
    }
}
