use crate::Event;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("empty message")]
    EmptyMessage,
    #[error("invalid label")]
    InvalidLabel,
    #[error("invalid {0} envelope")]
    InvalidEnvelope(String),
    #[error("unknown envelope label: {0}")]
    UnknownLabel(String),
    #[error("JSON parsing error")]
    Json(#[from] serde_json::Error),
}

/// relay-to-client messages this client cares about
///
/// the outgoing side (REQ/CLOSE) is assembled by hand at the relay
/// boundary, so only incoming envelopes are modeled here.
#[derive(Debug, Clone)]
pub enum Envelope {
    Event {
        subscription_id: String,
        event: Event,
    },
    Eose {
        subscription_id: String,
    },
    Closed {
        subscription_id: String,
        reason: String,
    },
    Notice(String),
}

/// parse a relay message into an envelope
pub fn parse_message(message: &str) -> Result<Envelope, EnvelopeError> {
    let arr: Vec<Value> = serde_json::from_str(message)?;
    if arr.is_empty() {
        return Err(EnvelopeError::EmptyMessage);
    }

    let label = arr[0].as_str().ok_or(EnvelopeError::InvalidLabel)?;

    match label {
        "EVENT" => {
            if arr.len() < 3 {
                return Err(EnvelopeError::InvalidEnvelope("EVENT".to_string()));
            }
            Ok(Envelope::Event {
                subscription_id: arr[1]
                    .as_str()
                    .ok_or(EnvelopeError::InvalidEnvelope("EVENT".to_string()))?
                    .to_string(),
                event: serde_json::from_value(arr[2].clone())?,
            })
        }
        "EOSE" => {
            if arr.len() < 2 {
                return Err(EnvelopeError::InvalidEnvelope("EOSE".to_string()));
            }
            Ok(Envelope::Eose {
                subscription_id: arr[1]
                    .as_str()
                    .ok_or(EnvelopeError::InvalidEnvelope("EOSE".to_string()))?
                    .to_string(),
            })
        }
        "CLOSED" => {
            if arr.len() < 3 {
                return Err(EnvelopeError::InvalidEnvelope("CLOSED".to_string()));
            }
            Ok(Envelope::Closed {
                subscription_id: arr[1]
                    .as_str()
                    .ok_or(EnvelopeError::InvalidEnvelope("CLOSED".to_string()))?
                    .to_string(),
                reason: arr[2]
                    .as_str()
                    .ok_or(EnvelopeError::InvalidEnvelope("CLOSED".to_string()))?
                    .to_string(),
            })
        }
        "NOTICE" => {
            if arr.len() < 2 {
                return Err(EnvelopeError::InvalidEnvelope("NOTICE".to_string()));
            }
            Ok(Envelope::Notice(
                arr[1]
                    .as_str()
                    .ok_or(EnvelopeError::InvalidEnvelope("NOTICE".to_string()))?
                    .to_string(),
            ))
        }
        _ => Err(EnvelopeError::UnknownLabel(label.to_string())),
    }
}
