//! NIP-19: bech32-encoded entities
//!
//! only the `npub` entity is understood here: it is the one form of
//! author identifier this client accepts.

use crate::{keys::PubKeyError, PubKey};
use bech32::{self, FromBase32, ToBase32, Variant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("invalid bech32: {0}")]
    Bech32(#[from] bech32::Error),

    #[error("expected an npub, got '{0}'")]
    WrongPrefix(String),

    #[error("npub should be 32 bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid public key: {0}")]
    Key(#[from] PubKeyError),
}

/// decode a bech32-encoded npub into a public key
///
/// pure and synchronous; anything that is not a well-formed npub with a
/// valid x-only point payload is an error value.
pub fn decode_npub(input: &str) -> Result<PubKey, DecodeError> {
    let (prefix, data, _variant) = bech32::decode(input)?;
    if prefix != "npub" {
        return Err(DecodeError::WrongPrefix(prefix));
    }

    let data = Vec::<u8>::from_base32(&data)?;
    if data.len() != 32 {
        return Err(DecodeError::InvalidLength(data.len()));
    }

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&data);
    Ok(PubKey::from_bytes(bytes)?)
}

/// encode a public key as npub
pub fn encode_npub(pk: &PubKey) -> String {
    let bits5 = pk.as_bytes().to_base32();
    bech32::encode("npub", bits5, Variant::Bech32)
        .expect("npub prefix and 32-byte payload are always encodable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_npub() {
        let pk =
            PubKey::from_hex("d91191e30e00444b942c0e82cad470b32af171764c2275bee0bd99377efd4075")
                .unwrap();
        let npub = encode_npub(&pk);
        assert_eq!(
            npub,
            "npub1mygerccwqpzyh9pvp6pv44rskv40zutkfs38t0hqhkvnwlhagp6s3psn5p"
        );

        let decoded = decode_npub(&npub).unwrap();
        assert_eq!(decoded, pk);
    }

    #[test]
    fn test_rejects_other_prefixes() {
        // a perfectly fine nsec is still not an npub
        let nsec = "nsec1lcs0xwqmjszwng66ldym8hq8pfxurl7nyx4c704wj7dtjmmqrcaqazp4dg";
        match decode_npub(nsec) {
            Err(DecodeError::WrongPrefix(p)) => assert_eq!(p, "nsec"),
            other => panic!("expected WrongPrefix, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(decode_npub("abc123").is_err());
        assert!(decode_npub("").is_err());
        assert!(decode_npub("npub1qqqqqqqq").is_err());
    }
}
