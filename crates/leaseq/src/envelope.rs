//! Job envelope codec.
//!
//! A job message body is a JSON object carrying the job name and the opaque
//! payload as standard base64:
//!
//! ```json
//! {"name":"send-email","payload":"aGVsbG8="}
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A named job payload, as stored in a queue message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Registered job name used to look up the handler.
    pub name: String,
    /// Opaque payload handed to the handler unchanged.
    pub payload: Vec<u8>,
}

#[derive(Serialize)]
struct EncodedRef<'a> {
    name: &'a str,
    payload: String,
}

#[derive(Deserialize)]
struct Encoded {
    name: String,
    payload: String,
}

impl Envelope {
    /// Create an envelope.
    pub fn new(name: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }

    /// Encode a job name and payload into a message body.
    pub fn encode(name: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let encoded = EncodedRef {
            name,
            payload: STANDARD.encode(payload),
        };
        Ok(serde_json::to_vec(&encoded)?)
    }

    /// Decode a message body produced by [`Envelope::encode`].
    ///
    /// Fails on anything else; the runner treats that as a poison message.
    pub fn decode(body: &[u8]) -> Result<Self> {
        let encoded: Encoded = serde_json::from_slice(body)?;
        let payload = STANDARD.decode(encoded.payload)?;
        Ok(Self {
            name: encoded.name,
            payload,
        })
    }

    /// Encode this envelope into a message body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Self::encode(&self.name, &self.payload)
    }
}
