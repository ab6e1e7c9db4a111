//! # Payload Fingerprint
//!
//! The confidentiality step applied before transport. It is a one-way digest,
//! not encryption: the original content cannot be recovered from an envelope.
//!
//! ## Canonical Encoding
//!
//! Message content is a [`serde_json::Value`], hashed as compact JSON with
//! object keys sorted at every depth. The sort is explicit, so the encoding
//! does not depend on the map type `serde_json` was built with
//! (`preserve_order` keeps insertion order). `{"a":1,"b":2}` and
//! `{"b":2,"a":1}` hash identically. Array order is significant.
//! The digest is SHA-256, rendered as 64 lowercase hex characters.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error parsing a hex fingerprint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid fingerprint: {0}")]
pub struct FingerprintParseError(String);

/// SHA-256 digest of a message's canonical encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint a message.
    #[must_use]
    pub fn of(message: &Value) -> Self {
        Self::of_bytes(canonical(message).to_string().as_bytes())
    }

    /// Fingerprint raw bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(bytes));
        Self(digest)
    }

    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Copy of `value` with every object's keys inserted in sorted order.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut entries: Vec<(&String, &Value)> = object.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(key, value)| (key.clone(), canonical(value)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| FingerprintParseError(e.to_string()))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| FingerprintParseError(format!("expected 32 bytes in {s:?}")))?;
        Ok(Self(digest))
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.to_string()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
