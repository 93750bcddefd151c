//! Certstream message schema.
//!
//! Every frame pushed by a certstream server is one JSON document with a
//! `message_type` discriminator and a `data` payload describing a single
//! certificate-transparency log entry. Only `message_type` is required:
//! payload fields that are missing or `null` upstream decode to their empty
//! value, and unknown fields are ignored.

/// Date and time types returned by the timestamp accessors.
pub use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnNull, serde_as};

use crate::Result;
use crate::error::Kind;
use crate::serde_helpers::decode_with_warnings;
use crate::ws::WsError;

/// Discriminator of the periodic keepalive events sent by the server.
pub const HEARTBEAT: &str = "heartbeat";

/// Discriminator of ordinary certificate events.
pub const CERTIFICATE_UPDATE: &str = "certificate_update";

/// Top-level certstream message.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Message {
    /// Event kind, e.g. `certificate_update` or `heartbeat`
    pub message_type: String,
    /// Log entry payload. Server heartbeats carry no payload, which leaves this empty.
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub data: Data,
}

impl Message {
    /// Decode one frame payload, as the reader does for every text or binary frame.
    ///
    /// Failures are [`Kind::Decode`] errors carrying [`WsError::MessageParse`].
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        decode_with_warnings(bytes).map_err(|e| WsError::MessageParse(e).into_error(Kind::Decode))
    }

    /// Whether this is a server keepalive event rather than a log entry.
    #[must_use]
    pub fn is_heartbeat(&self) -> bool {
        self.message_type == HEARTBEAT
    }

    #[must_use]
    pub fn is_certificate_update(&self) -> bool {
        self.message_type == CERTIFICATE_UPDATE
    }
}

/// One certificate-transparency log entry.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Data {
    /// Position of the entry within its log
    #[serde_as(as = "DefaultOnNull")]
    pub cert_index: u64,
    /// URL from which the raw entry can be fetched
    #[serde_as(as = "DefaultOnNull")]
    pub cert_link: String,
    #[serde_as(as = "DefaultOnNull")]
    pub leaf_cert: LeafCert,
    /// When the server observed the entry, in fractional seconds since the epoch
    #[serde_as(as = "DefaultOnNull")]
    pub seen: f64,
    /// The CT log the entry was read from
    #[serde_as(as = "DefaultOnNull")]
    pub source: Source,
    /// Entry type, e.g. `X509LogEntry` or `PrecertLogEntry`
    #[serde_as(as = "DefaultOnNull")]
    pub update_type: String,
}

impl Data {
    /// [`Self::seen`] as a timestamp, `None` when absent or out of range.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "Microsecond precision is all the server provides"
    )]
    pub fn seen_time(&self) -> Option<DateTime<Utc>> {
        if !self.seen.is_finite() || self.seen <= 0.0 {
            return None;
        }

        DateTime::from_timestamp_micros((self.seen * 1_000_000.0).round() as i64)
    }
}

/// The leaf (end-entity) certificate of a log entry.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LeafCert {
    /// Subject common name plus every subject alternative name
    #[serde_as(as = "DefaultOnNull")]
    pub all_domains: Vec<String>,
    #[serde_as(as = "DefaultOnNull")]
    pub extensions: Extensions,
    /// Colon-separated SHA-1 fingerprint
    #[serde_as(as = "DefaultOnNull")]
    pub fingerprint: String,
    /// End of the validity window, in seconds since the epoch
    #[serde_as(as = "DefaultOnNull")]
    pub not_after: i64,
    /// Start of the validity window, in seconds since the epoch
    #[serde_as(as = "DefaultOnNull")]
    pub not_before: i64,
    #[serde_as(as = "DefaultOnNull")]
    pub serial_number: String,
    #[serde_as(as = "DefaultOnNull")]
    pub signature_algorithm: String,
    #[serde_as(as = "DefaultOnNull")]
    pub subject: Name,
    #[serde_as(as = "DefaultOnNull")]
    pub issuer: Name,
    #[serde_as(as = "DefaultOnNull")]
    pub is_ca: bool,
}

impl LeafCert {
    #[must_use]
    pub fn not_before_time(&self) -> Option<DateTime<Utc>> {
        epoch_seconds(self.not_before)
    }

    #[must_use]
    pub fn not_after_time(&self) -> Option<DateTime<Utc>> {
        epoch_seconds(self.not_after)
    }
}

fn epoch_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }

    DateTime::from_timestamp(seconds, 0)
}

/// X.509v3 extensions, rendered by the server as human-readable strings.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Extensions {
    #[serde_as(as = "DefaultOnNull")]
    pub authority_info_access: String,
    #[serde_as(as = "DefaultOnNull")]
    pub authority_key_identifier: String,
    #[serde_as(as = "DefaultOnNull")]
    pub basic_constraints: String,
    #[serde_as(as = "DefaultOnNull")]
    pub certificate_policies: String,
    /// Set on precertificates carrying the CT poison extension
    #[serde_as(as = "DefaultOnNull")]
    pub ctl_poison_byte: bool,
    #[serde_as(as = "DefaultOnNull")]
    pub extended_key_usage: String,
    #[serde_as(as = "DefaultOnNull")]
    pub key_usage: String,
    #[serde_as(as = "DefaultOnNull")]
    pub subject_alt_name: String,
    #[serde_as(as = "DefaultOnNull")]
    pub subject_key_identifier: String,
}

/// Distinguished name of a certificate subject or issuer.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Name {
    /// Country
    #[serde(rename = "C")]
    #[serde_as(as = "DefaultOnNull")]
    pub country: String,
    /// Common name
    #[serde(rename = "CN")]
    #[serde_as(as = "DefaultOnNull")]
    pub common_name: String,
    /// Locality
    #[serde(rename = "L")]
    #[serde_as(as = "DefaultOnNull")]
    pub locality: String,
    /// Organization
    #[serde(rename = "O")]
    #[serde_as(as = "DefaultOnNull")]
    pub organization: String,
    /// Organizational unit
    #[serde(rename = "OU")]
    #[serde_as(as = "DefaultOnNull")]
    pub organizational_unit: String,
    /// State or province
    #[serde(rename = "ST")]
    #[serde_as(as = "DefaultOnNull")]
    pub state: String,
    /// All components joined in `/C=../CN=..` form
    #[serde_as(as = "DefaultOnNull")]
    pub aggregated: String,
    #[serde_as(as = "DefaultOnNull")]
    pub email_address: String,
}

/// The CT log an entry came from.
#[serde_as]
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Source {
    #[serde_as(as = "DefaultOnNull")]
    pub name: String,
    #[serde_as(as = "DefaultOnNull")]
    pub url: String,
}
