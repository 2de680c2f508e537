//! Size-bounded transport envelope for shipping a feed between pipeline
//! stages, plus the small wire shapes of the other pipeline messages.
//!
//! A feed whose JSON form fits under the transport limit travels inline;
//! anything larger is gzipped and base64-encoded so the envelope stays
//! representable as text. Decoding a malformed payload is always an
//! error — downstream stages cannot proceed without a valid feed.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Feed;

/// Largest feed serialization shipped inline, in bytes.
pub const MAX_INLINE_SIZE: usize = 256 * 1024;

/// Codec failures; never silently swallowed.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize feed: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("envelope payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("envelope payload is not valid gzip: {0}")]
    Gzip(#[source] std::io::Error),

    #[error("envelope payload is not a valid feed: {0}")]
    Deserialize(#[source] serde_json::Error),

    #[error("envelope carries no feed")]
    Empty,
}

/// Wire shape: `{rss?, compressed, data?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "rss", default, skip_serializing_if = "Option::is_none")]
    pub feed: Option<Feed>,
    pub compressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Envelope {
    /// Wraps a feed, compressing when its JSON form exceeds
    /// [`MAX_INLINE_SIZE`].
    pub fn encode(feed: Feed) -> Result<Self, CodecError> {
        let json = serde_json::to_vec(&feed).map_err(CodecError::Serialize)?;
        if json.len() <= MAX_INLINE_SIZE {
            return Ok(Envelope {
                feed: Some(feed),
                compressed: false,
                data: None,
            });
        }

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&json).map_err(CodecError::Gzip)?;
        let compressed = encoder.finish().map_err(CodecError::Gzip)?;

        Ok(Envelope {
            feed: None,
            compressed: true,
            data: Some(BASE64.encode(compressed)),
        })
    }

    /// Unwraps the carried feed, reversing compression when present.
    pub fn decode(self) -> Result<Feed, CodecError> {
        if !self.compressed {
            return self.feed.ok_or(CodecError::Empty);
        }

        let data = self.data.ok_or(CodecError::Empty)?;
        let compressed = BASE64.decode(data.as_bytes())?;

        let mut json = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut json)
            .map_err(CodecError::Gzip)?;

        serde_json::from_slice(&json).map_err(CodecError::Deserialize)
    }

    /// The envelope as a transport message payload.
    pub fn to_message(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(CodecError::Serialize)
    }

    /// Parses an envelope out of a transport message payload.
    pub fn from_message(message: &str) -> Result<Self, CodecError> {
        serde_json::from_str(message).map_err(CodecError::Deserialize)
    }
}

/// Asks the pipeline to fetch one feed URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscribe {
    pub feed_url: String,
}

/// Asks the pipeline to drop a stored feed and its items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Feed, Guid, Item};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn small_feed() -> Feed {
        let mut feed = Feed::new(
            "Example Feed",
            "example.com",
            "https://example.com/rss",
            "a feed",
            "en",
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        )
        .unwrap();
        feed.add_or_update_item(
            Item::new(
                Guid::from("g1"),
                "Post one",
                "https://example.com/1",
                "short description",
                "author",
                Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            )
            .unwrap(),
        );
        feed
    }

    fn oversized_feed() -> Feed {
        let mut feed = small_feed();
        // A single ~400 KiB description pushes the JSON form well past the
        // inline limit.
        feed.add_or_update_item(
            Item::new(
                Guid::from("big"),
                "Big post",
                "https://example.com/big",
                "x".repeat(400 * 1024),
                "author",
                Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            )
            .unwrap(),
        );
        feed
    }

    #[test]
    fn small_feed_travels_inline() {
        let feed = small_feed();
        let envelope = Envelope::encode(feed.clone()).unwrap();

        assert!(!envelope.compressed);
        assert!(envelope.data.is_none());
        assert_eq!(envelope.decode().unwrap(), feed);
    }

    #[test]
    fn oversized_feed_is_compressed_and_round_trips() {
        let feed = oversized_feed();
        let envelope = Envelope::encode(feed.clone()).unwrap();

        assert!(envelope.compressed);
        assert!(envelope.feed.is_none());
        assert!(envelope.data.is_some());

        assert_eq!(envelope.decode().unwrap(), feed);
    }

    #[test]
    fn round_trips_through_the_message_string() {
        let feed = oversized_feed();
        let message = Envelope::encode(feed.clone()).unwrap().to_message().unwrap();

        let decoded = Envelope::from_message(&message).unwrap().decode().unwrap();
        assert_eq!(decoded, feed);
    }

    #[test]
    fn wire_shape_uses_rss_compressed_data_keys() {
        let message = Envelope::encode(small_feed()).unwrap().to_message().unwrap();
        let value: serde_json::Value = serde_json::from_str(&message).unwrap();

        assert!(value.get("rss").is_some());
        assert_eq!(value.get("compressed"), Some(&serde_json::Value::Bool(false)));
        assert!(value.get("data").is_none());
    }

    #[test]
    fn garbage_base64_fails_to_decode() {
        let envelope = Envelope {
            feed: None,
            compressed: true,
            data: Some("not base64!!".to_string()),
        };
        assert!(matches!(envelope.decode(), Err(CodecError::Base64(_))));
    }

    #[test]
    fn garbage_gzip_fails_to_decode() {
        let envelope = Envelope {
            feed: None,
            compressed: true,
            data: Some(BASE64.encode(b"not gzip at all")),
        };
        assert!(matches!(envelope.decode(), Err(CodecError::Gzip(_))));
    }

    #[test]
    fn empty_envelope_fails_to_decode() {
        let inline = Envelope {
            feed: None,
            compressed: false,
            data: None,
        };
        assert!(matches!(inline.decode(), Err(CodecError::Empty)));

        let compressed = Envelope {
            feed: None,
            compressed: true,
            data: None,
        };
        assert!(matches!(compressed.decode(), Err(CodecError::Empty)));
    }

    #[test]
    fn subscribe_and_delete_wire_shapes() {
        let subscribe = serde_json::to_value(Subscribe {
            feed_url: "https://example.com/rss".to_string(),
        })
        .unwrap();
        assert_eq!(
            subscribe,
            serde_json::json!({"feed_url": "https://example.com/rss"})
        );

        let delete = serde_json::to_value(Delete {
            source: "example.com".to_string(),
        })
        .unwrap();
        assert_eq!(delete, serde_json::json!({"source": "example.com"}));
    }
}
