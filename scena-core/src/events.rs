//! Sequence event definitions
//!
//! Events are broadcast over a `tokio::sync::broadcast` channel; any number
//! of listeners (host UI, subsequence managers, tests) may subscribe, and a
//! lagging listener only loses its own backlog.

use serde::{Deserialize, Serialize};

/// Event emitted by a content sequence as it moves through its segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SequenceEvent {
    /// A segment became the current one and was shown.
    SegmentStart { segment: usize },

    /// The current segment finished and is about to be switched away from.
    SegmentEnd { segment: usize },

    /// The last segment ended; the sequence will emit nothing further.
    End,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_string(&SequenceEvent::SegmentStart { segment: 3 }).unwrap();
        assert_eq!(json, r#"{"type":"segmentStart","segment":3}"#);

        let json = serde_json::to_string(&SequenceEvent::End).unwrap();
        assert_eq!(json, r#"{"type":"end"}"#);
    }
}
