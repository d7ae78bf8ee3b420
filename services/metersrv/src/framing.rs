//! Frame boundary detection over the receive buffer
//!
//! Frames are delimited by a start and an end marker. Extraction never
//! consumes bytes that might still belong to an incomplete frame.

use sml_codec::{END_SEQUENCE, START_SEQUENCE};

/// Result of one extraction pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction<'a> {
    /// Payloads strictly between start and end markers, in buffer order
    pub frames: Vec<&'a [u8]>,
    /// Bytes up to and including the end marker of the last complete frame
    pub bytes_consumed: usize,
}

/// Marker-delimited frame finder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameExtractor {
    start: Vec<u8>,
    end: Vec<u8>,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::sml()
    }
}

impl FrameExtractor {
    /// SML transport v1 markers
    pub fn sml() -> Self {
        Self::with_markers(START_SEQUENCE.to_vec(), END_SEQUENCE.to_vec())
    }

    /// Markers must be non-empty; empty markers are replaced by the SML ones
    pub fn with_markers(start: Vec<u8>, end: Vec<u8>) -> Self {
        if start.is_empty() || end.is_empty() {
            return Self::sml();
        }
        Self { start, end }
    }

    pub fn start_marker(&self) -> &[u8] {
        &self.start
    }

    pub fn end_marker(&self) -> &[u8] {
        &self.end
    }

    /// Find all complete frames in `buffer`
    pub fn extract<'a>(&self, buffer: &'a [u8]) -> Extraction<'a> {
        let mut frames = Vec::new();
        let mut consumed = 0;

        while let Some(start) = find(buffer, &self.start, consumed) {
            let payload_start = start + self.start.len();
            let Some(end) = find(buffer, &self.end, payload_start) else {
                break;
            };
            frames.push(&buffer[payload_start..end]);
            consumed = end + self.end.len();
        }

        Extraction {
            frames,
            bytes_consumed: consumed,
        }
    }

    /// Number of leading bytes that can never become part of a frame
    ///
    /// That is everything before the first start marker or, when there is
    /// none, everything except the longest suffix that could still grow into
    /// a start marker.
    pub fn discardable_prefix(&self, buffer: &[u8]) -> usize {
        if let Some(start) = find(buffer, &self.start, 0) {
            return start;
        }
        let max_partial = (self.start.len() - 1).min(buffer.len());
        let kept = (1..=max_partial)
            .rev()
            .find(|&k| buffer.ends_with(&self.start[..k]))
            .unwrap_or(0);
        buffer.len() - kept
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}
