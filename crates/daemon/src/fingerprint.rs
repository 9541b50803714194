//! Content fingerprint for audio discs.
//!
//! The fingerprint is derived only from the ordered track lengths in the
//! table of contents, so the same pressing yields the same fingerprint no
//! matter what the volume is labelled.

use sha2::{Digest, Sha256};
use std::fmt;

/// Hex characters kept from the digest
const FINGERPRINT_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// Digest an ordered sequence of track lengths (in sectors)
    pub fn from_track_lengths(lengths: &[u64]) -> Self {
        let mut hasher = Sha256::new();
        for length in lengths {
            hasher.update(length.to_le_bytes());
        }
        let digest = format!("{:x}", hasher.finalize());
        Self(digest[..FINGERPRINT_LEN].to_string())
    }

    /// Fingerprint of a raw table-of-contents listing.
    ///
    /// `None` when no track row could be read: every such listing would
    /// otherwise share the digest of the empty sequence.
    pub fn from_toc(toc: &str) -> Option<Self> {
        let lengths = parse_track_lengths(toc);
        if lengths.is_empty() {
            return None;
        }
        Some(Self::from_track_lengths(&lengths))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract track lengths from a cdparanoia `-Q` listing.
///
/// Track rows look like
/// `  1.    16503 [03:40.03]        0 [00:00.00]    no   no  2`
/// (eight columns, first one the track number with a trailing dot).
/// Headers, the separator and the `TOTAL` row are ignored.
pub fn parse_track_lengths(toc: &str) -> Vec<u64> {
    toc.lines()
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            if columns.len() != 8 {
                return None;
            }
            columns[0].strip_suffix('.')?.parse::<u32>().ok()?;
            columns[1].parse::<u64>().ok()
        })
        .collect()
}
