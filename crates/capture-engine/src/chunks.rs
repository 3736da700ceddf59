//! Ordered accumulation of recorder chunks.

use bytes::{Bytes, BytesMut};

use scribecast_platform_core::MediaBlob;

/// Chunks emitted by a recorder during one session, in arrival order.
#[derive(Debug, Default)]
pub struct ChunkSequence {
    chunks: Vec<Bytes>,
    total: usize,
}

impl ChunkSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are dropped; returns whether it was kept.
    pub fn push(&mut self, chunk: Bytes) -> bool {
        if chunk.is_empty() {
            return false;
        }
        self.total += chunk.len();
        self.chunks.push(chunk);
        true
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Sum of chunk sizes.
    pub fn total_bytes(&self) -> usize {
        self.total
    }

    /// Concatenate all chunks into one blob tagged `mime_type`.
    pub fn into_blob(self, mime_type: impl Into<String>) -> MediaBlob {
        let data = match self.chunks.len() {
            0 => Bytes::new(),
            1 => self.chunks.into_iter().next().unwrap_or_default(),
            _ => {
                let mut buf = BytesMut::with_capacity(self.total);
                for chunk in &self.chunks {
                    buf.extend_from_slice(chunk);
                }
                buf.freeze()
            }
        };
        MediaBlob::new(mime_type, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_chunks_are_skipped() {
        let mut seq = ChunkSequence::new();
        assert!(!seq.push(Bytes::new()));
        assert!(seq.push(Bytes::from_static(b"ab")));
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.total_bytes(), 2);
    }

    #[test]
    fn blob_concatenates_in_arrival_order() {
        let mut seq = ChunkSequence::new();
        seq.push(Bytes::from_static(b"one-"));
        seq.push(Bytes::from_static(b"two-"));
        seq.push(Bytes::from_static(b"three"));
        let blob = seq.into_blob("audio/webm");
        assert_eq!(blob.mime_type(), "audio/webm");
        assert_eq!(blob.data().as_ref(), b"one-two-three");
    }

    #[test]
    fn no_chunks_gives_empty_blob() {
        let blob = ChunkSequence::new().into_blob("video/webm");
        assert!(blob.is_empty());
        assert_eq!(blob.mime_type(), "video/webm");
    }

    proptest! {
        #[test]
        fn blob_is_the_ordered_concatenation_of_non_empty_chunks(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..20),
        ) {
            let mut seq = ChunkSequence::new();
            for chunk in &chunks {
                seq.push(Bytes::from(chunk.clone()));
            }
            let kept = chunks.iter().filter(|c| !c.is_empty()).count();
            let expected: Vec<u8> = chunks.concat();

            prop_assert_eq!(seq.len(), kept);
            prop_assert_eq!(seq.total_bytes(), expected.len());
            let blob = seq.into_blob("audio/webm");
            prop_assert_eq!(blob.size(), expected.len());
            prop_assert_eq!(blob.data().as_ref(), expected.as_slice());
        }
    }
}
