use std::sync::atomic::{AtomicU64, Ordering};

/// Default target body length, in bytes
pub const DEFAULT_MESSAGE_SIZE: usize = 100_000;

/// Padding byte appended after the sequence prefix
pub const FILLER: u8 = b'*';

/// Body of the optional end-of-stream marker
pub const END_OF_STREAM: &[u8] = b"END-OF-STREAM";

/// One outbound payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sequence_number: u64,
    pub body: Vec<u8>,
}

impl Message {
    /// The marker is outside the numbered sequence and carries number 0.
    pub fn end_of_stream() -> Self {
        Self {
            sequence_number: 0,
            body: END_OF_STREAM.to_vec(),
        }
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }
}

pub fn is_end_of_stream(body: &[u8]) -> bool {
    body == END_OF_STREAM
}

/// Builds `Message <n> ****...` bodies of a fixed total length.
///
/// The counter belongs to this generator, not to the process, and is atomic
/// so a generator shared between producers never hands out a number twice.
#[derive(Debug)]
pub struct MessageGenerator {
    counter: AtomicU64,
    size: usize,
}

impl MessageGenerator {
    pub fn new(size: usize) -> Self {
        Self {
            counter: AtomicU64::new(0),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of messages generated so far
    pub fn generated(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Next message. If the prefix alone is longer than the target size, the
    /// body is just the prefix; the sequence number is never cut.
    pub fn next(&self) -> Message {
        let sequence_number = self.counter.fetch_add(1, Ordering::AcqRel) + 1;

        let prefix = format!("Message {} ", sequence_number);
        let mut body = Vec::with_capacity(self.size.max(prefix.len()));
        body.extend_from_slice(prefix.as_bytes());
        body.resize(self.size.max(prefix.len()), FILLER);

        Message {
            sequence_number,
            body,
        }
    }
}

impl Default for MessageGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn framing_matches_literal_vectors() {
        let generator = MessageGenerator::new(16);
        assert_eq!(generator.next().body, b"Message 1 ******".to_vec());

        for _ in 2..12 {
            generator.next();
        }
        assert_eq!(generator.next().body, b"Message 12 *****".to_vec());
    }

    #[test]
    fn sequence_starts_at_one_without_gaps() {
        let generator = MessageGenerator::new(32);
        let numbers: Vec<u64> = (0..100).map(|_| generator.next().sequence_number).collect();
        assert_eq!(numbers, (1..=100).collect::<Vec<u64>>());
        assert_eq!(generator.generated(), 100);
    }

    #[test]
    fn default_body_is_exactly_the_target_size() {
        let generator = MessageGenerator::default();
        let message = generator.next();
        assert_eq!(message.size(), DEFAULT_MESSAGE_SIZE);
        assert!(message.body.starts_with(b"Message 1 *"));
        assert!(message.body[10..].iter().all(|&b| b == FILLER));
    }

    #[test]
    fn prefix_longer_than_target_is_kept_whole() {
        let generator = MessageGenerator::new(4);
        assert_eq!(generator.next().body, b"Message 1 ".to_vec());
    }

    #[test]
    fn separate_generators_do_not_share_a_counter() {
        let a = MessageGenerator::new(16);
        let b = MessageGenerator::new(16);
        a.next();
        a.next();
        assert_eq!(b.next().sequence_number, 1);
    }

    #[test]
    fn shared_generator_never_duplicates() {
        let generator = Arc::new(MessageGenerator::new(16));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = generator.clone();
                std::thread::spawn(move || {
                    (0..250).map(|_| generator.next().sequence_number).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for n in handle.join().unwrap() {
                assert!(seen.insert(n), "duplicate sequence number {}", n);
            }
        }
        assert_eq!(seen.len(), 1000);
        assert_eq!(seen.iter().max(), Some(&1000));
    }

    #[test]
    fn end_of_stream_marker_is_recognised() {
        assert!(is_end_of_stream(&Message::end_of_stream().body));
        assert!(!is_end_of_stream(&MessageGenerator::new(16).next().body));
    }
}
