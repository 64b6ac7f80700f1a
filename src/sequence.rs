//! Collision-resistant message ordinals without a database round trip.
//!
//! `sequence = unix_millis * 100_000 + jitter` where jitter is uniform in
//! `0..100_000`. Ordering stays time-monotone at millisecond granularity and
//! the scaled value fits an i64 with centuries of headroom. Legacy rows carry
//! small integer ordinals, so timestamp-scale values always sort after them.

use chrono::Utc;
use rand::Rng;

use crate::core_types::SequenceNo;

const SCALE: i64 = 100_000;

#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceGenerator;

impl SequenceGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Single ordinal.
    pub fn next_sequence(&self) -> SequenceNo {
        let jitter = rand::thread_rng().gen_range(0..SCALE);
        Utc::now().timestamp_millis() * SCALE + jitter
    }

    /// Adjacent pair: the assistant message sorts immediately after its user
    /// message. Jitter tops out at SCALE - 2 so the +1 never rolls into the
    /// next millisecond bucket.
    pub fn next_pair(&self) -> (SequenceNo, SequenceNo) {
        let jitter = rand::thread_rng().gen_range(0..SCALE - 1);
        let seq = Utc::now().timestamp_millis() * SCALE + jitter;
        (seq, seq + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_is_adjacent() {
        let generator = SequenceGenerator::new();
        for _ in 0..1000 {
            let (user_seq, assistant_seq) = generator.next_pair();
            assert_eq!(assistant_seq, user_seq + 1);
        }
    }

    #[test]
    fn pair_never_crosses_millisecond_bucket() {
        let generator = SequenceGenerator::new();
        for _ in 0..1000 {
            let (user_seq, assistant_seq) = generator.next_pair();
            assert_eq!(user_seq / SCALE, assistant_seq / SCALE);
        }
    }

    #[test]
    fn sequences_sort_after_legacy_ordinals() {
        let generator = SequenceGenerator::new();
        let legacy_max: SequenceNo = 1_000_000;
        assert!(generator.next_sequence() > legacy_max);
    }

    #[test]
    fn sequences_are_time_monotone_across_milliseconds() {
        let generator = SequenceGenerator::new();
        let first = generator.next_sequence();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = generator.next_sequence();
        assert!(second > first);
    }
}
