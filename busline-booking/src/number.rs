use chrono::Utc;
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};

// No 0/O or 1/I, so numbers read back over the phone unambiguously.
const ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";
const SUFFIX_LEN: usize = 4;
const SEQUENCE_SPAN: u32 = 10_000;

/// Issues human-facing booking numbers: `PREFIX-yymmddHHMMSS-SSSSRRRR`.
///
/// The timestamp plus an in-process sequence keeps numbers from one process
/// distinct; the random suffix separates concurrent processes. The store's
/// unique constraint remains the final arbiter.
pub struct BookingNumberGenerator {
    prefix: String,
    sequence: AtomicU32,
}

impl BookingNumberGenerator {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            sequence: AtomicU32::new(0),
        }
    }

    pub fn next(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) % SEQUENCE_SPAN;
        let stamp = Utc::now().format("%y%m%d%H%M%S");

        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();

        format!("{}-{}-{:04}{}", self.prefix, stamp, seq, suffix)
    }
}

impl Default for BookingNumberGenerator {
    fn default() -> Self {
        Self::new("BK")
    }
}
