use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Hex characters kept from the request UUID.
const TOKEN_LEN: usize = 8;

/// Hands out request sequence numbers and the short tokens that tag each
/// request's log lines. Tokens differ between process runs for the same
/// sequence number.
pub(crate) struct RequestIdGenerator {
    run_key: u64,
    issued: AtomicU64,
}

impl RequestIdGenerator {
    pub(crate) fn new() -> Self {
        Self {
            run_key: fastrand::u64(..),
            issued: AtomicU64::new(0),
        }
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn correlation_token(&self, request_seq: u64) -> String {
        let scrambled = splitmix64(self.run_key.wrapping_add(request_seq));
        let mut token = Uuid::from_u64_pair(scrambled, request_seq).simple().to_string();
        token.truncate(TOKEN_LEN);
        token
    }
}

/// Bijective 64-bit finalizer; consecutive inputs land far apart.
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn tokens_are_short_hex_and_distinct() {
        let ids = RequestIdGenerator::new();
        let tokens: HashSet<String> = (0..100)
            .map(|_| ids.correlation_token(ids.next_seq()))
            .collect();
        assert_eq!(tokens.len(), 100);
        assert!(tokens
            .iter()
            .all(|token| token.len() == TOKEN_LEN && token.bytes().all(|b| b.is_ascii_hexdigit())));
    }

    #[test]
    fn sequence_starts_at_one() {
        let ids = RequestIdGenerator::new();
        assert_eq!(ids.next_seq(), 1);
        assert_eq!(ids.next_seq(), 2);
    }
}
