//! Participant ids and transport session keys.
//!
//! A [`ParticipantId`] is the short public identity handed to a connection at
//! join time. It is random, drawn from a 62-character alphanumeric alphabet,
//! and unique among the connections that are active when it is allocated.
//!
//! A [`SessionKey`] identifies a transport session. The transport layer
//! assigns them; the room only compares them.

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Characters participant ids are drawn from.
pub const ALPHABET: &[u8; 62] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of a freshly allocated participant id.
pub const ID_LENGTH: usize = 8;

/// Collisions tolerated at one length before the candidate grows by a character.
const MAX_ATTEMPTS_PER_LENGTH: usize = 16;

/// Public identity of a joined participant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::ops::Deref for ParticipantId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ParticipantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ParticipantId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ParticipantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ParticipantId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<ParticipantId> for String {
    fn from(id: ParticipantId) -> Self {
        id.0
    }
}

/// Identity of one transport session (one socket).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(pub u64);

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Generates participant ids that do not collide with the active set.
pub struct IdAllocator<R = StdRng> {
    rng: R,
}

impl IdAllocator<StdRng> {
    /// Allocator seeded from the operating system.
    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic allocator, for tests and simulations.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> IdAllocator<R> {
    /// Wrap an arbitrary random source.
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    /// Produce an id that is not a member of `existing`.
    ///
    /// Candidates are [`ID_LENGTH`] characters long. Each run of
    /// `MAX_ATTEMPTS_PER_LENGTH` collisions lengthens the next candidate by
    /// one character, so the loop terminates for any finite `existing`.
    pub fn allocate(&mut self, existing: &HashSet<ParticipantId>) -> ParticipantId {
        let mut length = ID_LENGTH;
        let mut attempts = 0;
        loop {
            let candidate = self.generate(length);
            if !existing.contains(candidate.as_str()) {
                return ParticipantId(candidate);
            }
            attempts += 1;
            debug!(attempts, length, "participant id collision, retrying");
            if attempts % MAX_ATTEMPTS_PER_LENGTH == 0 {
                length += 1;
            }
        }
    }

    fn generate(&mut self, length: usize) -> String {
        (0..length)
            .map(|_| char::from(ALPHABET[self.rng.random_range(0..ALPHABET.len())]))
            .collect()
    }
}

impl Default for IdAllocator<StdRng> {
    fn default() -> Self {
        Self::from_os_rng()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocated_id_has_expected_shape() {
        let mut alloc = IdAllocator::seeded(1);
        let id = alloc.allocate(&HashSet::new());
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn seeded_allocators_are_deterministic() {
        let a = IdAllocator::seeded(42).allocate(&HashSet::new());
        let b = IdAllocator::seeded(42).allocate(&HashSet::new());
        assert_eq!(a, b);
    }

    #[test]
    fn colliding_candidate_is_rejected() {
        let first = IdAllocator::seeded(7).allocate(&HashSet::new());
        let existing: HashSet<_> = [first.clone()].into_iter().collect();
        // Same seed would produce `first` again; it must be skipped.
        let second = IdAllocator::seeded(7).allocate(&existing);
        assert_ne!(first, second);
        assert!(!existing.contains(&second));
    }

    #[test]
    fn every_short_id_taken_forces_longer_id() {
        // A one-symbol alphabet source: the rng always yields the same index.
        struct Constant;
        impl rand::RngCore for Constant {
            fn next_u32(&mut self) -> u32 {
                0
            }
            fn next_u64(&mut self) -> u64 {
                0
            }
            fn fill_bytes(&mut self, dest: &mut [u8]) {
                dest.fill(0);
            }
        }

        let mut alloc = IdAllocator::with_rng(Constant);
        let first = alloc.allocate(&HashSet::new());
        let existing: HashSet<_> = [first.clone()].into_iter().collect();
        let second = alloc.allocate(&existing);
        assert_ne!(first, second);
        assert_eq!(second.len(), ID_LENGTH + 1);
    }

    #[test]
    fn participant_id_conversions() {
        let id = ParticipantId::from("abc123XY");
        assert_eq!(id.as_str(), "abc123XY");
        assert_eq!(id.to_string(), "abc123XY");
        assert_eq!(&*id, "abc123XY");
        let s: String = id.clone().into();
        assert_eq!(s, "abc123XY");
        assert_eq!(id.into_inner(), "abc123XY");
    }

    #[test]
    fn participant_id_serializes_transparently() {
        let id = ParticipantId::from("x1");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""x1""#);
    }

    #[test]
    fn session_key_display() {
        assert_eq!(SessionKey(9).to_string(), "session-9");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn ids_stay_distinct(seed in any::<u64>(), joins in 1usize..200) {
                let mut alloc = IdAllocator::seeded(seed);
                let mut active = HashSet::new();
                for _ in 0..joins {
                    let id = alloc.allocate(&active);
                    prop_assert!(active.insert(id));
                }
            }
        }
    }
}
