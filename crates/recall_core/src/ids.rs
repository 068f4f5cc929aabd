//! Entity and event identifiers.
//!
//! Two identifier schemes share one textual shape (22 URL-safe characters):
//!
//! - **Unique IDs** ([`EntityId::random`]) are UUIDv4 bytes encoded as
//!   unpadded base64url. Length is fixed, so the `==` padding is dropped.
//! - **Ordered IDs** ([`OrderedIdGenerator`]) encode a 48-bit millisecond
//!   timestamp followed by a random suffix, using an alphabet whose byte
//!   order matches its logical order, so lexicographic comparison agrees
//!   with creation order. Event IDs use this scheme; they are the sole
//!   ordering authority for reducer folds.

use crate::error::{CoreError, CoreResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Exact length of every Recall identifier.
pub const ID_LENGTH: usize = 22;

/// Alphabet for ordered IDs, ascending in ASCII order so that encoded
/// values sort the same way as the numbers they encode.
const ORDERED_ALPHABET: &[u8; 64] =
    b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

/// Number of random suffix characters in an ordered ID.
const SUFFIX_LENGTH: usize = ID_LENGTH - 8;

fn is_id_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'-' || c == b'_'
}

fn check_id(s: &str) -> CoreResult<()> {
    if s.len() != ID_LENGTH {
        return Err(CoreError::invalid_id(format!(
            "expected {ID_LENGTH} characters, got {} in {s:?}",
            s.len()
        )));
    }
    if let Some(c) = s.bytes().find(|c| !is_id_char(*c)) {
        return Err(CoreError::invalid_id(format!(
            "invalid character {:?} in {s:?}",
            c as char
        )));
    }
    Ok(())
}

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parses an identifier, checking length and character set.
            pub fn parse(s: impl Into<String>) -> CoreResult<Self> {
                let s = s.into();
                check_id(&s)?;
                Ok(Self(s))
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(s: String) -> CoreResult<Self> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

id_type! {
    /// Unique identifier for an entity (task or attachment reference).
    EntityId
}

id_type! {
    /// Globally unique, lexicographically time-ordered event identifier.
    EventId
}

impl EntityId {
    /// Creates a new random entity ID (UUIDv4, base64url, padding stripped).
    #[must_use]
    pub fn random() -> Self {
        Self(URL_SAFE_NO_PAD.encode(Uuid::new_v4().as_bytes()))
    }
}

/// Generates ordered event IDs.
///
/// IDs from a single generator are strictly increasing even when the clock
/// stands still or moves backwards: at an unchanged millisecond the random
/// suffix is incremented with carry, and a carry out of the suffix rolls
/// over into the timestamp component. Two independently seeded generators
/// called at the same millisecond differ in their random suffixes.
pub struct OrderedIdGenerator {
    rng: StdRng,
    last_millis: u64,
    suffix: [u8; SUFFIX_LENGTH],
    primed: bool,
}

impl OrderedIdGenerator {
    /// Creates a generator seeded from the OS entropy source.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Creates a deterministically seeded generator (for tests).
    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            last_millis: 0,
            suffix: [0; SUFFIX_LENGTH],
            primed: false,
        }
    }

    /// Generates the next event ID at the current wall-clock time.
    pub fn generate(&mut self) -> EventId {
        self.generate_at(now_millis())
    }

    /// Generates the next event ID for the given millisecond timestamp.
    pub fn generate_at(&mut self, timestamp_millis: u64) -> EventId {
        if !self.primed || timestamp_millis > self.last_millis {
            self.last_millis = timestamp_millis;
            for slot in &mut self.suffix {
                *slot = self.rng.gen_range(0..64);
            }
            self.primed = true;
        } else {
            // Same (or regressed) millisecond: bump the suffix, carrying
            // into the timestamp component on overflow.
            let mut i = SUFFIX_LENGTH;
            loop {
                if i == 0 {
                    self.last_millis += 1;
                    break;
                }
                i -= 1;
                if self.suffix[i] == 63 {
                    self.suffix[i] = 0;
                } else {
                    self.suffix[i] += 1;
                    break;
                }
            }
        }

        let mut out = [0u8; ID_LENGTH];
        let mut v = self.last_millis & 0xFFFF_FFFF_FFFF;
        for i in (0..8).rev() {
            out[i] = ORDERED_ALPHABET[(v & 0x3F) as usize];
            v >>= 6;
        }
        for (i, &slot) in self.suffix.iter().enumerate() {
            out[8 + i] = ORDERED_ALPHABET[slot as usize];
        }

        // The alphabet is ASCII, so this cannot fail.
        EventId(String::from_utf8_lossy(&out).into_owned())
    }
}

impl Default for OrderedIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
