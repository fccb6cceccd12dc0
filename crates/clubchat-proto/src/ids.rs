//! Identifier newtypes.
//!
//! The backend is inconsistent about identifier encoding: the same room may
//! arrive as `7` in one payload and `"7"` in another. Every identifier is
//! therefore normalized to its decimal/string form on the way in, so equality
//! and hashing compare what the server meant rather than how it was encoded.
//!
//! Integral floats (`7.0`) normalize to `"7"`; surrounding whitespace in
//! string ids is trimmed.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Str(String),
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl RawId {
    fn normalize(self) -> String {
        match self {
            Self::Str(s) => s.trim().to_string(),
            Self::Int(n) => n.to_string(),
            Self::UInt(n) => n.to_string(),
            Self::Float(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                format!("{}", f as i64)
            },
            Self::Float(f) => f.to_string(),
        }
    }
}

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(String);

        impl $name {
            /// Create from any string-like value (trimmed).
            pub fn new(raw: impl AsRef<str>) -> Self {
                Self(raw.as_ref().trim().to_string())
            }

            /// Normalized string form.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True when the normalized id is empty.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self::new(raw)
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self::new(raw)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw.to_string())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                RawId::deserialize(deserializer).map(|raw| Self(raw.normalize()))
            }
        }
    };
}

id_newtype!(
    /// Club that owns a set of chat rooms.
    ClubId
);

id_newtype!(
    /// Chat room, unique within its club.
    RoomId
);

id_newtype!(
    /// Application-level user identifier (not the token subject).
    UserId
);

id_newtype!(
    /// Server-assigned message identifier, unique per room. Deduplication key.
    MessageId
);
