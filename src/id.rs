//! Newtypes around platform IDs.

use serde::{
    de::{Error as DeError, Visitor},
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// ID of a user in a voice call.
///
/// Packets from an SSRC with no known owner carry [`UserId::UNKNOWN`].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UserId(pub u64);

impl UserId {
    /// Placeholder for audio whose SSRC has not yet been mapped to a user.
    pub const UNKNOWN: UserId = UserId(0);

    /// Returns the u64 representation of this Id.
    pub fn get(self) -> u64 {
        self.0
    }

    /// Returns whether this is the [unresolved placeholder](Self::UNKNOWN).
    pub fn is_unknown(self) -> bool {
        self == Self::UNKNOWN
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.0, f)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl Serialize for UserId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

struct UserIdVisitor;

impl<'de> Visitor<'de> for UserIdVisitor {
    type Value = UserId;

    fn expecting(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str("a user ID as an integer or numeric string")
    }

    fn visit_u64<E: DeError>(self, v: u64) -> Result<Self::Value, E> {
        Ok(UserId(v))
    }

    fn visit_i64<E: DeError>(self, v: i64) -> Result<Self::Value, E> {
        if v < 0 {
            Err(E::custom("user ID may not be negative"))
        } else {
            Ok(UserId(v as u64))
        }
    }

    fn visit_str<E: DeError>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map(UserId).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for UserId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UserIdVisitor)
    }
}
