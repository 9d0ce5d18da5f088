use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A 128-bit random identifier shared by every entity in the core
/// (principals, mandates, policies, provisional charges).
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }

            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

define_id!(PrincipalId);
define_id!(MandateId);
define_id!(PolicyId);
define_id!(ChargeId);

/// Unix timestamp, seconds. Carried as `i64` throughout (matches the
/// teacher's `Timestamp` alias) so arithmetic against `chrono::Duration`
/// stays simple at the boundary.
pub type Timestamp = i64;

pub fn now_unix() -> Timestamp {
    chrono::Utc::now().timestamp()
}
