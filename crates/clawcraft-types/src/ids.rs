//! Type-safe identifier wrappers.
//!
//! Records created by the core (transactions, bounties, wars, audit events)
//! carry UUID v7 identifiers so they sort by creation time and never
//! collide. Agents, factions and territories are keyed by names that come
//! from the game world, so they wrap a [`String`] instead.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Account name of the unlimited pseudo-wallet that mints rewards and
/// absorbs penalties and fees.
pub const SYSTEM_AGENT: &str = "system";

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Generates a newtype wrapper around a [`String`] key.
macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[serde(transparent)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub String);

        impl $name {
            /// Wrap a key.
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Borrow the key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_key! {
    /// Identifier of an agent (player or bot) and of its wallet.
    AgentId
}

define_key! {
    /// Unique faction name, the primary key of the faction registry.
    FactionName
}

define_key! {
    /// Identifier of a claimed territory, e.g. `iron_brotherhood_home`.
    TerritoryId
}

impl AgentId {
    /// The system pseudo-wallet.
    pub fn system() -> Self {
        Self(SYSTEM_AGENT.to_owned())
    }

    /// Whether this id names the system pseudo-wallet.
    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_AGENT
    }
}

define_id! {
    /// Unique identifier for a confirmed ledger transaction.
    TransactionId
}

define_id! {
    /// Unique identifier for a bounty.
    BountyId
}

define_id! {
    /// Unique identifier for a war record between two factions.
    WarId
}

define_id! {
    /// Unique identifier for an entry in the faction audit log.
    FactionEventId
}
