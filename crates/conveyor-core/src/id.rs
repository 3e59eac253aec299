//! Typed resource identifiers.
//!
//! Every entity gets its own id newtype so that a `JobId` can never be passed
//! where a `SourceId` is expected. All ids are UUIDv7, so ascending id order
//! is creation order — rule tie-breaking relies on this.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
            Display,
        )]
        #[display("{_0}")]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new unique id using UUIDv7.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

entity_id!(
    /// An event source (external change feed configuration).
    SourceId
);
entity_id!(
    /// An event rule attached to a source.
    RuleId
);
entity_id!(
    /// A run template (app + company + schedule recipe).
    TemplateId
);
entity_id!(
    /// A single job execution.
    JobId
);
entity_id!(
    /// A registered application.
    AppId
);
entity_id!(
    /// A tenant company.
    CompanyId
);
entity_id!(
    /// A platform user, referenced for launched_by/created_by integrity.
    UserId
);
entity_id!(
    /// A retention policy.
    PolicyId
);
entity_id!(
    /// One run of retention policy enforcement.
    CleanupJobId
);
entity_id!(
    /// An archived pre-image of a record.
    ArchiveId
);

impl UserId {
    /// The fixed identity for actions taken by the platform itself,
    /// seeded by the initial migration.
    pub fn system() -> Self {
        Self(Uuid::from_u128(1))
    }
}

impl SourceId {
    /// Derive a stable 64-bit key for Postgres advisory locking.
    ///
    /// Pollers may live in separate processes, so per-source mutual exclusion
    /// is keyed in the database rather than by an in-process mutex.
    pub fn lock_key(&self) -> i64 {
        i64::from_be_bytes(self.0.as_bytes()[..8].try_into().unwrap())
    }
}
