//! Errors returned by key registration, group lifecycle operations, and
//! specific-data lookups.
use crate::{group::SchedulingGroup, key::SpecificKey};

/// An error returned by [`CoreSpecific::try_get_specific`] and friends.
///
/// Only [`NoSuchGroup`](AccessError::NoSuchGroup) describes an ordinary
/// runtime condition. The other variants indicate a programming defect, and
/// the fatal accessors panic when they see them.
///
/// [`CoreSpecific::try_get_specific`]: crate::CoreSpecific::try_get_specific
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum AccessError {
    /// The scheduling group is out of range or not initialized on this core.
    #[error("no such scheduling group on this core: {group}")]
    NoSuchGroup {
        /// The group that was looked up.
        group: SchedulingGroup,
    },

    /// The value type used to access a key does not match the type the key
    /// was registered with.
    #[error("{key:?} holds values of type `{found}`, but was accessed as `{expected}`")]
    TypeMismatch {
        /// The key that was accessed.
        key: SpecificKey,
        /// The type the caller asked for.
        expected: &'static str,
        /// The type the key was registered with.
        found: &'static str,
    },

    /// The key was registered after this core last adopted the registry's
    /// keys, so no values exist for it here.
    #[error("{key:?} is unknown to this core (it knows {known} keys); was `update_keys` called?")]
    UnknownKey {
        /// The key that was accessed.
        key: SpecificKey,
        /// The number of keys this core currently knows about.
        known: usize,
    },

    /// The key was issued by a different [`KeyRegistry`] than the one this
    /// core's keys came from.
    ///
    /// [`KeyRegistry`]: crate::KeyRegistry
    #[error("{key:?} was registered with a different key registry than this core's keys")]
    ForeignKey {
        /// The key that was accessed.
        key: SpecificKey,
    },
}

/// An error returned by scheduling group lifecycle operations on a
/// [`CoreSpecific`](crate::CoreSpecific) table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum GroupError {
    /// The group's index does not fit in this table.
    #[error("scheduling group {group} is out of range (max {max} groups per core)")]
    OutOfRange {
        /// The offending group.
        group: SchedulingGroup,
        /// This table's capacity.
        max: usize,
    },

    /// The group was already initialized on this core.
    #[error("scheduling group {0} is already initialized on this core")]
    AlreadyInitialized(SchedulingGroup),

    /// The group is not initialized on this core.
    #[error("scheduling group {0} is not initialized on this core")]
    NotInitialized(SchedulingGroup),
}

/// An error returned by [`KeyRegistry::try_register_key`].
///
/// [`KeyRegistry::try_register_key`]: crate::KeyRegistry::try_register_key
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum RegisterError {
    /// The registry already holds as many keys as it was configured to allow.
    #[error("key registry is full ({max} keys)")]
    Full {
        /// The registry's capacity bound.
        max: usize,
    },
}
