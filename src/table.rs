//! The per-core table of scheduling-group specific data.
//!
//! Each core owns exactly one [`CoreSpecific`] table. For every possible
//! scheduling group, the table stores a flag indicating whether the group is
//! initialized on this core, and one type-erased value per registered key.
//! Values are constructed and destroyed only by the lifecycle operations on
//! this type ([`init_group`], [`teardown_group`], and [`update_keys`]), which
//! are meant to be driven by whatever creates and destroys scheduling groups.
//!
//! [`init_group`]: CoreSpecific::init_group
//! [`teardown_group`]: CoreSpecific::teardown_group
//! [`update_keys`]: CoreSpecific::update_keys
use crate::{
    config::Config,
    error::{AccessError, GroupError},
    group::{SchedulingGroup, DEFAULT_MAX_SCHEDULING_GROUPS},
    key::{KeySet, SpecificKey},
};
use alloc::{boxed::Box, vec::Vec};
use core::{any::Any, fmt, mem};

/// Scheduling-group specific data for a single core.
///
/// `N` is the maximum number of scheduling groups per core. Groups whose
/// index is `N` or greater are never initialized, and lookups for them
/// always find nothing.
///
/// A `CoreSpecific` is owned by the runtime's per-core context and is
/// neither `Send` nor `Sync`: every core builds its own from a shared
/// [`KeySet`]. Typed access to the values is provided by
/// [`get_specific`](Self::get_specific) and friends, and aggregation across
/// groups by [`reduce`](Self::reduce) and [`map_reduce`](Self::map_reduce).
///
/// # Examples
///
/// ```
/// use hyphae::{CoreSpecific, KeyRegistry, SchedulingGroup};
///
/// let mut registry = KeyRegistry::new();
/// let key = registry.register_key(|| 7u32, |_| {});
///
/// let mut core: CoreSpecific = CoreSpecific::new(registry.snapshot());
/// let group = SchedulingGroup::new(1);
/// assert!(core.get_specific_ptr::<u32>(group, key).is_none());
///
/// core.init_group(group).unwrap();
/// assert_eq!(core.get_specific::<u32>(group, key), &7);
///
/// core.teardown_group(group).unwrap();
/// assert!(core.get_specific_ptr::<u32>(group, key).is_none());
/// ```
pub struct CoreSpecific<const N: usize = DEFAULT_MAX_SCHEDULING_GROUPS> {
    groups: [GroupSlot; N],
    keys: KeySet,
    config: Config,
}

struct GroupSlot {
    initialized: bool,
    /// One value per key in the table's `KeySet`, indexed by key ID, while
    /// `initialized` is set. Empty otherwise.
    values: Vec<Box<dyn Any>>,
}

// === impl CoreSpecific ===

impl<const N: usize> CoreSpecific<N> {
    /// Returns a new table for the keys in `keys`, with no scheduling groups
    /// initialized.
    #[must_use]
    pub fn new(keys: KeySet) -> Self {
        Self::with_config(keys, Config::new())
    }

    /// Returns a new table for the keys in `keys` with the provided
    /// [`Config`], with no scheduling groups initialized.
    #[must_use]
    pub fn with_config(keys: KeySet, config: Config) -> Self {
        const { assert!(N <= u32::MAX as usize, "too many scheduling groups") };
        Self {
            groups: core::array::from_fn(|_| GroupSlot::EMPTY),
            keys,
            config,
        }
    }

    /// Returns the maximum number of scheduling groups this table can hold.
    #[must_use]
    #[inline]
    pub const fn max_scheduling_groups(&self) -> usize {
        N
    }

    /// Returns the keys this table holds values for.
    #[must_use]
    #[inline]
    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    /// Returns this table's configuration.
    #[must_use]
    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns `true` if `group` is initialized on this core.
    #[must_use]
    #[inline]
    pub fn is_initialized(&self, group: SchedulingGroup) -> bool {
        self.groups
            .get(group.index())
            .is_some_and(|slot| slot.initialized)
    }

    /// Returns an iterator over the scheduling groups initialized on this
    /// core, in ascending index order.
    pub fn initialized_groups(&self) -> impl Iterator<Item = SchedulingGroup> + '_ {
        self.groups
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.initialized)
            .map(|(index, _)| SchedulingGroup::new(index as u32))
    }

    /// Initializes `group` on this core, constructing one value for every
    /// key this table knows about, in key ID order.
    ///
    /// If a constructor panics, the values built so far are destroyed and
    /// `group` stays uninitialized.
    ///
    /// This is called by the scheduling group lifecycle manager when a group
    /// is created on this core.
    ///
    /// # Errors
    ///
    /// - [`GroupError::OutOfRange`] if `group` does not fit in this table.
    /// - [`GroupError::AlreadyInitialized`] if `group` is already initialized.
    pub fn init_group(&mut self, group: SchedulingGroup) -> Result<(), GroupError> {
        let Self { groups, keys, .. } = self;
        let slot = groups
            .get_mut(group.index())
            .ok_or(GroupError::OutOfRange { group, max: N })?;
        if slot.initialized {
            return Err(GroupError::AlreadyInitialized(group));
        }

        debug_assert!(slot.values.is_empty());
        Constructed::new(keys, 0).commit(&mut slot.values);
        slot.initialized = true;

        tracing::debug!(
            group = group.index(),
            keys = keys.len(),
            "initialized scheduling group specific data"
        );
        Ok(())
    }

    /// Tears down `group` on this core, destroying its values in key ID
    /// order.
    ///
    /// This is called by the scheduling group lifecycle manager when a group
    /// is destroyed on this core. The group may be initialized again later.
    ///
    /// # Errors
    ///
    /// - [`GroupError::OutOfRange`] if `group` does not fit in this table.
    /// - [`GroupError::NotInitialized`] if `group` is not initialized.
    pub fn teardown_group(&mut self, group: SchedulingGroup) -> Result<(), GroupError> {
        let Self { groups, keys, .. } = self;
        let slot = groups
            .get_mut(group.index())
            .ok_or(GroupError::OutOfRange { group, max: N })?;
        if !slot.initialized {
            return Err(GroupError::NotInitialized(group));
        }

        let destroyed = slot.teardown(keys);
        tracing::debug!(
            group = group.index(),
            keys = destroyed,
            "tore down scheduling group specific data"
        );
        Ok(())
    }

    /// Adopts a newer snapshot of the key registry.
    ///
    /// Values for every key in `keys` that this table did not know about are
    /// constructed in each initialized scheduling group. Groups initialized
    /// later get values for all of `keys`.
    ///
    /// If a constructor panics, the values built so far are destroyed and
    /// the table keeps its current snapshot.
    ///
    /// # Panics
    ///
    /// If `keys` does not [extend](KeySet::extends) the snapshot this table
    /// currently holds.
    #[track_caller]
    pub fn update_keys(&mut self, keys: KeySet) {
        assert!(
            keys.extends(&self.keys),
            "new key set ({} keys) does not extend this core's key set ({} keys)",
            keys.len(),
            self.keys.len(),
        );

        let known = self.keys.len();
        let added = self
            .groups
            .iter()
            .filter(|slot| slot.initialized)
            .map(|_| Constructed::new(&keys, known))
            .collect::<Vec<_>>();
        let groups = added.len();
        for (slot, values) in self.groups.iter_mut().filter(|slot| slot.initialized).zip(added) {
            debug_assert_eq!(slot.values.len(), known);
            values.commit(&mut slot.values);
        }

        tracing::debug!(
            keys.known = known,
            keys.added = keys.len() - known,
            groups,
            "adopted new specific keys"
        );
        self.keys = keys;
    }

    /// Returns the type-erased value for `key` in `group`, or `None` if
    /// `group` is out of range or not initialized on this core.
    ///
    /// # Panics
    ///
    /// If `key` is unknown to this core.
    #[must_use]
    #[track_caller]
    pub fn raw_value(&self, group: SchedulingGroup, key: SpecificKey) -> Option<&dyn Any> {
        match self.lookup(group, &key) {
            Ok(value) => Some(value),
            Err(AccessError::NoSuchGroup { .. }) => None,
            Err(error) => crate::access::fatal(error),
        }
    }

    pub(crate) fn lookup(
        &self,
        group: SchedulingGroup,
        key: &SpecificKey,
    ) -> Result<&dyn Any, AccessError> {
        let slot = self
            .groups
            .get(group.index())
            .filter(|slot| slot.initialized)
            .ok_or(AccessError::NoSuchGroup { group })?;
        check_registry(&self.keys, key)?;
        slot.values
            .get(key.id())
            .map(|value| &**value)
            .ok_or(AccessError::UnknownKey {
                key: *key,
                known: self.keys.len(),
            })
    }

    pub(crate) fn downcast_mut<T: Any>(
        &mut self,
        group: SchedulingGroup,
        key: &SpecificKey,
    ) -> Result<&mut T, AccessError> {
        let Self { groups, keys, .. } = self;
        let keys = &*keys;
        let slot = groups
            .get_mut(group.index())
            .filter(|slot| slot.initialized)
            .ok_or(AccessError::NoSuchGroup { group })?;
        check_registry(keys, key)?;
        slot.values
            .get_mut(key.id())
            .ok_or(AccessError::UnknownKey {
                key: *key,
                known: keys.len(),
            })?
            .downcast_mut::<T>()
            .ok_or_else(|| crate::access::mismatch::<T>(keys, key))
    }
}

#[inline]
fn check_registry(keys: &KeySet, key: &SpecificKey) -> Result<(), AccessError> {
    if key.registry() != keys.registry() {
        return Err(AccessError::ForeignKey { key: *key });
    }
    Ok(())
}

impl<const N: usize> Drop for CoreSpecific<N> {
    fn drop(&mut self) {
        let Self { groups, keys, .. } = self;
        for slot in groups.iter_mut().filter(|slot| slot.initialized) {
            slot.teardown(keys);
        }
    }
}

impl<const N: usize> fmt::Debug for CoreSpecific<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Groups<'a, const N: usize>(&'a CoreSpecific<N>);
        impl<const N: usize> fmt::Debug for Groups<'_, N> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_list().entries(self.0.initialized_groups()).finish()
            }
        }

        f.debug_struct("CoreSpecific")
            .field("max_scheduling_groups", &N)
            .field("initialized", &Groups(self))
            .field("keys", &self.keys.len())
            .field("config", &self.config)
            .finish()
    }
}

// === impl GroupSlot ===

impl GroupSlot {
    const EMPTY: Self = Self {
        initialized: false,
        values: Vec::new(),
    };

    /// Destroys this slot's values and clears the initialized flag,
    /// returning the number of values destroyed.
    fn teardown(&mut self, keys: &KeySet) -> usize {
        self.initialized = false;
        let values = mem::take(&mut self.values);
        let destroyed = values.len();
        for (config, value) in keys.iter().zip(values) {
            config.destroy(value);
        }
        destroyed
    }
}

// === impl Constructed ===

/// Values built for the keys of a `KeySet` starting at `first`, not yet
/// committed to a slot.
///
/// If dropped before being committed (such as when a later constructor
/// panics), the values are handed to their keys' destroy hooks.
struct Constructed<'keys> {
    keys: &'keys KeySet,
    first: usize,
    values: Vec<Box<dyn Any>>,
}

impl<'keys> Constructed<'keys> {
    fn new(keys: &'keys KeySet, first: usize) -> Self {
        let mut this = Self {
            keys,
            first,
            values: Vec::with_capacity(keys.len().saturating_sub(first)),
        };
        for config in keys.iter().skip(first) {
            let value = config.construct();
            this.values.push(value);
        }
        this
    }

    fn commit(mut self, values: &mut Vec<Box<dyn Any>>) {
        if values.is_empty() {
            mem::swap(values, &mut self.values);
        } else {
            values.append(&mut self.values);
        }
    }
}

impl Drop for Constructed<'_> {
    fn drop(&mut self) {
        let values = mem::take(&mut self.values);
        for (config, value) in self.keys.iter().skip(self.first).zip(values) {
            config.destroy(value);
        }
    }
}
