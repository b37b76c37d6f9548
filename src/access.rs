//! Typed access to scheduling-group specific data.
//!
//! These are hot-path operations. They never allocate, suspend, or log.
use crate::{
    error::AccessError,
    group::{CurrentGroup, SchedulingGroup},
    key::{KeySet, SpecificKey},
    table::CoreSpecific,
};
use core::any::{self, Any, TypeId};

impl<const N: usize> CoreSpecific<N> {
    /// Returns a reference to the value of type `T` for `key` in `group`, or
    /// `None` if `group` is out of range or not initialized on this core.
    ///
    /// `T` must be the type `key` was registered with.
    ///
    /// # Panics
    ///
    /// - If `T` is not the type `key` was registered with. When type
    ///   verification is enabled in this table's [`Config`], this is checked
    ///   even if the group is not initialized.
    /// - If `key` is unknown to this core, or was issued by a different
    ///   registry than this core's keys.
    ///
    /// [`Config`]: crate::Config
    #[must_use]
    #[inline]
    #[track_caller]
    pub fn get_specific_ptr<T: Any>(&self, group: SchedulingGroup, key: SpecificKey) -> Option<&T> {
        match self.try_get_specific(group, key) {
            Ok(value) => Some(value),
            Err(AccessError::NoSuchGroup { .. }) => None,
            Err(error) => fatal(error),
        }
    }

    /// Returns a mutable reference to the value of type `T` for `key` in
    /// `group`, or `None` if `group` is out of range or not initialized on
    /// this core.
    ///
    /// # Panics
    ///
    /// Under the same conditions as [`get_specific_ptr`](Self::get_specific_ptr).
    #[must_use]
    #[inline]
    #[track_caller]
    pub fn get_specific_ptr_mut<T: Any>(
        &mut self,
        group: SchedulingGroup,
        key: SpecificKey,
    ) -> Option<&mut T> {
        match self.try_get_specific_mut(group, key) {
            Ok(value) => Some(value),
            Err(AccessError::NoSuchGroup { .. }) => None,
            Err(error) => fatal(error),
        }
    }

    /// Returns a reference to the value of type `T` for `key` in `group`.
    ///
    /// This is for callers that treat the group's presence on this core as a
    /// precondition. Use [`get_specific_ptr`](Self::get_specific_ptr) if the
    /// group may be missing.
    ///
    /// # Panics
    ///
    /// - If `group` is out of range or not initialized on this core.
    /// - Under the same conditions as [`get_specific_ptr`](Self::get_specific_ptr).
    #[must_use]
    #[inline]
    #[track_caller]
    pub fn get_specific<T: Any>(&self, group: SchedulingGroup, key: SpecificKey) -> &T {
        match self.try_get_specific(group, key) {
            Ok(value) => value,
            Err(error) => fatal(error),
        }
    }

    /// Returns a mutable reference to the value of type `T` for `key` in
    /// `group`.
    ///
    /// # Panics
    ///
    /// Under the same conditions as [`get_specific`](Self::get_specific).
    #[must_use]
    #[inline]
    #[track_caller]
    pub fn get_specific_mut<T: Any>(&mut self, group: SchedulingGroup, key: SpecificKey) -> &mut T {
        match self.try_get_specific_mut(group, key) {
            Ok(value) => value,
            Err(error) => fatal(error),
        }
    }

    /// Returns a reference to the value of type `T` for `key` in the
    /// scheduling group of the currently executing task, as reported by
    /// `current`.
    ///
    /// # Panics
    ///
    /// Under the same conditions as [`get_specific`](Self::get_specific).
    #[must_use]
    #[inline]
    #[track_caller]
    pub fn get_current_specific<T: Any>(
        &self,
        current: &impl CurrentGroup,
        key: SpecificKey,
    ) -> &T {
        self.get_specific(current.current_scheduling_group(), key)
    }

    /// Returns a reference to the value of type `T` for `key` in `group`.
    ///
    /// This never panics.
    ///
    /// # Errors
    ///
    /// - [`AccessError::NoSuchGroup`] if `group` is out of range or not
    ///   initialized on this core.
    /// - [`AccessError::TypeMismatch`] if `T` is not the type `key` was
    ///   registered with.
    /// - [`AccessError::UnknownKey`] if `key` is unknown to this core.
    /// - [`AccessError::ForeignKey`] if `key` came from another registry.
    pub fn try_get_specific<T: Any>(
        &self,
        group: SchedulingGroup,
        key: SpecificKey,
    ) -> Result<&T, AccessError> {
        if self.config().verifies_types() {
            self.verify_type::<T>(&key)?;
        }
        self.lookup(group, &key)?
            .downcast_ref::<T>()
            .ok_or_else(|| mismatch::<T>(self.keys(), &key))
    }

    /// Returns a mutable reference to the value of type `T` for `key` in
    /// `group`.
    ///
    /// # Errors
    ///
    /// Under the same conditions as [`try_get_specific`](Self::try_get_specific).
    pub fn try_get_specific_mut<T: Any>(
        &mut self,
        group: SchedulingGroup,
        key: SpecificKey,
    ) -> Result<&mut T, AccessError> {
        if self.config().verifies_types() {
            self.verify_type::<T>(&key)?;
        }
        self.downcast_mut(group, &key)
    }

    /// Checks `T` against the type recorded in the registry for `key`.
    fn verify_type<T: Any>(&self, key: &SpecificKey) -> Result<(), AccessError> {
        let config = self.keys().get_key(key)?;
        if config.type_id() != TypeId::of::<T>() {
            return Err(mismatch::<T>(self.keys(), key));
        }
        Ok(())
    }
}

#[cold]
pub(crate) fn mismatch<T: Any>(keys: &KeySet, key: &SpecificKey) -> AccessError {
    let found = keys
        .get_key(key)
        .map_or(key.type_name(), |config| config.type_name());
    AccessError::TypeMismatch {
        key: *key,
        expected: any::type_name::<T>(),
        found,
    }
}

/// Reports a specific data access error that the caller cannot recover from.
#[cold]
#[inline(never)]
#[track_caller]
pub(crate) fn fatal(error: AccessError) -> ! {
    panic!("{error}")
}

#[cfg(test)]
mod tests {
    use crate::{Config, CoreSpecific, KeyRegistry, SchedulingGroup, SpecificKey};
    use core::cell::Cell;
    use proptest::prelude::*;

    fn sentinels() -> (KeyRegistry, [SpecificKey; 3]) {
        let mut registry = KeyRegistry::new();
        let keys = [
            registry.register_key(|| 0xA_u32, |_| {}),
            registry.register_key(|| 0xB_u32, |_| {}),
            registry.register_key(|| "c", |_| {}),
        ];
        (registry, keys)
    }

    proptest! {
        #[test]
        fn present_iff_initialized(initialized in proptest::collection::btree_set(0u32..8, 0..8)) {
            let (registry, [a, _, c]) = sentinels();
            let mut core = CoreSpecific::<8>::new(registry.snapshot());
            for &index in &initialized {
                core.init_group(SchedulingGroup::new(index)).unwrap();
            }

            for index in 0..10 {
                let group = SchedulingGroup::new(index);
                let present = initialized.contains(&index);
                prop_assert_eq!(core.get_specific_ptr::<u32>(group, a).is_some(), present);
                prop_assert_eq!(core.get_specific_ptr::<&str>(group, c).is_some(), present);
            }
        }
    }

    #[test]
    fn values_come_from_their_constructors() {
        let (registry, [a, b, c]) = sentinels();
        let mut core: CoreSpecific = CoreSpecific::new(registry.snapshot());
        let group = SchedulingGroup::new(3);
        core.init_group(group).unwrap();

        assert_eq!(core.get_specific_ptr::<u32>(group, a), Some(&0xA));
        assert_eq!(core.get_specific_ptr::<u32>(group, b), Some(&0xB));
        assert_eq!(core.get_specific_ptr::<&str>(group, c), Some(&"c"));

        let ptr = core.get_specific_ptr::<u32>(group, b).unwrap() as *const u32;
        let reference = core.get_specific::<u32>(group, b) as *const u32;
        assert_eq!(ptr, reference, "both accessors return the same referent");
    }

    #[test]
    fn values_are_per_group() {
        let (registry, [a, ..]) = sentinels();
        let mut core: CoreSpecific = CoreSpecific::new(registry.snapshot());
        let (g0, g1) = (SchedulingGroup::new(0), SchedulingGroup::new(1));
        core.init_group(g0).unwrap();
        core.init_group(g1).unwrap();

        *core.get_specific_mut::<u32>(g0, a) += 1;
        assert_eq!(core.get_specific::<u32>(g0, a), &0xB);
        assert_eq!(core.get_specific::<u32>(g1, a), &0xA);

        if let Some(value) = core.get_specific_ptr_mut::<u32>(g1, a) {
            *value = 7;
        }
        assert_eq!(core.get_specific::<u32>(g1, a), &7);
    }

    #[test]
    #[should_panic(expected = "no such scheduling group on this core")]
    fn get_specific_uninitialized() {
        let (registry, [a, ..]) = sentinels();
        let core: CoreSpecific = CoreSpecific::new(registry.snapshot());
        let _ = core.get_specific::<u32>(SchedulingGroup::new(0), a);
    }

    #[test]
    #[should_panic(expected = "no such scheduling group on this core")]
    fn get_specific_out_of_range() {
        let (registry, [a, ..]) = sentinels();
        let core = CoreSpecific::<2>::new(registry.snapshot());
        let _ = core.get_specific::<u32>(SchedulingGroup::new(2), a);
    }

    #[test]
    fn current_group() {
        let (registry, [a, b, _]) = sentinels();
        let mut core: CoreSpecific = CoreSpecific::new(registry.snapshot());
        core.init_group(SchedulingGroup::new(0)).unwrap();
        core.init_group(SchedulingGroup::new(5)).unwrap();
        *core.get_specific_mut::<u32>(SchedulingGroup::new(5), a) = 55;

        let current = Cell::new(SchedulingGroup::new(5));
        assert_eq!(core.get_current_specific::<u32>(&current, a), &55);
        current.set(SchedulingGroup::new(0));
        assert_eq!(core.get_current_specific::<u32>(&current, a), &0xA);
        assert_eq!(
            core.get_current_specific::<u32>(&SchedulingGroup::new(5), b),
            &0xB
        );
    }

    #[test]
    #[should_panic(expected = "was accessed as `u64`")]
    fn wrong_type_is_fatal() {
        let (registry, [a, ..]) = sentinels();
        let config = Config::new().verify_types(false);
        let mut core = CoreSpecific::<4>::with_config(registry.snapshot(), config);
        core.init_group(SchedulingGroup::new(0)).unwrap();
        let _ = core.get_specific_ptr::<u64>(SchedulingGroup::new(0), a);
    }

    #[test]
    fn verification_checks_absent_groups() {
        let (registry, [a, ..]) = sentinels();
        let group = SchedulingGroup::new(1);

        let unverified =
            CoreSpecific::<4>::with_config(registry.snapshot(), Config::new().verify_types(false));
        assert_eq!(
            unverified.try_get_specific::<u64>(group, a),
            Err(crate::AccessError::NoSuchGroup { group })
        );

        let verified =
            CoreSpecific::<4>::with_config(registry.snapshot(), Config::new().verify_types(true));
        assert_eq!(
            verified.try_get_specific::<u64>(group, a),
            Err(crate::AccessError::TypeMismatch {
                key: a,
                expected: "u64",
                found: "u32",
            })
        );
    }

    #[test]
    fn mutable_access_reports_mismatches() {
        let (registry, [a, ..]) = sentinels();
        let group = SchedulingGroup::new(0);
        let config = Config::new().verify_types(false);
        let mut core = CoreSpecific::<4>::with_config(registry.snapshot(), config);
        core.init_group(group).unwrap();

        assert_eq!(
            core.try_get_specific_mut::<u64>(group, a).map(|_| ()),
            Err(crate::AccessError::TypeMismatch {
                key: a,
                expected: "u64",
                found: "u32",
            })
        );
        *core.try_get_specific_mut::<u32>(group, a).unwrap() = 3;
        assert_eq!(core.get_specific::<u32>(group, a), &3);
    }

    #[test]
    fn keys_from_another_registry_are_rejected() {
        let (registry, [a, ..]) = sentinels();
        let (_, [foreign, ..]) = sentinels();
        let group = SchedulingGroup::new(0);

        for verify in [false, true] {
            let config = Config::new().verify_types(verify);
            let mut core = CoreSpecific::<4>::with_config(registry.snapshot(), config);
            core.init_group(group).unwrap();

            assert_eq!(core.try_get_specific::<u32>(group, a), Ok(&0xA));
            assert_eq!(
                core.try_get_specific::<u32>(group, foreign),
                Err(crate::AccessError::ForeignKey { key: foreign })
            );
            assert_eq!(
                core.try_get_specific_mut::<u32>(group, foreign).map(|_| ()),
                Err(crate::AccessError::ForeignKey { key: foreign })
            );
        }
    }

    #[test]
    #[should_panic(expected = "was registered with a different key registry")]
    fn foreign_key_is_fatal() {
        let (registry, _) = sentinels();
        let (_, [foreign, ..]) = sentinels();
        let mut core = CoreSpecific::<4>::new(registry.snapshot());
        core.init_group(SchedulingGroup::new(0)).unwrap();
        let _ = core.get_specific_ptr::<u32>(SchedulingGroup::new(0), foreign);
    }

    #[test]
    #[should_panic(expected = "is unknown to this core")]
    fn unknown_key_is_fatal() {
        let (mut registry, _) = sentinels();
        let mut core = CoreSpecific::<4>::new(registry.snapshot());
        core.init_group(SchedulingGroup::new(0)).unwrap();
        let late = registry.register_default::<u32>();
        let _ = core.get_specific_ptr::<u32>(SchedulingGroup::new(0), late);
    }
}
