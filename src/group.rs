//! Scheduling group identities.
//!
//! A [`SchedulingGroup`] names a class of tasks that share a CPU-time
//! allocation on a core. This crate does not create, destroy, or schedule
//! groups; it only stores data on their behalf. The scheduler tells us which
//! group is currently running through the [`CurrentGroup`] trait.
use core::{cell::Cell, fmt};

/// The default upper bound on the number of scheduling groups per core.
///
/// This is the default value of the `N` parameter of
/// [`CoreSpecific`](crate::CoreSpecific).
pub const DEFAULT_MAX_SCHEDULING_GROUPS: usize = 16;

/// An opaque identifier for a scheduling group.
///
/// A `SchedulingGroup` is a small non-negative index. It is valid for a
/// [`CoreSpecific`](crate::CoreSpecific) table with capacity `N` if its index is
/// less than `N`. Indices are assigned by the lifecycle manager and are never
/// recycled while a table exists, although the lifecycle manager may tear
/// down a group and later initialize the same identity again.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SchedulingGroup(u32);

/// Provides the scheduling group of the task that is currently executing.
///
/// This is implemented by the scheduler that owns a core. It is used by
/// [`CoreSpecific::get_current_specific`] to resolve data for "whatever group
/// I am running in" without threading the group through every call.
///
/// [`CoreSpecific::get_current_specific`]: crate::CoreSpecific::get_current_specific
pub trait CurrentGroup {
    /// Returns the scheduling group of the currently executing task.
    fn current_scheduling_group(&self) -> SchedulingGroup;
}

// === impl SchedulingGroup ===

impl SchedulingGroup {
    /// Returns a `SchedulingGroup` with the provided index.
    #[must_use]
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns this group's index into per-core tables.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for SchedulingGroup {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SchedulingGroup(")?;
        fmt::Debug::fmt(&self.0, f)?;
        f.write_str(")")
    }
}

impl fmt::Display for SchedulingGroup {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u32> for SchedulingGroup {
    #[inline]
    fn from(index: u32) -> Self {
        Self(index)
    }
}

// === impl CurrentGroup ===

impl CurrentGroup for SchedulingGroup {
    #[inline]
    fn current_scheduling_group(&self) -> SchedulingGroup {
        *self
    }
}

/// A scheduler that tracks the running group in a `Cell` can hand out a
/// reference to it directly.
impl CurrentGroup for Cell<SchedulingGroup> {
    #[inline]
    fn current_scheduling_group(&self) -> SchedulingGroup {
        self.get()
    }
}

impl<C: CurrentGroup + ?Sized> CurrentGroup for &C {
    #[inline]
    fn current_scheduling_group(&self) -> SchedulingGroup {
        (**self).current_scheduling_group()
    }
}
