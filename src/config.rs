//! Runtime configuration for [`CoreSpecific`](crate::CoreSpecific) tables.

/// Configures a [`CoreSpecific`](crate::CoreSpecific) table.
///
/// # Verification mode
///
/// Values are stored type-erased, and every typed access downcasts them back
/// to the caller's type. That downcast is *always* checked: asking for the
/// wrong type is never undefined behavior, and a failed downcast panics.
///
/// When type verification is enabled, every access *also* compares the
/// caller's type against the type recorded in the key registry, before the
/// scheduling group is even looked up. This catches a mismatched type
/// parameter on every access, including accesses that would otherwise have
/// returned "absent" because the group isn't initialized. The cost is one
/// extra `TypeId` comparison per access.
///
/// Verification defaults to on in builds with `debug_assertions`, and off
/// otherwise.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Config {
    verify_types: bool,
}

impl Config {
    /// Returns the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            verify_types: cfg!(debug_assertions),
        }
    }

    /// Enables or disables type verification.
    #[must_use]
    pub const fn verify_types(self, verify_types: bool) -> Self {
        Self { verify_types }
    }

    /// Returns `true` if type verification is enabled.
    #[must_use]
    #[inline]
    pub const fn verifies_types(&self) -> bool {
        self.verify_types
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
