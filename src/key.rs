//! Keys identifying scheduling-group specific data.
//!
//! A [`SpecificKey`] names one "column" of specific data: every scheduling
//! group on every core holds one value for each registered key. Keys are
//! handed out by a [`KeyRegistry`], which records how to construct and
//! destroy the values for each key. The registry is owned by the runtime
//! during its setup phase; cores see it through immutable [`KeySet`]
//! snapshots.
use crate::error::{AccessError, RegisterError};
use alloc::{boxed::Box, sync::Arc, vec::Vec};
use core::{
    any::{self, Any, TypeId},
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

/// A handle identifying one kind of scheduling-group specific data.
///
/// Keys are returned by [`KeyRegistry::register_key`] and its variants.
/// Each key carries a dense integer ID, assigned in registration order
/// starting at 0, and a descriptor of the value type it was registered with.
/// IDs are never reused. A key also remembers which registry issued it, and
/// is unknown to any core whose keys came from a different registry.
///
/// Holding a key does not imply that any value exists for it yet; values are
/// constructed when a scheduling group is initialized on a core.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct SpecificKey {
    id: usize,
    registry: usize,
    type_id: TypeId,
    type_name: &'static str,
}

/// Describes how to construct and destroy the values for one key.
pub struct KeyConfig {
    type_id: TypeId,
    type_name: &'static str,
    construct: Box<dyn Fn() -> Box<dyn Any> + Send + Sync>,
    destroy: Option<Box<dyn Fn(Box<dyn Any>) + Send + Sync>>,
}

/// The process-wide registry of specific data keys.
///
/// Keys are registered during the runtime's single-threaded setup phase.
/// Registration requires `&mut self`, so it cannot race with itself. Once
/// the keys are registered, [`KeyRegistry::snapshot`] produces a [`KeySet`]
/// that can be shared with every core.
///
/// # Examples
///
/// ```
/// use hyphae::KeyRegistry;
///
/// let mut registry = KeyRegistry::new();
/// let requests = registry.register_default::<u64>();
/// let name = registry.register_key(|| "unnamed", |_| {});
///
/// assert_eq!(requests.id(), 0);
/// assert_eq!(name.id(), 1);
/// assert_eq!(registry.snapshot().len(), 2);
/// ```
pub struct KeyRegistry {
    id: usize,
    configs: Vec<Arc<KeyConfig>>,
    max_keys: usize,
}

/// An immutable snapshot of the keys registered in a [`KeyRegistry`].
///
/// Snapshots are cheap to clone and may be sent between cores. A snapshot
/// taken later from the same registry always *extends* an earlier one: it
/// contains the same configs, in the same order, followed by any keys
/// registered in between.
#[derive(Clone)]
pub struct KeySet {
    /// 0 for the empty set, which belongs to no registry.
    registry: usize,
    configs: Arc<[Arc<KeyConfig>]>,
}

// === impl SpecificKey ===

impl SpecificKey {
    /// Returns this key's ID.
    ///
    /// IDs are dense and start at 0.
    #[must_use]
    #[inline]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Returns the name of the value type this key was registered with.
    #[must_use]
    #[inline]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if this key holds values of type `T`.
    #[must_use]
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    #[inline]
    pub(crate) fn registry(&self) -> usize {
        self.registry
    }
}

impl fmt::Debug for SpecificKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpecificKey({}: {})", self.id, self.type_name)
    }
}

// === impl KeyConfig ===

impl KeyConfig {
    /// Returns a config for values of type `T` built by `construct`.
    ///
    /// Values are dropped normally when their scheduling group is torn down.
    #[must_use]
    pub fn new<T, C>(construct: C) -> Self
    where
        T: Any,
        C: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: any::type_name::<T>(),
            construct: Box::new(move || Box::new(construct()) as Box<dyn Any>),
            destroy: None,
        }
    }

    /// Returns a config for values of type `T` built by `construct` and
    /// handed to `destroy` when their scheduling group is torn down.
    #[must_use]
    pub fn with_destroy<T, C, D>(construct: C, destroy: D) -> Self
    where
        T: Any,
        C: Fn() -> T + Send + Sync + 'static,
        D: Fn(T) + Send + Sync + 'static,
    {
        let destroy = move |value: Box<dyn Any>| match value.downcast::<T>() {
            Ok(value) => destroy(*value),
            Err(_) => unreachable!(
                "KeyConfig<{}>: asked to destroy a value of another type",
                any::type_name::<T>()
            ),
        };
        Self {
            destroy: Some(Box::new(destroy)),
            ..Self::new(construct)
        }
    }

    /// Returns the name of the value type described by this config.
    #[must_use]
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    #[inline]
    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn construct(&self) -> Box<dyn Any> {
        (self.construct)()
    }

    pub(crate) fn destroy(&self, value: Box<dyn Any>) {
        match self.destroy {
            Some(ref destroy) => destroy(value),
            None => drop(value),
        }
    }
}

impl fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyConfig")
            .field("type", &self.type_name)
            .field("has_destroy", &self.destroy.is_some())
            .finish()
    }
}

// === impl KeyRegistry ===

impl KeyRegistry {
    /// Returns a new, empty registry with no bound on the number of keys.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_keys(usize::MAX)
    }

    /// Returns a new, empty registry that accepts at most `max_keys` keys.
    #[must_use]
    pub fn with_max_keys(max_keys: usize) -> Self {
        // registry IDs start at 1, so that no key belongs to the empty set.
        static NEXT_ID: AtomicUsize = AtomicUsize::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            configs: Vec::new(),
            max_keys,
        }
    }

    /// Registers a key whose values are built by `construct` and handed to
    /// `destroy` when their scheduling group is torn down.
    ///
    /// # Panics
    ///
    /// If this registry already holds [`max_keys`](Self::max_keys) keys.
    #[track_caller]
    pub fn register_key<T, C, D>(&mut self, construct: C, destroy: D) -> SpecificKey
    where
        T: Any,
        C: Fn() -> T + Send + Sync + 'static,
        D: Fn(T) + Send + Sync + 'static,
    {
        self.register_config(KeyConfig::with_destroy(construct, destroy))
    }

    /// Registers a key whose values are built by `construct` and handed to
    /// `destroy` when their scheduling group is torn down, returning an
    /// error if the registry is full.
    pub fn try_register_key<T, C, D>(
        &mut self,
        construct: C,
        destroy: D,
    ) -> Result<SpecificKey, RegisterError>
    where
        T: Any,
        C: Fn() -> T + Send + Sync + 'static,
        D: Fn(T) + Send + Sync + 'static,
    {
        self.try_register_config(KeyConfig::with_destroy(construct, destroy))
    }

    /// Registers a key whose values start out as `T::default()`.
    ///
    /// # Panics
    ///
    /// If this registry already holds [`max_keys`](Self::max_keys) keys.
    #[track_caller]
    pub fn register_default<T: Any + Default>(&mut self) -> SpecificKey {
        self.register_config(KeyConfig::new(T::default))
    }

    /// Registers a key described by `config`.
    ///
    /// # Panics
    ///
    /// If this registry already holds [`max_keys`](Self::max_keys) keys.
    #[track_caller]
    pub fn register_config(&mut self, config: KeyConfig) -> SpecificKey {
        match self.try_register_config(config) {
            Ok(key) => key,
            Err(error) => panic!("failed to register specific key: {error}"),
        }
    }

    /// Registers a key described by `config`, returning an error if the
    /// registry is full.
    pub fn try_register_config(&mut self, config: KeyConfig) -> Result<SpecificKey, RegisterError> {
        let id = self.configs.len();
        if id >= self.max_keys {
            return Err(RegisterError::Full { max: self.max_keys });
        }

        let key = SpecificKey {
            id,
            registry: self.id,
            type_id: config.type_id,
            type_name: config.type_name,
        };
        tracing::debug!(key.id = id, key.value = key.type_name, "registered specific key");
        self.configs.push(Arc::new(config));
        Ok(key)
    }

    /// Returns a snapshot of every key registered so far.
    #[must_use]
    pub fn snapshot(&self) -> KeySet {
        KeySet {
            registry: self.id,
            configs: Arc::from(self.configs.clone()),
        }
    }

    /// Returns the number of registered keys.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Returns `true` if no keys have been registered.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Returns the maximum number of keys this registry accepts.
    #[must_use]
    #[inline]
    pub fn max_keys(&self) -> usize {
        self.max_keys
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRegistry")
            .field("id", &self.id)
            .field("configs", &self.configs)
            .field("max_keys", &self.max_keys)
            .finish()
    }
}

// === impl KeySet ===

impl KeySet {
    /// Returns a snapshot containing no keys.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            registry: 0,
            configs: Arc::from(Vec::new()),
        }
    }

    /// Returns the number of keys in this snapshot.
    #[must_use]
    #[inline]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Returns `true` if this snapshot contains no keys.
    #[must_use]
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Returns `true` if `key` was registered with the same registry as this
    /// snapshot, before this snapshot was taken.
    #[must_use]
    #[inline]
    pub fn contains(&self, key: &SpecificKey) -> bool {
        self.get_key(key).is_ok()
    }

    /// Returns `true` if this snapshot contains every config in `earlier`,
    /// at the same IDs.
    #[must_use]
    pub fn extends(&self, earlier: &KeySet) -> bool {
        earlier.len() <= self.len()
            && earlier
                .configs
                .iter()
                .zip(self.configs.iter())
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }

    /// Returns the config `key` was registered with.
    pub(crate) fn get_key(&self, key: &SpecificKey) -> Result<&KeyConfig, AccessError> {
        if key.registry != self.registry {
            return Err(AccessError::ForeignKey { key: *key });
        }
        self.configs
            .get(key.id)
            .map(|config| &**config)
            .ok_or(AccessError::UnknownKey {
                key: *key,
                known: self.len(),
            })
    }

    #[inline]
    pub(crate) fn registry(&self) -> usize {
        self.registry
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &KeyConfig> + '_ {
        self.configs.iter().map(|config| &**config)
    }
}

impl Default for KeySet {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
