//! Asynchronous aggregation of specific data across scheduling groups.
//!
//! [`CoreSpecific::reduce`] and [`CoreSpecific::map_reduce`] fold the values
//! for one key across every scheduling group initialized on a core. This is
//! a sequential, order-preserving fold over one core's groups. Combining
//! the results of several cores is left to the caller.
//!
//! # Ordering
//!
//! Values are always folded in ascending scheduling group index order, so
//! reducers need not be commutative. With [`map_reduce`], the mapped futures
//! are polled concurrently and may complete in any order, but each result is
//! folded only after the results of all lower-indexed groups.
//!
//! # Borrowing
//!
//! If the mapper's futures borrow the values they were handed, the returned
//! [`MapReduce`] borrows the [`CoreSpecific`] table until it completes or is
//! dropped. Tearing down a scheduling group requires `&mut` access to the
//! table, so a group can never be torn down while a suspended aggregation
//! still references its data.
//!
//! [`map_reduce`]: CoreSpecific::map_reduce
use crate::{key::SpecificKey, table::CoreSpecific};
use core::{
    any::Any,
    fmt,
    future::{self, Future, Ready},
    pin::Pin,
    task::{ready, Context, Poll},
};
use futures_util::stream::{FuturesOrdered, Stream};
use pin_project::pin_project;

/// A future returned by [`CoreSpecific::map_reduce`].
///
/// Resolves to the final accumulator once every mapped value has been
/// folded, or to the first error returned by a mapped future, in scheduling
/// group order. Once an error is returned, the remaining mapped futures are
/// dropped without being folded.
///
/// Dropping a `MapReduce` drops any mapped futures that have not yet
/// completed.
#[pin_project]
#[must_use = "futures do nothing unless `.await`ed or polled"]
pub struct MapReduce<Fut: Future, R, Acc> {
    #[pin]
    mapped: FuturesOrdered<Fut>,
    reducer: R,
    /// `None` once the future has completed.
    acc: Option<Acc>,
    key: SpecificKey,
}

impl<const N: usize> CoreSpecific<N> {
    /// Folds the values of type `T` for `key` across every scheduling group
    /// initialized on this core, in ascending group index order.
    ///
    /// The fold runs to completion before this method returns, and the
    /// returned future is already resolved. If no groups are initialized,
    /// it resolves to `initial`.
    ///
    /// # Panics
    ///
    /// Under the same conditions as [`CoreSpecific::get_specific_ptr`].
    ///
    /// # Examples
    ///
    /// ```
    /// use hyphae::{CoreSpecific, KeyRegistry, SchedulingGroup};
    /// # futures::executor::block_on(async {
    ///
    /// let mut registry = KeyRegistry::new();
    /// let key = registry.register_default::<u64>();
    /// let mut core: CoreSpecific = CoreSpecific::new(registry.snapshot());
    ///
    /// for index in 0..3 {
    ///     let group = SchedulingGroup::new(index);
    ///     core.init_group(group).unwrap();
    ///     *core.get_specific_mut::<u64>(group, key) = u64::from(index) * 10;
    /// }
    ///
    /// let total = core.reduce(|acc, value: &u64| acc + value, 0u64, key).await;
    /// assert_eq!(total, 30);
    /// # });
    /// ```
    pub fn reduce<T, R, Acc>(&self, mut reducer: R, initial: Acc, key: SpecificKey) -> Ready<Acc>
    where
        T: Any,
        R: FnMut(Acc, &T) -> Acc,
    {
        let acc = self.initialized_groups().fold(initial, |acc, group| {
            reducer(acc, self.get_specific::<T>(group, key))
        });
        future::ready(acc)
    }

    /// Maps the values of type `T` for `key` in every scheduling group
    /// initialized on this core, and folds the mapped results in ascending
    /// group index order.
    ///
    /// `mapper` is called once for each initialized group, in group index
    /// order, before this method returns. The futures it returns are polled
    /// concurrently by the returned [`MapReduce`] future, and their outputs
    /// are passed to `reducer` in group index order, regardless of the order
    /// in which they complete.
    ///
    /// The returned future resolves to the final accumulator, or to the first
    /// error returned by a mapped future in group index order. If no groups
    /// are initialized, it resolves to `Ok(initial)` on its first poll.
    ///
    /// # Panics
    ///
    /// Under the same conditions as [`CoreSpecific::get_specific_ptr`].
    ///
    /// # Examples
    ///
    /// ```
    /// use hyphae::{CoreSpecific, KeyRegistry, SchedulingGroup};
    /// use core::{convert::Infallible, future::ready};
    /// # futures::executor::block_on(async {
    ///
    /// let mut registry = KeyRegistry::new();
    /// let key = registry.register_key(|| "shard", |_| {});
    /// let mut core: CoreSpecific = CoreSpecific::new(registry.snapshot());
    /// core.init_group(SchedulingGroup::new(0)).unwrap();
    /// core.init_group(SchedulingGroup::new(2)).unwrap();
    ///
    /// let total_len = core
    ///     .map_reduce(
    ///         |name: &&str| ready(Ok::<_, Infallible>(name.len())),
    ///         |acc, len| acc + len,
    ///         0usize,
    ///         key,
    ///     )
    ///     .await;
    /// assert_eq!(total_len, Ok(10));
    /// # });
    /// ```
    pub fn map_reduce<'a, T, M, Fut, U, E, R, Acc>(
        &'a self,
        mut mapper: M,
        reducer: R,
        initial: Acc,
        key: SpecificKey,
    ) -> MapReduce<Fut, R, Acc>
    where
        T: Any,
        M: FnMut(&'a T) -> Fut,
        Fut: Future<Output = Result<U, E>>,
        R: FnMut(Acc, U) -> Acc,
    {
        let mapped = self
            .initialized_groups()
            .map(move |group| mapper(self.get_specific::<T>(group, key)))
            .collect::<FuturesOrdered<_>>();
        tracing::trace!(?key, groups = mapped.len(), "map-reducing specific data");

        MapReduce {
            mapped,
            reducer,
            acc: Some(initial),
            key,
        }
    }
}

// === impl MapReduce ===

impl<Fut, U, E, R, Acc> Future for MapReduce<Fut, R, Acc>
where
    Fut: Future<Output = Result<U, E>>,
    R: FnMut(Acc, U) -> Acc,
{
    type Output = Result<Acc, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();
        loop {
            match ready!(this.mapped.as_mut().poll_next(cx)) {
                Some(Ok(mapped)) => {
                    let acc = this.acc.take().expect("MapReduce polled after completion");
                    *this.acc = Some((this.reducer)(acc, mapped));
                }
                Some(Err(error)) => {
                    // abandon the remaining groups without folding them.
                    *this.acc = None;
                    this.mapped.set(FuturesOrdered::new());
                    tracing::debug!(key = ?this.key, "specific data aggregation failed");
                    return Poll::Ready(Err(error));
                }
                None => {
                    let acc = this.acc.take().expect("MapReduce polled after completion");
                    return Poll::Ready(Ok(acc));
                }
            }
        }
    }
}

impl<Fut: Future, R, Acc> fmt::Debug for MapReduce<Fut, R, Acc> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapReduce")
            .field("key", &self.key)
            .field("pending", &self.mapped.len())
            .field("done", &self.acc.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::{CoreSpecific, KeyRegistry, SchedulingGroup};
    use core::{convert::Infallible, future::ready};
    use futures::FutureExt;

    #[test]
    fn no_groups_resolves_immediately() {
        let mut registry = KeyRegistry::new();
        let key = registry.register_default::<u32>();
        let core: CoreSpecific = CoreSpecific::new(registry.snapshot());

        let sum = core.reduce(|acc, value: &u32| acc + value, 0u32, key);
        assert_eq!(sum.now_or_never(), Some(0));

        let mapped = core.map_reduce(
            |value: &u32| ready(Ok::<_, Infallible>(*value)),
            |acc, value| acc + value,
            0u32,
            key,
        );
        assert_eq!(mapped.now_or_never(), Some(Ok(0)));
    }

    #[test]
    fn ready_mappers_fold_on_first_poll() {
        let _trace = crate::test_util::trace_init();
        let mut registry = KeyRegistry::new();
        let key = registry.register_key(|| 2u32, |_| {});
        let mut core: CoreSpecific = CoreSpecific::new(registry.snapshot());
        for index in [0, 4, 9] {
            core.init_group(SchedulingGroup::new(index)).unwrap();
        }

        let product = core.map_reduce(
            |value: &u32| ready(Ok::<_, Infallible>(*value)),
            |acc, value| acc * value,
            1u32,
            key,
        );
        assert_eq!(product.now_or_never(), Some(Ok(8)));
    }

    #[test]
    fn debug_shows_progress() {
        let mut registry = KeyRegistry::new();
        let key = registry.register_key(|| 1u8, |_| {});
        let mut core = CoreSpecific::<4>::new(registry.snapshot());
        core.init_group(SchedulingGroup::new(1)).unwrap();

        let pending = core.map_reduce(
            |_: &u8| futures::future::pending::<Result<u8, Infallible>>(),
            |acc: u8, value| acc + value,
            0,
            key,
        );
        let debug = format!("{pending:?}");
        assert!(debug.contains("pending: 1"), "{debug}");
        assert!(debug.contains("done: false"), "{debug}");
    }
}
