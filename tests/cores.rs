use core::sync::atomic::{AtomicUsize, Ordering};
use futures::executor::block_on;
use hyphae::{CoreSpecific, KeyRegistry, SchedulingGroup};
use std::{cell::Cell, sync::Arc, thread};

mod util;

const CORES: usize = 4;

#[test]
fn every_core_has_its_own_values() {
    util::trace_init();
    let constructed = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));

    let mut registry = KeyRegistry::new();
    let key = {
        let constructed = constructed.clone();
        let destroyed = destroyed.clone();
        registry.register_key(
            move || {
                constructed.fetch_add(1, Ordering::SeqCst);
                Cell::new(0u64)
            },
            move |_| {
                destroyed.fetch_add(1, Ordering::SeqCst);
            },
        )
    };
    let keys = registry.snapshot();

    let totals = thread::scope(|scope| {
        let cores = (0..CORES)
            .map(|core_id| {
                let keys = keys.clone();
                scope.spawn(move || {
                    let mut core = CoreSpecific::<8>::new(keys);
                    for index in 0..3 {
                        core.init_group(SchedulingGroup::new(index)).unwrap();
                    }

                    // each "task" bumps the counter of the group it runs in.
                    let current = Cell::new(SchedulingGroup::new(0));
                    for task in 0..=core_id {
                        current.set(SchedulingGroup::new(task as u32 % 3));
                        let counter = core.get_current_specific::<Cell<u64>>(&current, key);
                        counter.set(counter.get() + 1);
                    }

                    block_on(core.reduce(|acc, counter: &Cell<u64>| acc + counter.get(), 0u64, key))
                })
            })
            .collect::<Vec<_>>();

        cores
            .into_iter()
            .map(|core| core.join().unwrap())
            .collect::<Vec<_>>()
    });

    // core N ran N + 1 tasks, and no core saw another core's counters.
    assert_eq!(totals, (1..=CORES as u64).collect::<Vec<_>>());
    assert_eq!(constructed.load(Ordering::SeqCst), CORES * 3);
    assert_eq!(destroyed.load(Ordering::SeqCst), CORES * 3);
}

#[test]
fn keys_registered_late_reach_running_cores() {
    util::trace_init();
    let mut registry = KeyRegistry::new();
    let early = registry.register_key(|| "early", |_| {});

    let mut cores = (0..CORES)
        .map(|_| {
            let mut core = CoreSpecific::<4>::new(registry.snapshot());
            core.init_group(SchedulingGroup::new(1)).unwrap();
            core
        })
        .collect::<Vec<_>>();

    let late = registry.register_key(|| 42u32, |_| {});
    let keys = registry.snapshot();
    for core in &mut cores {
        core.update_keys(keys.clone());
    }

    for core in &cores {
        let group = SchedulingGroup::new(1);
        assert_eq!(core.get_specific::<&str>(group, early), &"early");
        assert_eq!(core.get_specific::<u32>(group, late), &42);
        assert_eq!(
            block_on(core.reduce(|acc, value: &u32| acc + value, 0u32, late)),
            42
        );
    }
}
