use corun::stack::MIN_STACK_SIZE;
use corun::{CoroutineId, Error, Scheduler, SchedulerBuilder, State};
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

type Log = Rc<RefCell<Vec<&'static str>>>;

fn small_scheduler() -> Scheduler {
    SchedulerBuilder::new().stack_size(MIN_STACK_SIZE).build()
}

#[test]
fn test_resume_runs_until_next_yield() {
    let scheduler = small_scheduler();
    let log: Log = Rc::default();
    let log_clone = log.clone();

    let id = scheduler
        .create(move || {
            log_clone.borrow_mut().push("first");
            corun::yield_now().unwrap();
            log_clone.borrow_mut().push("second");
            corun::yield_now().unwrap();
            log_clone.borrow_mut().push("third");
        })
        .unwrap();

    assert_eq!(*log.borrow(), ["first"]);

    scheduler.resume(id).unwrap();
    assert_eq!(*log.borrow(), ["first", "second"]);
    assert_eq!(scheduler.get_by_id(id).unwrap().state(), State::Waiting);

    scheduler.resume(id).unwrap();
    assert_eq!(*log.borrow(), ["first", "second", "third"]);
    assert!(scheduler.get_by_id(id).is_none());
}

#[test]
fn test_nested_yield_returns_to_immediate_resumer() {
    let scheduler = small_scheduler();
    let log: Log = Rc::default();
    let ids: Rc<RefCell<Vec<CoroutineId>>> = Rc::default();

    let (log_a, ids_a) = (log.clone(), ids.clone());
    let a = scheduler
        .create(move || {
            let a = corun::current_id().unwrap();
            ids_a.borrow_mut().push(a);

            let (log_b, ids_b) = (log_a.clone(), ids_a.clone());
            corun::spawn(move || {
                let b = corun::current_id().unwrap();
                ids_b.borrow_mut().push(b);

                let log_c = log_b.clone();
                let c = corun::spawn(move || {
                    log_c.borrow_mut().push("c yields");
                    corun::yield_now().unwrap();
                    log_c.borrow_mut().push("c resumed");
                })
                .unwrap();
                ids_b.borrow_mut().push(c);

                let scheduler = Scheduler::try_current().unwrap();
                assert_eq!(scheduler.current_id(), Some(b), "C must yield back to B");
                assert_eq!(scheduler.get_by_id(c).unwrap().origin_id(), Some(b));
                assert_eq!(scheduler.get_by_id(b).unwrap().origin_id(), Some(a));
                drop(scheduler);

                log_b.borrow_mut().push("b yields");
                corun::yield_now().unwrap();
                log_b.borrow_mut().push("b resumed");
            })
            .unwrap();

            assert_eq!(corun::current_id(), Some(a), "B must yield back to A");
            log_a.borrow_mut().push("a yields");
            corun::yield_now().unwrap();
            log_a.borrow_mut().push("a resumed");
        })
        .unwrap();

    assert_eq!(*log.borrow(), ["c yields", "b yields", "a yields"]);
    assert_eq!(scheduler.current_id(), None);

    let (b, c) = {
        let ids = ids.borrow();
        assert_eq!(ids[0], a);
        (ids[1], ids[2])
    };

    assert_eq!(scheduler.get_by_id(a).unwrap().origin_id(), None);
    assert_eq!(scheduler.count(), 3);

    scheduler.resume(c).unwrap();
    assert!(scheduler.get_by_id(c).is_none());

    scheduler.resume(b).unwrap();
    scheduler.resume(a).unwrap();

    assert_eq!(
        *log.borrow(),
        [
            "c yields",
            "b yields",
            "a yields",
            "c resumed",
            "b resumed",
            "a resumed"
        ]
    );
    assert_eq!(scheduler.count(), 0);
    assert_eq!(scheduler.peak(), 3);
}

#[test]
fn test_resumer_becomes_origin() {
    let scheduler = small_scheduler();

    let waiter = scheduler.create(|| corun::yield_now().unwrap()).unwrap();

    let observed = Rc::new(Cell::new(None));
    let observed_clone = observed.clone();

    let resumer = scheduler
        .create(move || {
            let scheduler = Scheduler::try_current().unwrap();
            let me = scheduler.current_id();

            scheduler.resume(waiter).unwrap();

            observed_clone.set(Some(me));
            assert_eq!(scheduler.current_id(), me, "Resume must return to its caller");
        })
        .unwrap();

    assert!(scheduler.get_by_id(waiter).is_none(), "Waiter ended inside the resumer");
    assert_eq!(observed.get(), Some(Some(resumer)));
    assert_eq!(scheduler.count(), 0);
}

#[test]
fn test_only_one_coroutine_running() {
    let scheduler = small_scheduler();

    let outer = scheduler
        .create(|| {
            let scheduler = Scheduler::try_current().unwrap();
            let outer = scheduler.current_id().unwrap();

            let inner = corun::spawn(|| corun::yield_now().unwrap()).unwrap();
            assert_eq!(scheduler.get_by_id(outer).unwrap().state(), State::Running);

            scheduler.set_on_resume(|s| {
                let running = s
                    .coroutines()
                    .into_iter()
                    .filter(|id| s.get_by_id(*id).unwrap().state() == State::Running)
                    .count();
                assert_eq!(running, 1);
            });

            scheduler.resume(inner).unwrap();
            scheduler.clear_hook(corun::HookKind::Resume);
        })
        .unwrap();

    assert!(scheduler.get_by_id(outer).is_none());
}

#[test]
fn test_resume_running_coroutine_is_invalid() {
    let scheduler = small_scheduler();
    let results = Rc::new(RefCell::new(Vec::new()));
    let results_clone = results.clone();

    scheduler
        .create(move || {
            let scheduler = Scheduler::try_current().unwrap();
            let outer = scheduler.current_id().unwrap();

            let results = results_clone.clone();
            corun::spawn(move || {
                let scheduler = Scheduler::try_current().unwrap();
                let me = scheduler.current_id().unwrap();

                results.borrow_mut().push(scheduler.resume(me).map_err(|e| e.code()));
                results.borrow_mut().push(scheduler.resume(outer).map_err(|e| e.code()));
            })
            .unwrap();
        })
        .unwrap();

    assert_eq!(*results.borrow(), [Err(-2), Err(-2)]);
    assert_eq!(scheduler.count(), 0);
}

#[test]
fn test_yield_from_host_is_invalid() {
    let scheduler = small_scheduler();

    assert!(matches!(scheduler.yield_now(), Err(Error::Invalid)));
    assert!(matches!(scheduler.yield_naked(), Err(Error::Invalid)));
    assert!(matches!(corun::yield_now(), Err(Error::Invalid)));
    assert!(matches!(scheduler.current_or_fail(), Err(Error::Invalid)));
    assert!(matches!(corun::spawn(|| {}), Err(Error::Invalid)));
    assert_eq!(corun::current_id(), None);
}

#[test]
fn test_yield_on_foreign_domain_is_invalid() {
    let outer = small_scheduler();
    let inner = small_scheduler();
    let result = Rc::new(RefCell::new(None));

    let outer_clone = outer.clone();
    let result_clone = result.clone();

    let waiting = inner
        .create(move || {
            corun::yield_now().unwrap();

            // Resumed from a coroutine of `outer`: that coroutine is current
            // there, but this code runs on our own stack.
            *result_clone.borrow_mut() = Some(outer_clone.yield_now().map_err(|e| e.code()));
        })
        .unwrap();

    let inner_clone = inner.clone();
    outer
        .create(move || {
            inner_clone.resume(waiting).unwrap();
            assert!(corun::current_id().is_some(), "Back in the outer coroutine");
        })
        .unwrap();

    assert_eq!(*result.borrow(), Some(Err(-2)));
    assert_eq!(inner.count(), 0);
    assert_eq!(outer.count(), 0);
}

#[test]
fn test_create_from_coroutine_restores_current() {
    let scheduler = small_scheduler();

    scheduler
        .create(|| {
            let me = corun::current_id();

            let child = corun::spawn(|| corun::yield_now().unwrap()).unwrap();
            assert_eq!(corun::current_id(), me);

            let scheduler = Scheduler::try_current().unwrap();
            assert_eq!(scheduler.get_by_id(child).unwrap().origin_id(), me);
            scheduler.resume(child).unwrap();
        })
        .unwrap();

    assert_eq!(scheduler.count(), 0);
    assert_eq!(scheduler.current_id(), None);
}

#[test]
fn test_panic_in_body_cleans_up_and_propagates() {
    let scheduler = small_scheduler();

    let id = scheduler
        .create(|| {
            corun::yield_now().unwrap();
            panic!("boom");
        })
        .unwrap();

    let result = panic::catch_unwind(AssertUnwindSafe(|| scheduler.resume(id)));

    let payload = result.expect_err("The panic should reach the resumer");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"boom"));
    assert!(scheduler.get_by_id(id).is_none());
    assert_eq!(scheduler.count(), 0);
    assert_eq!(scheduler.current_id(), None);
}

#[test]
fn test_nested_panic_propagates_through_every_resumer() {
    let scheduler = small_scheduler();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        scheduler.create(|| {
            corun::spawn(|| panic!("inner")).unwrap();
        })
    }));

    let payload = result.expect_err("The panic should reach host context");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"inner"));
    assert_eq!(scheduler.count(), 0, "Both coroutines should be closed");
    assert_eq!(scheduler.current_id(), None);
    assert_eq!(scheduler.peak(), 2);
}

#[test]
fn test_nested_panic_caught_by_resumer() {
    let scheduler = small_scheduler();

    let outer = scheduler
        .create(|| {
            let me = corun::current_id();

            let result = panic::catch_unwind(|| {
                corun::spawn(|| {
                    corun::yield_now().unwrap();
                    panic!("inner");
                })
            });
            let child = result.unwrap().unwrap();

            let scheduler = Scheduler::try_current().unwrap();
            let result = panic::catch_unwind(AssertUnwindSafe(|| scheduler.resume(child)));

            assert!(result.is_err());
            assert!(scheduler.get_by_id(child).is_none());
            assert_eq!(scheduler.current_id(), me, "Resumer should be current again");
            assert_eq!(scheduler.current().unwrap().state(), State::Running);
            drop(scheduler);

            corun::yield_now().unwrap();
        })
        .unwrap();

    assert_eq!(scheduler.count(), 1);
    assert_eq!(scheduler.get_by_id(outer).unwrap().state(), State::Waiting);

    scheduler.resume(outer).unwrap();
    assert_eq!(scheduler.count(), 0);
}

#[test]
fn test_drop_scheduler_unwinds_waiting_coroutines() {
    struct Guard(Rc<Cell<bool>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    let dropped = Rc::new(Cell::new(false));
    let dropped_clone = dropped.clone();

    let scheduler = small_scheduler();
    scheduler
        .create(move || {
            let _guard = Guard(dropped_clone);
            corun::yield_now().unwrap();
        })
        .unwrap();

    assert!(!dropped.get());
    drop(scheduler);
    assert!(dropped.get(), "Values on a waiting stack should be dropped");
}

#[test]
fn test_independent_domains_per_thread() {
    let handles: Vec<_> = (0..4)
        .map(|_| {
            std::thread::spawn(|| {
                let scheduler = small_scheduler();
                let ids: Vec<_> = (0..10)
                    .map(|_| scheduler.create(|| corun::yield_now().unwrap()).unwrap())
                    .collect();

                for id in &ids {
                    scheduler.resume(*id).unwrap();
                }

                (ids.last().unwrap().as_u64(), scheduler.peak())
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), (10, 10));
    }
}

#[test]
fn test_weak_handle_across_yield_does_not_keep_domain_alive() {
    struct Guard(Rc<Cell<bool>>);

    impl Drop for Guard {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    let dropped = Rc::new(Cell::new(false));
    let dropped_clone = dropped.clone();

    let scheduler = small_scheduler();
    let id = scheduler
        .create(move || {
            let _guard = Guard(dropped_clone);
            let weak = Scheduler::try_current().unwrap().downgrade();

            corun::yield_now().unwrap();

            let scheduler = weak.upgrade().expect("Domain is alive while resuming");
            assert!(scheduler.current_id().is_some());
            drop(scheduler);

            corun::yield_now().unwrap();
        })
        .unwrap();

    let weak = scheduler.downgrade();
    scheduler.resume(id).unwrap();
    assert!(!dropped.get());

    drop(scheduler);
    assert!(dropped.get(), "The waiting stack should be unwound");
    assert!(weak.upgrade().is_none());
}
