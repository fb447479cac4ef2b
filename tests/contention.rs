use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Barrier,
    },
    thread,
    time::Duration,
};

use rayon::iter::{IntoParallelIterator, ParallelIterator};

use build_locks::{
    coordination::ResourceLockCoordinationService,
    identity_path::IdentityPath,
    registry::ResourceLockRegistryTraits,
    resource_lock::{
        same_lock_instance, ExclusiveAccessResourceLock, ResourceLock, ResourceLockError,
        ResourceLockTraits,
    },
    session::BuildSessionLocks,
};

fn path(path: &str) -> IdentityPath {
    IdentityPath::new(path).unwrap()
}

#[test]
fn task_execution_lock_singleton_under_race() {
    let session = BuildSessionLocks::new(false);
    let build = path("/:buildA");
    let locks: Vec<ResourceLock> = (0..64)
        .into_par_iter()
        .map(|i| {
            let project = path(&format!("/:buildA:module{i}"));
            session.task_execution_lock(&build, &project)
        })
        .collect();
    assert!(locks.iter().all(|lock| same_lock_instance(lock, &locks[0])));
}

#[test]
#[cfg_attr(miri, ignore)]
fn mutual_exclusion_under_contention() {
    let session = BuildSessionLocks::new(true);
    let build = path(":");
    let project = path(":app");
    let holders = AtomicUsize::new(0);
    let overlapped = AtomicBool::new(false);
    let acquisitions = AtomicUsize::new(0);

    (0..16).into_par_iter().for_each(|_| {
        let lock = session.task_execution_lock(&build, &project);
        for _ in 0..20 {
            lock.lock();
            if holders.fetch_add(1, Ordering::SeqCst) > 0 {
                overlapped.store(true, Ordering::SeqCst);
            }
            acquisitions.fetch_add(1, Ordering::SeqCst);
            thread::yield_now();
            holders.fetch_sub(1, Ordering::SeqCst);
            lock.unlock().unwrap();
        }
    });

    assert!(!overlapped.load(Ordering::SeqCst));
    assert_eq!(acquisitions.load(Ordering::SeqCst), 16 * 20);
    assert!(!session.project_locks().has_open_locks());
}

#[test]
#[cfg_attr(miri, ignore)]
fn one_winner_then_every_waiter_acquires() {
    const THREADS: usize = 8;
    let service = ResourceLockCoordinationService::new();
    let lock = ExclusiveAccessResourceLock::new("state of build :", &service);
    let barrier = Barrier::new(THREADS);
    let immediate = AtomicUsize::new(0);
    let acquired = AtomicUsize::new(0);

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                if lock.try_lock() {
                    immediate.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(100));
                } else {
                    lock.lock();
                }
                acquired.fetch_add(1, Ordering::SeqCst);
                lock.unlock().unwrap();
            });
        }
    });

    assert_eq!(immediate.load(Ordering::SeqCst), 1);
    assert_eq!(acquired.load(Ordering::SeqCst), THREADS);
    assert!(!lock.is_locked());
}

#[test]
#[cfg_attr(miri, ignore)]
fn serial_projects_share_one_execution_slot() {
    let session = BuildSessionLocks::new(false);
    let build = path("/:buildA");
    let other_build = path("/:buildB");
    let running = AtomicUsize::new(0);
    let overlapped = AtomicBool::new(false);

    (0..8).into_par_iter().for_each(|i| {
        let lock = session.task_execution_lock(&build, &path(&format!("/:buildA:module{i}")));
        lock.lock();
        if running.fetch_add(1, Ordering::SeqCst) > 0 {
            overlapped.store(true, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(2));
        running.fetch_sub(1, Ordering::SeqCst);
        lock.unlock().unwrap();
    });
    assert!(!overlapped.load(Ordering::SeqCst));

    // Another build has its own slot
    let a = session.task_execution_lock(&build, &path("/:buildA:moduleX"));
    let b = session.task_execution_lock(&other_build, &path("/:buildB:moduleX"));
    assert!(a.try_lock());
    thread::scope(|s| {
        s.spawn(|| {
            assert!(b.try_lock());
            b.unlock().unwrap();
        });
    });
    a.unlock().unwrap();
}

#[test]
fn atomic_multi_acquire_all_or_nothing() {
    let session = BuildSessionLocks::new(true);
    let build = path(":");
    let app = session.resource_lock(&build, &path(":app"));
    let lib = session.resource_lock(&build, &path(":lib"));
    let both = [app.clone(), lib.clone()];
    let service = session.coordination_service();

    thread::scope(|s| {
        let (held_tx, held_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        s.spawn(move || {
            lib.lock();
            held_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            lib.unlock().unwrap();
        });
        held_rx.recv().unwrap();

        assert!(!service.try_lock_all(&both).unwrap());
        assert!(!app.is_locked());
        release_tx.send(()).unwrap();
    });

    service.lock_all(&both).unwrap();
    assert!(app.is_locked_by_current_thread());
    assert!(both[1].is_locked_by_current_thread());
    service.unlock_all(&both).unwrap();
    assert!(!session.project_locks().has_open_locks());
}

#[test]
#[cfg_attr(miri, ignore)]
fn blocked_multi_acquire_never_holds_one() {
    let service = ResourceLockCoordinationService::new();
    let a: ResourceLock = Arc::new(ExclusiveAccessResourceLock::new("a", &service));
    let b: ResourceLock = Arc::new(ExclusiveAccessResourceLock::new("b", &service));
    let both = [a.clone(), b.clone()];

    b.lock();
    thread::scope(|s| {
        let waiter = s.spawn(|| {
            service.lock_all(&both).unwrap();
            service.unlock_all(&both).unwrap();
        });
        // While the waiter is blocked on b, a remains free
        for _ in 0..10 {
            thread::sleep(Duration::from_millis(2));
            assert!(a.try_lock());
            a.unlock().unwrap();
        }
        b.unlock().unwrap();
        waiter.join().unwrap();
    });
    assert!(!a.is_locked());
    assert!(!b.is_locked());
}

#[test]
fn unlock_all_is_atomic() {
    let service = ResourceLockCoordinationService::new();
    let a: ResourceLock = Arc::new(ExclusiveAccessResourceLock::new("a", &service));
    let b: ResourceLock = Arc::new(ExclusiveAccessResourceLock::new("b", &service));
    a.lock();
    assert_eq!(
        service.unlock_all(&[a.clone(), b.clone()]),
        Err(ResourceLockError::NotLocked("b".to_string()))
    );
    assert!(a.is_locked_by_current_thread());
    a.unlock().unwrap();
}

#[test]
fn unlock_by_non_owner_leaves_state_unchanged() {
    let session = BuildSessionLocks::new(false);
    let lock = session.task_execution_lock(&path(":"), &path(":app"));
    lock.lock();
    thread::scope(|s| {
        s.spawn(|| {
            assert_eq!(
                lock.unlock(),
                Err(ResourceLockError::NotOwner("state of build :".to_string()))
            );
        });
    });
    assert!(lock.is_locked_by_current_thread());
    lock.unlock().unwrap();
    assert!(lock.unlock().is_err());
}

#[test]
#[cfg_attr(miri, ignore)]
fn cancelled_lock_acquires_nothing() {
    let session = BuildSessionLocks::new(true);
    let build = path(":");
    let app = session.resource_lock(&build, &path(":app"));
    let lib = session.resource_lock(&build, &path(":lib"));
    let service = session.coordination_service();
    let token = service.new_cancellation_token();

    app.lock();
    thread::scope(|s| {
        let waiter = s.spawn(|| {
            let single = app.lock_interruptibly(&token);
            let multi = service.lock_all_interruptibly(&[lib.clone(), app.clone()], &token);
            (single, multi, lib.is_locked())
        });
        thread::sleep(Duration::from_millis(10));
        token.cancel();
        let (single, multi, lib_locked) = waiter.join().unwrap();
        assert_eq!(single, Err(ResourceLockError::Cancelled));
        assert_eq!(multi, Err(ResourceLockError::Cancelled));
        assert!(!lib_locked);
    });
    assert!(app.is_locked_by_current_thread());
    app.unlock().unwrap();

    // A fresh token does not affect uncontended acquisition
    let token = service.new_cancellation_token();
    assert!(app.lock_interruptibly(&token).is_ok());
    app.unlock().unwrap();
}

#[test]
fn sessions_do_not_accept_each_others_locks() {
    let first = BuildSessionLocks::new(true);
    let second = BuildSessionLocks::new(true);
    let build = path(":");
    let a = first.resource_lock(&build, &path(":app"));
    let b = second.resource_lock(&build, &path(":app"));
    assert_ne!(a.id(), b.id());

    assert_eq!(
        second.coordination_service().lock_all(&[a.clone()]),
        Err(ResourceLockError::ForeignLock(
            "state of project :app of build :".to_string()
        ))
    );
    assert!(!a.is_locked());
    assert!(!b.is_locked());
    thread::scope(|s| {
        s.spawn(|| {
            assert!(b.try_lock());
            b.unlock().unwrap();
        });
    });

    let token = first.coordination_service().new_cancellation_token();
    assert_eq!(
        b.lock_interruptibly(&token),
        Err(ResourceLockError::ForeignCancellationToken)
    );
    assert!(!b.is_locked());
}
