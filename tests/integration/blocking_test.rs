// Blocking acquire, queue promotion and wake-up tests

use std::time::Duration;

use crossbeam::channel;

use granlock::{LockError, LockType, Request, Resource, TransactionStatus};

#[path = "../common/mod.rs"]
mod common;
use common::{create_test_lock_manager, create_transactions, settle, wait_for_status};

const GRANT_TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn test_wake_on_release() {
    let lm = create_test_lock_manager();
    let txns = create_transactions(&[1, 2]);
    let db = Resource::database(0);

    lm.acquire(&txns[0], &db, LockType::X).unwrap();

    crossbeam::scope(|s| {
        let waiter = s.spawn(|_| lm.acquire(&txns[1], &db, LockType::S));

        wait_for_status(&txns[1], TransactionStatus::Waiting);
        assert!(!lm.holds(&txns[1], &db, LockType::S));
        assert_eq!(lm.waiting_requests(0), vec![Request::new(2, LockType::S)]);

        lm.release(&txns[0], &db).unwrap();

        // Granted by the release itself, before the waiter runs again
        assert!(lm.holds(&txns[1], &db, LockType::S));
        assert!(waiter.join().unwrap().is_ok());
    })
    .unwrap();

    assert_eq!(txns[1].status(), TransactionStatus::Running);
    assert!(lm.waiting_requests(0).is_empty());
}

#[test]
fn test_fifo_head_blocking() {
    let lm = create_test_lock_manager();
    let txns = create_transactions(&[1, 2, 3, 4]);
    let (t1, t2, t3, t4) = (&txns[0], &txns[1], &txns[2], &txns[3]);
    let db = Resource::database(0);
    let (tx, rx) = channel::unbounded();
    let (lm, db) = (&lm, &db);

    lm.acquire(t1, db, LockType::S).unwrap();
    lm.acquire(t4, db, LockType::IS).unwrap();

    crossbeam::scope(|s| {
        let tx2 = tx.clone();
        s.spawn(move |_| {
            lm.acquire(t2, db, LockType::X).unwrap();
            tx2.send(2).unwrap();
        });
        wait_for_status(t2, TransactionStatus::Waiting);

        let tx3 = tx.clone();
        s.spawn(move |_| {
            lm.acquire(t3, db, LockType::IX).unwrap();
            tx3.send(3).unwrap();
        });
        wait_for_status(t3, TransactionStatus::Waiting);
        assert_eq!(
            lm.waiting_requests(0),
            vec![Request::new(2, LockType::X), Request::new(3, LockType::IX)]
        );

        // IX now fits next to the remaining IS, but X is still blocked ahead of it
        lm.release(t1, db).unwrap();
        settle();
        assert!(t2.is_waiting());
        assert!(t3.is_waiting());
        assert!(!lm.holds(t3, db, LockType::IX));
        assert_eq!(lm.waiting_requests(0).len(), 2);

        lm.release(t4, db).unwrap();
        assert_eq!(rx.recv_timeout(GRANT_TIMEOUT).unwrap(), 2);
        assert!(lm.holds(t2, db, LockType::X));
        settle();
        assert!(t3.is_waiting());
        assert_eq!(lm.waiting_requests(0), vec![Request::new(3, LockType::IX)]);

        wait_for_status(t2, TransactionStatus::Running);
        lm.release(t2, db).unwrap();
        assert_eq!(rx.recv_timeout(GRANT_TIMEOUT).unwrap(), 3);
    })
    .unwrap();

    assert!(lm.holds(t3, db, LockType::IX));
    assert!(lm.check_invariants().is_ok());
}

#[test]
fn test_upgrade_jumps_queue() {
    let lm = create_test_lock_manager();
    let txns = create_transactions(&[1, 2, 3]);
    let (t, u, w) = (&txns[0], &txns[1], &txns[2]);
    let db = Resource::database(0);
    let (tx, rx) = channel::unbounded();
    let (lm, db) = (&lm, &db);

    lm.acquire(t, db, LockType::S).unwrap();
    lm.acquire(w, db, LockType::S).unwrap();

    crossbeam::scope(|s| {
        let tx_u = tx.clone();
        s.spawn(move |_| {
            lm.acquire(u, db, LockType::X).unwrap();
            tx_u.send(u.id()).unwrap();
        });
        wait_for_status(u, TransactionStatus::Waiting);

        let tx_t = tx.clone();
        s.spawn(move |_| {
            lm.acquire(t, db, LockType::X).unwrap();
            tx_t.send(t.id()).unwrap();
        });
        wait_for_status(t, TransactionStatus::Waiting);

        // T's upgrade sits ahead of U even though U arrived first
        assert_eq!(
            lm.waiting_requests(0),
            vec![Request::new(1, LockType::X), Request::new(2, LockType::X)]
        );
        // T keeps its S while the upgrade waits
        assert!(lm.holds(t, db, LockType::S));

        lm.release(w, db).unwrap();
        assert_eq!(rx.recv_timeout(GRANT_TIMEOUT).unwrap(), 1);
        assert_eq!(lm.owners(0), vec![Request::new(1, LockType::X)]);
        assert!(u.is_waiting());

        wait_for_status(t, TransactionStatus::Running);
        lm.release(t, db).unwrap();
        assert_eq!(rx.recv_timeout(GRANT_TIMEOUT).unwrap(), 2);
    })
    .unwrap();

    assert_eq!(lm.owners(0), vec![Request::new(2, LockType::X)]);
}

#[test]
fn test_promotion_grants_shared_batch() {
    let lm = create_test_lock_manager();
    let txns = create_transactions(&[1, 2, 3, 4, 5]);
    let db = Resource::database(0);
    let (lm, db) = (&lm, &db);

    lm.acquire(&txns[0], db, LockType::X).unwrap();

    crossbeam::scope(|s| {
        let mut handles = Vec::new();
        for (txn, lock_type) in txns[1..].iter().zip([LockType::S, LockType::S, LockType::IS, LockType::X]) {
            handles.push(s.spawn(move |_| lm.acquire(txn, db, lock_type)));
            wait_for_status(txn, TransactionStatus::Waiting);
        }

        lm.release(&txns[0], db).unwrap();
        for txn in &txns[1..4] {
            wait_for_status(txn, TransactionStatus::Running);
        }
        assert_eq!(lm.owners(0).len(), 3);
        assert_eq!(lm.waiting_requests(0), vec![Request::new(5, LockType::X)]);
        settle();
        assert!(txns[4].is_waiting());

        for txn in &txns[1..4] {
            lm.release(txn, db).unwrap();
        }
        for handle in handles {
            assert!(handle.join().unwrap().is_ok());
        }
    })
    .unwrap();

    assert_eq!(lm.owners(0), vec![Request::new(5, LockType::X)]);
}

#[test]
fn test_page_wait_under_intent_locks() {
    let lm = create_test_lock_manager();
    let txns = create_transactions(&[1, 2]);
    let (writer, reader) = (&txns[0], &txns[1]);
    let (table, pages) = Resource::table_with_pages(1, &[2]);
    let page = &pages[0];

    lm.acquire(writer, &table, LockType::IX).unwrap();
    lm.acquire(writer, page, LockType::X).unwrap();
    lm.acquire(reader, &table, LockType::IS).unwrap();

    crossbeam::scope(|s| {
        let handle = s.spawn(|_| lm.acquire(reader, page, LockType::S));
        wait_for_status(reader, TransactionStatus::Waiting);

        lm.release(writer, page).unwrap();
        assert!(handle.join().unwrap().is_ok());
    })
    .unwrap();

    lm.release(writer, &table).unwrap();
    assert!(lm.holds(reader, page, LockType::S));
    assert!(matches!(
        lm.release(reader, &table),
        Err(LockError::NonBottomUpRelease { .. })
    ));
}

#[test]
fn test_waiting_transaction_cannot_act() {
    let lm = create_test_lock_manager();
    let txns = create_transactions(&[1, 2]);
    let (a, b) = (Resource::database(0), Resource::database(1));

    lm.acquire(&txns[0], &a, LockType::X).unwrap();
    lm.acquire(&txns[1], &b, LockType::S).unwrap();

    crossbeam::scope(|s| {
        let handle = s.spawn(|_| lm.acquire(&txns[1], &a, LockType::S));
        wait_for_status(&txns[1], TransactionStatus::Waiting);

        assert_eq!(lm.acquire(&txns[1], &b, LockType::X), Err(LockError::BlockedTransaction(2)));
        assert_eq!(lm.release(&txns[1], &b), Err(LockError::BlockedTransaction(2)));
        assert!(lm.holds(&txns[1], &b, LockType::S));

        lm.release(&txns[0], &a).unwrap();
        assert!(handle.join().unwrap().is_ok());
    })
    .unwrap();

    lm.release(&txns[1], &b).unwrap();
    lm.release(&txns[1], &a).unwrap();
}

#[test]
fn test_fresh_request_checked_against_owners_only() {
    let lm = create_test_lock_manager();
    let txns = create_transactions(&[1, 2, 3]);
    let db = Resource::database(0);

    lm.acquire(&txns[0], &db, LockType::S).unwrap();

    crossbeam::scope(|s| {
        let handle = s.spawn(|_| lm.acquire(&txns[1], &db, LockType::X));
        wait_for_status(&txns[1], TransactionStatus::Waiting);

        // Compatible with the S owner, so granted despite the queued X
        lm.acquire(&txns[2], &db, LockType::S).unwrap();
        assert!(lm.holds(&txns[2], &db, LockType::S));

        lm.release(&txns[0], &db).unwrap();
        settle();
        assert!(txns[1].is_waiting());
        lm.release(&txns[2], &db).unwrap();
        assert!(handle.join().unwrap().is_ok());
    })
    .unwrap();

    assert!(lm.holds(&txns[1], &db, LockType::X));
}

#[test]
fn test_outside_wake_keeps_request_queued() {
    let lm = create_test_lock_manager();
    let txns = create_transactions(&[1, 2]);
    let db = Resource::database(0);
    let (tx, rx) = channel::unbounded();
    let (lm, db) = (&lm, &db);

    lm.acquire(&txns[0], db, LockType::X).unwrap();

    crossbeam::scope(|s| {
        let t2 = &txns[1];
        s.spawn(move |_| {
            tx.send(lm.acquire(t2, db, LockType::S)).unwrap();
        });
        wait_for_status(t2, TransactionStatus::Waiting);

        // A wake that is not a grant must not end the acquire
        t2.wake();
        wait_for_status(t2, TransactionStatus::Waiting);
        settle();
        assert!(rx.try_recv().is_err());
        assert!(t2.is_waiting());
        assert!(!lm.holds(t2, db, LockType::S));
        assert_eq!(lm.waiting_requests(0), vec![Request::new(2, LockType::S)]);

        // Still blocked, so no second request can join the queue
        assert_eq!(lm.acquire(t2, db, LockType::IS), Err(LockError::BlockedTransaction(2)));

        lm.release(&txns[0], db).unwrap();
        assert_eq!(rx.recv_timeout(GRANT_TIMEOUT).unwrap(), Ok(()));
    })
    .unwrap();

    assert_eq!(lm.owners(0), vec![Request::new(2, LockType::S)]);
    assert!(lm.waiting_requests(0).is_empty());
    lm.check_invariants().unwrap();
}
