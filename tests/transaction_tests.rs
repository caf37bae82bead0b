use std::sync::Once;

use lstore::{Database, Transaction, TransactionWorker};

static INIT: Once = Once::new();

fn open_scratch_database() -> (tempfile::TempDir, Database) {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });

    let dir = tempfile::tempdir().unwrap();
    let mut db = Database::new();
    db.open(dir.path().join("db").to_str().unwrap()).unwrap();
    (dir, db)
}

#[test]
fn concurrent_disjoint_inserts_all_commit() {
    let (_dir, mut db) = open_scratch_database();
    let table = db.create_table("grades", 3, 0).unwrap();

    // Two workers, each inserting 1000 rows with disjoint keys, batched
    // into transactions of 100 inserts.
    let mut workers = Vec::new();
    for worker_index in 0..2i64 {
        let mut transactions = Vec::new();
        for batch in 0..10i64 {
            let mut transaction = Transaction::new();
            for row in 0..100i64 {
                let key = worker_index * 1000 + batch * 100 + row;
                transaction.add_insert(&table, vec![key, key * 2, key * 3]);
            }
            transactions.push(transaction);
        }
        workers.push(TransactionWorker::new(transactions));
    }

    for worker in workers.iter_mut() {
        worker.run();
    }
    for worker in workers.iter_mut() {
        worker.join();
    }

    for worker in &workers {
        assert_eq!(worker.result(), 10);
        assert!(worker.stats().iter().all(|committed| *committed));
    }

    assert_eq!(table.num_records(), 2000);
    for key in 0..2000i64 {
        let records = table.select_record(key, 0, None, 0).unwrap();
        assert_eq!(records.len(), 1, "key {} must appear exactly once", key);
        assert_eq!(records[0].columns, vec![key, key * 2, key * 3]);
    }

    db.close().unwrap();
}

#[test]
fn duplicate_key_aborts_the_transaction() {
    let (_dir, mut db) = open_scratch_database();
    let table = db.create_table("t", 2, 0).unwrap();

    assert!(table.insert_record(&[7, 70]));

    let mut transaction = Transaction::new();
    transaction.add_insert(&table, vec![7, 71]);
    assert!(!transaction.run());

    let mut worker = TransactionWorker::new(Vec::new());
    let mut second = Transaction::new();
    second.add_insert(&table, vec![7, 72]);
    worker.add_transaction(second);
    worker.run();
    worker.join();

    assert_eq!(worker.result(), 0);
    assert_eq!(worker.stats(), vec![false]);

    // The original record survives untouched.
    let records = table.select_record(7, 0, None, 0).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].columns, vec![7, 70]);
    assert_eq!(table.num_records(), 1);

    db.close().unwrap();
}

#[test]
fn concurrent_updates_of_different_keys_both_land() {
    let (_dir, mut db) = open_scratch_database();
    let table = db.create_table("t", 3, 0).unwrap();

    assert!(table.insert_record(&[1, 0, 0]));
    assert!(table.insert_record(&[2, 0, 0]));

    let mut workers = Vec::new();
    for key in [1i64, 2i64] {
        let mut transaction = Transaction::new();
        for step in 1..=50i64 {
            transaction.add_update(&table, key, vec![None, Some(step), Some(key * 1000 + step)]);
        }
        workers.push(TransactionWorker::new(vec![transaction]));
    }

    for worker in workers.iter_mut() {
        worker.run();
    }
    for worker in workers.iter_mut() {
        worker.join();
    }
    for worker in &workers {
        assert_eq!(worker.result(), 1);
    }

    // Each key ends at its own last write regardless of interleaving.
    for key in [1i64, 2i64] {
        let records = table.select_record(key, 0, None, 0).unwrap();
        assert_eq!(records[0].columns, vec![key, 50, key * 1000 + 50]);
    }

    db.close().unwrap();
}

#[test]
fn read_queries_ride_along_in_transactions() {
    let (_dir, mut db) = open_scratch_database();
    let table = db.create_table("t", 2, 0).unwrap();

    let mut transaction = Transaction::new();
    for key in 1..=10i64 {
        transaction.add_insert(&table, vec![key, key * key]);
    }
    transaction.add_select(&table, 3, 0, None);
    transaction.add_sum(&table, 1, 10, 1);
    transaction.add_select_version(&table, 3, 0, None, -1);
    transaction.add_sum_version(&table, 1, 10, 1, 0);
    transaction.add_delete(&table, 10);
    assert!(transaction.run());

    assert!(table.select_record(10, 0, None, 0).unwrap().is_empty());

    db.close().unwrap();
}
