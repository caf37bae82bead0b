//! Transaction worker: owns a batch of transactions and runs them in order
//! on one dedicated thread. Workers run concurrently with each other.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::transactions::Transaction;

pub struct TransactionWorker {
    /// Transactions to execute; drained into the worker thread by `run`.
    transactions: Vec<Transaction>,

    /// Per-transaction outcome, in execution order.
    stats: Arc<Mutex<Vec<bool>>>,

    /// Number of transactions that committed.
    result: Arc<Mutex<usize>>,

    /// Thread handle for join.
    handle: Option<JoinHandle<()>>,
}

impl TransactionWorker {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        TransactionWorker {
            transactions,
            stats: Arc::new(Mutex::new(Vec::new())),
            result: Arc::new(Mutex::new(0)),
            handle: None,
        }
    }

    pub fn add_transaction(&mut self, transaction: Transaction) {
        self.transactions.push(transaction);
    }

    /// Launch the worker thread. Within the worker its transactions run
    /// sequentially; each reports `true` for commit and `false` for abort.
    pub fn run(&mut self) {
        let transactions = std::mem::take(&mut self.transactions);
        let stats = self.stats.clone();
        let result = self.result.clone();

        self.handle = Some(thread::spawn(move || {
            let mut committed = 0;
            for transaction in &transactions {
                let ok = transaction.run();
                stats.lock().unwrap().push(ok);
                if ok {
                    committed += 1;
                }
            }
            *result.lock().unwrap() = committed;
        }));
    }

    /// Wait for the worker to finish.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn stats(&self) -> Vec<bool> {
        self.stats.lock().unwrap().clone()
    }

    /// Number of committed transactions, valid after `join`.
    pub fn result(&self) -> usize {
        *self.result.lock().unwrap()
    }
}

impl Default for TransactionWorker {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
