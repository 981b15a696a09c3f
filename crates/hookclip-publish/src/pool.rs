//! Upload account rotation.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// One linked upload account.
#[derive(Debug)]
pub struct Account {
    /// 1-based position in the pool
    pub id: u32,
    refresh_token: String,
    uploads: AtomicU64,
}

impl Account {
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    pub fn record_upload(&self) {
        self.uploads.fetch_add(1, Ordering::Relaxed);
    }
}

/// Per-account counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountStats {
    pub account_id: u32,
    pub upload_count: u64,
}

/// Fixed pool of accounts handed out round-robin.
#[derive(Debug, Default)]
pub struct AccountPool {
    accounts: Vec<Account>,
    next: AtomicUsize,
}

impl AccountPool {
    pub fn new(refresh_tokens: Vec<String>) -> Self {
        let accounts = refresh_tokens
            .into_iter()
            .enumerate()
            .map(|(i, refresh_token)| Account {
                id: i as u32 + 1,
                refresh_token,
                uploads: AtomicU64::new(0),
            })
            .collect();
        Self {
            accounts,
            next: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Every account once, starting at the next position in rotation.
    ///
    /// The shared pointer moves by one per call, so concurrent callers each
    /// walk the whole pool from their own starting point.
    pub fn rotation(&self) -> impl Iterator<Item = &Account> + '_ {
        let len = self.accounts.len();
        let start = if len == 0 {
            0
        } else {
            self.next.fetch_add(1, Ordering::Relaxed) % len
        };
        (0..len).filter_map(move |k| self.accounts.get((start + k) % len))
    }

    pub fn stats(&self) -> Vec<AccountStats> {
        self.accounts
            .iter()
            .map(|a| AccountStats {
                account_id: a.id,
                upload_count: a.upload_count(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_robin() {
        let pool = AccountPool::new(vec!["a".into(), "b".into(), "c".into()]);
        let starts: Vec<u32> = (0..5).map(|_| pool.rotation().next().unwrap().id).collect();
        assert_eq!(starts, vec![1, 2, 3, 1, 2]);
    }

    #[test]
    fn test_rotation_visits_every_account_once() {
        let pool = AccountPool::new(vec!["a".into(), "b".into(), "c".into()]);
        let first = pool.rotation();
        let second = pool.rotation();
        let first: Vec<u32> = first.map(|a| a.id).collect();
        let second: Vec<u32> = second.map(|a| a.id).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, vec![2, 3, 1]);
    }

    #[test]
    fn test_empty_pool() {
        let pool = AccountPool::new(Vec::new());
        assert!(pool.is_empty());
        assert_eq!(pool.rotation().count(), 0);
        assert!(pool.stats().is_empty());
    }

    #[test]
    fn test_stats_serialize() {
        let pool = AccountPool::new(vec!["a".into()]);
        pool.rotation().next().unwrap().record_upload();
        let json = serde_json::to_value(pool.stats()).unwrap();
        assert_eq!(json, serde_json::json!([{ "account_id": 1, "upload_count": 1 }]));
    }
}
