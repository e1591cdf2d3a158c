//! Test fixtures: an in-memory store and a backend wrapper that counts calls
//! and can be told to fail, stall or race a write in behind a read.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use noteify_shared::types::{AuthUser, Session, SignUpMetadata, UserId};
use noteify_shared::{Backend, BackendError, Filter, Query, Subscription, Table};
use noteify_store::LocalBackend;

pub fn store() -> LocalBackend {
    LocalBackend::open_in_memory().unwrap()
}

/// Register `username` on a fresh handle of `server` and return the id.
pub async fn sign_up(server: &LocalBackend, username: &str) -> UserId {
    server
        .client()
        .sign_up(
            &format!("{username}@example.com"),
            "secret1",
            SignUpMetadata {
                username: username.into(),
                display_name: username.to_uppercase(),
            },
        )
        .await
        .unwrap()
        .user
        .id
}

#[derive(Default)]
struct Counters {
    selects: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
    fail_selects: AtomicBool,
    fail_writes: AtomicBool,
    write_delay_ms: AtomicU64,
    /// Row inserted once, right after the next select on its table returns.
    after_select: Mutex<Option<(Table, Value)>>,
}

#[derive(Clone, Default)]
pub struct Calls(Arc<Counters>);

impl Calls {
    pub fn selects(&self) -> usize {
        self.0.selects.load(Ordering::SeqCst)
    }

    pub fn inserts(&self) -> usize {
        self.0.inserts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.0.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.0.deletes.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.selects() + self.inserts() + self.updates() + self.deletes()
    }

    pub fn fail_selects(&self, fail: bool) {
        self.0.fail_selects.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.0.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Hold every later write for `delay` before it reports its outcome.
    pub fn delay_writes(&self, delay: Duration) {
        self.0
            .write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Insert `row` into `table` as soon as the next select on `table` has
    /// produced its result.
    pub fn insert_after_select(&self, table: Table, row: Value) {
        *self.0.after_select.lock().unwrap() = Some((table, row));
    }

    fn take_after_select(&self, table: Table) -> Option<Value> {
        let mut slot = self.0.after_select.lock().unwrap();
        match slot.as_ref() {
            Some((t, _)) if *t == table => slot.take().map(|(_, row)| row),
            _ => None,
        }
    }

    async fn stall(&self) {
        let ms = self.0.write_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn check(&self, counter: &AtomicUsize, fail: &AtomicBool) -> Result<(), BackendError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if fail.load(Ordering::SeqCst) {
            Err(BackendError::Transport("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

pub struct CountingBackend<B> {
    inner: B,
    calls: Calls,
}

pub fn counting<B: Backend>(inner: B) -> (Arc<CountingBackend<B>>, Calls) {
    let calls = Calls::default();
    (
        Arc::new(CountingBackend {
            inner,
            calls: calls.clone(),
        }),
        calls,
    )
}

impl<B: Backend> Backend for CountingBackend<B> {
    async fn select(&self, table: Table, query: Query) -> Result<Vec<Value>, BackendError> {
        let c = &self.calls.0;
        self.calls.check(&c.selects, &c.fail_selects)?;
        let rows = self.inner.select(table, query).await?;
        if let Some(row) = self.calls.take_after_select(table) {
            self.inner.insert(table, row).await?;
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, row: Value) -> Result<Value, BackendError> {
        let c = &self.calls.0;
        let outcome = self.calls.check(&c.inserts, &c.fail_writes);
        self.calls.stall().await;
        outcome?;
        self.inner.insert(table, row).await
    }

    async fn update(
        &self,
        table: Table,
        filters: Vec<Filter>,
        patch: Value,
    ) -> Result<Vec<Value>, BackendError> {
        let c = &self.calls.0;
        let outcome = self.calls.check(&c.updates, &c.fail_writes);
        self.calls.stall().await;
        outcome?;
        self.inner.update(table, filters, patch).await
    }

    async fn delete(&self, table: Table, filters: Vec<Filter>) -> Result<u64, BackendError> {
        let c = &self.calls.0;
        self.calls.check(&c.deletes, &c.fail_writes)?;
        self.inner.delete(table, filters).await
    }

    async fn subscribe(
        &self,
        table: Table,
        filter: Option<Filter>,
    ) -> Result<Subscription, BackendError> {
        self.inner.subscribe(table, filter).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> Result<Session, BackendError> {
        self.inner.sign_up(email, password, metadata).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.inner.sign_in(email, password).await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.inner.sign_out().await
    }

    async fn get_user(&self) -> Result<Option<AuthUser>, BackendError> {
        self.inner.get_user().await
    }

    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        self.inner.get_session().await
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let c = &self.calls.0;
        self.calls.check(&c.inserts, &c.fail_writes)?;
        self.inner.upload(bucket, path, data, content_type).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.inner.public_url(bucket, path)
    }
}
