//! Per-operation deadline for object store calls
//!
//! A store that never answers would otherwise block a publish or an
//! inference request forever. Every production store is wrapped in
//! `TimeoutObjectStore`; an expired deadline becomes `ErrorKind::TimedOut`.

use crate::storage::object_store::{ListResult, ObjectMeta, ObjectStore, StoreFuture};
use std::future::Future;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::path::Path;
use std::time::Duration;

/// Wraps a store and bounds every call by `timeout`
#[derive(Debug, Clone)]
pub struct TimeoutObjectStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: ObjectStore> TimeoutObjectStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        debug_assert!(!timeout.is_zero(), "store timeout must be non-zero");
        TimeoutObjectStore { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn bounded<'a, T, F>(&'a self, op: &'static str, key: &'a str, fut: F) -> StoreFuture<'a, T>
    where
        T: Send + 'a,
        F: Future<Output = IoResult<T>> + Send + 'a,
    {
        let timeout = self.timeout;
        Box::pin(async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(op, key, timeout_ms = timeout.as_millis() as u64, "object store call timed out");
                    Err(IoError::new(
                        ErrorKind::TimedOut,
                        format!("{} {} timed out after {:?}", op, key, timeout),
                    ))
                }
            }
        })
    }
}

impl<S: ObjectStore> ObjectStore for TimeoutObjectStore<S> {
    fn put<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        self.bounded("put", key, self.inner.put(key, data))
    }

    fn put_if_absent<'a>(&'a self, key: &'a str, data: &'a [u8]) -> StoreFuture<'a, ()> {
        self.bounded("put_if_absent", key, self.inner.put_if_absent(key, data))
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Vec<u8>> {
        self.bounded("get", key, self.inner.get(key))
    }

    fn exists<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        self.bounded("exists", key, self.inner.exists(key))
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        self.bounded("delete", key, self.inner.delete(key))
    }

    fn list<'a>(
        &'a self,
        prefix: &'a str,
        continuation_token: Option<&'a str>,
    ) -> StoreFuture<'a, ListResult> {
        self.bounded("list", prefix, self.inner.list(prefix, continuation_token))
    }

    fn head<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMeta> {
        self.bounded("head", key, self.inner.head(key))
    }

    fn download<'a>(&'a self, key: &'a str, dest: &'a Path) -> StoreFuture<'a, u64> {
        self.bounded("download", key, self.inner.download(key, dest))
    }
}
