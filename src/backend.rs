//! Policy backend trait
//!
//! A backend performs exactly one remote call per method and reports failures
//! as [`ProviderError`]s; retries, not-found translation and idempotency live
//! in [`crate::AggregateTransport`].

use crate::model::Policy;
use crate::{ProviderError, ProviderResult, TransportFailure};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

/// Whole-object access to the policy collection
#[async_trait]
pub trait PolicyBackend: Send + Sync + 'static {
    /// `GET /{collection}/{id}`
    async fn get(&self, id: &str) -> ProviderResult<Policy>;
    /// `POST /{collection}`
    async fn post(&self, policy: &Policy) -> ProviderResult<Policy>;
    /// `PUT /{collection}/{id}`
    async fn put(&self, id: &str, policy: &Policy) -> ProviderResult<Policy>;
    /// `DELETE /{collection}/{id}`
    async fn delete(&self, id: &str) -> ProviderResult<()>;
}

/// Backend call kinds, for fault injection and call counting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendCall {
    Get,
    Post,
    Put,
    Delete,
}

/// In-memory backend for testing.
///
/// Stores policies as raw JSON so fields the model does not know about behave
/// like they would on a real server. PUT enforces the one-category rule the
/// real backend applies.
pub struct InMemoryBackend {
    data: RwLock<HashMap<String, Value>>,
    counter: AtomicU64,
    calls: Mutex<HashMap<BackendCall, u64>>,
    faults: Mutex<VecDeque<(BackendCall, u16, Box<str>)>>,
    puts: Mutex<Vec<Value>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            counter: AtomicU64::new(1),
            calls: Mutex::new(HashMap::new()),
            faults: Mutex::new(VecDeque::new()),
            puts: Mutex::new(Vec::new()),
        }
    }

    /// Store a raw policy document; it must carry an `id`
    pub fn seed(&self, policy: Value) {
        let id = policy
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        if let Ok(mut data) = self.data.write() {
            data.insert(id, policy);
        }
    }

    /// Raw stored document
    pub fn document(&self, id: &str) -> Option<Value> {
        self.data.read().ok()?.get(id).cloned()
    }

    /// Remove a document behind the client's back
    pub fn remove(&self, id: &str) {
        if let Ok(mut data) = self.data.write() {
            data.remove(id);
        }
    }

    /// Fail the next call of `call` with an HTTP error
    pub fn fail_next(&self, call: BackendCall, status: u16, message: &str) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push_back((call, status, message.into()));
        }
    }

    pub fn call_count(&self, call: BackendCall) -> u64 {
        self.calls
            .lock()
            .ok()
            .and_then(|c| c.get(&call).copied())
            .unwrap_or(0)
    }

    /// Every PUT body received, in order
    pub fn put_bodies(&self) -> Vec<Value> {
        self.puts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn record(&self, call: BackendCall) -> ProviderResult<()> {
        let mut calls = self.calls.lock().map_err(storage_error)?;
        *calls.entry(call).or_insert(0) += 1;
        drop(calls);

        let mut faults = self.faults.lock().map_err(storage_error)?;
        if let Some(pos) = faults.iter().position(|(c, _, _)| *c == call) {
            if let Some((_, status, message)) = faults.remove(pos) {
                return Err(ProviderError::Api { status, message });
            }
        }
        Ok(())
    }

    fn not_found(id: &str) -> ProviderError {
        ProviderError::api(404, format!("Not Found: policy {id} not found"))
    }
}

fn storage_error<E: std::fmt::Display>(e: E) -> ProviderError {
    ProviderError::transport(TransportFailure::Other, e.to_string())
}

#[async_trait]
impl PolicyBackend for InMemoryBackend {
    async fn get(&self, id: &str) -> ProviderResult<Policy> {
        self.record(BackendCall::Get)?;
        let data = self.data.read().map_err(storage_error)?;
        let raw = data.get(id).cloned().ok_or_else(|| Self::not_found(id))?;
        Ok(serde_json::from_value(raw)?)
    }

    async fn post(&self, policy: &Policy) -> ProviderResult<Policy> {
        self.record(BackendCall::Post)?;
        let mut data = self.data.write().map_err(storage_error)?;
        if data
            .values()
            .any(|p| p.get("name").and_then(Value::as_str) == Some(policy.name.as_str()))
        {
            return Err(ProviderError::api(
                409,
                format!("Conflict: policy named {} already exists", policy.name),
            ));
        }

        let mut created = policy.clone();
        created.id = loop {
            let id = format!("pol-{}", self.counter.fetch_add(1, Ordering::Relaxed));
            if !data.contains_key(&id) {
                break id;
            }
        };
        data.insert(created.id.clone(), serde_json::to_value(&created)?);
        Ok(created)
    }

    async fn put(&self, id: &str, policy: &Policy) -> ProviderResult<Policy> {
        self.record(BackendCall::Put)?;
        let raw = serde_json::to_value(policy)?;
        self.puts.lock().map_err(storage_error)?.push(raw.clone());

        if policy.targets.len() > 1 {
            return Err(ProviderError::api(
                400,
                "Bad Request: only one target category may be present per write",
            ));
        }

        let mut data = self.data.write().map_err(storage_error)?;
        let Some(stored) = data.get_mut(id) else {
            return Err(Self::not_found(id));
        };

        // categories left out of the payload are kept as stored
        let mut merged = raw;
        if let (Some(old), Some(Value::Object(new))) =
            (stored.get("targets").and_then(Value::as_object), merged.get_mut("targets"))
        {
            for (category, group) in old {
                new.entry(category.clone()).or_insert_with(|| group.clone());
            }
        }
        *stored = merged.clone();
        Ok(serde_json::from_value(merged)?)
    }

    async fn delete(&self, id: &str) -> ProviderResult<()> {
        self.record(BackendCall::Delete)?;
        let mut data = self.data.write().map_err(storage_error)?;
        match data.remove(id) {
            Some(_) => Ok(()),
            None => Err(Self::not_found(id)),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}
