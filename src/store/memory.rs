use crate::store::{Object, ObjectKey, Store, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Create,
    Replace,
    ReplaceStatus,
}

impl Verb {
    pub fn is_write(&self) -> bool {
        !matches!(self, Verb::Get)
    }
}

/// One request received by an [`InMemoryStore`], recorded before it is
/// served (so failed requests show up too).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub verb: Verb,
    pub kind: String,
    pub key: ObjectKey,
}

struct Fault {
    verb: Verb,
    kind: String,
    error: StoreError,
}

#[derive(Default)]
struct State {
    resources: BTreeMap<(String, ObjectKey), Value>,
    uid_counter: u64,
    resource_version_counter: u64,
    faults: VecDeque<Fault>,
    calls: Vec<Call>,
}

impl State {
    fn next_resource_version(&mut self) -> String {
        self.resource_version_counter += 1;
        self.resource_version_counter.to_string()
    }

    fn next_uid(&mut self) -> String {
        self.uid_counter += 1;
        format!("uid-{}", self.uid_counter)
    }

    fn record(&mut self, verb: Verb, kind: &str, key: &ObjectKey) -> Result<(), StoreError> {
        self.calls.push(Call {
            verb,
            kind: kind.to_string(),
            key: key.clone(),
        });
        let pos = self
            .faults
            .iter()
            .position(|fault| fault.verb == verb && fault.kind == kind);
        match pos.and_then(|pos| self.faults.remove(pos)) {
            Some(fault) => Err(fault.error),
            None => Ok(()),
        }
    }

    // Stamps identity fields the way the API server does on creation.
    fn admit(&mut self, mut value: Value, namespace: &str) -> Value {
        if let Some(object) = value.as_object_mut() {
            object.remove("status");
        }
        let uid = self.next_uid();
        let resource_version = self.next_resource_version();
        if let Some(meta) = metadata_mut(&mut value) {
            meta.insert("namespace".to_string(), Value::String(namespace.to_string()));
            meta.entry("uid").or_insert(Value::String(uid));
            meta.insert("resourceVersion".to_string(), Value::String(resource_version));
        }
        value
    }

    // Shared by replace and replace_status: version check, then store `updated`
    // unless it equals what is already there.
    fn commit(
        &mut self,
        slot: (String, ObjectKey),
        requested_version: Option<String>,
        mut updated: Value,
    ) -> Result<Value, StoreError> {
        let old = self.resources.get(&slot).ok_or(StoreError::NotFound)?;
        let stored_version = resource_version(old);
        if requested_version.is_some() && requested_version.as_deref() != stored_version {
            return Err(StoreError::Conflict);
        }
        set_field(&mut updated, "resourceVersion", stored_version.map(str::to_string));
        set_field(&mut updated, "uid", field(old, "uid").map(str::to_string));
        if &updated == old {
            return Ok(updated);
        }
        let resource_version = self.next_resource_version();
        set_field(&mut updated, "resourceVersion", Some(resource_version));
        self.resources.insert(slot, updated.clone());
        Ok(updated)
    }
}

/// An API server stand-in that keeps objects in memory.
///
/// It follows the semantics the reconciler relies on: creates assign a UID and
/// resource version and ignore any status, replaces are rejected with
/// [`StoreError::Conflict`] when they carry a stale resource version, spec
/// updates leave the status alone and status updates leave everything else
/// alone, and a write that changes nothing does not bump the version.
///
/// Faults queued with [`InMemoryStore::fail_next`] are returned once by the
/// next matching request. Every request is recorded and can be inspected
/// with [`InMemoryStore::calls`].
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> InMemoryStore {
        InMemoryStore::default()
    }

    /// Makes the next `verb` request against kind `K` fail with `error`.
    pub async fn fail_next<K: Object>(&self, verb: Verb, error: StoreError) {
        self.state.lock().await.faults.push_back(Fault {
            verb,
            kind: kind_of::<K>(),
            error,
        });
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.state.lock().await.calls.clone()
    }

    pub async fn writes(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| call.verb.is_write())
            .count()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Stores `obj` as some other actor would, keeping its status. Returns the
    /// stored object with its assigned UID and resource version.
    pub async fn seed<K: Object>(&self, obj: K) -> Result<K, StoreError> {
        let key = ObjectKey::of(&obj).map_err(StoreError::missing_key)?;
        let value = encode(&obj)?;
        let status = value.get("status").cloned();
        let mut state = self.state.lock().await;
        let mut admitted = state.admit(value, &key.namespace);
        if let (Some(status), Some(object)) = (status, admitted.as_object_mut()) {
            object.insert("status".to_string(), status);
        }
        state
            .resources
            .insert((kind_of::<K>(), key), admitted.clone());
        decode(&admitted)
    }

    /// Reads an object without recording a call.
    pub async fn object<K: Object>(&self, key: &ObjectKey) -> Option<K> {
        let state = self.state.lock().await;
        state
            .resources
            .get(&(kind_of::<K>(), key.clone()))
            .and_then(|value| decode(value).ok())
    }

    /// Mutates a stored object (spec and status alike) as some other actor
    /// would, bumping its resource version.
    pub async fn modify<K: Object>(
        &self,
        key: &ObjectKey,
        mutate: impl FnOnce(&mut K),
    ) -> Result<K, StoreError> {
        let mut state = self.state.lock().await;
        let slot = (kind_of::<K>(), key.clone());
        let mut obj: K = decode(state.resources.get(&slot).ok_or(StoreError::NotFound)?)?;
        mutate(&mut obj);
        let mut value = encode(&obj)?;
        let resource_version = state.next_resource_version();
        set_field(&mut value, "resourceVersion", Some(resource_version));
        state.resources.insert(slot, value.clone());
        decode(&value)
    }

    /// Deletes a stored object as some other actor would.
    pub async fn remove<K: Object>(&self, key: &ObjectKey) -> Option<K> {
        let mut state = self.state.lock().await;
        state
            .resources
            .remove(&(kind_of::<K>(), key.clone()))
            .and_then(|value| decode(&value).ok())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get<K: Object>(&self, key: &ObjectKey) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let mut state = self.state.lock().await;
        state.record(Verb::Get, &kind, key)?;
        match state.resources.get(&(kind, key.clone())) {
            Some(value) => decode(value),
            None => Err(StoreError::NotFound),
        }
    }

    async fn create<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let key = ObjectKey::of(obj).map_err(StoreError::missing_key)?;
        let mut state = self.state.lock().await;
        state.record(Verb::Create, &kind, &key)?;
        let slot = (kind, key);
        if state.resources.contains_key(&slot) {
            return Err(StoreError::AlreadyExists);
        }
        let admitted = state.admit(encode(obj)?, &slot.1.namespace);
        state.resources.insert(slot, admitted.clone());
        decode(&admitted)
    }

    async fn replace<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let key = ObjectKey::of(obj).map_err(StoreError::missing_key)?;
        let mut state = self.state.lock().await;
        state.record(Verb::Replace, &kind, &key)?;
        let slot = (kind, key);
        let mut updated = encode(obj)?;
        let old_status = state
            .resources
            .get(&slot)
            .and_then(|old| old.get("status"))
            .cloned();
        if let Some(object) = updated.as_object_mut() {
            match old_status {
                Some(status) => object.insert("status".to_string(), status),
                None => object.remove("status"),
            };
        }
        let committed = state.commit(slot, obj.meta().resource_version.clone(), updated)?;
        decode(&committed)
    }

    async fn replace_status<K: Object>(&self, obj: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let key = ObjectKey::of(obj).map_err(StoreError::missing_key)?;
        let mut state = self.state.lock().await;
        state.record(Verb::ReplaceStatus, &kind, &key)?;
        let slot = (kind, key);
        let mut updated = state
            .resources
            .get(&slot)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        let new_status = encode(obj)?.get("status").cloned();
        if let Some(object) = updated.as_object_mut() {
            match new_status {
                Some(status) => object.insert("status".to_string(), status),
                None => object.remove("status"),
            };
        }
        let committed = state.commit(slot, obj.meta().resource_version.clone(), updated)?;
        decode(&committed)
    }
}

fn kind_of<K: Object>() -> String {
    K::kind(&()).into_owned()
}

fn encode<K: Object>(obj: &K) -> Result<Value, StoreError> {
    serde_json::to_value(obj).map_err(|e| StoreError::Permanent(format!("cannot encode object: {}", e)))
}

fn decode<K: Object>(value: &Value) -> Result<K, StoreError> {
    serde_json::from_value(value.clone())
        .map_err(|e| StoreError::Permanent(format!("cannot decode object: {}", e)))
}

fn metadata_mut(value: &mut Value) -> Option<&mut serde_json::Map<String, Value>> {
    let object = value.as_object_mut()?;
    object
        .entry("metadata")
        .or_insert_with(|| Value::Object(serde_json::Map::new()))
        .as_object_mut()
}

fn field<'a>(value: &'a Value, name: &str) -> Option<&'a str> {
    value.get("metadata")?.get(name)?.as_str()
}

fn resource_version(value: &Value) -> Option<&str> {
    field(value, "resourceVersion")
}

fn set_field(value: &mut Value, name: &str, field: Option<String>) {
    if let Some(meta) = metadata_mut(value) {
        match field {
            Some(field) => meta.insert(name.to_string(), Value::String(field)),
            None => meta.remove(name),
        };
    }
}
