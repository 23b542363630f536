//! Stores: per-property reactivity over JSON objects and arrays.
//!
//! A store keeps one subscriber set per property key instead of one for the
//! whole value. Reading `get("x")` or `has("x")` subscribes to key `x`;
//! `keys()`/`len()` subscribe to the key list. Writes notify only the
//! affected keys, and adding or removing a key also notifies presence and
//! key-list readers.
//!
//! Deep stores wrap nested objects and arrays into child stores lazily, the
//! first time they are read.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value as Json;

use crate::error::{CoreError, Result};

use super::context::ReactiveContext;
use super::runtime::Runtime;
use super::subscriber::{
    next_source_id, AnySource, AnySubscriber, Source, SourceKey, SubscriberId, SubscriberSet,
};

/// Property key.
pub type PropKey = Arc<str>;

/// Pseudo-key under which `keys()` and `len()` readers subscribe.
pub const KEYS: &str = "[[keys]]";

/// A value read from a store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreValue {
    Json(Json),
    Store(Store),
}

impl StoreValue {
    /// Plain JSON copy of the value.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Json(json) => json.clone(),
            Self::Store(store) => store.snapshot(),
        }
    }

    pub fn as_store(&self) -> Option<&Store> {
        match self {
            Self::Store(store) => Some(store),
            Self::Json(_) => None,
        }
    }
}

#[derive(Clone)]
enum Slot {
    Raw(Json),
    Nested(Store),
}

impl Slot {
    fn to_json(&self) -> Json {
        match self {
            Slot::Raw(json) => json.clone(),
            Slot::Nested(store) => store.snapshot(),
        }
    }
}

enum StoreData {
    Object(IndexMap<String, Slot>),
    Array(Vec<Slot>),
}

impl StoreData {
    fn slot(&self, key: &str) -> Option<&Slot> {
        match self {
            StoreData::Object(map) => map.get(key),
            StoreData::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        }
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Slot> {
        match self {
            StoreData::Object(map) => map.get_mut(key),
            StoreData::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        }
    }

    fn len(&self) -> usize {
        match self {
            StoreData::Object(map) => map.len(),
            StoreData::Array(items) => items.len(),
        }
    }
}

struct StoreInner {
    id: u64,
    deep: bool,
    data: RwLock<StoreData>,
    effects: Mutex<HashMap<PropKey, SubscriberSet>>,
}

/// Edge between one store key and its subscribers.
struct KeyEdge {
    store: Arc<StoreInner>,
    key: PropKey,
}

impl Source for KeyEdge {
    fn source_key(&self) -> SourceKey {
        SourceKey {
            id: self.store.id,
            key: Some(self.key.clone()),
        }
    }

    fn unsubscribe(&self, subscriber: SubscriberId) {
        if let Some(set) = self.store.effects.lock().get_mut(&self.key) {
            set.remove(subscriber);
        }
    }
}

/// A deeply reactive JSON object or array.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Wrap a JSON object or array; nested containers become stores on first
    /// access.
    pub fn new(value: Json) -> Result<Self> {
        Self::build(value, true)
    }

    /// Wrap a JSON object or array without wrapping nested containers.
    pub fn shallow(value: Json) -> Result<Self> {
        Self::build(value, false)
    }

    fn build(value: Json, deep: bool) -> Result<Self> {
        let data = match value {
            Json::Object(map) => {
                StoreData::Object(map.into_iter().map(|(k, v)| (k, Slot::Raw(v))).collect())
            }
            Json::Array(items) => StoreData::Array(items.into_iter().map(Slot::Raw).collect()),
            other => {
                return Err(CoreError::TypeMismatch {
                    expected: "object or array",
                    found: json_kind(&other),
                })
            }
        };
        Ok(Self {
            inner: Arc::new(StoreInner {
                id: next_source_id(),
                deep,
                data: RwLock::new(data),
                effects: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_deep(&self) -> bool {
        self.inner.deep
    }

    pub fn is_array(&self) -> bool {
        matches!(*self.inner.data.read(), StoreData::Array(_))
    }

    fn track(&self, key: &str) {
        if !ReactiveContext::is_active() {
            return;
        }
        let key: PropKey = Arc::from(key);
        let source = || {
            AnySource::new(Arc::new(KeyEdge {
                store: self.inner.clone(),
                key: key.clone(),
            }) as Arc<dyn Source>)
        };
        if let Some(subscriber) = ReactiveContext::track(source) {
            self.inner
                .effects
                .lock()
                .entry(key.clone())
                .or_default()
                .insert(subscriber);
        }
    }

    /// Read a property. Nested containers come back as child stores in deep
    /// mode.
    pub fn get(&self, key: &str) -> Option<StoreValue> {
        self.track(key);
        self.read_slot(key)
    }

    /// Read a property without tracking.
    pub fn get_untracked(&self, key: &str) -> Option<StoreValue> {
        self.read_slot(key)
    }

    fn read_slot(&self, key: &str) -> Option<StoreValue> {
        {
            let data = self.inner.data.read();
            match data.slot(key)? {
                Slot::Nested(store) => return Some(StoreValue::Store(store.clone())),
                Slot::Raw(json) if !self.inner.deep || !is_container(json) => {
                    return Some(StoreValue::Json(json.clone()))
                }
                Slot::Raw(_) => {}
            }
        }
        // Deep mode: wrap the nested container on first access.
        let mut data = self.inner.data.write();
        let slot = data.slot_mut(key)?;
        if let Slot::Raw(json) = slot {
            let child = Store::build(json.take(), true).ok()?;
            *slot = Slot::Nested(child);
        }
        match slot {
            Slot::Nested(store) => Some(StoreValue::Store(store.clone())),
            Slot::Raw(json) => Some(StoreValue::Json(json.clone())),
        }
    }

    /// Read a property as plain JSON.
    pub fn get_json(&self, key: &str) -> Option<Json> {
        self.get(key).map(|value| value.to_json())
    }

    /// Read a nested container as a child store.
    pub fn child(&self, key: &str) -> Option<Store> {
        match self.get(key)? {
            StoreValue::Store(store) => Some(store),
            StoreValue::Json(_) => None,
        }
    }

    /// Presence check, tracked under `key`.
    pub fn has(&self, key: &str) -> bool {
        self.track(key);
        self.inner.data.read().slot(key).is_some()
    }

    /// Current keys (indices for arrays), tracked under [`KEYS`].
    pub fn keys(&self) -> Vec<String> {
        self.track(KEYS);
        match &*self.inner.data.read() {
            StoreData::Object(map) => map.keys().cloned().collect(),
            StoreData::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
        }
    }

    /// Number of properties or items, tracked under [`KEYS`].
    pub fn len(&self) -> usize {
        self.track(KEYS);
        self.inner.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write a property. Writing an equal primitive is a no-op.
    pub fn set(&self, key: &str, value: Json) -> Result<()> {
        let added = {
            let mut data = self.inner.data.write();
            match &mut *data {
                StoreData::Object(map) => match map.get(key) {
                    Some(Slot::Raw(current)) if *current == value => return Ok(()),
                    existing => {
                        let added = existing.is_none();
                        map.insert(key.to_string(), Slot::Raw(value));
                        added
                    }
                },
                StoreData::Array(items) => {
                    let index = parse_index(key)?;
                    match items.get(index) {
                        Some(Slot::Raw(current)) if *current == value => return Ok(()),
                        Some(_) => {
                            items[index] = Slot::Raw(value);
                            false
                        }
                        None if index == items.len() => {
                            items.push(Slot::Raw(value));
                            true
                        }
                        None => {
                            return Err(CoreError::InvalidAttribute {
                                name: key.to_string(),
                                reason: format!("index out of bounds for length {}", items.len()),
                            })
                        }
                    }
                }
            }
        };
        if added {
            self.trigger(&[key, KEYS]);
        } else {
            self.trigger(&[key]);
        }
        Ok(())
    }

    /// Remove a property. Returns the removed value.
    pub fn delete(&self, key: &str) -> Option<Json> {
        let removed = {
            let mut data = self.inner.data.write();
            match &mut *data {
                StoreData::Object(map) => map.shift_remove(key),
                StoreData::Array(_) => None,
            }
        };
        if removed.is_some() {
            self.trigger(&[key, KEYS]);
        }
        removed.map(|slot| slot.to_json())
    }

    /// Append to an array store.
    pub fn push(&self, value: Json) -> Result<()> {
        let index = self.with_array(|items| {
            items.push(Slot::Raw(value));
            items.len() - 1
        })?;
        self.trigger(&[&index.to_string(), KEYS]);
        Ok(())
    }

    /// Remove the last item of an array store.
    pub fn pop(&self) -> Result<Option<Json>> {
        let popped = self.with_array(|items| {
            let len = items.len();
            items.pop().map(|slot| (len - 1, slot))
        })?;
        Ok(popped.map(|(index, slot)| {
            self.trigger(&[&index.to_string(), KEYS]);
            slot.to_json()
        }))
    }

    /// Insert into an array store, shifting later items.
    pub fn insert(&self, index: usize, value: Json) -> Result<()> {
        let len = self.with_array(|items| {
            if index <= items.len() {
                items.insert(index, Slot::Raw(value));
                Some(items.len())
            } else {
                None
            }
        })?;
        let len = len.ok_or_else(|| CoreError::InvalidAttribute {
            name: index.to_string(),
            reason: "insert index out of bounds".into(),
        })?;
        self.trigger_shifted(index, len);
        Ok(())
    }

    /// Remove an item from an array store, shifting later items.
    pub fn remove(&self, index: usize) -> Result<Option<Json>> {
        let removed = self.with_array(|items| {
            if index < items.len() {
                let len = items.len();
                Some((items.remove(index), len))
            } else {
                None
            }
        })?;
        Ok(removed.map(|(slot, old_len)| {
            self.trigger_shifted(index, old_len);
            slot.to_json()
        }))
    }

    fn with_array<T>(&self, f: impl FnOnce(&mut Vec<Slot>) -> T) -> Result<T> {
        match &mut *self.inner.data.write() {
            StoreData::Array(items) => Ok(f(items)),
            StoreData::Object(_) => Err(CoreError::TypeMismatch {
                expected: "array store",
                found: "object store",
            }),
        }
    }

    fn trigger_shifted(&self, from: usize, upto: usize) {
        let keys: Vec<String> = (from..upto).map(|i| i.to_string()).collect();
        let mut refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        refs.push(KEYS);
        self.trigger(&refs);
    }

    fn trigger(&self, keys: &[&str]) {
        let subscribers = {
            let mut effects = self.inner.effects.lock();
            let mut seen = IndexMap::new();
            for key in keys {
                if let Some(set) = effects.get_mut(*key) {
                    for subscriber in set.snapshot() {
                        seen.entry(subscriber.id()).or_insert(subscriber);
                    }
                }
            }
            seen.into_values().collect::<Vec<_>>()
        };
        tracing::trace!(store = self.inner.id, ?keys, subscribers = subscribers.len(), "store changed");
        Runtime::notify(subscribers);
    }

    /// Plain JSON copy of the whole store, untracked.
    pub fn snapshot(&self) -> Json {
        match &*self.inner.data.read() {
            StoreData::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, slot)| (k.clone(), slot.to_json()))
                    .collect(),
            ),
            StoreData::Array(items) => Json::Array(items.iter().map(Slot::to_json).collect()),
        }
    }

    /// Add an edge explicitly. Used when rebuilding the graph on resume.
    pub fn subscribe_key(&self, key: &str, subscriber: AnySubscriber) {
        self.inner
            .effects
            .lock()
            .entry(Arc::from(key))
            .or_default()
            .insert(subscriber);
    }

    /// The edge for `key` as a type-erased source.
    pub fn key_source(&self, key: &str) -> AnySource {
        AnySource::new(Arc::new(KeyEdge {
            store: self.inner.clone(),
            key: Arc::from(key),
        }) as Arc<dyn Source>)
    }

    /// Every live `(key, subscriber)` edge of this store.
    pub fn subscriptions(&self) -> Vec<(PropKey, AnySubscriber)> {
        let mut effects = self.inner.effects.lock();
        let mut out = Vec::new();
        for (key, set) in effects.iter_mut() {
            for subscriber in set.snapshot() {
                out.push((key.clone(), subscriber));
            }
        }
        out
    }

    /// Number of subscribers registered under `key`.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.inner
            .effects
            .lock()
            .get(key)
            .map(SubscriberSet::len)
            .unwrap_or(0)
    }

    /// Child stores created so far, by key.
    pub fn materialized_children(&self) -> Vec<(String, Store)> {
        match &*self.inner.data.read() {
            StoreData::Object(map) => map
                .iter()
                .filter_map(|(k, slot)| match slot {
                    Slot::Nested(store) => Some((k.clone(), store.clone())),
                    Slot::Raw(_) => None,
                })
                .collect(),
            StoreData::Array(items) => items
                .iter()
                .enumerate()
                .filter_map(|(i, slot)| match slot {
                    Slot::Nested(store) => Some((i.to_string(), store.clone())),
                    Slot::Raw(_) => None,
                })
                .collect(),
        }
    }

    /// Install `child` as the nested store under `key`, replacing the raw
    /// value there. Used on resume so shared child stores keep their
    /// identity.
    pub(crate) fn adopt_child(&self, key: &str, child: Store) -> Result<()> {
        let mut data = self.inner.data.write();
        let slot = data.slot_mut(key).ok_or_else(|| CoreError::Resume(format!(
            "store {} has no key `{key}` to attach a child to",
            self.inner.id
        )))?;
        *slot = Slot::Nested(child);
        Ok(())
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.inner.id)
            .field("value", &self.snapshot())
            .finish()
    }
}

fn is_container(json: &Json) -> bool {
    matches!(json, Json::Object(_) | Json::Array(_))
}

fn parse_index(key: &str) -> Result<usize> {
    key.parse::<usize>().map_err(|_| CoreError::InvalidAttribute {
        name: key.to_string(),
        reason: "array stores are indexed by integers".into(),
    })
}

/// Human readable name of a JSON value's type.
pub(crate) fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}
