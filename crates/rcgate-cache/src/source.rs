//! What a data manager mirrors and how events change it.

use crate::{DeltaError, FetchError};
use async_trait::async_trait;
use rcgate_core::{RcuEvent, RcuEventType};
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

/// An update event addressed to a manager whose pattern matched its URI.
#[derive(Debug, Clone)]
pub struct Delta<'a> {
    pub kind: RcuEventType,
    pub uri: &'a str,
    pub data: &'a Value,
    captures: Vec<Option<&'a str>>,
}

impl<'a> Delta<'a> {
    /// Match `event` against `pattern`. `None` when the URI is not owned.
    pub fn matching(pattern: &Regex, event: &'a RcuEvent) -> Option<Self> {
        let caps = pattern.captures(&event.uri)?;
        Some(Self {
            kind: event.event_type,
            uri: &event.uri,
            data: &event.data,
            captures: caps
                .iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str()))
                .collect(),
        })
    }

    /// The text of pattern group `index` (1-based).
    pub fn capture(&self, index: usize) -> Result<&'a str, DeltaError> {
        index
            .checked_sub(1)
            .and_then(|i| self.captures.get(i).copied().flatten())
            .ok_or(DeltaError::MissingCapture(index))
    }

    /// Decode the event data.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, DeltaError> {
        Ok(T::deserialize(self.data)?)
    }
}

/// The mutation a delta asks an object manager for.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectChange<T> {
    Set(T),
    Clear,
    Ignore,
}

/// The mutation a delta asks a map manager for.
#[derive(Debug, Clone)]
pub enum MapChange<K, V> {
    Put(K, V),
    Remove(K),
    Replace(HashMap<K, V>),
    Clear,
    Ignore,
}

// Comparing `Replace` needs hashable keys, which a derive cannot require.
impl<K: Eq + Hash, V: PartialEq> PartialEq for MapChange<K, V> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Put(k1, v1), Self::Put(k2, v2)) => k1 == k2 && v1 == v2,
            (Self::Remove(k1), Self::Remove(k2)) => k1 == k2,
            (Self::Replace(m1), Self::Replace(m2)) => m1 == m2,
            (Self::Clear, Self::Clear) | (Self::Ignore, Self::Ignore) => true,
            _ => false,
        }
    }
}

/// A single mirrored value.
#[async_trait]
pub trait ObjectSource: Send + Sync + 'static {
    type State: Clone + PartialEq + Send + Sync + 'static;
    type View: Serialize + PartialEq + Send + Sync + 'static;

    /// Stable id, also the `source` of published changes.
    fn id(&self) -> &str;

    fn pattern(&self) -> &Regex;

    async fn fetch_initial_state(&self) -> Result<Option<Self::State>, FetchError>;

    /// Decide how `delta` changes the state. Must not have side effects.
    fn apply_delta(
        &self,
        current: Option<&Self::State>,
        delta: &Delta<'_>,
    ) -> Result<ObjectChange<Self::State>, DeltaError>;

    fn compute_view(&self, state: Option<&Self::State>) -> Self::View;
}

/// A mirrored keyed collection.
#[async_trait]
pub trait MapSource: Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Display + Send + Sync + 'static;
    type Value: Clone + PartialEq + Send + Sync + 'static;
    type ValueView: Serialize + PartialEq + Send + Sync + 'static;

    fn id(&self) -> &str;

    fn pattern(&self) -> &Regex;

    async fn fetch_initial_state(&self) -> Result<HashMap<Self::Key, Self::Value>, FetchError>;

    fn apply_delta(
        &self,
        delta: &Delta<'_>,
    ) -> Result<MapChange<Self::Key, Self::Value>, DeltaError>;

    fn compute_value_view(&self, key: &Self::Key, value: &Self::Value) -> Self::ValueView;
}
