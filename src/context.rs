use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// The ordered variable store carried between cell executions.
///
/// Writes happen in place as statements run; nothing is buffered, so a failing
/// run leaves every binding made before the fault in the context.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    bindings: IndexMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a context from `[name, value]` entries; a repeated name keeps its
    /// first position and takes the last value.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut context = Self::new();
        for (name, value) in entries {
            context.set(name, value);
        }
        context
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.bindings
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

/// On the wire a context is a list of `[name, value]` pairs.
impl Serialize for Context {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.bindings.iter())
    }
}

impl<'de> Deserialize<'de> for Context {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Option::<Vec<(String, Value)>>::deserialize(deserializer)?;
        Ok(Self::from_entries(entries.unwrap_or_default()))
    }
}
