//! The closed set of names sandboxed code can reach.
//!
//! A registry is assembled once from an ordered list of binding sets plus
//! pinned entries, then shared read-only by every compilation attempt.
//! Entries are frozen on build, so no attempt can change what the next sees.

use crate::error::RegistryError;
use crate::parser::is_identifier_name;
use crate::sandbox::Value;
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::HashSet;

/// What happens when two binding sets provide the same name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollisionPolicy {
    #[default]
    Reject,
    /// The set merged later replaces the earlier binding.
    LastWins,
}

/// Named group of bindings, usually one library.
#[derive(Debug, Clone)]
pub struct BindingSet {
    name: String,
    bindings: IndexMap<String, Value>,
}

impl BindingSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: IndexMap::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    origin: String,
}

const PINNED_ORIGIN: &str = "pinned";

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    policy: CollisionPolicy,
    sets: Vec<BindingSet>,
    pins: Vec<(String, Value)>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collisions(mut self, policy: CollisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Add a binding set. Sets are applied in the order they are merged.
    pub fn merge(mut self, set: BindingSet) -> Self {
        self.sets.push(set);
        self
    }

    /// Entry that overrides every set, regardless of the collision policy.
    pub fn pin(mut self, name: impl Into<String>, value: Value) -> Self {
        self.pins.push((name.into(), value));
        self
    }

    pub fn build(self) -> Result<CapabilityRegistry, RegistryError> {
        let pinned: HashSet<&str> = self.pins.iter().map(|(name, _)| name.as_str()).collect();
        let mut entries: IndexMap<String, Entry> = IndexMap::new();

        for set in &self.sets {
            for (name, value) in &set.bindings {
                validate_name(name)?;
                if let Some(existing) = entries.get(name) {
                    if self.policy == CollisionPolicy::Reject && !pinned.contains(name.as_str()) {
                        return Err(RegistryError::Collision {
                            name: name.clone(),
                            first: existing.origin.clone(),
                            second: set.name.clone(),
                        });
                    }
                    log::debug!(
                        "Capability '{name}' from '{}' replaced by '{}'",
                        existing.origin,
                        set.name
                    );
                }
                entries.insert(
                    name.clone(),
                    Entry {
                        value: value.freeze(),
                        origin: set.name.clone(),
                    },
                );
            }
        }

        for (name, value) in &self.pins {
            validate_name(name)?;
            entries.insert(
                name.clone(),
                Entry {
                    value: value.freeze(),
                    origin: PINNED_ORIGIN.to_string(),
                },
            );
        }

        Ok(CapabilityRegistry { entries })
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    if is_identifier_name(name) {
        Ok(())
    } else {
        Err(RegistryError::InvalidName {
            name: name.to_string(),
        })
    }
}

/// Immutable name to binding mapping.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    entries: IndexMap<String, Entry>,
}

impl CapabilityRegistry {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name).map(|entry| &entry.value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Name of the binding set that provided `name`.
    pub fn origin(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(|entry| entry.origin.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(name: &str, bindings: &[(&str, f64)]) -> BindingSet {
        bindings
            .iter()
            .fold(BindingSet::new(name), |set, (binding, value)| {
                set.with(*binding, Value::Number(*value))
            })
    }

    #[test]
    fn test_merge_preserves_order() {
        let registry = RegistryBuilder::new()
            .merge(set("ui", &[("Button", 1.0), ("Card", 2.0)]))
            .merge(set("icons", &[("Star", 3.0)]))
            .build()
            .unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["Button", "Card", "Star"]);
        assert_eq!(registry.origin("Star"), Some("icons"));
        assert!(registry.contains("Card"));
        assert!(registry.get("Missing").is_none());
    }

    #[test]
    fn test_collision_rejected_by_default() {
        let error = RegistryBuilder::new()
            .merge(set("ui", &[("Button", 1.0)]))
            .merge(set("other-ui", &[("Button", 2.0)]))
            .build()
            .unwrap_err();
        assert_eq!(
            error,
            RegistryError::Collision {
                name: "Button".into(),
                first: "ui".into(),
                second: "other-ui".into(),
            }
        );
    }

    #[test]
    fn test_last_wins_policy() {
        let registry = RegistryBuilder::new()
            .collisions(CollisionPolicy::LastWins)
            .merge(set("ui", &[("Button", 1.0)]))
            .merge(set("other-ui", &[("Button", 2.0)]))
            .build()
            .unwrap();
        assert_eq!(registry.get("Button").map(Value::to_number), Some(2.0));
        assert_eq!(registry.origin("Button"), Some("other-ui"));
    }

    #[test]
    fn test_pinned_entries_override_and_allow_collisions() {
        let registry = RegistryBuilder::new()
            .merge(set("a", &[("React", 1.0)]))
            .merge(set("b", &[("React", 2.0)]))
            .pin("React", Value::Number(3.0))
            .build()
            .unwrap();
        assert_eq!(registry.get("React").map(Value::to_number), Some(3.0));
        assert_eq!(registry.origin("React"), Some("pinned"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_entries_are_frozen() {
        let function = Value::native("f", |_, _| Ok(Value::Undefined));
        let registry = RegistryBuilder::new()
            .merge(BindingSet::new("lib").with(
                "Lib",
                Value::object([("f", function.clone()), ("n", Value::Number(1.0))]),
            ))
            .build()
            .unwrap();
        let Some(Value::Namespace(entries)) = registry.get("Lib") else {
            panic!("Expected a namespace");
        };
        assert!(entries["f"].same_reference(&function));
        assert_eq!(entries["n"].to_number(), 1.0);
    }

    #[test]
    fn test_invalid_name() {
        assert!(matches!(
            RegistryBuilder::new()
                .merge(set("ui", &[("my-button", 1.0)]))
                .build(),
            Err(RegistryError::InvalidName { .. })
        ));
    }
}
