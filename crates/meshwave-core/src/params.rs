//! Parameter store contract
//!
//! The engine writes into parameters it does not own. A store resolves a
//! string id to a value; unknown ids read as `None` and ignore writes.

use std::collections::HashMap;

/// Named numeric parameters the engine can read and write
pub trait ParameterStore {
    /// Current value of `id`, `None` if the id is unknown
    fn value(&self, id: &str) -> Option<f32>;

    /// Write `value` to `id`. Returns `false` (and does nothing) for unknown ids.
    fn set_value(&mut self, id: &str, value: f32) -> bool;

    /// Add `delta` to the current value of `id`. Returns `false` for unknown ids.
    fn add_value(&mut self, id: &str, delta: f32) -> bool {
        match self.value(id) {
            Some(current) => self.set_value(id, current + delta),
            None => false,
        }
    }
}

/// Only keys already present are writable
impl ParameterStore for HashMap<String, f32> {
    fn value(&self, id: &str) -> Option<f32> {
        self.get(id).copied()
    }

    fn set_value(&mut self, id: &str, value: f32) -> bool {
        match self.get_mut(id) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

/// Getter/setter pair for one parameter of `T`
struct Accessor<T> {
    get: fn(&T) -> f32,
    set: fn(&mut T, f32),
    /// Custom additive write, for parameters where `set(get() + delta)` loses precision
    add: Option<fn(&mut T, f32)>,
}

/// Lookup table from parameter id to accessors on a host struct.
///
/// ```
/// use meshwave_core::params::{ParameterStore, ParameterTable};
///
/// #[derive(Default)]
/// struct Visuals {
///     zoom: f32,
/// }
///
/// let mut table: ParameterTable<Visuals> = ParameterTable::new();
/// table.register("zoom", |v| v.zoom, |v, x| v.zoom = x);
///
/// let mut visuals = Visuals::default();
/// let mut store = table.bind(&mut visuals);
/// assert!(store.set_value("zoom", 2.0));
/// assert!(!store.set_value("unknown", 1.0));
/// assert_eq!(visuals.zoom, 2.0);
/// ```
pub struct ParameterTable<T> {
    accessors: HashMap<String, Accessor<T>>,
}

impl<T> Default for ParameterTable<T> {
    fn default() -> Self {
        Self {
            accessors: HashMap::new(),
        }
    }
}

impl<T> ParameterTable<T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the accessors for `id`
    pub fn register(&mut self, id: &str, get: fn(&T) -> f32, set: fn(&mut T, f32)) -> &mut Self {
        self.accessors
            .insert(id.to_string(), Accessor { get, set, add: None });
        self
    }

    /// Like [`register`](Self::register), with a dedicated additive write
    pub fn register_with_add(
        &mut self,
        id: &str,
        get: fn(&T) -> f32,
        set: fn(&mut T, f32),
        add: fn(&mut T, f32),
    ) -> &mut Self {
        self.accessors.insert(
            id.to_string(),
            Accessor {
                get,
                set,
                add: Some(add),
            },
        );
        self
    }

    /// Whether `id` is registered
    pub fn contains(&self, id: &str) -> bool {
        self.accessors.contains_key(id)
    }

    /// All registered ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.accessors.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of registered parameters
    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }

    /// Borrow `target` as a [`ParameterStore`]
    pub fn bind<'a>(&'a self, target: &'a mut T) -> BoundParameters<'a, T> {
        BoundParameters {
            table: self,
            target,
        }
    }
}

/// A [`ParameterTable`] applied to one target value
pub struct BoundParameters<'a, T> {
    table: &'a ParameterTable<T>,
    target: &'a mut T,
}

impl<T> ParameterStore for BoundParameters<'_, T> {
    fn value(&self, id: &str) -> Option<f32> {
        self.table
            .accessors
            .get(id)
            .map(|accessor| (accessor.get)(&*self.target))
    }

    fn set_value(&mut self, id: &str, value: f32) -> bool {
        match self.table.accessors.get(id) {
            Some(accessor) => {
                (accessor.set)(&mut *self.target, value);
                true
            }
            None => false,
        }
    }

    fn add_value(&mut self, id: &str, delta: f32) -> bool {
        let Some(accessor) = self.table.accessors.get(id) else {
            return false;
        };
        match accessor.add {
            Some(add) => add(&mut *self.target, delta),
            None => {
                let current = (accessor.get)(&*self.target);
                (accessor.set)(&mut *self.target, current + delta);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Target {
        x: f32,
        steps: i32,
    }

    fn table() -> ParameterTable<Target> {
        let mut table: ParameterTable<Target> = ParameterTable::new();
        table
            .register("x", |t| t.x, |t, v| t.x = v)
            .register_with_add(
                "steps",
                |t| t.steps as f32,
                |t, v| t.steps = v as i32,
                |t, d| t.steps += d as i32,
            );
        table
    }

    #[test]
    fn test_table_dispatch() {
        let table = table();
        let mut target = Target::default();
        {
            let mut store = table.bind(&mut target);
            assert!(store.set_value("x", 0.25));
            assert!(store.set_value("steps", 3.9));
            assert_eq!(store.value("x"), Some(0.25));
            assert_eq!(store.value("steps"), Some(3.0));
        }
        assert_eq!(target.x, 0.25);
        assert_eq!(target.steps, 3);
    }

    #[test]
    fn test_additive_writes() {
        let table = table();
        let mut target = Target { x: 0.5, steps: 8 };
        {
            let mut store = table.bind(&mut target);
            assert!(store.add_value("x", 0.25));
            // Only the delta is truncated
            assert!(store.add_value("steps", -0.7));
            assert!(!store.add_value("missing", 1.0));
        }
        assert_eq!(target.x, 0.75);
        assert_eq!(target.steps, 8);

        let mut store: HashMap<String, f32> = HashMap::new();
        store.insert("zoom".to_string(), 1.0);
        assert!(store.add_value("zoom", 0.5));
        assert!(!store.add_value("pan", 0.5));
        assert_eq!(store["zoom"], 1.5);
    }

    #[test]
    fn test_unknown_id_is_noop() {
        let table = table();
        let mut target = Target::default();
        let mut store = table.bind(&mut target);
        assert_eq!(store.value("missing"), None);
        assert!(!store.set_value("missing", 1.0));
    }

    #[test]
    fn test_ids_sorted() {
        assert_eq!(table().ids(), vec!["steps", "x"]);
        assert_eq!(table().len(), 2);
        assert!(table().contains("x"));
    }

    #[test]
    fn test_hashmap_store_only_writes_known_keys() {
        let mut store: HashMap<String, f32> = HashMap::new();
        store.insert("zoom".to_string(), 1.0);

        assert!(store.set_value("zoom", 2.0));
        assert!(!store.set_value("pan", 2.0));
        assert_eq!(ParameterStore::value(&store, "zoom"), Some(2.0));
        assert!(!store.contains_key("pan"));
    }
}
