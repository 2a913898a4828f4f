//! Action/filter hook registry
//!
//! In-process pub/sub used by plugins: **actions** are fire-and-forget
//! notifications, **filters** transform a value and hand it to the next
//! callback. Callbacks run in ascending priority order; ties run in
//! registration order. The registry is an injected service on `AppState`,
//! not a global.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

pub type ActionFn = dyn Fn(&Value) + Send + Sync;
pub type FilterFn = dyn Fn(Value) -> Value + Send + Sync;

struct Entry<T: ?Sized> {
    plugin: String,
    priority: i32,
    seq: u64,
    callback: Arc<T>,
}

#[derive(Default)]
struct Inner {
    actions: HashMap<String, Vec<Entry<ActionFn>>>,
    filters: HashMap<String, Vec<Entry<FilterFn>>>,
    next_seq: u64,
}

pub struct HookRegistry {
    inner: RwLock<Inner>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn add_action(
        &self,
        hook: &str,
        plugin: &str,
        priority: i32,
        callback: Arc<ActionFn>,
    ) {
        let mut inner = self.inner.write().expect("hook registry poisoned");
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let entries = inner.actions.entry(hook.to_string()).or_default();
        entries.push(Entry {
            plugin: plugin.to_string(),
            priority,
            seq,
            callback,
        });
        entries.sort_by_key(|e| (e.priority, e.seq));
    }

    pub fn add_filter(
        &self,
        hook: &str,
        plugin: &str,
        priority: i32,
        callback: Arc<FilterFn>,
    ) {
        let mut inner = self.inner.write().expect("hook registry poisoned");
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let entries = inner.filters.entry(hook.to_string()).or_default();
        entries.push(Entry {
            plugin: plugin.to_string(),
            priority,
            seq,
            callback,
        });
        entries.sort_by_key(|e| (e.priority, e.seq));
    }

    /// Invoke every action registered for `hook`.
    pub fn do_action(&self, hook: &str, payload: &Value) {
        let callbacks: Vec<Arc<ActionFn>> = {
            let inner = self.inner.read().expect("hook registry poisoned");
            inner
                .actions
                .get(hook)
                .map(|entries| entries.iter().map(|e| e.callback.clone()).collect())
                .unwrap_or_default()
        };

        for callback in callbacks {
            callback(payload);
        }
    }

    /// Thread `value` through every filter registered for `hook`.
    pub fn apply_filters(&self, hook: &str, value: Value) -> Value {
        let callbacks: Vec<Arc<FilterFn>> = {
            let inner = self.inner.read().expect("hook registry poisoned");
            inner
                .filters
                .get(hook)
                .map(|entries| entries.iter().map(|e| e.callback.clone()).collect())
                .unwrap_or_default()
        };

        let mut value = value;
        for callback in callbacks {
            value = callback(value);
        }
        value
    }

    /// Remove every callback a plugin registered (on deactivation).
    pub fn remove_plugin(&self, plugin: &str) {
        let mut inner = self.inner.write().expect("hook registry poisoned");
        for entries in inner.actions.values_mut() {
            entries.retain(|e| e.plugin != plugin);
        }
        for entries in inner.filters.values_mut() {
            entries.retain(|e| e.plugin != plugin);
        }
    }

    /// Hook names with at least one registered callback.
    pub fn registered_hooks(&self) -> Vec<String> {
        let inner = self.inner.read().expect("hook registry poisoned");
        let mut names: Vec<String> = inner
            .actions
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.clone())
            .chain(
                inner
                    .filters
                    .iter()
                    .filter(|(_, v)| !v.is_empty())
                    .map(|(k, _)| k.clone()),
            )
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[test]
    fn actions_run_in_priority_order() {
        let registry = HookRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (name, priority) in [("late", 20), ("early", 5), ("middle", 10)] {
            let order = order.clone();
            registry.add_action(
                "album_saved",
                "test",
                priority,
                Arc::new(move |_| order.lock().unwrap().push(name)),
            );
        }

        registry.do_action("album_saved", &json!({}));
        assert_eq!(*order.lock().unwrap(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn equal_priority_keeps_registration_order() {
        let registry = HookRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let order = order.clone();
            registry.add_action(
                "hook",
                "test",
                10,
                Arc::new(move |_| order.lock().unwrap().push(name)),
            );
        }

        registry.do_action("hook", &json!({}));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn filters_chain_values() {
        let registry = HookRegistry::new();

        registry.add_filter(
            "title",
            "a",
            10,
            Arc::new(|v| json!(format!("{}!", v.as_str().unwrap_or("")))),
        );
        registry.add_filter(
            "title",
            "b",
            5,
            Arc::new(|v| json!(v.as_str().unwrap_or("").to_uppercase())),
        );

        // Priority 5 runs first (uppercase), then priority 10 (append !)
        let out = registry.apply_filters("title", json!("portra"));
        assert_eq!(out, json!("PORTRA!"));
    }

    #[test]
    fn unknown_hook_is_noop() {
        let registry = HookRegistry::new();
        let value = registry.apply_filters("nothing", json!(42));
        assert_eq!(value, json!(42));
        registry.do_action("nothing", &json!(null));
    }

    #[test]
    fn remove_plugin_unregisters_callbacks() {
        let registry = HookRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        registry.add_action("hook", "doomed", 10, Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        let c = count.clone();
        registry.add_action("hook", "keeper", 10, Arc::new(move |_| {
            c.fetch_add(10, Ordering::SeqCst);
        }));

        registry.remove_plugin("doomed");
        registry.do_action("hook", &json!({}));

        assert_eq!(count.load(Ordering::SeqCst), 10);
    }
}
