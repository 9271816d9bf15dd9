//! A read-only pseudo-directory of string variables, grounded on the
//! original `sysstatfs/FS.go`, `dir.go`, `variable.go`. Demonstrates the
//! override composition point `Adapter` grafts onto its root (spec.md
//! §4.9); this is additive instrumentation with no wire representation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

/// A variable's content: either a value fixed at `set`, or recomputed on
/// every read.
enum Content {
    Fixed(String),
    Computed(Arc<dyn Fn() -> String + Send + Sync>),
}

struct Variable {
    inode: u64,
    content: Content,
}

/// The `sys` override subtree: a flat, read-only directory of variables.
pub struct StatusOverride {
    inode: u64,
    variables: Mutex<HashMap<String, Variable>>,
}

impl StatusOverride {
    /// Builds the default status tree: `ok` and `time`. `entries_cached`
    /// and `issued_inodes` are kept current by [`StatusOverride::set_variable`]
    /// calls the adapter makes against its own counters, since those
    /// counters live behind `async` accessors a synchronous variable
    /// closure can't reach.
    pub async fn new(root_inode: u64) -> Self {
        let tree = StatusOverride { inode: root_inode, variables: Mutex::new(HashMap::new()) };
        tree.set_variable("ok", "1").await;
        tree.set_computed("time", || format!("{:?}", std::time::SystemTime::now())).await;
        tree.set_variable("issued_inodes", "0").await;
        tree.set_variable("entries_cached", "0").await;
        tree
    }

    /// Sets (or replaces) a fixed-value variable, issuing it a fresh
    /// inode the first time it's seen.
    pub async fn set_variable(&self, name: &str, value: &str) {
        let mut vars = self.variables.lock().await;
        match vars.get_mut(name) {
            Some(v) => v.content = Content::Fixed(value.to_string()),
            None => {
                let inode = (vars.len() as u64) + self.inode + 1;
                vars.insert(name.to_string(), Variable { inode, content: Content::Fixed(value.to_string()) });
            }
        }
    }

    /// Sets (or replaces) a variable whose value is recomputed on every
    /// read.
    pub async fn set_computed(&self, name: &str, f: impl Fn() -> String + Send + Sync + 'static) {
        let mut vars = self.variables.lock().await;
        match vars.get_mut(name) {
            Some(v) => v.content = Content::Computed(Arc::new(f)),
            None => {
                let inode = (vars.len() as u64) + self.inode + 1;
                vars.insert(name.to_string(), Variable { inode, content: Content::Computed(Arc::new(f)) });
            }
        }
    }

    pub fn inode(&self) -> u64 {
        self.inode
    }

    /// Lists variable names and their inodes, for `readdir` on the root
    /// of this subtree.
    pub async fn list(&self) -> Vec<(String, u64)> {
        let vars = self.variables.lock().await;
        vars.iter().map(|(name, v)| (name.clone(), v.inode)).collect()
    }

    /// Reads a variable's current value, or `None` if it doesn't exist.
    pub async fn read(&self, name: &str) -> Option<(u64, String)> {
        let vars = self.variables.lock().await;
        vars.get(name).map(|v| {
            let value = match &v.content {
                Content::Fixed(s) => s.clone(),
                Content::Computed(f) => f(),
            };
            (v.inode, value)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_tree_exposes_ok_and_time() {
        let status = StatusOverride::new(1).await;
        let (_, ok) = status.read("ok").await.unwrap();
        assert_eq!(ok, "1");
        assert!(status.read("time").await.is_some());
        assert!(status.read("nonexistent").await.is_none());
    }

    #[tokio::test]
    async fn set_variable_overwrites_without_reissuing_an_inode() {
        let status = StatusOverride::new(1).await;
        let (first_inode, _) = status.read("ok").await.unwrap();
        status.set_variable("ok", "0").await;
        let (second_inode, value) = status.read("ok").await.unwrap();
        assert_eq!(first_inode, second_inode);
        assert_eq!(value, "0");
    }

    #[tokio::test]
    async fn list_reflects_every_registered_variable() {
        let status = StatusOverride::new(1).await;
        status.set_variable("extra", "x").await;
        let names: Vec<String> = status.list().await.into_iter().map(|(n, _)| n).collect();
        assert!(names.contains(&"ok".to_string()));
        assert!(names.contains(&"time".to_string()));
        assert!(names.contains(&"extra".to_string()));
    }
}
