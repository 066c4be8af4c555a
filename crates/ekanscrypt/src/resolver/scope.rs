//! Scope arena used while resolving identifiers.

use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::FxHashMap;

/// Index of a scope inside a [`ScopeArena`].
pub type ScopeId = usize;

/// A resolved variable: the source label plus a redeclaration counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Name as written in the source
    pub label: String,
    /// Incremented each time the label is redeclared down the scope chain
    pub generation: u32,
}

impl Identity {
    fn new(label: &str, generation: u32) -> Self {
        Self {
            label: label.to_string(),
            generation,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "{}", self.label)
        } else {
            write!(f, "{}:{}", self.label, self.generation)
        }
    }
}

/// Strips the generation suffix from a rendered identity.
pub fn label_of(identity: &str) -> &str {
    identity.split(':').next().unwrap_or(identity)
}

/// One function, class or module body.
#[derive(Debug, Default)]
pub struct Scope {
    /// Enclosing scope
    pub parent: Option<ScopeId>,
    /// Class bodies neither alias names nor expose their own to children
    pub noalias: bool,
    /// Names declared in this body
    pub vars: FxHashMap<String, Identity>,
    /// Identities declared here and captured by a nested body
    pub cellvars: BTreeSet<String>,
    /// Identities declared above and used here or below
    pub freevars: BTreeSet<String>,
}

/// How an identifier occurrence uses its variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Read
    Load,
    /// Write
    Store,
}

/// Outcome of resolving one occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Rendered identity to write back into the node
    pub identity: String,
    /// True when the variable lives in an enclosing body
    pub reference: bool,
}

/// All scopes created by one resolution run.
#[derive(Debug, Default)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    /// Creates an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a scope below `parent`.
    pub fn push(&mut self, parent: Option<ScopeId>, noalias: bool) -> ScopeId {
        self.scopes.push(Scope {
            parent,
            noalias,
            ..Scope::default()
        });
        self.scopes.len() - 1
    }

    /// Returns a scope by id.
    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id]
    }

    fn chain(&self, id: ScopeId) -> impl Iterator<Item = ScopeId> + '_ {
        std::iter::successors(Some(id), move |&s| self.scopes[s].parent)
    }

    /// Declares `label` in scope `id` and returns its rendered identity.
    ///
    /// A label already visible along the chain gets a generation one past
    /// the newest one, unless the scope is `noalias`.
    pub fn define(&mut self, id: ScopeId, label: &str) -> String {
        let newest = self
            .chain(id)
            .filter_map(|s| self.scopes[s].vars.get(label))
            .map(|identity| identity.generation)
            .max();

        let identity = match newest {
            Some(generation) if !self.scopes[id].noalias => Identity::new(label, generation + 1),
            _ => Identity::new(label, 0),
        };
        let rendered = identity.to_string();
        self.scopes[id].vars.insert(label.to_string(), identity);
        rendered
    }

    /// Resolves a read or write of `label` from scope `id`.
    pub fn access(&mut self, id: ScopeId, label: &str, access: Access) -> Resolution {
        let mut crossed = Vec::new();
        let mut owner = None;
        for s in self.chain(id) {
            let scope = &self.scopes[s];
            if !scope.noalias && scope.vars.contains_key(label) {
                owner = Some(s);
                break;
            }
            crossed.push(s);
        }

        let local = |identity: String| Resolution {
            identity,
            reference: false,
        };

        match owner {
            None => match access {
                Access::Load => local(label.to_string()),
                Access::Store => local(self.define(id, label)),
            },
            Some(owner) if owner == id => local(self.scopes[id].vars[label].to_string()),
            Some(_) if self.scopes[id].noalias && access == Access::Store => {
                match self.scopes[id].vars.get(label) {
                    Some(identity) => local(identity.to_string()),
                    None => local(self.define(id, label)),
                }
            }
            Some(owner) => {
                let identity = self.scopes[owner].vars[label].to_string();
                self.scopes[owner].cellvars.insert(identity.clone());
                for s in crossed {
                    self.scopes[s].freevars.insert(identity.clone());
                }
                Resolution {
                    identity,
                    reference: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        assert_eq!(Identity::new("a", 0).to_string(), "a");
        assert_eq!(Identity::new("a", 2).to_string(), "a:2");
        assert_eq!(label_of("a:2"), "a");
        assert_eq!(label_of("a"), "a");
    }

    #[test]
    fn test_store_defines_locally() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None, false);
        let r = arena.access(root, "x", Access::Store);
        assert_eq!(r.identity, "x");
        assert!(!r.reference);
        assert!(arena.get(root).vars.contains_key("x"));
    }

    #[test]
    fn test_undefined_load_is_global() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None, false);
        let r = arena.access(root, "print", Access::Load);
        assert_eq!(r.identity, "print");
        assert!(arena.get(root).vars.is_empty());
    }

    #[test]
    fn test_capture_marks_cell_and_free() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None, false);
        let outer = arena.push(Some(root), false);
        let inner = arena.push(Some(outer), false);
        arena.define(root, "x");

        let r = arena.access(inner, "x", Access::Load);
        assert!(r.reference);
        assert!(arena.get(root).cellvars.contains("x"));
        assert!(arena.get(outer).freevars.contains("x"));
        assert!(arena.get(inner).freevars.contains("x"));
        assert!(arena.get(root).freevars.is_empty());
    }

    #[test]
    fn test_redefine_bumps_generation() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None, false);
        let child = arena.push(Some(root), false);
        let grandchild = arena.push(Some(child), false);
        assert_eq!(arena.define(root, "a"), "a");
        assert_eq!(arena.define(child, "a"), "a:1");
        assert_eq!(arena.define(grandchild, "a"), "a:2");
        assert_eq!(arena.access(root, "a", Access::Load).identity, "a");
    }

    #[test]
    fn test_noalias_scope() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None, false);
        let class = arena.push(Some(root), true);
        arena.define(root, "a");

        assert_eq!(arena.define(class, "b"), "b");
        assert_eq!(arena.define(class, "a"), "a");

        // class scope names are invisible to nested bodies
        let method = arena.push(Some(class), false);
        let r = arena.access(method, "b", Access::Load);
        assert_eq!(r.identity, "b");
        assert!(!r.reference);
    }

    #[test]
    fn test_noalias_store_shadows_parent() {
        let mut arena = ScopeArena::new();
        let root = arena.push(None, false);
        let class = arena.push(Some(root), true);
        arena.define(root, "a");

        let load = arena.access(class, "a", Access::Load);
        assert!(load.reference);
        let store = arena.access(class, "a", Access::Store);
        assert!(!store.reference);
        assert_eq!(store.identity, "a");
    }
}
