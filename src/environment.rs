//! Lexical environments.
//!
//! An [`Environment`] maps symbol names to values and links to the scope it
//! was created in. Scopes are shared through [`EnvRef`] handles: the session
//! owns the root, every closure call creates one child of the closure's
//! captured scope, and that child lives for as long as some closure still
//! holds a handle to it.
//!
//! Values never leave an environment by reference: `lookup` returns a copy
//! and the `define_*` operations take ownership of what they store.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::EvalError;
use crate::datum::Datum;

/// Shared handle to an environment
pub type EnvRef = Rc<Environment>;

/// Environment for variable bindings
#[derive(Default)]
pub struct Environment {
    bindings: RefCell<HashMap<String, Datum>>,
    parent: Option<EnvRef>,
}

impl Environment {
    /// A fresh root scope with no bindings
    pub fn new_root() -> EnvRef {
        Rc::new(Environment::default())
    }

    /// A fresh empty scope whose lookups fall back to `parent`
    pub fn child(parent: &EnvRef) -> EnvRef {
        Rc::new(Environment {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    pub fn parent(&self) -> Option<&EnvRef> {
        self.parent.as_ref()
    }

    /// Resolve `name` in this scope, then in each ancestor in turn.
    pub fn lookup(&self, name: &str) -> Result<Datum, EvalError> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.bindings.borrow().get(name) {
                return Ok(value.clone());
            }
            match &scope.parent {
                Some(parent) => scope = parent.as_ref(),
                None => return Err(EvalError::UnboundSymbol(name.to_owned())),
            }
        }
    }

    /// Bind or rebind `name` in this scope only.
    pub fn define_local(&self, name: &str, value: Datum) {
        trace!(name, %value, "define local");
        self.bindings.borrow_mut().insert(name.to_owned(), value);
    }

    /// Bind or rebind `name` in the outermost scope of the chain.
    pub fn define_global(&self, name: &str, value: Datum) {
        self.root().define_local(name, value);
    }

    fn root(&self) -> &Environment {
        let mut scope = self;
        while let Some(parent) = &scope.parent {
            scope = parent.as_ref();
        }
        scope
    }

    /// Whether `name` is bound directly in this scope
    pub fn contains_local(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    /// A new scope with the same parent and a copy of every binding.
    ///
    /// Closures stored in the bindings keep sharing their own captured
    /// environments; only this scope's table is duplicated.
    pub fn duplicate(&self) -> EnvRef {
        Rc::new(Environment {
            bindings: RefCell::new(self.bindings.borrow().clone()),
            parent: self.parent.clone(),
        })
    }

    /// Get all bindings visible from this environment
    /// Returns a Vec of (name, value) pairs sorted by name; inner scopes shadow outer ones
    pub fn bindings(&self) -> Vec<(String, Datum)> {
        let mut visible = match &self.parent {
            Some(parent) => parent.bindings().into_iter().collect::<HashMap<_, _>>(),
            None => HashMap::new(),
        };

        for (name, value) in self.bindings.borrow().iter() {
            visible.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = visible.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("parent", &self.parent)
            .finish()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::datum::val;

    #[test]
    fn test_lookup_walks_parent_chain() {
        let root = Environment::new_root();
        root.define_local("x", val(1));
        let child = Environment::child(&root);
        let grandchild = Environment::child(&child);

        assert_eq!(grandchild.lookup("x").unwrap(), val(1));

        child.define_local("x", val(2));
        assert_eq!(grandchild.lookup("x").unwrap(), val(2));
        assert_eq!(root.lookup("x").unwrap(), val(1));
    }

    #[test]
    fn test_unbound_symbol() {
        let root = Environment::new_root();
        let child = Environment::child(&root);
        assert_eq!(
            child.lookup("missing").unwrap_err(),
            EvalError::UnboundSymbol("missing".to_owned())
        );
        assert_eq!(
            child.lookup("missing").unwrap_err().to_string(),
            "Unbound Symbol 'missing'"
        );
    }

    #[test]
    fn test_lookup_returns_copy() {
        let root = Environment::new_root();
        root.define_local("xs", val([1, 2]));

        let mut copy = root.lookup("xs").unwrap();
        if let Datum::Quoted(items) = &mut copy {
            items.clear();
        }
        assert_eq!(root.lookup("xs").unwrap(), val([1, 2]));
    }

    #[test]
    fn test_define_local_rebinds_in_place() {
        let root = Environment::new_root();
        let child = Environment::child(&root);
        child.define_local("y", val(1));
        child.define_local("y", val(2));

        assert_eq!(child.lookup("y").unwrap(), val(2));
        assert!(child.contains_local("y"));
        assert!(!root.contains_local("y"));
    }

    #[test]
    fn test_define_global_walks_to_root() {
        let root = Environment::new_root();
        let child = Environment::child(&root);
        let grandchild = Environment::child(&child);

        grandchild.define_global("z", val(9));

        assert!(root.contains_local("z"));
        assert!(!child.contains_local("z"));
        assert!(!grandchild.contains_local("z"));
        assert_eq!(root.lookup("z").unwrap(), val(9));
    }

    #[test]
    fn test_duplicate_copies_bindings_and_keeps_parent() {
        let root = Environment::new_root();
        root.define_local("g", val(0));
        let scope = Environment::child(&root);
        scope.define_local("a", val(1));

        let copy = scope.duplicate();
        assert!(Rc::ptr_eq(copy.parent().unwrap(), &root));
        assert_eq!(copy.lookup("a").unwrap(), val(1));
        assert_eq!(copy.lookup("g").unwrap(), val(0));

        copy.define_local("a", val(2));
        assert_eq!(scope.lookup("a").unwrap(), val(1));
    }

    #[test]
    fn test_bindings_are_sorted_and_shadowed() {
        let root = Environment::new_root();
        root.define_local("b", val(1));
        root.define_local("a", val(1));
        let child = Environment::child(&root);
        child.define_local("b", val(2));

        let names: Vec<(String, String)> = child
            .bindings()
            .into_iter()
            .map(|(name, value)| (name, value.to_string()))
            .collect();
        assert_eq!(
            names,
            vec![
                ("a".to_owned(), "1".to_owned()),
                ("b".to_owned(), "2".to_owned())
            ]
        );
    }
}
