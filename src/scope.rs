use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::heap::{Trace, Tracer};
use crate::symbol::SymbolId;
use crate::value::KonsValue;

pub type ScopeRef = Rc<Scope>;

/// A name's bound value and, for `deffun` definitions, the scope the
/// definition created.
#[derive(Clone, Debug)]
pub struct Binding {
    pub value: KonsValue,
    pub scope: Option<ScopeRef>,
}

/// A lexical scope. The parent link is weak: a scope never keeps its
/// parent alive. Children are registered weakly so the collector can reach
/// every live scope from the root.
pub struct Scope {
    parent: Weak<Scope>,
    bindings: RefCell<HashMap<SymbolId, Binding>>,
    children: RefCell<Vec<Weak<Scope>>>,
}

impl Scope {
    pub fn new_root() -> ScopeRef {
        Rc::new(Scope {
            parent: Weak::new(),
            bindings: RefCell::new(HashMap::new()),
            children: RefCell::new(Vec::new()),
        })
    }

    /// Create a child of this scope and register it for tracing.
    pub fn make_inner_scope(self: &Rc<Self>) -> ScopeRef {
        let child = Rc::new(Scope {
            parent: Rc::downgrade(self),
            bindings: RefCell::new(HashMap::new()),
            children: RefCell::new(Vec::new()),
        });
        self.children.borrow_mut().push(Rc::downgrade(&child));
        child
    }

    /// Bind `name` in this scope, replacing any existing local binding.
    pub fn define(&self, name: SymbolId, value: KonsValue, scope: Option<ScopeRef>) {
        self.bindings
            .borrow_mut()
            .insert(name, Binding { value, scope });
    }

    /// Look `name` up here, then in each ancestor.
    pub fn find(&self, name: SymbolId) -> Option<Binding> {
        if let Some(binding) = self.bindings.borrow().get(&name) {
            return Some(binding.clone());
        }
        self.parent.upgrade()?.find(name)
    }

    pub fn find_value(&self, name: SymbolId) -> Option<KonsValue> {
        self.find(name).map(|binding| binding.value)
    }

    pub fn parent(&self) -> Option<ScopeRef> {
        self.parent.upgrade()
    }

    pub fn has_parent(&self) -> bool {
        self.parent.strong_count() > 0
    }

    /// Number of registered children still alive.
    pub fn live_children(&self) -> usize {
        self.children
            .borrow()
            .iter()
            .filter(|child| child.strong_count() > 0)
            .count()
    }

    /// Number of registry entries, expired ones included.
    pub fn registered_children(&self) -> usize {
        self.children.borrow().len()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.borrow().len()
    }
}

impl Trace for Scope {
    fn trace(&self, tracer: &mut Tracer) {
        if !tracer.first_visit(self as *const Scope) {
            return;
        }

        let scopes: Vec<ScopeRef> = {
            let bindings = self.bindings.borrow();
            for binding in bindings.values() {
                tracer.mark(binding.value);
            }
            bindings
                .values()
                .filter_map(|binding| binding.scope.clone())
                .collect()
        };

        let children: Vec<ScopeRef> = {
            let mut registry = self.children.borrow_mut();
            registry.retain(|child| child.strong_count() > 0);
            registry.iter().filter_map(Weak::upgrade).collect()
        };

        for scope in scopes.iter().chain(children.iter()) {
            scope.trace(tracer);
        }
    }
}

/// The scope a lambda closes over, holding its whole ancestor chain.
/// Parent links are weak, so without the chain a frame whose own lambda
/// was collected would cut every closure made inside it off from the
/// enclosing scopes.
#[derive(Clone)]
pub struct CapturedScope {
    scope: ScopeRef,
    ancestors: Vec<ScopeRef>,
}

impl CapturedScope {
    pub fn new(scope: ScopeRef) -> Self {
        let mut ancestors = Vec::new();
        let mut current = scope.parent();
        while let Some(parent) = current {
            current = parent.parent();
            ancestors.push(parent);
        }
        CapturedScope { scope, ancestors }
    }

    pub fn scope(&self) -> &ScopeRef {
        &self.scope
    }

    /// Number of enclosing scopes held, the root included.
    pub fn depth(&self) -> usize {
        self.ancestors.len()
    }
}

impl Trace for CapturedScope {
    fn trace(&self, tracer: &mut Tracer) {
        self.scope.trace(tracer);
        for scope in &self.ancestors {
            scope.trace(tracer);
        }
    }
}

impl std::fmt::Debug for CapturedScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CapturedScope {{ {:?}, ancestors: {} }}", self.scope, self.depth())
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scope {{ bindings: {}, children: {} }}",
            self.binding_count(),
            self.registered_children()
        )
    }
}
