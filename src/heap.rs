use std::collections::HashSet;

use crate::error::{KonsError, KonsResult};
use crate::page::Page;
use crate::scope::{CapturedScope, ScopeRef};
use crate::symbol::SymbolId;
use crate::value::{Cons, FloatLiteral, KonsValue, NativeFunction, Node, NodeId, NodeKind};

/// Heap sizing knobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeapConfig {
    /// Slots per page.
    pub page_capacity: usize,
    /// A collection that reclaims fewer nodes than this adds a page.
    pub grow_threshold: usize,
    /// Upper bound on the total number of pages, if any.
    pub max_pages: Option<usize>,
}

impl Default for HeapConfig {
    fn default() -> Self {
        HeapConfig {
            page_capacity: 128,
            grow_threshold: 100,
            max_pages: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    pub collections: usize,
    pub total_reclaimed: usize,
    pub total_allocated: usize,
    pub pages: usize,
}

/// Something the collector can walk to find live values.
pub trait Trace {
    fn trace(&self, tracer: &mut Tracer);
}

/// Mark-phase state: pending values plus the scopes already walked.
pub struct Tracer {
    worklist: Vec<KonsValue>,
    visited: HashSet<*const ()>,
}

impl Tracer {
    fn new() -> Self {
        Tracer {
            worklist: Vec::new(),
            visited: HashSet::new(),
        }
    }

    /// Queue a value as reachable.
    pub fn mark(&mut self, value: KonsValue) {
        if !value.is_nil() {
            self.worklist.push(value);
        }
    }

    /// Returns true the first time an object is seen in this cycle.
    pub fn first_visit<T>(&mut self, object: *const T) -> bool {
        self.visited.insert(object as *const ())
    }
}

struct PageEntry {
    kind: NodeKind,
    page: Page<Node>,
}

/// The node heap: kind-segregated pages plus the root set.
/// All values are allocated here and reclaimed by full mark-sweep
/// collections that run inside `alloc` when a kind's pages are full.
pub struct Heap {
    pages: Vec<PageEntry>,
    /// Page indices per node kind.
    by_kind: [Vec<u32>; NodeKind::COUNT],
    /// Shadow stack of values held by native frames.
    roots: Vec<KonsValue>,
    /// Shadow stack of scopes being evaluated; the bottom one is the root scope.
    scope_roots: Vec<ScopeRef>,
    config: HeapConfig,
    stats: GcStats,
}

impl Heap {
    pub fn new(config: HeapConfig) -> Self {
        Heap {
            pages: Vec::new(),
            by_kind: Default::default(),
            roots: Vec::new(),
            scope_roots: Vec::new(),
            config,
            stats: GcStats::default(),
        }
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    // === Allocation ===

    /// Allocate a node. May run a full collection first; the children of
    /// `node` are treated as roots during that collection.
    pub fn alloc(&mut self, node: Node) -> KonsResult<KonsValue> {
        let kind = node.kind();
        self.stats.total_allocated += 1;

        let node = match self.try_construct(node) {
            Ok(value) => return Ok(value),
            Err(node) => node,
        };

        if self.by_kind[kind.index()].is_empty() {
            self.add_page(kind)?;
        } else {
            let reclaimed = self.collect_with(Some(&node));
            if reclaimed < self.config.grow_threshold {
                self.add_page(kind)?;
            }
        }

        let node = match self.try_construct(node) {
            Ok(value) => return Ok(value),
            Err(node) => node,
        };

        // The collection freed other kinds but not this one.
        self.add_page(kind)?;
        self.try_construct(node)
            .map_err(|_| KonsError::Internal("fresh page rejected an allocation".into()))
    }

    fn try_construct(&mut self, node: Node) -> Result<KonsValue, Node> {
        let kind = node.kind();
        let mut node = node;
        for &page_index in &self.by_kind[kind.index()] {
            let entry = &mut self.pages[page_index as usize];
            if entry.page.is_full() {
                continue;
            }
            match entry.page.construct(node) {
                Ok(slot) => {
                    return Ok(kind.handle(NodeId {
                        page: page_index,
                        slot,
                    }))
                }
                Err(back) => node = back,
            }
        }
        Err(node)
    }

    fn add_page(&mut self, kind: NodeKind) -> KonsResult<()> {
        if let Some(max) = self.config.max_pages {
            if self.pages.len() >= max {
                return Err(KonsError::HeapExhausted);
            }
        }
        let index = self.pages.len() as u32;
        self.pages.push(PageEntry {
            kind,
            page: Page::new(self.config.page_capacity),
        });
        self.by_kind[kind.index()].push(index);
        self.stats.pages = self.pages.len();
        log::trace!("gc: added {:?} page #{}", kind, index);
        Ok(())
    }

    /// Allocate a new cons cell.
    pub fn cons(&mut self, first: KonsValue, rest: KonsValue) -> KonsResult<KonsValue> {
        self.alloc(Node::Pair(Cons::new(first, rest)))
    }

    /// Allocate a callable cons `(params . body)` closing over `captured`.
    pub fn lambda(
        &mut self,
        params: KonsValue,
        body: KonsValue,
        captured: ScopeRef,
    ) -> KonsResult<KonsValue> {
        self.alloc(Node::Pair(Cons {
            first: params,
            rest: body,
            callable: true,
            captured: Some(CapturedScope::new(captured)),
        }))
    }

    pub fn symbol(&mut self, id: SymbolId) -> KonsResult<KonsValue> {
        self.alloc(Node::Symbol(id))
    }

    pub fn keyword(&mut self, id: SymbolId) -> KonsResult<KonsValue> {
        self.alloc(Node::Keyword(id))
    }

    pub fn integer(&mut self, n: i64) -> KonsResult<KonsValue> {
        self.alloc(Node::Integer(n))
    }

    pub fn float(&mut self, literal: FloatLiteral) -> KonsResult<KonsValue> {
        self.alloc(Node::Float(literal))
    }

    pub fn native(&mut self, function: NativeFunction) -> KonsResult<KonsValue> {
        self.alloc(Node::NativeFunction(function))
    }

    /// Build a proper list from a slice of values.
    pub fn list(&mut self, values: &[KonsValue]) -> KonsResult<KonsValue> {
        let base = self.roots.len();
        self.roots.extend_from_slice(values);
        let result = self.list_rooted(values);
        self.roots.truncate(base);
        result
    }

    fn list_rooted(&mut self, values: &[KonsValue]) -> KonsResult<KonsValue> {
        let mut result = KonsValue::Nil;
        for &value in values.iter().rev() {
            result = self.cons(value, result)?;
            // The partial list is held only by `result` between allocations.
            self.roots.push(result);
        }
        Ok(result)
    }

    // === Access ===

    /// Node behind a handle, or None for nil and dangling handles.
    pub fn get(&self, value: KonsValue) -> Option<&Node> {
        let id = value.node_id()?;
        let entry = self.pages.get(id.page as usize)?;
        if Some(entry.kind) != value.node_kind() {
            return None;
        }
        entry.page.get(id.slot)
    }

    fn get_mut(&mut self, value: KonsValue) -> Option<&mut Node> {
        let id = value.node_id()?;
        let entry = self.pages.get_mut(id.page as usize)?;
        if Some(entry.kind) != value.node_kind() {
            return None;
        }
        entry.page.get_mut(id.slot)
    }

    /// Whether a handle still refers to a live node. Nil is always live.
    pub fn contains(&self, value: KonsValue) -> bool {
        value.is_nil() || self.get(value).is_some()
    }

    pub fn pair(&self, value: KonsValue) -> Option<&Cons> {
        match self.get(value)? {
            Node::Pair(cons) => Some(cons),
            _ => None,
        }
    }

    fn pair_mut(&mut self, value: KonsValue) -> KonsResult<&mut Cons> {
        match self.get_mut(value) {
            Some(Node::Pair(cons)) => Ok(cons),
            _ => Err(dangling(value)),
        }
    }

    /// `first` of a pair, nil of nil.
    pub fn first(&self, value: KonsValue) -> KonsResult<KonsValue> {
        match value {
            KonsValue::Nil => Ok(KonsValue::Nil),
            KonsValue::Pair(_) => self.pair(value).map(|c| c.first).ok_or_else(|| dangling(value)),
            _ => Err(KonsError::TypeError("first of a non-list atom".into())),
        }
    }

    /// `rest` of a pair, nil of nil.
    pub fn rest(&self, value: KonsValue) -> KonsResult<KonsValue> {
        match value {
            KonsValue::Nil => Ok(KonsValue::Nil),
            KonsValue::Pair(_) => self.pair(value).map(|c| c.rest).ok_or_else(|| dangling(value)),
            _ => Err(KonsError::TypeError("rest of a non-list atom".into())),
        }
    }

    #[inline]
    pub fn set_first(&mut self, pair: KonsValue, value: KonsValue) -> KonsResult<()> {
        self.pair_mut(pair)?.first = value;
        Ok(())
    }

    #[inline]
    pub fn set_rest(&mut self, pair: KonsValue, value: KonsValue) -> KonsResult<()> {
        self.pair_mut(pair)?.rest = value;
        Ok(())
    }

    /// True for native functions and for pairs built by `lambda`/`deffun`.
    pub fn is_callable(&self, value: KonsValue) -> bool {
        match value {
            KonsValue::NativeFunction(_) => true,
            KonsValue::Pair(_) => self.pair(value).map(|c| c.callable).unwrap_or(false),
            _ => false,
        }
    }

    pub fn integer_value(&self, value: KonsValue) -> Option<i64> {
        match self.get(value)? {
            Node::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn float_literal(&self, value: KonsValue) -> Option<&FloatLiteral> {
        match self.get(value)? {
            Node::Float(literal) => Some(literal),
            _ => None,
        }
    }

    /// Interned name of a symbol or keyword.
    pub fn name_id(&self, value: KonsValue) -> Option<SymbolId> {
        match self.get(value)? {
            Node::Symbol(id) | Node::Keyword(id) => Some(*id),
            _ => None,
        }
    }

    pub fn native_function(&self, value: KonsValue) -> Option<&NativeFunction> {
        match self.get(value)? {
            Node::NativeFunction(function) => Some(function),
            _ => None,
        }
    }

    /// Returns true if this value is a proper list.
    pub fn is_proper_list(&self, value: KonsValue) -> bool {
        let mut current = value;
        loop {
            match current {
                KonsValue::Nil => return true,
                KonsValue::Pair(_) => match self.pair(current) {
                    Some(cons) => current = cons.rest,
                    None => return false,
                },
                _ => return false,
            }
        }
    }

    /// Collect a proper list into a Vec. Returns None if not a proper list.
    pub fn list_to_vec(&self, value: KonsValue) -> Option<Vec<KonsValue>> {
        let mut result = Vec::new();
        let mut current = value;
        loop {
            match current {
                KonsValue::Nil => return Some(result),
                KonsValue::Pair(_) => {
                    let cons = self.pair(current)?;
                    result.push(cons.first);
                    current = cons.rest;
                }
                _ => return None,
            }
        }
    }

    // === Roots ===

    /// Push a value on the root shadow stack. Returns the stack height
    /// before the push, for `truncate_roots`.
    pub fn push_root(&mut self, value: KonsValue) -> usize {
        let height = self.roots.len();
        self.roots.push(value);
        height
    }

    pub fn root_height(&self) -> usize {
        self.roots.len()
    }

    /// Pop the root shadow stack back to `height`.
    pub fn truncate_roots(&mut self, height: usize) {
        self.roots.truncate(height);
    }

    /// Register a scope as live for the duration of its evaluation.
    pub fn enter_scope(&mut self, scope: ScopeRef) {
        self.scope_roots.push(scope);
    }

    pub fn leave_scope(&mut self) {
        self.scope_roots.pop();
    }

    // === GC ===

    /// Run a full collection now. Returns the number of nodes reclaimed.
    pub fn collect(&mut self) -> usize {
        self.collect_with(None)
    }

    fn collect_with(&mut self, pending: Option<&Node>) -> usize {
        for entry in &mut self.pages {
            entry.page.clear_marks();
        }

        let mut tracer = Tracer::new();
        for &root in &self.roots {
            tracer.mark(root);
        }
        if let Some(node) = pending {
            for child in node.children() {
                tracer.mark(child);
            }
            if let Node::Pair(Cons {
                captured: Some(scope),
                ..
            }) = node
            {
                scope.trace(&mut tracer);
            }
        }
        for scope in &self.scope_roots {
            scope.trace(&mut tracer);
        }

        self.process_worklist(&mut tracer);
        let reclaimed = self.sweep();

        self.stats.collections += 1;
        self.stats.total_reclaimed += reclaimed;
        log::debug!(
            "gc: full collect #{} reclaimed {} nodes, {} live in {} pages",
            self.stats.collections,
            reclaimed,
            self.live_count(),
            self.pages.len()
        );
        reclaimed
    }

    /// Mark everything reachable from the queued values.
    fn process_worklist(&mut self, tracer: &mut Tracer) {
        while let Some(value) = tracer.worklist.pop() {
            let Some(id) = value.node_id() else { continue };
            let Some(entry) = self.pages.get_mut(id.page as usize) else {
                continue;
            };
            if Some(entry.kind) != value.node_kind() || !entry.page.mark(id.slot) {
                continue;
            }
            if let Some(Node::Pair(cons)) = entry.page.get(id.slot) {
                tracer.mark(cons.first);
                tracer.mark(cons.rest);
                if let Some(scope) = &cons.captured {
                    scope.trace(tracer);
                }
            }
        }
    }

    /// Sweep every page. Returns the number of nodes dropped.
    fn sweep(&mut self) -> usize {
        self.pages.iter_mut().map(|entry| entry.page.sweep()).sum()
    }

    // === Introspection ===

    /// Number of live nodes (accurate at all times).
    pub fn live_count(&self) -> usize {
        self.pages.iter().map(|entry| entry.page.len()).sum()
    }

    /// Live nodes of one kind.
    pub fn live_count_of(&self, kind: NodeKind) -> usize {
        self.by_kind[kind.index()]
            .iter()
            .map(|&i| self.pages[i as usize].page.len())
            .sum()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_count_of(&self, kind: NodeKind) -> usize {
        self.by_kind[kind.index()].len()
    }

    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// The current scope roots, bottom first.
    pub fn scope_roots(&self) -> &[ScopeRef] {
        &self.scope_roots
    }
}

fn dangling(value: KonsValue) -> KonsError {
    KonsError::Internal(format!("dangling or mistyped handle {:?}", value))
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new(HeapConfig::default())
    }
}
