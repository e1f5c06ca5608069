use std::rc::Rc;

use crate::error::{KonsError, KonsResult};
use crate::globals;
use crate::heap::{Heap, HeapConfig};
use crate::printer::print_val;
use crate::reader::read_one_at;
use crate::scope::ScopeRef;
use crate::symbol::{sym, SymbolTable};
use crate::value::{KonsValue, NativeFunction};

/// Nesting limit used by `Machine::with_defaults`.
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// The evaluation machine.
/// All interpreter state lives here so the collector can find roots.
pub struct Machine {
    pub heap: Heap,
    pub symbols: SymbolTable,

    /// The root scope. Lives as long as the machine and sits at the
    /// bottom of the heap's scope stack.
    pub globals: ScopeRef,

    /// Maximum number of nested evaluations.
    pub max_depth: usize,
    depth: usize,
}

impl Machine {
    pub fn new(config: HeapConfig, max_depth: usize) -> KonsResult<Self> {
        let mut heap = Heap::new(config);
        let symbols = SymbolTable::new();
        let globals = globals::build_globals(&mut heap, &symbols)?;

        Ok(Machine {
            heap,
            symbols,
            globals,
            max_depth,
            depth: 0,
        })
    }

    pub fn with_defaults() -> KonsResult<Self> {
        Self::new(HeapConfig::default(), DEFAULT_MAX_DEPTH)
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Evaluate a top-level form in the root scope. The form is rooted
    /// for the duration of the evaluation.
    pub fn eval(&mut self, expr: KonsValue) -> KonsResult<KonsValue> {
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("eval: {}", print_val(expr, &self.heap, &self.symbols));
        }
        let base = self.heap.push_root(expr);
        let globals = self.globals.clone();
        let result = self.eval_in(expr, &globals);
        self.heap.truncate_roots(base);
        result
    }

    /// Read and evaluate every form in `src`. Returns the value of the
    /// last one, or nil for empty input.
    pub fn eval_str(&mut self, src: &str) -> KonsResult<KonsValue> {
        let base = self.heap.root_height();
        let mut last = KonsValue::Nil;
        let mut pos = 0;
        let outcome = loop {
            let next = match read_one_at(src, pos, &mut self.heap, &mut self.symbols) {
                Ok(Some(next)) => next,
                Ok(None) => break Ok(last),
                Err(e) => break Err(e),
            };
            let (expr, new_pos) = next;
            pos = new_pos;
            match self.eval(expr) {
                Ok(val) => {
                    last = val;
                    self.heap.truncate_roots(base);
                    self.heap.push_root(last);
                }
                Err(e) => break Err(e),
            }
        };
        self.heap.truncate_roots(base);
        outcome
    }

    /// Evaluate `expr` in `scope`. The caller keeps `expr` reachable.
    pub fn eval_in(&mut self, expr: KonsValue, scope: &ScopeRef) -> KonsResult<KonsValue> {
        if self.depth >= self.max_depth {
            return Err(KonsError::DepthExceeded);
        }
        self.depth += 1;
        let result = self.eval_inner(expr, scope);
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: KonsValue, scope: &ScopeRef) -> KonsResult<KonsValue> {
        match expr {
            KonsValue::Nil => Ok(KonsValue::Nil),
            KonsValue::Pair(_) if self.heap.is_callable(expr) => Ok(expr),
            KonsValue::Pair(_) => self.eval_call(expr, scope),
            KonsValue::Symbol(_) => {
                let id = self
                    .heap
                    .name_id(expr)
                    .ok_or_else(|| KonsError::Internal("symbol without a name".into()))?;
                scope
                    .find_value(id)
                    .ok_or_else(|| KonsError::Unbound(self.symbols.name(id).to_string()))
            }
            _ => Ok(expr),
        }
    }

    /// Evaluate each expression of `body` in order; the last value wins.
    pub fn eval_body(&mut self, body: KonsValue, scope: &ScopeRef) -> KonsResult<KonsValue> {
        let mut result = KonsValue::Nil;
        let mut current = body;
        while current.is_pair() {
            let expr = self.heap.first(current)?;
            result = self.eval_in(expr, scope)?;
            current = self.heap.rest(current)?;
        }
        if !current.is_nil() {
            return Err(KonsError::Malformed("body is not a proper list".into()));
        }
        Ok(result)
    }

    // ========================================================================
    // Calls
    // ========================================================================

    fn eval_call(&mut self, form: KonsValue, scope: &ScopeRef) -> KonsResult<KonsValue> {
        let head = self.heap.first(form)?;
        let args = self.heap.rest(form)?;

        let func = self.eval_in(head, scope)?;
        let base = self.heap.push_root(func);
        let result = self.apply(func, args, scope);
        self.heap.truncate_roots(base);
        result
    }

    /// Invoke a callable with an unevaluated argument list.
    pub fn apply(
        &mut self,
        func: KonsValue,
        args: KonsValue,
        scope: &ScopeRef,
    ) -> KonsResult<KonsValue> {
        if let Some(native) = self.heap.native_function(func) {
            let f = native.func.clone();
            return f(self, args, scope);
        }
        if self.heap.is_callable(func) {
            return self.apply_lambda(func, args, scope);
        }
        Err(KonsError::NotCallable(print_val(func, &self.heap, &self.symbols)))
    }

    /// Call a lambda `(params . body)`.
    ///
    /// Each argument cell's `first` is overwritten with its evaluated value
    /// before binding. Evaluating the same call site again sees the values,
    /// not the original expressions.
    fn apply_lambda(
        &mut self,
        func: KonsValue,
        args: KonsValue,
        scope: &ScopeRef,
    ) -> KonsResult<KonsValue> {
        let (params, body, captured) = {
            let cons = self
                .heap
                .pair(func)
                .ok_or_else(|| KonsError::Internal("lambda is not a pair".into()))?;
            let captured = cons
                .captured
                .as_ref()
                .map(|captured| captured.scope().clone())
                .ok_or_else(|| KonsError::Internal("lambda without a captured scope".into()))?;
            (cons.first, cons.rest, captured)
        };

        let mut cell = args;
        while cell.is_pair() {
            let expr = self.heap.first(cell)?;
            let val = self.eval_in(expr, scope)?;
            self.heap.set_first(cell, val)?;
            cell = self.heap.rest(cell)?;
        }
        if !cell.is_nil() {
            return Err(KonsError::Malformed("argument list is not a proper list".into()));
        }

        let frame = captured.make_inner_scope();
        self.bind_parameters(params, args, &frame)?;

        self.heap.enter_scope(frame.clone());
        let result = self.eval_body(body, &frame);
        self.heap.leave_scope();
        result
    }

    /// Walk parameters and evaluated arguments in lock-step.
    /// `&rest name` binds the remaining arguments and ends binding.
    fn bind_parameters(
        &mut self,
        params: KonsValue,
        args: KonsValue,
        frame: &ScopeRef,
    ) -> KonsResult<()> {
        let mut params = params;
        let mut args = args;
        loop {
            match params {
                KonsValue::Nil => return Ok(()),
                KonsValue::Pair(_) => {}
                _ => return Err(KonsError::Malformed("parameter list is not a proper list".into())),
            }

            let param = self.heap.first(params)?;
            match param {
                KonsValue::Symbol(_) => {
                    let id = self.name_of(param)?;
                    if !args.is_pair() {
                        return Err(KonsError::UnderArgs(self.symbols.name(id).to_string()));
                    }
                    frame.define(id, self.heap.first(args)?, None);
                    args = self.heap.rest(args)?;
                    params = self.heap.rest(params)?;
                }
                KonsValue::Keyword(_) => {
                    let mode = self.name_of(param)?;
                    if mode != sym::REST {
                        return Err(KonsError::Malformed(format!(
                            "unknown parameter keyword {}",
                            self.symbols.name(mode)
                        )));
                    }
                    let target = self.heap.first(self.heap.rest(params)?)?;
                    if !target.is_symbol() {
                        return Err(KonsError::Malformed("&rest must be followed by a symbol".into()));
                    }
                    frame.define(self.name_of(target)?, args, None);
                    return Ok(());
                }
                other => {
                    return Err(KonsError::Malformed(format!(
                        "parameter {} is not a symbol",
                        print_val(other, &self.heap, &self.symbols)
                    )))
                }
            }
        }
    }

    fn name_of(&self, value: KonsValue) -> KonsResult<crate::symbol::SymbolId> {
        self.heap
            .name_id(value)
            .ok_or_else(|| KonsError::Internal("expected a symbol or keyword".into()))
    }

    // ========================================================================
    // Host API
    // ========================================================================

    /// Bind a host function in the root scope. It receives the raw
    /// argument list and the calling scope.
    pub fn define_native<F>(&mut self, name: &str, f: F) -> KonsResult<KonsValue>
    where
        F: Fn(&mut Machine, KonsValue, &ScopeRef) -> KonsResult<KonsValue> + 'static,
    {
        let id = self.symbols.intern(name);
        let val = self.heap.native(NativeFunction {
            name: id,
            func: Rc::new(f),
        })?;
        self.globals.define(id, val, None);
        Ok(val)
    }

    /// Bind a value in the root scope.
    pub fn define_global(&mut self, name: &str, val: KonsValue) {
        let id = self.symbols.intern(name);
        self.globals.define(id, val, None);
    }

    /// Look a name up in the root scope.
    pub fn global(&self, name: &str) -> Option<KonsValue> {
        let id = self.symbols.lookup(name)?;
        self.globals.find_value(id)
    }

    /// Force a full collection.
    pub fn collect(&mut self) -> usize {
        self.heap.collect()
    }

    /// Current evaluation nesting.
    pub fn depth(&self) -> usize {
        self.depth
    }
}
