use std::rc::Rc;

use crate::error::KonsResult;
use crate::heap::Heap;
use crate::primitives::PRIMITIVES;
use crate::scope::{Scope, ScopeRef};
use crate::symbol::SymbolTable;
use crate::value::NativeFunction;

/// Build the root scope with every primitive pre-bound as a native
/// function under its own name. The scope is registered as the heap's
/// bottom scope root before anything is allocated.
pub fn build_globals(heap: &mut Heap, symbols: &SymbolTable) -> KonsResult<ScopeRef> {
    let root = Scope::new_root();
    heap.enter_scope(root.clone());

    for &(name, func) in PRIMITIVES {
        let native = heap.native(NativeFunction {
            name,
            func: Rc::new(func),
        })?;
        root.define(name, native, None);
        log::trace!("globals: bound native {}", symbols.name(name));
    }

    Ok(root)
}
