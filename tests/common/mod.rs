//! Shared test helpers.

use std::cell::RefCell;
use std::rc::Rc;

use kons::error::{KonsError, KonsResult};
use kons::eval::Machine;
use kons::heap::HeapConfig;
use kons::printer;
use kons::scope::ScopeRef;
use kons::value::{KonsValue, NativeFunction};

#[allow(dead_code)]
/// A machine with the default heap and depth limit.
pub fn machine() -> Machine {
    Machine::with_defaults().unwrap()
}

#[allow(dead_code)]
/// A machine whose pages are small enough that ordinary programs
/// trigger collections.
pub fn small_machine(page_capacity: usize) -> Machine {
    Machine::new(
        HeapConfig {
            page_capacity,
            grow_threshold: 1,
            max_pages: None,
        },
        256,
    )
    .unwrap()
}

#[allow(dead_code)]
/// Evaluate every form in `src` on a fresh machine and print the last value.
pub fn eval_source(src: &str) -> Result<String, KonsError> {
    let mut m = machine();
    eval_on(&mut m, src)
}

#[allow(dead_code)]
/// Evaluate on an existing machine and print the last value.
pub fn eval_on(m: &mut Machine, src: &str) -> Result<String, KonsError> {
    let val = m.eval_str(src)?;
    Ok(printer::print_val(val, &m.heap, &m.symbols))
}

#[allow(dead_code)]
/// Evaluate on a fresh machine and describe the last value with its kind.
pub fn describe_source(src: &str) -> Result<String, KonsError> {
    let mut m = machine();
    let val = m.eval_str(src)?;
    Ok(printer::describe(val, &m.heap, &m.symbols))
}

#[allow(dead_code)]
/// Records its id when dropped.
pub struct DropGuard {
    id: usize,
    log: Rc<RefCell<Vec<usize>>>,
}

impl Drop for DropGuard {
    fn drop(&mut self) {
        self.log.borrow_mut().push(self.id);
    }
}

#[allow(dead_code)]
/// Allocate a native function whose closure owns a drop guard. The node
/// is not rooted.
pub fn guarded_native(m: &mut Machine, id: usize, log: &Rc<RefCell<Vec<usize>>>) -> KonsValue {
    let guard = DropGuard {
        id,
        log: log.clone(),
    };
    let name = m.symbols.intern(&format!("guarded{}", id));
    m.heap
        .native(NativeFunction {
            name,
            func: Rc::new(
                move |_: &mut Machine, _: KonsValue, _: &ScopeRef| -> KonsResult<KonsValue> {
                    let _held = &guard;
                    Ok(KonsValue::Nil)
                },
            ),
        })
        .unwrap()
}
