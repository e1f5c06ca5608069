use crate::error::{KonsError, KonsResult};
use crate::eval::Machine;
use crate::printer::print_val;
use crate::scope::ScopeRef;
use crate::symbol::{sym, SymbolId};
use crate::value::KonsValue;

/// Native contract: (machine, unevaluated argument list, calling scope).
pub type PrimFn = fn(&mut Machine, KonsValue, &ScopeRef) -> KonsResult<KonsValue>;

/// The primitives bound in every root scope.
pub const PRIMITIVES: &[(SymbolId, PrimFn)] = &[
    (sym::ADD, prim_add),
    (sym::MULTIPLY, prim_multiply),
    (sym::DEFFUN, prim_deffun),
    (sym::LAMBDA, prim_lambda),
    (sym::PROGN, prim_progn),
    (sym::QUOTE, prim_quote),
    (sym::IF, prim_if),
    (sym::CAR, prim_car),
    (sym::CDR, prim_cdr),
];

/// (add n...): sum of integer arguments, 0 when there are none.
pub fn prim_add(m: &mut Machine, args: KonsValue, scope: &ScopeRef) -> KonsResult<KonsValue> {
    integer_fold(m, args, scope, "add", 0, i64::checked_add)
}

/// (multiply n...): product of integer arguments, 1 when there are none.
pub fn prim_multiply(m: &mut Machine, args: KonsValue, scope: &ScopeRef) -> KonsResult<KonsValue> {
    integer_fold(m, args, scope, "multiply", 1, i64::checked_mul)
}

/// Evaluate each argument left to right and fold it into `identity`.
fn integer_fold(
    m: &mut Machine,
    args: KonsValue,
    scope: &ScopeRef,
    name: &str,
    identity: i64,
    op: fn(i64, i64) -> Option<i64>,
) -> KonsResult<KonsValue> {
    let mut acc = identity;
    let mut cell = args;
    while cell.is_pair() {
        let expr = m.heap.first(cell)?;
        let val = m.eval_in(expr, scope)?;
        let n = match m.heap.integer_value(val) {
            Some(n) => n,
            None => {
                return Err(KonsError::TypeError(format!(
                    "{} expects integers, got {}",
                    name,
                    print_val(val, &m.heap, &m.symbols)
                )))
            }
        };
        acc = op(acc, n).ok_or_else(|| KonsError::Overflow(name.to_string()))?;
        cell = m.heap.rest(cell)?;
    }
    if !cell.is_nil() {
        return Err(KonsError::Malformed(format!("{} arguments are not a proper list", name)));
    }
    m.heap.integer(acc)
}

/// (quote x): x, unevaluated.
pub fn prim_quote(m: &mut Machine, args: KonsValue, _scope: &ScopeRef) -> KonsResult<KonsValue> {
    if !args.is_pair() {
        return Err(KonsError::Malformed("quote needs an argument".into()));
    }
    m.heap.first(args)
}

/// (lambda params body...): a callable closing over the calling scope.
pub fn prim_lambda(m: &mut Machine, args: KonsValue, scope: &ScopeRef) -> KonsResult<KonsValue> {
    if !args.is_pair() {
        return Err(KonsError::Malformed("lambda needs a parameter list".into()));
    }
    let params = m.heap.first(args)?;
    let body = m.heap.rest(args)?;
    if !params.is_list() {
        return Err(KonsError::Malformed("lambda parameters must be a list".into()));
    }
    m.heap.lambda(params, body, scope.clone())
}

/// (deffun name params body...): bind a lambda in the calling scope.
/// The lambda closes over a fresh child of that scope.
pub fn prim_deffun(m: &mut Machine, args: KonsValue, scope: &ScopeRef) -> KonsResult<KonsValue> {
    let name = m.heap.first(args)?;
    if !name.is_symbol() {
        return Err(KonsError::Malformed("deffun needs a symbol name".into()));
    }
    let id = m
        .heap
        .name_id(name)
        .ok_or_else(|| KonsError::Internal("symbol without a name".into()))?;

    let tail = m.heap.rest(args)?;
    if !tail.is_pair() {
        return Err(KonsError::Malformed(format!(
            "deffun {} needs a parameter list",
            m.symbols.name(id)
        )));
    }
    let params = m.heap.first(tail)?;
    let body = m.heap.rest(tail)?;
    if !params.is_list() {
        return Err(KonsError::Malformed("deffun parameters must be a list".into()));
    }

    let inner = scope.make_inner_scope();
    let lambda = m.heap.lambda(params, body, inner.clone())?;
    scope.define(id, lambda, Some(inner));
    log::debug!(
        "deffun {} {}",
        m.symbols.name(id),
        print_val(params, &m.heap, &m.symbols)
    );
    Ok(lambda)
}

/// (progn body...): value of the last expression, nil when empty.
pub fn prim_progn(m: &mut Machine, args: KonsValue, scope: &ScopeRef) -> KonsResult<KonsValue> {
    m.eval_body(args, scope)
}

/// (if cond then else...): nil is false; the else part is a progn.
pub fn prim_if(m: &mut Machine, args: KonsValue, scope: &ScopeRef) -> KonsResult<KonsValue> {
    if !args.is_pair() {
        return Err(KonsError::Malformed("if needs a condition".into()));
    }
    let cond = m.heap.first(args)?;
    let branches = m.heap.rest(args)?;
    if !branches.is_pair() {
        return Err(KonsError::Malformed("if needs a then branch".into()));
    }
    let then = m.heap.first(branches)?;
    let otherwise = m.heap.rest(branches)?;

    if !m.eval_in(cond, scope)?.is_nil() {
        m.eval_in(then, scope)
    } else {
        m.eval_body(otherwise, scope)
    }
}

/// (car list)
pub fn prim_car(m: &mut Machine, args: KonsValue, scope: &ScopeRef) -> KonsResult<KonsValue> {
    let list = list_argument(m, args, scope, "car")?;
    m.heap.first(list)
}

/// (cdr list)
pub fn prim_cdr(m: &mut Machine, args: KonsValue, scope: &ScopeRef) -> KonsResult<KonsValue> {
    let list = list_argument(m, args, scope, "cdr")?;
    m.heap.rest(list)
}

/// Evaluate the single argument of car/cdr and require a proper list.
/// No argument reads as nil.
fn list_argument(
    m: &mut Machine,
    args: KonsValue,
    scope: &ScopeRef,
    name: &str,
) -> KonsResult<KonsValue> {
    if args.is_nil() {
        return Ok(KonsValue::Nil);
    }
    let expr = m.heap.first(args)?;
    let val = m.eval_in(expr, scope)?;
    if !m.heap.is_proper_list(val) {
        return Err(KonsError::TypeError(format!(
            "{} expects a list, got {}",
            name,
            print_val(val, &m.heap, &m.symbols)
        )));
    }
    Ok(val)
}
