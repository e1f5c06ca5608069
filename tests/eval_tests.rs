mod common;

use std::cell::Cell;
use std::rc::Rc;

use common::{describe_source, eval_on, eval_source, machine};
use kons::error::KonsError;
use kons::eval::Machine;
use kons::heap::HeapConfig;
use kons::printer::print_val;
use kons::reader::read_str;
use kons::value::KonsValue;

fn ok(src: &str) -> String {
    eval_source(src).unwrap_or_else(|e| panic!("{:?} failed: {}", src, e))
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn add_and_multiply_fold() {
    assert_eq!(ok("(add 1 2 3 4)"), "10");
    assert_eq!(ok("(multiply 2 3 4)"), "24");
    assert_eq!(ok("(add (multiply 2 3) (add 1 1))"), "8");
    assert_eq!(ok("(add -3 #16 a)"), "7");
}

#[test]
fn empty_folds_return_the_identity() {
    assert_eq!(describe_source("(add)").unwrap(), "0: int");
    assert_eq!(describe_source("(multiply)").unwrap(), "1: int");
}

#[test]
fn arithmetic_rejects_non_integers() {
    assert!(matches!(eval_source("(add 1 2.5)"), Err(KonsError::TypeError(_))));
    assert!(matches!(eval_source("(multiply 2 (quote a))"), Err(KonsError::TypeError(_))));
    assert!(matches!(eval_source("(add 1 ())"), Err(KonsError::TypeError(_))));
}

#[test]
fn arithmetic_overflow_is_reported() {
    assert_eq!(
        eval_source("(multiply 4611686018427387904 2)"),
        Err(KonsError::Overflow("multiply".into()))
    );
    assert_eq!(
        eval_source("(add 9223372036854775807 1)"),
        Err(KonsError::Overflow("add".into()))
    );
}

// ============================================================================
// Special forms
// ============================================================================

#[test]
fn quote_does_not_evaluate() {
    assert_eq!(ok("(quote (1 2 3))"), "(1 2 3)");
    assert_eq!(ok("(quote (nowhere to be found))"), "(nowhere to be found)");
    assert_eq!(describe_source("(quote x)").unwrap(), "x: symbol");
}

#[test]
fn if_picks_a_branch() {
    assert_eq!(ok("(if () 1 2)"), "2");
    assert_eq!(ok("(if 1 2 3)"), "2");
    assert_eq!(ok("(if () 1)"), "()");
    assert_eq!(ok("(if () 1 2 3)"), "3");
    assert_eq!(ok("(if (quote (a)) (quote yes) unbound)"), "yes");
}

#[test]
fn progn_returns_the_last_value() {
    assert_eq!(ok("(progn 1 2 3)"), "3");
    assert_eq!(ok("(progn)"), "()");
}

#[test]
fn car_and_cdr() {
    assert_eq!(ok("(car (quote (1 2 3)))"), "1");
    assert_eq!(ok("(cdr (quote (1 2 3)))"), "(2 3)");
    assert_eq!(ok("(car ())"), "()");
    assert_eq!(ok("(cdr ())"), "()");
    assert_eq!(ok("(car)"), "()");
    assert_eq!(ok("(car (cdr (quote (1 (2 3)))))"), "(2 3)");
}

#[test]
fn car_requires_a_proper_list() {
    assert!(matches!(eval_source("(car 1)"), Err(KonsError::TypeError(_))));
    assert!(matches!(eval_source("(cdr (quote (1 . 2)))"), Err(KonsError::TypeError(_))));
}

#[test]
fn atoms_evaluate_to_themselves() {
    assert_eq!(describe_source("3.4").unwrap(), "3.4: float");
    assert_eq!(describe_source("&rest").unwrap(), "&rest: keyword");
    assert_eq!(describe_source("()").unwrap(), "(): nil");
    assert_eq!(describe_source("add").unwrap(), "#<native add>: native-function");
}

// ============================================================================
// Functions
// ============================================================================

#[test]
fn deffun_and_nested_calls() {
    assert_eq!(ok("(deffun tasu (a b) (add a b)) (tasu 1 (tasu 2 3))"), "6");
}

#[test]
fn deffun_returns_the_lambda() {
    assert_eq!(
        describe_source("(deffun tasu (a b) (add a b))").unwrap(),
        "#<lambda (a b)>: lambda"
    );
}

#[test]
fn rest_parameters_collect_the_remaining_arguments() {
    assert_eq!(
        describe_source("(deffun list (&rest objects) objects) (list (quote a) (quote b) 123)")
            .unwrap(),
        "( a: symbol b: symbol 123: int ): list"
    );
    assert_eq!(ok("(deffun tail (x &rest more) more) (tail 1 2 3)"), "(2 3)");
    assert_eq!(ok("(deffun tail (x &rest more) more) (tail 1)"), "()");
    assert_eq!(ok("(deffun first (&rest xs ignored) xs) (first 1 2)"), "(1 2)");
}

#[test]
fn anonymous_lambdas() {
    assert_eq!(ok("((lambda (x y) (multiply x y)) 6 7)"), "42");
    assert_eq!(ok("((lambda () 5))"), "5");
    assert_eq!(ok("((lambda (x) 1 2 x) 3)"), "3");
    assert_eq!(ok("((lambda (x)) 3)"), "()");
}

#[test]
fn lambdas_are_self_evaluating() {
    let mut m = machine();
    let f = m.eval_str("(lambda (x) x)").unwrap();
    assert!(m.heap.is_callable(f));
    assert_eq!(m.eval(f), Ok(f));
}

#[test]
fn closures_capture_their_defining_scope() {
    let src = "
        (deffun make (n) (lambda (x) (add x n)))
        (deffun call (f v) (f v))
        (call (make 10) 5)";
    assert_eq!(ok(src), "15");
}

#[test]
fn scope_is_lexical_not_dynamic() {
    let src = "
        (deffun getx () x)
        (deffun callit (x) (getx))
        (callit 5)";
    assert_eq!(eval_source(src), Err(KonsError::Unbound("x".into())));
}

#[test]
fn parameters_shadow_globals() {
    let src = "
        (deffun add2 (add) add)
        (add2 7)";
    assert_eq!(ok(src), "7");
    assert_eq!(ok("(deffun add2 (add) add) (add2 7) (add 1 1)"), "2");
}

#[test]
fn extra_arguments_are_ignored() {
    assert_eq!(ok("(deffun one (a) a) (one 1 2 3)"), "1");
}

#[test]
fn redefinition_replaces_the_binding() {
    assert_eq!(ok("(deffun f () 1) (deffun f () 2) (f)"), "2");
}

// ============================================================================
// Argument rewriting
// ============================================================================

#[test]
fn call_site_arguments_are_rewritten_in_place() {
    let mut m = machine();
    m.eval_str("(deffun id (x) x)").unwrap();

    let form = read_str("(id (add 1 2))", &mut m.heap, &mut m.symbols).unwrap();
    m.heap.push_root(form);
    assert_eq!(print_val(form, &m.heap, &m.symbols), "(id (add 1 2))");

    let val = m.eval(form).unwrap();
    assert_eq!(m.heap.integer_value(val), Some(3));
    assert_eq!(print_val(form, &m.heap, &m.symbols), "(id 3)");
}

#[test]
fn reevaluating_a_call_site_does_not_rerun_side_effects() {
    let mut m = machine();
    let count = Rc::new(Cell::new(0));
    let counter = count.clone();
    m.define_native("tick", move |m, _args, _scope| {
        counter.set(counter.get() + 1);
        m.heap.integer(counter.get())
    })
    .unwrap();

    assert_eq!(eval_on(&mut m, "(deffun id (x) x) (deffun run () (id (tick)))"), Ok("#<lambda ()>".into()));
    assert_eq!(eval_on(&mut m, "(run)"), Ok("1".into()));
    assert_eq!(eval_on(&mut m, "(run)"), Ok("1".into()));
    assert_eq!(count.get(), 1);

    // Natives see their arguments unevaluated, so nothing is rewritten.
    assert_eq!(eval_on(&mut m, "(deffun direct () (add (tick)))"), Ok("#<lambda ()>".into()));
    assert_eq!(eval_on(&mut m, "(direct)"), Ok("2".into()));
    assert_eq!(eval_on(&mut m, "(direct)"), Ok("3".into()));
}

#[test]
fn rewritten_quoted_arguments_are_looked_up_next_time() {
    let src = "
        (deffun id (x) x)
        (deffun sym () (id (quote a)))
        (sym)";
    assert_eq!(ok(src), "a");
    assert_eq!(
        eval_source(&format!("{} (sym)", src)),
        Err(KonsError::Unbound("a".into()))
    );
}

// ============================================================================
// Faults
// ============================================================================

#[test]
fn unbound_symbols() {
    let err = eval_source("(nothing 1)").unwrap_err();
    assert_eq!(err, KonsError::Unbound("nothing".into()));
    assert_eq!(err.to_string(), "Error: symbol 'nothing' was not found");
    assert!(err.is_fault());
}

#[test]
fn calling_a_non_callable() {
    assert_eq!(eval_source("(1 2)"), Err(KonsError::NotCallable("1".into())));
    assert_eq!(
        eval_source("((quote (a b)) 1)"),
        Err(KonsError::NotCallable("(a b)".into()))
    );
}

#[test]
fn missing_arguments() {
    assert_eq!(
        eval_source("(deffun f (a b) a) (f 1)"),
        Err(KonsError::UnderArgs("b".into()))
    );
    for src in ["(quote)", "(if)", "(if 1)", "(if ())", "(progn (if (quote a)) 2)"] {
        assert!(
            matches!(eval_source(src), Err(KonsError::Malformed(_))),
            "{:?}",
            src
        );
    }
}

#[test]
fn malformed_parameter_lists() {
    for src in [
        "(deffun f (&key a) a) (f 1)",
        "(deffun f (&rest) 1) (f)",
        "(deffun f (1) 1) (f 2)",
        "(deffun f a a)",
        "(deffun 1 () 1)",
        "(lambda)",
    ] {
        assert!(
            matches!(eval_source(src), Err(KonsError::Malformed(_))),
            "{:?}",
            src
        );
    }
}

#[test]
fn depth_limit() {
    let mut m = Machine::new(HeapConfig::default(), 40).unwrap();
    let result = m.eval_str("(deffun deep (a) (deep a)) (deep 1)");
    assert_eq!(result, Err(KonsError::DepthExceeded));
    assert_eq!(m.depth(), 0);
    assert_eq!(m.heap.scope_roots().len(), 1);
    assert_eq!(m.heap.root_height(), 0);

    // The machine is still usable afterwards.
    assert_eq!(eval_on(&mut m, "(add 1 2)"), Ok("3".into()));
}

#[test]
fn faults_leave_the_root_stacks_balanced() {
    let mut m = machine();
    m.eval_str("(deffun f (a) (add a (quote x)))").unwrap();
    assert!(matches!(m.eval_str("(f 1)"), Err(KonsError::TypeError(_))));
    assert_eq!(m.heap.root_height(), 0);
    assert_eq!(m.heap.scope_roots().len(), 1);
}

// ============================================================================
// Host API
// ============================================================================

#[test]
fn define_native_installs_a_primitive() {
    let mut m = machine();
    m.define_native("twice", |m, args, scope| {
        let expr = m.heap.first(args)?;
        let val = m.eval_in(expr, scope)?;
        let n = m
            .heap
            .integer_value(val)
            .ok_or_else(|| KonsError::TypeError("twice expects an integer".into()))?;
        m.heap.integer(n * 2)
    })
    .unwrap();
    assert_eq!(eval_on(&mut m, "(twice (add 20 1))"), Ok("42".into()));
    assert!(m.global("twice").is_some());
}

#[test]
fn define_global_binds_a_value() {
    let mut m = machine();
    let val = m.heap.integer(99).unwrap();
    m.define_global("answer", val);
    assert_eq!(eval_on(&mut m, "(add answer 1)"), Ok("100".into()));
}

#[test]
fn eval_str_returns_the_last_value() {
    let mut m = machine();
    assert_eq!(m.eval_str(""), Ok(KonsValue::Nil));
    assert_eq!(eval_on(&mut m, "(add 1 2) (add 3 4)"), Ok("7".into()));
    assert_eq!(m.eval_str("(add 1"), Err(KonsError::EndOfInput));
}
