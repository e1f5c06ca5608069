use crate::heap::Heap;
use crate::symbol::SymbolTable;
use crate::value::{KonsValue, Node};

const MAX_DEPTH: usize = 1000;
const MAX_LIST_LEN: usize = 10_000;

/// Print a value as s-expression text.
pub fn print_val(val: KonsValue, heap: &Heap, symbols: &SymbolTable) -> String {
    let mut out = String::new();
    print_inner(val, heap, symbols, &mut out, 0);
    out
}

fn print_inner(val: KonsValue, heap: &Heap, symbols: &SymbolTable, out: &mut String, depth: usize) {
    if depth > MAX_DEPTH {
        out.push_str("...");
        return;
    }

    let node = match heap.get(val) {
        Some(node) => node,
        None if val.is_nil() => {
            out.push_str("()");
            return;
        }
        None => {
            out.push_str(&format!("#<dangling {:?}>", val));
            return;
        }
    };

    match node {
        Node::Symbol(id) | Node::Keyword(id) => out.push_str(symbols.name(*id)),
        Node::Integer(n) => out.push_str(&n.to_string()),
        Node::Float(literal) => out.push_str(&literal.to_string()),
        Node::NativeFunction(native) => {
            out.push_str("#<native ");
            out.push_str(symbols.name(native.name));
            out.push('>');
        }
        Node::Pair(cons) if cons.callable => {
            out.push_str("#<lambda ");
            print_inner(cons.first, heap, symbols, out, depth + 1);
            out.push('>');
        }
        Node::Pair(cons) => {
            out.push('(');
            print_inner(cons.first, heap, symbols, out, depth + 1);

            let mut current = cons.rest;
            let mut len = 1;
            loop {
                match heap.pair(current) {
                    _ if current.is_nil() => break,
                    Some(next) if current.is_pair() && !next.callable => {
                        if len >= MAX_LIST_LEN {
                            out.push_str(" ...");
                            break;
                        }
                        out.push(' ');
                        print_inner(next.first, heap, symbols, out, depth + 1);
                        current = next.rest;
                        len += 1;
                    }
                    _ => {
                        out.push_str(" . ");
                        print_inner(current, heap, symbols, out, depth + 1);
                        break;
                    }
                }
            }
            out.push(')');
        }
    }
}

/// Kind tag of a value, as shown by `describe`.
pub fn kind_tag(val: KonsValue, heap: &Heap) -> &'static str {
    match val {
        KonsValue::Nil => "nil",
        KonsValue::Pair(_) if heap.is_callable(val) => "lambda",
        KonsValue::Pair(_) => "list",
        KonsValue::Symbol(_) => "symbol",
        KonsValue::Keyword(_) => "keyword",
        KonsValue::Integer(_) => "int",
        KonsValue::Float(_) => "float",
        KonsValue::NativeFunction(_) => "native-function",
    }
}

/// Describe a value with its kind: `10: int`, `( 1: int 2: int ): list`,
/// `(): nil`. List elements are described recursively.
pub fn describe(val: KonsValue, heap: &Heap, symbols: &SymbolTable) -> String {
    let mut out = String::new();
    describe_inner(val, heap, symbols, &mut out, 0);
    out
}

fn describe_inner(
    val: KonsValue,
    heap: &Heap,
    symbols: &SymbolTable,
    out: &mut String,
    depth: usize,
) {
    if depth > MAX_DEPTH {
        out.push_str("...");
        return;
    }

    match heap.pair(val) {
        Some(cons) if !cons.callable => {
            out.push_str("( ");
            describe_inner(cons.first, heap, symbols, out, depth + 1);
            out.push(' ');

            let mut current = cons.rest;
            let mut len = 1;
            while !current.is_nil() {
                match heap.pair(current) {
                    Some(next) if !next.callable && len < MAX_LIST_LEN => {
                        describe_inner(next.first, heap, symbols, out, depth + 1);
                        out.push(' ');
                        current = next.rest;
                        len += 1;
                    }
                    Some(_) if len >= MAX_LIST_LEN => {
                        out.push_str("... ");
                        break;
                    }
                    _ => {
                        out.push_str(". ");
                        describe_inner(current, heap, symbols, out, depth + 1);
                        out.push(' ');
                        break;
                    }
                }
            }
            out.push_str("): list");
        }
        _ if val.is_nil() => out.push_str("(): nil"),
        _ => {
            out.push_str(&print_val(val, heap, symbols));
            out.push_str(": ");
            out.push_str(kind_tag(val, heap));
        }
    }
}
