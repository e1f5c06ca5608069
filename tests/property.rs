mod common;

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use common::{eval_source, guarded_native, small_machine};
use kons::heap::Heap;
use kons::printer::{describe, kind_tag, print_val};
use kons::reader::read_str;
use kons::symbol::SymbolTable;
use kons::value::KonsValue;
use proptest::prelude::*;

fn read(src: &str) -> (Heap, SymbolTable, KonsValue) {
    let mut heap = Heap::default();
    let mut symbols = SymbolTable::new();
    let val = read_str(src, &mut heap, &mut symbols).unwrap();
    (heap, symbols, val)
}

/// Digits of `n` in `radix`, lowercase, with a leading '-' when negative.
fn to_radix(n: i64, radix: u32) -> String {
    let mut magnitude = n.unsigned_abs();
    if magnitude == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while magnitude > 0 {
        let d = (magnitude % radix as u64) as u32;
        digits.push(std::char::from_digit(d, radix).unwrap());
        magnitude /= radix as u64;
    }
    if n < 0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

// ============================================================================
// Literals
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn decimal_integers_read_back(n in any::<i64>()) {
        let (heap, _, val) = read(&n.to_string());
        prop_assert_eq!(kind_tag(val, &heap), "int");
        prop_assert_eq!(heap.integer_value(val), Some(n));
    }

    #[test]
    fn explicit_plus_sign(n in 0i64..=i64::MAX) {
        let (heap, _, val) = read(&format!("+{}", n));
        prop_assert_eq!(heap.integer_value(val), Some(n));
    }

    #[test]
    fn radix_integers_read_back(n in any::<i64>(), radix in 2u32..=36, spaced in any::<bool>()) {
        let src = if spaced {
            format!("# {} {}", radix, to_radix(n, radix))
        } else {
            format!("#{} {}", radix, to_radix(n, radix))
        };
        let (heap, _, val) = read(&src);
        prop_assert_eq!(heap.integer_value(val), Some(n));
    }

    #[test]
    fn float_literals_print_their_text(
        int_part in "[0-9]{0,4}",
        frac in "[0-9]{1,4}",
        exp in proptest::option::of("[+-]?[0-9]{1,3}"),
        sign in "[+-]?",
    ) {
        let mut src = format!("{}{}.{}", sign, int_part, frac);
        if let Some(exp) = &exp {
            src.push('E');
            src.push_str(exp);
        }
        let (heap, symbols, val) = read(&src);
        prop_assert_eq!(kind_tag(val, &heap), "float");
        prop_assert_eq!(print_val(val, &heap, &symbols), src.replace('E', "e"));
    }

    #[test]
    fn symbol_names_read_back(name in "[a-zA-Z][a-zA-Z0-9]{0,12}") {
        let (heap, symbols, val) = read(&name);
        prop_assert_eq!(describe(val, &heap, &symbols), format!("{}: symbol", name));
    }

    #[test]
    fn keyword_names_read_back(name in "&[a-zA-Z][a-zA-Z0-9]{0,8}") {
        let (heap, symbols, val) = read(&name);
        prop_assert_eq!(describe(val, &heap, &symbols), format!("{}: keyword", name));
    }
}

// ============================================================================
// Evaluation
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn add_folds_to_the_sum(xs in prop::collection::vec(any::<i32>(), 0..12)) {
        let args: Vec<String> = xs.iter().map(|x| x.to_string()).collect();
        let src = format!("(add {})", args.join(" "));
        let sum: i64 = xs.iter().map(|&x| x as i64).sum();
        prop_assert_eq!(eval_source(&src), Ok(sum.to_string()));
    }

    #[test]
    fn multiply_folds_to_the_product(xs in prop::collection::vec(-9i64..=9, 0..8)) {
        let args: Vec<String> = xs.iter().map(|x| x.to_string()).collect();
        let src = format!("(multiply {})", args.join(" "));
        let product: i64 = xs.iter().product();
        prop_assert_eq!(eval_source(&src), Ok(product.to_string()));
    }

    #[test]
    fn quoted_lists_print_as_written(xs in prop::collection::vec(any::<i64>(), 0..20)) {
        let items: Vec<String> = xs.iter().map(|x| x.to_string()).collect();
        let text = format!("({})", items.join(" "));
        prop_assert_eq!(eval_source(&format!("(quote {})", text)), Ok(text));
    }

    #[test]
    fn rest_parameters_see_every_argument(xs in prop::collection::vec(-1000i64..1000, 0..10)) {
        let items: Vec<String> = xs.iter().map(|x| x.to_string()).collect();
        let src = format!(
            "(deffun list (&rest objects) objects) (list {})",
            items.join(" ")
        );
        prop_assert_eq!(eval_source(&src), Ok(format!("({})", items.join(" "))));
    }

    #[test]
    fn list_construction_survives_small_pages(
        xs in prop::collection::vec(any::<i64>(), 1..40),
        page_capacity in 2usize..8,
    ) {
        let mut m = small_machine(page_capacity);
        let items: Vec<String> = xs.iter().map(|x| x.to_string()).collect();
        let val = m.eval_str(&format!("(quote ({}))", items.join(" "))).unwrap();
        let got: Vec<i64> = m
            .heap
            .list_to_vec(val)
            .unwrap()
            .iter()
            .map(|&v| m.heap.integer_value(v).unwrap())
            .collect();
        prop_assert_eq!(got, xs);
    }
}

// ============================================================================
// Collector
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn only_rooted_natives_survive(
        keep in prop::collection::vec(any::<bool>(), 1..80),
        page_capacity in 4usize..24,
    ) {
        let mut m = small_machine(page_capacity);
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut kept = Vec::new();

        for (id, &keep_it) in keep.iter().enumerate() {
            let val = guarded_native(&mut m, id, &log);
            if keep_it {
                let name = m.symbols.intern(&format!("keep{}", id));
                m.globals.define(name, val, None);
                kept.push(val);
            }
        }
        m.collect();

        let dropped = log.borrow().clone();
        let unique: BTreeSet<usize> = dropped.iter().copied().collect();
        prop_assert_eq!(unique.len(), dropped.len());
        let expected: BTreeSet<usize> = keep
            .iter()
            .enumerate()
            .filter(|(_, k)| !**k)
            .map(|(id, _)| id)
            .collect();
        prop_assert_eq!(unique, expected);
        for val in kept {
            prop_assert!(m.heap.contains(val));
        }
    }
}
