//! Algebraic operator laws, spec.md §8: identities that must hold for any
//! input, checked with `proptest` rather than a handful of fixed examples.
//!
//! Every law here runs against cold sources (`just`) whose `IterSubscription`
//! delivers everything synchronously within `request(n)`, so `collect`
//! below needs a `Coordinator` only to satisfy `for_each`'s signature, not
//! to pump any delayed work.

use flow_core::{just, Coordinator, Obs, ObsOps, Observability};
use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

fn collect<T: Clone + 'static>(obs: Obs<T>) -> Vec<T> {
    let coordinator = Coordinator::with_system_clock(Observability::noop());
    let output = Rc::new(RefCell::new(Vec::new()));
    let out_next = output.clone();
    let _subscription = obs.for_each(
        coordinator,
        move |item: T| out_next.borrow_mut().push(item),
        |_err| {},
        || {},
    );
    let result = output.borrow().clone();
    result
}

proptest! {
    #[test]
    fn map_identity_is_identity(values in prop::collection::vec(any::<i32>(), 0..20)) {
        let source: Obs<i32> = just(values.clone());
        let mapped = source.map(|x| x);
        prop_assert_eq!(collect(mapped), values);
    }

    #[test]
    fn nested_take_keeps_the_smaller_bound(
        values in prop::collection::vec(any::<i32>(), 0..20),
        n in 0u64..15,
        m in 0u64..15,
    ) {
        let a: Obs<i32> = just(values.clone()).take(n).take(m);
        let b: Obs<i32> = just(values.clone()).take(n.min(m));
        prop_assert_eq!(collect(a), collect(b));
    }

    #[test]
    fn map_composition_matches_a_single_composed_map(
        values in prop::collection::vec(any::<i32>(), 0..20),
    ) {
        let f = |x: i32| x.wrapping_add(1);
        let g = |x: i32| x.wrapping_mul(2);

        let composed: Obs<i32> = just(values.clone()).map(f).map(g);
        let single: Obs<i32> = just(values.clone()).map(move |x| g(f(x)));
        prop_assert_eq!(collect(composed), collect(single));
    }

    #[test]
    fn filter_chain_matches_a_single_conjoined_predicate(
        values in prop::collection::vec(any::<i32>(), 0..30),
    ) {
        let p = |x: &i32| *x % 2 == 0;
        let q = |x: &i32| *x >= 0;

        let chained: Obs<i32> = just(values.clone()).filter(p).filter(q);
        let single: Obs<i32> = just(values.clone()).filter(move |x| p(x) && q(x));
        prop_assert_eq!(collect(chained), collect(single));
    }

    #[test]
    fn take_never_yields_more_items_than_requested(
        values in prop::collection::vec(any::<i32>(), 0..30),
        n in 0u64..40,
    ) {
        let source: Obs<i32> = just(values.clone()).take(n);
        let result = collect(source);
        prop_assert!(result.len() as u64 <= n);
        prop_assert_eq!(&result[..], &values[..result.len()]);
    }
}
