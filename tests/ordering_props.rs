//! Property tests for ordering and change records.
//!
//! Random add/update/remove sequences are applied to a reactive map and to a
//! plain `HashMap` model. After every sequence:
//! - the map lists exactly the model's entries, sorted by the comparator
//! - replaying the emitted change records onto an empty mirror rebuilds it

use proptest::prelude::*;
use spark_sorted_map::{by_value, ChangeKind, ObserveOptions, ReactiveSortedMap};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone)]
enum Op {
    Add(u8, i16),
    Update(u8, i16),
    RemoveKey(u8),
    RemoveValue(i16),
    Clear,
}

fn arb_op() -> impl Strategy<Value = Op> {
    // Small key and value ranges so operations collide often
    prop_oneof![
        4 => (0u8..16, -8i16..8).prop_map(|(k, v)| Op::Add(k, v)),
        2 => (0u8..16, -8i16..8).prop_map(|(k, d)| Op::Update(k, d)),
        2 => (0u8..16).prop_map(Op::RemoveKey),
        1 => (-8i16..8).prop_map(Op::RemoveValue),
        1 => Just(Op::Clear),
    ]
}

fn sorted_by_value(model: &HashMap<u8, i16>) -> Vec<(u8, i16)> {
    let mut entries: Vec<(u8, i16)> = model.iter().map(|(k, v)| (*k, *v)).collect();
    entries.sort_by(|(ka, va), (kb, vb)| va.cmp(vb).then(ka.cmp(kb)));
    entries
}

fn apply(map: &ReactiveSortedMap<u8, i16>, model: &mut HashMap<u8, i16>, op: &Op) {
    match *op {
        Op::Add(k, v) => {
            assert_eq!(map.add(k, v), model.insert(k, v));
        }
        Op::Update(k, delta) => {
            let result = map.update(&k, |v| v.saturating_add(delta));
            match model.get_mut(&k) {
                Some(v) => {
                    *v = v.saturating_add(delta);
                    assert_eq!(result, Ok(*v));
                }
                None => assert!(result.is_err()),
            }
        }
        Op::RemoveKey(k) => {
            assert_eq!(map.remove_key(&k), model.remove(&k));
        }
        Op::RemoveValue(v) => {
            // First holder in order: lowest key among equal values
            let expected = sorted_by_value(model).into_iter().find(|(_, held)| *held == v);
            if let Some((k, _)) = expected {
                model.remove(&k);
            }
            assert_eq!(map.remove_value(&v), expected);
        }
        Op::Clear => {
            map.clear();
            model.clear();
        }
    }
}

proptest! {
    /// Property: the listing always matches the comparator over the model
    #[test]
    fn prop_listing_matches_model(ops in prop::collection::vec(arb_op(), 0..64)) {
        let map = ReactiveSortedMap::with_comparator(by_value());
        let mut model = HashMap::new();

        for op in &ops {
            apply(&map, &mut model, op);
            prop_assert_eq!(map.to_list(), sorted_by_value(&model));
        }
        prop_assert_eq!(map.len(), model.len());
    }

    /// Property: change records replayed onto a mirror reproduce the map
    #[test]
    fn prop_records_rebuild_the_map(
        seed in prop::collection::vec((0u8..16, -8i16..8), 0..8),
        ops in prop::collection::vec(arb_op(), 0..64)
    ) {
        let map = ReactiveSortedMap::with_comparator(by_value());
        map.add_all(seed);
        let mut model: HashMap<u8, i16> = map.to_list().into_iter().collect();

        let mirror = Rc::new(RefCell::new(HashMap::new()));
        let sub = map.observe_with(
            {
                let mirror = mirror.clone();
                move |change| {
                    let mut mirror = mirror.borrow_mut();
                    match change.kind() {
                        ChangeKind::Add => {
                            let previous = mirror.insert(*change.key(), *change.new_value().unwrap());
                            assert!(previous.is_none());
                        }
                        ChangeKind::Update => {
                            let previous = mirror.insert(*change.key(), *change.new_value().unwrap());
                            assert_eq!(previous.as_ref(), change.old_value());
                        }
                        ChangeKind::Remove => {
                            let previous = mirror.remove(change.key());
                            assert_eq!(previous.as_ref(), change.old_value());
                        }
                    }
                }
            },
            ObserveOptions::fire_immediately(),
        );

        for op in &ops {
            apply(&map, &mut model, op);
        }
        sub.dispose();

        let rebuilt: HashMap<u8, i16> = mirror.borrow().clone();
        prop_assert_eq!(rebuilt, model);
    }
}
