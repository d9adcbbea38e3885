//! ResultSet behavior against a scripted connection.

mod common;

use common::{int, person_class, scripted_store, team_class, text};
use std::rc::Rc;
use storm_core::{ClassInfo, Error, SqlType, Value, VarValue};
use storm_expr::{Expr, Statement};
use storm_store::{Filters, SetTo};

fn id_col(cls: &storm_core::ClassRef) -> storm_core::Column {
    cls.column("id").unwrap().clone()
}

// ============================================================================
// Builder composition
// ============================================================================

#[test]
fn test_reorder_after_slice_is_rejected() {
    let (store, _script) = scripted_store();
    let person = person_class();
    let sliced = store.find(&person, ()).unwrap().slice(10..20);
    let err = sliced.order_by(vec![Expr::from(id_col(&person))]);
    assert!(matches!(err, Err(Error::Feature(_))));
}

#[test]
fn test_slice_composition() {
    let (store, _script) = scripted_store();
    let person = person_class();
    let rs = store.find(&person, ()).unwrap();

    let nested = rs.slice(2..10).slice(3..5);
    let direct = rs.slice(5..7);
    assert_eq!(nested.offset(), direct.offset());
    assert_eq!(nested.limit(), direct.limit());
    assert_eq!(nested.offset(), Some(5));
    assert_eq!(nested.limit(), Some(2));
}

#[test]
fn test_open_ended_slices() {
    let (store, _script) = scripted_store();
    let person = person_class();
    let rs = store.find(&person, ()).unwrap();

    let tail = rs.slice(3..);
    assert_eq!(tail.offset(), Some(3));
    assert_eq!(tail.limit(), None);

    let head = rs.slice(..4);
    assert_eq!(head.offset(), None);
    assert_eq!(head.limit(), Some(4));

    // Narrowing an existing limit keeps the smaller one.
    assert_eq!(head.slice(..10).limit(), Some(4));
}

#[test]
fn test_config_flows_into_select() {
    let (store, script) = scripted_store();
    let person = person_class();
    script.borrow_mut().push_select(vec![]);

    let rs = store
        .find(&person, ())
        .unwrap()
        .config(Some(true), Some(5), Some(10));
    let _ = rs.iter().unwrap().count();

    let log = script.borrow().log.clone();
    let Statement::Select(select) = &log[0] else {
        panic!("expected a select, got {:?}", log[0]);
    };
    assert!(select.distinct);
    assert_eq!(select.offset, Some(5));
    assert_eq!(select.limit, Some(10));
    assert_eq!(select.default_tables, vec!["person".to_string()]);
}

#[test]
fn test_at_composes_with_existing_offset() {
    let (store, script) = scripted_store();
    let person = person_class();
    script.borrow_mut().push_select(vec![]);

    let err = store.find(&person, ()).unwrap().slice(4..).at(2);
    assert!(matches!(err, Err(Error::OutOfRange(_))));

    let log = script.borrow().log.clone();
    let Statement::Select(select) = &log[0] else {
        panic!("expected a select, got {:?}", log[0]);
    };
    assert_eq!(select.offset, Some(6));
    assert_eq!(select.limit, Some(1));
}

// ============================================================================
// Materialization
// ============================================================================

#[test]
fn test_iter_hydrates_identity_mapped_objects() {
    let (store, script) = scripted_store();
    let person = person_class();
    script.borrow_mut().push_select(vec![
        vec![int(1), text("Alice")],
        vec![int(2), text("Bob")],
    ]);

    let rows: Vec<_> = store
        .find(&person, ())
        .unwrap()
        .iter()
        .unwrap()
        .map(|row| row.unwrap().single().unwrap())
        .collect();
    assert_eq!(rows.len(), 2);

    // The hydrated objects are the canonical ones.
    let alice = store.get(&person, 1).unwrap().unwrap();
    assert!(Rc::ptr_eq(&rows[0], &alice));
    assert_eq!(script.borrow().of_kind("SELECT").len(), 1);
}

#[test]
fn test_iter_returns_existing_object_without_rebinding() {
    let (store, script) = scripted_store();
    let person = person_class();
    script
        .borrow_mut()
        .push_select(vec![vec![int(1), text("Alice")]]);
    let alice = store.get(&person, 1).unwrap().unwrap();
    alice.set("name", "Local edit").unwrap();

    // The query returns the stale database row...
    script
        .borrow_mut()
        .push_select(vec![vec![int(1), text("Alice")]]);
    let fetched = store
        .find(&person, Filters::new())
        .unwrap()
        .any()
        .unwrap()
        .unwrap()
        .single()
        .unwrap();

    // ...but the cache hit preserves the live object and its local edit.
    assert!(Rc::ptr_eq(&fetched, &alice));
    assert_eq!(
        alice.get("name").unwrap(),
        VarValue::Val(text("Local edit"))
    );
}

#[test]
fn test_any_forces_limit_one() {
    let (store, script) = scripted_store();
    let person = person_class();
    script.borrow_mut().push_select(vec![]);

    assert!(store.find(&person, ()).unwrap().any().unwrap().is_none());

    let log = script.borrow().log.clone();
    let Statement::Select(select) = &log[0] else {
        panic!("expected a select, got {:?}", log[0]);
    };
    assert_eq!(select.limit, Some(1));
}

#[test]
fn test_first_requires_order() {
    let (store, script) = scripted_store();
    let person = person_class();

    let unordered = store.find(&person, ()).unwrap();
    assert!(matches!(unordered.first(), Err(Error::Unordered(_))));

    script
        .borrow_mut()
        .push_select(vec![vec![int(1), text("Alice")]]);
    let ordered = unordered
        .order_by(vec![Expr::from(id_col(&person)).asc()])
        .unwrap();
    let first = ordered.first().unwrap().unwrap().single().unwrap();
    assert_eq!(first.get("name").unwrap(), VarValue::Val(text("Alice")));
}

#[test]
fn test_last_reverses_order_and_clears_slicing() {
    let (store, script) = scripted_store();
    let person = person_class();
    let id = id_col(&person);

    let ordered = store
        .find(&person, ())
        .unwrap()
        .order_by(vec![Expr::from(&id).asc()])
        .unwrap();

    script
        .borrow_mut()
        .push_select(vec![vec![int(9), text("Zed")]]);
    let last = ordered.last().unwrap().unwrap().single().unwrap();
    assert_eq!(last.get("id").unwrap(), VarValue::Val(int(9)));

    let log = script.borrow().log.clone();
    let Statement::Select(select) = &log[0] else {
        panic!("expected a select, got {:?}", log[0]);
    };
    assert_eq!(select.order_by, vec![Expr::from(&id).desc()]);
    assert_eq!(select.limit, Some(1));
    assert_eq!(select.offset, None);
}

#[test]
fn test_last_rejects_unordered_and_limited() {
    let (store, _script) = scripted_store();
    let person = person_class();

    let unordered = store.find(&person, ()).unwrap();
    assert!(matches!(unordered.last(), Err(Error::Unordered(_))));

    let limited = store
        .find(&person, ())
        .unwrap()
        .order_by(vec![Expr::from(id_col(&person))])
        .unwrap()
        .config(None, None, Some(5));
    assert!(matches!(limited.last(), Err(Error::Feature(_))));
}

#[test]
fn test_one_fails_on_two_rows_and_selects_limit_two() {
    let (store, script) = scripted_store();
    let person = person_class();
    script.borrow_mut().push_select(vec![
        vec![int(1), text("Alice")],
        vec![int(2), text("Bob")],
    ]);

    let err = store.find(&person, ()).unwrap().one();
    assert!(matches!(err, Err(Error::NotOne(_))));

    let log = script.borrow().log.clone();
    let Statement::Select(select) = &log[0] else {
        panic!("expected a select, got {:?}", log[0]);
    };
    assert_eq!(select.limit, Some(2));
}

#[test]
fn test_one_returns_unique_row_or_none() {
    let (store, script) = scripted_store();
    let person = person_class();

    script
        .borrow_mut()
        .push_select(vec![vec![int(1), text("Alice")]]);
    let one = store.find(&person, ()).unwrap().one().unwrap().unwrap();
    assert_eq!(
        one.single().unwrap().get("name").unwrap(),
        VarValue::Val(text("Alice"))
    );

    script.borrow_mut().push_select(vec![]);
    assert!(store.find(&person, ()).unwrap().one().unwrap().is_none());
}

#[test]
fn test_one_keeps_a_tighter_slice_limit() {
    let (store, script) = scripted_store();
    let person = person_class();
    script
        .borrow_mut()
        .push_select(vec![vec![int(1), text("Alice")]]);

    let _ = store.find(&person, ()).unwrap().slice(..1).one().unwrap();

    let log = script.borrow().log.clone();
    let Statement::Select(select) = &log[0] else {
        panic!("expected a select, got {:?}", log[0]);
    };
    assert_eq!(select.limit, Some(1));
}

// ============================================================================
// Joined finds
// ============================================================================

#[test]
fn test_tuple_find_hydrates_per_class_with_null_side_absent() {
    let (store, script) = scripted_store();
    let person = person_class();
    let team = team_class();
    script.borrow_mut().push_select(vec![vec![
        int(1),
        text("Alice"),
        Value::Null,
        Value::Null,
    ]]);

    let row = store
        .find((&person, &team), ())
        .unwrap()
        .any()
        .unwrap()
        .unwrap();
    let objects = row.tuple();
    assert_eq!(objects.len(), 2);
    let alice = objects[0].clone().unwrap();
    assert_eq!(alice.get("name").unwrap(), VarValue::Val(text("Alice")));
    assert!(objects[1].is_none());

    // The person side is cached normally.
    let again = store.get(&person, 1).unwrap().unwrap();
    assert!(Rc::ptr_eq(&alice, &again));
}

#[test]
fn test_tuple_select_projects_both_classes() {
    let (store, script) = scripted_store();
    let person = person_class();
    let team = team_class();
    script.borrow_mut().push_select(vec![]);

    let _ = store.find((&person, &team), ()).unwrap().any().unwrap();

    let log = script.borrow().log.clone();
    let Statement::Select(select) = &log[0] else {
        panic!("expected a select, got {:?}", log[0]);
    };
    assert_eq!(select.columns.len(), 4);
    assert_eq!(
        select.default_tables,
        vec!["person".to_string(), "team".to_string()]
    );
}

#[test]
fn test_using_seeds_from_tables() {
    let (store, script) = scripted_store();
    let person = person_class();
    let team = team_class();
    script.borrow_mut().push_select(vec![]);

    let join = storm_expr::FromExpr::join(
        storm_expr::JoinKind::Left,
        Some(storm_expr::FromExpr::from(&*person)),
        storm_expr::FromExpr::from(&*team),
        None,
    );
    let tables = store.using(vec![join.clone()]);
    let _ = tables.find(&person, ()).unwrap().any().unwrap();

    let log = script.borrow().log.clone();
    let Statement::Select(select) = &log[0] else {
        panic!("expected a select, got {:?}", log[0]);
    };
    assert_eq!(select.tables, vec![join]);
}

// ============================================================================
// Aggregation and projection
// ============================================================================

#[test]
fn test_count() {
    let (store, script) = scripted_store();
    let person = person_class();
    script.borrow_mut().push_select(vec![vec![int(3)]]);
    assert_eq!(store.find(&person, ()).unwrap().count().unwrap(), 3);
}

#[test]
fn test_aggregates_coerce_through_the_column_factory() {
    let (store, script) = scripted_store();
    let person = person_class();
    let id = id_col(&person);

    // The driver hands back a float for an integer column.
    script.borrow_mut().push_select(vec![vec![Value::Float(9.0)]]);
    let max = store.find(&person, ()).unwrap().max(&id).unwrap();
    assert_eq!(max, int(9));

    script.borrow_mut().push_select(vec![vec![Value::Float(2.5)]]);
    let avg = store.find(&person, ()).unwrap().avg(&id).unwrap();
    assert!((avg - 2.5).abs() < f64::EPSILON);
}

#[test]
fn test_values_projects_and_coerces() {
    let (store, script) = scripted_store();
    let person = person_class();
    let name = person.column("name").unwrap().clone();
    script
        .borrow_mut()
        .push_select(vec![vec![text("Alice")], vec![text("Bob")]]);

    let rows: Vec<Vec<Value>> = store
        .find(&person, ())
        .unwrap()
        .values(std::slice::from_ref(&name))
        .unwrap()
        .map(|row| row.unwrap())
        .collect();
    assert_eq!(rows, vec![vec![text("Alice")], vec![text("Bob")]]);

    let log = script.borrow().log.clone();
    let Statement::Select(select) = &log[0] else {
        panic!("expected a select, got {:?}", log[0]);
    };
    assert_eq!(select.columns, vec![Expr::from(&name)]);
}

#[test]
fn test_values_requires_columns() {
    let (store, _script) = scripted_store();
    let person = person_class();
    let err = store.find(&person, ()).unwrap().values(&[]);
    assert!(matches!(err, Err(Error::Feature(_))));
}

// ============================================================================
// Bulk mutation
// ============================================================================

#[test]
fn test_set_patches_cached_objects_without_reload() {
    let (store, script) = scripted_store();
    let person = person_class();
    script
        .borrow_mut()
        .push_select(vec![vec![int(1), text("Alice")]]);
    let alice = store.get(&person, 1).unwrap().unwrap();

    let id = id_col(&person);
    store
        .find(&person, Expr::from(&id).eq(Expr::lit(1)))
        .unwrap()
        .set(&[], &[("name", SetTo::Value(text("Bob")))])
        .unwrap();

    // The cached object reflects the mutation with no further select...
    assert_eq!(alice.get("name").unwrap(), VarValue::Val(text("Bob")));
    assert_eq!(script.borrow().of_kind("SELECT").len(), 1);
    // ...and is not left with a pending change.
    let name_index = person.column_index("name").unwrap();
    assert!(!alice.variable(name_index).has_changed());
    store.flush().unwrap();
    assert_eq!(script.borrow().of_kind("UPDATE").len(), 1);
}

#[test]
fn test_set_skips_cached_objects_the_where_excludes() {
    let (store, script) = scripted_store();
    let person = person_class();
    script
        .borrow_mut()
        .push_select(vec![vec![int(1), text("Alice")]]);
    script
        .borrow_mut()
        .push_select(vec![vec![int(2), text("Bob")]]);
    let alice = store.get(&person, 1).unwrap().unwrap();
    let bob = store.get(&person, 2).unwrap().unwrap();

    let id = id_col(&person);
    store
        .find(&person, Expr::from(&id).eq(Expr::lit(2)))
        .unwrap()
        .set(&[], &[("name", SetTo::Value(text("Robert")))])
        .unwrap();

    assert_eq!(alice.get("name").unwrap(), VarValue::Val(text("Alice")));
    assert_eq!(bob.get("name").unwrap(), VarValue::Val(text("Robert")));
}

#[test]
fn test_set_with_column_assignment_copies_current_value() {
    let profile = ClassInfo::build(
        "Profile",
        "profile",
        &[
            ("id", SqlType::Int),
            ("name", SqlType::Text),
            ("nick", SqlType::Text),
        ],
        &["id"],
    )
    .unwrap();
    let (store, script) = scripted_store();
    script
        .borrow_mut()
        .push_select(vec![vec![int(1), text("Alice"), text("al")]]);
    let row = store.get(&profile, 1).unwrap().unwrap();

    let name = profile.column("name").unwrap().clone();
    let nick = profile.column("nick").unwrap().clone();
    store
        .find(&profile, ())
        .unwrap()
        .set(&[Expr::from(&nick).eq(Expr::from(&name))], &[])
        .unwrap();

    assert_eq!(row.get("nick").unwrap(), VarValue::Val(text("Alice")));

    let updates = script.borrow().of_kind("UPDATE");
    let Statement::Update(update) = &updates[0] else {
        unreachable!();
    };
    assert_eq!(update.set, vec![(nick, Expr::from(&name))]);
}

#[test]
fn test_set_null_updates_rows_but_leaves_cache_values() {
    let (store, script) = scripted_store();
    let person = person_class();
    script
        .borrow_mut()
        .push_select(vec![vec![int(1), text("Alice")]]);
    let alice = store.get(&person, 1).unwrap().unwrap();

    store
        .find(&person, ())
        .unwrap()
        .set(&[], &[("name", SetTo::Null)])
        .unwrap();

    let updates = script.borrow().of_kind("UPDATE");
    let Statement::Update(update) = &updates[0] else {
        unreachable!();
    };
    assert_eq!(update.set[0].1, Expr::Lit(Value::Null));
    // Cache reconciliation leaves the variable's current value alone.
    assert_eq!(alice.get("name").unwrap(), VarValue::Val(text("Alice")));
}

#[test]
fn test_set_rejects_unsupported_expressions_and_tuple_finds() {
    let (store, _script) = scripted_store();
    let person = person_class();
    let team = team_class();
    let id = id_col(&person);

    let rs = store.find(&person, ()).unwrap();
    let not_an_eq = Expr::from(&id).gt(Expr::lit(1));
    assert!(matches!(
        rs.set(&[not_an_eq], &[]),
        Err(Error::Feature(_))
    ));
    let bad_rhs = Expr::from(&id).eq(Expr::from(&id).gt(Expr::lit(1)));
    assert!(matches!(rs.set(&[bad_rhs], &[]), Err(Error::Feature(_))));

    let tuple = store.find((&person, &team), ()).unwrap();
    assert!(matches!(
        tuple.set(&[], &[("name", SetTo::Null)]),
        Err(Error::Feature(_))
    ));
}

#[test]
fn test_set_falls_back_to_reload_when_where_cannot_compile() {
    let (store, script) = scripted_store();
    let person = person_class();
    script
        .borrow_mut()
        .push_select(vec![vec![int(1), text("Alice")]]);
    let alice = store.get(&person, 1).unwrap().unwrap();

    // An ordering wrapper has no in-memory evaluation.
    let strange = Expr::from(id_col(&person)).asc();
    script
        .borrow_mut()
        .push_select(vec![vec![int(1), text("Zed")]]);
    store
        .find(&person, strange)
        .unwrap()
        .set(&[], &[("name", SetTo::Value(text("Zed")))])
        .unwrap();

    // The cached object was reloaded rather than patched.
    assert_eq!(alice.get("name").unwrap(), VarValue::Val(text("Zed")));
    let kinds: Vec<&str> = script.borrow().log.iter().map(|s| s.kind()).collect();
    assert_eq!(kinds, vec!["SELECT", "UPDATE", "SELECT"]);
}

#[test]
fn test_bulk_remove_deletes_without_touching_cache() {
    let (store, script) = scripted_store();
    let person = person_class();
    script
        .borrow_mut()
        .push_select(vec![vec![int(1), text("Alice")]]);
    let alice = store.get(&person, 1).unwrap().unwrap();

    let id = id_col(&person);
    store
        .find(&person, Expr::from(&id).eq(Expr::lit(1)))
        .unwrap()
        .remove()
        .unwrap();

    let deletes = script.borrow().of_kind("DELETE");
    assert_eq!(deletes.len(), 1);
    let Statement::Delete(delete) = &deletes[0] else {
        unreachable!();
    };
    assert_eq!(delete.table, "person");

    // Deliberately not reconciled: the stale object stays cached.
    let again = store.get(&person, 1).unwrap().unwrap();
    assert!(Rc::ptr_eq(&alice, &again));
}

#[test]
fn test_remove_rejects_slices_and_tuples() {
    let (store, _script) = scripted_store();
    let person = person_class();
    let team = team_class();

    let sliced = store.find(&person, ()).unwrap().slice(0..10);
    assert!(matches!(sliced.remove(), Err(Error::Feature(_))));

    let tuple = store.find((&person, &team), ()).unwrap();
    assert!(matches!(tuple.remove(), Err(Error::Feature(_))));
}

// ============================================================================
// In-memory matching
// ============================================================================

#[test]
fn test_cached_matches_against_live_objects() {
    let (store, script) = scripted_store();
    let person = person_class();
    let team = team_class();
    script
        .borrow_mut()
        .push_select(vec![vec![int(1), text("Alice")]]);
    script
        .borrow_mut()
        .push_select(vec![vec![int(2), text("Bob")]]);
    script
        .borrow_mut()
        .push_select(vec![vec![int(7), text("Reds")]]);
    let alice = store.get(&person, 1).unwrap().unwrap();
    let bob = store.get(&person, 2).unwrap().unwrap();
    let _team = store.get(&team, 7).unwrap().unwrap();

    let id = id_col(&person);
    let matched = store
        .find(&person, Expr::from(&id).gt(Expr::lit(1)))
        .unwrap()
        .cached()
        .unwrap();
    assert_eq!(matched.len(), 1);
    assert!(Rc::ptr_eq(&matched[0], &bob));

    // No where-clause: every cached object of the class, and only the class.
    let all = store.find(&person, ()).unwrap().cached().unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|o| Rc::ptr_eq(o, &alice)));

    // No statements were executed for any of this.
    assert_eq!(script.borrow().of_kind("SELECT").len(), 3);
}

#[test]
fn test_cached_rejects_tuples_and_custom_tables() {
    let (store, _script) = scripted_store();
    let person = person_class();
    let team = team_class();

    let tuple = store.find((&person, &team), ()).unwrap();
    assert!(matches!(tuple.cached(), Err(Error::Feature(_))));

    let with_tables = store
        .using(vec![storm_expr::FromExpr::from("person")])
        .find(&person, ())
        .unwrap();
    assert!(matches!(with_tables.cached(), Err(Error::Feature(_))));
}
