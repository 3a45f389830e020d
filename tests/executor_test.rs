use anyhow::Result;

use rilldb::catalog::CatalogError;
use rilldb::query::executor::{
    Aggregate, AggregationExecutor, DeleteExecutor, Executor, IndexScanExecutor, InsertExecutor,
    LimitExecutor, NestedIndexJoinExecutor, NestedLoopJoinExecutor, SeqScanExecutor,
    UpdateExecutor,
};
use rilldb::storage::tuple::{Schema, Tuple, Value};
use rilldb::transaction::IsolationLevel;

mod common;
use common::{create_test_engine, TestEngine};

fn user_row(id: i64, name: &str, active: bool) -> Tuple {
    Tuple::new(vec![
        Value::Integer(id),
        Value::Text(name.to_string()),
        Value::Boolean(active),
    ])
}

fn setup_users(engine: &TestEngine, rows: &[Tuple]) -> Result<()> {
    engine.catalog.create_table(
        "users",
        Schema::new(vec!["id".into(), "name".into(), "active".into()]),
    )?;
    engine
        .catalog
        .create_index("users_pk", "users", 0, 8, 8)?;

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let mut insert = InsertExecutor::from_values(ctx, "users", rows.to_vec());
    insert.init()?;
    assert!(insert.next()?.is_none());
    engine.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_seq_scan_with_predicate() -> Result<()> {
    let engine = create_test_engine(64)?;
    setup_users(
        &engine,
        &[
            user_row(1, "ada", true),
            user_row(2, "bob", false),
            user_row(3, "cyd", true),
        ],
    )?;

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let mut scan = SeqScanExecutor::new(
        ctx,
        "users",
        Some(Box::new(|t| t.value(2) == &Value::Boolean(true))),
    );
    scan.init()?;

    let mut ids = Vec::new();
    while let Some((tuple, _rid)) = scan.next()? {
        ids.push(tuple.value(0).clone());
    }
    assert_eq!(ids, vec![Value::Integer(1), Value::Integer(3)]);

    // REPEATABLE READ holds one shared lock per emitted row; the filtered
    // row was read and locked too.
    assert_eq!(txn.shared_lock_count(), 3);
    engine.txn_manager.commit(&txn)?;
    assert_eq!(txn.shared_lock_count(), 0);
    Ok(())
}

#[test]
fn test_seq_scan_read_committed_releases_early() -> Result<()> {
    let engine = create_test_engine(64)?;
    setup_users(&engine, &[user_row(1, "ada", true), user_row(2, "bob", true)])?;

    let txn = engine.begin(IsolationLevel::ReadCommitted);
    let ctx = engine.context(&txn);
    let mut scan = SeqScanExecutor::new(ctx, "users", None);
    scan.init()?;
    while scan.next()?.is_some() {}

    // Every shared lock was given back as soon as its row was copied.
    assert_eq!(txn.shared_lock_count(), 0);
    engine.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_index_scan_bounds() -> Result<()> {
    let engine = create_test_engine(64)?;
    setup_users(
        &engine,
        &[
            user_row(5, "eve", true),
            user_row(1, "ada", true),
            user_row(3, "cyd", true),
            user_row(4, "dan", true),
            user_row(2, "bob", true),
        ],
    )?;

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let index = engine.catalog.get_index_by_name("users_pk").unwrap();
    let mut scan = IndexScanExecutor::new(
        ctx,
        index,
        Some(Value::Integer(2)),
        Some(Value::Integer(4)),
        None,
    );
    scan.init()?;

    let mut ids = Vec::new();
    while let Some((tuple, _)) = scan.next()? {
        ids.push(tuple.value(0).clone());
    }
    assert_eq!(
        ids,
        vec![Value::Integer(2), Value::Integer(3), Value::Integer(4)]
    );
    engine.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_insert_mirrors_into_index() -> Result<()> {
    let engine = create_test_engine(64)?;
    setup_users(&engine, &[user_row(10, "ada", true)])?;

    let index = engine.catalog.get_index_by_name("users_pk").unwrap();
    let rid = index.scan_key(&Value::Integer(10))?.expect("indexed");

    let table = engine.catalog.get_table_by_name("users").unwrap();
    let tuple = table.heap.get_tuple(rid)?.expect("row present");
    assert_eq!(tuple.value(1), &Value::Text("ada".into()));
    Ok(())
}

#[test]
fn test_create_index_rejects_duplicate_keys() -> Result<()> {
    let engine = create_test_engine(64)?;
    engine.catalog.create_table(
        "events",
        Schema::new(vec!["id".into(), "kind".into()]),
    )?;

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let mut insert = InsertExecutor::from_values(
        ctx,
        "events",
        vec![
            Tuple::new(vec![Value::Integer(1), Value::Text("signup".into())]),
            Tuple::new(vec![Value::Integer(2), Value::Text("signup".into())]),
            Tuple::new(vec![Value::Integer(3), Value::Text("login".into())]),
        ],
    );
    insert.init()?;
    insert.next()?;
    engine.txn_manager.commit(&txn)?;

    // "kind" holds duplicates; a unique index over it must refuse to build
    // and must not register anything.
    assert!(matches!(
        engine.catalog.create_index("events_idx", "events", 1, 8, 8),
        Err(CatalogError::DuplicateIndexKey { .. })
    ));
    assert!(engine.catalog.get_index_by_name("events_idx").is_none());

    // The failed attempt left no header record behind, so the same name
    // builds cleanly over the unique column.
    let index = engine.catalog.create_index("events_idx", "events", 0, 8, 8)?;
    for id in 1..=3 {
        assert!(index.scan_key(&Value::Integer(id))?.is_some());
    }
    assert!(index.scan_key(&Value::Text("signup".into()))?.is_none());
    Ok(())
}

#[test]
fn test_update_rewrites_row_and_index() -> Result<()> {
    let engine = create_test_engine(64)?;
    setup_users(&engine, &[user_row(1, "ada", true), user_row(2, "bob", true)])?;

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let scan = SeqScanExecutor::new(
        ctx.clone(),
        "users",
        Some(Box::new(|t| t.value(0) == &Value::Integer(2))),
    );
    let mut update = UpdateExecutor::new(
        ctx,
        "users",
        Box::new(scan),
        Box::new(|t| {
            let mut values = t.values.clone();
            values[0] = Value::Integer(20);
            values[1] = Value::Text("bobby".into());
            Tuple::new(values)
        }),
    );
    update.init()?;
    assert!(update.next()?.is_none());
    engine.txn_manager.commit(&txn)?;

    let index = engine.catalog.get_index_by_name("users_pk").unwrap();
    assert!(index.scan_key(&Value::Integer(2))?.is_none());
    let rid = index.scan_key(&Value::Integer(20))?.expect("new key");
    let table = engine.catalog.get_table_by_name("users").unwrap();
    let tuple = table.heap.get_tuple(rid)?.expect("row present");
    assert_eq!(tuple.value(1), &Value::Text("bobby".into()));
    Ok(())
}

#[test]
fn test_delete_removes_row_and_index() -> Result<()> {
    let engine = create_test_engine(64)?;
    setup_users(&engine, &[user_row(1, "ada", true), user_row(2, "bob", true)])?;

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let scan = SeqScanExecutor::new(
        ctx.clone(),
        "users",
        Some(Box::new(|t| t.value(0) == &Value::Integer(1))),
    );
    let mut delete = DeleteExecutor::new(ctx.clone(), "users", Box::new(scan));
    delete.init()?;
    assert!(delete.next()?.is_none());
    engine.txn_manager.commit(&txn)?;

    let index = engine.catalog.get_index_by_name("users_pk").unwrap();
    assert!(index.scan_key(&Value::Integer(1))?.is_none());

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let mut scan = SeqScanExecutor::new(ctx, "users", None);
    scan.init()?;
    let mut remaining = Vec::new();
    while let Some((tuple, _)) = scan.next()? {
        remaining.push(tuple.value(0).clone());
    }
    assert_eq!(remaining, vec![Value::Integer(2)]);
    engine.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_abort_rolls_back_heap_and_index() -> Result<()> {
    let engine = create_test_engine(64)?;
    setup_users(&engine, &[user_row(1, "ada", true)])?;

    // Insert and delete inside a transaction, then abort it.
    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);

    let mut insert =
        InsertExecutor::from_values(ctx.clone(), "users", vec![user_row(2, "bob", true)]);
    insert.init()?;
    insert.next()?;

    let scan = SeqScanExecutor::new(
        ctx.clone(),
        "users",
        Some(Box::new(|t| t.value(0) == &Value::Integer(1))),
    );
    let mut delete = DeleteExecutor::new(ctx, "users", Box::new(scan));
    delete.init()?;
    delete.next()?;

    engine.txn_manager.abort(&txn)?;

    // The insert is gone, the delete undone, on both the heap and the index.
    let index = engine.catalog.get_index_by_name("users_pk").unwrap();
    assert!(index.scan_key(&Value::Integer(2))?.is_none());
    let rid = index.scan_key(&Value::Integer(1))?.expect("restored");
    let table = engine.catalog.get_table_by_name("users").unwrap();
    assert!(table.heap.get_tuple(rid)?.is_some());

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let mut scan = SeqScanExecutor::new(ctx, "users", None);
    scan.init()?;
    let mut ids = Vec::new();
    while let Some((tuple, _)) = scan.next()? {
        ids.push(tuple.value(0).clone());
    }
    assert_eq!(ids, vec![Value::Integer(1)]);
    engine.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_nested_loop_join() -> Result<()> {
    let engine = create_test_engine(64)?;
    setup_users(&engine, &[user_row(1, "ada", true), user_row(2, "bob", true)])?;

    engine.catalog.create_table(
        "orders",
        Schema::new(vec!["order_id".into(), "user_id".into()]),
    )?;
    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let mut insert = InsertExecutor::from_values(
        ctx.clone(),
        "orders",
        vec![
            Tuple::new(vec![Value::Integer(100), Value::Integer(1)]),
            Tuple::new(vec![Value::Integer(101), Value::Integer(2)]),
            Tuple::new(vec![Value::Integer(102), Value::Integer(1)]),
        ],
    );
    insert.init()?;
    insert.next()?;
    engine.txn_manager.commit(&txn)?;

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let left = SeqScanExecutor::new(ctx.clone(), "orders", None);
    let right = SeqScanExecutor::new(ctx.clone(), "users", None);
    let mut join = NestedLoopJoinExecutor::new(
        ctx,
        Box::new(left),
        Box::new(right),
        Box::new(|order, user| order.value(1) == user.value(0)),
    );
    join.init()?;

    let mut pairs = Vec::new();
    while let Some((tuple, _)) = join.next()? {
        // order_id ++ joined user name
        pairs.push((tuple.value(0).clone(), tuple.value(3).clone()));
    }
    assert_eq!(
        pairs,
        vec![
            (Value::Integer(100), Value::Text("ada".into())),
            (Value::Integer(101), Value::Text("bob".into())),
            (Value::Integer(102), Value::Text("ada".into())),
        ]
    );
    engine.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_nested_index_join() -> Result<()> {
    let engine = create_test_engine(64)?;
    setup_users(&engine, &[user_row(1, "ada", true), user_row(3, "cyd", true)])?;

    engine.catalog.create_table(
        "orders",
        Schema::new(vec!["order_id".into(), "user_id".into()]),
    )?;
    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let mut insert = InsertExecutor::from_values(
        ctx.clone(),
        "orders",
        vec![
            Tuple::new(vec![Value::Integer(100), Value::Integer(1)]),
            Tuple::new(vec![Value::Integer(101), Value::Integer(2)]),
            Tuple::new(vec![Value::Integer(102), Value::Integer(3)]),
        ],
    );
    insert.init()?;
    insert.next()?;
    engine.txn_manager.commit(&txn)?;

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let outer = SeqScanExecutor::new(ctx.clone(), "orders", None);
    let index = engine.catalog.get_index_by_name("users_pk").unwrap();
    let mut join = NestedIndexJoinExecutor::new(ctx, Box::new(outer), 1, index);
    join.init()?;

    let mut pairs = Vec::new();
    while let Some((tuple, _)) = join.next()? {
        pairs.push((tuple.value(0).clone(), tuple.value(3).clone()));
    }
    // The order with user_id=2 has no match and is dropped.
    assert_eq!(
        pairs,
        vec![
            (Value::Integer(100), Value::Text("ada".into())),
            (Value::Integer(102), Value::Text("cyd".into())),
        ]
    );
    engine.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_aggregation_with_group_by_and_having() -> Result<()> {
    let engine = create_test_engine(64)?;
    setup_users(
        &engine,
        &[
            user_row(1, "ada", true),
            user_row(2, "bob", false),
            user_row(3, "cyd", true),
            user_row(4, "dan", true),
        ],
    )?;

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let scan = SeqScanExecutor::new(ctx, "users", None);
    // GROUP BY active: COUNT(*), SUM(id), MIN(id), MAX(id)
    let mut agg = AggregationExecutor::new(
        Box::new(scan),
        vec![2],
        vec![
            Aggregate::CountStar,
            Aggregate::Sum(0),
            Aggregate::Min(0),
            Aggregate::Max(0),
        ],
        None,
    );
    agg.init()?;

    let mut rows = Vec::new();
    while let Some((tuple, _)) = agg.next()? {
        rows.push(tuple.values);
    }
    // Groups come out in first-seen order: active=true then active=false.
    assert_eq!(
        rows,
        vec![
            vec![
                Value::Boolean(true),
                Value::Integer(3),
                Value::Integer(8),
                Value::Integer(1),
                Value::Integer(4),
            ],
            vec![
                Value::Boolean(false),
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(2),
                Value::Integer(2),
            ],
        ]
    );
    engine.txn_manager.commit(&txn)?;

    // HAVING COUNT(*) > 1 keeps only the active group.
    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let scan = SeqScanExecutor::new(ctx, "users", None);
    let mut agg = AggregationExecutor::new(
        Box::new(scan),
        vec![2],
        vec![Aggregate::CountStar],
        Some(Box::new(|_, aggs| aggs[0] > Value::Integer(1))),
    );
    agg.init()?;
    let mut rows = Vec::new();
    while let Some((tuple, _)) = agg.next()? {
        rows.push(tuple.values);
    }
    assert_eq!(rows, vec![vec![Value::Boolean(true), Value::Integer(3)]]);
    engine.txn_manager.commit(&txn)?;
    Ok(())
}

#[test]
fn test_limit() -> Result<()> {
    let engine = create_test_engine(64)?;
    setup_users(
        &engine,
        &[
            user_row(1, "ada", true),
            user_row(2, "bob", true),
            user_row(3, "cyd", true),
        ],
    )?;

    let txn = engine.begin(IsolationLevel::RepeatableRead);
    let ctx = engine.context(&txn);
    let scan = SeqScanExecutor::new(ctx, "users", None);
    let mut limit = LimitExecutor::new(Box::new(scan), 2);
    limit.init()?;

    let mut count = 0;
    while limit.next()?.is_some() {
        count += 1;
    }
    assert_eq!(count, 2);
    engine.txn_manager.commit(&txn)?;
    Ok(())
}
