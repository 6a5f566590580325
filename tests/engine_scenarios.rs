//! End-to-end scenarios through the storage context.

use leafdb::record::{self, Column, ColumnType, Key, TableSchema, Value};
use leafdb::{EngineConfig, Error, IndexDescriptor, Operation, OperationOutcome, SpaceId, StorageContext};
use tempfile::tempdir;

fn users() -> TableSchema {
    TableSchema::new(
        "users",
        vec![
            Column::new("id", ColumnType::Int).primary_key(),
            Column::new("name", ColumnType::Varchar(10)),
        ],
    )
}

fn user(id: i32) -> Vec<Value> {
    vec![Value::Int(id), Value::Str(format!("name{id}"))]
}

fn open(dir: &std::path::Path, capacity: usize) -> StorageContext {
    let config = EngineConfig::new(dir)
        .with_pool_capacity(capacity)
        .with_sync_on_flush(false);
    StorageContext::open(config).unwrap()
}

/// Order-3 table, keys 1..=10 ascending, then a delete in the middle.
#[test]
fn test_order_three_table() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path(), 64);
    ctx.open_index(IndexDescriptor::new("users", SpaceId::new(1), 3, users()))
        .unwrap();

    for id in 1..=10 {
        ctx.insert("users", &user(id)).unwrap();
    }

    assert_eq!(ctx.search("users", &Key::from(7)).unwrap(), Some(user(7)));

    assert!(ctx.delete("users", &Key::from(5)).unwrap());
    assert_eq!(ctx.search("users", &Key::from(5)).unwrap(), None);
    assert_eq!(ctx.search("users", &Key::from(4)).unwrap(), Some(user(4)));
    assert_eq!(ctx.search("users", &Key::from(6)).unwrap(), Some(user(6)));
}

/// VARCHAR values at the length limit and empty both survive storage.
#[test]
fn test_varchar_edges_through_tree() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path(), 16);
    ctx.open_index(IndexDescriptor::new("users", SpaceId::new(1), 4, users()))
        .unwrap();

    let full = vec![Value::Int(1), Value::from("abcdefghij")];
    let empty = vec![Value::Int(2), Value::from("")];
    ctx.insert("users", &full).unwrap();
    ctx.insert("users", &empty).unwrap();

    assert_eq!(ctx.search("users", &Key::from(1)).unwrap(), Some(full.clone()));
    assert_eq!(ctx.search("users", &Key::from(2)).unwrap(), Some(empty.clone()));

    let columns = users().columns().to_vec();
    for row in [full, empty] {
        let bytes = record::encode(&row, &columns).unwrap();
        assert_eq!(record::decode(&bytes, &columns).unwrap(), row);
    }

    let too_long = vec![Value::Int(3), Value::from("abcdefghijk")];
    let err = ctx.insert("users", &too_long).unwrap_err();
    assert!(matches!(err, Error::Codec(_)));
    assert!(err.is_user_facing());
}

/// Data written through a small pool survives closing and reopening.
#[test]
fn test_reopen_after_close() {
    let dir = tempdir().unwrap();
    {
        let ctx = open(dir.path(), 8);
        ctx.open_index(IndexDescriptor::new("users", SpaceId::new(1), 5, users()))
            .unwrap();
        for id in (0..500).rev() {
            ctx.insert("users", &user(id)).unwrap();
        }
        for id in (0..500).step_by(3) {
            assert!(ctx.delete("users", &Key::from(id)).unwrap());
        }
        ctx.close().unwrap();
    }

    let ctx = open(dir.path(), 8);
    ctx.open_index(IndexDescriptor::new("users", SpaceId::new(1), 5, users()))
        .unwrap();
    for id in 0..500 {
        let expected = if id % 3 == 0 { None } else { Some(user(id)) };
        assert_eq!(ctx.search("users", &Key::from(id)).unwrap(), expected, "key {id}");
    }
}

/// Dropping the context without `close` still flushes.
#[test]
fn test_drop_flushes() {
    let dir = tempdir().unwrap();
    {
        let ctx = open(dir.path(), 32);
        ctx.open_index(IndexDescriptor::new("users", SpaceId::new(1), 8, users()))
            .unwrap();
        for id in 0..50 {
            ctx.insert("users", &user(id)).unwrap();
        }
    }

    let ctx = open(dir.path(), 32);
    ctx.open_index(IndexDescriptor::new("users", SpaceId::new(1), 8, users()))
        .unwrap();
    assert_eq!(ctx.search("users", &Key::from(49)).unwrap(), Some(user(49)));
}

/// Two tables in separate spaces share one pool without interfering.
#[test]
fn test_two_tables() {
    let dir = tempdir().unwrap();
    let ctx = open(dir.path(), 16);
    let items = TableSchema::new(
        "items",
        vec![
            Column::new("sku", ColumnType::Char(4)).primary_key(),
            Column::new("bin", ColumnType::Int).primary_key(),
            Column::new("price", ColumnType::Decimal).nullable(),
        ],
    );
    ctx.open_index(IndexDescriptor::new("users", SpaceId::new(1), 4, users()))
        .unwrap();
    ctx.open_index(IndexDescriptor::new("items", SpaceId::new(2), 4, items))
        .unwrap();

    for id in 0..40 {
        ctx.insert("users", &user(id)).unwrap();
        let item = vec![
            Value::from(format!("s{:03}", id % 7)),
            Value::Int(id),
            if id % 2 == 0 { Value::Null } else { Value::Decimal(id as f64 * 1.5) },
        ];
        ctx.insert("items", &item).unwrap();
    }

    let key = Key::new(vec![Value::from("s003"), Value::Int(17)]);
    let outcome = ctx.execute("items", Operation::Search { key }).unwrap();
    assert_eq!(
        outcome,
        OperationOutcome::Row(Some(vec![
            Value::from("s003"),
            Value::Int(17),
            Value::Decimal(25.5)
        ]))
    );
    assert_eq!(ctx.search("users", &Key::from(39)).unwrap(), Some(user(39)));
    assert_eq!(ctx.tables(), vec!["items".to_string(), "users".to_string()]);
}
