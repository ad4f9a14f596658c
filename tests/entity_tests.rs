/// Entity operation tests
///
/// create/update/save/delete/force_delete/restore under the wrap policy,
/// scoped overrides and the class-level entry points.
/// Run with: cargo test --test entity_tests

use memotx::{
    Entity, Error, MemoryStore, Model, Result, RowStore, Session, TransactionManager, WrapPolicy,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Post {
    title: String,
    views: i64,
}

impl Model for Post {
    const TABLE: &'static str = "posts";
    const SOFT_DELETES: bool = true;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct AuditEntry {
    message: String,
}

impl Model for AuditEntry {
    const TABLE: &'static str = "audit_log";

    fn wrap_by_default() -> bool {
        false
    }
}

type PostEntity = Entity<Post, Session>;
type AuditEntity = Entity<AuditEntry, Session>;

fn post(title: &str) -> Post {
    Post {
        title: title.to_string(),
        views: 0,
    }
}

#[tokio::test]
async fn test_create_and_find() {
    let store = MemoryStore::new();

    let created = PostEntity::create(store.connect(), json!({"title": "Hello"}))
        .await
        .unwrap();
    assert!(created.exists());
    assert!(created.created_at().is_some());
    assert_eq!(created.attributes().title, "Hello");
    assert_eq!(store.stats().await.committed, 1);

    let found = PostEntity::find(store.connect(), created.key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.attributes(), &post("Hello"));
    assert_eq!(found.created_at(), created.created_at());
}

#[tokio::test]
async fn test_save_twice_updates_in_place() {
    let store = MemoryStore::new();
    let mut entity = PostEntity::with_key(store.connect(), "p1", post("Draft"));

    entity.save().await.unwrap();
    entity.attributes_mut().views = 3;
    entity.save().await.unwrap();

    assert_eq!(store.row_count("posts").await, 1);
    let found = PostEntity::find(store.connect(), "p1").await.unwrap().unwrap();
    assert_eq!(found.attributes().views, 3);
    assert!(found.updated_at() >= found.created_at());
}

#[tokio::test]
async fn test_duplicate_key_on_create_rolls_back() {
    let store = MemoryStore::new();
    PostEntity::with_key(store.connect(), "p1", post("First"))
        .save()
        .await
        .unwrap();

    let mut clash = PostEntity::with_key(store.connect(), "p1", post("Second"));
    let err = clash.save().await.unwrap_err();

    assert!(matches!(err, Error::ConstraintViolation(_)));
    assert!(!clash.exists());
    let found = PostEntity::find(store.connect(), "p1").await.unwrap().unwrap();
    assert_eq!(found.attributes().title, "First");
    assert_eq!(store.stats().await.rolled_back, 1);
}

#[tokio::test]
async fn test_update_fills_and_persists() {
    let store = MemoryStore::new();
    let mut entity = PostEntity::create(store.connect(), json!({"title": "Old"}))
        .await
        .unwrap();

    entity.update(json!({"views": 10})).await.unwrap();

    let found = PostEntity::find(store.connect(), entity.key())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.attributes(), &Post {
        title: "Old".into(),
        views: 10
    });
}

#[tokio::test]
async fn test_update_requires_existing_entity() {
    let store = MemoryStore::new();
    let mut entity = PostEntity::new(store.connect(), post("Unsaved"));

    assert!(matches!(
        entity.update(json!({"views": 1})).await,
        Err(Error::NotFound { .. })
    ));
    assert_eq!(store.row_count("posts").await, 0);
}

#[test]
fn test_fill_rejects_bad_attributes() {
    let store = MemoryStore::new();
    let mut entity = PostEntity::new(store.connect(), post("x"));

    assert!(matches!(
        entity.fill(json!(["not", "an", "object"])),
        Err(Error::PolicyViolation(_))
    ));
    assert!(matches!(
        entity.fill(json!({"views": "many"})),
        Err(Error::Serialization(_))
    ));
    assert_eq!(entity.attributes(), &post("x"));
}

#[tokio::test]
async fn test_soft_delete_and_restore() {
    let store = MemoryStore::new();
    let mut entity = PostEntity::create(store.connect(), json!({"title": "Temp"}))
        .await
        .unwrap();
    let key = entity.key().to_string();

    assert!(entity.delete().await.unwrap());
    assert!(entity.trashed());
    assert!(!entity.delete().await.unwrap());
    assert!(PostEntity::find(store.connect(), &key).await.unwrap().is_none());
    assert!(PostEntity::all(store.connect()).await.unwrap().is_empty());

    let trashed = PostEntity::find_with_trashed(store.connect(), &key)
        .await
        .unwrap()
        .unwrap();
    assert!(trashed.trashed());

    entity.restore().await.unwrap();
    assert!(!entity.trashed());
    assert!(PostEntity::find(store.connect(), &key).await.unwrap().is_some());

    assert!(entity.force_delete().await.unwrap());
    assert!(!entity.exists());
    assert_eq!(store.row_count("posts").await, 0);
}

#[tokio::test]
async fn test_hard_delete_without_soft_deletes() {
    let store = MemoryStore::new();
    let mut entry = AuditEntity::create(store.connect(), json!({"message": "login"}))
        .await
        .unwrap();

    assert!(entry.delete().await.unwrap());
    assert_eq!(store.row_count("audit_log").await, 0);
    assert!(!entry.delete().await.unwrap());
    assert!(matches!(
        entry.restore().await,
        Err(Error::PolicyViolation(_))
    ));
}

#[tokio::test]
async fn test_refresh_reloads_committed_state() {
    let store = MemoryStore::new();
    let mut mine = PostEntity::create(store.connect(), json!({"title": "A"}))
        .await
        .unwrap();

    let mut theirs = PostEntity::find(store.connect(), mine.key())
        .await
        .unwrap()
        .unwrap();
    theirs.update(json!({"title": "B"})).await.unwrap();

    mine.refresh().await.unwrap();
    assert_eq!(mine.attributes().title, "B");

    theirs.force_delete().await.unwrap();
    assert!(matches!(mine.refresh().await, Err(Error::NotFound { .. })));
    assert!(!mine.exists());
}

#[tokio::test]
async fn test_policy_decides_wrapping() {
    let store = MemoryStore::new();

    let mut wrapped = PostEntity::new(store.connect(), post("wrapped"));
    assert!(wrapped.should_wrap());
    wrapped.save().await.unwrap();
    assert_eq!(store.stats().await.committed, 1);

    // class default: no wrapping
    let mut entry = AuditEntity::new(store.connect(), AuditEntry::default());
    assert!(!entry.should_wrap());
    entry.save().await.unwrap();
    assert_eq!(store.stats().await.committed, 1);
    assert_eq!(store.row_count("audit_log").await, 1);

    let mut forced = AuditEntity::new(store.connect(), AuditEntry::default())
        .with_policy(WrapPolicy::new(true));
    forced.save().await.unwrap();
    assert_eq!(store.stats().await.committed, 2);
}

#[tokio::test]
async fn test_without_transaction_keeps_partial_writes_and_restores_flag() {
    let store = MemoryStore::new();
    let mut entity = PostEntity::with_key(store.connect(), "p1", post("Unwrapped"));
    assert!(entity.should_wrap());

    let result: Result<()> = entity
        .without_transaction(|x| {
            Box::pin(async move {
                assert!(!x.should_wrap());
                x.save().await?;
                Err(Error::application("failed after save"))
            })
        })
        .await;

    assert!(matches!(result, Err(Error::Application(_))));
    assert!(entity.should_wrap());
    // the save ran outside any transaction, nothing rolled it back
    assert!(store.committed_row("posts", "p1").await.is_some());
    assert_eq!(store.stats().await.committed, 0);
}

#[tokio::test]
async fn test_forced_transaction_wraps_and_restores_flag() {
    let store = MemoryStore::new();
    let mut entity = PostEntity::with_key(store.connect(), "p1", post("Forced"))
        .with_policy(WrapPolicy::new(false));

    entity
        .with_forced_transaction(|x| {
            Box::pin(async move {
                assert!(x.should_wrap());
                assert!(x.connection().in_transaction());
                x.save().await
            })
        })
        .await
        .unwrap();

    assert!(!entity.should_wrap());
    assert!(!entity.connection().in_transaction());
    assert!(entity.exists());
    assert_eq!(store.stats().await.committed, 1);
}

#[tokio::test]
async fn test_forced_transaction_rolls_back_every_write() {
    let store = MemoryStore::new();
    let mut entity = PostEntity::with_key(store.connect(), "p1", post("Rolled back"))
        .with_policy(WrapPolicy::new(false));

    let result: Result<()> = entity
        .with_forced_transaction(|x| {
            Box::pin(async move {
                x.save().await?;
                x.update(json!({"views": 5})).await?;
                assert!(x.connection().fetch("posts", "p1").await?.is_some());
                Err(Error::application("abort"))
            })
        })
        .await;

    assert!(result.is_err());
    assert!(!entity.should_wrap());
    assert!(!entity.connection().in_transaction());
    assert_eq!(store.row_count("posts").await, 0);
    let stats = store.stats().await;
    assert_eq!(stats.committed, 0);
    assert_eq!(stats.rolled_back, 1);
}

#[tokio::test]
async fn test_dropped_forced_transaction_releases_connection() {
    let store = MemoryStore::new();
    let mut entity = PostEntity::with_key(store.connect(), "p1", post("Slow"))
        .with_policy(WrapPolicy::new(false));

    let timed_out = tokio::time::timeout(
        Duration::from_millis(20),
        entity.with_forced_transaction(|x| {
            Box::pin(async move {
                x.save().await?;
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
        }),
    )
    .await;

    assert!(timed_out.is_err());
    assert!(!entity.should_wrap());
    assert!(!entity.connection().in_transaction());
    let stats = store.stats().await;
    assert_eq!(stats.active, 0);
    assert_eq!(stats.rolled_back, 1);
    assert_eq!(store.row_count("posts").await, 0);

    // later writes reach committed storage again
    entity.save().await.unwrap();
    assert!(store.committed_row("posts", "p1").await.is_some());
}

#[tokio::test]
async fn test_nested_overrides_restore_in_stack_order() {
    let store = MemoryStore::new();
    let mut entity = PostEntity::with_key(store.connect(), "p1", post("Nested"))
        .with_policy(WrapPolicy::new(false));

    entity
        .with_forced_transaction(|outer| {
            Box::pin(async move {
                let inner: Result<()> = outer
                    .without_transaction(|inner| {
                        Box::pin(async move {
                            assert!(!inner.should_wrap());
                            Err(Error::application("inner fails"))
                        })
                    })
                    .await;
                assert!(inner.is_err());

                // restored to the forced value, not the original one
                assert!(outer.should_wrap());
                outer.save().await
            })
        })
        .await
        .unwrap();

    assert!(!entity.should_wrap());
    assert!(store.committed_row("posts", "p1").await.is_some());
}

#[tokio::test]
async fn test_class_level_entry_points_follow_model_default() {
    let store = MemoryStore::new();
    let session = store.connect();

    let result: Result<()> = PostEntity::with_transaction(&session, |tx| async move {
        assert!(tx.in_transaction());
        tx.insert("posts", "a", json!({})).await?;
        Err(Error::application("rolled back"))
    })
    .await;
    assert!(result.is_err());
    assert_eq!(store.row_count("posts").await, 0);

    let result: Result<()> = AuditEntity::transactional(&session, |conn| async move {
        assert!(!conn.in_transaction());
        conn.insert("audit_log", "a", json!({})).await?;
        Err(Error::application("not rolled back"))
    })
    .await;
    assert!(result.is_err());
    assert_eq!(store.row_count("audit_log").await, 1);
}

#[tokio::test]
async fn test_writes_join_an_enclosing_transaction() {
    let store = MemoryStore::new();
    let session = store.connect();

    let result: Result<()> = memotx::transaction(&session, |tx| async move {
        let mut first = PostEntity::with_key(tx.clone(), "p1", post("one"));
        let mut second = PostEntity::with_key(tx, "p2", post("two"));
        first.save().await?;
        second.save().await?;
        Err(Error::application("abort both"))
    })
    .await;

    assert!(result.is_err());
    assert_eq!(store.row_count("posts").await, 0);
    assert_eq!(store.stats().await.committed, 0);
}
