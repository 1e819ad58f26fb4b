mod common;

use common::{id_of, object, schema, setup, without_id, TestContext};
use modulux::CmsError;
use serde_json::{json, Value};

async fn gallery(ctx: &TestContext) {
    ctx.app
        .collections
        .create_collection(schema(json!({
            "name": "gallery",
            "title": "Gallery",
            "fields": [
                { "name": "title", "fieldType": "TextField" },
                { "name": "photos", "fieldType": "ImageField" }
            ]
        })))
        .await
        .unwrap();
}

fn photo(key: &str) -> Value {
    json!({ "originalName": format!("{}.png", key), "key": key, "size": 42 })
}

async fn store_blob(ctx: &TestContext, key: &str) {
    ctx.app.files.put_object(key, b"png").await.unwrap();
}

async fn blob_exists(ctx: &TestContext, key: &str) -> bool {
    ctx.app.files.read_object(key).await.unwrap().is_some()
}

#[tokio::test]
async fn test_entries_require_collection() {
    let ctx = setup().await;

    let err = ctx
        .app
        .entries
        .add_entry("missing", object(json!({ "a": 1 })))
        .await
        .unwrap_err();
    assert!(matches!(err, CmsError::NotFound { .. }));
    assert_eq!(err.field_error().unwrap().path, "collectionName");
}

#[tokio::test]
async fn test_add_and_get_entry_signs_images() {
    let ctx = setup().await;
    gallery(&ctx).await;

    let created = ctx
        .app
        .entries
        .add_entry(
            "gallery",
            object(json!({ "_id": "ignored", "title": "a", "photos": [photo("p1")] })),
        )
        .await
        .unwrap();
    assert_ne!(created["_id"], "ignored");

    let fetched = ctx
        .app
        .entries
        .get_entry("gallery", &id_of(&created))
        .await
        .unwrap();
    let url = fetched["photos"][0]["signedUrl"].as_str().unwrap();
    assert!(url.starts_with("http://cms.test/files/p1?expires="));
    assert_eq!(fetched["title"], "a");
}

#[tokio::test]
async fn test_get_missing_entry_is_not_found() {
    let ctx = setup().await;
    gallery(&ctx).await;

    let err = ctx
        .app
        .entries
        .get_entry("gallery", "no-such-id")
        .await
        .unwrap_err();
    assert_eq!(err.field_error().unwrap().path, "entryId");
    assert!(matches!(err, CmsError::NotFound { .. }));
}

#[tokio::test]
async fn test_update_merges_and_deletes_orphaned_blobs() {
    let ctx = setup().await;
    gallery(&ctx).await;
    store_blob(&ctx, "p1").await;
    store_blob(&ctx, "p2").await;

    let created = ctx
        .app
        .entries
        .add_entry(
            "gallery",
            object(json!({ "title": "a", "photos": [photo("p1"), photo("p2")], "extra": 1 })),
        )
        .await
        .unwrap();
    let id = id_of(&created);

    // A client sending back what it read, minus one photo
    let mut kept = created["photos"][1].clone();
    kept["signedUrl"] = json!("http://cms.test/files/p2?expires=1&signature=x");
    let updated = ctx
        .app
        .entries
        .update_entry(
            "gallery",
            &id,
            object(json!({ "_id": "other", "title": "b", "photos": [kept] })),
        )
        .await
        .unwrap();

    assert_eq!(updated.cleanup.deleted, vec!["p1"]);
    assert!(updated.cleanup.is_clean());
    assert!(!blob_exists(&ctx, "p1").await);
    assert!(blob_exists(&ctx, "p2").await);

    assert_eq!(updated.entry["_id"], id.as_str());
    assert_eq!(updated.entry["title"], "b");
    assert_eq!(updated.entry["extra"], 1);

    // Expired links are never stored
    let raw = ctx.app.entries.list_entries("gallery").await.unwrap();
    let signed = raw[0]["photos"][0]["signedUrl"].as_str().unwrap();
    assert!(!signed.contains("expires=1&"));
}

#[tokio::test]
async fn test_update_missing_entry_is_not_found() {
    let ctx = setup().await;
    gallery(&ctx).await;

    let err = ctx
        .app
        .entries
        .update_entry("gallery", "missing", object(json!({ "title": "x" })))
        .await
        .unwrap_err();
    assert!(matches!(err, CmsError::NotFound { .. }));
}

#[tokio::test]
async fn test_delete_entries_cleans_up_blobs() {
    let ctx = setup().await;
    gallery(&ctx).await;
    store_blob(&ctx, "p1").await;
    store_blob(&ctx, "p2").await;

    let a = ctx
        .app
        .entries
        .add_entry("gallery", object(json!({ "photos": [photo("p1")] })))
        .await
        .unwrap();
    let b = ctx
        .app
        .entries
        .add_entry("gallery", object(json!({ "photos": [photo("p2")] })))
        .await
        .unwrap();

    let outcome = ctx
        .app
        .entries
        .delete_entries("gallery", &[id_of(&a), "missing".to_string()])
        .await
        .unwrap();
    assert_eq!(outcome.deleted, 1);

    let report = outcome.cleanup.await.unwrap();
    assert_eq!(report.deleted, vec!["p1"]);
    assert!(!blob_exists(&ctx, "p1").await);
    assert!(blob_exists(&ctx, "p2").await);

    let remaining = ctx.app.entries.list_entries("gallery").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0]["_id"], b["_id"]);
}

#[tokio::test]
async fn test_delete_entries_rejects_unknown_ids() {
    let ctx = setup().await;
    gallery(&ctx).await;

    for ids in [vec![], vec!["missing".to_string()]] {
        let err = ctx
            .app
            .entries
            .delete_entries("gallery", &ids)
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::BadRequest { .. }));
        assert_eq!(err.field_error().unwrap().path, "entryIds");
    }
}

#[tokio::test]
async fn test_delete_collection_cleans_up_blobs() {
    let ctx = setup().await;
    gallery(&ctx).await;
    store_blob(&ctx, "p1").await;

    ctx.app
        .entries
        .add_entry("gallery", object(json!({ "photos": [photo("p1"), photo("gone")] })))
        .await
        .unwrap();

    let report = ctx
        .app
        .collections
        .delete_collection("gallery")
        .await
        .unwrap()
        .await
        .unwrap();

    // Missing blobs count as deleted
    let mut deleted = report.deleted.clone();
    deleted.sort();
    assert_eq!(deleted, vec!["gone", "p1"]);
    assert!(!blob_exists(&ctx, "p1").await);
}

#[tokio::test]
async fn test_get_collection_returns_schema_and_entries() {
    let ctx = setup().await;
    gallery(&ctx).await;
    ctx.app
        .entries
        .add_entry("gallery", object(json!({ "title": "a" })))
        .await
        .unwrap();

    let view = ctx.app.entries.get_collection("Gallery").await.unwrap();
    assert_eq!(view.schema.name, "gallery");
    assert_eq!(
        view.entries.into_iter().map(without_id).collect::<Vec<_>>(),
        vec![json!({ "title": "a" })]
    );
}

#[tokio::test]
async fn test_invalid_image_keys_are_rejected_before_writing() {
    let ctx = setup().await;
    gallery(&ctx).await;

    for key in ["uploads//a.png", "../x.png", "a\\b.png"] {
        let err = ctx
            .app
            .entries
            .add_entry("gallery", object(json!({ "photos": [photo(key)] })))
            .await
            .unwrap_err();
        assert!(matches!(err, CmsError::BadRequest { .. }));
        assert_eq!(err.field_error().unwrap().path, "photos");
    }
    assert!(ctx.app.entries.list_entries("gallery").await.unwrap().is_empty());

    let created = ctx
        .app
        .entries
        .add_entry("gallery", object(json!({ "photos": [photo("p1")] })))
        .await
        .unwrap();
    let err = ctx
        .app
        .entries
        .update_entry(
            "gallery",
            &id_of(&created),
            object(json!({ "photos": [photo("p1"), photo("/abs.png")] })),
        )
        .await
        .unwrap_err();
    assert_eq!(err.field_error().unwrap().path, "photos");

    let stored = ctx
        .app
        .entries
        .get_entry("gallery", &id_of(&created))
        .await
        .unwrap();
    assert_eq!(stored["photos"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_stored_bad_image_key_does_not_break_reads() {
    let ctx = setup().await;
    gallery(&ctx).await;
    ctx.app
        .entries
        .add_entry("gallery", object(json!({ "title": "good", "photos": [photo("p1")] })))
        .await
        .unwrap();

    // A row written before keys were checked
    let data = json!({ "title": "bad", "photos": [photo("uploads//a.png"), photo("p2")] });
    sqlx::query(
        "INSERT INTO entries_gallery (id, data, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind("legacy")
    .bind(data.to_string())
    .bind("2024-01-01T00:00:00+00:00")
    .bind("2024-01-01T00:00:00+00:00")
    .execute(&ctx.app.pool)
    .await
    .unwrap();

    let entries = ctx.app.entries.list_entries("gallery").await.unwrap();
    assert_eq!(entries.len(), 2);

    let legacy = ctx.app.entries.get_entry("gallery", "legacy").await.unwrap();
    assert!(legacy["photos"][0].get("signedUrl").is_none());
    assert!(legacy["photos"][1]["signedUrl"]
        .as_str()
        .unwrap()
        .starts_with("http://cms.test/files/p2?"));

    let view = ctx.app.entries.get_collection("gallery").await.unwrap();
    assert_eq!(view.entries.len(), 2);
}
