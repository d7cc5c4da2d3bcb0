use chrono::Duration;
use progress_core::model::{
    CourseId, ItemId, LessonState, LessonStatus, ProgressLedger, Scope, UserId,
};
use progress_core::time::fixed_now;
use storage::keys::{anonymous_course, progress_key, progress_prefix};
use storage::ledger_codec;
use storage::repository::{
    LocalCache, RemoteCompletionRow, RemoteLessonLedger, RemoteLessonRow, RemoteProgressLedger,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let repo = SqliteRepository::connect(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_cache_round_trips_ledger() {
    let repo = connect("memdb_cache_roundtrip").await;
    let course = CourseId::new("html-fundamentals").unwrap();
    let key = progress_key(&course, &Scope::Anonymous);

    let mut ledger = ProgressLedger::new();
    ledger.record(ItemId::new("l1").unwrap(), fixed_now());
    ledger.record(ItemId::new("l3").unwrap(), fixed_now() + Duration::minutes(5));
    repo.put(&key, &ledger_codec::encode(&ledger).unwrap())
        .await
        .unwrap();

    let raw = repo.get(&key).await.unwrap().expect("stored");
    assert_eq!(ledger_codec::decode(&raw).unwrap(), ledger);

    // Overwrite keeps a single row per key.
    repo.put(&key, "{}").await.unwrap();
    assert_eq!(repo.get(&key).await.unwrap().as_deref(), Some("{}"));

    repo.remove(&key).await.unwrap();
    assert_eq!(repo.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn sqlite_cache_prefix_scan_finds_anonymous_ledgers() {
    let repo = connect("memdb_prefix_scan").await;
    repo.put("progress:html-fundamentals", "{}").await.unwrap();
    repo.put("progress:js-basics", "{}").await.unwrap();
    repo.put("progress:js-basics:u-1", "{}").await.unwrap();
    repo.put("last_lesson", "/html/l1").await.unwrap();

    let anonymous: Vec<CourseId> = repo
        .keys_with_prefix(&progress_prefix())
        .await
        .unwrap()
        .iter()
        .filter_map(|key| anonymous_course(key))
        .collect();

    assert_eq!(
        anonymous,
        [
            CourseId::new("html-fundamentals").unwrap(),
            CourseId::new("js-basics").unwrap()
        ]
    );
}

#[tokio::test]
async fn sqlite_remote_upsert_is_unique_per_triple() {
    let repo = connect("memdb_remote_upsert").await;
    let user = UserId::new("u-1").unwrap();
    let course = CourseId::new("html-fundamentals").unwrap();
    let row = RemoteCompletionRow {
        user_id: user.clone(),
        course_id: course.clone(),
        item_id: ItemId::new("l2").unwrap(),
        completed_at: fixed_now(),
    };

    repo.upsert_completion(&row).await.unwrap();
    repo.upsert_completion(&RemoteCompletionRow {
        completed_at: fixed_now() + Duration::hours(1),
        ..row.clone()
    })
    .await
    .unwrap();

    let records = repo.completions(&user, &course).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].item_id.as_str(), "l2");
    assert_eq!(records[0].completed_at, fixed_now() + Duration::hours(1));

    let other = UserId::new("u-2").unwrap();
    assert!(repo.completions(&other, &course).await.unwrap().is_empty());
}

#[tokio::test]
async fn migrations_are_idempotent() {
    let repo = connect("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
    repo.put("k", "v").await.unwrap();
    assert_eq!(repo.get("k").await.unwrap().as_deref(), Some("v"));
}

#[tokio::test]
async fn sqlite_lesson_rows_upsert_on_user_and_lesson() {
    let repo = connect("memdb_lesson_rows").await;
    let user = UserId::new("u-1").unwrap();
    let lesson = ItemId::new("html-1").unwrap();

    let opened = RemoteLessonRow {
        user_id: user.clone(),
        lesson_id: lesson.clone(),
        state: LessonState::opened(fixed_now()),
    };
    repo.upsert_lesson(&opened).await.unwrap();
    repo.upsert_lesson(&RemoteLessonRow {
        state: LessonState::finished(fixed_now() + Duration::minutes(20)),
        ..opened
    })
    .await
    .unwrap();

    let book = repo.lessons(&user).await.unwrap();
    assert_eq!(book.len(), 1);
    let state = book.get(&lesson).unwrap();
    assert_eq!(state.status, LessonStatus::Completed);
    assert_eq!(state.percent, 100);
    assert_eq!(state.updated_at, fixed_now() + Duration::minutes(20));
}
