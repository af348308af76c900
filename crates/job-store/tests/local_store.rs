use cartwright_core_types::{ChatId, FulfillmentMode, Item, JobStatus};
use cartwright_job_store::{JobStore, LocalJobStore, StoreError};

#[tokio::test]
async fn snapshot_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("jobs.json");
    let chat = ChatId::new("555");

    let job_id = {
        let store = LocalJobStore::open(&path).await.unwrap();
        let mut record = store.ensure_chat(&chat).await.unwrap();
        record.postal_code = Some("M5V3A1".into());
        record.fulfillment_mode = FulfillmentMode::Pickup;
        store.save_chat(record).await.unwrap();
        store
            .add_items(
                &chat,
                vec![
                    Item::new("milk", 2).with_brand("Natrel"),
                    Item::new("eggs", 1).with_max_price(5.0),
                ],
            )
            .await
            .unwrap();
        let mut job = store.create_job(&chat).await.unwrap();
        job.transition(JobStatus::Running).unwrap();
        store.update_job(&job).await.unwrap();
        job.job_id
    };

    let reopened = LocalJobStore::open(&path).await.unwrap();
    let chat_record = reopened.ensure_chat(&chat).await.unwrap();
    assert_eq!(chat_record.postal_code.as_deref(), Some("M5V3A1"));
    assert_eq!(chat_record.fulfillment_mode, FulfillmentMode::Pickup);

    let items = reopened.items(&chat).await.unwrap();
    assert_eq!(items[0].brand.as_deref(), Some("Natrel"));
    assert_eq!(items[1].max_price, Some(5.0));

    let job = reopened.job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert!(reopened.pending_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn corrupt_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    std::fs::write(&path, b"{ not json").unwrap();
    let err = LocalJobStore::open(&path).await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupt { .. }));
}

#[tokio::test]
async fn empty_file_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.json");
    std::fs::write(&path, b"\n").unwrap();
    let store = LocalJobStore::open(&path).await.unwrap();
    assert!(store.pending_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn in_memory_store_never_touches_disk() {
    let store = LocalJobStore::in_memory();
    let chat = ChatId::new("1");
    store.add_items(&chat, vec![Item::new("bread", 1)]).await.unwrap();
    let job = store.create_job(&chat).await.unwrap();
    assert_eq!(store.pending_jobs().await.unwrap(), vec![job]);
    assert!(store.storage_path().is_none());
    assert_eq!(store.clear_items(&chat).await.unwrap(), 1);
    assert_eq!(store.jobs_for_chat(&chat).await.unwrap().len(), 1);
}
