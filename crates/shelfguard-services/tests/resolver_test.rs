mod helpers;

use helpers::fixtures::epub_bytes;
use helpers::TestEnv;
use shelfguard_core::constants::REASON_HASH_MATCH_FILESYSTEM;
use shelfguard_core::{Decision, DiscardOutcome, DuplicateSource, UploadStatus};
use shelfguard_services::LifecycleAction;
use shelfguard_storage::hash_bytes;

fn library_dir(env: &TestEnv) -> std::path::PathBuf {
    env.config().paths.library_dirs[0].clone()
}

#[tokio::test]
async fn untracked_library_file_is_an_exact_duplicate() {
    let env = TestEnv::new().await;
    let body = epub_bytes(7);
    let shelved = library_dir(&env).join("fiction").join("shelved.epub");
    std::fs::create_dir_all(shelved.parent().unwrap()).unwrap();
    std::fs::write(&shelved, &body).unwrap();
    let record = env.upload("new.epub", &body, UploadStatus::Safe).await;

    let decision = env.lifecycle.resolve(record.id).await.unwrap().unwrap();

    assert_eq!(
        decision,
        Decision::ExactDuplicate {
            of_id: None,
            source: DuplicateSource::Disk { path: shelved },
            reason: "hash match on disk".to_string(),
        }
    );
    assert_eq!(decision.reason_code(), Some(REASON_HASH_MATCH_FILESYSTEM));
}

#[tokio::test]
async fn same_size_different_bytes_is_unique() {
    let env = TestEnv::new().await;
    std::fs::create_dir_all(library_dir(&env)).unwrap();
    std::fs::write(library_dir(&env).join("other.epub"), epub_bytes(1)).unwrap();
    let record = env.upload("new.epub", &epub_bytes(2), UploadStatus::Safe).await;

    let decision = env.lifecycle.resolve(record.id).await.unwrap().unwrap();

    assert_eq!(decision, Decision::Unique);
}

#[tokio::test]
async fn hidden_files_are_not_candidates() {
    let env = TestEnv::new().await;
    let body = epub_bytes(3);
    std::fs::create_dir_all(library_dir(&env)).unwrap();
    std::fs::write(library_dir(&env).join(".in-flight.epub"), &body).unwrap();
    let record = env.upload("new.epub", &body, UploadStatus::Safe).await;

    let decision = env.lifecycle.resolve(record.id).await.unwrap().unwrap();

    assert_eq!(decision, Decision::Unique);
}

#[tokio::test]
async fn resolving_records_the_content_hash() {
    let env = TestEnv::new().await;
    let body = epub_bytes(4);
    let record = env.upload("a.epub", &body, UploadStatus::Safe).await;
    assert!(record.content_hash.is_none());

    env.lifecycle.resolve(record.id).await.unwrap();

    assert_eq!(env.record(record.id).await.content_hash, Some(hash_bytes(&body)));
}

#[tokio::test]
async fn dry_run_resolution_does_not_record_hash() {
    let env = TestEnv::with_config(|c| c.moving.dry_run = true).await;
    let record = env.upload("a.epub", &epub_bytes(4), UploadStatus::Safe).await;

    env.lifecycle.resolve(record.id).await.unwrap();

    assert!(env.record(record.id).await.content_hash.is_none());
}

#[tokio::test]
async fn missing_metadata_skips_name_comparison() {
    let env = TestEnv::new().await;
    let first = env
        .upload_with_metadata("a.epub", &epub_bytes(1), "Untitled", "")
        .await;
    env.lifecycle.promote_verified(first.id).await.unwrap();
    let second = env
        .upload_with_metadata("b.epub", &epub_bytes(2), "Untitled", "")
        .await;

    let decision = env.lifecycle.resolve(second.id).await.unwrap().unwrap();

    assert_eq!(decision, Decision::Unique);
}

#[tokio::test]
async fn disk_duplicate_is_discarded_without_duplicate_of() {
    let env = TestEnv::new().await;
    let body = epub_bytes(8);
    std::fs::write(env.config().paths.unsorted_dir.join("loose.epub"), &body).unwrap();
    let record = env.upload("again.epub", &body, UploadStatus::Safe).await;

    let outcome = env.lifecycle.promote_verified(record.id).await.unwrap();

    assert!(matches!(
        outcome.action,
        LifecycleAction::Discarded(DiscardOutcome::Discarded { .. })
    ));
    let stored = env.record(record.id).await;
    assert_eq!(stored.status, UploadStatus::DuplicateDiscarded);
    assert_eq!(stored.duplicate_of, None);
    assert_eq!(stored.duplicate_reason.as_deref(), Some(REASON_HASH_MATCH_FILESYSTEM));
}
