//! Integration test: both backends honour the same observable contract.
//!
//! Every scenario runs once against a `LocalBackend` rooted in a temporary
//! directory and once against an `ObjectStoreBackend` over an in-memory
//! store.

use std::path::Path;
use std::sync::Arc;

use object_store::memory::InMemory;
use tempfile::TempDir;

use fileservice_core::{
    read_to_bytes, FileServiceError, ReleaseAction, StorageBackend, StorageConfig, UploadBuffer,
};
use fileservice_storage::{open_backend, LocalBackend, ObjectStoreBackend};

const SAMPLE_1: &str = "This is a test file";
const SAMPLE_2: &str = "this is the test file 2";

async fn local_backend(tmp: &TempDir) -> Arc<dyn StorageBackend> {
    Arc::new(LocalBackend::new(tmp.path().join("store")).await.unwrap())
}

async fn object_backend() -> Arc<dyn StorageBackend> {
    Arc::new(
        ObjectStoreBackend::from_store(Arc::new(InMemory::new()), "caas-omicsdi")
            .await
            .unwrap(),
    )
}

/// Write the two sample fixtures into `dir`, returning their paths.
fn write_fixtures(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    std::fs::create_dir_all(dir).unwrap();
    let first = dir.join("sample-file.txt");
    let second = dir.join("sample-file-2.txt");
    std::fs::write(&first, SAMPLE_1).unwrap();
    std::fs::write(&second, SAMPLE_2).unwrap();
    (first, second)
}

async fn read_string(backend: &dyn StorageBackend, path: &str) -> String {
    let stream = backend.get_input_stream(path).await.unwrap();
    String::from_utf8(read_to_bytes(stream).await.unwrap().to_vec()).unwrap()
}

/// copyFile + saveFile, read both back, then delete and re-list.
async fn check_round_trip(backend: &dyn StorageBackend, fixtures: &Path) {
    let (sample, _) = write_fixtures(fixtures);
    let parent = "testing/s3-service";
    let first = format!("{parent}/sample-file.txt");
    let second = format!("{parent}/sample-file-2.txt");

    backend.copy_file(&sample, &first).await.unwrap();
    let mut buffer = UploadBuffer::new();
    for b in SAMPLE_2.bytes() {
        buffer.write_byte(b);
    }
    backend.save_file(buffer, &second).await.unwrap();

    assert_eq!(backend.list_files_from_folder(parent).await.len(), 2);
    assert!(read_string(backend, &first).await.contains("This is a test file"));
    assert!(read_string(backend, &second).await.contains("this is the test file 2"));

    backend.delete_file(&first).await;
    assert_eq!(backend.list_files_from_folder(parent).await.len(), 1);
    backend.delete_file(&second).await;
    assert_eq!(backend.list_files_from_folder(parent).await.len(), 0);
}

async fn check_unwritten_path(backend: &dyn StorageBackend) {
    assert!(!backend.is_file("never/written.txt").await);
    let result = backend.get_input_stream("never/written.txt").await;
    assert!(matches!(result, Err(FileServiceError::NotFound { .. })));
    // Deleting twice must not fail either time.
    backend.delete_file("never/written.txt").await;
    backend.delete_file("never/written.txt").await;
}

async fn check_get_file(backend: &dyn StorageBackend, fixtures: &Path, expected: ReleaseAction) {
    let (sample, _) = write_fixtures(fixtures);
    backend.copy_file(&sample, "handles/sample-file.txt").await.unwrap();

    let handle = backend.get_file("handles/sample-file.txt").await.unwrap();
    let local = handle.path().to_path_buf();
    assert_eq!(handle.release_action(), expected);
    assert_eq!(std::fs::read_to_string(&local).unwrap(), SAMPLE_1);
    handle.release().unwrap();

    match expected {
        ReleaseAction::Keep => assert!(local.exists()),
        ReleaseAction::Delete => assert!(!local.exists()),
    }
}

async fn check_clean_directory(backend: &dyn StorageBackend) {
    for i in 0..25 {
        backend
            .save_file(UploadBuffer::from(vec![b'x'; i]), &format!("scratch/{i}.dat"))
            .await
            .unwrap();
    }
    assert_eq!(backend.list_files_from_folder("scratch").await.len(), 25);
    backend.clean_directory("scratch").await;
    assert!(backend.list_files_from_folder("scratch").await.is_empty());
}

async fn check_copy_directory(backend: &dyn StorageBackend, fixtures: &Path) {
    let upload_dir = fixtures.join("file-system-s3");
    write_fixtures(&upload_dir);
    assert_eq!(std::fs::read_dir(&upload_dir).unwrap().count(), 2);

    let parent = "testing/upload-dir";
    backend.clean_directory(parent).await;
    assert_eq!(backend.list_files_from_folder(parent).await.len(), 0);

    backend.copy_directory(&upload_dir, parent).await;
    assert_eq!(backend.list_files_from_folder(parent).await.len(), 2);
    assert!(backend.is_file(&format!("{parent}/sample-file-2.txt")).await);

    backend.clean_directory(parent).await;
    assert_eq!(backend.list_files_from_folder(parent).await.len(), 0);
}

#[tokio::test]
async fn test_local_round_trip() {
    let tmp = TempDir::new().unwrap();
    let backend = local_backend(&tmp).await;
    check_round_trip(backend.as_ref(), &tmp.path().join("fixtures")).await;
}

#[tokio::test]
async fn test_object_store_round_trip() {
    let tmp = TempDir::new().unwrap();
    let backend = object_backend().await;
    check_round_trip(backend.as_ref(), tmp.path()).await;
}

#[tokio::test]
async fn test_local_unwritten_path() {
    let tmp = TempDir::new().unwrap();
    check_unwritten_path(local_backend(&tmp).await.as_ref()).await;
}

#[tokio::test]
async fn test_object_store_unwritten_path() {
    check_unwritten_path(object_backend().await.as_ref()).await;
}

#[tokio::test]
async fn test_local_get_file_keeps_file() {
    let tmp = TempDir::new().unwrap();
    let backend = local_backend(&tmp).await;
    check_get_file(backend.as_ref(), &tmp.path().join("fixtures"), ReleaseAction::Keep).await;
}

#[tokio::test]
async fn test_object_store_get_file_deletes_copy() {
    let tmp = TempDir::new().unwrap();
    let backend = object_backend().await;
    check_get_file(backend.as_ref(), tmp.path(), ReleaseAction::Delete).await;
}

#[tokio::test]
async fn test_local_clean_directory() {
    let tmp = TempDir::new().unwrap();
    check_clean_directory(local_backend(&tmp).await.as_ref()).await;
}

#[tokio::test]
async fn test_object_store_clean_directory() {
    check_clean_directory(object_backend().await.as_ref()).await;
}

#[tokio::test]
async fn test_local_copy_directory() {
    let tmp = TempDir::new().unwrap();
    let backend = local_backend(&tmp).await;
    check_copy_directory(backend.as_ref(), &tmp.path().join("fixtures")).await;
}

#[tokio::test]
async fn test_object_store_copy_directory() {
    let tmp = TempDir::new().unwrap();
    let backend = object_backend().await;
    check_copy_directory(backend.as_ref(), tmp.path()).await;
}

#[tokio::test]
async fn test_object_store_listing_exceeds_one_page() {
    let backend = ObjectStoreBackend::from_store(Arc::new(InMemory::new()), "bulk")
        .await
        .unwrap();
    for i in 0..1500 {
        backend
            .save_file(UploadBuffer::from(i.to_string().into_bytes()), &format!("bulk/{i}.txt"))
            .await
            .unwrap();
    }

    let keys = backend.try_list_files_from_folder("bulk").await.unwrap();
    assert_eq!(keys.len(), 1500);
    let unique: std::collections::HashSet<&String> = keys.iter().collect();
    assert_eq!(unique.len(), 1500);

    backend.clean_directory("bulk").await;
    assert!(backend.list_files_from_folder("bulk").await.is_empty());
}

#[tokio::test]
async fn test_local_listing_many_files() {
    let tmp = TempDir::new().unwrap();
    let backend = local_backend(&tmp).await;
    for i in 0..1500 {
        backend
            .save_file(UploadBuffer::from(vec![b'y']), &format!("bulk/{i}.txt"))
            .await
            .unwrap();
    }
    assert_eq!(backend.list_files_from_folder("bulk").await.len(), 1500);
}

#[tokio::test]
async fn test_open_backend_selects_local() {
    let tmp = TempDir::new().unwrap();
    let mut config = StorageConfig::local();
    config.local_root = Some(tmp.path().to_path_buf());

    let backend = open_backend(&config).await.unwrap();
    backend
        .save_file(UploadBuffer::from(SAMPLE_1.as_bytes().to_vec()), "selected.txt")
        .await
        .unwrap();
    assert!(tmp.path().join("selected.txt").is_file());
}

#[tokio::test]
async fn test_open_backend_rejects_incomplete_object_store_config() {
    let config = StorageConfig::default();
    let result = open_backend(&config).await;
    assert!(matches!(result, Err(FileServiceError::Config { .. })));
}

#[tokio::test]
async fn test_shared_backend_across_tasks() {
    let backend = object_backend().await;
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let backend = backend.clone();
            tokio::spawn(async move {
                backend
                    .save_file(
                        UploadBuffer::from(format!("writer-{i}").into_bytes()),
                        &format!("shared/{i}.txt"),
                    )
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(backend.list_files_from_folder("shared").await.len(), 8);
}
