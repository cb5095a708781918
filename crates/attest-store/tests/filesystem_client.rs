//! Client behaviour over the filesystem store.

use attest_core::{content_hash, AttestError, ContentPointer, ReasonCode};
use attest_store::{ContentStoreClient, FilesystemContentStore, StoreError};
use std::time::Duration;

#[tokio::test]
async fn documents_survive_a_new_client() {
    let dir = tempfile::tempdir().unwrap();
    let document = b"%PDF-1.7 invoice 0042".to_vec();

    let stored = {
        let client = ContentStoreClient::new(
            FilesystemContentStore::new(dir.path()),
            Duration::from_secs(5),
        );
        client.store(&document).await.unwrap()
    };
    assert_eq!(stored.content_hash, content_hash(&document));

    let client = ContentStoreClient::new(
        FilesystemContentStore::new(dir.path()),
        Duration::from_secs(5),
    );
    assert_eq!(client.fetch(&stored.content_pointer).await.unwrap(), document);
    assert!(client
        .fetch_verified(&stored.content_pointer, &stored.content_hash)
        .await
        .unwrap());
}

#[tokio::test]
async fn missing_document_is_terminal() {
    let dir = tempfile::tempdir().unwrap();
    let client = ContentStoreClient::new(
        FilesystemContentStore::new(dir.path()),
        Duration::from_secs(5),
    );
    let absent = attest_store::pointer_for(b"never stored");
    let err = client.fetch(&absent).await.unwrap_err();
    assert!(!err.is_retryable());

    let err: AttestError = err.into();
    assert_eq!(err.reason(), ReasonCode::ContentNotFound);

    let err = client
        .fetch(&ContentPointer::new("not-a-pointer"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}
