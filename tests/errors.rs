//! Error-kind coverage not already exercised by `transactions.rs`.

use ordkv::{Database, EnvConfig, Error};
use tempfile::TempDir;

#[tokio::test]
async fn put_no_confirm_outside_a_transaction_does_not_panic() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(EnvConfig::new(dir.path())).unwrap();

    // No completion to report to (§4.3.2 requires an explicit window);
    // the call itself still succeeds as an enqueue.
    db.put_no_confirm("k", "v").unwrap();

    // Give the worker a moment to drain and log the warning, then
    // confirm it did not apply the write.
    db.put("sentinel", "x").await.unwrap();
    assert_eq!(db.get_sync(b"k").unwrap(), None);
}

#[tokio::test]
async fn oversized_value_is_reported_without_touching_the_engine() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(EnvConfig::new(dir.path())).unwrap();

    let too_big = vec![0u8; 32 * 1024 * 1024 + 1];
    let err = db.put("k", too_big).await.unwrap_err();
    assert!(matches!(err, Error::ValueTooLarge));

    // The environment is unaffected; a normal-sized put still lands.
    db.put("k", "fits").await.unwrap();
    assert_eq!(db.get("k").await.unwrap(), Some(b"fits".to_vec()));
}

#[tokio::test]
async fn map_full_is_reported_without_closing_the_environment() {
    let dir = TempDir::new().unwrap();
    let mut config = EnvConfig::new(dir.path());
    // Smallest size heed/LMDB will accept; a handful of writes exhausts it.
    config.map_size = 100 * 1024;
    let db = Database::open(config).unwrap();

    let big_value = vec![0u8; 8 * 1024];
    let mut hit_map_full = false;
    for i in 0..64u32 {
        match db.put(i.to_string(), big_value.clone()).await {
            Ok(()) => {}
            Err(Error::MapFull) => {
                hit_map_full = true;
                break;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(hit_map_full, "expected MapFull before exhausting the loop");

    // The environment is still usable for reads and small writes.
    assert!(db.get("0").await.unwrap().is_some());
    db.close().unwrap();
}
