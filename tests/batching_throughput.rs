//! Scenario 4: implicit batching throughput — many puts submitted without
//! an explicit transaction, relying on the "commit when the channel
//! empties" auto-batching policy (§4.3.1).

use futures_util::future::join_all;
use ordkv::{Database, EnvConfig};
use rand::RngCore;
use tempfile::TempDir;

#[tokio::test]
async fn implicit_batching_retrieves_every_key() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(EnvConfig::new(dir.path())).unwrap();

    let mut rng = rand::thread_rng();
    let mut entries = Vec::new();
    for _ in 0..500 {
        let mut key = vec![0u8; 64];
        let mut value = vec![0u8; 64];
        rng.fill_bytes(&mut key);
        rng.fill_bytes(&mut value);
        entries.push((key, value));
    }

    // No startWriteTransaction: every put begins or joins an implicit
    // transaction that the worker auto-commits as the channel drains.
    let puts = entries
        .iter()
        .map(|(k, v)| db.put(k.clone(), v.clone()));
    for r in join_all(puts).await {
        r.unwrap();
    }

    for (key, value) in &entries {
        assert_eq!(db.get_sync(key).unwrap(), Some(value.clone()));
    }
}

#[tokio::test]
async fn implicit_batches_do_not_interleave_with_an_explicit_transaction() {
    let dir = TempDir::new().unwrap();
    let db = Database::open(EnvConfig::new(dir.path())).unwrap();

    db.put("before", "1").await.unwrap();

    db.start_write_transaction().await.unwrap();
    let (put_result, commit_result) =
        tokio::join!(db.put("inside", "2"), db.commit_write_transaction());
    put_result.unwrap();
    commit_result.unwrap();

    db.put("after", "3").await.unwrap();

    assert_eq!(db.get("before").await.unwrap(), Some(b"1".to_vec()));
    assert_eq!(db.get("inside").await.unwrap(), Some(b"2".to_vec()));
    assert_eq!(db.get("after").await.unwrap(), Some(b"3".to_vec()));
}
