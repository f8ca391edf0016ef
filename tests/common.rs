//! Test utilities & fixtures.
//! Each test gets its own on-disk SQLite store inside a temp dir; keep the
//! `TempDir` alive for the duration of the test or the file disappears.

use meshgate::db::Database;
use tempfile::TempDir;

#[allow(dead_code)] // Not every integration test crate uses the fixture.
pub async fn open_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("meshgate-test.db");
    let db = Database::open(path.to_str().expect("utf-8 temp path"))
        .await
        .expect("open test database");
    (dir, db)
}
