use std::sync::Arc;

use moneta_core::db;

/// Builds an isolated on-disk database with migrations applied.
/// The TempDir must stay alive for the duration of the test.
pub fn test_pool() -> (tempfile::TempDir, Arc<db::DbPool>) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");

    let db_path = db::init(dir.path().to_str().unwrap()).expect("Failed to initialize database");
    let pool = db::create_pool(&db_path).expect("Failed to create database pool");
    db::run_migrations(&pool).expect("Failed to run migrations");

    (dir, pool)
}
