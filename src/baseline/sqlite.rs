//! SQLite-backed artifact repository
//!
//! One row per `(design_id, version)`; the artifact body is stored as JSON.
//! The composite primary key makes `put` a conditional insert.

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};
use tokio::task;

use super::artifact::BaselineArtifact;
use super::repository::ArtifactRepository;
use crate::error::RepositoryError;

#[derive(Debug, Clone)]
pub struct SqliteRepository {
    db_path: PathBuf,
}

fn backend<E: std::fmt::Display>(err: E) -> RepositoryError {
    RepositoryError::Backend(err.to_string())
}

impl SqliteRepository {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = db_path.as_ref().to_path_buf();
        let path_clone = path.clone();

        task::spawn_blocking(move || {
            if let Some(parent) = path_clone.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(backend)?;
                }
            }
            let conn = Connection::open(&path_clone).map_err(backend)?;
            conn.execute(
                r#"
                CREATE TABLE IF NOT EXISTS baselines (
                    design_id TEXT NOT NULL,
                    version INTEGER NOT NULL,
                    parent_version INTEGER,
                    dna_fingerprint TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    body TEXT NOT NULL,
                    PRIMARY KEY (design_id, version)
                );
                "#,
                [],
            )
            .map_err(backend)?;
            Ok::<_, RepositoryError>(())
        })
        .await
        .map_err(backend)??;

        Ok(Self { db_path: path })
    }
}

#[async_trait]
impl ArtifactRepository for SqliteRepository {
    async fn put(&self, artifact: &BaselineArtifact) -> Result<(), RepositoryError> {
        let body = serde_json::to_string(artifact).map_err(backend)?;
        let path = self.db_path.clone();
        let design_id = artifact.design_id.clone();
        let version = artifact.version;
        let parent = artifact.parent_version.map(|v| v as i64);
        let fingerprint = artifact.dna_fingerprint.clone();
        let created_at = artifact.created_at.to_rfc3339();

        task::spawn_blocking(move || {
            let conn = Connection::open(&path).map_err(backend)?;
            let inserted = conn.execute(
                "INSERT INTO baselines (design_id, version, parent_version, dna_fingerprint, created_at, body) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![&design_id, version as i64, parent, &fingerprint, &created_at, &body],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    Err(RepositoryError::Conflict { key: design_id, version })
                }
                Err(e) => Err(backend(e)),
            }
        })
        .await
        .map_err(backend)?
    }

    async fn get(&self, design_id: &str, version: u64) -> Result<Option<BaselineArtifact>, RepositoryError> {
        let path = self.db_path.clone();
        let id = design_id.to_string();

        let body: Option<String> = task::spawn_blocking(move || {
            let conn = Connection::open(&path).map_err(backend)?;
            conn.query_row(
                "SELECT body FROM baselines WHERE design_id = ?1 AND version = ?2",
                params![&id, version as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(backend)
        })
        .await
        .map_err(backend)??;

        body.map(|b| serde_json::from_str(&b).map_err(backend)).transpose()
    }

    async fn list_versions(&self, design_id: &str) -> Result<Vec<u64>, RepositoryError> {
        let path = self.db_path.clone();
        let id = design_id.to_string();

        task::spawn_blocking(move || {
            let conn = Connection::open(&path).map_err(backend)?;
            let mut stmt = conn
                .prepare("SELECT version FROM baselines WHERE design_id = ?1 ORDER BY version ASC")
                .map_err(backend)?;
            let rows = stmt
                .query_map(params![&id], |row| row.get::<_, i64>(0))
                .map_err(backend)?;
            let versions = rows
                .map(|r| r.map(|v| v as u64).map_err(backend))
                .collect::<Result<Vec<_>, _>>();
            versions
        })
        .await
        .map_err(backend)?
    }
}
