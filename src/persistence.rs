//! Entity persistence.
//!
//! The handlers only ever need `find` and `save`; each state transition is
//! an independent save with no surrounding transaction. The trait keeps the
//! handlers testable against a fake and keeps the database out of the
//! assembly pipeline entirely.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::models::{
    FailureReason, Parameters, RunState, SerializedSuite, Source, SourceKind, Suite,
};

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn find_source(&self, id: &str) -> Result<Option<Source>, PersistenceError>;
    async fn save_source(&self, source: &Source) -> Result<(), PersistenceError>;
    async fn find_suite(&self, id: &str) -> Result<Option<Suite>, PersistenceError>;
    /// Create a suite, or return the existing one when an identical
    /// `(source, label, tests)` triple was already stored. A same-label
    /// suite with a different test selection is a conflict.
    async fn get_or_create_suite(
        &self,
        source_id: &str,
        label: &str,
        tests: &[String],
    ) -> Result<Suite, PersistenceError>;
    async fn find_serialized_suite(
        &self,
        id: &str,
    ) -> Result<Option<SerializedSuite>, PersistenceError>;
    async fn save_serialized_suite(&self, suite: &SerializedSuite) -> Result<(), PersistenceError>;
}

/// SQLite-backed persistence.
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn params_to_json(parameters: &Parameters) -> String {
    serde_json::to_string(parameters).unwrap_or_else(|_| "{}".to_string())
}

fn params_from_json(
    entity: &'static str,
    id: &str,
    json: &str,
) -> Result<Parameters, PersistenceError> {
    serde_json::from_str(json).map_err(|err| PersistenceError::CorruptRow {
        entity,
        id: id.to_string(),
        detail: format!("parameters: {err}"),
    })
}

fn state_from_str(
    entity: &'static str,
    id: &str,
    value: &str,
) -> Result<RunState, PersistenceError> {
    RunState::from_str(value).ok_or_else(|| PersistenceError::CorruptRow {
        entity,
        id: id.to_string(),
        detail: format!("unknown state '{value}'"),
    })
}

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn find_source(&self, id: &str) -> Result<Option<Source>, PersistenceError> {
        let row: Option<(String, String, String, String, Option<String>, String, i64)> =
            sqlx::query_as(
                "SELECT id, kind, path, state, parent_id, parameters_json, created_at \
                 FROM sources WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::database("select source", e))?;

        let Some((id, kind, path, state, parent_id, parameters_json, created_at)) = row else {
            return Ok(None);
        };

        let kind = SourceKind::from_str(&kind).ok_or_else(|| PersistenceError::CorruptRow {
            entity: "source",
            id: id.clone(),
            detail: format!("unknown kind '{kind}'"),
        })?;

        Ok(Some(Source {
            kind,
            path,
            state: state_from_str("source", &id, &state)?,
            parent_id,
            parameters: params_from_json("source", &id, &parameters_json)?,
            created_at,
            id,
        }))
    }

    async fn save_source(&self, source: &Source) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO sources (id, kind, path, state, parent_id, parameters_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                parameters_json = excluded.parameters_json
            "#,
        )
        .bind(&source.id)
        .bind(source.kind.as_str())
        .bind(&source.path)
        .bind(source.state.as_str())
        .bind(&source.parent_id)
        .bind(params_to_json(&source.parameters))
        .bind(source.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::database("save source", e))?;

        Ok(())
    }

    async fn find_suite(&self, id: &str) -> Result<Option<Suite>, PersistenceError> {
        let row: Option<(String, String, String, String, i64)> = sqlx::query_as(
            "SELECT id, source_id, label, tests_json, created_at FROM suites WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PersistenceError::database("select suite", e))?;

        let Some((id, source_id, label, tests_json, created_at)) = row else {
            return Ok(None);
        };

        let tests: Vec<String> =
            serde_json::from_str(&tests_json).map_err(|err| PersistenceError::CorruptRow {
                entity: "suite",
                id: id.clone(),
                detail: format!("tests: {err}"),
            })?;

        Ok(Some(Suite {
            source_id,
            label,
            tests,
            created_at,
            id,
        }))
    }

    async fn get_or_create_suite(
        &self,
        source_id: &str,
        label: &str,
        tests: &[String],
    ) -> Result<Suite, PersistenceError> {
        let existing: Option<(String, String, i64)> = sqlx::query_as(
            "SELECT id, tests_json, created_at FROM suites WHERE source_id = ? AND label = ?",
        )
        .bind(source_id)
        .bind(label)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PersistenceError::database("select suite", e))?;

        if let Some((id, tests_json, created_at)) = existing {
            let stored: Vec<String> =
                serde_json::from_str(&tests_json).map_err(|err| PersistenceError::CorruptRow {
                    entity: "suite",
                    id: id.clone(),
                    detail: format!("tests: {err}"),
                })?;
            if stored == tests {
                return Ok(Suite {
                    id,
                    source_id: source_id.to_string(),
                    label: label.to_string(),
                    tests: stored,
                    created_at,
                });
            }
            return Err(PersistenceError::SuiteLabelTaken {
                source_id: source_id.to_string(),
                label: label.to_string(),
            });
        }

        let suite = Suite {
            id: Uuid::new_v4().to_string(),
            source_id: source_id.to_string(),
            label: label.to_string(),
            tests: tests.to_vec(),
            created_at: chrono::Utc::now().timestamp(),
        };

        sqlx::query(
            "INSERT INTO suites (id, source_id, label, tests_json, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&suite.id)
        .bind(&suite.source_id)
        .bind(&suite.label)
        .bind(serde_json::to_string(&suite.tests).unwrap_or_else(|_| "[]".to_string()))
        .bind(suite.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::database("insert suite", e))?;

        Ok(suite)
    }

    async fn find_serialized_suite(
        &self,
        id: &str,
    ) -> Result<Option<SerializedSuite>, PersistenceError> {
        let row: Option<(String, String, String, String, Option<String>, Option<String>, i64)> =
            sqlx::query_as(
                "SELECT id, suite_id, parameters_json, state, failure_reason, failure_message, \
                 created_at FROM serialized_suites WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| PersistenceError::database("select serialized suite", e))?;

        let Some((id, suite_id, parameters_json, state, failure_reason, failure_message, created_at)) =
            row
        else {
            return Ok(None);
        };

        let failure_reason = match failure_reason {
            Some(token) => Some(FailureReason::from_str(&token).ok_or_else(|| {
                PersistenceError::CorruptRow {
                    entity: "serialized suite",
                    id: id.clone(),
                    detail: format!("unknown failure reason '{token}'"),
                }
            })?),
            None => None,
        };

        Ok(Some(SerializedSuite {
            suite_id,
            parameters: params_from_json("serialized suite", &id, &parameters_json)?,
            state: state_from_str("serialized suite", &id, &state)?,
            failure_reason,
            failure_message,
            created_at,
            id,
        }))
    }

    async fn save_serialized_suite(&self, suite: &SerializedSuite) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO serialized_suites
                (id, suite_id, parameters_json, state, failure_reason, failure_message, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                state = excluded.state,
                parameters_json = excluded.parameters_json,
                failure_reason = excluded.failure_reason,
                failure_message = excluded.failure_message
            "#,
        )
        .bind(&suite.id)
        .bind(&suite.suite_id)
        .bind(params_to_json(&suite.parameters))
        .bind(suite.state.as_str())
        .bind(suite.failure_reason.map(|r| r.as_str()))
        .bind(&suite.failure_message)
        .bind(suite.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::database("save serialized suite", e))?;

        Ok(())
    }
}
