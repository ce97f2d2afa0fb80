//! End-to-end tests for the preparation and serialization state machines,
//! run against a real SQLite database and a tempdir-backed file store.

use std::process::Command;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;

use suite_forge::error::{PrepareError, SerializeSuiteError};
use suite_forge::messages::{PrepareMessage, SerializeSuiteMessage};
use suite_forge::migrate;
use suite_forge::models::{
    FailureReason, Parameters, RunState, SerializedSuite, Source, SourceKind,
};
use suite_forge::persistence::{Persistence, SqlitePersistence};
use suite_forge::prepare::prepare_source;
use suite_forge::reader::ReaderProvider;
use suite_forge::reader_fs::FileStoreReader;
use suite_forge::reader_git::GitCheckoutReader;
use suite_forge::serialize::serialize_suite;
use suite_forge::store::FileStore;

struct Env {
    _tmp: TempDir,
    persistence: SqlitePersistence,
    provider: ReaderProvider,
    store: FileStore,
    extensions: Vec<String>,
}

async fn setup() -> Env {
    let tmp = TempDir::new().unwrap();
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    let store_root = tmp.path().join("store");
    std::fs::create_dir_all(&store_root).unwrap();
    let store = FileStore::new(&store_root);
    let cache = FileStore::new(tmp.path().join("git-cache"));

    let exclude = vec!["**/.git/**".to_string()];
    let provider = ReaderProvider::new(vec![
        Arc::new(FileStoreReader::new(store.clone(), &exclude).unwrap()),
        Arc::new(GitCheckoutReader::new(cache, &exclude).unwrap()),
    ]);

    Env {
        _tmp: tmp,
        persistence: SqlitePersistence::new(pool),
        provider,
        store,
        extensions: vec!["yaml".to_string(), "yml".to_string()],
    }
}

fn file_source(id: &str, path: &str) -> Source {
    Source {
        id: id.to_string(),
        kind: SourceKind::File,
        path: path.to_string(),
        state: RunState::Requested,
        parent_id: None,
        parameters: Parameters::new(),
        created_at: 0,
    }
}

fn derived_source(id: &str, parent_id: &str) -> Source {
    Source {
        parent_id: Some(parent_id.to_string()),
        ..file_source(id, id)
    }
}

fn serialized_suite(id: &str, suite_id: &str) -> SerializedSuite {
    SerializedSuite {
        id: id.to_string(),
        suite_id: suite_id.to_string(),
        parameters: Parameters::new(),
        state: RunState::Requested,
        failure_reason: None,
        failure_message: None,
        created_at: 0,
    }
}

async fn run_prepare(env: &Env, source_id: &str) -> Result<(), PrepareError> {
    prepare_source(
        &env.persistence,
        &env.provider,
        &env.store,
        &env.extensions,
        &PrepareMessage::new(source_id),
    )
    .await
}

async fn run_serialize(env: &Env, serialized_suite_id: &str) -> Result<(), SerializeSuiteError> {
    serialize_suite(
        &env.persistence,
        &env.provider,
        &env.store,
        &env.extensions,
        &SerializeSuiteMessage::new(serialized_suite_id),
    )
    .await
}

#[tokio::test]
async fn prepare_copies_parent_yaml_files() {
    let env = setup().await;
    env.store.write("origin/a.yaml", "x: 1").unwrap();
    env.store.write("origin/nested/b.yml", "y: 2").unwrap();
    env.store.write("origin/readme.md", "# docs").unwrap();

    env.persistence
        .save_source(&file_source("origin", "origin"))
        .await
        .unwrap();
    env.persistence
        .save_source(&derived_source("derived", "origin"))
        .await
        .unwrap();

    run_prepare(&env, "derived").await.unwrap();

    let derived = env
        .persistence
        .find_source("derived")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(derived.state, RunState::Prepared);
    assert_eq!(env.store.read("derived/a.yaml").unwrap(), "x: 1");
    assert_eq!(env.store.read("derived/nested/b.yml").unwrap(), "y: 2");
    assert!(!env.store.exists("derived/readme.md"));
}

#[tokio::test]
async fn prepare_on_prepared_source_is_a_noop() {
    let env = setup().await;
    env.persistence
        .save_source(&file_source("origin", "missing-dir"))
        .await
        .unwrap();
    let mut derived = derived_source("derived", "origin");
    derived.state = RunState::Prepared;
    env.persistence.save_source(&derived).await.unwrap();

    // The parent's path does not exist: any listing attempt would fail, so
    // a clean return proves the handler never touched storage.
    run_prepare(&env, "derived").await.unwrap();

    let after = env
        .persistence
        .find_source("derived")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.state, RunState::Prepared);
    assert!(!env.store.exists("derived"));
}

#[tokio::test]
async fn prepare_ignores_sources_without_parent() {
    let env = setup().await;
    env.persistence
        .save_source(&file_source("origin", "origin"))
        .await
        .unwrap();

    run_prepare(&env, "origin").await.unwrap();

    let after = env
        .persistence
        .find_source("origin")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.state, RunState::Requested);
}

#[tokio::test]
async fn prepare_ignores_unknown_source() {
    let env = setup().await;
    run_prepare(&env, "does-not-exist").await.unwrap();
}

#[tokio::test]
async fn prepare_halts_on_malformed_yaml_and_retries_after_fix() {
    let env = setup().await;
    env.store.write("origin/good.yaml", "x: 1").unwrap();
    env.store
        .write("origin/broken.yaml", "{ not: valid: yaml")
        .unwrap();

    env.persistence
        .save_source(&file_source("origin", "origin"))
        .await
        .unwrap();
    env.persistence
        .save_source(&derived_source("derived", "origin"))
        .await
        .unwrap();

    let err = run_prepare(&env, "derived").await.unwrap_err();
    assert!(matches!(err, PrepareError::Halted { .. }));
    let halted = env
        .persistence
        .find_source("derived")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(halted.state, RunState::Halted);

    // Fix the file; redelivery picks the halted source back up and the
    // full assembly runs again.
    env.store.write("origin/broken.yaml", "z: 3").unwrap();
    run_prepare(&env, "derived").await.unwrap();

    let prepared = env
        .persistence
        .find_source("derived")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(prepared.state, RunState::Prepared);
    assert_eq!(env.store.read("derived/broken.yaml").unwrap(), "z: 3");
    assert_eq!(env.store.read("derived/good.yaml").unwrap(), "x: 1");
}

#[tokio::test]
async fn prepare_halts_when_parent_storage_is_unreadable() {
    let env = setup().await;
    env.persistence
        .save_source(&file_source("origin", "never-created"))
        .await
        .unwrap();
    env.persistence
        .save_source(&derived_source("derived", "origin"))
        .await
        .unwrap();

    let err = run_prepare(&env, "derived").await.unwrap_err();
    assert!(matches!(err, PrepareError::Halted { .. }));
    let halted = env
        .persistence
        .find_source("derived")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(halted.state, RunState::Halted);
}

#[tokio::test]
async fn serialize_writes_manifest_collection_and_document_stream() {
    let env = setup().await;
    env.store.write("src/a.yaml", "x: 1").unwrap();
    env.store.write("src/b.yml", "y: 2").unwrap();
    env.store.write("src/notes.txt", "skip me").unwrap();

    env.persistence
        .save_source(&file_source("src", "src"))
        .await
        .unwrap();
    let suite = env
        .persistence
        .get_or_create_suite("src", "all", &[])
        .await
        .unwrap();
    env.persistence
        .save_serialized_suite(&serialized_suite("bundle", &suite.id))
        .await
        .unwrap();

    run_serialize(&env, "bundle").await.unwrap();

    let after = env
        .persistence
        .find_serialized_suite("bundle")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.state, RunState::Prepared);
    assert!(after.failure_reason.is_none());

    assert_eq!(
        env.store.read("bundle/manifest.yaml").unwrap(),
        "- a.yaml\n- b.yml"
    );
    assert_eq!(env.store.read("bundle/a.yaml").unwrap(), "x: 1");
    assert_eq!(env.store.read("bundle/b.yml").unwrap(), "y: 2");

    let documents = env.store.read("bundle/serialized.yaml").unwrap();
    assert_eq!(documents.matches("---\n").count(), 4);
    assert!(documents.contains(r#""path":"a.yaml""#));
    assert!(documents.contains("---\nx: 1\n..."));
    let a_position = documents.find("a.yaml").unwrap();
    let b_position = documents.find("b.yml").unwrap();
    assert!(a_position < b_position);
}

#[tokio::test]
async fn serialize_respects_suite_selector_order() {
    let env = setup().await;
    env.store.write("src/a.yaml", "a: 1").unwrap();
    env.store.write("src/b.yaml", "b: 2").unwrap();
    env.store.write("src/c.yaml", "c: 3").unwrap();

    env.persistence
        .save_source(&file_source("src", "src"))
        .await
        .unwrap();
    let suite = env
        .persistence
        .get_or_create_suite(
            "src",
            "subset",
            &["c.yaml".to_string(), "a.yaml".to_string()],
        )
        .await
        .unwrap();
    env.persistence
        .save_serialized_suite(&serialized_suite("bundle", &suite.id))
        .await
        .unwrap();

    run_serialize(&env, "bundle").await.unwrap();

    assert_eq!(
        env.store.read("bundle/manifest.yaml").unwrap(),
        "- c.yaml\n- a.yaml"
    );
    assert!(!env.store.exists("bundle/b.yaml"));

    let documents = env.store.read("bundle/serialized.yaml").unwrap();
    let c_position = documents.find("c.yaml").unwrap();
    let a_position = documents.find("a.yaml").unwrap();
    assert!(c_position < a_position);
}

#[tokio::test]
async fn serialize_of_empty_source_yields_empty_manifest() {
    let env = setup().await;
    std::fs::create_dir_all(env.store.root().join("src")).unwrap();

    env.persistence
        .save_source(&file_source("src", "src"))
        .await
        .unwrap();
    let suite = env
        .persistence
        .get_or_create_suite("src", "empty", &[])
        .await
        .unwrap();
    env.persistence
        .save_serialized_suite(&serialized_suite("bundle", &suite.id))
        .await
        .unwrap();

    run_serialize(&env, "bundle").await.unwrap();

    assert_eq!(env.store.read("bundle/manifest.yaml").unwrap(), "");
    assert_eq!(env.store.read("bundle/serialized.yaml").unwrap(), "");
}

#[tokio::test]
async fn serialize_halts_with_persisted_reason_and_message() {
    let env = setup().await;
    env.store
        .write("src/broken.yaml", "{ not: valid: yaml")
        .unwrap();

    env.persistence
        .save_source(&file_source("src", "src"))
        .await
        .unwrap();
    let suite = env
        .persistence
        .get_or_create_suite("src", "all", &[])
        .await
        .unwrap();
    env.persistence
        .save_serialized_suite(&serialized_suite("bundle", &suite.id))
        .await
        .unwrap();

    let err = run_serialize(&env, "bundle").await.unwrap_err();
    match &err {
        SerializeSuiteError::Halted {
            serialized_suite_id,
            reason,
            message,
            ..
        } => {
            assert_eq!(serialized_suite_id, "bundle");
            assert_eq!(*reason, FailureReason::YamlParse);
            assert!(message.contains("broken.yaml"));
        }
        other => panic!("expected halted error, got {other:?}"),
    }

    let after = env
        .persistence
        .find_serialized_suite("bundle")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.state, RunState::Halted);
    assert_eq!(after.failure_reason, Some(FailureReason::YamlParse));
    assert!(after.failure_message.unwrap().contains("broken.yaml"));
}

#[tokio::test]
async fn serialize_retry_clears_previous_failure() {
    let env = setup().await;
    env.store
        .write("src/broken.yaml", "{ not: valid: yaml")
        .unwrap();

    env.persistence
        .save_source(&file_source("src", "src"))
        .await
        .unwrap();
    let suite = env
        .persistence
        .get_or_create_suite("src", "all", &[])
        .await
        .unwrap();
    env.persistence
        .save_serialized_suite(&serialized_suite("bundle", &suite.id))
        .await
        .unwrap();

    run_serialize(&env, "bundle").await.unwrap_err();
    env.store.write("src/broken.yaml", "fixed: true").unwrap();
    run_serialize(&env, "bundle").await.unwrap();

    let after = env
        .persistence
        .find_serialized_suite("bundle")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.state, RunState::Prepared);
    assert!(after.failure_reason.is_none());
    assert!(after.failure_message.is_none());
}

#[tokio::test]
async fn serialize_on_prepared_bundle_is_a_noop() {
    let env = setup().await;
    env.persistence
        .save_source(&file_source("src", "src"))
        .await
        .unwrap();
    let suite = env
        .persistence
        .get_or_create_suite("src", "all", &[])
        .await
        .unwrap();
    let mut bundle = serialized_suite("bundle", &suite.id);
    bundle.state = RunState::Prepared;
    env.persistence
        .save_serialized_suite(&bundle)
        .await
        .unwrap();

    run_serialize(&env, "bundle").await.unwrap();

    let after = env
        .persistence
        .find_serialized_suite("bundle")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.state, RunState::Prepared);
    assert!(!env.store.exists("bundle"));
}

#[tokio::test]
async fn serialize_halts_when_suite_row_is_missing() {
    let env = setup().await;

    // A bundle pointing at a suite id that was never stored.
    let orphan = serialized_suite("orphan", "no-such-suite");
    env.persistence.save_serialized_suite(&orphan).await.unwrap();

    let err = run_serialize(&env, "orphan").await.unwrap_err();
    match err {
        SerializeSuiteError::Halted { reason, .. } => {
            assert_eq!(reason, FailureReason::Unknown);
        }
        other => panic!("expected halted error, got {other:?}"),
    }
}

#[tokio::test]
async fn suite_creation_is_idempotent_for_identical_triples() {
    let env = setup().await;
    env.persistence
        .save_source(&file_source("src", "src"))
        .await
        .unwrap();

    let tests = vec!["a.yaml".to_string()];
    let first = env
        .persistence
        .get_or_create_suite("src", "smoke", &tests)
        .await
        .unwrap();
    let second = env
        .persistence
        .get_or_create_suite("src", "smoke", &tests)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);

    let conflict = env
        .persistence
        .get_or_create_suite("src", "smoke", &["b.yaml".to_string()])
        .await;
    assert!(conflict.is_err());
}

#[tokio::test]
async fn prepare_from_local_git_repository() {
    if Command::new("git").arg("--version").output().is_err() {
        return;
    }

    let env = setup().await;
    let repo = env._tmp.path().join("upstream");
    std::fs::create_dir_all(&repo).unwrap();
    std::fs::write(repo.join("test.yaml"), "x: 1").unwrap();
    std::fs::write(repo.join("readme.md"), "# repo").unwrap();

    let git = |args: &[&str]| {
        let output = Command::new("git")
            .args([
                "-c",
                "user.name=forge",
                "-c",
                "user.email=forge@example.com",
            ])
            .args(args)
            .current_dir(&repo)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    };
    git(&["init"]);
    git(&["add", "."]);
    git(&["commit", "-m", "seed"]);

    let mut origin = file_source("upstream", "upstream");
    origin.kind = SourceKind::Git;
    origin
        .parameters
        .insert("url".to_string(), repo.to_string_lossy().to_string());
    env.persistence.save_source(&origin).await.unwrap();
    env.persistence
        .save_source(&derived_source("derived", "upstream"))
        .await
        .unwrap();

    run_prepare(&env, "derived").await.unwrap();

    let derived = env
        .persistence
        .find_source("derived")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(derived.state, RunState::Prepared);
    assert_eq!(env.store.read("derived/test.yaml").unwrap(), "x: 1");
    assert!(!env.store.exists("derived/readme.md"));
}
