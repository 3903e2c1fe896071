//! End-to-end retrieval pipeline tests: data-folder ingestion, per-user
//! collection isolation, similarity retrieval, and chat history, all
//! against temporary directories with the local hash embedder and echo
//! model.

use docuchat::agent;
use docuchat::config::Config;
use docuchat::db;
use docuchat::history;
use docuchat::index::IndexRegistry;
use docuchat::ingest;
use docuchat::llm::EchoModel;
use docuchat::migrate;
use docuchat::retrieve;
use tempfile::TempDir;

fn test_config(tmp: &TempDir) -> Config {
    let root = tmp.path();
    let content = format!(
        r#"
[db]
path = "{db}"

[index]
dir = "{index}"

[data]
folder = "{data}"

[chunking]
chunk_size = 1000
chunk_overlap = 200

[retrieval]
top_k = 3

[embedding]
provider = "hash"
model = "token-hash"
dims = 256

[llm]
provider = "echo"

[server]
bind = "127.0.0.1:0"

[session]
secret = "test-secret"
"#,
        db = root.join("app.sqlite").display(),
        index = root.join("index").display(),
        data = root.join("data").display(),
    );
    toml::from_str(&content).unwrap()
}

fn write_data_file(cfg: &Config, name: &str, body: &str) {
    std::fs::create_dir_all(&cfg.data.folder).unwrap();
    std::fs::write(cfg.data.folder.join(name), body).unwrap();
}

#[tokio::test]
async fn ingest_then_retrieve_most_similar_chunk() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);

    write_data_file(
        &cfg,
        "zebras.txt",
        "Zebras are African equines with distinctive black and white stripes. \
         Zebra stripes are unique to each individual.",
    );
    write_data_file(
        &cfg,
        "qubits.txt",
        "Quantum computers use qubits to represent superpositions of states. \
         Qubit coherence is fragile.",
    );

    let registry = IndexRegistry::new(&cfg).unwrap();
    let loaded = ingest::ingest_data_folder(&registry, &cfg, "alice")
        .await
        .unwrap();
    assert!(loaded);

    let index = registry.get_or_create("alice").await.unwrap();
    assert_eq!(index.count().await.unwrap(), 2);

    let results = retrieve::retrieve(&registry, &cfg, "zebra stripes", "alice", 3).await;
    assert!(!results.is_empty());
    assert!(results.len() <= 3);
    assert!(results[0].text.contains("Zebras"));
    assert_eq!(results[0].meta.file_name, "zebras.txt");
    assert_eq!(results[0].meta.user_id, "alice");
}

#[tokio::test]
async fn second_ingest_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    write_data_file(&cfg, "notes.txt", "The quick brown fox jumps over the lazy dog.");

    let registry = IndexRegistry::new(&cfg).unwrap();
    assert!(ingest::ingest_data_folder(&registry, &cfg, "alice")
        .await
        .unwrap());
    let count_before = registry
        .get_or_create("alice")
        .await
        .unwrap()
        .count()
        .await
        .unwrap();

    // Already loaded in this process: no new chunks.
    assert!(!ingest::ingest_data_folder(&registry, &cfg, "alice")
        .await
        .unwrap());
    let count_after = registry
        .get_or_create("alice")
        .await
        .unwrap()
        .count()
        .await
        .unwrap();
    assert_eq!(count_before, count_after);
}

#[tokio::test]
async fn empty_data_folder_yields_no_results() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);

    let registry = IndexRegistry::new(&cfg).unwrap();
    let loaded = ingest::ingest_data_folder(&registry, &cfg, "alice")
        .await
        .unwrap();
    assert!(!loaded);
    // The missing folder was created so users can drop files in later.
    assert!(cfg.data.folder.is_dir());

    let results = retrieve::retrieve(&registry, &cfg, "anything at all", "alice", 3).await;
    assert!(results.is_empty());
}

#[tokio::test]
async fn collections_are_isolated_per_user() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    write_data_file(&cfg, "shared.txt", "Shared knowledge about gardening and soil.");

    let registry = IndexRegistry::new(&cfg).unwrap();
    ingest::ingest_data_folder(&registry, &cfg, "alice")
        .await
        .unwrap();

    // Alice's ingestion must not touch Bob's collection.
    let bob = registry.get_or_create("bob").await.unwrap();
    assert_eq!(bob.count().await.unwrap(), 0);
    assert!(tmp.path().join("index/alice/vectors.sqlite").is_file());
    assert!(tmp.path().join("index/bob/vectors.sqlite").is_file());

    // Bob's first retrieval ingests the shared folder into his own collection.
    let results = retrieve::retrieve(&registry, &cfg, "gardening soil", "bob", 3).await;
    assert!(!results.is_empty());
    assert_eq!(results[0].meta.user_id, "bob");

    let alice = registry.get_or_create("alice").await.unwrap();
    assert_eq!(alice.count().await.unwrap(), bob.count().await.unwrap());
}

#[tokio::test]
async fn unsupported_files_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    write_data_file(&cfg, "notes.txt", "Plain text notes about sailing knots.");
    write_data_file(&cfg, "photo.png", "not really an image");
    write_data_file(&cfg, "script.sh", "echo hi");

    let registry = IndexRegistry::new(&cfg).unwrap();
    assert!(ingest::ingest_data_folder(&registry, &cfg, "alice")
        .await
        .unwrap());

    let index = registry.get_or_create("alice").await.unwrap();
    let info = index.info().await.unwrap();
    assert_eq!(info.loaded_files, vec!["notes.txt".to_string()]);
    assert_eq!(info.total_chunks, 1);
}

#[tokio::test]
async fn corrupt_files_do_not_abort_the_batch() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    write_data_file(&cfg, "broken.pdf", "this is not a pdf");
    write_data_file(&cfg, "broken.docx", "this is not a zip archive");
    write_data_file(
        &cfg,
        "good.txt",
        "Sailing knots include the bowline and the clove hitch.",
    );

    let registry = IndexRegistry::new(&cfg).unwrap();
    assert!(ingest::ingest_data_folder(&registry, &cfg, "alice")
        .await
        .unwrap());

    // The unreadable files are skipped; the readable one still lands.
    let index = registry.get_or_create("alice").await.unwrap();
    let info = index.info().await.unwrap();
    assert_eq!(info.loaded_files, vec!["good.txt".to_string()]);
    assert_eq!(info.total_chunks, 1);

    let results = retrieve::retrieve(&registry, &cfg, "bowline knot", "alice", 3).await;
    assert!(!results.is_empty());
    assert_eq!(results[0].meta.file_name, "good.txt");
}

#[tokio::test]
async fn chat_turn_is_grounded_when_documents_exist() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    write_data_file(&cfg, "manual.txt", "The flux capacitor requires 1.21 gigawatts.");

    let registry = IndexRegistry::new(&cfg).unwrap();
    let turn = agent::run_turn(&registry, &cfg, &EchoModel, "alice", "flux capacitor power?")
        .await
        .unwrap();

    assert!(!turn.context.is_empty());
    assert_eq!(turn.response, "(grounded) flux capacitor power?");
    assert_eq!(turn.documents.len(), 1);
}

#[tokio::test]
async fn chat_turn_is_ungrounded_without_documents() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);

    let registry = IndexRegistry::new(&cfg).unwrap();
    let turn = agent::run_turn(&registry, &cfg, &EchoModel, "alice", "hello there")
        .await
        .unwrap();

    assert!(turn.context.is_empty());
    assert_eq!(turn.response, "(ungrounded) hello there");
    assert!(turn.documents.is_empty());
}

#[tokio::test]
async fn history_delete_only_affects_one_user() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);

    migrate::run_migrations(&cfg).await.unwrap();
    let pool = db::connect(&cfg).await.unwrap();

    history::save_turn(&pool, "alice", "q1", "a1").await.unwrap();
    history::save_turn(&pool, "alice", "q2", "a2").await.unwrap();
    history::save_turn(&pool, "bob", "q3", "a3").await.unwrap();
    let doc = history::record_uploaded_document(&pool, "alice", "report.pdf")
        .await
        .unwrap();
    assert!(!doc.processed);

    let alice_turns = history::list_turns(&pool, "alice").await.unwrap();
    assert_eq!(alice_turns.len(), 2);
    assert_eq!(alice_turns[0].message, "q1");
    assert_eq!(alice_turns[1].message, "q2");

    history::delete_user_history(&pool, "alice").await.unwrap();
    assert!(history::list_turns(&pool, "alice").await.unwrap().is_empty());
    assert_eq!(history::list_turns(&pool, "bob").await.unwrap().len(), 1);

    // The uploaded-document record goes with the history.
    let remaining: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM uploaded_documents WHERE user_id = ?")
            .bind("alice")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(remaining, 0);
}
