//! Incremental runs driven by the checkpoint document.

use flurry::checkpoint::{CheckpointState, CheckpointStore};
use flurry::config::Config;
use flurry::dimension::SurrogateKey;
use flurry::pipeline::Pipeline;
use flurry::schema::Dimension;
use flurry::sink::MemorySink;
use flurry::storage::StorageProvider;
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn sale(customer: &str, quantity: i64) -> String {
    json!({
        "CustomerName": customer,
        "CustomerEmail": format!("{}@example.com", customer.to_lowercase()),
        "CustomerAddress": "123 Main Street",
        "ProductName": "Laptop",
        "ProductCategory": "Electronics",
        "ProductPrice": "999.99",
        "QuantitySold": quantity,
        "TransactionDate": "2024-02-07",
        "SalesPerson": "Alice Johnson",
    })
    .to_string()
}

fn write_source(dir: &Path, name: &str, lines: &[String]) {
    std::fs::write(dir.join(name), lines.join("\n")).unwrap();
}

struct Dirs {
    source: TempDir,
    state: TempDir,
}

impl Dirs {
    fn new() -> Self {
        Self {
            source: TempDir::new().unwrap(),
            state: TempDir::new().unwrap(),
        }
    }

    fn config(&self, batch_size: usize) -> Config {
        let yaml = format!(
            r#"
source:
  path: "{}"
  batch_size: {batch_size}
sink:
  format: memory
checkpoint:
  path: "{}"
"#,
            self.source.path().display(),
            self.state.path().display()
        );
        Config::from_yaml(&yaml).unwrap()
    }

    async fn store(&self) -> CheckpointStore {
        CheckpointStore::new(Arc::new(
            StorageProvider::for_url_with_options(
                self.state.path().to_str().unwrap(),
                HashMap::new(),
            )
            .await
            .unwrap(),
        ))
    }
}

async fn run(config: Config) -> (flurry::PipelineStats, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let mut pipeline = Pipeline::with_sink(config, sink.clone(), CancellationToken::new())
        .await
        .unwrap();
    (pipeline.run().await.unwrap(), sink)
}

#[tokio::test]
async fn test_second_run_reuses_keys_and_skips_finished_files() {
    let dirs = Dirs::new();
    write_source(dirs.source.path(), "day1.ndjson", &[sale("Ann", 1), sale("Ben", 2)]);

    let (first, sink) = run(dirs.config(100)).await;
    assert_eq!(first.files_processed, 1);
    assert!(first.checkpoints_saved >= 1);
    let ben = sink.facts()[1].customer_id;

    write_source(dirs.source.path(), "day2.ndjson", &[sale("Ben", 3), sale("Cat", 4)]);
    let (second, sink) = run(dirs.config(100)).await;

    assert_eq!(second.files_skipped, 1);
    assert_eq!(second.files_processed, 1);
    let facts = sink.facts();
    assert_eq!(facts.len(), 2);
    assert_eq!(facts[0].customer_id, ben);
    assert_eq!(facts[1].customer_id, SurrogateKey::new(2));

    // Only Cat is new; the snapshot still holds every customer.
    assert_eq!(second.dimension_rows_created, 1);
    assert_eq!(sink.dimension_rows(Dimension::Customer).len(), 3);
    // Batch numbering continues from the first run.
    assert_eq!(sink.batch_ids(), vec![2]);
}

#[tokio::test]
async fn test_resumes_partially_read_file() {
    let dirs = Dirs::new();
    write_source(
        dirs.source.path(),
        "sales.ndjson",
        &[sale("Ann", 1), sale("Ben", 2), sale("Cat", 3)],
    );

    let mut state = CheckpointState::default();
    state.update_records("sales.ndjson", 2);
    dirs.store().await.save(&state).await.unwrap();

    let (stats, sink) = run(dirs.config(2)).await;

    assert_eq!(stats.records_processed, 1);
    let facts = sink.facts();
    assert_eq!(facts.len(), 1);
    assert_eq!(facts[0].quantity_sold, 3);

    let saved = dirs.store().await.load().await.unwrap().unwrap();
    assert!(saved.is_finished("sales.ndjson"));
    assert_eq!(saved.batches_committed, 1);
}

#[tokio::test]
async fn test_corrupt_checkpoint_fails_the_run() {
    let dirs = Dirs::new();
    write_source(dirs.source.path(), "sales.ndjson", &[sale("Ann", 1)]);
    std::fs::write(
        dirs.state.path().join("flurry-checkpoint.json"),
        r#"{"version":1,"dimensions":[
            {"dimension":"SalesPerson","rows":[
                {"key":0,"attributes":[{"text":"Alice"}]},
                {"key":0,"attributes":[{"text":"Bob"}]}
            ]}
        ]}"#,
    )
    .unwrap();

    let mut pipeline = Pipeline::with_sink(
        dirs.config(10),
        Arc::new(MemorySink::new()),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    assert!(matches!(
        pipeline.run().await,
        Err(flurry::error::PipelineError::Checkpoint { .. })
    ));
}
