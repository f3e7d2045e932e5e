//! Batch harvest - process a list of identities against the mock source
//!
//! Runs without a browser or network access, so it works anywhere.
//!
//! Run with: cargo run --example batch_file

use std::time::Duration;

use fanlens::store::create_store;
use fanlens::{run_batch, MockSource, ProfileSource, Result, StoreConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fanlens=info".parse().unwrap()),
        )
        .init();

    println!("=== Fanlens Batch Example ===\n");

    let store = create_store(&StoreConfig::Sqlite {
        path: std::env::temp_dir().join("fanlens-batch-demo.db"),
    })
    .await?;
    store.create_table().await?;

    let mut source = MockSource::new();
    source.start().await?;

    let identities = vec!["testuser".to_string(), "sample_creator".to_string()];
    println!("Harvesting {} identities...\n", identities.len());

    let report = run_batch(
        &mut source,
        store.as_ref(),
        &identities,
        Duration::from_millis(200),
    )
    .await;

    println!(
        "Done: {} harvested, {} already snapshotted today, {} failed\n",
        report.succeeded, report.skipped, report.failed
    );

    println!("Stored profiles:");
    for profile in store.get_all().await? {
        println!(
            "  {} - {} posts, verified: {}",
            profile.username, profile.record.posts_count, profile.record.is_verified
        );
    }

    source.close().await?;
    store.close().await;

    println!("\n=== Done ===");
    Ok(())
}
