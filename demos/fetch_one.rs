//! Fetch one profile - harvest a single identity through a real browser
//!
//! Run with: cargo run --example fetch_one -- <identity>

use fanlens::{HarvestConfig, Harvester, ProfileSource, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fanlens=info".parse().unwrap()),
        )
        .init();

    let identity = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "onlyfans".to_string());

    println!("=== Fanlens Fetch Example ===\n");

    let config = HarvestConfig::default();

    println!("Starting browser session...");
    let mut source = Harvester::new(config);
    source.start().await?;

    println!("Harvesting profile for {identity}...\n");
    let record = source.get_profile_data(&identity).await?;

    println!("{}", serde_json::to_string_pretty(&record)?);
    println!("\nTokens captured: {}", source.tokens_valid());

    println!("Closing browser...");
    source.close().await?;

    println!("\n=== Done ===");
    Ok(())
}
