//! Search channels and page through the results.
//!
//! Reads TWITCH_CLIENT_ID / TWITCH_ACCESS_TOKEN from the environment or a
//! `.env` file. Usage: `cargo run --example search_channels -- <query> [pages]`

use tracing_subscriber::EnvFilter;
use twitch_kit::TwitchConfig;
use twitch_kit::api::Client;

/// Load .env from multiple candidate paths.
fn load_dotenv() {
    let candidates = [".env", "../.env", "../../.env"];
    for path in &candidates {
        if dotenvy::from_filename(path).is_ok() {
            tracing::info!("Loaded .env from: {path}");
            return;
        }
    }
    tracing::info!("No .env file found, using system environment variables");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    load_dotenv();
    let config = TwitchConfig::from_env();
    if !config.is_configured() {
        anyhow::bail!("TWITCH_CLIENT_ID is not set");
    }

    let mut args = std::env::args().skip(1);
    let query = args.next().unwrap_or_else(|| "speedrun".into());
    let pages: usize = args.next().and_then(|p| p.parse().ok()).unwrap_or(1);

    let client = Client::from_config(&config)?;
    let mut cursor = String::new();

    // Pagination is manual; stop on an empty cursor or the page limit.
    for page in 1..=pages {
        let mut call = client.search_channels().list().query(&query).first(20);
        if !cursor.is_empty() {
            call = call.after(&cursor);
        }
        let resp = call.send().await?;

        for channel in &resp.data {
            println!(
                "{:<24} live={:<5} {} | {}",
                channel.user_login, channel.is_live, channel.game_name, channel.title
            );
        }
        tracing::info!(page, count = resp.data.len(), "Fetched page");

        if !resp.has_more() {
            break;
        }
        cursor = resp.cursor;
    }

    Ok(())
}
