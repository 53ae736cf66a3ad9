mod app;

use crate::app::App;
use anyhow::{Context, Result};
use chunkdl::{ConfigBuilder, Downloader};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[tokio::main]
async fn main() -> Result<()> {
    let start = Instant::now();
    let app: App = App::new();
    app.init_logging();
    let res = run(&app).await;
    println!("Total time: {:?}", start.elapsed());
    let saved = res?;
    println!("Download complete: {}", saved.display());
    Ok(())
}

async fn run(app: &App) -> Result<PathBuf> {
    let mut config = ConfigBuilder::default();
    config.chunks(app.chunks);
    if let Some(n) = app.max_concurrency {
        config.max_concurrency(n);
    }
    if let Some(secs) = app.timeout {
        config.request_timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = app.deadline {
        config.deadline(Duration::from_secs(secs));
    }
    let config = config.build().context("Invalid options")?;
    let mut dl = Downloader::with_config(&app.url, config)
        .await
        .with_context(|| format!("Failed to probe {}", app.url))?;
    #[cfg(feature = "progress")]
    if !app.no_progress {
        dl.progress_bar();
    }
    let output = app.output.clone().unwrap_or_else(|| PathBuf::from("."));
    dl.download_and_save(&output)
        .await
        .context("Download failed")
}
