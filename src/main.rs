use std::sync::Arc;

use inbox_viewer::api::HttpMailApi;
use inbox_viewer::cli::CliViewer;
use inbox_viewer::config::ViewerConfig;
use inbox_viewer::error::Result;
use inbox_viewer::session::InboxSession;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ViewerConfig::from_env()?;

    // stdout carries the table, so logs go to stderr or a rolling file.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _log_guard = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "inbox-viewer.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    };

    eprintln!("📧 Inbox Viewer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {}", config.api_url);
    eprintln!("   Enrichment: up to {} emails at once", config.enrich_concurrency);
    if let Some(dir) = &config.log_dir {
        eprintln!("   Logs: {}", dir.display());
    }
    eprintln!("   Type help for commands. quit to exit.\n");

    let api = Arc::new(HttpMailApi::new(&config.api_url, config.request_timeout)?);
    let session = InboxSession::new(api, config.enrich_concurrency);

    CliViewer::new(session, config.page_size).run().await?;

    Ok(())
}
