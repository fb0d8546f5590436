//! Fire and smoke watch binary.
//!
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::TimestampPrecision;
use firewatch::{
    dashboard::{router, DashboardSink, DashboardState, StatusBoard},
    fetcher::HttpFrameSource,
    orchestrator::Orchestrator,
    pubsub::NamedPubSub,
    session::{DefaultProvider, Session},
    settings::Settings,
};

#[derive(Parser, Debug)]
#[clap(author, version)]
struct Args {
    /// JSON settings file, written back when settings are saved
    #[clap(long)]
    settings: Option<PathBuf>,

    /// Address to serve the dashboard on
    #[clap(long, default_value = "127.0.0.1:3000")]
    server_address: String,

    /// Start streaming right away
    #[clap(long)]
    start: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logger
    env_logger::builder()
        .format_timestamp(Some(TimestampPrecision::Millis))
        .init();

    let settings = match &args.settings {
        Some(path) if path.exists() => Settings::load(path)?,
        Some(path) => {
            log::info!("No settings at {}, using defaults", path.display());
            Settings::default()
        }
        None => Settings::default(),
    };

    let session = Arc::new(
        Session::new(settings, Box::new(DefaultProvider), args.settings.clone())
            .await
            .context("failed to set up the watch session")?,
    );

    let board = Arc::new(StatusBoard::new());
    let pubsub = Arc::new(NamedPubSub::new());

    {
        let sink = DashboardSink::new(board.clone(), pubsub.clone());
        let source = Arc::new(HttpFrameSource::default());
        let session = session.clone();
        tokio::spawn(async move { Orchestrator::new(session, source, sink).run().await });
    }

    if args.start {
        session.start();
    }

    let app = router(Arc::new(DashboardState {
        session,
        board,
        pubsub,
        client: reqwest::Client::new(),
    }));

    // Serve HTTP server
    let addr: SocketAddr = args.server_address.parse()?;
    log::info!("Dashboard on http://{}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            log::info!("Shutting down");
        })
        .await?;

    Ok(())
}
