//! Line-delimited JSON host for the orchestrator.
//!
//! Reads one request per line on stdin and writes one response per line on
//! stdout. Logs go to stderr. Requests are handled in order; job work keeps
//! running in the background between requests.
//!
//! Usage: `atelier-host [config.json]` (or `ATELIER_CONFIG`).
//! `ATELIER_LOG_FORMAT=json` switches log output to JSON.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use atelier::analysis::{
    AnalysisInvoker, CredentialProvider, HttpAnalysisService, RefreshingCredential,
    StaticCredential,
};
use atelier::board::HttpBoardSource;
use atelier::config::{load_config, Config};
use atelier::db::Database;
use atelier::logging::{init_logging, LogFormat};
use atelier::protocol::{dispatch_raw, Response};
use atelier::{AtelierError, Orchestrator, SqliteStore};

fn config_path() -> Option<PathBuf> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("ATELIER_CONFIG").ok())
        .map(PathBuf::from)
}

fn credentials(config: &Config) -> atelier::Result<Arc<dyn CredentialProvider>> {
    let auth = &config.auth;
    let id_token = auth.id_token();

    match &auth.token_url {
        Some(token_url) => {
            let refreshing = RefreshingCredential::new(
                token_url,
                id_token,
                auth.refresh_token(),
                config.analysis.request_timeout(),
            )
            .map_err(|e| AtelierError::Analysis(e.into()))?;
            Ok(Arc::new(refreshing))
        }
        None => {
            if id_token.is_none() {
                log::warn!(
                    "No credential in ${}; analysis requests will ask the user to sign in",
                    auth.id_token_env
                );
            }
            Ok(Arc::new(StaticCredential::from_secret(id_token)))
        }
    }
}

fn build_orchestrator(config: &Config) -> atelier::Result<Orchestrator> {
    let db_path = config.database_path().ok_or_else(|| {
        AtelierError::Validation("Could not determine database path".to_string())
    })?;
    let store = Arc::new(SqliteStore::new(Database::open(&db_path)?));

    let endpoint = config.analysis.endpoint.as_deref().ok_or_else(|| {
        AtelierError::Validation("analysis.endpoint must be configured".to_string())
    })?;
    let service = HttpAnalysisService::new(
        endpoint,
        config.analysis.connect_timeout(),
        config.analysis.request_timeout(),
    )?;

    let credentials = credentials(config)?;
    let invoker = AnalysisInvoker::new(Arc::new(service), Arc::clone(&credentials));

    let mut builder = Orchestrator::builder(store, invoker)
        .resolver(Arc::new(config.board.resolver()))
        .board_settings(config.board.job_settings())
        .poll_interval(config.polling.interval());

    if let Some(pins_endpoint) = &config.board.pins_endpoint {
        let source = HttpBoardSource::new(
            pins_endpoint,
            credentials,
            config.auth.board_token(),
            config.analysis.request_timeout(),
        )?;
        builder = builder.board_source(Arc::new(source), config.board.max_fetch_items);
    }

    Ok(builder.build())
}

async fn serve(orchestrator: Orchestrator) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = dispatch_raw(&orchestrator, &line).await;
        let encoded = serde_json::to_string(&response).unwrap_or_else(|e| {
            log::error!("Failed to encode response: {}", e);
            serde_json::to_string(&Response::failure("Internal error"))
                .unwrap_or_else(|_| r#"{"success":false}"#.to_string())
        });

        stdout.write_all(encoded.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    log::info!("stdin closed, shutting down");
    Ok(())
}

async fn run() -> atelier::Result<()> {
    let config = match config_path() {
        Some(path) => {
            log::info!("Loading config from {:?}", path);
            load_config(&path)?
        }
        None => Config::default(),
    };

    let orchestrator = build_orchestrator(&config)?;

    for orphan in orchestrator.orphaned_jobs().await? {
        log::warn!(
            "Found orphaned job {} left analyzing since {:?}; it will stay until cancelled or superseded",
            orphan.job_id.as_deref().unwrap_or("<unknown>"),
            orphan.created_at
        );
    }

    log::info!("atelier-host v{} ready", env!("CARGO_PKG_VERSION"));

    serve(orchestrator).await?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let format = std::env::var("ATELIER_LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();
    init_logging(format);

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
