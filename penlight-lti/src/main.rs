//! penlight-lti - LTI outcomes synchronization service
//!
//! Keeps the host LMS gradebook in step with locally-recorded journal
//! grades: signed replaceResult passback, needs-grading notifications,
//! launch intake, and a periodic reconciliation sweep.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use penlight_common::config::{database_path, ensure_root_folder, resolve_root_folder};
use penlight_common::db::init::init_database;
use penlight_common::db::settings;
use penlight_common::events::EventBus;
use penlight_lti::config::LtiCredentials;
use penlight_lti::services::passback::PassbackOrchestrator;
use penlight_lti::services::reconciliation::ReconciliationSweep;
use penlight_lti::{build_router, AppState};

#[derive(Parser)]
#[command(name = "penlight-lti", about = "Penlight LTI outcomes sync service")]
struct Cli {
    /// Root folder holding penlight.db (overrides PENLIGHT_ROOT and the
    /// config file)
    #[arg(long)]
    root_folder: Option<String>,

    /// Listen port
    #[arg(long, default_value_t = 5761)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting Penlight LTI Outcomes Sync (penlight-lti) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();

    let root_folder = resolve_root_folder(cli.root_folder.as_deref(), "PENLIGHT_ROOT");
    ensure_root_folder(&root_folder)?;

    let db_path = database_path(&root_folder);
    info!("Database path: {}", db_path.display());

    let pool = match init_database(&db_path).await {
        Ok(pool) => {
            info!("✓ Database ready");
            pool
        }
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return Err(e.into());
        }
    };

    // Missing credentials are a deployment misconfiguration: fail fast
    // rather than accepting work that can never be signed
    let credentials = match LtiCredentials::resolve(&pool).await {
        Ok(credentials) => {
            info!("✓ LTI consumer credentials loaded (key: {})", credentials.consumer_key);
            credentials
        }
        Err(e) => {
            error!("Failed to load LTI credentials: {}", e);
            return Err(e.into());
        }
    };

    let platform_base_url = settings::get_platform_base_url(&pool).await?;
    let launch_url = format!("{}/lti/launch", platform_base_url.trim_end_matches('/'));

    let events = EventBus::new(1000);
    let orchestrator = Arc::new(PassbackOrchestrator::new(
        pool.clone(),
        credentials.clone(),
        events.clone(),
        platform_base_url,
    )?);
    let sweep = Arc::new(ReconciliationSweep::new(
        pool.clone(),
        orchestrator.clone(),
        events.clone(),
    ));

    let sweep_interval = settings::get_sweep_interval_secs(&pool).await?;
    sweep.clone().spawn(Duration::from_secs(sweep_interval));
    info!("Reconciliation sweep scheduled every {}s", sweep_interval);

    let state = AppState {
        db: pool,
        orchestrator,
        sweep,
        events,
        launch_url,
        credentials,
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", cli.port)).await?;
    info!("penlight-lti listening on http://127.0.0.1:{}", cli.port);
    info!("Health check: http://127.0.0.1:{}/health", cli.port);

    axum::serve(listener, app).await?;

    Ok(())
}
