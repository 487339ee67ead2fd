use dgp_service::{ScanWorkflow, ServiceConfig, create_app, gateway::OpenRouterGateway};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// `LOG_FORMAT=pretty` for development, JSON lines otherwise
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dgp_service=debug,dgp_flow=debug,tower_http=debug".into());

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ServiceConfig::from_env().unwrap_or_else(|e| {
        error!("Invalid configuration: {:#}", e);
        std::process::exit(1);
    });
    info!(
        model = %config.openrouter.model,
        analysis_floor_ms = config.workflow.analysis_floor.as_millis() as u64,
        scan_hold_ms = config.workflow.scan_timing.hold_duration().as_millis() as u64,
        max_upload_bytes = config.max_upload_bytes,
        "Configuration loaded"
    );

    let gateway = OpenRouterGateway::new(config.openrouter.clone())?;
    let workflow = ScanWorkflow::new(Arc::new(gateway), config.workflow);
    let app = create_app(workflow, config.max_upload_bytes);

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    let addr = listener.local_addr()?;

    info!("DGP Blood Group Report Service starting on {}", addr);
    info!("API documentation available at http://{}/", addr);
    info!("Health check endpoint: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
