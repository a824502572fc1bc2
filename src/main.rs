/// Agent Directory - moderation and audit service
///
/// Serves the admin API used by moderators and admins to review agent
/// listings, reviews and user accounts, with every action recorded in an
/// append-only audit log.
use agent_directory::{config::ServerConfig, context::AppContext, error::DirectoryResult, server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> DirectoryResult<()> {
    // Load configuration (also reads .env)
    let config = ServerConfig::from_env()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        version = %config.service.version,
        admins = config.authentication.admin_ids.len(),
        "Starting agent directory"
    );

    // Create application context
    let ctx = AppContext::new(config).await?;

    // Start server
    server::serve(ctx).await?;

    Ok(())
}
