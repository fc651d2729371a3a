use ministry_access::config::AccessConfig;
use ministry_access::services::AccessError;
use ministry_access::startup::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = AccessConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.service_name,
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    )
    .map_err(|e| std::io::Error::other(format!("Tracing initialisation error: {}", e)))?;

    let app = Application::build(&config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    app.health_check().await.map_err(|e| {
        tracing::error!("Document store is not reachable: {}", e);
        std::io::Error::other(format!("Health check failed: {}", e))
    })?;

    match app.resume().await {
        Ok(Some(session)) => tracing::info!(
            user_id = %session.user_id(),
            role = %session.role,
            "Resumed existing session"
        ),
        Ok(None) => tracing::info!("No active session, sign-in required"),
        Err(AccessError::DeviceMismatch) => {
            tracing::warn!("Session belonged to another device and was cleared, sign-in required")
        }
        Err(e) => {
            tracing::error!("Session resume failed: {}", e);
            return Err(std::io::Error::other(format!("Resume error: {}", e)));
        }
    }

    Ok(())
}
