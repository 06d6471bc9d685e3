use sipua::application::UaRuntime;
use sipua::config::RawConfiguration;
use sipua::domain::agent::EventKind;
use sipua::UserAgent;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "sipua.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting sipua");

    // Load configuration
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let raw = RawConfiguration::from_file(&path)?;
    info!("Configuration loaded from {}", path);

    let mut runtime = UaRuntime::new(UserAgent::builder(raw))?;

    for kind in [
        EventKind::Connecting,
        EventKind::Connected,
        EventKind::Disconnected,
        EventKind::Registered,
        EventKind::Unregistered,
        EventKind::RegistrationFailed,
        EventKind::NewMessage,
    ] {
        runtime.agent_mut().on(kind, |event| {
            match serde_json::to_string(&event.notification) {
                Ok(json) => info!("Event: {}", json),
                Err(e) => warn!("Unable to render event: {}", e),
            }
        });
    }

    let handle = runtime.handle();
    let agent = tokio::spawn(runtime.run());

    handle.start()?;
    info!("User agent started, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    handle.shutdown()?;

    let agent = agent.await?;
    info!("Stopped with status {}", agent.status());

    Ok(())
}
