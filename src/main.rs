/// Find Connections server binary
use find_connections::{
    config::{LoggingConfig, ServerConfig},
    context::AppContext,
    error::AppResult,
    server,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration (reads .env first)
    let config = ServerConfig::from_env()?;

    init_logging(&config.logging);

    print_banner(&config.service.version);

    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await?;

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|e| {
        eprintln!("Invalid log filter {:?}: {}", logging.level, e);
        EnvFilter::new("info")
    });

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn print_banner(version: &str) {
    println!(
        r#"
    _______           __   ______                            __  _
   / ____(_)___  ____/ /  / ____/___  ____  ____  ___  _____/ /_(_)___  ____  _____
  / /_  / / __ \/ __  /  / /   / __ \/ __ \/ __ \/ _ \/ ___/ __/ / __ \/ __ \/ ___/
 / __/ / / / / / /_/ /  / /___/ /_/ / / / / / / /  __/ /__/ /_/ / /_/ / / / (__  )
/_/   /_/_/ /_/\__,_/   \____/\____/_/ /_/_/ /_/\___/\___/\__/_/\____/_/ /_/____/

        Photo connection finder v{}
        "#,
        version
    );
}
