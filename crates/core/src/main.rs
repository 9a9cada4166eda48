use clap::Parser;
use probehub_core::config::AppConfig;
use probehub_core::managers::PluginCatalog;

#[derive(Parser)]
#[command(
    name = "probehub_server",
    about = "Control plane for remote instrumentation agents"
)]
struct Cli {
    /// Override PORT from the environment.
    #[arg(long)]
    port: Option<u16>,
    /// Override BIND_ADDRESS from the environment.
    #[arg(long)]
    bind_address: Option<String>,
    /// Override DATABASE_URL from the environment.
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if dotenvy::dotenv().is_err() {
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
    tracing_subscriber::fmt::init();

    let mut config = AppConfig::load()?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(bind_address) = cli.bind_address {
        config.bind_address = bind_address;
    }
    if let Some(database_url) = cli.database_url {
        config.database_url = database_url;
    }

    let catalog = PluginCatalog::from_dir(std::path::Path::new(&config.plugin_dir))?;
    probehub_core::run_server(config, catalog).await
}
