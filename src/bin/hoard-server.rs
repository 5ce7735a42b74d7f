use clap::Parser;
use hoard::{ApiServer, Registry, VERSION};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct App {
    /// Address to listen on.
    #[clap(default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[clap(default_value_t = 8080)]
    port: u16,

    /// Directory holding one append-only file per store, created if absent.
    #[clap(default_value = "store")]
    store_root: PathBuf,

    #[clap(long, default_value = "info", env = "HOARD_LOG")]
    log_level: tracing_subscriber::filter::LevelFilter,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let app = App::parse();
    tracing_subscriber::fmt()
        .with_max_level(app.log_level)
        .init();

    info!("hoard v{}", VERSION);
    let registry = Registry::open(&app.store_root)?;

    ApiServer::new(registry, app.host, app.port).run().await?;
    info!("Terminating gracefully");
    Ok(())
}
