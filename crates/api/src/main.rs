use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use netreg_api::{router, AppState, HealthController};
use netreg_engine::mac_allocator::Oui;
use netreg_store::memory::InMemoryStore;
use tracing::info;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
pub struct Options {
    #[clap(short = 'l', long, env = "NETREG_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// 24-bit OUI prefix for generated MAC addresses, e.g. `90b8d0`.
    #[clap(long, env = "NETREG_OUI", default_value = "90b8d0", value_parser = parse_oui)]
    pub oui: u32,
}

fn parse_oui(raw: &str) -> Result<u32, String> {
    u32::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| e.to_string())
        .and_then(|v| if v > Oui::MASK { Err("oui does not fit in 24 bits".into()) } else { Ok(v) })
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let options = Options::parse();

    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::metadata::LevelFilter::INFO.into())
        .from_env_lossy()
        .add_directive("tower=warn".parse()?)
        .add_directive("hyper=warn".parse()?);
    tracing_subscriber::registry().with(fmt::layer()).with(env_filter).init();

    let state = Arc::new(AppState {
        store: Arc::new(InMemoryStore::new()),
        oui: Oui(options.oui),
        health: HealthController::new(),
    });

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(options.listen).await?;
    info!(addr = %options.listen, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
