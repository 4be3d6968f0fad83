use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::time::{sleep, Duration};

use bgpfsmd::{config, peer::PeerManager};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Opt {
    #[arg(short, long, value_parser, default_value = "bgpfsmd.conf")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::parse();

    let config = config::read_config(&opt.config)
        .with_context(|| format!("failed to read config file {}", opt.config.display()))?;

    let manager = PeerManager::spawn(config);

    tokio::spawn(async move {
        if let Err(e) = manager.listen().await {
            log::error!("listener exited: {}", e);
        }
    });

    loop {
        sleep(Duration::from_secs(1)).await;
    }
}
