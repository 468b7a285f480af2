use ouro_network::{
    facades::{self, PeerClient, PeerConfig},
    miniprotocols::{self, blockfetch, Point, PREPROD_MAGIC},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("hex conversion error")]
    FromHexError(#[from] hex::FromHexError),

    #[error("config file error")]
    ConfigIo(#[from] std::io::Error),

    #[error("config parsing error")]
    ConfigParse(#[from] serde_json::Error),

    #[error("connection error")]
    Connection(#[from] facades::Error),

    #[error("blockfetch error")]
    BlockFetch(#[from] miniprotocols::Error),
}

const DEFAULT_PEER: &str = "preprod-node.play.dev.cardano.org:3001";

/// Reads the peer config from the json file given as second argument, if any
fn load_config() -> Result<PeerConfig, Error> {
    match std::env::args().nth(2) {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(PeerConfig {
            network_magic: PREPROD_MAGIC,
            ..Default::default()
        }),
    }
}

fn print_block(body: blockfetch::Body) -> Result<(), miniprotocols::BoxError> {
    if body.is_empty() {
        return Err("empty block body".into());
    }

    tracing::info!(size = body.len(), "block received");
    tracing::debug!("{}", hex::encode(&body));

    Ok(())
}

async fn download() -> Result<(), Error> {
    let server = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_PEER.to_string());

    let config = load_config()?;

    let mut peer = PeerClient::connect(server.as_str(), &config, Box::new(print_block)).await?;

    tracing::info!(version = peer.version(), "handshake done");

    let point = Point::Specific(
        1654413,
        hex::decode("7de1f036df5a133ce68a82877d14354d0ba6de7625ab918e75f3e2ecb29771ab")?,
    );

    let fetched = tokio::select! {
        fetched = peer.blockfetch.fetch_range(point.clone(), point) => fetched,
        Some(failure) = peer.failures.recv() => Err(failure.error),
    };

    match fetched {
        Ok(count) => tracing::info!(count, "range downloaded"),
        Err(err) => tracing::error!(%err, "range not downloaded"),
    }

    if !peer.blockfetch().is_halted() {
        peer.blockfetch().stop().await?;
    }

    peer.abort().await;

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(tracing::Level::INFO)
            .finish(),
    )
    .unwrap();

    if let Err(err) = download().await {
        tracing::error!("{err}");
    }
}
