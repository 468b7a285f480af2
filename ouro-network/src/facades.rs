use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use tokio::net::{TcpListener, ToSocketAddrs};

use crate::miniprotocols::handshake::n2n::{
    DIFFUSION_MODE_INITIATOR_AND_RESPONDER, DIFFUSION_MODE_INITIATOR_ONLY, PROTOCOL_V10,
    PROTOCOL_V11, PROTOCOL_V12, PROTOCOL_V13, PROTOCOL_V7, PROTOCOL_V8, PROTOCOL_V9,
};
use crate::miniprotocols::handshake::{Confirmation, NetworkMagic, VersionNumber, VersionTable};
use crate::miniprotocols::{
    self, blockfetch, failure_channel, handshake, FailureReceiver, MAINNET_MAGIC,
    PROTOCOL_N2N_BLOCK_FETCH, PROTOCOL_N2N_HANDSHAKE,
};
use crate::multiplexer::{self, Bearer, RunningPlexer};

#[derive(Debug, Error)]
pub enum Error {
    #[error("error connecting bearer")]
    ConnectFailure(#[source] tokio::io::Error),

    #[error("handshake protocol error")]
    HandshakeProtocol(#[source] miniprotocols::Error),

    #[error("handshake version not accepted")]
    IncompatibleVersion,
}

/// Settings of one node-to-node connection, shared by both ends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    pub network_magic: NetworkMagic,

    /// Versions proposed when connecting, accepted when listening
    pub versions: Vec<VersionNumber>,

    /// Diffusion mode proposed when connecting. A listening node takes the
    /// mode from the initiator's proposal and ignores this flag.
    pub full_duplex: bool,

    pub blockfetch: blockfetch::Timeouts,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            network_magic: MAINNET_MAGIC,
            versions: vec![
                PROTOCOL_V7,
                PROTOCOL_V8,
                PROTOCOL_V9,
                PROTOCOL_V10,
                PROTOCOL_V11,
                PROTOCOL_V12,
                PROTOCOL_V13,
            ],
            full_duplex: false,
            blockfetch: blockfetch::Timeouts::default(),
        }
    }
}

impl PeerConfig {
    pub fn version_table(&self) -> VersionTable {
        let diffusion_mode = match self.full_duplex {
            true => DIFFUSION_MODE_INITIATOR_AND_RESPONDER,
            false => DIFFUSION_MODE_INITIATOR_ONLY,
        };

        VersionTable::from_versions(self.network_magic, &self.versions, diffusion_mode)
    }
}

/// Client of N2N Ouroboros
pub struct PeerClient {
    pub plexer: RunningPlexer,
    pub blockfetch: blockfetch::Client,
    pub failures: FailureReceiver,
    version: VersionNumber,
    full_duplex: bool,
}

impl PeerClient {
    /// Connects to `addr`, negotiates a version and leaves the block-fetch
    /// client ready to stream into `on_block`
    pub async fn connect(
        addr: impl ToSocketAddrs,
        config: &PeerConfig,
        on_block: blockfetch::BlockFunc,
    ) -> Result<Self, Error> {
        let bearer = Bearer::connect_tcp(addr)
            .await
            .map_err(Error::ConnectFailure)?;

        let mut plexer = multiplexer::Plexer::new(bearer);

        let hs_channel = plexer.subscribe_client(PROTOCOL_N2N_HANDSHAKE);
        let bf_channel = plexer.subscribe_client(PROTOCOL_N2N_BLOCK_FETCH);

        let plexer = plexer.spawn();

        let (failures_tx, failures) = failure_channel();

        let mut handshake = handshake::Client::new(hs_channel, failures_tx.clone());

        let confirmation = match handshake.handshake(config.version_table()).await {
            Ok(x) => x,
            Err(err) => {
                plexer.abort().await;
                return Err(Error::HandshakeProtocol(err));
            }
        };

        let (version, full_duplex) = match confirmation {
            Confirmation::Accepted(version, data) => (version, data.is_full_duplex()),
            Confirmation::Rejected(reason) => {
                error!(?reason, "handshake refused");
                plexer.abort().await;
                return Err(Error::IncompatibleVersion);
            }
            Confirmation::QueryReply(table) => {
                error!(versions = ?table.versions(), "query reply to a regular proposal");
                plexer.abort().await;
                return Err(Error::IncompatibleVersion);
            }
        };

        info!(version, full_duplex, "connected to peer");

        let bf_config = blockfetch::Config::new(on_block).with_timeouts(config.blockfetch);

        Ok(Self {
            plexer,
            blockfetch: blockfetch::Client::new(bf_channel, failures_tx, bf_config),
            failures,
            version,
            full_duplex,
        })
    }

    pub fn version(&self) -> VersionNumber {
        self.version
    }

    pub fn is_full_duplex(&self) -> bool {
        self.full_duplex
    }

    pub fn blockfetch(&mut self) -> &mut blockfetch::Client {
        &mut self.blockfetch
    }

    pub fn failures(&mut self) -> &mut FailureReceiver {
        &mut self.failures
    }

    pub async fn abort(self) {
        self.plexer.abort().await
    }
}

/// Server of N2N Ouroboros
pub struct PeerServer {
    pub plexer: RunningPlexer,
    pub blockfetch: blockfetch::Server,
    pub failures: FailureReceiver,
    accepted_address: SocketAddr,
    accepted_version: VersionNumber,
    full_duplex: bool,
}

impl PeerServer {
    /// Accepts the next connection of `listener` and answers its handshake
    /// with the highest version of `config` the peer proposed
    pub async fn accept(listener: &TcpListener, config: &PeerConfig) -> Result<Self, Error> {
        let (bearer, address) = Bearer::accept_tcp(listener)
            .await
            .map_err(Error::ConnectFailure)?;

        debug!(%address, "bearer accepted");

        let mut plexer = multiplexer::Plexer::new(bearer);

        let hs_channel = plexer.subscribe_server(PROTOCOL_N2N_HANDSHAKE);
        let bf_channel = plexer.subscribe_server(PROTOCOL_N2N_BLOCK_FETCH);

        let plexer = plexer.spawn();

        let (failures_tx, failures) = failure_channel();

        let hs_config = handshake::Config::new(
            config.versions.clone(),
            Box::new(move |version, full_duplex| {
                debug!(%address, version, full_duplex, "handshake finished");
                Ok(())
            }),
        );

        let mut handshake = handshake::Server::new(hs_channel, failures_tx.clone(), hs_config);

        let (version, data) = match handshake.run().await {
            Ok(x) => x,
            Err(miniprotocols::Error::NoMutualVersion(proposed)) => {
                error!(?proposed, "no mutual version with peer");
                plexer.abort().await;
                return Err(Error::IncompatibleVersion);
            }
            Err(err) => {
                plexer.abort().await;
                return Err(Error::HandshakeProtocol(err));
            }
        };

        info!(%address, version, "peer accepted");

        Ok(Self {
            plexer,
            blockfetch: blockfetch::Server::new(bf_channel, failures_tx),
            failures,
            accepted_address: address,
            accepted_version: version,
            full_duplex: data.is_full_duplex(),
        })
    }

    pub fn accepted_address(&self) -> SocketAddr {
        self.accepted_address
    }

    pub fn accepted_version(&self) -> VersionNumber {
        self.accepted_version
    }

    pub fn is_full_duplex(&self) -> bool {
        self.full_duplex
    }

    pub fn blockfetch(&mut self) -> &mut blockfetch::Server {
        &mut self.blockfetch
    }

    pub fn failures(&mut self) -> &mut FailureReceiver {
        &mut self.failures
    }

    pub async fn abort(self) {
        self.plexer.abort().await
    }
}
