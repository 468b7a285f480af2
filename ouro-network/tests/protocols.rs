use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use ouro_network::facades::{Error, PeerClient, PeerConfig, PeerServer};
use ouro_network::miniprotocols::blockfetch::{self, Body, Range};
use ouro_network::miniprotocols::{BoxError, Point, PREVIEW_MAGIC};
use tokio::net::TcpListener;

type Delivered = Arc<Mutex<Vec<Body>>>;

async fn listen() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .await
        .unwrap();

    let address = listener.local_addr().unwrap();

    (listener, address)
}

fn recording_callback() -> (blockfetch::BlockFunc, Delivered) {
    let delivered: Delivered = Default::default();
    let sink = delivered.clone();

    let callback: blockfetch::BlockFunc = Box::new(move |body| {
        sink.lock().unwrap().push(body);
        Ok(())
    });

    (callback, delivered)
}

fn chain(range: &Range) -> Result<Vec<Body>, BoxError> {
    let (start, end) = range;

    let bodies = (start.slot_or_default()..=end.slot_or_default())
        .map(|slot| slot.to_be_bytes().to_vec())
        .collect();

    Ok(bodies)
}

fn preview(versions: Vec<u64>) -> PeerConfig {
    PeerConfig {
        network_magic: PREVIEW_MAGIC,
        versions,
        ..Default::default()
    }
}

#[tokio::test]
async fn blocks_stream_from_server_to_client() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let (listener, address) = listen().await;

    let server = tokio::spawn(async move {
        let mut peer = PeerServer::accept(&listener, &preview(vec![11, 12, 13]))
            .await
            .unwrap();

        assert_eq!(peer.accepted_version(), 13);

        peer.blockfetch().serve(chain).await.unwrap();
        assert!(peer.blockfetch().is_done());

        peer.abort().await;
    });

    let (callback, delivered) = recording_callback();

    let mut peer = PeerClient::connect(address, &preview(vec![7, 8, 9, 10, 11, 12, 13]), callback)
        .await
        .unwrap();

    assert_eq!(peer.version(), 13);
    assert!(!peer.is_full_duplex());

    let count = peer
        .blockfetch()
        .fetch_range(Point::new(1, vec![1]), Point::new(10, vec![10]))
        .await
        .unwrap();

    assert_eq!(count, 10);

    let expected: Vec<Body> = (1u64..=10).map(|x| x.to_be_bytes().to_vec()).collect();
    assert_eq!(*delivered.lock().unwrap(), expected);

    let single = peer
        .blockfetch()
        .fetch_single(Point::new(42, vec![42]))
        .await
        .unwrap();

    assert_eq!(single, 42u64.to_be_bytes().to_vec());

    peer.blockfetch().stop().await.unwrap();
    server.await.unwrap();

    assert!(peer.failures().try_recv().is_err());

    peer.abort().await;
}

#[tokio::test]
async fn disjoint_versions_leave_the_connection_unusable() {
    let (listener, address) = listen().await;

    let server =
        tokio::spawn(async move { PeerServer::accept(&listener, &preview(vec![13])).await });

    let (callback, _) = recording_callback();

    let client = tokio::spawn(async move {
        PeerClient::connect(address, &preview(vec![7, 8]), callback).await
    });

    let accepted = server.await.unwrap();
    assert!(matches!(accepted, Err(Error::IncompatibleVersion)));

    // the responder never answers; aborting its plexer closes the socket
    let connected = client.await.unwrap();
    assert!(matches!(connected, Err(Error::HandshakeProtocol(_))));
}

#[tokio::test]
async fn full_duplex_is_negotiated_from_the_proposal() {
    let (listener, address) = listen().await;

    let server = tokio::spawn(async move {
        let peer = PeerServer::accept(&listener, &preview(vec![13])).await.unwrap();
        let full_duplex = peer.is_full_duplex();
        peer.abort().await;
        full_duplex
    });

    let (callback, _) = recording_callback();

    let config = PeerConfig {
        full_duplex: true,
        ..preview(vec![13])
    };

    let peer = PeerClient::connect(address, &config, callback).await.unwrap();

    assert!(peer.is_full_duplex());
    assert!(server.await.unwrap());

    peer.abort().await;
}

#[tokio::test]
async fn listener_follows_the_initiator_diffusion_mode() {
    let (listener, address) = listen().await;

    let server = tokio::spawn(async move {
        let config = PeerConfig {
            full_duplex: true,
            ..preview(vec![13])
        };

        let peer = PeerServer::accept(&listener, &config).await.unwrap();
        let full_duplex = peer.is_full_duplex();
        peer.abort().await;
        full_duplex
    });

    let (callback, _) = recording_callback();
    let peer = PeerClient::connect(address, &preview(vec![13]), callback)
        .await
        .unwrap();

    assert!(!peer.is_full_duplex());
    assert!(!server.await.unwrap());

    peer.abort().await;
}
