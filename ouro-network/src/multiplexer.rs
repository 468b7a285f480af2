//! A multiplexer of several mini-protocols through a single bearer

use byteorder::{ByteOrder, NetworkEndian};
use ouro_codec::{minicbor, Fragment};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{tcp, TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

#[cfg(unix)]
use tokio::net::{unix, UnixListener, UnixStream};

pub const HEADER_LEN: usize = 8;

pub type Timestamp = u32;

pub type Payload = Vec<u8>;

pub type Protocol = u16;

/// A payload tagged with the protocol id it travels under
pub type Segment = (Protocol, Payload);

/// Segments buffered per direction before the producer has to wait
const CHANNEL_CAPACITY: usize = 100;

/// Bit set on the protocol id of every segment written by the responder side
pub const PROTOCOL_SERVER_FLAG: Protocol = 0x8000;

/// Protocol value that defines max segment length
pub const MAX_SEGMENT_PAYLOAD_LENGTH: usize = 65535;

#[derive(Debug, PartialEq, Eq)]
pub struct Header {
    pub protocol: Protocol,
    pub timestamp: Timestamp,
    pub payload_len: u16,
}

impl From<&[u8; HEADER_LEN]> for Header {
    fn from(value: &[u8; HEADER_LEN]) -> Self {
        let timestamp = NetworkEndian::read_u32(&value[0..4]);
        let protocol = NetworkEndian::read_u16(&value[4..6]);
        let payload_len = NetworkEndian::read_u16(&value[6..8]);

        Self {
            timestamp,
            protocol,
            payload_len,
        }
    }
}

impl From<Header> for [u8; HEADER_LEN] {
    fn from(value: Header) -> Self {
        let mut out = [0u8; HEADER_LEN];
        NetworkEndian::write_u32(&mut out[0..4], value.timestamp);
        NetworkEndian::write_u16(&mut out[4..6], value.protocol);
        NetworkEndian::write_u16(&mut out[6..8], value.payload_len);

        out
    }
}

pub enum Bearer {
    Tcp(TcpStream),

    #[cfg(unix)]
    Unix(UnixStream),
}

impl Bearer {
    fn configure_tcp(stream: &TcpStream) -> tokio::io::Result<()> {
        let sock_ref = socket2::SockRef::from(stream);
        let keepalive = socket2::TcpKeepalive::new().with_time(Duration::from_secs(20));
        sock_ref.set_tcp_keepalive(&keepalive)?;
        sock_ref.set_nodelay(true)?;

        Ok(())
    }

    pub async fn connect_tcp(addr: impl ToSocketAddrs) -> tokio::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::configure_tcp(&stream)?;
        Ok(Self::Tcp(stream))
    }

    pub async fn accept_tcp(listener: &TcpListener) -> tokio::io::Result<(Self, SocketAddr)> {
        let (stream, addr) = listener.accept().await?;
        Self::configure_tcp(&stream)?;
        Ok((Self::Tcp(stream), addr))
    }

    #[cfg(unix)]
    pub async fn connect_unix(path: impl AsRef<std::path::Path>) -> tokio::io::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self::Unix(stream))
    }

    #[cfg(unix)]
    pub async fn accept_unix(
        listener: &UnixListener,
    ) -> tokio::io::Result<(Self, tokio::net::unix::SocketAddr)> {
        let (stream, addr) = listener.accept().await?;
        Ok((Self::Unix(stream), addr))
    }

    pub fn into_split(self) -> (BearerReadHalf, BearerWriteHalf) {
        match self {
            Bearer::Tcp(x) => {
                let (r, w) = x.into_split();
                (BearerReadHalf::Tcp(r), BearerWriteHalf::Tcp(w))
            }

            #[cfg(unix)]
            Bearer::Unix(x) => {
                let (r, w) = x.into_split();
                (BearerReadHalf::Unix(r), BearerWriteHalf::Unix(w))
            }
        }
    }
}

pub enum BearerReadHalf {
    Tcp(tcp::OwnedReadHalf),

    #[cfg(unix)]
    Unix(unix::OwnedReadHalf),
}

impl BearerReadHalf {
    async fn read_exact(&mut self, buf: &mut [u8]) -> tokio::io::Result<usize> {
        match self {
            Self::Tcp(x) => x.read_exact(buf).await,

            #[cfg(unix)]
            Self::Unix(x) => x.read_exact(buf).await,
        }
    }
}

pub enum BearerWriteHalf {
    Tcp(tcp::OwnedWriteHalf),

    #[cfg(unix)]
    Unix(unix::OwnedWriteHalf),
}

impl BearerWriteHalf {
    async fn write_all(&mut self, buf: &[u8]) -> tokio::io::Result<()> {
        match self {
            Self::Tcp(x) => x.write_all(buf).await,

            #[cfg(unix)]
            Self::Unix(x) => x.write_all(buf).await,
        }
    }

    async fn flush(&mut self) -> tokio::io::Result<()> {
        match self {
            Self::Tcp(x) => x.flush().await,

            #[cfg(unix)]
            Self::Unix(x) => x.flush().await,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("bearer I/O error")]
    BearerIo(#[source] tokio::io::Error),

    #[error("failure to decode channel message: {0}")]
    Decoding(String),

    #[error("failure to encode channel message: {0}")]
    Encoding(String),

    #[error("agent failed to enqueue chunk for protocol {0}")]
    AgentEnqueue(Protocol, Payload),

    #[error("agent failed to dequeue chunk, plexer is gone")]
    AgentDequeue,

    #[error("plexer failed to mux chunk")]
    PlexerMux(#[source] tokio::io::Error),
}

/// Reads segments from the bearer and routes each payload to the channel
/// subscribed to its protocol id
pub struct Demuxer {
    bearer: BearerReadHalf,
    routes: HashMap<Protocol, mpsc::Sender<Payload>>,
}

impl Demuxer {
    pub fn new(bearer: BearerReadHalf) -> Self {
        Self {
            bearer,
            routes: HashMap::new(),
        }
    }

    /// Routes the payload of every segment tagged with `protocol` (direction
    /// bit included) to the returned receiver
    pub fn subscribe(&mut self, protocol: Protocol) -> mpsc::Receiver<Payload> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.routes.insert(protocol, tx);
        rx
    }

    pub async fn read_segment(&mut self) -> Result<Segment, Error> {
        let mut buf = [0u8; HEADER_LEN];
        self.bearer
            .read_exact(&mut buf)
            .await
            .map_err(Error::BearerIo)?;

        let header = Header::from(&buf);

        let mut payload = vec![0u8; header.payload_len as usize];
        self.bearer
            .read_exact(&mut payload)
            .await
            .map_err(Error::BearerIo)?;

        Ok((header.protocol, payload))
    }

    async fn demux(&mut self, protocol: Protocol, payload: Payload) -> Result<(), Error> {
        if tracing::event_enabled!(tracing::Level::TRACE) {
            trace!(protocol, data = hex::encode(&payload), "read from bearer");
        }

        let route = match self.routes.get(&protocol) {
            Some(x) => x,
            None => {
                debug!(protocol, "segment for unsubscribed protocol skipped");
                return Ok(());
            }
        };

        // back-pressure: a full route stalls every protocol on this bearer
        // until its agent reads again
        if route.send(payload).await.is_err() {
            debug!(protocol, "agent channel dropped, closing route");
            self.routes.remove(&protocol);
        }

        Ok(())
    }

    pub async fn tick(&mut self) -> Result<(), Error> {
        let (protocol, payload) = self.read_segment().await?;
        self.demux(protocol, payload).await
    }

    pub async fn run(mut self) -> Result<(), Error> {
        loop {
            if let Err(err) = self.tick().await {
                error!(%err, "demuxer stopped");
                return Err(err);
            }
        }
    }
}

/// Writes the segments enqueued by every agent channel to the bearer,
/// splitting payloads that exceed the segment size.
pub struct Muxer {
    bearer: BearerWriteHalf,
    clock: Instant,
    ingress: mpsc::Receiver<Segment>,
}

impl Muxer {
    pub fn new(bearer: BearerWriteHalf, ingress: mpsc::Receiver<Segment>) -> Self {
        Self {
            bearer,
            clock: Instant::now(),
            ingress,
        }
    }

    async fn write_segment(&mut self, protocol: Protocol, payload: &[u8]) -> tokio::io::Result<()> {
        let header = Header {
            protocol,
            // wraps around after ~71 minutes
            timestamp: self.clock.elapsed().as_micros() as Timestamp,
            payload_len: payload.len() as u16,
        };

        let header: [u8; HEADER_LEN] = header.into();

        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&header);
        buf.extend_from_slice(payload);

        self.bearer.write_all(&buf).await?;
        self.bearer.flush().await
    }

    pub async fn mux(&mut self, segment: Segment) -> Result<(), Error> {
        let (protocol, payload) = segment;

        for chunk in payload.chunks(MAX_SEGMENT_PAYLOAD_LENGTH) {
            self.write_segment(protocol, chunk)
                .await
                .map_err(Error::PlexerMux)?;
        }

        if tracing::event_enabled!(tracing::Level::TRACE) {
            trace!(protocol, data = hex::encode(&payload), "write to bearer");
        }

        Ok(())
    }

    /// Writes the next enqueued segment; false once every channel is gone
    pub async fn tick(&mut self) -> Result<bool, Error> {
        match self.ingress.recv().await {
            Some(segment) => {
                self.mux(segment).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn run(mut self) -> Result<(), Error> {
        loop {
            match self.tick().await {
                Ok(true) => (),
                Ok(false) => {
                    debug!("no agent channel left, muxer done");
                    return Ok(());
                }
                Err(err) => {
                    error!(%err, "muxer stopped");
                    return Err(err);
                }
            }
        }
    }
}

/// Ordered, per-protocol channel between one agent and the plexer
pub struct AgentChannel {
    enqueue_protocol: Protocol,
    to_plexer: mpsc::Sender<Segment>,
    from_plexer: mpsc::Receiver<Payload>,
}

impl AgentChannel {
    fn for_client(
        protocol: Protocol,
        to_plexer: mpsc::Sender<Segment>,
        from_plexer: mpsc::Receiver<Payload>,
    ) -> Self {
        Self {
            enqueue_protocol: protocol,
            to_plexer,
            from_plexer,
        }
    }

    fn for_server(
        protocol: Protocol,
        to_plexer: mpsc::Sender<Segment>,
        from_plexer: mpsc::Receiver<Payload>,
    ) -> Self {
        Self {
            enqueue_protocol: protocol | PROTOCOL_SERVER_FLAG,
            to_plexer,
            from_plexer,
        }
    }

    /// The mini-protocol id this channel is bound to, without the direction bit
    pub fn protocol(&self) -> Protocol {
        self.enqueue_protocol & !PROTOCOL_SERVER_FLAG
    }

    pub async fn enqueue_chunk(&mut self, chunk: Payload) -> Result<(), Error> {
        self.to_plexer
            .send((self.enqueue_protocol, chunk))
            .await
            .map_err(|SendError((protocol, payload))| Error::AgentEnqueue(protocol, payload))
    }

    pub async fn dequeue_chunk(&mut self) -> Result<Payload, Error> {
        self.from_plexer.recv().await.ok_or(Error::AgentDequeue)
    }
}

pub struct Plexer {
    demuxer: Demuxer,
    muxer: Muxer,
    to_muxer: mpsc::Sender<Segment>,
}

impl Plexer {
    pub fn new(bearer: Bearer) -> Self {
        let (r, w) = bearer.into_split();
        let (to_muxer, ingress) = mpsc::channel(CHANNEL_CAPACITY);

        Self {
            demuxer: Demuxer::new(r),
            muxer: Muxer::new(w, ingress),
            to_muxer,
        }
    }

    /// Channel for the initiator side of `protocol`
    pub fn subscribe_client(&mut self, protocol: Protocol) -> AgentChannel {
        let from_plexer = self.demuxer.subscribe(protocol | PROTOCOL_SERVER_FLAG);
        AgentChannel::for_client(protocol, self.to_muxer.clone(), from_plexer)
    }

    /// Channel for the responder side of `protocol`
    pub fn subscribe_server(&mut self, protocol: Protocol) -> AgentChannel {
        let from_plexer = self.demuxer.subscribe(protocol);
        AgentChannel::for_server(protocol, self.to_muxer.clone(), from_plexer)
    }

    /// Starts the demux and mux loops. Channels can't be added afterwards.
    pub fn spawn(self) -> RunningPlexer {
        let Plexer { demuxer, muxer, .. } = self;

        RunningPlexer {
            demuxer: tokio::spawn(demuxer.run()),
            muxer: tokio::spawn(muxer.run()),
        }
    }
}

/// Handle over the demux and mux loops of a spawned plexer
pub struct RunningPlexer {
    demuxer: JoinHandle<Result<(), Error>>,
    muxer: JoinHandle<Result<(), Error>>,
}

impl RunningPlexer {
    pub fn is_finished(&self) -> bool {
        self.demuxer.is_finished() || self.muxer.is_finished()
    }

    pub async fn abort(self) {
        self.demuxer.abort();
        self.muxer.abort();

        for (task, handle) in [("demuxer", self.demuxer), ("muxer", self.muxer)] {
            match handle.await {
                Ok(Err(err)) => warn!(%err, task, "plexer loop had failed before abort"),
                Err(err) if err.is_panic() => error!(task, "plexer loop panicked"),
                _ => (),
            }
        }

        debug!("plexer aborted");
    }
}

fn try_decode_message<M>(buffer: &mut Vec<u8>) -> Result<Option<M>, Error>
where
    M: Fragment,
{
    let mut decoder = minicbor::Decoder::new(buffer);

    match decoder.decode() {
        Ok(msg) => {
            let consumed = decoder.position();
            buffer.drain(..consumed);
            Ok(Some(msg))
        }
        Err(err) if err.is_end_of_input() => Ok(None),
        Err(err) => {
            if tracing::event_enabled!(tracing::Level::TRACE) {
                trace!(data = hex::encode(&buffer), "undecodable payload");
            }

            Err(Error::Decoding(err.to_string()))
        }
    }
}

/// Turns the raw chunks of an [`AgentChannel`] into whole CBOR messages.
///
/// A chunk may carry several messages or a fraction of one; whatever is left
/// after a decoded message stays buffered for the next read.
pub struct ChannelBuffer {
    channel: AgentChannel,
    pending: Vec<u8>,
}

impl ChannelBuffer {
    pub fn new(channel: AgentChannel) -> Self {
        Self {
            channel,
            pending: Vec::new(),
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.channel.protocol()
    }

    /// Encodes `msg` and enqueues it; the muxer splits it into segments
    pub async fn send_msg<M>(&mut self, msg: &M) -> Result<(), Error>
    where
        M: Fragment,
    {
        let payload = msg
            .encode_fragment()
            .map_err(|err| Error::Encoding(err.to_string()))?;

        self.channel.enqueue_chunk(payload).await
    }

    /// Reads from the channel until a complete message is available
    pub async fn recv_full_msg<M>(&mut self) -> Result<M, Error>
    where
        M: Fragment,
    {
        loop {
            if !self.pending.is_empty() {
                if let Some(msg) = try_decode_message::<M>(&mut self.pending)? {
                    return Ok(msg);
                }
            }

            let chunk = self.channel.dequeue_chunk().await?;
            trace!(len = chunk.len(), buffered = self.pending.len(), "chunk received");
            self.pending.extend(chunk);
        }
    }
}

/// Wires an initiator and a responder channel for `protocol` back to back,
/// without any bearer in between.
#[cfg(test)]
pub(crate) fn loopback(protocol: Protocol) -> (AgentChannel, AgentChannel) {
    let (to_plexer, mut ingress) = mpsc::channel::<Segment>(CHANNEL_CAPACITY);
    let (to_initiator, from_responder) = mpsc::channel(CHANNEL_CAPACITY);
    let (to_responder, from_initiator) = mpsc::channel(CHANNEL_CAPACITY);

    let initiator = AgentChannel::for_client(protocol, to_plexer.clone(), from_responder);
    let responder = AgentChannel::for_server(protocol, to_plexer, from_initiator);

    tokio::spawn(async move {
        while let Some((id, payload)) = ingress.recv().await {
            let route = match id & PROTOCOL_SERVER_FLAG {
                0 => &to_responder,
                _ => &to_initiator,
            };

            // a dropped side only loses what was sent to it
            let _ = route.send(payload).await;
        }
    });

    (initiator, responder)
}

#[cfg(test)]
mod tests {
    use super::*;

    type RawChannel = (AgentChannel, mpsc::Sender<Payload>, mpsc::Receiver<Segment>);

    fn client_channel(protocol: Protocol) -> RawChannel {
        let (to_plexer, ingress) = mpsc::channel(CHANNEL_CAPACITY);
        let (to_agent, from_plexer) = mpsc::channel(CHANNEL_CAPACITY);

        let channel = AgentChannel::for_client(protocol, to_plexer, from_plexer);

        (channel, to_agent, ingress)
    }

    #[test]
    fn header_layout_is_network_order() {
        let header = Header {
            protocol: 0x8003,
            timestamp: 0x01020304,
            payload_len: 42,
        };

        let bytes: [u8; HEADER_LEN] = header.into();
        assert_eq!(bytes, [1, 2, 3, 4, 0x80, 0x03, 0, 42]);

        let parsed = Header::from(&bytes);
        assert_eq!(parsed.protocol, 0x8003);
        assert_eq!(parsed.timestamp, 0x01020304);
        assert_eq!(parsed.payload_len, 42);
    }

    #[tokio::test]
    async fn multiple_messages_in_same_payload() {
        let mut input = Vec::new();
        let in_part1 = (1u8, 2u8, 3u8);
        let in_part2 = (6u8, 5u8, 4u8);

        minicbor::encode(in_part1, &mut input).unwrap();
        minicbor::encode(in_part2, &mut input).unwrap();

        let (channel, to_agent, _ingress) = client_channel(0);
        to_agent.send(input).await.unwrap();

        let mut buf = ChannelBuffer::new(channel);

        let out_part1 = buf.recv_full_msg::<(u8, u8, u8)>().await.unwrap();
        let out_part2 = buf.recv_full_msg::<(u8, u8, u8)>().await.unwrap();

        assert_eq!(in_part1, out_part1);
        assert_eq!(in_part2, out_part2);
    }

    #[tokio::test]
    async fn fragmented_message_in_multiple_payloads() {
        let mut input = Vec::new();
        let msg = (11u8, 12u8, 13u8, 14u8, 15u8, 16u8, 17u8);
        minicbor::encode(msg, &mut input).unwrap();

        let (channel, to_agent, _ingress) = client_channel(0);

        for chunk in input.chunks(2) {
            to_agent.send(chunk.to_vec()).await.unwrap();
        }

        let mut buf = ChannelBuffer::new(channel);

        let out_msg = buf
            .recv_full_msg::<(u8, u8, u8, u8, u8, u8, u8)>()
            .await
            .unwrap();

        assert_eq!(msg, out_msg);
    }

    #[tokio::test]
    async fn garbage_is_a_decoding_error() {
        let (channel, to_agent, _ingress) = client_channel(0);

        // a break byte can never start a value
        to_agent.send(vec![0xff]).await.unwrap();

        let mut buf = ChannelBuffer::new(channel);

        assert!(matches!(
            buf.recv_full_msg::<(u8, u8)>().await,
            Err(Error::Decoding(_))
        ));
    }

    #[tokio::test]
    async fn enqueued_chunks_carry_the_direction_bit() {
        let (mut client, _to_agent, mut ingress) = client_channel(3);
        client.enqueue_chunk(vec![1]).await.unwrap();
        assert_eq!(ingress.recv().await.unwrap(), (3, vec![1]));

        let (to_plexer, mut ingress) = mpsc::channel(CHANNEL_CAPACITY);
        let (_to_agent, from_plexer) = mpsc::channel(CHANNEL_CAPACITY);
        let mut server = AgentChannel::for_server(3, to_plexer, from_plexer);

        assert_eq!(server.protocol(), 3);
        server.enqueue_chunk(vec![2]).await.unwrap();
        assert_eq!(ingress.recv().await.unwrap(), (0x8003, vec![2]));
    }

    #[tokio::test]
    async fn loopback_delivers_in_both_directions() {
        let (mut initiator, mut responder) = loopback(7);

        initiator.enqueue_chunk(vec![1, 2, 3]).await.unwrap();
        assert_eq!(responder.dequeue_chunk().await.unwrap(), vec![1, 2, 3]);

        responder.enqueue_chunk(vec![4, 5]).await.unwrap();
        assert_eq!(initiator.dequeue_chunk().await.unwrap(), vec![4, 5]);
    }

    #[tokio::test]
    async fn dropped_plexer_unblocks_dequeue() {
        let (mut channel, to_agent, _ingress) = client_channel(2);
        drop(to_agent);

        assert!(matches!(
            channel.dequeue_chunk().await,
            Err(Error::AgentDequeue)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn demuxer_routes_by_protocol() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let (read, _write) = Bearer::Unix(ours).into_split();

        let mut demuxer = Demuxer::new(read);
        let mut blockfetch = demuxer.subscribe(3);
        let running = tokio::spawn(demuxer.run());

        for (protocol, payload) in [(5u16, vec![0xaa]), (3, vec![0xbb, 0xcc])] {
            let header: [u8; HEADER_LEN] = Header {
                protocol,
                timestamp: 0,
                payload_len: payload.len() as u16,
            }
            .into();

            theirs.write_all(&header).await.unwrap();
            theirs.write_all(&payload).await.unwrap();
        }

        // protocol 5 has no subscriber and is skipped
        assert_eq!(blockfetch.recv().await.unwrap(), vec![0xbb, 0xcc]);

        drop(theirs);
        assert!(matches!(running.await.unwrap(), Err(Error::BearerIo(_))));
        assert!(blockfetch.recv().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn muxer_splits_oversized_payloads() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let (_read, write) = Bearer::Unix(ours).into_split();

        let (to_muxer, ingress) = mpsc::channel(CHANNEL_CAPACITY);
        let running = tokio::spawn(Muxer::new(write, ingress).run());

        to_muxer
            .send((0x8003, vec![7u8; MAX_SEGMENT_PAYLOAD_LENGTH + 10]))
            .await
            .unwrap();

        drop(to_muxer);

        let mut lengths = vec![];

        for _ in 0..2 {
            let mut header = [0u8; HEADER_LEN];
            theirs.read_exact(&mut header).await.unwrap();
            let header = Header::from(&header);

            assert_eq!(header.protocol, 0x8003);

            let mut payload = vec![0u8; header.payload_len as usize];
            theirs.read_exact(&mut payload).await.unwrap();
            lengths.push(payload.len());
        }

        assert_eq!(lengths, vec![MAX_SEGMENT_PAYLOAD_LENGTH, 10]);

        // every sender is gone, the muxer winds down on its own
        running.await.unwrap().unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn full_route_holds_back_other_protocols() {
        let (ours, mut theirs) = UnixStream::pair().unwrap();
        let (read, _write) = Bearer::Unix(ours).into_split();

        let mut demuxer = Demuxer::new(read);
        let mut handshake = demuxer.subscribe(0);
        let mut blockfetch = demuxer.subscribe(3);
        let _running = tokio::spawn(demuxer.run());

        let segments = std::iter::repeat(3u16)
            .take(CHANNEL_CAPACITY + 1)
            .chain(std::iter::once(0));

        for protocol in segments {
            let header: [u8; HEADER_LEN] = Header {
                protocol,
                timestamp: 0,
                payload_len: 1,
            }
            .into();

            theirs.write_all(&header).await.unwrap();
            theirs.write_all(&[protocol as u8]).await.unwrap();
        }

        // block-fetch is full and nobody reads it
        let stalled = tokio::time::timeout(Duration::from_millis(100), handshake.recv()).await;
        assert!(stalled.is_err());

        assert_eq!(blockfetch.recv().await.unwrap(), vec![3]);
        assert_eq!(handshake.recv().await.unwrap(), vec![0]);
    }
}
