//! Node-to-node flavour of the version table

use ouro_codec::minicbor::{decode, encode, Decode, Decoder, Encode, Encoder};

use super::{NetworkMagic, VersionNumber, VersionTable};

pub const PROTOCOL_V7: VersionNumber = 7;
pub const PROTOCOL_V8: VersionNumber = 8;
pub const PROTOCOL_V9: VersionNumber = 9;
pub const PROTOCOL_V10: VersionNumber = 10;
pub const PROTOCOL_V11: VersionNumber = 11;
pub const PROTOCOL_V12: VersionNumber = 12;
pub const PROTOCOL_V13: VersionNumber = 13;

/// The node only initiates mini-protocols, it never answers them
pub const DIFFUSION_MODE_INITIATOR_ONLY: bool = true;

/// The node both initiates and responds, the connection may run in full duplex
pub const DIFFUSION_MODE_INITIATOR_AND_RESPONDER: bool = false;

pub const PEER_SHARING_DISABLED: u8 = 0;

/// First version whose parameters carry the peer-sharing and query fields
const FIRST_EXTENDED_VERSION: VersionNumber = PROTOCOL_V11;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionData {
    network_magic: NetworkMagic,
    initiator_only_diffusion_mode: bool,
    peer_sharing: Option<u8>,
    query: Option<bool>,
}

impl VersionData {
    pub fn new(
        network_magic: NetworkMagic,
        initiator_only_diffusion_mode: bool,
        peer_sharing: Option<u8>,
        query: Option<bool>,
    ) -> Self {
        VersionData {
            network_magic,
            initiator_only_diffusion_mode,
            peer_sharing,
            query,
        }
    }

    /// Parameters this crate proposes for `version`
    pub fn for_version(
        version: VersionNumber,
        network_magic: NetworkMagic,
        diffusion_mode: bool,
    ) -> Self {
        match version >= FIRST_EXTENDED_VERSION {
            true => Self::new(
                network_magic,
                diffusion_mode,
                Some(PEER_SHARING_DISABLED),
                Some(false),
            ),
            false => Self::new(network_magic, diffusion_mode, None, None),
        }
    }

    pub fn network_magic(&self) -> NetworkMagic {
        self.network_magic
    }

    pub fn initiator_only_diffusion_mode(&self) -> bool {
        self.initiator_only_diffusion_mode
    }

    pub fn peer_sharing(&self) -> Option<u8> {
        self.peer_sharing
    }

    pub fn query(&self) -> Option<bool> {
        self.query
    }

    /// A connection runs in full duplex only when the proposing side declared
    /// itself as both initiator and responder.
    pub fn is_full_duplex(&self) -> bool {
        self.initiator_only_diffusion_mode == DIFFUSION_MODE_INITIATOR_AND_RESPONDER
    }
}

impl VersionTable {
    /// Builds a table proposing every version of `versions` with the same
    /// magic and diffusion mode
    pub fn from_versions(
        network_magic: NetworkMagic,
        versions: &[VersionNumber],
        diffusion_mode: bool,
    ) -> VersionTable {
        versions
            .iter()
            .map(|v| (*v, VersionData::for_version(*v, network_magic, diffusion_mode)))
            .collect()
    }

    pub fn v7_to_v10(network_magic: NetworkMagic) -> VersionTable {
        Self::from_versions(
            network_magic,
            &[PROTOCOL_V7, PROTOCOL_V8, PROTOCOL_V9, PROTOCOL_V10],
            DIFFUSION_MODE_INITIATOR_ONLY,
        )
    }

    pub fn v7_and_above(network_magic: NetworkMagic) -> VersionTable {
        Self::from_versions(
            network_magic,
            &[
                PROTOCOL_V7,
                PROTOCOL_V8,
                PROTOCOL_V9,
                PROTOCOL_V10,
                PROTOCOL_V11,
                PROTOCOL_V12,
                PROTOCOL_V13,
            ],
            DIFFUSION_MODE_INITIATOR_ONLY,
        )
    }

    pub fn v11_and_above(network_magic: NetworkMagic) -> VersionTable {
        Self::from_versions(
            network_magic,
            &[PROTOCOL_V11, PROTOCOL_V12, PROTOCOL_V13],
            DIFFUSION_MODE_INITIATOR_ONLY,
        )
    }
}

impl Encode<()> for VersionData {
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        _ctx: &mut (),
    ) -> Result<(), encode::Error<W::Error>> {
        match (self.peer_sharing, self.query) {
            (Some(peer_sharing), Some(query)) => {
                e.array(4)?
                    .u64(self.network_magic)?
                    .bool(self.initiator_only_diffusion_mode)?
                    .u8(peer_sharing)?
                    .bool(query)?;
            }
            _ => {
                e.array(2)?
                    .u64(self.network_magic)?
                    .bool(self.initiator_only_diffusion_mode)?;
            }
        };

        Ok(())
    }
}

impl<'b> Decode<'b, ()> for VersionData {
    fn decode(d: &mut Decoder<'b>, _ctx: &mut ()) -> Result<Self, decode::Error> {
        let len = match d.array()? {
            Some(len) if len >= 2 => len,
            _ => return Err(decode::Error::message("unexpected version data length")),
        };

        let network_magic = d.u64()?;
        let initiator_only_diffusion_mode = d.bool()?;

        let (peer_sharing, query) = match len {
            2 | 3 => (None, None),
            _ => (Some(d.u8()?), Some(d.bool()?)),
        };

        // newer peers may append fields this crate doesn't know about
        let read = if len >= 4 { 4 } else { 2 };
        for _ in read..len {
            d.skip()?;
        }

        Ok(Self {
            network_magic,
            initiator_only_diffusion_mode,
            peer_sharing,
            query,
        })
    }
}

#[cfg(test)]
mod tests {
    use ouro_codec::Fragment;

    use super::*;

    #[test]
    fn full_duplex_follows_the_diffusion_flag() {
        let duplex = VersionData::new(1, DIFFUSION_MODE_INITIATOR_AND_RESPONDER, None, None);
        let initiator = VersionData::new(1, DIFFUSION_MODE_INITIATOR_ONLY, None, None);

        assert!(duplex.is_full_duplex());
        assert!(!initiator.is_full_duplex());
    }

    #[test]
    fn extended_fields_start_at_v11() {
        let table = VersionTable::v7_and_above(2);

        assert_eq!(table.values.len(), 7);
        assert_eq!(table.values[&PROTOCOL_V10].peer_sharing(), None);
        assert_eq!(
            table.values[&PROTOCOL_V11].peer_sharing(),
            Some(PEER_SHARING_DISABLED)
        );
        assert_eq!(table.values[&PROTOCOL_V13].query(), Some(false));
    }

    #[test]
    fn version_data_wire_layout() {
        let short = VersionData::new(2, true, None, None);
        assert_eq!(hex::encode(short.encode_fragment().unwrap()), "8202f5");

        let long = VersionData::new(2, false, Some(0), Some(false));
        assert_eq!(hex::encode(long.encode_fragment().unwrap()), "8402f400f4");

        let decoded = VersionData::decode_fragment(&hex::decode("8402f400f4").unwrap()).unwrap();
        assert_eq!(decoded, long);
    }

    #[test]
    fn unknown_trailing_fields_are_skipped() {
        // [2, true, 0]
        let three = VersionData::decode_fragment(&hex::decode("8302f500").unwrap()).unwrap();
        assert_eq!(three, VersionData::new(2, true, None, None));

        // [2, false, 1, true, "x"]
        let five = VersionData::decode_fragment(&hex::decode("8502f401f56178").unwrap()).unwrap();
        assert_eq!(five, VersionData::new(2, false, Some(1), Some(true)));
    }

    #[test]
    fn version_data_needs_magic_and_diffusion_mode() {
        assert!(VersionData::decode_fragment(&hex::decode("8102").unwrap()).is_err());
        assert!(VersionData::decode_fragment(&hex::decode("9f02f5ff").unwrap()).is_err());
    }

    #[test]
    fn odd_sized_version_data_is_rejected() {
        assert!(VersionData::decode_fragment(&hex::decode("8302f400").unwrap()).is_err());
    }
}
