use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use ouro_codec::minicbor::{decode, encode, Decode, Decoder, Encode, Encoder};

use super::protocol::*;

const REFUSE_VERSION_MISMATCH: u16 = 0;
const REFUSE_DECODE_ERROR: u16 = 1;
const REFUSE_REFUSED: u16 = 2;

impl Encode<()> for VersionTable {
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        _ctx: &mut (),
    ) -> Result<(), encode::Error<W::Error>> {
        e.map(self.values.len() as u64)?;

        for (version, data) in self.values.iter().sorted_by_key(|(v, _)| **v) {
            e.u64(*version)?;
            e.encode(data)?;
        }

        Ok(())
    }
}

impl<'b> Decode<'b, ()> for VersionTable {
    fn decode(d: &mut Decoder<'b>, _ctx: &mut ()) -> Result<Self, decode::Error> {
        let len = d
            .map()?
            .ok_or(decode::Error::message("expected def-length map for version table"))?;

        let mut values = HashMap::new();
        let mut seen = HashSet::new();

        for _ in 0..len {
            let version = d.u64()?;

            if !seen.insert(version) {
                return Err(decode::Error::message("version table repeats a version"));
            }

            // parameters are version specific, an entry we can't read is one
            // we can't accept either
            let start = d.position();

            match d.decode() {
                Ok(data) => {
                    values.insert(version, data);
                }
                Err(_) => {
                    d.set_position(start);
                    d.skip()?;
                }
            }
        }

        Ok(VersionTable { values })
    }
}

impl Encode<()> for RefuseReason {
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        _ctx: &mut (),
    ) -> Result<(), encode::Error<W::Error>> {
        match self {
            RefuseReason::VersionMismatch(versions) => {
                e.array(2)?.u16(REFUSE_VERSION_MISMATCH)?;
                e.array(versions.len() as u64)?;

                for v in versions {
                    e.u64(*v)?;
                }
            }
            RefuseReason::HandshakeDecodeError(version, msg) => {
                e.array(3)?
                    .u16(REFUSE_DECODE_ERROR)?
                    .u64(*version)?
                    .str(msg)?;
            }
            RefuseReason::Refused(version, msg) => {
                e.array(3)?.u16(REFUSE_REFUSED)?.u64(*version)?.str(msg)?;
            }
        }

        Ok(())
    }
}

impl<'b> Decode<'b, ()> for RefuseReason {
    fn decode(d: &mut Decoder<'b>, _ctx: &mut ()) -> Result<Self, decode::Error> {
        d.array()?;

        match d.u16()? {
            REFUSE_VERSION_MISMATCH => {
                let versions = d.array_iter::<u64>()?.collect::<Result<_, _>>()?;
                Ok(RefuseReason::VersionMismatch(versions))
            }
            REFUSE_DECODE_ERROR => {
                let version = d.u64()?;
                let msg = d.str()?;
                Ok(RefuseReason::HandshakeDecodeError(version, msg.to_string()))
            }
            REFUSE_REFUSED => {
                let version = d.u64()?;
                let msg = d.str()?;
                Ok(RefuseReason::Refused(version, msg.to_string()))
            }
            _ => Err(decode::Error::message("unknown variant for refuse reason")),
        }
    }
}

impl Encode<()> for Message {
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        _ctx: &mut (),
    ) -> Result<(), encode::Error<W::Error>> {
        match self {
            Message::Propose(table) => {
                e.array(2)?.u16(MSG_PROPOSE_VERSIONS)?;
                e.encode(table)?;
            }
            Message::Accept(version, data) => {
                e.array(3)?.u16(MSG_ACCEPT_VERSION)?.u64(*version)?;
                e.encode(data)?;
            }
            Message::Refuse(reason) => {
                e.array(2)?.u16(MSG_REFUSE)?;
                e.encode(reason)?;
            }
            Message::QueryReply(table) => {
                e.array(2)?.u16(MSG_QUERY_REPLY)?;
                e.encode(table)?;
            }
        };

        Ok(())
    }
}

impl<'b> Decode<'b, ()> for Message {
    fn decode(d: &mut Decoder<'b>, _ctx: &mut ()) -> Result<Self, decode::Error> {
        d.array()?;

        match d.u16()? {
            MSG_PROPOSE_VERSIONS => Ok(Message::Propose(d.decode()?)),
            MSG_ACCEPT_VERSION => {
                let version = d.u64()?;
                let data = d.decode()?;
                Ok(Message::Accept(version, data))
            }
            MSG_REFUSE => Ok(Message::Refuse(d.decode()?)),
            MSG_QUERY_REPLY => Ok(Message::QueryReply(d.decode()?)),
            _ => Err(decode::Error::message(
                "unknown variant for handshake message",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use ouro_codec::Fragment;

    use super::*;
    use crate::miniprotocols::handshake::n2n::VersionData;

    #[test]
    fn proposal_is_encoded_in_version_order() {
        let table = VersionTable::from_versions(2, &[10, 7], true);
        let bytes = Message::Propose(table).encode_fragment().unwrap();

        // [0, {7: [2, true], 10: [2, true]}]
        assert_eq!(hex::encode(bytes), "8200a2078202f50a8202f5");
    }

    #[test]
    fn accept_carries_version_and_parameters() {
        let msg = Message::Accept(13, VersionData::new(764824073, false, Some(0), Some(false)));
        let bytes = msg.encode_fragment().unwrap();

        match Message::decode_fragment(&bytes).unwrap() {
            Message::Accept(version, data) => {
                assert_eq!(version, 13);
                assert_eq!(data.network_magic(), 764824073);
                assert!(data.is_full_duplex());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn refuse_reasons_survive_the_wire() {
        let reasons = [
            RefuseReason::VersionMismatch(vec![11, 12]),
            RefuseReason::HandshakeDecodeError(11, "bad params".into()),
            RefuseReason::Refused(12, "go away".into()),
        ];

        for reason in reasons {
            let bytes = Message::Refuse(reason.clone()).encode_fragment().unwrap();

            match Message::decode_fragment(&bytes).unwrap() {
                Message::Refuse(decoded) => assert_eq!(decoded, reason),
                other => panic!("unexpected message {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!(Message::decode_fragment(&hex::decode("8109").unwrap()).is_err());
    }

    #[test]
    fn unreadable_parameters_drop_only_their_version() {
        // [0, {7: 0, 10: [2, true]}]
        let bytes = hex::decode("8200a207000a8202f5").unwrap();

        match Message::decode_fragment(&bytes).unwrap() {
            Message::Propose(table) => assert_eq!(table.versions(), vec![10]),
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn repeated_version_is_rejected() {
        // [0, {7: [2, true], 7: [2, true]}]
        let bytes = hex::decode("8200a2078202f5078202f5").unwrap();
        assert!(Message::decode_fragment(&bytes).is_err());
    }
}
