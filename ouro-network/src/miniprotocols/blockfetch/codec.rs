use ouro_codec::minicbor::data::Tag;
use ouro_codec::minicbor::{decode, encode, Decode, Decoder, Encode, Encoder};

use super::protocol::*;

impl Encode<()> for Message {
    fn encode<W: encode::Write>(
        &self,
        e: &mut Encoder<W>,
        _ctx: &mut (),
    ) -> Result<(), encode::Error<W::Error>> {
        match self {
            Message::RequestRange((start, end)) => {
                e.array(3)?.u16(MSG_REQUEST_RANGE)?;
                e.encode(start)?;
                e.encode(end)?;
            }
            Message::ClientDone => {
                e.array(1)?.u16(MSG_CLIENT_DONE)?;
            }
            Message::StartBatch => {
                e.array(1)?.u16(MSG_START_BATCH)?;
            }
            Message::NoBlocks => {
                e.array(1)?.u16(MSG_NO_BLOCKS)?;
            }
            Message::Block(body) => {
                e.array(2)?.u16(MSG_BLOCK)?;
                e.tag(Tag::Cbor)?;
                e.bytes(body)?;
            }
            Message::BatchDone => {
                e.array(1)?.u16(MSG_BATCH_DONE)?;
            }
        }

        Ok(())
    }
}

impl<'b> Decode<'b, ()> for Message {
    fn decode(d: &mut Decoder<'b>, _ctx: &mut ()) -> Result<Self, decode::Error> {
        d.array()?;

        match d.u16()? {
            MSG_REQUEST_RANGE => {
                let start = d.decode()?;
                let end = d.decode()?;
                Ok(Message::RequestRange((start, end)))
            }
            MSG_CLIENT_DONE => Ok(Message::ClientDone),
            MSG_START_BATCH => Ok(Message::StartBatch),
            MSG_NO_BLOCKS => Ok(Message::NoBlocks),
            MSG_BLOCK => match d.tag()? {
                Tag::Cbor => Ok(Message::Block(d.bytes()?.to_vec())),
                _ => Err(decode::Error::message(
                    "block body is not tagged as embedded cbor",
                )),
            },
            MSG_BATCH_DONE => Ok(Message::BatchDone),
            _ => Err(decode::Error::message(
                "unknown variant for blockfetch message",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use ouro_codec::Fragment;

    use super::*;
    use crate::miniprotocols::Point;

    #[test]
    fn block_body_is_wrapped_as_embedded_cbor() {
        let bytes = Message::Block(vec![0x82, 0x01, 0x02]).encode_fragment().unwrap();

        assert_eq!(hex::encode(&bytes), "8204d81843820102");
        assert_eq!(
            Message::decode_fragment(&bytes).unwrap(),
            Message::Block(vec![0x82, 0x01, 0x02])
        );
    }

    #[test]
    fn range_request_layout() {
        let msg = Message::RequestRange((Point::Origin, Point::new(9, vec![0xab])));
        let bytes = msg.encode_fragment().unwrap();

        assert_eq!(hex::encode(&bytes), "830080820941ab");
        assert_eq!(Message::decode_fragment(&bytes).unwrap(), msg);
    }

    #[test]
    fn untagged_block_is_rejected() {
        // [4, tag(2) h'01']
        let bytes = hex::decode("8204c24101").unwrap();
        assert!(Message::decode_fragment(&bytes).is_err());
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!(Message::decode_fragment(&hex::decode("8106").unwrap()).is_err());
    }
}
