//! Shared CBOR encoding interface used by every ouro crate

use thiserror::Error;

/// Shared re-export of minicbor lib across all ouro crates
pub use minicbor;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failure to encode fragment: {0}")]
    Encoding(String),

    #[error("failure to decode fragment: {0}")]
    Decoding(String),

    #[error("fragment has {0} trailing bytes after a complete value")]
    TrailingBytes(usize),
}

/// A value that can travel over the wire as a self-delimited CBOR item
pub trait Fragment: Sized + for<'b> minicbor::Decode<'b, ()> + minicbor::Encode<()> {
    fn encode_fragment(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        minicbor::encode(self, &mut buf).map_err(|err| Error::Encoding(err.to_string()))?;

        Ok(buf)
    }

    /// Decodes a value that must span the whole input
    fn decode_fragment(bytes: &[u8]) -> Result<Self, Error> {
        let mut decoder = minicbor::Decoder::new(bytes);
        let value = decoder
            .decode()
            .map_err(|err| Error::Decoding(err.to_string()))?;

        match bytes.len() - decoder.position() {
            0 => Ok(value),
            trailing => Err(Error::TrailingBytes(trailing)),
        }
    }
}

impl<T> Fragment for T where T: for<'b> minicbor::Decode<'b, ()> + minicbor::Encode<()> + Sized {}
