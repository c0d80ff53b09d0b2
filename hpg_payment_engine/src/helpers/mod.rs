mod token_codec;

pub(crate) use token_codec::join_fields;
pub use token_codec::{TokenClaims, TokenCodec, JTI_BYTES};
