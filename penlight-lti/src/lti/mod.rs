//! LTI 1.1 protocol pieces: OAuth 1.0a signing and the POX outcomes codec

pub mod oauth;
pub mod pox;
