pub mod apikey;
pub mod canonical;
pub mod error;
pub mod keypair;

pub use canonical::canonical_bytes;
pub use error::CryptoError;
pub use keypair::{verify, KeyPair};
