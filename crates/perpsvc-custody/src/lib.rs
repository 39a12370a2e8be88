//! Custodial wallet management.
//!
//! Every user gets one Ed25519 keypair, generated server side on first
//! login. Secrets are envelope encrypted: a random data key seals the
//! secret, and the process-held key-encryption key seals the data key.

pub mod envelope;
pub mod error;
pub mod keypair;
pub mod provisioner;

pub use envelope::{Envelope, SealedSecret};
pub use error::{CustodyError, CustodyResult};
pub use keypair::CustodialKeypair;
pub use provisioner::{CustodialAccount, EnsuredWallet, WalletProvisioner, MIN_USER_ID_LEN};
