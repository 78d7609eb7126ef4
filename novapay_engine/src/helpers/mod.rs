pub mod rsa_keys;

pub use rsa_keys::{generate_keypair, validate_key_material, KeyError, KeyKind, KeyPairPem, MerchantSecretKey, PlatformPublicKey};
