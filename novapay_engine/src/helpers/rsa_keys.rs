//! # NovaPay signing primitive
//!
//! NovaPay signs every callback it delivers with its *platform* private key, and expects the merchant to sign
//! every outbound request with the *merchant* private key. Both sides use RSA PKCS#1 v1.5 over an **MD5** digest.
//! MD5 is a fixed requirement of the platform's wire protocol; it is not negotiable from the merchant side and
//! must not be copied into any other part of the system.
//!
//! The two keypairs are independent and never interchangeable. A signature produced with the merchant private key
//! must not validate against the platform public key. To make cross-use unrepresentable, the key roles are
//! distinct types: [`PlatformPublicKey`] is the only type that can verify, and [`MerchantSecretKey`] is the only
//! type that can sign.
//!
//! Key material is accepted as PEM (PKCS#8/SPKI or PKCS#1 headers) or as the bare base64 DER body that the
//! NovaPay merchant dashboard exports.
//!
//! Verification fails closed: any decode error, malformed key or algorithm mismatch yields `false`, never a
//! panic or an error escaping to the caller.

use md5::Md5;
use npg_common::Secret;
use rsa::{
    pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey},
    pkcs1v15::{Signature, SigningKey, VerifyingKey},
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey, LineEnding},
    signature::{SignatureEncoding, Signer, Verifier},
    RsaPrivateKey,
    RsaPublicKey,
};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid key material: {0}")]
pub struct KeyError(String);

impl From<String> for KeyError {
    fn from(e: String) -> Self {
        Self(e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Public,
    Private,
}

//------------------------------------  PlatformPublicKey  ----------------------------------------------------------
/// The platform's public key, configured locally to verify inbound callback signatures.
#[derive(Clone, PartialEq, Eq)]
pub struct PlatformPublicKey {
    key: RsaPublicKey,
}

impl std::fmt::Debug for PlatformPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PlatformPublicKey(rsa)")
    }
}

impl PlatformPublicKey {
    pub fn from_pem(material: &str) -> Result<Self, KeyError> {
        parse_public_key(material).map(|key| Self { key })
    }

    /// Verify a base64 signature over `content`. Fails closed: any decode or format problem is `false`.
    pub fn verify(&self, content: &[u8], signature_b64: &str) -> bool {
        let compact = strip_whitespace(signature_b64);
        let raw = match base64::decode(compact) {
            Ok(raw) => raw,
            Err(_) => return false,
        };
        let signature = match Signature::try_from(raw.as_slice()) {
            Ok(sig) => sig,
            Err(_) => return false,
        };
        let verifier = VerifyingKey::<Md5>::new(self.key.clone());
        verifier.verify(content, &signature).is_ok()
    }
}

//------------------------------------  MerchantSecretKey  ----------------------------------------------------------
/// The merchant's private key. Signs outbound requests to the platform; never used on the inbound path.
#[derive(Clone)]
pub struct MerchantSecretKey {
    key: RsaPrivateKey,
}

impl std::fmt::Debug for MerchantSecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("****")
    }
}

impl MerchantSecretKey {
    pub fn from_pem(material: &str) -> Result<Self, KeyError> {
        parse_private_key(material).map(|key| Self { key })
    }

    /// Sign `content`, returning the base64 signature the platform expects.
    pub fn sign(&self, content: &[u8]) -> Result<String, KeyError> {
        let signer = SigningKey::<Md5>::new(self.key.clone());
        let signature = signer.try_sign(content).map_err(|e| KeyError(e.to_string()))?;
        Ok(base64::encode(signature.to_bytes()))
    }
}

//------------------------------------  Key material handling  ------------------------------------------------------
/// Structural check only: does the material parse as a key of the given kind? Says nothing about whether it is
/// the *right* key.
pub fn validate_key_material(material: &str, kind: KeyKind) -> bool {
    match kind {
        KeyKind::Public => parse_public_key(material).is_ok(),
        KeyKind::Private => parse_private_key(material).is_ok(),
    }
}

/// A freshly generated RSA-2048 keypair, PEM-encoded. Provisioning utility; not used on the callback path.
#[derive(Debug, Clone)]
pub struct KeyPairPem {
    pub private_pem: Secret<String>,
    pub public_pem: String,
}

pub fn generate_keypair() -> Result<KeyPairPem, KeyError> {
    let mut rng = rand::thread_rng();
    let key = RsaPrivateKey::new(&mut rng, 2048).map_err(|e| KeyError(e.to_string()))?;
    let private_pem = key.to_pkcs8_pem(LineEnding::LF).map_err(|e| KeyError(e.to_string()))?.to_string();
    let public_pem = key.to_public_key().to_public_key_pem(LineEnding::LF).map_err(|e| KeyError(e.to_string()))?;
    Ok(KeyPairPem { private_pem: Secret::new(private_pem), public_pem })
}

fn parse_public_key(material: &str) -> Result<RsaPublicKey, KeyError> {
    let material = material.trim();
    if material.is_empty() {
        return Err(KeyError("empty key material".into()));
    }
    if material.contains("-----BEGIN") {
        return RsaPublicKey::from_public_key_pem(material)
            .or_else(|_| RsaPublicKey::from_pkcs1_pem(material))
            .map_err(|e| KeyError(format!("could not parse public key PEM: {e}")));
    }
    let der = base64::decode(strip_whitespace(material))
        .map_err(|e| KeyError(format!("key material is neither PEM nor base64: {e}")))?;
    RsaPublicKey::from_public_key_der(&der)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(&der))
        .map_err(|e| KeyError(format!("could not parse public key DER: {e}")))
}

fn parse_private_key(material: &str) -> Result<RsaPrivateKey, KeyError> {
    let material = material.trim();
    if material.is_empty() {
        return Err(KeyError("empty key material".into()));
    }
    if material.contains("-----BEGIN") {
        return RsaPrivateKey::from_pkcs8_pem(material)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(material))
            .map_err(|e| KeyError(format!("could not parse private key PEM: {e}")));
    }
    let der = base64::decode(strip_whitespace(material))
        .map_err(|e| KeyError(format!("key material is neither PEM nor base64: {e}")))?;
    RsaPrivateKey::from_pkcs8_der(&der)
        .or_else(|_| RsaPrivateKey::from_pkcs1_der(&der))
        .map_err(|e| KeyError(format!("could not parse private key DER: {e}")))
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}
