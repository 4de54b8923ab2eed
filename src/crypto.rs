//! Key Generation Provider Module
//!
//! The enrollment flow never touches key material directly: it asks a
//! [`CryptoProvider`] to generate the key pair, digest the public key, sign the
//! request and export the private key. [`OpensslProvider`] is the production
//! provider; tests substitute their own to simulate missing capabilities or
//! failing stages.
//!
//! # Algorithms
//! - **RSASSA-PKCS1-v1_5** (default): RSA 2048-bit, public exponent 65537
//! - **ECDSA**: P-256 by default, P-384 and P-521 available
//! - **RSA-PSS**: accepted in configuration, not offered by [`OpensslProvider`]
//!
//! The hash (default SHA-512) is used for the request signature.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::x509::X509ReqBuilder;
use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Serialize};

const RSA_KEY_SIZE_DEFAULT: u32 = 2048;

/// Signature scheme used for the generated key pair, named as WebCrypto names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SignatureScheme {
    #[default]
    #[serde(rename = "RSASSA-PKCS1-v1_5")]
    RsassaPkcs1V15,
    #[serde(rename = "RSA-PSS")]
    RsaPss,
    #[serde(rename = "ECDSA")]
    Ecdsa,
}

impl SignatureScheme {
    pub fn name(&self) -> &'static str {
        match self {
            SignatureScheme::RsassaPkcs1V15 => "RSASSA-PKCS1-v1_5",
            SignatureScheme::RsaPss => "RSA-PSS",
            SignatureScheme::Ecdsa => "ECDSA",
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SignatureScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "rsassa-pkcs1-v1-5" | "pkcs1" | "rsa" => Ok(SignatureScheme::RsassaPkcs1V15),
            "rsa-pss" | "pss" => Ok(SignatureScheme::RsaPss),
            "ecdsa" | "ec" => Ok(SignatureScheme::Ecdsa),
            _ => Err(anyhow!("Unknown signature scheme: {}", s)),
        }
    }
}

/// Hash algorithm used to sign the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[serde(rename = "SHA-1")]
    Sha1,
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "SHA-384")]
    Sha384,
    #[default]
    #[serde(rename = "SHA-512")]
    Sha512,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "SHA-1",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }

    pub fn message_digest(&self) -> MessageDigest {
        match self {
            HashAlgorithm::Sha1 => MessageDigest::sha1(),
            HashAlgorithm::Sha256 => MessageDigest::sha256(),
            HashAlgorithm::Sha384 => MessageDigest::sha384(),
            HashAlgorithm::Sha512 => MessageDigest::sha512(),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashAlgorithm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], "");
        match normalized.as_str() {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha384" => Ok(HashAlgorithm::Sha384),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(anyhow!("Unknown hash algorithm: {}", s)),
        }
    }
}

/// Named curve for ECDSA keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EcCurve {
    #[default]
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
    #[serde(rename = "P-521")]
    P521,
}

impl EcCurve {
    pub fn nid(&self) -> Nid {
        match self {
            EcCurve::P256 => Nid::X9_62_PRIME256V1,
            EcCurve::P384 => Nid::SECP384R1,
            EcCurve::P521 => Nid::SECP521R1,
        }
    }
}

/// Parameters for the key pair generated on each enrollment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyAlgorithm {
    pub scheme: SignatureScheme,
    pub hash: HashAlgorithm,
    pub rsa_bits: u32,
    pub ec_curve: EcCurve,
}

impl Default for KeyAlgorithm {
    fn default() -> Self {
        Self {
            scheme: SignatureScheme::default(),
            hash: HashAlgorithm::default(),
            rsa_bits: RSA_KEY_SIZE_DEFAULT,
            ec_curve: EcCurve::default(),
        }
    }
}

/// PKCS#8 PEM export of the freshly generated private key.
///
/// The bytes are zeroized on drop and only reachable through
/// [`ExportedKey::expose_pem`].
pub struct ExportedKey {
    pem: SecretBox<Vec<u8>>,
}

impl ExportedKey {
    pub fn from_pem(pem: Vec<u8>) -> Self {
        Self {
            pem: SecretBox::new(Box::new(pem)),
        }
    }

    pub fn expose_pem(&self) -> &[u8] {
        self.pem.expose_secret()
    }

    /// Parse the exported key back into an OpenSSL key.
    pub fn to_private_key(&self) -> Result<PKey<Private>> {
        PKey::private_key_from_pem(self.expose_pem())
            .map_err(|e| anyhow!("Failed to parse exported private key: {}", e))
    }
}

impl fmt::Debug for ExportedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedKey")
            .field("pem", &"<redacted>")
            .finish()
    }
}

/// Cryptographic capability used by the enrollment flow.
///
/// Only key generation has no default: digesting, signing and exporting are
/// provided on top of OpenSSL and can be overridden.
pub trait CryptoProvider {
    /// Whether a key pair can be generated for `algorithm` at all.
    fn is_available(&self, algorithm: &KeyAlgorithm) -> bool;

    fn generate_key_pair(&self, algorithm: &KeyAlgorithm) -> Result<PKey<Private>>;

    /// SHA-1 digest, used for the Subject Key Identifier.
    fn digest(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(openssl::sha::sha1(data).to_vec())
    }

    fn sign_request(
        &self,
        request: &mut X509ReqBuilder,
        key: &PKeyRef<Private>,
        hash: HashAlgorithm,
    ) -> Result<()> {
        request
            .sign(key, hash.message_digest())
            .map_err(|e| anyhow!("Failed to sign request with {}: {}", hash, e))
    }

    fn export_private_key(&self, key: &PKeyRef<Private>) -> Result<ExportedKey> {
        let pem = key
            .private_key_to_pem_pkcs8()
            .map_err(|e| anyhow!("Failed to convert private key to PKCS#8: {}", e))?;
        Ok(ExportedKey::from_pem(pem))
    }
}

/// OpenSSL-backed provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpensslProvider;

impl CryptoProvider for OpensslProvider {
    fn is_available(&self, algorithm: &KeyAlgorithm) -> bool {
        // X509_REQ_sign has no way to request PSS padding
        !matches!(algorithm.scheme, SignatureScheme::RsaPss)
    }

    fn generate_key_pair(&self, algorithm: &KeyAlgorithm) -> Result<PKey<Private>> {
        match algorithm.scheme {
            SignatureScheme::RsassaPkcs1V15 => {
                let rsa = Rsa::generate(algorithm.rsa_bits)
                    .map_err(|e| anyhow!("Failed to generate RSA keypair: {}", e))?;
                PKey::from_rsa(rsa).map_err(|e| anyhow!("Failed to create private key: {}", e))
            }
            SignatureScheme::Ecdsa => {
                let group = EcGroup::from_curve_name(algorithm.ec_curve.nid())
                    .context("Failed to load EC group")?;
                let ec = EcKey::generate(&group)
                    .map_err(|e| anyhow!("Failed to generate EC keypair: {}", e))?;
                PKey::from_ec_key(ec).map_err(|e| anyhow!("Failed to create private key: {}", e))
            }
            SignatureScheme::RsaPss => bail!("RSA-PSS key generation is not supported"),
        }
    }
}
