//! PKCS#12 client bundle assembly.
//!
//! Combines the certificate returned by the enrollment endpoint with the locally
//! generated private key into a password-protected PKCS#12 container. Both the
//! key bag and the certificate bag use `pbeWithSHAAnd3-KeyTripleDES-CBC`, and
//! the integrity MAC uses SHA-1.

use anyhow::{anyhow, Context, Result};
use base64::prelude::*;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use secrecy::{ExposeSecret, SecretString};

use crate::crypto::ExportedKey;
use crate::page::Download;

pub const BUNDLE_FILE_NAME: &str = "client.p12";
pub const BUNDLE_MIME_TYPE: &str = "application/x-pkcs12";

/// DER-encoded PKCS#12 container.
pub struct ClientBundle {
    der: Vec<u8>,
}

/// Decrypted contents of a [`ClientBundle`].
pub struct BundleContents {
    pub private_key: Option<PKey<Private>>,
    pub certificate: Option<X509>,
    pub additional_certificates: usize,
}

impl ClientBundle {
    /// Package `certificate_pem` and `key` under `password`.
    pub fn assemble(
        certificate_pem: &str,
        key: &ExportedKey,
        password: &SecretString,
    ) -> Result<Self> {
        let certificate = X509::from_pem(certificate_pem.as_bytes())
            .context("Failed to parse issued certificate")?;
        let private_key = key.to_private_key()?;

        let mut builder = Pkcs12::builder();
        builder
            .pkey(&private_key)
            .cert(&certificate)
            .key_algorithm(Nid::PBE_WITHSHA1AND3_KEY_TRIPLEDES_CBC)
            .cert_algorithm(Nid::PBE_WITHSHA1AND3_KEY_TRIPLEDES_CBC)
            .mac_md(MessageDigest::sha1());
        let pkcs12 = builder
            .build2(password.expose_secret())
            .map_err(|e| anyhow!("Failed to build PKCS#12 container: {}", e))?;
        let der = pkcs12
            .to_der()
            .map_err(|e| anyhow!("Failed to encode PKCS#12 container: {}", e))?;

        Ok(Self { der })
    }

    pub fn from_der(der: Vec<u8>) -> Self {
        Self { der }
    }

    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.der)
    }

    /// The `client.p12` download handed to the page.
    pub fn to_download(&self) -> Download {
        Download {
            file_name: BUNDLE_FILE_NAME.to_string(),
            mime_type: BUNDLE_MIME_TYPE.to_string(),
            base64: self.to_base64(),
        }
    }

    /// Decrypt the container with `password`.
    pub fn open(&self, password: &str) -> Result<BundleContents> {
        let parsed = Pkcs12::from_der(&self.der)
            .map_err(|e| anyhow!("Failed to decode PKCS#12 container: {}", e))?
            .parse2(password)
            .map_err(|e| anyhow!("Failed to decrypt PKCS#12 container: {}", e))?;
        Ok(BundleContents {
            private_key: parsed.pkey,
            certificate: parsed.cert,
            additional_certificates: parsed.ca.map(|ca| ca.len()).unwrap_or(0),
        })
    }
}
