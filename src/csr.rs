//! PKCS#10 Certification Request Module
//!
//! Builds the certification request submitted during enrollment. The request is
//! assembled in the same order the enrollment flow runs its stages:
//!
//! ```text
//! CertificationRequest::new(subject)        version 0, CN / O / OU
//!   └── import_public_key(key)               SubjectPublicKeyInfo
//!       └── attach_subject_key_identifier()  extensionRequest { subjectKeyIdentifier }
//!           └── sign (CryptoProvider)        signature with the configured hash
//!               └── finish() -> SignedCsr    PEM for submission
//! ```
//!
//! # Extension Request
//! The Subject Key Identifier is computed by the caller (SHA-1 over the
//! subjectPublicKey BIT STRING contents) and carried in a PKCS#9
//! `extensionRequest` attribute (OID 1.2.840.113549.1.9.14) holding exactly one
//! non-critical extension (OID 2.5.29.14).

use anyhow::{anyhow, bail, Result};
use openssl::asn1::{Asn1Object, Asn1OctetString};
use openssl::bn::BigNumContext;
use openssl::ec::PointConversionForm;
use openssl::nid::Nid;
use openssl::pkey::{Id, PKeyRef, Private};
use openssl::stack::Stack;
use openssl::x509::{X509Extension, X509Name, X509Req, X509ReqBuilder};
use serde::{Deserialize, Serialize};

pub const EXTENSION_REQUEST_OID: &str = "1.2.840.113549.1.9.14";
pub const SUBJECT_KEY_IDENTIFIER_OID: &str = "2.5.29.14";

const CSR_VERSION_1: i32 = 0; // PKCS#10 v1 is represented by 0
const DER_OCTET_STRING_TAG: u8 = 0x04;

pub(crate) const DEFAULT_COMMON_NAME: &str = "yadd@debian.org";
pub(crate) const DEFAULT_ORGANIZATION: &str = "Debian";
pub(crate) const DEFAULT_ORGANIZATIONAL_UNIT: &str = "Debian Developers";

/// Subject attributes placed in every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubjectAttributes {
    pub common_name: String,
    pub organization: String,
    pub organizational_unit: String,
}

impl Default for SubjectAttributes {
    fn default() -> Self {
        Self {
            common_name: DEFAULT_COMMON_NAME.to_string(),
            organization: DEFAULT_ORGANIZATION.to_string(),
            organizational_unit: DEFAULT_ORGANIZATIONAL_UNIT.to_string(),
        }
    }
}

impl SubjectAttributes {
    /// Set the common name (CN) for the request
    pub fn common_name(mut self, cn: String) -> Self {
        self.common_name = cn;
        self
    }

    /// Set the organization (O) for the request
    pub fn organization(mut self, org: String) -> Self {
        self.organization = org;
        self
    }

    /// Set the organizational unit (OU) for the request
    pub fn organizational_unit(mut self, ou: String) -> Self {
        self.organizational_unit = ou;
        self
    }

    fn to_name(&self) -> Result<X509Name> {
        let mut name_builder =
            X509Name::builder().map_err(|e| anyhow!("Failed to create name builder: {}", e))?;
        name_builder
            .append_entry_by_nid(Nid::COMMONNAME, &self.common_name)
            .map_err(|e| anyhow!("Failed to set CN: {}", e))?;
        name_builder
            .append_entry_by_nid(Nid::ORGANIZATIONNAME, &self.organization)
            .map_err(|e| anyhow!("Failed to set organization: {}", e))?;
        name_builder
            .append_entry_by_nid(Nid::ORGANIZATIONALUNITNAME, &self.organizational_unit)
            .map_err(|e| anyhow!("Failed to set organizational unit: {}", e))?;
        Ok(name_builder.build())
    }
}

/// A certification request under construction.
pub struct CertificationRequest {
    builder: X509ReqBuilder,
}

impl CertificationRequest {
    /// Start an empty version 0 request carrying the subject attributes.
    pub fn new(subject: &SubjectAttributes) -> Result<Self> {
        let mut builder =
            X509Req::builder().map_err(|e| anyhow!("Failed to create request builder: {}", e))?;
        builder
            .set_version(CSR_VERSION_1)
            .map_err(|e| anyhow!("Failed to set version: {}", e))?;
        let name = subject.to_name()?;
        builder
            .set_subject_name(&name)
            .map_err(|e| anyhow!("Failed to set subject: {}", e))?;
        Ok(Self { builder })
    }

    /// Import the public half of `key` and return the subjectPublicKey bytes
    /// the Subject Key Identifier is computed over.
    pub fn import_public_key(&mut self, key: &PKeyRef<Private>) -> Result<Vec<u8>> {
        self.builder
            .set_pubkey(key)
            .map_err(|e| anyhow!("Failed to set public key: {}", e))?;
        subject_public_key_bits(key)
    }

    /// Attach `key_identifier` as a Subject Key Identifier extension request.
    pub fn attach_subject_key_identifier(&mut self, key_identifier: &[u8]) -> Result<()> {
        if key_identifier.is_empty() || key_identifier.len() > 127 {
            bail!(
                "Subject key identifier must be 1..=127 bytes, got {}",
                key_identifier.len()
            );
        }
        // extnValue is the DER encoding of an OCTET STRING holding the digest
        let mut der = Vec::with_capacity(key_identifier.len() + 2);
        der.push(DER_OCTET_STRING_TAG);
        der.push(key_identifier.len() as u8);
        der.extend_from_slice(key_identifier);

        let oid = Asn1Object::from_str(SUBJECT_KEY_IDENTIFIER_OID)
            .map_err(|e| anyhow!("Failed to create extension OID: {}", e))?;
        let contents = Asn1OctetString::new_from_bytes(&der)
            .map_err(|e| anyhow!("Failed to encode extension value: {}", e))?;
        let extension = X509Extension::new_from_der(&oid, false, &contents)
            .map_err(|e| anyhow!("Failed to build SubjectKeyIdentifier: {}", e))?;

        let mut extensions = Stack::new()?;
        extensions.push(extension)?;
        self.builder
            .add_extensions(&extensions)
            .map_err(|e| anyhow!("Failed to add extensionRequest attribute: {}", e))?;
        Ok(())
    }

    /// Mutable access for the signing provider.
    pub fn builder_mut(&mut self) -> &mut X509ReqBuilder {
        &mut self.builder
    }

    pub fn finish(self) -> SignedCsr {
        SignedCsr {
            request: self.builder.build(),
        }
    }
}

/// A signed request ready for submission.
pub struct SignedCsr {
    request: X509Req,
}

impl SignedCsr {
    pub fn request(&self) -> &X509Req {
        &self.request
    }

    pub fn to_pem(&self) -> Result<String> {
        let pem = self
            .request
            .to_pem()
            .map_err(|e| anyhow!("Failed to encode request as PEM: {}", e))?;
        String::from_utf8(pem).map_err(|e| anyhow!("Request PEM is not UTF-8: {}", e))
    }
}

/// Contents of the subjectPublicKey BIT STRING for `key`.
///
/// RSA keys yield the DER `RSAPublicKey`, EC keys the uncompressed point.
pub fn subject_public_key_bits(key: &PKeyRef<Private>) -> Result<Vec<u8>> {
    match key.id() {
        Id::RSA => key
            .rsa()
            .and_then(|rsa| rsa.public_key_to_der_pkcs1())
            .map_err(|e| anyhow!("Failed to encode RSA public key: {}", e)),
        Id::EC => {
            let ec = key
                .ec_key()
                .map_err(|e| anyhow!("Failed to get EC key: {}", e))?;
            let mut ctx = BigNumContext::new()?;
            ec.public_key()
                .to_bytes(ec.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)
                .map_err(|e| anyhow!("Failed to encode EC public key: {}", e))
        }
        other => bail!("Unsupported public key type: {:?}", other),
    }
}
