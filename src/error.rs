//! Error types shared by the registration and enrollment flows.
//!
//! Two families matter to callers: transport/server failures (the request never
//! produced an accepted JSON answer) and cryptographic-stage failures (the flow
//! stopped before anything was submitted). Both are terminal for the attempt.

use std::fmt;

use thiserror::Error;

use crate::crypto::SignatureScheme;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, EnrollError>;

/// The cryptographic stage at which an enrollment attempt stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoStage {
    /// Building the empty request and its subject name
    Construction,
    KeyGeneration,
    PublicKeyImport,
    /// SHA-1 over the public key for the Subject Key Identifier
    Digest,
    Signing,
    KeyExport,
}

impl CryptoStage {
    /// Human readable description shown in blocking notifications.
    pub fn description(&self) -> &'static str {
        match self {
            CryptoStage::Construction => "Error building PKCS#10 request",
            CryptoStage::KeyGeneration => "Error during key generation",
            CryptoStage::PublicKeyImport => "Error during public key import",
            CryptoStage::Digest => "Error during public key digest",
            CryptoStage::Signing => "Error signing PKCS#10",
            CryptoStage::KeyExport => "Error during private key export",
        }
    }
}

impl fmt::Display for CryptoStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors returned by the registration submitter and the enrollment flow.
#[derive(Debug, Error)]
pub enum EnrollError {
    /// HTTP request failed before a response was received
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-2xx status
    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    /// Response body was not the expected JSON document
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Endpoint could not be turned into an absolute URL
    #[error("invalid URL '{target}': {reason}")]
    Url { target: String, reason: String },

    /// Server answered with `result != 1`
    #[error("server rejected the request (result {result})")]
    Rejected {
        result: i64,
        response: serde_json::Value,
    },

    /// No key generation capability for the configured scheme
    #[error("No key generation capability found for {0}")]
    CapabilityUnavailable(SignatureScheme),

    /// A cryptographic stage failed; nothing was submitted
    #[error("{stage}: {message}")]
    Crypto { stage: CryptoStage, message: String },

    /// The export password prompt was dismissed
    #[error("export password prompt was cancelled")]
    PasswordCancelled,

    /// The issued certificate could not be packaged with the private key
    #[error("failed to build client bundle: {0}")]
    Bundle(String),

    /// The bundle could not be handed over (written to disk, ...)
    #[error("failed to deliver client bundle: {0}")]
    Delivery(#[from] std::io::Error),
}

impl EnrollError {
    pub(crate) fn crypto(stage: CryptoStage, err: anyhow::Error) -> Self {
        EnrollError::Crypto {
            stage,
            message: format!("{:#}", err),
        }
    }

    /// True for connection failures, non-2xx answers, malformed JSON and
    /// server-side rejections.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            EnrollError::Http(_)
                | EnrollError::Status { .. }
                | EnrollError::Malformed(_)
                | EnrollError::Url { .. }
                | EnrollError::Rejected { .. }
        )
    }

    /// True when the attempt stopped before submission because of the
    /// cryptographic provider.
    pub fn is_crypto(&self) -> bool {
        matches!(
            self,
            EnrollError::Crypto { .. } | EnrollError::CapabilityUnavailable(_)
        )
    }
}
