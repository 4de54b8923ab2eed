//! Certificate Enrollment Flow
//!
//! Generates a key pair, builds and signs a PKCS#10 request, submits it to the
//! enrollment endpoint and packages the issued certificate with the private key
//! into a `client.p12` download.
//!
//! # Stages
//! ```text
//! disable trigger
//!   └── capability check            (abort: notification, no request)
//!       └── request skeleton         CN / O / OU
//!           └── key generation
//!               └── public key import
//!                   └── SHA-1 → subjectKeyIdentifier extension request
//!                       └── sign
//!                           └── export private key (PKCS#8)
//!                               └── POST csr, token, comment, validity
//!                                   └── prompt password → PKCS#12 → download
//! ```
//!
//! Every stage awaits the previous one. A failure in a cryptographic stage shows
//! a blocking notification and ends the attempt before anything is submitted; a
//! failed or refused submission marks the status region as an error with a hint
//! that the token may have expired.
//!
//! # Trigger
//! The trigger is disabled at the start of [`EnrollmentFlow::run`] and stays
//! disabled afterwards, whatever the outcome: further calls return
//! [`EnrollmentOutcome::Ignored`] until [`EnrollmentFlow::rearm`] is called.

use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::Url;
use tracing::{debug, error, info};

use crate::bundle::ClientBundle;
use crate::crypto::{CryptoProvider, ExportedKey, KeyAlgorithm};
use crate::csr::{CertificationRequest, SubjectAttributes};
use crate::error::{CryptoStage, EnrollError, Result};
use crate::page::{Download, MessageState, Page};
use crate::protocol::{decode_response, EnrollRequest, EnrollResponse};
use crate::transport::Transport;

pub const EXPORT_PASSWORD_PROMPT: &str = "Enter export password";
pub const CERTIFICATE_GENERATED: &str = "Certificate generated";
pub const EXPIRED_TOKEN_HINT: &str =
    "An error occurred, the token may have expired: reload this page and try again";

/// User-supplied fields submitted with the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrollmentForm {
    pub token: String,
    pub comment: String,
    pub validity: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentOutcome {
    /// Certificate issued and handed to the page as a download.
    Issued { download: Download },
    /// The trigger was already used; nothing happened.
    Ignored,
}

/// Request material produced by the cryptographic stages.
struct PreparedRequest {
    csr_pem: String,
    private_key: ExportedKey,
}

pub struct EnrollmentFlow<C, T> {
    crypto: C,
    transport: T,
    endpoint: Url,
    subject: SubjectAttributes,
    algorithm: KeyAlgorithm,
    triggered: AtomicBool,
}

impl<C: CryptoProvider, T: Transport> EnrollmentFlow<C, T> {
    /// A flow posting to `endpoint` with the default subject and algorithm.
    pub fn new(crypto: C, transport: T, endpoint: Url) -> Self {
        Self {
            crypto,
            transport,
            endpoint,
            subject: SubjectAttributes::default(),
            algorithm: KeyAlgorithm::default(),
            triggered: AtomicBool::new(false),
        }
    }

    pub fn subject(mut self, subject: SubjectAttributes) -> Self {
        self.subject = subject;
        self
    }

    pub fn algorithm(mut self, algorithm: KeyAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Whether the trigger has been used since creation or the last [`rearm`](Self::rearm).
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Allow another attempt. The caller is responsible for re-enabling the
    /// trigger control on its page.
    pub fn rearm(&self) {
        self.triggered.store(false, Ordering::SeqCst);
    }

    /// Run one enrollment attempt against `page`.
    pub async fn run<P: Page>(
        &self,
        page: &mut P,
        form: &EnrollmentForm,
    ) -> Result<EnrollmentOutcome> {
        if self.triggered.swap(true, Ordering::SeqCst) {
            debug!("enrollment already triggered, ignoring");
            return Ok(EnrollmentOutcome::Ignored);
        }
        page.set_trigger_enabled(false);

        debug!("generate keys");
        if !self.crypto.is_available(&self.algorithm) {
            let err = EnrollError::CapabilityUnavailable(self.algorithm.scheme);
            page.notify(&err.to_string());
            return Err(err);
        }

        let prepared = match self.prepare_request() {
            Ok(prepared) => prepared,
            Err(e) => {
                error!(error = %e, "enrollment stopped before submission");
                page.notify(&e.to_string());
                return Err(e);
            }
        };

        let certificate_pem = match self.submit(&prepared.csr_pem, form).await {
            Ok(pem) => pem,
            Err(e) => {
                page.set_status(EXPIRED_TOKEN_HINT, MessageState::Error);
                return Err(e);
            }
        };

        match self.package(page, &certificate_pem, &prepared.private_key) {
            Ok(download) => {
                info!(file = %download.file_name, "client bundle delivered");
                Ok(EnrollmentOutcome::Issued { download })
            }
            Err(e) => {
                error!(error = %e, "failed to package issued certificate");
                page.notify(&e.to_string());
                Err(e)
            }
        }
    }

    /// Stages 3 to 8: skeleton, key pair, public key, SKI, signature, export.
    fn prepare_request(&self) -> Result<PreparedRequest> {
        let mut request = CertificationRequest::new(&self.subject)
            .map_err(|e| EnrollError::crypto(CryptoStage::Construction, e))?;

        let key = self
            .crypto
            .generate_key_pair(&self.algorithm)
            .map_err(|e| EnrollError::crypto(CryptoStage::KeyGeneration, e))?;
        debug!(scheme = %self.algorithm.scheme, bits = key.bits(), "key pair generated");

        let public_key_bits = request
            .import_public_key(&key)
            .map_err(|e| EnrollError::crypto(CryptoStage::PublicKeyImport, e))?;

        let key_identifier = self
            .crypto
            .digest(&public_key_bits)
            .map_err(|e| EnrollError::crypto(CryptoStage::Digest, e))?;
        request
            .attach_subject_key_identifier(&key_identifier)
            .map_err(|e| EnrollError::crypto(CryptoStage::Digest, e))?;

        self.crypto
            .sign_request(request.builder_mut(), &key, self.algorithm.hash)
            .map_err(|e| EnrollError::crypto(CryptoStage::Signing, e))?;
        let signed = request.finish();
        let csr_pem = signed
            .to_pem()
            .map_err(|e| EnrollError::crypto(CryptoStage::Signing, e))?;
        debug!(hash = %self.algorithm.hash, "request signed");

        let private_key = self
            .crypto
            .export_private_key(&key)
            .map_err(|e| EnrollError::crypto(CryptoStage::KeyExport, e))?;

        Ok(PreparedRequest {
            csr_pem,
            private_key,
        })
    }

    /// Stage 9: one POST. Returns the issued certificate PEM.
    async fn submit(&self, csr_pem: &str, form: &EnrollmentForm) -> Result<String> {
        let request = EnrollRequest {
            csr: csr_pem.to_string(),
            token: form.token.clone(),
            comment: form.comment.clone(),
            validity: form.validity.clone(),
        };

        let body = match self
            .transport
            .post_form(&self.endpoint, &request.to_form_fields())
            .await
        {
            Ok(body) => body,
            Err(e) => {
                error!(error = %e, "Error: enrollment request failed");
                return Err(e);
            }
        };

        let response: EnrollResponse = decode_response(&body).map_err(|e| {
            error!(response = %body, "Bad response");
            e
        })?;
        if !response.result.is_success() {
            error!(response = %body, "Bad response");
            return Err(EnrollError::Rejected {
                result: response.result.0,
                response: body,
            });
        }

        response.cert.ok_or_else(|| {
            error!(response = %body, "Bad response");
            EnrollError::Malformed("accepted response carries no certificate".to_string())
        })
    }

    /// Stage 10: password prompt, PKCS#12 assembly, download.
    fn package<P: Page>(
        &self,
        page: &mut P,
        certificate_pem: &str,
        private_key: &ExportedKey,
    ) -> Result<Download> {
        let password = page
            .prompt_password(EXPORT_PASSWORD_PROMPT)
            .ok_or(EnrollError::PasswordCancelled)?;

        let bundle = ClientBundle::assemble(certificate_pem, private_key, &password)
            .map_err(|e| EnrollError::Bundle(format!("{:#}", e)))?;
        let download = bundle.to_download();

        page.deliver_download(&download)?;
        page.set_status(CERTIFICATE_GENERATED, MessageState::Success);
        Ok(download)
    }
}
