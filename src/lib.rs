//! CA Enroll - Registration and Client Certificate Enrollment Library
//!
//! Client side of a certificate authority's self-service pages. Two flows are
//! provided:
//!
//! - **Registration**: submit a registration form in one POST and reflect the
//!   JSON answer (navigate on success, show the server error and fresh token
//!   otherwise).
//! - **Enrollment**: generate a key pair, build a PKCS#10 request with a
//!   Subject Key Identifier extension request, submit it with the enrollment
//!   token and package the issued certificate with the private key into a
//!   password-protected PKCS#12 `client.p12`.
//!
//! # Overview
//!
//! ```text
//! EnrollmentFlow::run
//!   ├── CryptoProvider     key pair, SHA-1, signature, PKCS#8 export
//!   ├── CertificationRequest / SignedCsr
//!   ├── Transport          POST /certs/enroll  →  {result, cert}
//!   ├── ClientBundle       PKCS#12 (3DES, SHA-1 MAC)
//!   └── Page               status, notifications, password prompt, download
//! ```
//!
//! The flows only talk to the outside world through the [`Page`](page::Page),
//! [`Transport`](transport::Transport) and
//! [`CryptoProvider`](crypto::CryptoProvider) traits. The library ships an
//! `openssl` provider, a `reqwest` transport, a terminal page and a headless
//! page that records every update.
//!
//! # Example
//!
//! ```no_run
//! use ca_enroll::configs::AppConfig;
//! use ca_enroll::crypto::OpensslProvider;
//! use ca_enroll::enrollment::{EnrollmentFlow, EnrollmentForm};
//! use ca_enroll::page::HeadlessPage;
//! use ca_enroll::transport::HttpTransport;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = AppConfig::default();
//! let transport = HttpTransport::new(config.server.timeout())?;
//! let flow = EnrollmentFlow::new(OpensslProvider, transport, config.server.enroll_url()?)
//!     .subject(config.subject.clone())
//!     .algorithm(config.key);
//!
//! let mut page = HeadlessPage::with_password("export password");
//! let form = EnrollmentForm {
//!     token: "enrollment-token".to_string(),
//!     ..EnrollmentForm::default()
//! };
//! flow.run(&mut page, &form).await?;
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod configs;
pub mod crypto;
pub mod csr;
pub mod enrollment;
pub mod error;
pub mod page;
pub mod protocol;
pub mod registration;
pub mod transport;

#[cfg(test)]
mod testing;

pub use bundle::ClientBundle;
pub use configs::AppConfig;
pub use crypto::{CryptoProvider, KeyAlgorithm, OpensslProvider};
pub use csr::{CertificationRequest, SubjectAttributes};
pub use enrollment::{EnrollmentFlow, EnrollmentForm, EnrollmentOutcome};
pub use error::{EnrollError, Result};
pub use page::{ConsolePage, HeadlessPage, Page};
pub use registration::{RegistrationOutcome, RegistrationSubmitter};
pub use transport::{HttpTransport, Transport};
