//! Test doubles shared by the unit tests: a throwaway issuing CA, a recording
//! crypto provider and a scripted transport. All of them append to one
//! [`EventLog`] so tests can assert the order stages ran in.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{bail, Result};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::BasicConstraints;
use openssl::x509::{X509Name, X509Req, X509ReqRef, X509};
use reqwest::Url;
use serde_json::{json, Value};

use crate::crypto::{CryptoProvider, ExportedKey, HashAlgorithm, KeyAlgorithm, OpensslProvider};
use crate::error::{CryptoStage, EnrollError};
use crate::protocol::FormFields;
use crate::transport::Transport;

const X509_VERSION_3: i32 = 2;

pub(crate) fn generate_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

/// One RSA key shared by every test in the process.
pub(crate) fn fixed_key() -> PKey<Private> {
    static KEY: OnceLock<PKey<Private>> = OnceLock::new();
    KEY.get_or_init(generate_key).clone()
}

fn name(cn: &str) -> X509Name {
    let mut builder = X509Name::builder().unwrap();
    builder.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    builder.build()
}

/// Self-signed issuing CA standing in for the enrollment server.
pub(crate) struct TestCa {
    key: PKey<Private>,
    cert: X509,
}

impl TestCa {
    pub(crate) fn new() -> Self {
        static CA_KEY: OnceLock<PKey<Private>> = OnceLock::new();
        let key = CA_KEY.get_or_init(generate_key).clone();
        let subject = name("Test Enrollment CA");

        let mut builder = X509::builder().unwrap();
        builder.set_version(X509_VERSION_3).unwrap();
        let mut serial = BigNum::new().unwrap();
        serial.rand(128, MsbOption::MAYBE_ZERO, false).unwrap();
        builder
            .set_serial_number(&serial.to_asn1_integer().unwrap())
            .unwrap();
        builder.set_subject_name(&subject).unwrap();
        builder.set_issuer_name(&subject).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(30).unwrap())
            .unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();

        Self {
            key,
            cert: builder.build(),
        }
    }

    /// Issue a leaf certificate for the key and subject of `request`,
    /// copying its requested extensions.
    pub(crate) fn issue(&self, request: &X509ReqRef) -> X509 {
        let public_key = request.public_key().unwrap();
        let mut builder = self.leaf_builder(request.subject_name());
        builder.set_pubkey(&public_key).unwrap();
        for extension in request.extensions().unwrap() {
            builder.append_extension(extension).unwrap();
        }
        builder.sign(&self.key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    pub(crate) fn issue_for_key(&self, key: &PKeyRef<Private>, cn: &str) -> X509 {
        let subject = name(cn);
        let mut builder = self.leaf_builder(&subject);
        builder.set_pubkey(key).unwrap();
        builder.sign(&self.key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    /// Issue for a PEM request and return the certificate as PEM.
    pub(crate) fn issue_pem(&self, csr_pem: &str) -> String {
        let request = X509Req::from_pem(csr_pem.as_bytes()).unwrap();
        String::from_utf8(self.issue(&request).to_pem().unwrap()).unwrap()
    }

    fn leaf_builder(&self, subject: &openssl::x509::X509NameRef) -> openssl::x509::X509Builder {
        let mut builder = X509::builder().unwrap();
        builder.set_version(X509_VERSION_3).unwrap();
        let mut serial = BigNum::new().unwrap();
        serial.rand(128, MsbOption::MAYBE_ZERO, false).unwrap();
        builder
            .set_serial_number(&serial.to_asn1_integer().unwrap())
            .unwrap();
        builder.set_subject_name(subject).unwrap();
        builder.set_issuer_name(self.cert.subject_name()).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(365).unwrap())
            .unwrap();
        builder
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    KeyGenerated,
    Digested,
    Signed,
    Exported,
    Posted(String),
}

#[derive(Debug, Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub(crate) fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn posts(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Posted(_)))
            .count()
    }
}

/// Provider returning [`fixed_key`], recording each stage and optionally
/// failing at one of them.
pub(crate) struct RecordingCrypto {
    log: EventLog,
    available: bool,
    fail_at: Option<CryptoStage>,
}

impl RecordingCrypto {
    pub(crate) fn new(log: EventLog) -> Self {
        Self {
            log,
            available: true,
            fail_at: None,
        }
    }

    pub(crate) fn unavailable(log: EventLog) -> Self {
        Self {
            available: false,
            ..Self::new(log)
        }
    }

    pub(crate) fn failing_at(log: EventLog, stage: CryptoStage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::new(log)
        }
    }

    fn check(&self, stage: CryptoStage) -> Result<()> {
        if self.fail_at == Some(stage) {
            bail!("simulated {:?} failure", stage);
        }
        Ok(())
    }
}

impl CryptoProvider for RecordingCrypto {
    fn is_available(&self, _algorithm: &KeyAlgorithm) -> bool {
        self.available
    }

    fn generate_key_pair(&self, _algorithm: &KeyAlgorithm) -> Result<PKey<Private>> {
        self.check(CryptoStage::KeyGeneration)?;
        self.log.push(Event::KeyGenerated);
        Ok(fixed_key())
    }

    fn digest(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.check(CryptoStage::Digest)?;
        self.log.push(Event::Digested);
        OpensslProvider.digest(data)
    }

    fn sign_request(
        &self,
        request: &mut openssl::x509::X509ReqBuilder,
        key: &PKeyRef<Private>,
        hash: HashAlgorithm,
    ) -> Result<()> {
        self.check(CryptoStage::Signing)?;
        OpensslProvider.sign_request(request, key, hash)?;
        self.log.push(Event::Signed);
        Ok(())
    }

    fn export_private_key(&self, key: &PKeyRef<Private>) -> Result<ExportedKey> {
        self.check(CryptoStage::KeyExport)?;
        self.log.push(Event::Exported);
        OpensslProvider.export_private_key(key)
    }
}

type Responder = Box<dyn Fn(&FormFields) -> crate::error::Result<Value> + Send + Sync>;

/// Transport answering from a queue of scripted responders.
#[derive(Clone)]
pub(crate) struct ScriptedTransport {
    log: EventLog,
    requests: Arc<Mutex<Vec<(String, FormFields)>>>,
    responders: Arc<Mutex<VecDeque<Responder>>>,
}

impl ScriptedTransport {
    pub(crate) fn new(log: EventLog) -> Self {
        Self {
            log,
            requests: Arc::default(),
            responders: Arc::default(),
        }
    }

    pub(crate) fn respond(
        self,
        responder: impl Fn(&FormFields) -> crate::error::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.responders
            .lock()
            .unwrap()
            .push_back(Box::new(responder));
        self
    }

    pub(crate) fn respond_json(self, body: Value) -> Self {
        self.respond(move |_| Ok(body.clone()))
    }

    /// Answer like the enrollment endpoint: issue a certificate for the submitted CSR.
    pub(crate) fn issuing(self) -> Self {
        let ca = TestCa::new();
        self.respond(move |fields| {
            let csr = fields
                .get("csr")
                .ok_or_else(|| EnrollError::Malformed("no csr".to_string()))?;
            Ok(json!({"result": 1, "cert": ca.issue_pem(csr)}))
        })
    }

    pub(crate) fn requests(&self) -> Vec<(String, FormFields)> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    async fn post_form(&self, url: &Url, fields: &FormFields) -> crate::error::Result<Value> {
        self.log.push(Event::Posted(url.to_string()));
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), fields.clone()));
        // Suspend like a real round trip so concurrent callers interleave
        tokio::task::yield_now().await;
        let responder = self.responders.lock().unwrap().pop_front();
        match responder {
            Some(responder) => responder(fields),
            None => Err(EnrollError::Malformed("no scripted response left".to_string())),
        }
    }
}
