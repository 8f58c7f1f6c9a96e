//! Certificate helpers.
//!
//! Device identity certificates are bound by the SHA-256 of their DER
//! encoding. Push certificates name their APNs topic in the subject UID
//! attribute.

use crate::core::error::{StoreError, StoreResult};
use crate::core::time::Timestamp;
use pem::{EncodeConfig, LineEnding, Pem};
use rustls::crypto::ring::sign::any_supported_type;
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs1KeyDer, PrivatePkcs8KeyDer, PrivateSec1KeyDer};
use sha2::{Digest, Sha256};
use x509_parser::certificate::X509Certificate;
use x509_parser::parse_x509_certificate;

/// Subject UID attribute (0.9.2342.19200300.100.1.1).
pub const OID_USER_ID: &str = "0.9.2342.19200300.100.1.1";

const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Lowercase hex SHA-256 of a DER certificate.
pub fn cert_hash(der: &[u8]) -> String {
    hex::encode(Sha256::digest(der))
}

/// PEM-encode a DER certificate.
pub fn pem_certificate(der: &[u8]) -> String {
    pem::encode_config(
        &Pem::new(CERTIFICATE_TAG, der.to_vec()),
        EncodeConfig::new().set_line_ending(LineEnding::LF),
    )
}

/// DER bytes of the first certificate in a PEM document.
pub fn der_from_pem(pem_cert: &[u8]) -> StoreResult<Vec<u8>> {
    let parsed = pem::parse(pem_cert)
        .map_err(|e| StoreError::invalid_input(format!("invalid PEM: {e}")))?;
    if parsed.tag() != CERTIFICATE_TAG {
        return Err(StoreError::invalid_input(format!(
            "expected {CERTIFICATE_TAG} PEM block, got {}",
            parsed.tag()
        )));
    }
    Ok(parsed.into_contents())
}

/// The first private key block in a PEM document: PKCS#8 (`PRIVATE KEY`),
/// PKCS#1 (`RSA PRIVATE KEY`) or SEC1 (`EC PRIVATE KEY`). Other blocks,
/// such as `EC PARAMETERS`, are skipped.
pub fn private_key_from_pem(key_pem: &[u8]) -> StoreResult<PrivateKeyDer<'static>> {
    let blocks = pem::parse_many(key_pem)
        .map_err(|e| StoreError::invalid_input(format!("invalid key PEM: {e}")))?;
    blocks
        .into_iter()
        .find_map(|block| match block.tag() {
            "PRIVATE KEY" => Some(PrivatePkcs8KeyDer::from(block.into_contents()).into()),
            "RSA PRIVATE KEY" => Some(PrivatePkcs1KeyDer::from(block.into_contents()).into()),
            "EC PRIVATE KEY" => Some(PrivateSec1KeyDer::from(block.into_contents()).into()),
            _ => None,
        })
        .ok_or_else(|| StoreError::invalid_input("no private key block in key PEM"))
}

fn parse_der(der: &[u8]) -> StoreResult<X509Certificate<'_>> {
    let (_, cert) = parse_x509_certificate(der)
        .map_err(|e| StoreError::invalid_input(format!("invalid certificate: {e}")))?;
    Ok(cert)
}

fn topic_of(cert: &X509Certificate<'_>) -> StoreResult<String> {
    cert.subject()
        .iter_attributes()
        .find(|attr| attr.attr_type().to_id_string() == OID_USER_ID)
        .and_then(|attr| attr.as_str().ok())
        .filter(|topic| !topic.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StoreError::invalid_input("certificate subject has no UID topic"))
}

/// The APNs topic named by a PEM push certificate.
pub fn topic_from_pem_cert(pem_cert: &[u8]) -> StoreResult<String> {
    let der = der_from_pem(pem_cert)?;
    topic_of(&parse_der(&der)?)
}

/// A validated push certificate and its private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushCertificate {
    pub topic: String,
    pub cert_pem: String,
    pub key_pem: String,
    pub not_after: Timestamp,
}

impl PushCertificate {
    /// Parse a certificate/key pair, rejecting a key that does not belong
    /// to the certificate.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> StoreResult<Self> {
        let der = der_from_pem(cert_pem)?;
        let cert = parse_der(&der)?;
        let topic = topic_of(&cert)?;

        let key_text = std::str::from_utf8(key_pem)
            .map_err(|e| StoreError::invalid_input(format!("private key is not UTF-8: {e}")))?;
        let key = any_supported_type(&private_key_from_pem(key_pem)?)
            .map_err(|e| StoreError::invalid_input(format!("invalid private key: {e}")))?;
        let public_key = key
            .public_key()
            .ok_or_else(|| StoreError::invalid_input("cannot derive public key from private key"))?;
        if public_key.as_ref() != cert.public_key().raw {
            return Err(StoreError::invalid_input(
                "private key does not match certificate public key",
            ));
        }

        let not_after = Timestamp::from_i64(cert.validity().not_after.timestamp().saturating_mul(1000));
        let cert_text = std::str::from_utf8(cert_pem)
            .map_err(|e| StoreError::invalid_input(format!("certificate is not UTF-8: {e}")))?;

        Ok(Self {
            topic,
            cert_pem: cert_text.to_string(),
            key_pem: key_text.to_string(),
            not_after,
        })
    }
}
