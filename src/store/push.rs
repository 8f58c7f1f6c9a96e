//! Push credentials and push-token resolution.

use crate::core::context::RequestContext;
use crate::core::error::{StoreError, StoreResult};
use crate::core::time::Clock;
use crate::mdm::cert::PushCertificate;
use crate::mdm::checkin::{decode_checkin, CheckinMessage, Push};
use crate::schema::keys;
use crate::schema::records::{PushCertRecord, TokenUpdateRecord};
use crate::storage::{ItemKey, KeyValueTable, TableExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::Span;

/// A stored push credential and the token identifying its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPushCert {
    pub certificate: PushCertificate,
    pub stale_token: String,
}

/// Push certificates by topic, plus per-device push descriptors.
pub struct PushCredentialStore<T: ?Sized> {
    table: Arc<T>,
    clock: Arc<dyn Clock>,
    span: Span,
}

impl<T: KeyValueTable + ?Sized> PushCredentialStore<T> {
    pub fn new(table: Arc<T>, clock: Arc<dyn Clock>, span: Span) -> Self {
        Self { table, clock, span }
    }

    /// Store a push certificate under the topic named in its subject,
    /// replacing any credential for that topic. Returns the topic.
    pub fn store_push_cert(
        &self,
        ctx: &RequestContext,
        cert_pem: &[u8],
        key_pem: &[u8],
    ) -> StoreResult<String> {
        let cert = PushCertificate::from_pem(cert_pem, key_pem)?;
        let record = PushCertRecord {
            topic: cert.topic.clone(),
            cert_pem: cert.cert_pem,
            key_pem: cert.key_pem,
            stale_token: self.clock.now().as_i64(),
        };
        self.table.put_record(ctx, &record)?;
        tracing::info!(
            parent: &self.span,
            topic = %record.topic,
            not_after = %cert.not_after,
            "push certificate stored"
        );
        Ok(record.topic)
    }

    /// The credential for `topic`. Absence is `Ok(None)`; a stored pair that
    /// no longer parses is a Decode error.
    pub fn retrieve_push_cert(
        &self,
        ctx: &RequestContext,
        topic: &str,
    ) -> StoreResult<Option<StoredPushCert>> {
        let Some(record) = self
            .table
            .get_record::<PushCertRecord>(ctx, &PushCertRecord::key_for(topic))?
        else {
            return Ok(None);
        };

        let certificate =
            PushCertificate::from_pem(record.cert_pem.as_bytes(), record.key_pem.as_bytes())
                .map_err(|e| StoreError::decode(format!("push certificate {topic}"), e))?;
        Ok(Some(StoredPushCert {
            certificate,
            stale_token: record.stale_token.to_string(),
        }))
    }

    /// Whether `provided` names an older version of the credential than
    /// the one stored. A missing credential is not stale.
    pub fn is_push_cert_stale(
        &self,
        ctx: &RequestContext,
        topic: &str,
        provided: &str,
    ) -> StoreResult<bool> {
        Ok(self
            .table
            .get_record::<PushCertRecord>(ctx, &PushCertRecord::key_for(topic))?
            .is_some_and(|record| record.stale_token.to_string() != provided))
    }

    /// Topics with a stored credential.
    pub fn list_topics(&self, ctx: &RequestContext) -> StoreResult<Vec<String>> {
        Ok(self
            .table
            .query(ctx, keys::PUSH_CERT_PARTITION, None)?
            .into_iter()
            .map(|item| item.sk)
            .collect())
    }

    /// Push descriptors for each device that has a TokenUpdate on file.
    ///
    /// Devices without one are omitted. A stored TokenUpdate that does not
    /// decode, or is some other message type, fails the whole batch.
    pub fn retrieve_push_info<S: AsRef<str>>(
        &self,
        ctx: &RequestContext,
        device_ids: &[S],
    ) -> StoreResult<BTreeMap<String, Push>> {
        let mut infos = BTreeMap::new();

        for device_id in device_ids {
            let device_id = device_id.as_ref();
            let key = ItemKey::new(keys::device_pk(device_id), keys::TOKEN_UPDATE);
            let Some(record) = self.table.get_record::<TokenUpdateRecord>(ctx, &key)? else {
                continue;
            };

            let message = decode_checkin(&record.raw)
                .map_err(|e| StoreError::decode(format!("token update for {device_id}"), e))?;
            match message {
                CheckinMessage::TokenUpdate(update) => {
                    infos.insert(device_id.to_string(), update.push);
                }
                other => {
                    return Err(StoreError::decode(
                        format!("token update for {device_id}"),
                        format!("stored message is {}", other.message_type()),
                    ))
                }
            }
        }

        tracing::debug!(
            parent: &self.span,
            requested = device_ids.len(),
            resolved = infos.len(),
            "push info resolved"
        );
        Ok(infos)
    }
}

impl<T: ?Sized> std::fmt::Debug for PushCredentialStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushCredentialStore").finish_non_exhaustive()
    }
}
