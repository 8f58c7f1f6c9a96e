//! Enrollment identity and session artifacts.
//!
//! Every check-in overwrites the previous record of its category; no
//! history is kept. The TokenUpdate tally is advisory and never gates
//! anything.

use crate::core::context::RequestContext;
use crate::core::error::{StoreError, StoreResult};
use crate::core::time::Clock;
use crate::mdm::cert::{cert_hash, pem_certificate};
use crate::schema::records::{
    attr, AuthenticateRecord, BootstrapTokenRecord, CertHashDevice, DeviceCertHash, DisabledRecord,
    TokenUpdateRecord, TokenUpdateTally, UnlockTokenRecord, UserAuthRecord,
};
use crate::schema::{keys, DeviceRecord};
use crate::storage::{ItemKey, KeyValueTable, TableExt};
use std::sync::Arc;
use tracing::Span;

/// Per-device enrollment state.
pub struct EnrollmentStore<T: ?Sized> {
    table: Arc<T>,
    clock: Arc<dyn Clock>,
    span: Span,
}

impl<T: KeyValueTable + ?Sized> EnrollmentStore<T> {
    pub fn new(table: Arc<T>, clock: Arc<dyn Clock>, span: Span) -> Self {
        Self { table, clock, span }
    }

    /// Record the identity certificate and serial number from an
    /// Authenticate check-in, replacing any previous enrollment's.
    pub fn store_authenticate(
        &self,
        ctx: &RequestContext,
        device_id: &str,
        cert_der: &[u8],
        serial_number: &str,
    ) -> StoreResult<()> {
        let record = AuthenticateRecord {
            device_id: device_id.to_string(),
            serial_number: serial_number.to_string(),
            cert_pem: pem_certificate(cert_der),
        };
        self.table.put_record(ctx, &record)?;
        tracing::debug!(parent: &self.span, device_id, serial_number, "stored authenticate");
        Ok(())
    }

    pub fn retrieve_authenticate(
        &self,
        ctx: &RequestContext,
        device_id: &str,
    ) -> StoreResult<Option<AuthenticateRecord>> {
        self.table.get_record(
            ctx,
            &ItemKey::new(keys::device_pk(device_id), keys::AUTHENTICATE),
        )
    }

    /// Record a TokenUpdate check-in.
    ///
    /// The unlock token is written first, then the raw message, then the
    /// tally is bumped. The first two writes are fatal on failure; the tally
    /// is best-effort. A successful TokenUpdate re-enables a disabled
    /// enrollment.
    pub fn store_token_update(
        &self,
        ctx: &RequestContext,
        device_id: &str,
        raw: &[u8],
        unlock_token: Option<&[u8]>,
    ) -> StoreResult<()> {
        if let Some(token) = unlock_token {
            self.table.put_record(
                ctx,
                &UnlockTokenRecord {
                    device_id: device_id.to_string(),
                    token: token.to_vec(),
                },
            )?;
        }

        self.table.put_record(
            ctx,
            &TokenUpdateRecord {
                device_id: device_id.to_string(),
                raw: raw.to_vec(),
            },
        )?;

        match self.bump_tally(ctx, device_id) {
            Ok(tally) => {
                tracing::debug!(parent: &self.span, device_id, tally, "stored token update")
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, device_id, error = %e, "token update tally not recorded")
            }
        }

        self.table.delete_item(ctx, &DisabledRecord::key_for(device_id))
    }

    fn bump_tally(&self, ctx: &RequestContext, device_id: &str) -> StoreResult<i64> {
        let key = TokenUpdateTally::key_for(device_id);
        if let Some(tally) = self.table.increment(ctx, &key, attr::TALLY, 1)? {
            return Ok(tally);
        }

        // Read-modify-write: concurrent updates may lose a count.
        let current = self
            .table
            .get_record::<TokenUpdateTally>(ctx, &key)?
            .map_or(0, |t| t.tally);
        let next = TokenUpdateTally {
            device_id: device_id.to_string(),
            tally: current.saturating_add(1),
        };
        self.table.put_record(ctx, &next)?;
        Ok(next.tally)
    }

    pub fn retrieve_token_update(
        &self,
        ctx: &RequestContext,
        device_id: &str,
    ) -> StoreResult<Option<TokenUpdateRecord>> {
        self.table.get_record(
            ctx,
            &ItemKey::new(keys::device_pk(device_id), keys::TOKEN_UPDATE),
        )
    }

    /// Number of TokenUpdates recorded. A missing or zero tally is NotFound.
    pub fn retrieve_token_update_tally(
        &self,
        ctx: &RequestContext,
        device_id: &str,
    ) -> StoreResult<i64> {
        match self
            .table
            .get_record::<TokenUpdateTally>(ctx, &TokenUpdateTally::key_for(device_id))?
        {
            Some(t) if t.tally != 0 => Ok(t.tally),
            _ => Err(StoreError::not_found(format!(
                "token update tally for {device_id}"
            ))),
        }
    }

    pub fn retrieve_unlock_token(
        &self,
        ctx: &RequestContext,
        device_id: &str,
    ) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .table
            .get_record::<UnlockTokenRecord>(
                ctx,
                &ItemKey::new(keys::device_pk(device_id), keys::UNLOCK_TOKEN),
            )?
            .map(|r| r.token))
    }

    /// Record a UserAuthenticate check-in. The digest follow-up is kept
    /// apart from the initial message.
    pub fn store_user_authenticate(
        &self,
        ctx: &RequestContext,
        device_id: &str,
        raw: &[u8],
        has_digest_response: bool,
    ) -> StoreResult<()> {
        self.table.put_record(
            ctx,
            &UserAuthRecord {
                device_id: device_id.to_string(),
                raw: raw.to_vec(),
                digest: has_digest_response,
            },
        )
    }

    pub fn retrieve_user_authenticate(
        &self,
        ctx: &RequestContext,
        device_id: &str,
        digest: bool,
    ) -> StoreResult<Option<Vec<u8>>> {
        Ok(self
            .table
            .get_record::<UserAuthRecord>(
                ctx,
                &ItemKey::new(keys::device_pk(device_id), UserAuthRecord::category(digest)),
            )?
            .map(|r| r.raw))
    }

    pub fn store_bootstrap_token(
        &self,
        ctx: &RequestContext,
        device_id: &str,
        token: &[u8],
    ) -> StoreResult<()> {
        self.table.put_record(
            ctx,
            &BootstrapTokenRecord {
                device_id: device_id.to_string(),
                token: token.to_vec(),
            },
        )
    }

    /// The stored bootstrap token. Absent or empty is NotFound; a row that
    /// does not decode is a Decode error.
    pub fn retrieve_bootstrap_token(
        &self,
        ctx: &RequestContext,
        device_id: &str,
    ) -> StoreResult<Vec<u8>> {
        let record = self.table.get_record::<BootstrapTokenRecord>(
            ctx,
            &ItemKey::new(keys::device_pk(device_id), keys::BOOTSTRAP_TOKEN),
        )?;
        match record {
            Some(r) if !r.token.is_empty() => Ok(r.token),
            _ => Err(StoreError::not_found(format!("bootstrap token for {device_id}"))),
        }
    }

    /// Revoke the enrollment's certificate binding in both directions and
    /// mark it disabled. Enrollment history is left in place.
    pub fn disable(&self, ctx: &RequestContext, device_id: &str, cert_der: &[u8]) -> StoreResult<()> {
        let presented = cert_hash(cert_der);
        let forward_key = DeviceCertHash::key_for(device_id);

        // The bound hash may differ from the presented one; drop both reverse rows.
        if let Some(bound) = self.table.get_record::<DeviceCertHash>(ctx, &forward_key)? {
            if bound.hash != presented {
                self.table
                    .delete_item(ctx, &CertHashDevice::key_for(&bound.hash, device_id))?;
            }
        }
        self.table.delete_item(ctx, &forward_key)?;
        self.table
            .delete_item(ctx, &CertHashDevice::key_for(&presented, device_id))?;

        self.table.put_record(
            ctx,
            &DisabledRecord {
                device_id: device_id.to_string(),
                disabled_at: self.clock.now(),
            },
        )?;
        tracing::info!(parent: &self.span, device_id, hash = %presented, "enrollment disabled");
        Ok(())
    }

    pub fn is_disabled(&self, ctx: &RequestContext, device_id: &str) -> StoreResult<bool> {
        Ok(self
            .table
            .get_item(ctx, &DisabledRecord::key_for(device_id))?
            .is_some())
    }

    /// Every row in the device partition, decoded.
    pub fn device_records(
        &self,
        ctx: &RequestContext,
        device_id: &str,
    ) -> StoreResult<Vec<DeviceRecord>> {
        self.table
            .query(ctx, &keys::device_pk(device_id), None)?
            .into_iter()
            .map(DeviceRecord::from_item)
            .collect()
    }
}

impl<T: ?Sized> std::fmt::Debug for EnrollmentStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentStore").finish_non_exhaustive()
    }
}
