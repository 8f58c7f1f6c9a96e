//! Certificate-hash bindings.
//!
//! A forward row (`device#<id>` / `DeviceToCertHash`) names the hash bound
//! to an enrollment and a reverse row (`hash#<hash>` / `<id>`) makes the
//! binding discoverable by hash. The two rows are written separately with
//! deterministic keys, so re-running a failed association converges.

use crate::core::config::CertAuthConfig;
use crate::core::context::RequestContext;
use crate::core::error::{StoreError, StoreResult};
use crate::schema::keys;
use crate::schema::records::{CertHashDevice, DeviceCertHash};
use crate::storage::{KeyValueTable, TableExt};
use std::sync::Arc;
use tracing::Span;

/// Device to certificate-hash bindings.
pub struct CertAuthStore<T: ?Sized> {
    table: Arc<T>,
    span: Span,
}

impl<T: KeyValueTable + ?Sized> CertAuthStore<T> {
    pub fn new(table: Arc<T>, span: Span) -> Self {
        Self { table, span }
    }

    /// Whether any enrollment is bound to `hash`.
    pub fn has_cert_hash(&self, ctx: &RequestContext, hash: &str) -> StoreResult<bool> {
        Ok(!self.table.query(ctx, &keys::hash_pk(hash), None)?.is_empty())
    }

    /// Whether the enrollment has a binding. NotFound when it has none.
    pub fn enrollment_has_cert_hash(&self, ctx: &RequestContext, device_id: &str) -> StoreResult<bool> {
        match self.bound_hash(ctx, device_id)? {
            Some(_) => Ok(true),
            None => Err(StoreError::not_found(format!("cert hash for {device_id}"))),
        }
    }

    /// Whether the enrollment is bound to exactly `hash`.
    pub fn is_cert_hash_associated(
        &self,
        ctx: &RequestContext,
        device_id: &str,
        hash: &str,
    ) -> StoreResult<bool> {
        Ok(self.bound_hash(ctx, device_id)?.as_deref() == Some(hash))
    }

    /// Bind `hash` to the enrollment: forward row, then reverse row. A
    /// previous binding to a different hash loses its reverse row last.
    ///
    /// On error the caller must retry the whole association.
    pub fn associate_cert_hash(
        &self,
        ctx: &RequestContext,
        device_id: &str,
        hash: &str,
    ) -> StoreResult<()> {
        let previous = match self.bound_hash(ctx, device_id) {
            Ok(previous) => previous,
            // The forward row is overwritten below.
            Err(e @ StoreError::Decode { .. }) => {
                tracing::warn!(parent: &self.span, device_id, error = %e, "replacing undecodable cert hash row");
                None
            }
            Err(e) => return Err(e),
        };

        self.table.put_record(
            ctx,
            &DeviceCertHash {
                device_id: device_id.to_string(),
                hash: hash.to_string(),
            },
        )?;
        self.table.put_record(
            ctx,
            &CertHashDevice {
                hash: hash.to_string(),
                device_id: device_id.to_string(),
            },
        )?;

        if let Some(old) = previous.filter(|old| old != hash) {
            self.table
                .delete_item(ctx, &CertHashDevice::key_for(&old, device_id))?;
            tracing::info!(parent: &self.span, device_id, old_hash = %old, hash, "cert hash rebound");
        } else {
            tracing::debug!(parent: &self.span, device_id, hash, "cert hash associated");
        }
        Ok(())
    }

    /// Enrollments bound to `hash`, in id order.
    pub fn devices_for_cert_hash(&self, ctx: &RequestContext, hash: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .table
            .query_records::<CertHashDevice>(ctx, &keys::hash_pk(hash), None)?
            .into_iter()
            .map(|row| row.device_id)
            .collect())
    }

    /// Reverse lookup: the enrollment bound to `hash`, if any.
    pub fn device_for_cert_hash(&self, ctx: &RequestContext, hash: &str) -> StoreResult<Option<String>> {
        Ok(self.devices_for_cert_hash(ctx, hash)?.into_iter().next())
    }

    /// The hash currently bound to the enrollment.
    pub fn bound_hash(&self, ctx: &RequestContext, device_id: &str) -> StoreResult<Option<String>> {
        Ok(self
            .table
            .get_record::<DeviceCertHash>(ctx, &DeviceCertHash::key_for(device_id))?
            .map(|row| row.hash)
            .filter(|hash| !hash.is_empty()))
    }
}

impl<T: ?Sized> std::fmt::Debug for CertAuthStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertAuthStore").finish_non_exhaustive()
    }
}

/// Request-time certificate authorization built on [`CertAuthStore`].
///
/// Authenticate check-ins establish the binding; every later message must
/// present the bound certificate.
pub struct CertAuthPolicy<'a, T: ?Sized> {
    store: &'a CertAuthStore<T>,
    config: CertAuthConfig,
}

impl<'a, T: KeyValueTable + ?Sized> CertAuthPolicy<'a, T> {
    pub fn new(store: &'a CertAuthStore<T>, config: CertAuthConfig) -> Self {
        Self { store, config }
    }

    /// Admit an Authenticate check-in and bind its certificate hash.
    ///
    /// A hash already bound to another enrollment is a Conflict unless
    /// duplicates are allowed.
    pub fn authenticate(&self, ctx: &RequestContext, device_id: &str, hash: &str) -> StoreResult<()> {
        self.check_duplicate(ctx, device_id, hash)?;
        self.store.associate_cert_hash(ctx, device_id, hash)
    }

    /// Admit any other message.
    ///
    /// The bound hash is accepted. With retroactive association enabled an
    /// unbound or differently bound enrollment is (re)bound to `hash`;
    /// otherwise a mismatch is a Conflict.
    pub fn authorize(&self, ctx: &RequestContext, device_id: &str, hash: &str) -> StoreResult<()> {
        if self.store.is_cert_hash_associated(ctx, device_id, hash)? {
            return Ok(());
        }

        if !self.config.allow_retroactive {
            tracing::warn!(parent: &self.store.span, device_id, hash, "cert hash mismatch");
            return Err(StoreError::conflict(format!(
                "certificate {hash} is not associated with enrollment {device_id}"
            )));
        }

        self.check_duplicate(ctx, device_id, hash)?;
        self.store.associate_cert_hash(ctx, device_id, hash)
    }

    fn check_duplicate(&self, ctx: &RequestContext, device_id: &str, hash: &str) -> StoreResult<()> {
        if self.config.allow_duplicates {
            return Ok(());
        }
        let bound = self.store.devices_for_cert_hash(ctx, hash)?;
        if let Some(other) = bound.iter().find(|id| id.as_str() != device_id) {
            tracing::warn!(parent: &self.store.span, device_id, hash, other = %other, "cert hash bound elsewhere");
            return Err(StoreError::conflict(format!(
                "certificate {hash} is already bound to enrollment {other}"
            )));
        }
        Ok(())
    }
}
