//! The MDM storage facade.
//!
//! [`MdmStore`] ties the four components to one table. Components share
//! nothing but the table and the key layout in [`crate::schema`]; each
//! logs under its own span, a child of the store's span.
//!
//! # Components
//!
//! - [`EnrollmentStore`] - identity, session artifacts, disable flag
//! - [`CertAuthStore`] - certificate-hash bindings ([`CertAuthPolicy`] on top)
//! - [`CommandQueueStore`] - per-device command lifecycle
//! - [`PushCredentialStore`] - push certificates and push-token lookup

pub mod certauth;
pub mod enrollment;
pub mod push;
pub mod queue;

pub use certauth::{CertAuthPolicy, CertAuthStore};
pub use enrollment::EnrollmentStore;
pub use push::{PushCredentialStore, StoredPushCert};
pub use queue::CommandQueueStore;

use crate::core::config::{CertAuthConfig, Config};
use crate::core::context::RequestContext;
use crate::core::error::StoreResult;
use crate::core::time::{Clock, SystemClock};
use crate::storage::{open_table, KeyValueTable};
use std::sync::Arc;
use std::time::Duration;

/// Behavior switches for an [`MdmStore`].
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Delete finished and invalidated commands instead of keeping them.
    pub delete_commands: bool,

    /// Certificate-authorization policy.
    pub cert_auth: CertAuthConfig,

    /// Deadline applied by [`MdmStore::context`].
    pub request_timeout: Option<Duration>,
}

impl From<&Config> for StoreOptions {
    fn from(config: &Config) -> Self {
        Self {
            delete_commands: config.storage.delete_commands,
            cert_auth: config.cert_auth.clone(),
            request_timeout: config.requests.timeout(),
        }
    }
}

/// All MDM state on one table.
pub struct MdmStore<T: ?Sized> {
    table: Arc<T>,
    options: StoreOptions,
    enrollments: EnrollmentStore<T>,
    cert_auth: CertAuthStore<T>,
    queue: CommandQueueStore<T>,
    push_certs: PushCredentialStore<T>,
}

impl MdmStore<dyn KeyValueTable> {
    /// Open the configured backend with the system clock.
    pub fn open(config: &Config) -> StoreResult<Self> {
        let table = open_table(&config.storage)?;
        Ok(Self::new(table, Arc::new(SystemClock), StoreOptions::from(config)))
    }
}

impl<T: KeyValueTable + ?Sized> MdmStore<T> {
    pub fn new(table: Arc<T>, clock: Arc<dyn Clock>, options: StoreOptions) -> Self {
        let span = tracing::info_span!("mdm_store", table = %table.name());
        let child = |component: &'static str| {
            tracing::debug_span!(parent: &span, "component", component)
        };

        Self {
            enrollments: EnrollmentStore::new(table.clone(), clock.clone(), child("enrollments")),
            cert_auth: CertAuthStore::new(table.clone(), child("cert_auth")),
            queue: CommandQueueStore::new(
                table.clone(),
                clock.clone(),
                options.delete_commands,
                child("queue"),
            ),
            push_certs: PushCredentialStore::new(table.clone(), clock, child("push_certs")),
            table,
            options,
        }
    }

    pub fn enrollments(&self) -> &EnrollmentStore<T> {
        &self.enrollments
    }

    pub fn cert_auth(&self) -> &CertAuthStore<T> {
        &self.cert_auth
    }

    /// Request-time authorization under the configured policy.
    pub fn cert_auth_policy(&self) -> CertAuthPolicy<'_, T> {
        CertAuthPolicy::new(&self.cert_auth, self.options.cert_auth.clone())
    }

    pub fn queue(&self) -> &CommandQueueStore<T> {
        &self.queue
    }

    pub fn push_certs(&self) -> &PushCredentialStore<T> {
        &self.push_certs
    }

    /// The underlying table.
    pub fn table(&self) -> &Arc<T> {
        &self.table
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// A request context carrying the configured deadline.
    pub fn context(&self) -> RequestContext {
        match self.options.request_timeout {
            Some(timeout) => RequestContext::with_timeout(timeout),
            None => RequestContext::background(),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for MdmStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MdmStore")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
