//! Certificate-hash binding and authorization tests.

mod common;

use common::{device_cert_der, memory_store};
use mdmkv::core::config::CertAuthConfig;
use mdmkv::core::context::RequestContext;
use mdmkv::core::error::ErrorKind;
use mdmkv::mdm::cert_hash;
use mdmkv::schema::keys;
use mdmkv::storage::{Item, ItemKey, KeyValueTable};
use mdmkv::StoreOptions;

fn hashes() -> (String, String) {
    (
        cert_hash(&device_cert_der("one")),
        cert_hash(&device_cert_der("two")),
    )
}

fn policy_options(allow_retroactive: bool, allow_duplicates: bool) -> StoreOptions {
    StoreOptions {
        cert_auth: CertAuthConfig {
            allow_retroactive,
            allow_duplicates,
        },
        ..Default::default()
    }
}

// ============================================================================
// Binding primitives
// ============================================================================

#[test]
fn associated_hash_matches_only_itself() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    let (h1, h2) = hashes();

    store.cert_auth().associate_cert_hash(&ctx, "D", &h1).unwrap();

    assert!(store.cert_auth().is_cert_hash_associated(&ctx, "D", &h1).unwrap());
    assert!(!store.cert_auth().is_cert_hash_associated(&ctx, "D", &h2).unwrap());
}

#[test]
fn reverse_lookup_resolves_to_device() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    let (h1, _) = hashes();

    assert!(!store.cert_auth().has_cert_hash(&ctx, &h1).unwrap());
    store.cert_auth().associate_cert_hash(&ctx, "D", &h1).unwrap();

    assert!(store.cert_auth().has_cert_hash(&ctx, &h1).unwrap());
    assert_eq!(
        store.cert_auth().device_for_cert_hash(&ctx, &h1).unwrap(),
        Some("D".to_string())
    );
}

#[test]
fn unbound_enrollment_is_not_found() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    let (h1, _) = hashes();

    let err = store
        .cert_auth()
        .enrollment_has_cert_hash(&ctx, "D")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    store.cert_auth().associate_cert_hash(&ctx, "D", &h1).unwrap();
    assert!(store.cert_auth().enrollment_has_cert_hash(&ctx, "D").unwrap());
}

#[test]
fn rebinding_moves_reverse_row() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    let (h1, h2) = hashes();

    store.cert_auth().associate_cert_hash(&ctx, "D", &h1).unwrap();
    store.cert_auth().associate_cert_hash(&ctx, "D", &h2).unwrap();

    assert_eq!(store.cert_auth().bound_hash(&ctx, "D").unwrap(), Some(h2.clone()));
    assert!(!store.cert_auth().has_cert_hash(&ctx, &h1).unwrap());
    assert!(store.cert_auth().has_cert_hash(&ctx, &h2).unwrap());
}

#[test]
fn repeated_association_converges() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    let (h1, _) = hashes();

    store.cert_auth().associate_cert_hash(&ctx, "D", &h1).unwrap();
    store.cert_auth().associate_cert_hash(&ctx, "D", &h1).unwrap();

    assert_eq!(
        store.cert_auth().devices_for_cert_hash(&ctx, &h1).unwrap(),
        vec!["D".to_string()]
    );
}

#[test]
fn retry_after_partial_association_repairs_reverse_row() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    let (h1, _) = hashes();

    store.cert_auth().associate_cert_hash(&ctx, "D", &h1).unwrap();
    // Simulate a reverse write that never landed.
    store
        .table()
        .delete_item(&ctx, &ItemKey::new(keys::hash_pk(&h1), "D"))
        .unwrap();
    assert!(store.cert_auth().is_cert_hash_associated(&ctx, "D", &h1).unwrap());
    assert!(!store.cert_auth().has_cert_hash(&ctx, &h1).unwrap());

    store.cert_auth().associate_cert_hash(&ctx, "D", &h1).unwrap();
    assert!(store.cert_auth().has_cert_hash(&ctx, &h1).unwrap());
}

#[test]
fn association_overwrites_undecodable_forward_row() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    let (h1, _) = hashes();

    // Forward row with no hash attribute.
    store
        .table()
        .put_item(&ctx, Item::new(keys::device_pk("D"), keys::DEVICE_TO_CERT_HASH))
        .unwrap();
    let err = store.cert_auth().bound_hash(&ctx, "D").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Decode);

    store.cert_auth().associate_cert_hash(&ctx, "D", &h1).unwrap();
    assert_eq!(store.cert_auth().bound_hash(&ctx, "D").unwrap(), Some(h1.clone()));
    assert!(store.cert_auth().has_cert_hash(&ctx, &h1).unwrap());
}

// ============================================================================
// Authorization policy
// ============================================================================

#[test]
fn authenticate_binds_and_authorize_accepts_match() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    let (h1, _) = hashes();
    let policy = store.cert_auth_policy();

    policy.authenticate(&ctx, "D", &h1).unwrap();
    policy.authorize(&ctx, "D", &h1).unwrap();
}

#[test]
fn mismatch_is_conflict_without_retroactive() {
    let (store, _) = memory_store(StoreOptions::default());
    let ctx = RequestContext::background();
    let (h1, h2) = hashes();
    let policy = store.cert_auth_policy();

    policy.authenticate(&ctx, "D", &h1).unwrap();
    let err = policy.authorize(&ctx, "D", &h2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    // Unbound enrollments are rejected too.
    let err = policy.authorize(&ctx, "E", &h2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(!store.cert_auth().has_cert_hash(&ctx, &h2).unwrap());
}

#[test]
fn retroactive_overwrites_old_binding() {
    let (store, _) = memory_store(policy_options(true, false));
    let ctx = RequestContext::background();
    let (h1, h2) = hashes();
    let policy = store.cert_auth_policy();

    policy.authorize(&ctx, "D", &h1).unwrap();
    assert!(store.cert_auth().is_cert_hash_associated(&ctx, "D", &h1).unwrap());

    policy.authorize(&ctx, "D", &h2).unwrap();
    assert!(store.cert_auth().is_cert_hash_associated(&ctx, "D", &h2).unwrap());
    assert!(!store.cert_auth().has_cert_hash(&ctx, &h1).unwrap());
}

#[test]
fn hash_bound_elsewhere_is_conflict_unless_duplicates_allowed() {
    let (h1, _) = hashes();
    let ctx = RequestContext::background();

    let (store, _) = memory_store(policy_options(true, false));
    store.cert_auth_policy().authenticate(&ctx, "D", &h1).unwrap();
    let err = store
        .cert_auth_policy()
        .authenticate(&ctx, "E", &h1)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    let err = store
        .cert_auth_policy()
        .authorize(&ctx, "E", &h1)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let (store, _) = memory_store(policy_options(false, true));
    store.cert_auth_policy().authenticate(&ctx, "D", &h1).unwrap();
    store.cert_auth_policy().authenticate(&ctx, "E", &h1).unwrap();
    assert_eq!(
        store.cert_auth().devices_for_cert_hash(&ctx, &h1).unwrap(),
        vec!["D".to_string(), "E".to_string()]
    );
}
