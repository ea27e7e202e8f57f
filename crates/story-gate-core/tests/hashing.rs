// crates/story-gate-core/tests/hashing.rs
// ============================================================================
// Module: Canonical Hashing Tests
// Description: Verifies RFC 8785 canonical JSON hashing behavior.
// ============================================================================
//! ## Overview
//! Ensures canonical hashing is deterministic across key ordering and that
//! digests render with their algorithm label.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use story_gate_core::HashAlgorithm;
use story_gate_core::hashing::canonical_json_bytes;
use story_gate_core::hashing::hash_bytes;
use story_gate_core::hashing::hash_canonical_json;

#[test]
fn canonical_hash_is_order_independent_for_maps() {
    let mut map_a = Map::new();
    map_a.insert("b".to_string(), json!(2));
    map_a.insert("a".to_string(), json!(1));

    let mut map_b = Map::new();
    map_b.insert("a".to_string(), json!(1));
    map_b.insert("b".to_string(), json!(2));

    let hash_a = hash_canonical_json(HashAlgorithm::Sha256, &Value::Object(map_a)).expect("hash a");
    let hash_b = hash_canonical_json(HashAlgorithm::Sha256, &Value::Object(map_b)).expect("hash b");

    assert_eq!(hash_a, hash_b);
    assert_eq!(hash_a.value, "43258cff783fe7036d8a43033f830adfc60ec037382473548ac742b888292777");
}

#[test]
fn canonical_bytes_sort_keys_and_strip_whitespace() {
    let mut map = BTreeMap::new();
    map.insert("zeta", 1);
    map.insert("alpha", 2);
    let bytes = canonical_json_bytes(&map).expect("canonical bytes");
    assert_eq!(bytes, br#"{"alpha":2,"zeta":1}"#.to_vec());
}

/// Verifies the empty object hashes to the published SHA-256 digest.
#[test]
fn empty_object_digest_matches_known_value() {
    let digest = hash_canonical_json(HashAlgorithm::Sha256, &json!({})).expect("hash");
    assert_eq!(digest.value, "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a");
}

#[test]
fn digest_display_includes_algorithm_label() {
    let digest = hash_bytes(HashAlgorithm::Sha256, b"abc");
    assert_eq!(
        digest.to_string(),
        "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn algorithm_labels_round_trip() {
    assert_eq!(HashAlgorithm::from_label(HashAlgorithm::Sha256.label()), Some(HashAlgorithm::Sha256));
    assert_eq!(HashAlgorithm::from_label("md5"), None);
}

#[test]
fn digest_matches_only_its_own_bytes() {
    let digest = HashAlgorithm::Sha256.digest(b"run payload");
    assert_eq!(digest, hash_bytes(HashAlgorithm::Sha256, b"run payload"));
    assert!(digest.matches(b"run payload"));
    assert!(!digest.matches(b"run payload "));
}
