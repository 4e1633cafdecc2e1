//! Checksum and DID derivation against the bundled access-service document

use agora_crypto::{canonical_document, checksum, compute_did, keccak256_hex, seal, service_checksums, verify};
use agora_types::{Address, Ddo, Service};
use serde_json::json;

const FIXTURE: &str = include_str!("fixtures/ddo_access.json");

const METADATA_CHECKSUM: &str = "5acbaa942ec15e443080585c11077dc3f6a61da0d419ea0f41923f717b8c7197";
const ACCESS_CHECKSUM: &str = "9153412cd530e84a67cd43f59f7a85b8ea3def392b2997f1202d28f3f8b770ab";
const DID_HASH: &str = "5bbe0c42c916fa65c459196e1c0577b60843798a0eabc7ce159ff83ed33c1313";

fn fixture() -> Ddo {
    serde_json::from_str(FIXTURE).unwrap()
}

/// Two-service document whose hashes were computed outside this crate from
/// the literal material strings below
fn inline_document() -> Ddo {
    Ddo::new(vec![
        Service {
            index: 0,
            service_type: "metadata".to_string(),
            service_endpoint: None,
            template_id: None,
            attributes: json!({"main": {
                "type": "dataset",
                "name": "UK Weather information 2011",
                "author": "Met Office",
                "license": "CC-BY",
                "files": [
                    {"index": 1, "checksum": "085340abffh21495345af97c6b0e761"},
                    {"index": 0, "checksum": "efb2c764274b745f5fc37f97c6b0e761"}
                ]
            }}),
        },
        Service {
            index: 1,
            service_type: "access".to_string(),
            service_endpoint: None,
            template_id: None,
            attributes: json!({"main": {"timeout": 86400, "price": "10", "name": "dataAssetAccessServiceAgreement"}}),
        },
    ])
}

#[test]
fn test_inline_document_matches_independent_hashes() {
    let ddo = inline_document();
    let metadata_material =
        "efb2c764274b745f5fc37f97c6b0e761085340abffh21495345af97c6b0e761UK Weather information 2011Met OfficeCC-BYdid:nv:0";
    let access_material = r#"{"main":{"name":"dataAssetAccessServiceAgreement","price":"10","timeout":86400}}"#;

    let metadata = checksum(&ddo.services[0], "nv").unwrap();
    let access = checksum(&ddo.services[1], "nv").unwrap();
    assert_eq!(metadata, keccak256_hex(metadata_material.as_bytes()));
    assert_eq!(metadata, "5acbaa942ec15e443080585c11077dc3f6a61da0d419ea0f41923f717b8c7197");
    assert_eq!(access, keccak256_hex(access_material.as_bytes()));
    assert_eq!(access, "a29a06522701fb3daab4cddf474a9216b629476d095b568697cc135457eb5c8c");

    let did = compute_did(&ddo, "nv").unwrap();
    assert_eq!(did.hash_hex(), keccak256_hex(format!("{}{}", metadata, access).as_bytes()));
    assert_eq!(
        did.to_string(),
        "did:nv:dddbc73f61bb7ff826f8127c6c25519060c37efede30dd7f312597dcdb6d9550"
    );
}

#[test]
fn test_fixture_checksums() {
    let checksums = service_checksums(&fixture(), "nv").unwrap();
    assert_eq!(checksums[&0], METADATA_CHECKSUM);
    assert_eq!(checksums[&1], ACCESS_CHECKSUM);
}

#[test]
fn test_fixture_did() {
    let did = compute_did(&fixture(), "nv").unwrap();
    assert_eq!(did.to_string(), format!("did:nv:{}", DID_HASH));
}

#[test]
fn test_did_is_idempotent() {
    let ddo = fixture();
    let first = service_checksums(&ddo, "nv").unwrap();
    let second = service_checksums(&ddo, "nv").unwrap();
    assert_eq!(canonical_document(&first), canonical_document(&second));
    assert_eq!(compute_did(&ddo, "nv").unwrap(), compute_did(&ddo, "nv").unwrap());
}

#[test]
fn test_license_change_changes_did() {
    let mut ddo = fixture();
    ddo.services[0].attributes["main"]["license"] = "CC-BY-SA".into();
    let checksums = service_checksums(&ddo, "nv").unwrap();
    assert_eq!(
        checksums[&0],
        "4ee518f17e5c36ad5d14f801fed523864f338d2572d116620372653db466d427"
    );
    assert_eq!(checksums[&1], ACCESS_CHECKSUM);
    assert_ne!(compute_did(&ddo, "nv").unwrap().hash_hex(), DID_HASH);
}

#[test]
fn test_file_checksum_change_changes_did() {
    let mut ddo = fixture();
    ddo.services[0].attributes["main"]["files"][0]["checksum"] = "085340abffh21495345af97c6b0e762".into();
    assert_ne!(compute_did(&ddo, "nv").unwrap().hash_hex(), DID_HASH);
}

#[test]
fn test_price_change_changes_access_checksum() {
    let mut ddo = fixture();
    ddo.services[1].attributes["main"]["rewards"]["amounts"][0] = "8".into();
    let checksums = service_checksums(&ddo, "nv").unwrap();
    assert_eq!(checksums[&0], METADATA_CHECKSUM);
    assert_ne!(checksums[&1], ACCESS_CHECKSUM);
}

#[test]
fn test_seal_keeps_did_and_resolves_endpoint() {
    let mut ddo = fixture();
    let publisher = Address::parse("0x00bd138abd70e2f00903268f3db08f2d25677c9e").unwrap();
    let did = seal(&mut ddo, "nv", publisher).unwrap();

    assert_eq!(did.hash_hex(), DID_HASH);
    assert_eq!(ddo.id.as_ref(), Some(&did));
    assert_eq!(ddo.publisher(), Some(publisher));
    let proof = ddo.proof.as_ref().unwrap();
    assert_eq!(proof.checksum["0"], METADATA_CHECKSUM);
    assert_eq!(proof.checksum["1"], ACCESS_CHECKSUM);
    assert!(ddo.services[0]
        .service_endpoint
        .as_deref()
        .unwrap()
        .ends_with(&did.to_string()));

    // Proof and endpoints are outside the hashed content
    assert!(verify(&ddo).unwrap());
    assert_eq!(seal(&mut ddo, "nv", publisher).unwrap(), did);
}

#[test]
fn test_tampered_document_fails_verification() {
    let mut ddo = fixture();
    seal(&mut ddo, "nv", Address::ZERO).unwrap();
    ddo.services[0].attributes["main"]["name"] = "UK Weather information 2012".into();
    assert!(!verify(&ddo).unwrap());
}
