//! Service checksums and content-addressed DIDs
//!
//! ```text
//! checksum(metadata) = keccak256(file checksums ‖ name ‖ author ‖ license ‖ "did:<method>:0")
//! checksum(other)    = keccak256(canonical_json(attributes))
//! did                = "did:<method>:" ‖ hex(keccak256(checksum_0 ‖ checksum_1 ‖ ..))
//! ```
//!
//! The proof section never feeds the hash, so sealing a document does not
//! change its DID.

use std::collections::BTreeMap;

use agora_types::{Address, Bytes32, Ddo, Did, Proof, Service, ServiceType};
use chrono::Utc;
use serde_json::Value;

use crate::hash::{keccak256, keccak256_hex};
use crate::{DerivationError, DerivationResult};

/// Proof type recorded when a document is sealed
pub const PROOF_TYPE: &str = "DDOIntegritySignature";

/// Endpoint token replaced by the DID once it is known
pub const DID_ENDPOINT_TOKEN: &str = "{did}";

/// Serialize JSON with object keys sorted at every depth and no whitespace
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (key, item)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Checksum of one service, as lowercase hex
pub fn checksum(service: &Service, method: &str) -> DerivationResult<String> {
    if matches!(service.kind(), Ok(ServiceType::Metadata)) {
        let main = service.metadata_main()?;
        let mut files = main.files.clone();
        files.sort_by_key(|f| f.index);

        let mut material = String::new();
        for file in &files {
            material.push_str(&file.checksum);
        }
        material.push_str(&main.name);
        material.push_str(&main.author);
        material.push_str(&main.license);
        material.push_str(&Did::placeholder(method));
        Ok(keccak256_hex(material.as_bytes()))
    } else {
        Ok(keccak256_hex(canonical_json(&service.attributes).as_bytes()))
    }
}

/// Checksum of every service, keyed by service index
pub fn service_checksums(ddo: &Ddo, method: &str) -> DerivationResult<BTreeMap<u32, String>> {
    if ddo.metadata_service().is_none() {
        return Err(DerivationError::InvalidDocument("no metadata service".to_string()));
    }
    let mut checksums = BTreeMap::new();
    for service in &ddo.services {
        if checksums.insert(service.index, checksum(service, method)?).is_some() {
            return Err(DerivationError::InvalidDocument(format!(
                "duplicate service index {}",
                service.index
            )));
        }
    }
    Ok(checksums)
}

/// Canonical document bytes: every checksum in ascending service index order
pub fn canonical_document(checksums: &BTreeMap<u32, String>) -> Vec<u8> {
    checksums.values().flat_map(|c| c.bytes()).collect()
}

/// Hash a canonical document into a DID
pub fn build_did(canonical_document: &[u8], method: &str) -> Did {
    Did::new(method, Bytes32::new(keccak256(canonical_document)))
}

/// Compute the DID of a document without modifying it
pub fn compute_did(ddo: &Ddo, method: &str) -> DerivationResult<Did> {
    let checksums = service_checksums(ddo, method)?;
    Ok(build_did(&canonical_document(&checksums), method))
}

/// Seal a document: assign its DID, attach the checksum proof and resolve
/// `{did}` in service endpoints.
pub fn seal(ddo: &mut Ddo, method: &str, creator: Address) -> DerivationResult<Did> {
    let checksums = service_checksums(ddo, method)?;
    let did = build_did(&canonical_document(&checksums), method);

    let did_text = did.to_string();
    for service in &mut ddo.services {
        if let Some(endpoint) = service.service_endpoint.as_mut() {
            if endpoint.contains(DID_ENDPOINT_TOKEN) {
                *endpoint = endpoint.replace(DID_ENDPOINT_TOKEN, &did_text);
            }
        }
    }

    ddo.id = Some(did.clone());
    ddo.proof = Some(Proof {
        proof_type: PROOF_TYPE.to_string(),
        created: Utc::now(),
        creator,
        checksum: checksums
            .into_iter()
            .map(|(index, sum)| (index.to_string(), sum))
            .collect(),
    });
    Ok(did)
}

/// Check that a sealed document still hashes to its DID
pub fn verify(ddo: &Ddo) -> DerivationResult<bool> {
    let Some(id) = ddo.id.as_ref() else {
        return Ok(false);
    };
    Ok(&compute_did(ddo, id.method())? == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({"b": 1, "a": {"d": [3, {"z": true, "y": null}], "c": "x"}});
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":"x","d":[3,{"y":null,"z":true}]},"b":1}"#
        );
    }

    #[test]
    fn test_canonical_json_escapes_strings() {
        let value = json!({"k\"": "line\nbreak"});
        assert_eq!(canonical_json(&value), r#"{"k\"":"line\nbreak"}"#);
    }

    #[test]
    fn test_build_did_is_idempotent() {
        let doc = b"9ca5f006";
        assert_eq!(build_did(doc, "nv"), build_did(doc, "nv"));
        assert_ne!(build_did(doc, "nv"), build_did(b"9ca5f007", "nv"));
        assert!(build_did(doc, "nv").to_string().starts_with("did:nv:"));
    }

    #[test]
    fn test_document_without_metadata_is_rejected() {
        let ddo = Ddo::new(vec![Service {
            index: 1,
            service_type: "access".to_string(),
            service_endpoint: None,
            template_id: None,
            attributes: json!({}),
        }]);
        assert!(matches!(
            compute_did(&ddo, "nv"),
            Err(DerivationError::InvalidDocument(_))
        ));
    }
}
