//! `agora did` - checksums, DID and sealing of a document file

use std::path::Path;

use agora_crypto::{compute_did, seal, service_checksums, verify};
use agora_types::{Address, Ddo};
use anyhow::Context;

use crate::display;

pub fn read_ddo(path: &Path) -> anyhow::Result<Ddo> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn run(path: &Path, method: &str, seal_as: Option<&str>) -> anyhow::Result<()> {
    let mut ddo = read_ddo(path)?;

    display::section("Service checksums");
    for (index, checksum) in service_checksums(&ddo, method)? {
        display::kv(&format!("service {}", index), &checksum);
    }

    let did = compute_did(&ddo, method)?;
    display::section("Identity");
    display::kv("DID", &did.to_string());
    if let Some(stored) = &ddo.id {
        if verify(&ddo)? {
            display::success(&format!("{} matches the services", stored));
        } else {
            display::failure(&format!("{} does not match the services", stored));
        }
    }

    if let Some(publisher) = seal_as {
        let publisher = Address::parse(publisher)?;
        seal(&mut ddo, method, publisher)?;
        println!();
        println!("{}", serde_json::to_string_pretty(&ddo)?);
    }
    Ok(())
}
