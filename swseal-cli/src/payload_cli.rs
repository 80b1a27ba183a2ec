//! Payload commands: key generation, signing, verification, inspection,
//! out-of-band install and the watchdog snippet

use anyhow::{bail, Context, Result};
use chrono::Utc;
use p384::SecretKey;
use rand_core::OsRng;
use serde::Serialize;
use std::fs;
use std::path::Path;
use swseal_core::payload::{parse, Field, SignedMetadata};
use swseal_core::store::{FileStore, RecordStore, VerifiedRecord};
use swseal_core::trust::hasher::hash_string;
use swseal_core::trust::{PayloadSigner, SignatureVerifier, TrustKey, VerifiedPayload};
use swseal_core::{watchdog, LoaderConfig};
use tracing::{debug, info, warn};

/// Verified metadata as printed by `verify`
#[derive(Debug, Serialize)]
struct VerifiedSummary<'a> {
    name: &'a str,
    modified_time: i64,
    extras: &'a [Field],
    body_sha256: String,
}

impl<'a> From<&'a VerifiedPayload> for VerifiedSummary<'a> {
    fn from(payload: &'a VerifiedPayload) -> Self {
        Self {
            name: &payload.name,
            modified_time: payload.modified_time,
            extras: &payload.extras,
            body_sha256: hash_string(&payload.body),
        }
    }
}

pub fn keygen(out: &Path, force: bool) -> Result<()> {
    let private_path = out.join("private.jwk");
    let public_path = out.join("public.jwk");

    if private_path.exists() && !force {
        bail!(
            "{} already exists; pass --force to replace the key pair",
            private_path.display()
        );
    }

    fs::create_dir_all(out)
        .with_context(|| format!("Failed to create key directory: {}", out.display()))?;

    let secret = SecretKey::random(&mut OsRng);
    let public = TrustKey::from_public_key(secret.public_key());

    fs::write(&private_path, secret.to_jwk_string().as_bytes())
        .with_context(|| format!("Failed to write {}", private_path.display()))?;
    fs::write(&public_path, public.to_jwk_string())
        .with_context(|| format!("Failed to write {}", public_path.display()))?;

    info!("Generated key pair {}", public.fingerprint());
    println!("Private key: {}", private_path.display());
    println!("Public key:  {}", public_path.display());
    println!("Fingerprint: {}", public.fingerprint());
    println!();
    println!("Keep private.jwk secret. Configure public.jwk as the loader's public_key.");
    Ok(())
}

pub fn sign(
    key: &Path,
    name: &str,
    modified: Option<i64>,
    notes: &[String],
    script: &Path,
    out: Option<&Path>,
) -> Result<()> {
    if name.contains('"') || notes.iter().any(|note| note.contains('"')) {
        bail!("Metadata must not contain double quotes; the loader cannot parse them");
    }

    let signer = PayloadSigner::from_jwk_file(key)
        .with_context(|| format!("Failed to load signing key: {}", key.display()))?;
    let body = fs::read_to_string(script)
        .with_context(|| format!("Failed to read script: {}", script.display()))?;

    let modified = modified.unwrap_or_else(|| Utc::now().timestamp_millis());
    let extras: Vec<Field> = notes.iter().map(|note| Field::from(note.as_str())).collect();
    let payload = signer.sign(name, modified, &extras, &body)?;

    debug!(
        "Signed '{}' modified {} with key {}",
        name,
        modified,
        signer.trust_key().fingerprint()
    );

    match out {
        Some(path) => {
            fs::write(path, &payload)
                .with_context(|| format!("Failed to write payload: {}", path.display()))?;
            eprintln!("Signed payload written to {}", path.display());
        }
        None => print!("{payload}"),
    }
    Ok(())
}

fn load_key(key: Option<&Path>) -> Result<TrustKey> {
    let key = match key {
        Some(path) => TrustKey::from_jwk_file(path)
            .with_context(|| format!("Failed to load public key: {}", path.display()))?,
        None => TrustKey::embedded()?,
    };
    Ok(key)
}

fn read_payload(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read payload: {}", path.display()))
}

pub fn verify(
    key: Option<&Path>,
    name: &str,
    min_mod_time: Option<i64>,
    payload: &Path,
) -> Result<()> {
    let key = load_key(key)?;
    let content = read_payload(payload)?;

    let verifier = SignatureVerifier::new(&key, name);
    let verified = verifier
        .check(&content, min_mod_time)
        .with_context(|| format!("Payload rejected: {}", payload.display()))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&VerifiedSummary::from(&verified))?
    );
    Ok(())
}

pub fn inspect(payload: &Path, json: bool) -> Result<()> {
    let content = read_payload(payload)?;
    let frame = parse(&content)
        .with_context(|| format!("Payload framing is invalid: {}", payload.display()))?;
    let body_sha256 = hash_string(&frame.body);

    if json {
        let value = serde_json::json!({
            "fields": frame.fields,
            "body_bytes": frame.body.len(),
            "body_sha256": body_sha256,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match SignedMetadata::split(frame.fields.clone()) {
        Ok(metadata) => {
            println!("Name:      {}", metadata.name().unwrap_or("<not a string>"));
            match metadata.modified_time() {
                Some(modified) => println!("Modified:  {modified}"),
                None => println!("Modified:  <not an integer>"),
            }
            for extra in metadata.extras() {
                println!("Extra:     {extra}");
            }
            println!("Signature: {}", metadata.signature());
        }
        Err(e) => {
            println!("Fields:    {}", serde_json::to_string(&frame.fields)?);
            println!("Metadata:  {e}");
        }
    }
    println!("Body:      {} bytes, {}", frame.body.len(), body_sha256);
    Ok(())
}

pub async fn install(config_path: &Path, payload: &Path) -> Result<()> {
    let config = LoaderConfig::from_file(config_path)?;
    let Some(store_path) = config.store_path.as_deref() else {
        bail!(
            "{} does not set store_path; there is no record store to install into",
            config_path.display()
        );
    };

    let key = load_key(config.public_key.as_deref())?;
    let content = read_payload(payload)?;

    let verifier = SignatureVerifier::new(&key, config.script_name.clone());
    let verified = verifier
        .check(&content, None)
        .with_context(|| format!("Payload rejected: {}", payload.display()))?;

    let store = FileStore::new(store_path);
    if let Some(existing) = store.load(&config.script_name).await.ok().flatten() {
        if existing.updated_time >= verified.modified_time {
            warn!(
                "Stored record is modified {}, installing an older or equal {}",
                existing.updated_time, verified.modified_time
            );
        }
    }

    let record = VerifiedRecord::new(&config.script_name, content, verified.modified_time);
    let downloaded = record.downloaded_time;
    store
        .store(record)
        .await
        .with_context(|| format!("Failed to write record store: {}", store_path.display()))?;

    println!(
        "Installed '{}' modified {} into {} (downloaded {})",
        verified.name,
        verified.modified_time,
        store_path.display(),
        downloaded.to_rfc3339()
    );
    Ok(())
}

pub fn snippet(hash: bool) {
    if hash {
        println!("{}", watchdog::csp_source());
    } else {
        println!("{}", watchdog::bootstrap_markup());
    }
}
