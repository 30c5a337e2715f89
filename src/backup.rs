use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::policy::POLICY_FILE_NAME;
use crate::store::{write_atomically, RECORD_FILE_NAME};

const MANIFEST_ENTRY: &str = "manifest.json";
const RECORDS_ENTRY: &str = "data/marks.csv";
const POLICY_ENTRY: &str = "data/grading_policy.txt";
pub const BUNDLE_FORMAT_V1: &str = "gradebook-workspace-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub restored: Vec<String>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Zips the workspace's record and policy files with a checksummed
/// manifest. The record file is required; the policy file is optional.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let records_path = workspace_path.join(RECORD_FILE_NAME);
    if !records_path.is_file() {
        return Err(anyhow!(
            "workspace record file not found: {}",
            records_path.to_string_lossy()
        ));
    }

    let mut entries: Vec<(&str, Vec<u8>)> = Vec::new();
    entries.push((
        RECORDS_ENTRY,
        std::fs::read(&records_path)
            .with_context(|| format!("failed to read {}", records_path.to_string_lossy()))?,
    ));
    let policy_path = workspace_path.join(POLICY_FILE_NAME);
    if policy_path.is_file() {
        entries.push((
            POLICY_ENTRY,
            std::fs::read(&policy_path)
                .with_context(|| format!("failed to read {}", policy_path.to_string_lossy()))?,
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let checksums: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(name, bytes)| (name.to_string(), json!(sha256_hex(bytes))))
        .collect();
    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "sha256": checksums,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    for (name, bytes) in &entries {
        zip.start_file(*name, opts)
            .with_context(|| format!("failed to start {} entry", name))?;
        zip.write_all(bytes)
            .with_context(|| format!("failed to write {} entry", name))?;
    }

    zip.finish().context("failed to finalize zip bundle")?;

    info!(out = %out_path.display(), entries = entries.len() + 1, "workspace bundle exported");
    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: entries.len() + 1,
    })
}

/// Restores a bundle into `workspace_path`, replacing each file whole.
/// Every entry's checksum is verified before anything is written.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    if !is_zip_file(in_path)? {
        return Err(anyhow!(
            "not a workspace bundle: {}",
            in_path.to_string_lossy()
        ));
    }

    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let checksums = manifest
        .get("sha256")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    let mut staged: Vec<(&str, Vec<u8>)> = Vec::new();
    let mut policy_absent = false;
    for (entry, file_name) in [(RECORDS_ENTRY, RECORD_FILE_NAME), (POLICY_ENTRY, POLICY_FILE_NAME)] {
        let mut bytes = Vec::new();
        match archive.by_name(entry) {
            Ok(mut f) => {
                f.read_to_end(&mut bytes)
                    .with_context(|| format!("failed to read {} entry", entry))?;
            }
            Err(zip::result::ZipError::FileNotFound) if entry == POLICY_ENTRY => {
                policy_absent = true;
                continue;
            }
            Err(e) => return Err(anyhow!("bundle missing {}: {}", entry, e)),
        }
        let expected = checksums.get(entry).and_then(|v| v.as_str()).unwrap_or("");
        let actual = sha256_hex(&bytes);
        if expected != actual {
            return Err(anyhow!(
                "checksum mismatch for {}: manifest {} vs content {}",
                entry,
                expected,
                actual
            ));
        }
        staged.push((file_name, bytes));
    }

    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let mut restored = Vec::new();
    for (file_name, bytes) in staged {
        let dst = workspace_path.join(file_name);
        write_atomically(&dst, |mut f| {
            f.write_all(&bytes)
                .map_err(|e| crate::error::GradebookError::io(&dst, e))?;
            Ok(f)
        })
        .with_context(|| format!("failed to restore {}", dst.to_string_lossy()))?;
        restored.push(file_name.to_string());
    }
    // A bundle exported without a policy restores to the default policy.
    if policy_absent {
        let policy_path = workspace_path.join(POLICY_FILE_NAME);
        match std::fs::remove_file(&policy_path) {
            Ok(()) => info!(path = %policy_path.display(), "policy file removed; bundle has none"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to remove {}", policy_path.to_string_lossy()))
            }
        }
    }

    info!(bundle = %in_path.display(), restored = ?restored, "workspace bundle imported");
    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
        restored,
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
