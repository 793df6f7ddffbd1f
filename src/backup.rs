use crate::db::DB_FILE_NAME;
use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/gradebook.sqlite3";
pub const BUNDLE_FORMAT_V1: &str = "gradebook-workspace-v1";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

fn sha256_hex<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let db_sha256 = sha256_hex(
        File::open(&db_path)
            .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?,
    )
    .context("failed to hash database")?;

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "dbSha256": db_sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    let mut db_file = File::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    std::io::copy(&mut db_file, &mut zip).context("failed to write database entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
        db_sha256,
    })
}

pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let dst = workspace_path.join(DB_FILE_NAME);

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
    let Some(expected_sha) = manifest
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .map(|s| s.to_ascii_lowercase())
    else {
        return Err(anyhow!("manifest missing dbSha256"));
    };

    let tmp_dst = workspace_path.join(format!("{}.importing", DB_FILE_NAME));
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }

    let mut db_out = File::create(&tmp_dst).with_context(|| {
        format!(
            "failed to create temp database {}",
            tmp_dst.to_string_lossy()
        )
    })?;
    {
        let mut db_entry = archive
            .by_name(DB_ENTRY)
            .context("bundle missing db/gradebook.sqlite3")?;
        std::io::copy(&mut db_entry, &mut db_out).context("failed to extract database entry")?;
    }
    db_out
        .flush()
        .context("failed to flush extracted database")?;
    drop(db_out);

    let actual_sha = sha256_hex(
        File::open(&tmp_dst).context("failed to reopen extracted database")?,
    )
    .context("failed to hash extracted database")?;
    if actual_sha != expected_sha {
        let _ = std::fs::remove_file(&tmp_dst);
        return Err(anyhow!(
            "database checksum mismatch: manifest {} but bundle contains {}",
            expected_sha,
            actual_sha
        ));
    }

    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| {
            format!(
                "failed to remove existing database {}",
                dst.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move extracted database to {}",
            dst.to_string_lossy()
        )
    })?;

    Ok(ImportSummary {
        bundle_format_detected: BUNDLE_FORMAT_V1.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_digest() {
        let digest = sha256_hex(&b"abc"[..]).expect("hash");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
