//! Release archive download, checksum verification, and extraction

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use sha2::{Digest, Sha256};

use super::{sanitize_relative_path, UpdateError};

/// Hard cap on the downloaded archive size.
const MAX_ARCHIVE_BYTES: u64 = 1024 * 1024 * 1024;

/// Zip-bomb guards.
const MAX_ZIP_ENTRIES: usize = 10_000;
const MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES: u64 = 512 * 1024 * 1024;

/// Download a release asset to disk with a hard size limit.
pub async fn download_to_file(url: &str, dest: &Path) -> Result<(), UpdateError> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| UpdateError::Http(e.to_string()))?;

    if !response.status().is_success() {
        return Err(UpdateError::Http(format!(
            "download returned {}",
            response.status()
        )));
    }

    if let Some(length) = response.content_length() {
        if length > MAX_ARCHIVE_BYTES {
            return Err(UpdateError::Invalid(format!(
                "archive too large: {length} bytes"
            )));
        }
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| UpdateError::Http(e.to_string()))?;
    if bytes.len() as u64 > MAX_ARCHIVE_BYTES {
        return Err(UpdateError::Invalid(format!(
            "archive too large: {} bytes",
            bytes.len()
        )));
    }

    let mut file = File::create(dest)?;
    file.write_all(&bytes)?;
    Ok(())
}

/// Compute the SHA-256 hex digest for a local file.
pub fn sha256_file(path: &Path) -> Result<String, UpdateError> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compare the on-disk archive checksum to the expected SHA-256 digest.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), UpdateError> {
    let actual = sha256_file(path)?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(UpdateError::ChecksumMismatch {
            filename: path
                .file_name()
                .and_then(|s| s.to_str())
                .unwrap_or("archive.zip")
                .to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Extract a zip archive into `dest`, sanitizing every entry path.
pub fn unzip_to_dir(archive_path: &Path, dest: &Path) -> Result<(), UpdateError> {
    let file = File::open(archive_path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| UpdateError::Zip(e.to_string()))?;

    if archive.len() > MAX_ZIP_ENTRIES {
        return Err(UpdateError::Invalid(format!(
            "archive has too many entries: {}",
            archive.len()
        )));
    }

    std::fs::create_dir_all(dest)?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| UpdateError::Zip(e.to_string()))?;

        if entry.size() > MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES {
            return Err(UpdateError::Invalid(format!(
                "archive entry too large: {}",
                entry.name()
            )));
        }

        let rel = sanitize_relative_path(entry.name())?;
        let out_path = dest.join(&rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        std::io::copy(&mut entry, &mut out_file)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use zip::write::SimpleFileOptions;

    fn write_test_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn sha256_matches_known_digest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();

        // sha256("hello")
        assert_eq!(
            sha256_file(&path).unwrap(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn checksum_mismatch_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("x.bin");
        std::fs::write(&path, b"content").unwrap();

        let err = verify_checksum(&path, &"ab".repeat(32)).unwrap_err();
        assert!(matches!(err, UpdateError::ChecksumMismatch { .. }));
    }

    #[test]
    fn checksum_is_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();

        let upper = "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824";
        verify_checksum(&path, upper).unwrap();
    }

    #[test]
    fn unzip_extracts_nested_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("release.zip");
        write_test_zip(
            &archive,
            &[
                ("emulsion-admin", b"binary"),
                ("static/app.js", b"js"),
                ("static/css/admin.css", b"css"),
            ],
        );

        let dest = tmp.path().join("out");
        unzip_to_dir(&archive, &dest).unwrap();

        assert_eq!(std::fs::read(dest.join("emulsion-admin")).unwrap(), b"binary");
        assert_eq!(
            std::fs::read(dest.join("static/css/admin.css")).unwrap(),
            b"css"
        );
    }

    #[test]
    fn unzip_rejects_traversal_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("evil.zip");
        write_test_zip(&archive, &[("../outside.txt", b"evil")]);

        let dest = tmp.path().join("out");
        let err = unzip_to_dir(&archive, &dest).unwrap_err();
        assert!(matches!(err, UpdateError::Invalid(_)));
        assert!(!tmp.path().join("outside.txt").exists());
    }
}
