//! Download-verify-extract handling for the dataset archives.
//!
//! An archive is fetched only when the local copy is missing or its SHA-1
//! does not match the descriptor. A verified archive is never touched again,
//! so repeated dataset construction performs no network traffic.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sha1::{Digest, Sha1};
use tracing::{debug, info, warn};

use crate::errors::{DataError, Result};

const USER_AGENT: &str = concat!("slu-data/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Static download metadata for one corpus archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadDescriptor<'a> {
    pub filename: &'a str,
    pub url: &'a str,
    pub sha1: &'a str,
}

/// What `ensure_archive` had to do to make the archive available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Cached,
    Downloaded { extracted: usize },
}

/// Retrieves the raw bytes of an archive into `dest`, replacing any existing file.
pub trait ArchiveSource {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTPS retrieval with certificate verification enabled.
pub struct HttpSource {
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|err| DataError::retrieval("<client>", err))?;
        Ok(Self { client })
    }
}

impl ArchiveSource for HttpSource {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        info!(url, dest = %dest.display(), "downloading archive");
        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|err| DataError::retrieval(url, err))?;

        let written = stream_to_file(&mut response, dest, url)?;
        debug!(bytes = written, "download complete");
        Ok(())
    }
}

/// Streams `body` into `<dest>.part`, then renames it over `dest`. The
/// partial file is removed when the transfer fails.
fn stream_to_file<R: Read>(body: &mut R, dest: &Path, url: &str) -> Result<u64> {
    let partial = partial_path(dest);
    let written = match copy_body(body, &partial, url) {
        Ok(written) => written,
        Err(err) => {
            let _ = fs::remove_file(&partial);
            return Err(err);
        }
    };
    fs::rename(&partial, dest)?;
    Ok(written)
}

fn copy_body<R: Read>(body: &mut R, partial: &Path, url: &str) -> Result<u64> {
    let mut writer = BufWriter::new(File::create(partial)?);
    let written = io::copy(body, &mut writer).map_err(|err| DataError::retrieval(url, err))?;
    writer.flush()?;
    Ok(written)
}

/// Guarantees a verified, extracted copy of the archive exists under `root`.
pub fn ensure_archive(
    root: &Path,
    descriptor: &DownloadDescriptor<'_>,
    source: &dyn ArchiveSource,
) -> Result<FetchOutcome> {
    fs::create_dir_all(root)?;
    let archive_path = root.join(descriptor.filename);

    if archive_path.is_file() && check_sha1(&archive_path, descriptor.sha1)? {
        debug!(archive = %archive_path.display(), "archive verified, skipping download");
        return Ok(FetchOutcome::Cached);
    }

    if archive_path.exists() {
        warn!(
            archive = %archive_path.display(),
            "existing archive failed verification, downloading again"
        );
    }

    source.fetch(descriptor.url, &archive_path)?;

    let actual = sha1_file(&archive_path)?;
    if !actual.eq_ignore_ascii_case(descriptor.sha1) {
        let _ = fs::remove_file(&archive_path);
        return Err(DataError::Integrity {
            path: archive_path,
            expected: descriptor.sha1.to_ascii_lowercase(),
            actual,
        });
    }

    let extracted = extract_archive(&archive_path, root)?;
    info!(
        archive = %archive_path.display(),
        extracted,
        "archive extracted"
    );
    Ok(FetchOutcome::Downloaded { extracted })
}

/// Lowercase hex SHA-1 of a file's contents.
pub fn sha1_file(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha1::new();
    let mut buffer = [0u8; 8 * 1024];

    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn check_sha1(path: &Path, expected: &str) -> Result<bool> {
    Ok(sha1_file(path)?.eq_ignore_ascii_case(expected))
}

/// Extracts every member of a zip archive under `root`, overwriting existing
/// files. Returns the number of files written.
pub fn extract_archive(archive_path: &Path, root: &Path) -> Result<usize> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .map_err(|err| DataError::archive(archive_path, err))?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| DataError::archive(archive_path, err))?;
        let relative = entry
            .enclosed_name()
            .map(|name| name.to_path_buf())
            .ok_or_else(|| {
                DataError::archive(
                    archive_path,
                    format!("member '{}' escapes the extraction root", entry.name()),
                )
            })?;
        let target = root.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&target)?);
        io::copy(&mut entry, &mut out).map_err(|err| {
            DataError::archive(
                archive_path,
                format!("failed to extract '{}': {err}", entry.name()),
            )
        })?;
        out.flush()?;
        written += 1;
    }

    Ok(written)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::tempdir;

    struct BytesSource {
        bytes: Vec<u8>,
        calls: Cell<usize>,
    }

    impl ArchiveSource for BytesSource {
        fn fetch(&self, _url: &str, dest: &Path) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            fs::write(dest, &self.bytes)?;
            Ok(())
        }
    }

    fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buffer = io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);
            for (name, contents) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(contents.as_bytes()).unwrap();
            }
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    fn sha1_hex(bytes: &[u8]) -> String {
        format!("{:x}", Sha1::digest(bytes))
    }

    #[test]
    fn sha1_of_known_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha1_file(&path).unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert!(check_sha1(&path, "A9993E364706816ABA3E25717850C26C9CD0D89D").unwrap());
    }

    #[test]
    fn downloads_verifies_and_extracts() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested").join("corpus");
        let bytes = zip_bytes(&[("a.txt", "alpha"), ("sub/b.txt", "beta")]);
        let sha = sha1_hex(&bytes);
        let source = BytesSource {
            bytes,
            calls: Cell::new(0),
        };
        let descriptor = DownloadDescriptor {
            filename: "corpus.zip",
            url: "https://example.invalid/corpus.zip",
            sha1: &sha,
        };

        let outcome = ensure_archive(&root, &descriptor, &source).unwrap();
        assert_eq!(outcome, FetchOutcome::Downloaded { extracted: 2 });
        assert_eq!(fs::read_to_string(root.join("a.txt")).unwrap(), "alpha");
        assert_eq!(fs::read_to_string(root.join("sub/b.txt")).unwrap(), "beta");

        let again = ensure_archive(&root, &descriptor, &source).unwrap();
        assert_eq!(again, FetchOutcome::Cached);
        assert_eq!(source.calls.get(), 1);
    }

    #[test]
    fn corrupt_local_copy_is_replaced() {
        let dir = tempdir().unwrap();
        let bytes = zip_bytes(&[("a.txt", "fresh")]);
        let sha = sha1_hex(&bytes);
        fs::write(dir.path().join("corpus.zip"), b"stale bytes").unwrap();
        fs::write(dir.path().join("a.txt"), "old").unwrap();

        let source = BytesSource {
            bytes,
            calls: Cell::new(0),
        };
        let descriptor = DownloadDescriptor {
            filename: "corpus.zip",
            url: "https://example.invalid/corpus.zip",
            sha1: &sha,
        };
        ensure_archive(dir.path(), &descriptor, &source).unwrap();

        assert_eq!(source.calls.get(), 1);
        assert_eq!(fs::read_to_string(dir.path().join("a.txt")).unwrap(), "fresh");
    }

    #[test]
    fn checksum_mismatch_after_download_is_fatal() {
        let dir = tempdir().unwrap();
        let source = BytesSource {
            bytes: zip_bytes(&[("a.txt", "alpha")]),
            calls: Cell::new(0),
        };
        let descriptor = DownloadDescriptor {
            filename: "corpus.zip",
            url: "https://example.invalid/corpus.zip",
            sha1: "0000000000000000000000000000000000000000",
        };

        let err = ensure_archive(dir.path(), &descriptor, &source).unwrap_err();
        assert!(matches!(err, DataError::Integrity { .. }));
        assert!(!dir.path().join("corpus.zip").exists());
        assert!(!dir.path().join("a.txt").exists());
    }

    struct UnreachableSource;

    impl ArchiveSource for UnreachableSource {
        fn fetch(&self, url: &str, _dest: &Path) -> Result<()> {
            Err(DataError::retrieval(url, "connection refused"))
        }
    }

    #[test]
    fn retrieval_failure_propagates_without_extracting() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("corpus");
        let descriptor = DownloadDescriptor {
            filename: "corpus.zip",
            url: "https://example.invalid/corpus.zip",
            sha1: "0000000000000000000000000000000000000000",
        };

        let err = ensure_archive(&root, &descriptor, &UnreachableSource).unwrap_err();
        match err {
            DataError::Retrieval { url, .. } => assert_eq!(url, descriptor.url),
            other => panic!("unexpected error: {other}"),
        }
        assert!(root.is_dir());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }

    /// Yields some bytes, then fails as a dropped connection would.
    struct TruncatedBody {
        sent: bool,
    }

    impl Read for TruncatedBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"PK\x03\x04");
            Ok(4)
        }
    }

    #[test]
    fn interrupted_transfer_leaves_no_partial_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("corpus.zip");

        let err = stream_to_file(&mut TruncatedBody { sent: false }, &dest, "https://example.invalid")
            .unwrap_err();
        assert!(matches!(err, DataError::Retrieval { .. }));
        assert!(!dest.exists());
        assert!(!dir.path().join("corpus.zip.part").exists());

        let written = stream_to_file(&mut io::Cursor::new(b"zip bytes".to_vec()), &dest, "u").unwrap();
        assert_eq!(written, 9);
        assert_eq!(fs::read(&dest).unwrap(), b"zip bytes");
        assert!(!dir.path().join("corpus.zip.part").exists());
    }

    #[test]
    fn non_zip_payload_is_reported_as_corrupt() {
        let dir = tempdir().unwrap();
        let bytes = b"definitely not a zip".to_vec();
        let sha = sha1_hex(&bytes);
        let source = BytesSource {
            bytes,
            calls: Cell::new(0),
        };
        let descriptor = DownloadDescriptor {
            filename: "corpus.zip",
            url: "https://example.invalid/corpus.zip",
            sha1: &sha,
        };

        let err = ensure_archive(dir.path(), &descriptor, &source).unwrap_err();
        assert!(matches!(err, DataError::Archive { .. }));
    }
}
