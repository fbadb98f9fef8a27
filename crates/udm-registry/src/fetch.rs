//! Archive download and extraction.
//!
//! Archives are fetched from `<host>/<namespace>/<package>/archive/<tag>.tar.gz`
//! into a staging directory created inside the caller-supplied work
//! directory. The staging directory is removed when the returned
//! [`ExtractedArchive`] is dropped, so a failed download or a half-finished
//! extraction never leaves anything behind.

use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tempfile::TempDir;
use tracing::debug;

use crate::error::{RegistryError, Result};
use crate::manifest::DependencyId;

/// Name of the transient download inside the staging directory.
pub const ARCHIVE_FILE: &str = "archive.tar.gz";

/// Build the archive URL for a tag or branch.
pub fn archive_url(host: &str, id: &DependencyId, tag: &str) -> String {
    format!(
        "{}/{}/{}/archive/{}.tar.gz",
        host.trim_end_matches('/'),
        id.namespace,
        id.package,
        tag
    )
}

/// An archive unpacked into a staging directory.
#[derive(Debug)]
pub struct ExtractedArchive {
    root: PathBuf,
    // Dropped last: removes whatever was not moved out of `root`.
    _staging: TempDir,
}

impl ExtractedArchive {
    /// Wrap a staging directory whose top-level entry `root_name` holds the
    /// package contents.
    pub fn new(staging: TempDir, root_name: &str) -> Self {
        ExtractedArchive {
            root: staging.path().join(root_name),
            _staging: staging,
        }
    }

    /// The extracted top-level directory (conventionally `<package>-<version>`).
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Abstract archive retrieval backend.
pub trait ArchiveFetcher {
    /// Download and extract the archive of `id` at `tag`, staging under `work_dir`.
    fn fetch(&self, id: &DependencyId, tag: &str, work_dir: &Path) -> Result<ExtractedArchive>;
}

impl<T: ArchiveFetcher + ?Sized> ArchiveFetcher for &T {
    fn fetch(&self, id: &DependencyId, tag: &str, work_dir: &Path) -> Result<ExtractedArchive> {
        (**self).fetch(id, tag, work_dir)
    }
}

/// Fetches archives over HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    host: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        HttpFetcher {
            host: host.into(),
            timeout,
        }
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, id: &DependencyId, tag: &str, work_dir: &Path) -> Result<ExtractedArchive> {
        let url = archive_url(&self.host, id, tag);
        let staging = tempfile::Builder::new()
            .prefix(".udm-staging-")
            .tempdir_in(work_dir)
            .map_err(|e| RegistryError::CacheError {
                path: work_dir.to_path_buf(),
                detail: format!("creating staging dir: {e}"),
            })?;

        let archive = staging.path().join(ARCHIVE_FILE);
        download(&url, &archive, self.timeout)?;

        let extracted = extract_archive(&archive, staging.path());
        // The artifact goes away whether or not extraction worked.
        if let Err(e) = std::fs::remove_file(&archive) {
            debug!(path = %archive.display(), error = %e, "could not remove archive");
        }
        let root_name = extracted?.unwrap_or_else(|| {
            format!("{}-{}", id.package, tag.trim_start_matches(['v', 'V']))
        });

        Ok(ExtractedArchive::new(staging, &root_name))
    }
}

/// Download `url` to `dest`.
pub fn download(url: &str, dest: &Path, timeout: Duration) -> Result<()> {
    debug!(%url, "downloading");
    let response = ureq::get(url)
        .timeout(timeout)
        .call()
        .map_err(|e| RegistryError::Download {
            url: url.to_string(),
            detail: e.to_string(),
        })?;

    let mut out = File::create(dest).map_err(|e| RegistryError::Download {
        url: url.to_string(),
        detail: format!("creating {}: {e}", dest.display()),
    })?;
    let mut reader = response.into_reader();
    std::io::copy(&mut reader, &mut out).map_err(|e| RegistryError::Download {
        url: url.to_string(),
        detail: format!("reading body: {e}"),
    })?;
    Ok(())
}

/// Extract a `.tar.gz` into `dest`.
///
/// Returns the first top-level directory seen, if any. Entries with
/// absolute paths or `..` components are rejected.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<Option<String>> {
    let extract_err = |detail: String| RegistryError::Extract {
        path: archive.to_path_buf(),
        detail,
    };

    let file = File::open(archive).map_err(|e| extract_err(format!("opening: {e}")))?;
    let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));
    let mut root: Option<String> = None;

    for entry in tar.entries().map_err(|e| extract_err(e.to_string()))? {
        let mut entry = entry.map_err(|e| extract_err(e.to_string()))?;
        if matches!(
            entry.header().entry_type(),
            EntryType::XGlobalHeader | EntryType::XHeader
        ) {
            continue;
        }

        let path = entry
            .path()
            .map_err(|e| extract_err(e.to_string()))?
            .into_owned();
        let mut top = None;
        let mut depth = 0;
        for component in path.components() {
            match component {
                Component::Normal(name) => {
                    depth += 1;
                    if top.is_none() {
                        top = Some(name.to_string_lossy().into_owned());
                    }
                }
                Component::CurDir => {}
                _ => {
                    return Err(extract_err(format!(
                        "unsafe entry path {}",
                        path.display()
                    )))
                }
            }
        }
        // A loose top-level file cannot be the package root.
        let names_dir = depth > 1 || entry.header().entry_type().is_dir();
        if root.is_none() && names_dir {
            root = top;
        }

        entry
            .unpack_in(dest)
            .map_err(|e| extract_err(format!("unpacking {}: {e}", path.display())))?;
    }

    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn id(key: &str) -> DependencyId {
        DependencyId::parse(key).unwrap()
    }

    fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    /// Serve `body` with `status` to a single HTTP request.
    fn serve_once(status: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let mut request = Vec::new();
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
            }
        });
        format!("http://{addr}")
    }

    fn leftovers(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect()
    }

    #[test]
    fn archive_url_shape() {
        assert_eq!(
            archive_url("https://github.com", &id("acme/foo"), "v2.1.0"),
            "https://github.com/acme/foo/archive/v2.1.0.tar.gz"
        );
        assert_eq!(
            archive_url("https://github.com/", &id("acme/baz"), "master"),
            "https://github.com/acme/baz/archive/master.tar.gz"
        );
    }

    #[test]
    fn extract_reports_top_level_dir() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join(ARCHIVE_FILE);
        std::fs::write(
            &archive,
            tarball(&[
                ("foo-2.1.0/README.md", &b"hello"[..]),
                ("foo-2.1.0/src/lib.js", &b"module.exports = 1;"[..]),
            ]),
        )
        .unwrap();

        let root = extract_archive(&archive, dir.path()).unwrap();
        assert_eq!(root.as_deref(), Some("foo-2.1.0"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("foo-2.1.0/README.md")).unwrap(),
            "hello"
        );
        assert!(dir.path().join("foo-2.1.0/src/lib.js").is_file());
    }

    #[test]
    fn extract_skips_top_level_files_for_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join(ARCHIVE_FILE);
        std::fs::write(
            &archive,
            tarball(&[
                ("NOTICE", &b"top-level file"[..]),
                ("bar-1.0.0/index.js", &b"bar"[..]),
            ]),
        )
        .unwrap();

        let root = extract_archive(&archive, dir.path()).unwrap();
        assert_eq!(root.as_deref(), Some("bar-1.0.0"));
        assert!(dir.path().join("bar-1.0.0").is_dir());
    }

    #[test]
    fn extract_files_only_has_no_root() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join(ARCHIVE_FILE);
        std::fs::write(&archive, tarball(&[("README", &b"flat"[..])])).unwrap();

        assert_eq!(extract_archive(&archive, dir.path()).unwrap(), None);
    }

    #[test]
    fn extract_rejects_parent_components() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join(ARCHIVE_FILE);

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        let mut header = tar::Header::new_gnu();
        let name = b"../evil";
        header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
        header.set_size(1);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        builder.append(&header, &b"x"[..]).unwrap();
        std::fs::write(&archive, builder.into_inner().unwrap().finish().unwrap()).unwrap();

        let staging = dir.path().join("staging");
        std::fs::create_dir(&staging).unwrap();
        let err = extract_archive(&archive, &staging).unwrap_err();
        assert!(matches!(err, RegistryError::Extract { .. }));
        assert!(!dir.path().join("evil").exists());
    }

    #[test]
    fn extract_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join(ARCHIVE_FILE);
        std::fs::write(&archive, b"definitely not gzip").unwrap();

        let err = extract_archive(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, RegistryError::Extract { .. }));
    }

    #[test]
    fn http_fetch_extracts_into_staging() {
        let host = serve_once("200 OK", tarball(&[("foo-2.1.0/index.js", &b"ok"[..])]));
        let work = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(host, Duration::from_secs(10));

        let extracted = fetcher.fetch(&id("acme/foo"), "v2.1.0", work.path()).unwrap();
        assert!(extracted.root().ends_with("foo-2.1.0"));
        assert!(extracted.root().join("index.js").is_file());
        assert!(!extracted.root().parent().unwrap().join(ARCHIVE_FILE).exists());

        drop(extracted);
        assert!(leftovers(work.path()).is_empty());
    }

    #[test]
    fn http_error_status_is_download_error() {
        let host = serve_once("404 Not Found", b"missing".to_vec());
        let work = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(host, Duration::from_secs(10));

        let err = fetcher.fetch(&id("acme/foo"), "v9.9.9", work.path()).unwrap_err();
        assert!(matches!(err, RegistryError::Download { .. }));
        assert!(leftovers(work.path()).is_empty());
    }

    #[test]
    fn unreachable_host_leaves_nothing_behind() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let work = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(format!("http://{addr}"), Duration::from_secs(5));

        let err = fetcher.fetch(&id("acme/foo"), "v1.0.0", work.path()).unwrap_err();
        assert!(matches!(err, RegistryError::Download { .. }));
        assert!(leftovers(work.path()).is_empty());
    }

    #[test]
    fn corrupt_archive_is_extract_error_and_cleaned() {
        let host = serve_once("200 OK", b"not a tarball".to_vec());
        let work = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(host, Duration::from_secs(10));

        let err = fetcher.fetch(&id("acme/foo"), "v1.0.0", work.path()).unwrap_err();
        assert!(matches!(err, RegistryError::Extract { .. }));
        assert!(leftovers(work.path()).is_empty());
    }
}
