//! Atomic plugin binary installation.
//!
//! Downloads stream to `{dest}.tmp`, are marked executable, and are renamed
//! into place, so a reader observing the final path sees either a complete
//! executable or nothing. Failed downloads remove the temp file and are not
//! retried here; the caller decides whether to retry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use quay_types::QuayError;

/// Downloads plugin binaries over HTTP.
pub struct Installer {
    http: reqwest::Client,
}

impl Installer {
    /// Build an installer whose downloads are bounded by `download_timeout`.
    pub fn new(download_timeout: Duration) -> Result<Self, QuayError> {
        let http = reqwest::Client::builder()
            .timeout(download_timeout)
            .build()
            .map_err(|e| QuayError::InstallFailed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }

    /// Download `url` to `dest`, atomically replacing any existing file.
    ///
    /// Only `200 OK` is accepted. The executable bit is set before the final
    /// rename.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<(), QuayError> {
        let tmp = tmp_path(dest);
        match self.download_to_tmp(url, dest, &tmp).await {
            Ok(()) => {
                info!(url, dest = %dest.display(), "plugin binary installed");
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                Err(e)
            }
        }
    }

    async fn download_to_tmp(&self, url: &str, dest: &Path, tmp: &Path) -> Result<(), QuayError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                QuayError::InstallFailed(format!(
                    "failed to create {}: {e}",
                    parent.display()
                ))
            })?;
            #[cfg(unix)]
            {
                use std::fs::Permissions;
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(parent, Permissions::from_mode(0o755))
                    .await
                    .map_err(|e| {
                        QuayError::InstallFailed(format!(
                            "failed to set permissions on {}: {e}",
                            parent.display()
                        ))
                    })?;
            }
        }

        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| QuayError::InstallFailed(format!("download failed: {e}")))?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(QuayError::InstallFailed(format!(
                "download failed: HTTP {}",
                response.status().as_u16()
            )));
        }

        let mut file = tokio::fs::File::create(tmp).await.map_err(|e| {
            QuayError::InstallFailed(format!("failed to create {}: {e}", tmp.display()))
        })?;

        let mut bytes_written: u64 = 0;
        loop {
            let chunk = response
                .chunk()
                .await
                .map_err(|e| QuayError::InstallFailed(format!("download interrupted: {e}")))?;
            let Some(chunk) = chunk else {
                break;
            };
            file.write_all(&chunk).await.map_err(|e| {
                QuayError::InstallFailed(format!("failed to write {}: {e}", tmp.display()))
            })?;
            bytes_written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| {
            QuayError::InstallFailed(format!("failed to flush {}: {e}", tmp.display()))
        })?;
        drop(file);

        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(tmp, Permissions::from_mode(0o755))
                .await
                .map_err(|e| {
                    QuayError::InstallFailed(format!(
                        "failed to make {} executable: {e}",
                        tmp.display()
                    ))
                })?;
        }

        tokio::fs::rename(tmp, dest).await.map_err(|e| {
            QuayError::InstallFailed(format!(
                "failed to move {} into place: {e}",
                tmp.display()
            ))
        })?;

        debug!(url, bytes = bytes_written, "download complete");
        Ok(())
    }
}

/// Verify the SHA-256 digest of `path` against an expected hex string,
/// case-insensitively. An empty expectation skips verification.
pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), QuayError> {
    if expected.is_empty() {
        return Ok(());
    }

    let mut file = std::fs::File::open(path).map_err(|e| {
        QuayError::InstallFailed(format!(
            "failed to open {} for checksum verification: {e}",
            path.display()
        ))
    })?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|e| {
        QuayError::InstallFailed(format!("failed to hash {}: {e}", path.display()))
    })?;
    let actual = hex::encode(hasher.finalize());

    if !actual.eq_ignore_ascii_case(expected) {
        return Err(QuayError::InstallFailed(format!(
            "checksum mismatch: expected {expected}, got {actual}"
        )));
    }
    Ok(())
}

fn tmp_path(dest: &Path) -> PathBuf {
    let mut os = dest.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;

    async fn spawn_fixture(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn download_places_executable_at_dest() {
        let addr = spawn_fixture(Router::new().route("/echo", get(|| async { "#!/bin/sh\nexit 0\n" }))).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("util").join("echo_1.0.0");

        let installer = Installer::new(Duration::from_secs(5)).unwrap();
        installer
            .download(&format!("http://{addr}/echo"), &dest)
            .await
            .unwrap();

        let content = std::fs::read_to_string(&dest).unwrap();
        assert!(content.starts_with("#!/bin/sh"));
        assert!(!tmp_path(&dest).exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[tokio::test]
    async fn non_200_status_leaves_nothing_behind() {
        let addr = spawn_fixture(
            Router::new().route("/gone", get(|| async { StatusCode::INTERNAL_SERVER_ERROR })),
        )
        .await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("util").join("gone_1.0.0");

        let installer = Installer::new(Duration::from_secs(5)).unwrap();
        let err = installer
            .download(&format!("http://{addr}/gone"), &dest)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("HTTP 500"));
        assert!(!dest.exists());
        assert!(!tmp_path(&dest).exists());
    }

    #[tokio::test]
    async fn interrupted_download_leaves_nothing_behind() {
        let addr = spawn_fixture(Router::new().route(
            "/cut",
            get(|| async {
                // One chunk, then the connection drops mid-body.
                let chunks: Vec<Result<&'static [u8], std::io::Error>> = vec![
                    Ok(b"#!/bin/sh".as_slice()),
                    Err(std::io::Error::new(
                        std::io::ErrorKind::ConnectionAborted,
                        "cut",
                    )),
                ];
                axum::body::Body::from_stream(tokio_stream::iter(chunks))
            }),
        ))
        .await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("util").join("cut_1.0.0");

        let installer = Installer::new(Duration::from_secs(5)).unwrap();
        let err = installer
            .download(&format!("http://{addr}/cut"), &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, QuayError::InstallFailed(_)));
        assert!(!dest.exists());
        assert!(!tmp_path(&dest).exists());
    }

    #[tokio::test]
    async fn unreachable_server_is_an_install_failure() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("util").join("nope_1.0.0");

        let installer = Installer::new(Duration::from_secs(2)).unwrap();
        // Port 1 on loopback is never listening in test environments.
        let err = installer
            .download("http://127.0.0.1:1/nope", &dest)
            .await
            .unwrap_err();

        assert!(matches!(err, QuayError::InstallFailed(_)));
        assert!(!dest.exists());
        assert!(!tmp_path(&dest).exists());
    }

    #[tokio::test]
    async fn download_overwrites_existing_file_atomically() {
        let addr =
            spawn_fixture(Router::new().route("/echo", get(|| async { "new contents" }))).await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("util").join("echo_1.0.0");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, "old contents").unwrap();

        let installer = Installer::new(Duration::from_secs(5)).unwrap();
        installer
            .download(&format!("http://{addr}/echo"), &dest)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "new contents");
    }

    #[test]
    fn checksum_empty_expectation_skips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        std::fs::write(&path, "payload").unwrap();
        assert!(verify_checksum(&path, "").is_ok());
    }

    #[test]
    fn checksum_matches_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        std::fs::write(&path, "payload").unwrap();

        let digest = hex::encode(Sha256::digest(b"payload"));
        assert!(verify_checksum(&path, &digest).is_ok());
        assert!(verify_checksum(&path, &digest.to_uppercase()).is_ok());
    }

    #[test]
    fn checksum_mismatch_reports_both_digests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin");
        std::fs::write(&path, "payload").unwrap();

        let wrong = "0".repeat(64);
        let err = verify_checksum(&path, &wrong).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
        assert!(err.to_string().contains(&wrong));
    }

    #[test]
    fn checksum_of_missing_file_fails() {
        let err = verify_checksum(Path::new("/nonexistent/bin"), "abc").unwrap_err();
        assert!(matches!(err, QuayError::InstallFailed(_)));
    }
}
