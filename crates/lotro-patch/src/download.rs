//! Streaming a single file body into a temporary sibling of its destination

use futures::StreamExt;
use md5::{Digest, Md5};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::cancel::CancelFlag;
use crate::error::{FailureReason, PatchError, Result};
use crate::paths::temp_path;
use crate::transport::HttpClient;

/// A temporary download file that is removed on drop unless committed
#[derive(Debug)]
pub struct TempFile {
    path: PathBuf,
    armed: bool,
}

impl TempFile {
    /// Claim the temp path for `dest`
    pub fn for_destination(dest: &Path) -> Self {
        Self {
            path: temp_path(dest),
            armed: true,
        }
    }

    /// Location of the temp file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically move the temp file onto `dest`
    pub async fn commit(mut self, dest: &Path) -> std::io::Result<()> {
        tokio::fs::rename(&self.path, dest).await?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove {}: {e}", self.path.display()),
        }
    }
}

/// What a finished transfer produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Bytes written
    pub bytes: u64,
    /// Lowercase hex MD5 of the bytes written
    pub md5_hex: String,
}

/// Settings for streaming one file
pub struct Downloader<'a> {
    /// Client used for the GET
    pub http: &'a HttpClient,
    /// Flag raced against every network read
    pub cancel: &'a CancelFlag,
    /// Longest wait for headers or the next chunk
    pub inactivity_timeout: Duration,
    /// Minimum new bytes between `on_bytes` calls
    pub progress_interval: u64,
}

impl Downloader<'_> {
    /// Stream `url` into `temp`, hashing on the way.
    ///
    /// `on_bytes` sees the running byte count at most once per
    /// `progress_interval` bytes, and always once with the final count.
    /// Cancellation and the inactivity window are checked around every
    /// network read.
    pub async fn fetch_to(
        &self,
        item: &str,
        url: &Url,
        temp: &TempFile,
        mut on_bytes: impl FnMut(u64),
    ) -> Result<Transfer> {
        let failed = |reason| PatchError::DownloadFailed {
            item: item.to_string(),
            reason,
        };

        let response = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(PatchError::Cancelled),
            response = tokio::time::timeout(self.inactivity_timeout, self.http.get(url)) => {
                match response {
                    Err(_) => return Err(failed(FailureReason::Timeout)),
                    Ok(Err(e)) => return Err(failed(FailureReason::from_reqwest(&e))),
                    Ok(Ok(response)) => response,
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(failed(FailureReason::Status(status.as_u16())));
        }

        let io_failed = |e: std::io::Error| failed(FailureReason::Io(e.to_string()));
        let mut file = tokio::fs::File::create(temp.path())
            .await
            .map_err(io_failed)?;

        let mut hasher = Md5::new();
        let mut stream = response.bytes_stream();
        let mut received = 0u64;
        let mut reported = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(PatchError::Cancelled),
                next = tokio::time::timeout(self.inactivity_timeout, stream.next()) => next,
            };

            let chunk = match next {
                Err(_) => return Err(failed(FailureReason::Timeout)),
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(failed(FailureReason::from_reqwest(&e))),
                Ok(Some(Ok(chunk))) => chunk,
            };

            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(io_failed)?;
            received += chunk.len() as u64;

            if received - reported >= self.progress_interval {
                on_bytes(received);
                reported = received;
            }
        }

        file.flush().await.map_err(io_failed)?;
        file.sync_all().await.map_err(io_failed)?;
        drop(file);

        if reported != received || received == 0 {
            on_bytes(received);
        }

        debug!("{item}: received {received} bytes from {url}");
        Ok(Transfer {
            bytes: received,
            md5_hex: hex::encode(hasher.finalize()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::config::PatchConfig;
    use crate::transport::parse_url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downloader<'a>(http: &'a HttpClient, cancel: &'a CancelFlag) -> Downloader<'a> {
        Downloader {
            http,
            cancel,
            inactivity_timeout: Duration::from_secs(5),
            progress_interval: 1000,
        }
    }

    #[test]
    fn uncommitted_temp_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.bin");
        let temp = TempFile::for_destination(&dest);
        std::fs::write(temp.path(), b"partial").unwrap();
        let temp_path = temp.path().to_path_buf();
        drop(temp);
        assert!(!temp_path.exists());
    }

    #[tokio::test]
    async fn streams_and_hashes() {
        let server = MockServer::start().await;
        let body = vec![7u8; 2500];
        Mock::given(method("GET"))
            .and(path("/files/a.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let http = HttpClient::new(&PatchConfig::default()).unwrap();
        let cancel = CancelFlag::new();
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.bin");
        let temp = TempFile::for_destination(&dest);

        let mut counts = Vec::new();
        let url = parse_url(&format!("{}/files/a.bin", server.uri())).unwrap();
        let transfer = downloader(&http, &cancel)
            .fetch_to("a.bin", &url, &temp, |n| counts.push(n))
            .await
            .unwrap();

        assert_eq!(transfer.bytes, 2500);
        assert_eq!(transfer.md5_hex, hex::encode(Md5::digest(&body)));
        assert_eq!(counts.last(), Some(&2500));
        assert!(counts.windows(2).all(|w| w[0] < w[1]));

        temp.commit(&dest).await.unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert!(!dir.path().join("a.bin.tmp").exists());
    }

    #[tokio::test]
    async fn error_status_fails_the_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let http = HttpClient::new(&PatchConfig::default()).unwrap();
        let cancel = CancelFlag::new();
        let dir = tempfile::tempdir().unwrap();
        let temp = TempFile::for_destination(&dir.path().join("b.bin"));

        let url = parse_url(&format!("{}/b.bin", server.uri())).unwrap();
        match downloader(&http, &cancel)
            .fetch_to("b.bin", &url, &temp, |_| {})
            .await
        {
            Err(PatchError::DownloadFailed { item, reason }) => {
                assert_eq!(item, "b.bin");
                assert_eq!(reason, FailureReason::Status(500));
            }
            other => panic!("expected DownloadFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inactivity_window_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let http = HttpClient::new(&PatchConfig::default()).unwrap();
        let cancel = CancelFlag::new();
        let dir = tempfile::tempdir().unwrap();
        let temp = TempFile::for_destination(&dir.path().join("c.bin"));

        let mut downloader = downloader(&http, &cancel);
        downloader.inactivity_timeout = Duration::from_millis(100);

        let url = parse_url(&format!("{}/c.bin", server.uri())).unwrap();
        let err = downloader
            .fetch_to("c.bin", &url, &temp, |_| {})
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PatchError::DownloadFailed {
                reason: FailureReason::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancellation_aborts_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"slow".to_vec())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let http = HttpClient::new(&PatchConfig::default()).unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let dir = tempfile::tempdir().unwrap();
        let temp = TempFile::for_destination(&dir.path().join("d.bin"));

        let url = parse_url(&format!("{}/d.bin", server.uri())).unwrap();
        let started = std::time::Instant::now();
        let err = downloader(&http, &cancel)
            .fetch_to("d.bin", &url, &temp, |_| {})
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
