use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{info, warn};

const WRITE_TIMEOUT: Duration = Duration::from_secs(1);
const BY_ID_DIR: &str = "/dev/serial/by-id";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no serial device found under {BY_ID_DIR}")]
    NoDevice,
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: tokio_serial::Error,
    },
    #[error("write failed: {0}")]
    Write(#[from] io::Error),
    #[error("write timed out")]
    Timeout,
}

/// Opens a fresh link to the panel. Split out as a trait so transport
/// recovery can be tested against fake links.
pub trait LinkOpener {
    type Link: AsyncWrite + Unpin + Send;

    fn open(&mut self) -> Result<Self::Link, TransportError>;
}

pub struct SerialOpener {
    path: Option<String>,
    baud: u32,
}

impl SerialOpener {
    pub fn new(path: Option<String>, baud: u32) -> Self {
        Self { path, baud }
    }
}

impl LinkOpener for SerialOpener {
    type Link = SerialStream;

    fn open(&mut self) -> Result<SerialStream, TransportError> {
        let path = match &self.path {
            Some(p) => p.clone(),
            None => autodetect(Path::new(BY_ID_DIR))?
                .to_string_lossy()
                .into_owned(),
        };
        tokio_serial::new(path.as_str(), self.baud)
            .open_native_async()
            .map_err(|source| TransportError::Open { path, source })
    }
}

/// Picks a stable by-id symlink rather than a ttyUSBn index, which can
/// change across reboots. Prefers USB CDC entries.
pub(crate) fn autodetect(dir: &Path) -> Result<PathBuf, TransportError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|_| TransportError::NoDevice)?
        .flatten()
        .map(|e| e.path())
        .collect();
    entries.sort();
    entries
        .iter()
        .find(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_ascii_lowercase().contains("usb"))
                .unwrap_or(false)
        })
        .or_else(|| entries.first())
        .cloned()
        .ok_or(TransportError::NoDevice)
}

/// Owns the serial link exclusively. On a write failure the link is closed
/// and reopened once for a single retry of the same frame; a second
/// failure is reported and the link stays closed until the next `send`.
pub struct SerialTransport<O: LinkOpener> {
    opener: O,
    link: Option<O::Link>,
}

impl<O: LinkOpener> SerialTransport<O> {
    pub fn new(opener: O) -> Self {
        Self { opener, link: None }
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    pub async fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let link = match &mut self.link {
            Some(link) => link,
            None => {
                let link = self.link.insert(self.opener.open()?);
                info!("serial link opened");
                link
            }
        };

        let first = write_frame(link, frame).await;
        let Err(err) = first else {
            return Ok(());
        };

        warn!(error = %err, "serial write failed, reopening link");
        self.link = None;
        let link = self.link.insert(self.opener.open()?);
        match write_frame(link, frame).await {
            Ok(()) => {
                info!("serial link recovered after reopen");
                Ok(())
            }
            Err(err) => {
                self.link = None;
                Err(err)
            }
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            let _ = link.shutdown().await;
            info!("serial link closed");
        }
    }
}

async fn write_frame<L: AsyncWrite + Unpin>(link: &mut L, frame: &[u8]) -> Result<(), TransportError> {
    let write = async {
        link.write_all(frame).await?;
        link.flush().await
    };
    match tokio::time::timeout(WRITE_TIMEOUT, write).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(TransportError::Write(err)),
        Err(_) => Err(TransportError::Timeout),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    pub(crate) struct FakeLink {
        healthy: bool,
        sink: Arc<Mutex<Vec<u8>>>,
    }

    impl AsyncWrite for FakeLink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            if self.healthy {
                self.sink.lock().unwrap().extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            } else {
                Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "device unplugged",
                )))
            }
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    /// Hands out links in order: `true` opens a healthy link, `false` a
    /// broken one. Counts every open; a script exhausted mid-run turns
    /// further opens into `NoDevice` errors.
    pub(crate) struct FakeOpener {
        script: Vec<bool>,
        opens: usize,
        sink: Arc<Mutex<Vec<u8>>>,
    }

    impl FakeOpener {
        pub(crate) fn new(script: Vec<bool>) -> Self {
            Self {
                script,
                opens: 0,
                sink: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub(crate) fn sink(&self) -> Arc<Mutex<Vec<u8>>> {
            self.sink.clone()
        }

        pub(crate) fn opens(&self) -> usize {
            self.opens
        }
    }

    impl LinkOpener for FakeOpener {
        type Link = FakeLink;

        fn open(&mut self) -> Result<FakeLink, TransportError> {
            let healthy = match self.script.get(self.opens) {
                Some(&h) => h,
                None => return Err(TransportError::NoDevice),
            };
            self.opens += 1;
            Ok(FakeLink {
                healthy,
                sink: self.sink.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeOpener;
    use super::*;

    #[tokio::test]
    async fn send_writes_one_frame_through_open_link() {
        let opener = FakeOpener::new(vec![true]);
        let sink = opener.sink();
        let mut transport = SerialTransport::new(opener);

        transport.send(b"frame-1").await.unwrap();
        assert!(transport.is_open());
        assert_eq!(sink.lock().unwrap().as_slice(), b"frame-1");
    }

    #[tokio::test]
    async fn disconnect_triggers_exactly_one_reopen_and_retry() {
        let opener = FakeOpener::new(vec![false, false, false]);
        let mut transport = SerialTransport::new(opener);

        let err = transport.send(b"frame-1").await.unwrap_err();
        assert!(matches!(err, TransportError::Write(_)));
        // One initial open plus one reopen, nothing more within the call.
        assert_eq!(transport.opener.opens(), 2);
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn retry_after_reopen_delivers_the_same_frame() {
        let opener = FakeOpener::new(vec![false, true]);
        let sink = opener.sink();
        let mut transport = SerialTransport::new(opener);

        transport.send(b"frame-1").await.unwrap();
        assert_eq!(transport.opener.opens(), 2);
        assert_eq!(sink.lock().unwrap().as_slice(), b"frame-1");
    }

    #[tokio::test]
    async fn failed_delivery_is_retried_on_the_next_send() {
        let opener = FakeOpener::new(vec![false, false, true]);
        let sink = opener.sink();
        let mut transport = SerialTransport::new(opener);

        assert!(transport.send(b"frame-1").await.is_err());
        transport.send(b"frame-2").await.unwrap();
        assert_eq!(transport.opener.opens(), 3);
        assert_eq!(sink.lock().unwrap().as_slice(), b"frame-2");
    }

    #[tokio::test]
    async fn reopen_failure_reports_and_leaves_link_closed() {
        let opener = FakeOpener::new(vec![false]);
        let mut transport = SerialTransport::new(opener);

        let err = transport.send(b"frame-1").await.unwrap_err();
        assert!(matches!(err, TransportError::NoDevice));
        assert!(!transport.is_open());
    }

    #[test]
    fn autodetect_prefers_usb_by_id_symlink() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pci-0000_00_1f"), b"").unwrap();
        std::fs::write(
            dir.path().join("usb-Synwit_USB_Virtual_COM-if00"),
            b"",
        )
        .unwrap();

        let picked = autodetect(dir.path()).unwrap();
        assert_eq!(
            picked.file_name().unwrap().to_string_lossy(),
            "usb-Synwit_USB_Virtual_COM-if00"
        );
    }

    #[test]
    fn autodetect_without_devices_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            autodetect(dir.path()),
            Err(TransportError::NoDevice)
        ));
        assert!(matches!(
            autodetect(&dir.path().join("missing")),
            Err(TransportError::NoDevice)
        ));
    }
}
