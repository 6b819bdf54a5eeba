//! Opening the device node as an async byte source.
//!
//! Character devices and FIFOs are opened non-blocking and driven by the
//! reactor through [`AsyncFd`], so a pending read can be dropped at any time.
//! Regular files (recorded captures) cannot be registered with epoll and are
//! read through [`tokio::fs::File`] instead.

use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, ReadBuf};
use tracing::debug;

/// Byte source the reader loop pulls records from.
pub type EventSource = Box<dyn AsyncRead + Send + Unpin>;

pub struct DeviceStream {
    inner: AsyncFd<File>,
}

impl DeviceStream {
    fn new(file: File) -> io::Result<Self> {
        Ok(Self {
            inner: AsyncFd::new(file)?,
        })
    }
}

impl AsyncRead for DeviceStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.inner.poll_read_ready(cx))?;

            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| inner.get_ref().read(unfilled)) {
                Ok(Ok(len)) => {
                    buf.advance(len);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(err)) => return Poll::Ready(Err(err)),
                Err(_would_block) => continue,
            }
        }
    }
}

/// Opens `path` read-only. Fails outside a tokio runtime.
pub fn open_device(path: &Path) -> io::Result<EventSource> {
    if let Err(e) = tokio::runtime::Handle::try_current() {
        return Err(io::Error::new(io::ErrorKind::Other, e));
    }

    let file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)?;

    if file.metadata()?.is_file() {
        debug!("{} is a regular file, reading it as a capture", path.display());
        return Ok(Box::new(tokio::fs::File::from_std(file)));
    }

    debug!("Registering {} with the reactor", path.display());
    Ok(Box::new(DeviceStream::new(file)?))
}
