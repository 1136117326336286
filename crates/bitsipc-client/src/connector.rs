use std::net::Shutdown;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use bitsipc_frame::{FrameReader, FrameWriter};
use bitsipc_transport::IpcStream;
#[cfg(unix)]
use bitsipc_transport::UnixDomainSocket;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::dispatch::MessageSink;
use crate::error::Result;
use crate::message::{encode, Message};

/// One live socket to the message center.
///
/// The reader and writer halves are separate clones of the same socket
/// behind independent locks, so a blocked read never delays a send. A third
/// clone is kept for shutting the socket down from any thread.
pub struct Connection {
    path: PathBuf,
    reader: Mutex<FrameReader<IpcStream>>,
    writer: Mutex<FrameWriter<IpcStream>>,
    control: IpcStream,
}

impl Connection {
    /// Connect to the message center socket at `path`.
    pub fn open(path: impl AsRef<Path>, config: &ClientConfig) -> Result<Self> {
        #[cfg(not(unix))]
        {
            let _ = (path, config);
            return Err(bitsipc_transport::TransportError::Unsupported.into());
        }

        #[cfg(unix)]
        {
            let path = path.as_ref();
            let stream = UnixDomainSocket::connect(path)?;
            if let Some((uid, gid, pid)) = stream.peer_credentials() {
                debug!(uid, gid, pid, "message center peer credentials");
            }

            let frame_config = config.frame_config();
            let reader = FrameReader::with_config_ipc(stream.try_clone()?, frame_config.clone())?;
            let control = stream.try_clone()?;
            let writer = FrameWriter::with_config_ipc(stream, frame_config)?;

            info!(?path, "connected to message center");
            Ok(Self {
                path: path.to_path_buf(),
                reader: Mutex::new(reader),
                writer: Mutex::new(writer),
                control,
            })
        }
    }

    /// Encode `message` and write it as one frame.
    ///
    /// Encoding happens before the writer lock is taken; concurrent senders
    /// only serialize on the socket write itself.
    ///
    /// A frame cut short mid-write leaves the peer with an unterminated
    /// fragment. The socket is then shut down and every later send fails.
    pub fn send(&self, message: &Message) -> Result<()> {
        let payload = encode(message)?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writer.send(&payload) {
            warn!(
                kind = message.kind(),
                event = message.event_name().unwrap_or_default(),
                error = %err,
                "failed to send message"
            );
            if writer.is_broken() {
                if let Err(shutdown) = self.control.shutdown(Shutdown::Both) {
                    debug!(error = %shutdown, "socket shutdown after truncated frame failed");
                }
            }
            return Err(err.into());
        }
        Ok(())
    }

    /// Whether a truncated frame took this connection out of service.
    pub fn is_broken(&self) -> bool {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_broken()
    }

    /// Block until the reader half is free.
    pub(crate) fn lock_reader(&self) -> MutexGuard<'_, FrameReader<IpcStream>> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the reader half unless another thread is reading.
    pub(crate) fn try_lock_reader(&self) -> Option<MutexGuard<'_, FrameReader<IpcStream>>> {
        match self.reader.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Shut both directions down. A reader blocked on the socket wakes up
    /// with end-of-stream.
    pub fn shutdown(&self) -> Result<()> {
        self.control.shutdown(Shutdown::Both)?;
        Ok(())
    }

    /// Socket path this connection was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MessageSink for Connection {
    fn send(&self, message: &Message) -> Result<()> {
        Connection::send(self, message)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
