use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Config;
use crate::error::ChannelError;

#[cfg(unix)]
pub use unix_impl::{ChannelListener, ClientStream, ServerStream};
#[cfg(windows)]
pub use windows_impl::{ChannelListener, ClientStream, ServerStream};

/// Where channels live and how long a connect may take.
#[derive(Debug, Clone)]
pub struct ChannelSpace {
    pub runtime_dir: PathBuf,
    pub connect_timeout: Duration,
}

impl ChannelSpace {
    pub fn new(runtime_dir: PathBuf, connect_timeout: Duration) -> Self {
        Self {
            runtime_dir,
            connect_timeout,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.runtime_dir(), cfg.connect_timeout())
    }

    /// Open a client connection to `channel`, bounded by `connect_timeout`.
    pub async fn connect(&self, channel: &str) -> Result<ClientStream, ChannelError> {
        log::debug!("connect: channel={}", channel);
        match tokio::time::timeout(self.connect_timeout, self.connect_raw(channel)).await {
            Ok(Ok(s)) => {
                log::debug!("connect: ok channel={}", channel);
                Ok(s)
            }
            Ok(Err(e)) => Err(classify_connect_error(channel, e)),
            Err(_) => Err(ChannelError::Transport {
                channel: channel.to_string(),
                source: io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", self.connect_timeout),
                ),
            }),
        }
    }
}

fn classify_connect_error(channel: &str, e: io::Error) -> ChannelError {
    match e.kind() {
        // No socket file / no pipe, or a socket file nobody listens on.
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => ChannelError::NoListener {
            channel: channel.to_string(),
        },
        _ => ChannelError::Transport {
            channel: channel.to_string(),
            source: e,
        },
    }
}

/// Write one message and close our side. The peer sees end-of-stream as the message boundary.
pub async fn send_payload<S>(stream: &mut S, channel: &str, payload: &[u8]) -> Result<(), ChannelError>
where
    S: AsyncWrite + Unpin,
{
    log::debug!("send_payload: channel={} bytes={}", channel, payload.len());
    let res = async {
        stream.write_all(payload).await?;
        stream.flush().await?;
        stream.shutdown().await
    }
    .await;
    res.map_err(|source| ChannelError::WriteFailure {
        channel: channel.to_string(),
        source,
    })
}

/// Read one whole message (until the peer closes). Oversized payloads are an error.
pub async fn read_payload<S>(stream: &mut S, max_bytes: usize) -> io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = (max_bytes as u64).saturating_add(1);
    let n = (&mut *stream).take(limit).read_to_end(&mut buf).await?;
    if n > max_bytes {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("payload exceeds {} bytes", max_bytes),
        ));
    }
    Ok(buf)
}

/// Park on a connection until the peer goes away (end-of-stream or error).
pub async fn wait_for_close<S>(stream: &mut S)
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 256];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => return,
            // The default instance never writes on a watch connection; ignore stray bytes.
            Ok(_) => continue,
            Err(e) => {
                log::debug!("wait_for_close: read error: {e:?}");
                return;
            }
        }
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::fs::File;
    use std::io;
    use std::os::unix::fs::{MetadataExt, PermissionsExt};
    use std::os::unix::io::AsRawFd;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, Instant};

    use tokio::net::{UnixListener, UnixStream};

    use super::ChannelSpace;
    use crate::error::ChannelError;
    use crate::paths::{reclaim_lock_path, socket_path};

    pub type ClientStream = UnixStream;
    pub type ServerStream = UnixStream;

    /// An exclusively bound channel. Dropping it removes the socket file and,
    /// when nobody else is binding, its lock file.
    #[derive(Debug)]
    pub struct ChannelListener {
        channel: String,
        path: PathBuf,
        lock_path: PathBuf,
        inner: UnixListener,
    }

    impl ChannelListener {
        pub fn channel(&self) -> &str {
            &self.channel
        }

        pub async fn accept(&mut self) -> io::Result<ServerStream> {
            let (stream, _addr) = self.inner.accept().await?;
            Ok(stream)
        }
    }

    impl Drop for ChannelListener {
        fn drop(&mut self) {
            // Unlink while the socket is still listening, so nobody can reclaim the path in between.
            let _ = std::fs::remove_file(&self.path);
            remove_lock_file(&self.lock_path);
        }
    }

    impl ChannelSpace {
        pub(super) async fn connect_raw(&self, channel: &str) -> io::Result<UnixStream> {
            UnixStream::connect(socket_path(&self.runtime_dir, channel)).await
        }

        /// Claim `channel` exclusively.
        ///
        /// A socket file left behind by a crashed process is reclaimed: bind reports
        /// `AddrInUse`, a probe connect is refused, the file is removed and bind retried.
        /// Every bind runs under a sidecar flock so two processes never reclaim the same
        /// path, and a probe never lands between another binder's bind() and listen().
        pub async fn bind(&self, channel: &str) -> Result<ChannelListener, ChannelError> {
            let transport = |source: io::Error| ChannelError::Transport {
                channel: channel.to_string(),
                source,
            };

            ensure_runtime_dir(&self.runtime_dir).map_err(transport)?;
            let path = socket_path(&self.runtime_dir, channel);
            let lock_path = reclaim_lock_path(&self.runtime_dir, channel);
            let _lock = acquire_lock(&lock_path, self.connect_timeout)
                .await
                .map_err(transport)?;

            match UnixListener::bind(&path) {
                Ok(inner) => return Ok(self.listener(channel, path, lock_path, inner)),
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {}
                Err(e) => return Err(transport(e)),
            }

            let probe = tokio::time::timeout(self.connect_timeout, UnixStream::connect(&path)).await;
            match probe {
                Ok(Err(e))
                    if matches!(
                        e.kind(),
                        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
                    ) =>
                {
                    log::info!("bind: reclaiming stale socket {}", path.display());
                    match std::fs::remove_file(&path) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => {
                            log::warn!("bind: remove stale socket {} failed: {e:?}", path.display());
                            return Err(transport(e));
                        }
                    }
                }
                // Someone is listening (or hung while accepting): the channel is taken.
                _ => {
                    return Err(ChannelError::BindConflict {
                        channel: channel.to_string(),
                    })
                }
            }

            match UnixListener::bind(&path) {
                Ok(inner) => Ok(self.listener(channel, path, lock_path, inner)),
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(ChannelError::BindConflict {
                    channel: channel.to_string(),
                }),
                Err(e) => Err(transport(e)),
            }
        }

        fn listener(
            &self,
            channel: &str,
            path: PathBuf,
            lock_path: PathBuf,
            inner: UnixListener,
        ) -> ChannelListener {
            let _ = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600));
            log::debug!("bind: ok channel={} path={}", channel, path.display());
            ChannelListener {
                channel: channel.to_string(),
                path,
                lock_path,
                inner,
            }
        }
    }

    fn ensure_runtime_dir(dir: &Path) -> io::Result<()> {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            let _ = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700));
        }
        Ok(())
    }

    /// flock(LOCK_EX | LOCK_NB) polled until `wait` elapses. The lock drops with the file.
    ///
    /// Lock files get unlinked by `remove_lock_file`, so a lock taken on an inode that
    /// is no longer at `lock_path` is worthless: reopen and try again.
    async fn acquire_lock(lock_path: &Path, wait: Duration) -> io::Result<File> {
        let deadline = Instant::now() + wait;
        loop {
            let f = std::fs::OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(lock_path)?;

            loop {
                if try_flock(&f)? {
                    break;
                }
                if Instant::now() >= deadline {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("lock busy: {}", lock_path.display()),
                    ));
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            if is_current(&f, lock_path) {
                return Ok(f);
            }
            log::debug!("bind: lock file {} replaced, retrying", lock_path.display());
        }
    }

    /// Ok(false) means another process holds the lock.
    fn try_flock(f: &File) -> io::Result<bool> {
        let rc = unsafe { libc::flock(f.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc == 0 {
            return Ok(true);
        }
        let e = io::Error::last_os_error();
        if e.raw_os_error() == Some(libc::EWOULDBLOCK) {
            return Ok(false);
        }
        Err(e)
    }

    fn is_current(f: &File, lock_path: &Path) -> bool {
        match (f.metadata(), std::fs::metadata(lock_path)) {
            (Ok(held), Ok(on_disk)) => held.dev() == on_disk.dev() && held.ino() == on_disk.ino(),
            _ => false,
        }
    }

    /// Unlink the lock file, but only while holding its lock. If someone is mid-bind
    /// the file stays and the next listener to drop cleans it up.
    fn remove_lock_file(lock_path: &Path) {
        let Ok(f) = std::fs::OpenOptions::new().read(true).write(true).open(lock_path) else {
            return;
        };
        if matches!(try_flock(&f), Ok(true)) && is_current(&f, lock_path) {
            let _ = std::fs::remove_file(lock_path);
        }
    }
}

#[cfg(windows)]
mod windows_impl {
    use std::io;
    use std::time::Duration;

    use tokio::net::windows::named_pipe::{
        ClientOptions, NamedPipeClient, NamedPipeServer, ServerOptions,
    };
    use windows_sys::Win32::Foundation::{ERROR_ACCESS_DENIED, ERROR_PIPE_BUSY};

    use super::ChannelSpace;
    use crate::error::ChannelError;
    use crate::paths::pipe_name;

    pub type ClientStream = NamedPipeClient;
    pub type ServerStream = NamedPipeServer;

    /// An exclusively created pipe. A fresh server instance is queued after every accept.
    #[derive(Debug)]
    pub struct ChannelListener {
        channel: String,
        name: String,
        next: NamedPipeServer,
    }

    impl ChannelListener {
        pub fn channel(&self) -> &str {
            &self.channel
        }

        pub async fn accept(&mut self) -> io::Result<ServerStream> {
            if let Err(e) = self.next.connect().await {
                // The instance is unusable (e.g. the client already left, ERROR_NO_DATA).
                // Replace it, otherwise every later accept fails the same way.
                self.next = ServerOptions::new().create(&self.name)?;
                return Err(e);
            }
            let fresh = ServerOptions::new().create(&self.name)?;
            Ok(std::mem::replace(&mut self.next, fresh))
        }
    }

    impl ChannelSpace {
        pub(super) async fn connect_raw(&self, channel: &str) -> io::Result<NamedPipeClient> {
            let name = pipe_name(channel);
            loop {
                match ClientOptions::new().open(&name) {
                    Ok(c) => return Ok(c),
                    // All server instances are busy; the outer timeout bounds this.
                    Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) => {}
                    Err(e) => return Err(e),
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }

        /// Claim `channel` exclusively. Pipes vanish with their owner, so there is nothing stale to reclaim.
        pub async fn bind(&self, channel: &str) -> Result<ChannelListener, ChannelError> {
            let name = pipe_name(channel);
            match ServerOptions::new().first_pipe_instance(true).create(&name) {
                Ok(next) => Ok(ChannelListener {
                    channel: channel.to_string(),
                    name,
                    next,
                }),
                Err(e) if e.raw_os_error() == Some(ERROR_ACCESS_DENIED as i32) => {
                    Err(ChannelError::BindConflict {
                        channel: channel.to_string(),
                    })
                }
                Err(e) => Err(ChannelError::Transport {
                    channel: channel.to_string(),
                    source: e,
                }),
            }
        }
    }
}
