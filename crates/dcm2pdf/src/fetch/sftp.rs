//! SFTP archive client
//!
//! `ssh2` is blocking, so every call runs on the blocking pool and is awaited
//! before the next one starts.

use async_trait::async_trait;
use std::fs::File;
use std::io;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use super::{FetchError, RemoteArchive, RemoteSession};
use crate::config::RemoteSettings;

/// TCP and SSH handshake timeout
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Remote archive reached over SSH/SFTP with password authentication
#[derive(Debug, Clone)]
pub struct SftpArchive {
    settings: RemoteSettings,
}

impl SftpArchive {
    pub fn new(settings: RemoteSettings) -> Self {
        Self { settings }
    }

    fn connect_blocking(settings: &RemoteSettings) -> Result<SftpSession, FetchError> {
        debug!(host = %settings.host, port = settings.port, "Connecting to SFTP server");

        let tcp = connect_tcp(&settings.host, settings.port)
            .map_err(|e| FetchError::Connection(format!("{}:{}: {}", settings.host, settings.port, e)))?;

        let mut session = ssh2::Session::new()
            .map_err(|e| FetchError::Connection(format!("Failed to create SSH session: {}", e)))?;
        session.set_timeout((CONNECT_TIMEOUT_SECS * 1000) as u32);
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| FetchError::Connection(format!("SSH handshake failed: {}", e)))?;

        debug!(user = %settings.user, "Authenticating");
        session
            .userauth_password(&settings.user, &settings.password)
            .map_err(|e| FetchError::Connection(format!("Authentication failed: {}", e)))?;
        if !session.authenticated() {
            return Err(FetchError::Connection(format!(
                "Authentication rejected for user '{}'",
                settings.user
            )));
        }

        let sftp = session
            .sftp()
            .map_err(|e| FetchError::Connection(format!("Failed to start SFTP subsystem: {}", e)))?;

        Ok(SftpSession {
            session,
            sftp: Arc::new(Mutex::new(sftp)),
        })
    }
}

fn connect_tcp(host: &str, port: u16) -> io::Result<TcpStream> {
    use std::net::ToSocketAddrs;

    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, Duration::from_secs(CONNECT_TIMEOUT_SECS)) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

#[async_trait]
impl RemoteArchive for SftpArchive {
    async fn open_session(&self) -> Result<Box<dyn RemoteSession>, FetchError> {
        let settings = self.settings.clone();

        let session = tokio::task::spawn_blocking(move || Self::connect_blocking(&settings))
            .await
            .map_err(|e| FetchError::Connection(format!("SFTP connect task panicked: {}", e)))??;

        Ok(Box::new(session))
    }
}

struct SftpSession {
    session: ssh2::Session,
    sftp: Arc<Mutex<ssh2::Sftp>>,
}

impl SftpSession {
    fn download_blocking(sftp: &Mutex<ssh2::Sftp>, remote: &Path, local: &Path) -> Result<u64, FetchError> {
        let sftp = sftp
            .lock()
            .map_err(|_| FetchError::Transfer("SFTP channel poisoned".to_string()))?;

        let mut remote_file = sftp
            .open(remote)
            .map_err(|e| FetchError::Transfer(format!("{}: {}", remote.display(), e)))?;
        let mut local_file = File::create(local)?;

        io::copy(&mut remote_file, &mut local_file)
            .map_err(|e| FetchError::Transfer(format!("{}: {}", remote.display(), e)))
    }
}

#[async_trait]
impl RemoteSession for SftpSession {
    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<u64, FetchError> {
        let sftp = self.sftp.clone();
        let remote = PathBuf::from(remote_path);
        let local = local_path.to_path_buf();

        tokio::task::spawn_blocking(move || Self::download_blocking(&sftp, &remote, &local))
            .await
            .map_err(|e| FetchError::Transfer(format!("SFTP download task panicked: {}", e)))?
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        let SftpSession { session, sftp } = *self;

        tokio::task::spawn_blocking(move || {
            drop(sftp);
            session
                .disconnect(None, "batch complete", None)
                .map_err(|e| FetchError::Transfer(format!("SSH disconnect failed: {}", e)))
        })
        .await
        .map_err(|e| FetchError::Transfer(format!("SFTP close task panicked: {}", e)))?
    }
}
