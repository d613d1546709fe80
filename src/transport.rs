// 🚚 Transport - turn a configured location into a sequential byte stream
//
// Local paths are opened directly, http(s) URLs are fetched with a blocking
// client and ftp URLs are retrieved with RETR. Downloads can be capped in
// size and copied into a save directory.
// Everything above this module only ever sees `Read`.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::ImportError;

/// Connection establishment timeout for remote sources
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// LOCATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Http(String),
    Ftp(FtpLocation),
}

/// ftp://[user[:password]@]host[:port]/path
#[derive(Clone, PartialEq, Eq)]
pub struct FtpLocation {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub path: String,
}

impl fmt::Debug for FtpLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpLocation")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FtpLocation {
    pub const DEFAULT_PORT: u16 = 21;

    fn parse(raw: &str, rest: &str) -> std::result::Result<Self, ImportError> {
        let unsupported = || ImportError::UnsupportedLocation(raw.to_string());
        let (authority, path) = rest.split_once('/').ok_or_else(unsupported)?;
        if path.is_empty() {
            return Err(unsupported());
        }

        let (userinfo, host_port) = match authority.rsplit_once('@') {
            Some((userinfo, host_port)) => (Some(userinfo), host_port),
            None => (None, authority),
        };
        let (user, password) = match userinfo {
            None => ("anonymous".to_string(), "anonymous".to_string()),
            Some(userinfo) => {
                let (user, password) = userinfo.split_once(':').unwrap_or((userinfo, ""));
                (decode_component(user, raw)?, decode_component(password, raw)?)
            }
        };
        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| unsupported())?),
            None => (host_port, Self::DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(unsupported());
        }

        Ok(FtpLocation {
            host: host.to_string(),
            port,
            user,
            password,
            path: format!("/{}", path),
        })
    }
}

fn decode_component(text: &str, raw: &str) -> std::result::Result<String, ImportError> {
    urlencoding::decode(text)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ImportError::UnsupportedLocation(raw.to_string()))
}

impl Location {
    /// Plain paths are local files; http(s) and ftp URLs are fetched
    pub fn parse(raw: &str) -> std::result::Result<Self, ImportError> {
        let raw = raw.trim();
        match raw.split_once("://") {
            None => Ok(Location::File(PathBuf::from(raw))),
            Some((scheme, rest)) => match scheme.to_ascii_lowercase().as_str() {
                "http" | "https" => Ok(Location::Http(raw.to_string())),
                "ftp" => FtpLocation::parse(raw, rest).map(Location::Ftp),
                _ => Err(ImportError::UnsupportedLocation(raw.to_string())),
            },
        }
    }

    /// Last path component, used when saving a copy
    pub fn file_name(&self) -> String {
        match self {
            Location::File(path) => path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("download")
                .to_string(),
            Location::Http(url) => last_segment(url.split(['?', '#']).next().unwrap_or(url)),
            Location::Ftp(ftp) => last_segment(&ftp.path),
        }
    }
}

fn last_segment(path: &str) -> String {
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "download".to_string(),
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::File(path) => write!(f, "{}", path.display()),
            Location::Http(url) => f.write_str(url),
            // password stays out of logs
            Location::Ftp(ftp) => write!(f, "ftp://{}@{}:{}{}", ftp.user, ftp.host, ftp.port, ftp.path),
        }
    }
}

// ============================================================================
// READER ADAPTERS
// ============================================================================

/// Fails with `TooLarge` as soon as more than `limit` bytes came through
pub struct CappedReader<R> {
    inner: R,
    limit: u64,
    read: u64,
}

impl<R: Read> CappedReader<R> {
    pub fn new(inner: R, limit: u64) -> Self {
        CappedReader { inner, limit, read: 0 }
    }
}

impl<R: Read> Read for CappedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if self.read > self.limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                ImportError::TooLarge { limit: self.limit },
            ));
        }
        Ok(n)
    }
}

/// Copies everything read from `inner` into `copy`
pub struct TeeReader<R, W> {
    inner: R,
    copy: W,
}

impl<R: Read, W: Write> TeeReader<R, W> {
    pub fn new(inner: R, copy: W) -> Self {
        TeeReader { inner, copy }
    }
}

impl<R: Read, W: Write> Read for TeeReader<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.copy.write_all(&buf[..n])?;
        Ok(n)
    }
}

// ============================================================================
// FETCHER
// ============================================================================

/// Input - an opened source plus its optional progress bar
pub struct Input {
    pub reader: Box<dyn Read>,
    pub size_hint: Option<u64>,
    pub progress: Option<ProgressBar>,
}

impl Input {
    pub fn finish(&self) {
        if let Some(bar) = &self.progress {
            bar.finish();
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Fetcher {
    max_size: Option<u64>,
    save_dir: Option<PathBuf>,
    show_progress: bool,
}

impl Fetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: cap on downloaded bytes
    pub fn with_max_size(mut self, max_size: Option<u64>) -> Self {
        self.max_size = max_size;
        self
    }

    /// Builder pattern: keep a copy of every download in this directory
    pub fn with_save_dir(mut self, save_dir: Option<PathBuf>) -> Self {
        self.save_dir = save_dir;
        self
    }

    /// Builder pattern: show a byte progress bar while reading
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn open(&self, location: &Location) -> Result<Input> {
        let (reader, size_hint): (Box<dyn Read>, Option<u64>) = match location {
            Location::File(path) => open_file(path)?,
            Location::Http(url) => {
                info!(url = %url, "downloading file");
                let (response, size) = self.open_http(url)?;
                let reader: Box<dyn Read> = match self.max_size {
                    Some(limit) => Box::new(CappedReader::new(response, limit)),
                    None => response,
                };
                (self.save_copy(reader, location)?, size)
            }
            Location::Ftp(ftp) => {
                info!(location = %location, "retrieving file via ftp");
                let (stream, size) = self.open_ftp(ftp)?;
                let reader: Box<dyn Read> = match self.max_size {
                    Some(limit) => Box::new(CappedReader::new(stream, limit)),
                    None => stream,
                };
                (self.save_copy(reader, location)?, size)
            }
        };

        if !self.show_progress {
            return Ok(Input {
                reader,
                size_hint,
                progress: None,
            });
        }

        let bar = ProgressBar::new(size_hint.unwrap_or(0));
        bar.set_style(
            ProgressStyle::with_template("{bytes}/{total_bytes} [{wide_bar}] {bytes_per_sec} {eta}")
                .context("Invalid progress bar template")?,
        );
        Ok(Input {
            reader: Box::new(bar.wrap_read(reader)),
            size_hint,
            progress: Some(bar),
        })
    }

    /// Read a whole source into memory (workbooks need random access)
    pub fn read_all(&self, location: &Location) -> Result<Vec<u8>> {
        let mut input = self.open(location)?;
        let mut bytes = Vec::with_capacity(input.size_hint.unwrap_or(0) as usize);
        input
            .reader
            .read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read {}", location))?;
        input.finish();
        Ok(bytes)
    }

    fn save_copy(&self, reader: Box<dyn Read>, location: &Location) -> Result<Box<dyn Read>> {
        let Some(dir) = &self.save_dir else {
            return Ok(reader);
        };
        let path = dir.join(location.file_name());
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        info!(path = %path.display(), "saving a copy of the download");
        Ok(Box::new(TeeReader::new(reader, file)))
    }

    #[cfg(feature = "http")]
    fn open_http(&self, url: &str) -> Result<(Box<dyn Read>, Option<u64>)> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(None)
            .build()
            .context("Failed to build http client")?;
        let response = client
            .get(url)
            .send()
            .with_context(|| format!("Failed to download {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!("failed to download {}: {}", url, response.status());
        }

        let size = response.content_length();
        if let (Some(limit), Some(size)) = (self.max_size, size) {
            if size > limit {
                return Err(ImportError::TooLarge { limit }.into());
            }
        }
        Ok((Box::new(response), size))
    }

    #[cfg(not(feature = "http"))]
    fn open_http(&self, url: &str) -> Result<(Box<dyn Read>, Option<u64>)> {
        anyhow::bail!("cannot download {}: built without the `http` feature", url)
    }
}

impl Fetcher {
    #[cfg(feature = "ftp")]
    fn open_ftp(&self, location: &FtpLocation) -> Result<(Box<dyn Read>, Option<u64>)> {
        use std::net::ToSocketAddrs;
        use suppaftp::types::FileType;
        use suppaftp::FtpStream;

        let address = (location.host.as_str(), location.port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {}", location.host))?
            .next()
            .with_context(|| format!("No address for {}", location.host))?;
        let mut ftp = FtpStream::connect_timeout(address, CONNECT_TIMEOUT)
            .with_context(|| format!("Failed to connect to {}", address))?;
        ftp.login(&location.user, &location.password)
            .with_context(|| format!("Failed to log in as {}", location.user))?;
        ftp.transfer_type(FileType::Binary)
            .context("Failed to switch to binary mode")?;

        let size = ftp.size(&location.path).ok().map(|size| size as u64);
        if let (Some(limit), Some(size)) = (self.max_size, size) {
            if size > limit {
                return Err(ImportError::TooLarge { limit }.into());
            }
        }

        let data = ftp
            .retr_as_stream(&location.path)
            .with_context(|| format!("Failed to retrieve {}", location.path))?;
        let reader = FtpReader {
            ftp,
            data: Some(Box::new(data)),
        };
        Ok((Box::new(reader), size))
    }

    #[cfg(not(feature = "ftp"))]
    fn open_ftp(&self, location: &FtpLocation) -> Result<(Box<dyn Read>, Option<u64>)> {
        anyhow::bail!("cannot retrieve {}: built without the `ftp` feature", location.path)
    }
}

/// Data connection of a RETR; the transfer is finalized at end of stream
#[cfg(feature = "ftp")]
struct FtpReader {
    ftp: suppaftp::FtpStream,
    data: Option<Box<dyn Read>>,
}

#[cfg(feature = "ftp")]
impl Read for FtpReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(data) = self.data.as_mut() else {
            return Ok(0);
        };
        let n = data.read(buf)?;
        if n == 0 && !buf.is_empty() {
            if let Some(data) = self.data.take() {
                self.ftp
                    .finalize_retr_stream(data)
                    .map_err(|err| io::Error::new(io::ErrorKind::Other, err.to_string()))?;
                // the file is complete; a failing QUIT changes nothing
                let _ = self.ftp.quit();
            }
        }
        Ok(n)
    }
}

fn open_file(path: &Path) -> Result<(Box<dyn Read>, Option<u64>)> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    let size = file.metadata().ok().map(|m| m.len());
    Ok((Box::new(file), size))
}

// ============================================================================
// TESTS
// ============================================================================
