//! ICY stream reader
//!
//! Connects to Icecast/Shoutcast streams, strips interleaved ICY metadata,
//! and hands the remaining audio bytes to the decoder through a `Read`
//! implementation backed by a channel.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use reqwest::header::HeaderMap;
use reqwest::Url;

use crate::config::network::{
    CHUNK_QUEUE_BOUND, CHUNK_SIZE, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, USER_AGENT,
};
use crate::error::{RadioError, Result};
use crate::stream::metadata::{extract_icy_items, MetadataItem};

/// A chunk of audio bytes, or the reason the network side gave up
pub type Chunk = std::result::Result<Vec<u8>, String>;

/// Headers parsed from an ICY stream response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IcyHeaders {
    pub metaint: usize,
    pub station_name: Option<String>,
    pub content_type: Option<String>,
    pub bitrate: Option<u32>,
}

/// Parse the ICY-relevant headers of a response
pub fn parse_icy_headers(headers: &HeaderMap) -> IcyHeaders {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    IcyHeaders {
        metaint: get("icy-metaint")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0),
        station_name: get("icy-name"),
        content_type: get("content-type"),
        bitrate: get("icy-br").and_then(|v| v.parse::<u32>().ok()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DemuxState {
    /// Audio bytes left before the next length byte
    Audio(usize),
    /// Next byte is a metadata length (in 16-byte units)
    Length,
    /// Metadata bytes still to collect
    Metadata(usize),
}

/// Splits an ICY byte stream into audio and metadata blocks.
///
/// Pure state machine: input may be cut at any byte boundary.
#[derive(Debug)]
pub struct IcyDemuxer {
    metaint: usize,
    state: DemuxState,
    meta: Vec<u8>,
}

impl IcyDemuxer {
    /// `metaint == 0` means the stream carries no metadata
    pub fn new(metaint: usize) -> Self {
        Self {
            metaint,
            state: DemuxState::Audio(metaint),
            meta: Vec::new(),
        }
    }

    /// Consume `input`, appending audio bytes to `audio` and each completed
    /// raw metadata block to `blocks`
    pub fn feed(&mut self, mut input: &[u8], audio: &mut Vec<u8>, blocks: &mut Vec<Vec<u8>>) {
        if self.metaint == 0 {
            audio.extend_from_slice(input);
            return;
        }

        while !input.is_empty() {
            match self.state {
                DemuxState::Audio(remaining) => {
                    let n = remaining.min(input.len());
                    audio.extend_from_slice(&input[..n]);
                    input = &input[n..];
                    self.state = if remaining == n {
                        DemuxState::Length
                    } else {
                        DemuxState::Audio(remaining - n)
                    };
                }
                DemuxState::Length => {
                    let len = input[0] as usize * 16;
                    input = &input[1..];
                    self.state = if len == 0 {
                        DemuxState::Audio(self.metaint)
                    } else {
                        self.meta.clear();
                        DemuxState::Metadata(len)
                    };
                }
                DemuxState::Metadata(remaining) => {
                    let n = remaining.min(input.len());
                    self.meta.extend_from_slice(&input[..n]);
                    input = &input[n..];
                    if remaining == n {
                        blocks.push(std::mem::take(&mut self.meta));
                        self.state = DemuxState::Audio(self.metaint);
                    } else {
                        self.state = DemuxState::Metadata(remaining - n);
                    }
                }
            }
        }
    }
}

/// `Read` over audio chunks delivered by the network thread.
///
/// Returns `UnexpectedEof` once the network thread has finished cleanly
/// or `stop` is raised, and an `Other` error carrying the message if the
/// network side failed.
pub struct ChunkReader {
    current: Vec<u8>,
    pos: usize,
    receiver: Receiver<Chunk>,
    stop: Arc<AtomicBool>,
}

impl ChunkReader {
    pub fn new(receiver: Receiver<Chunk>, stop: Arc<AtomicBool>) -> Self {
        Self {
            current: Vec::new(),
            pos: 0,
            receiver,
            stop,
        }
    }

    fn accept(&mut self, chunk: Chunk) -> io::Result<()> {
        match chunk {
            Ok(bytes) => {
                self.current = bytes;
                self.pos = 0;
                Ok(())
            }
            Err(msg) => Err(io::Error::other(msg)),
        }
    }
}

fn ended() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "stream ended")
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            let remaining = self.current.len() - self.pos;
            if remaining > 0 {
                let n = buf.len().min(remaining);
                buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }

            if self.stop.load(Ordering::Relaxed) {
                return Err(ended());
            }

            match self.receiver.try_recv() {
                Ok(chunk) => {
                    self.accept(chunk)?;
                    continue;
                }
                Err(TryRecvError::Disconnected) => return Err(ended()),
                Err(TryRecvError::Empty) => {}
            }

            match self
                .receiver
                .recv_timeout(Duration::from_secs(READ_TIMEOUT_SECS))
            {
                Ok(chunk) => self.accept(chunk)?,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        "Timed out waiting for stream data",
                    ))
                }
                Err(RecvTimeoutError::Disconnected) => return Err(ended()),
            }
        }
    }
}

/// Connect to `url` with ICY metadata enabled and start the `"icy-reader"`
/// thread.
///
/// Metadata updates are passed to `on_metadata` on the network thread, only
/// when the block's content changes. The thread exits when the server closes
/// the connection, on a network error, when `stop` is raised, or when the
/// returned reader is dropped. There is no reconnection.
pub fn connect<F>(url: &Url, stop: Arc<AtomicBool>, on_metadata: F) -> Result<(ChunkReader, IcyHeaders)>
where
    F: FnMut(Vec<MetadataItem>) + Send + 'static,
{
    let client = reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(READ_TIMEOUT_SECS))
        .build()?;

    let response = client
        .get(url.clone())
        .header("Icy-MetaData", "1")
        .send()?;

    if !response.status().is_success() {
        return Err(RadioError::Stream(format!("HTTP {}", response.status())));
    }

    let headers = parse_icy_headers(response.headers());
    tracing::debug!(
        %url,
        metaint = headers.metaint,
        content_type = headers.content_type.as_deref().unwrap_or("-"),
        name = headers.station_name.as_deref().unwrap_or("-"),
        "stream connected"
    );

    let (tx, rx) = bounded::<Chunk>(CHUNK_QUEUE_BOUND);
    let demuxer = IcyDemuxer::new(headers.metaint);
    let thread_stop = Arc::clone(&stop);
    thread::Builder::new()
        .name("icy-reader".to_string())
        .spawn(move || pump(response, demuxer, tx, thread_stop, on_metadata))
        .map_err(|e| RadioError::Stream(format!("Failed to spawn reader thread: {}", e)))?;

    Ok((ChunkReader::new(rx, stop), headers))
}

/// Network thread body: read, demux, forward
fn pump<R, F>(mut body: R, mut demuxer: IcyDemuxer, tx: Sender<Chunk>, stop: Arc<AtomicBool>, mut on_metadata: F)
where
    R: Read,
    F: FnMut(Vec<MetadataItem>),
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut blocks = Vec::new();
    let mut last_block: Vec<u8> = Vec::new();

    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }

        let n = match body.read(&mut buf) {
            Ok(0) => {
                tracing::debug!("stream closed by server");
                return;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::warn!(error = %e, "stream read failed");
                let _ = tx.send(Err(format!("Network error: {}", e)));
                return;
            }
        };

        let mut audio = Vec::with_capacity(n);
        demuxer.feed(&buf[..n], &mut audio, &mut blocks);

        for block in blocks.drain(..) {
            if block != last_block {
                let items = extract_icy_items(&block);
                last_block = block;
                if !items.is_empty() {
                    on_metadata(items);
                }
            }
        }

        if !audio.is_empty() && tx.send(Ok(audio)).is_err() {
            return;
        }
    }
}
