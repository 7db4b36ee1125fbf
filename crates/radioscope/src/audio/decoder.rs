//! Audio decoder using Symphonia
//!
//! `SymphoniaSource` turns a byte stream of any container/codec that
//! symphonia's default registry knows into interleaved f32 samples for rodio.

use std::fmt;
use std::io::Read;
use std::num::NonZero;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use rodio::Source;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecType, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::{Hint, ProbeResult};

use crate::config::timeouts::PROBE_TIMEOUT_SECS;
use crate::error::{RadioError, Result};

const STEREO: NonZero<u16> = NonZero::<u16>::MIN.saturating_add(1);
const FALLBACK_RATE: NonZero<u32> = NonZero::<u32>::MIN.saturating_add(44_099);

/// Shared slot holding the reason a stream ended, if it was not a clean EOF
pub type ErrorSlot = Arc<Mutex<Option<String>>>;

/// Description of the decoded stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecInfo {
    pub codec_name: String,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: Option<u32>,
}

impl fmt::Display for CodecInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channel_str = if self.channels == 1 { "Mono" } else { "Stereo" };
        write!(f, "{} · {} Hz", self.codec_name, self.sample_rate)?;
        if let Some(bits) = self.bits_per_sample {
            write!(f, " · {}-bit", bits)?;
        }
        write!(f, " · {}", channel_str)
    }
}

/// Convert a symphonia codec type to a human-readable name
pub fn codec_type_to_name(codec: CodecType) -> &'static str {
    use symphonia::core::codecs::*;
    match codec {
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_OPUS => "Opus",
        CODEC_TYPE_VORBIS => "Vorbis",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM 16-bit",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM 24-bit",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM 32-bit Float",
        _ => "Audio",
    }
}

/// Pick a probe hint from the response's Content-Type, falling back to the
/// URL's extension
pub fn format_hint(url: &str, content_type: Option<&str>) -> Option<&'static str> {
    if let Some(ct) = content_type {
        let ct = ct.to_ascii_lowercase();
        let by_type = [
            ("audio/mpeg", "mp3"),
            ("audio/mp3", "mp3"),
            ("audio/aac", "aac"),
            ("audio/ogg", "ogg"),
            ("application/ogg", "ogg"),
            ("audio/opus", "ogg"),
            ("audio/flac", "flac"),
            ("audio/wav", "wav"),
            ("audio/x-wav", "wav"),
            ("audio/mp4", "mp4"),
        ];
        if let Some((_, hint)) = by_type.iter().find(|(mime, _)| ct.contains(mime)) {
            return Some(*hint);
        }
    }

    let lower = url.to_ascii_lowercase();
    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    let file = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = file.rsplit_once('.')?;
    match ext {
        "mp3" => Some("mp3"),
        "aac" | "adts" => Some("aac"),
        "ogg" | "oga" | "opus" => Some("ogg"),
        "flac" => Some("flac"),
        "wav" => Some("wav"),
        "m4a" | "mp4" => Some("mp4"),
        _ => None,
    }
}

/// Probe the container format on a background `"symphonia-probe"` thread.
///
/// Returns the receiver immediately so the caller can bound the wait.
pub fn start_probe<R: Read + Send + Sync + 'static>(
    reader: R,
    hint: Option<&str>,
) -> Result<Receiver<Result<ProbeResult>>> {
    let mss = MediaSourceStream::new(Box::new(ReadOnlySource::new(reader)), Default::default());
    let mut probe_hint = Hint::new();
    if let Some(ext) = hint {
        probe_hint.with_extension(ext);
    }

    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::Builder::new()
        .name("symphonia-probe".to_string())
        .spawn(move || {
            let result = symphonia::default::get_probe()
                .format(
                    &probe_hint,
                    mss,
                    &FormatOptions::default(),
                    &MetadataOptions::default(),
                )
                .map_err(|e| RadioError::Decode(format!("Probe error: {}", e)));
            let _ = tx.send(result);
        })
        .map_err(|e| RadioError::Audio(format!("Failed to spawn probe thread: {}", e)))?;

    Ok(rx)
}

/// A symphonia-backed `rodio::Source`
pub struct SymphoniaSource {
    decoder: Box<dyn Decoder>,
    format: Box<dyn FormatReader>,
    track_id: u32,
    sample_buf: Option<SampleBuffer<f32>>,
    sample_idx: usize,
    channels: NonZero<u16>,
    sample_rate: NonZero<u32>,
    codec_name: &'static str,
    bits_per_sample: Option<u32>,
    last_error: ErrorSlot,
}

impl SymphoniaSource {
    /// Probe `reader` and build a source, waiting at most `PROBE_TIMEOUT_SECS`
    pub fn new<R: Read + Send + Sync + 'static>(reader: R, hint: Option<&str>) -> Result<Self> {
        let rx = start_probe(reader, hint)?;
        match rx.recv_timeout(Duration::from_secs(PROBE_TIMEOUT_SECS)) {
            Ok(probed) => Self::from_probed(probed?),
            Err(RecvTimeoutError::Timeout) => Err(RadioError::Timeout(format!(
                "Format probe timed out after {}s",
                PROBE_TIMEOUT_SECS
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(RadioError::Decode("Probe thread panicked".to_string()))
            }
        }
    }

    /// Build a source from a completed probe (no I/O beyond the first packet)
    pub fn from_probed(probed: ProbeResult) -> Result<Self> {
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| RadioError::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| RadioError::Decode(format!("Decoder creation error: {}", e)))?;

        let channels = params
            .channels
            .and_then(|c| NonZero::new(c.count() as u16))
            .unwrap_or(STEREO);
        let sample_rate = params
            .sample_rate
            .and_then(NonZero::new)
            .unwrap_or(FALLBACK_RATE);

        let mut source = Self {
            decoder,
            format,
            track_id,
            sample_buf: None,
            sample_idx: 0,
            channels,
            sample_rate,
            codec_name: codec_type_to_name(params.codec),
            bits_per_sample: params.bits_per_sample,
            last_error: Arc::new(Mutex::new(None)),
        };

        // The first decoded packet carries the real output rate and layout,
        // which may differ from the container header.
        source.decode_next_packet();

        Ok(source)
    }

    pub fn codec_name(&self) -> &str {
        self.codec_name
    }

    pub fn codec_info(&self) -> CodecInfo {
        CodecInfo {
            codec_name: self.codec_name.to_string(),
            channels: self.channels.get(),
            sample_rate: self.sample_rate.get(),
            bits_per_sample: self.bits_per_sample,
        }
    }

    /// Slot that holds the failure message once the stream ends on an error
    pub fn error_slot(&self) -> ErrorSlot {
        Arc::clone(&self.last_error)
    }

    fn decode_next_packet(&mut self) -> bool {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return false;
                }
                Err(e) => {
                    store_error(&self.last_error, e);
                    return false;
                }
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let frames = decoded.capacity();
                    if let Some(ch) = NonZero::new(spec.channels.count() as u16) {
                        self.channels = ch;
                    }
                    if let Some(rate) = NonZero::new(spec.rate) {
                        self.sample_rate = rate;
                    }

                    let buf = match self.sample_buf.take() {
                        Some(buf) if buf.capacity() >= frames * spec.channels.count() => buf,
                        _ => SampleBuffer::new(frames as u64, spec),
                    };
                    let buf = self.sample_buf.insert(buf);
                    buf.copy_interleaved_ref(decoded);
                    self.sample_idx = 0;
                    return true;
                }
                // Corrupt frames are skipped; live streams recover on the next one
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => {
                    store_error(&self.last_error, e);
                    return false;
                }
            }
        }
    }
}

fn store_error(slot: &ErrorSlot, e: SymphoniaError) {
    if let Ok(mut slot) = slot.lock() {
        *slot = Some(e.to_string());
    }
}

impl Iterator for SymphoniaSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(buf) = &self.sample_buf {
                if let Some(&sample) = buf.samples().get(self.sample_idx) {
                    self.sample_idx += 1;
                    return Some(sample);
                }
            }

            if !self.decode_next_packet() {
                return None;
            }
        }
    }
}

impl Source for SymphoniaSource {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> NonZero<u16> {
        self.channels
    }

    fn sample_rate(&self) -> NonZero<u32> {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}
