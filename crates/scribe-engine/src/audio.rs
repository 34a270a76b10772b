//! Audio file decoding to 16 kHz mono `f32`.

use std::io::Cursor;
use std::path::Path;

use scribe_core::SAMPLE_RATE;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::errors::{EngineError, Result};

/// Decoded, mixed-down and resampled audio.
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    /// Mono samples at [`SAMPLE_RATE`].
    pub samples: Vec<f32>,
    /// Sample rate of the source stream.
    pub source_rate: u32,
    /// Channel count of the source stream.
    pub channels: usize,
}

impl DecodedAudio {
    /// Duration in seconds.
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / f64::from(SAMPLE_RATE)
    }
}

/// Decode an audio file, using its extension as a format hint.
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    let data = std::fs::read(path)?;
    let extension = path.extension().and_then(|e| e.to_str());
    decode_bytes(data, extension)
}

/// Decode an in-memory audio file (WAV, FLAC, M4A/AAC, OGG/Vorbis).
pub fn decode_bytes(data: Vec<u8>, extension: Option<&str>) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        let _ = hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| EngineError::AudioDecode(format!("probe failed: {e}")))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| EngineError::AudioDecode("no audio track found".into()))?;
    let codec_params = track.codec_params.clone();
    let track_id = track.id;
    let source_rate = codec_params
        .sample_rate
        .ok_or_else(|| EngineError::AudioDecode("unknown sample rate".into()))?;
    let channels = codec_params.channels.map_or(1, |c| c.count()).max(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| EngineError::AudioDecode(format!("codec init failed: {e}")))?;

    let mut mono: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => return Err(EngineError::AudioDecode(format!("packet read: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!(error = e, "skipping corrupt packet");
                continue;
            }
            Err(e) => return Err(EngineError::AudioDecode(format!("decode: {e}"))),
        };

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);
        mix_to_mono(buf.samples(), channels, &mut mono);
    }

    if mono.is_empty() {
        return Err(EngineError::AudioDecode("no audio samples decoded".into()));
    }

    let samples = if source_rate == SAMPLE_RATE {
        mono
    } else {
        resample(&mono, source_rate, SAMPLE_RATE)?
    };
    debug!(
        source_rate,
        channels,
        samples = samples.len(),
        "audio decoded"
    );

    Ok(DecodedAudio {
        samples,
        source_rate,
        channels,
    })
}

#[allow(clippy::cast_precision_loss)]
fn mix_to_mono(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

/// Resample mono audio with a windowed-sinc interpolator.
///
/// The output is trimmed to the exact expected length; the zero padding fed
/// into the final block adds no samples.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    const BLOCK: usize = 1024;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, BLOCK, 1)
        .map_err(|e| EngineError::Resample(format!("init: {e}")))?;

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut output = Vec::with_capacity(expected + delay + BLOCK);

    let mut block = vec![0.0_f32; BLOCK];
    let mut feed = |chunk: &[f32], output: &mut Vec<f32>| -> Result<()> {
        block.fill(0.0);
        block[..chunk.len()].copy_from_slice(chunk);
        let resampled = resampler
            .process(&[block.as_slice()], None)
            .map_err(|e| EngineError::Resample(format!("process: {e}")))?;
        if let Some(channel) = resampled.first() {
            output.extend_from_slice(channel);
        }
        Ok(())
    };

    for chunk in samples.chunks(BLOCK) {
        feed(chunk, &mut output)?;
    }
    // Flush the filter delay.
    while output.len() < expected + delay {
        feed(&[], &mut output)?;
    }

    Ok(output.into_iter().skip(delay).take(expected).collect())
}
