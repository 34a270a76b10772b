//! Log-mel spectrogram front end.
//!
//! Matches the Whisper feature extractor: centered STFT with a periodic Hann
//! window, Slaney-scale mel filters up to 8 kHz, `log10` with an 8-decade
//! dynamic range clamp, then `(x + 4) / 4` scaling.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_wrap, clippy::cast_sign_loss)]

use std::sync::Arc;

use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use super::config::PreprocessorConfig;

const MEL_FMAX_HZ: f32 = 8_000.0;

/// Precomputed window, filter bank and FFT plan for one feature layout.
pub struct MelExtractor {
    n_fft: usize,
    hop: usize,
    n_frames: usize,
    n_samples: usize,
    hann: Vec<f32>,
    filters: Vec<Vec<f32>>,
    fft: Arc<dyn Fft<f32>>,
}

impl MelExtractor {
    /// Build an extractor for the given preprocessor layout.
    pub fn new(config: &PreprocessorConfig) -> Self {
        let n_fft = config.n_fft.max(2);
        Self {
            n_fft,
            hop: config.hop_length.max(1),
            n_frames: config.nb_max_frames,
            n_samples: config.n_samples,
            hann: hann_window(n_fft),
            filters: mel_filters(n_fft, config.sampling_rate, config.feature_size, MEL_FMAX_HZ),
            fft: FftPlanner::<f32>::new().plan_fft_forward(n_fft),
        }
    }

    /// Number of mel bands.
    pub fn n_mels(&self) -> usize {
        self.filters.len()
    }

    /// Number of frames per window.
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// Features `[n_mels, n_frames]` for one window, padded or trimmed to the
    /// window length.
    pub fn compute(&self, samples: &[f32]) -> Array2<f32> {
        let active = samples.len().min(self.n_samples);
        let mut padded = samples[..active].to_vec();
        padded.resize(self.n_samples, 0.0);
        let centered = reflect_pad(&padded, self.n_fft / 2);

        // Frames past the audio are all padding; their energy stays zero.
        let active_frames = active.div_ceil(self.hop) + 1;
        let active_frames = active_frames.min(self.n_frames);

        let n_freqs = self.n_fft / 2 + 1;
        let mut mel = Array2::<f32>::zeros((self.n_mels(), self.n_frames));
        let mut buf = vec![Complex::new(0.0_f32, 0.0); self.n_fft];

        for frame in 0..active_frames {
            let start = frame * self.hop;
            for (i, slot) in buf.iter_mut().enumerate() {
                let s = centered.get(start + i).copied().unwrap_or(0.0);
                *slot = Complex::new(s * self.hann[i], 0.0);
            }
            self.fft.process(&mut buf);

            for (m, filter) in self.filters.iter().enumerate() {
                let energy: f32 = filter
                    .iter()
                    .zip(&buf[..n_freqs])
                    .map(|(w, c)| w * c.norm_sqr())
                    .sum();
                mel[[m, frame]] = energy;
            }
        }

        mel.mapv_inplace(|v| v.max(1e-10).log10());
        let max = mel.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        mel.mapv_inplace(|v| (v.max(max - 8.0) + 4.0) / 4.0);
        mel
    }
}

fn hann_window(n: usize) -> Vec<f32> {
    use std::f32::consts::PI;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / n as f32).cos()))
        .collect()
}

fn mel_filters(n_fft: usize, sample_rate: u32, n_mels: usize, fmax: f32) -> Vec<Vec<f32>> {
    let n_freqs = n_fft / 2 + 1;
    let mel_min = hz_to_mel(0.0);
    let mel_max = hz_to_mel(fmax);

    let hz_points: Vec<f32> = (0..=n_mels + 1)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f32 / (n_mels + 1) as f32))
        .collect();
    let fft_freqs: Vec<f32> = (0..n_freqs)
        .map(|k| k as f32 * sample_rate as f32 / n_fft as f32)
        .collect();

    (0..n_mels)
        .map(|m| {
            let (lower, center, upper) = (hz_points[m], hz_points[m + 1], hz_points[m + 2]);
            let enorm = 2.0 / (upper - lower).max(1e-10);
            fft_freqs
                .iter()
                .map(|&f| {
                    let w = if f >= lower && f <= center {
                        (f - lower) / (center - lower).max(1e-10)
                    } else if f > center && f <= upper {
                        (upper - f) / (upper - center).max(1e-10)
                    } else {
                        0.0
                    };
                    (w * enorm).max(0.0)
                })
                .collect()
        })
        .collect()
}

// Slaney scale: linear below 1 kHz, logarithmic above.
const F_SP: f32 = 200.0 / 3.0;
const MIN_LOG_HZ: f32 = 1_000.0;
const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;

fn log_step() -> f32 {
    6.4_f32.ln() / 27.0
}

fn hz_to_mel(hz: f32) -> f32 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        mel * F_SP
    }
}

fn reflect_pad(samples: &[f32], pad: usize) -> Vec<f32> {
    if pad == 0 || samples.len() < 2 {
        let mut out = vec![samples.first().copied().unwrap_or(0.0); pad];
        out.extend_from_slice(samples);
        out.resize(samples.len() + 2 * pad, samples.last().copied().unwrap_or(0.0));
        return out;
    }
    let len = samples.len() as isize;
    (-(pad as isize)..len + pad as isize)
        .map(|i| samples[reflect_index(i, samples.len())])
        .collect()
}

fn reflect_index(mut i: isize, len: usize) -> usize {
    let max = len as isize - 1;
    while i < 0 || i > max {
        i = if i < 0 { -i } else { 2 * max - i };
    }
    i as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PreprocessorConfig {
        PreprocessorConfig {
            chunk_length: 30,
            feature_size: 80,
            hop_length: 160,
            n_fft: 400,
            n_samples: 480_000,
            nb_max_frames: 3000,
            sampling_rate: 16_000,
        }
    }

    #[test]
    fn slaney_scale_round_trips() {
        for hz in [0.0_f32, 440.0, 1_000.0, 4_000.0, 8_000.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() < 0.5, "{hz}");
        }
    }

    #[test]
    fn hann_window_starts_at_zero_and_peaks_mid() {
        let w = hann_window(400);
        assert!(w[0].abs() < 1e-6);
        assert!((w[200] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn filters_cover_requested_bands() {
        let filters = mel_filters(400, 16_000, 80, MEL_FMAX_HZ);
        assert_eq!(filters.len(), 80);
        assert!(filters.iter().all(|f| f.len() == 201));
        assert!(filters.iter().all(|f| f.iter().any(|&w| w > 0.0)));
    }

    #[test]
    fn reflect_pad_mirrors_edges() {
        assert_eq!(
            reflect_pad(&[1.0, 2.0, 3.0], 2),
            vec![3.0, 2.0, 1.0, 2.0, 3.0, 2.0, 1.0]
        );
    }

    #[test]
    fn silence_is_flat() {
        let mel = MelExtractor::new(&config());
        let features = mel.compute(&[0.0; 16_000]);
        assert_eq!(features.dim(), (80, 3000));
        assert!(features.iter().all(|&v| (v + 1.5).abs() < 1e-6));
    }

    #[test]
    fn tone_raises_energy_in_early_frames_only() {
        let mel = MelExtractor::new(&config());
        let tone: Vec<f32> = (0..16_000)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16_000.0).sin())
            .collect();
        let features = mel.compute(&tone);
        let early = features.column(50).iter().copied().fold(f32::MIN, f32::max);
        let late = features.column(2500).iter().copied().fold(f32::MIN, f32::max);
        assert!(early > late);
    }
}
