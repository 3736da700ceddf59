//! Frequency analysis for the audio visualiser.
//!
//! Produces byte frequency data with the same shape as a browser analyser
//! node: a Blackman-windowed FFT over the most recent `fft_size` samples,
//! temporal smoothing of the magnitudes, and a linear mapping of the
//! decibel range `[min_db, max_db]` onto `0..=255`.

use std::collections::VecDeque;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

use scribecast_common::error::{ScribeError, ScribeResult};

use crate::backend::{MediaStream, SampleBlock};

/// Analyser tuning.
#[derive(Debug, Clone)]
pub struct SpectrumConfig {
    /// FFT window; must be a power of two of at least 32.
    pub fft_size: usize,
    /// Weight of the previous frame's magnitude, `0.0..1.0`.
    pub smoothing: f32,
    pub min_db: f32,
    pub max_db: f32,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
        }
    }
}

/// Windowed FFT over a sliding sample buffer.
pub struct SpectrumAnalyser {
    config: SpectrumConfig,
    samples: VecDeque<f32>,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl SpectrumAnalyser {
    pub fn new(fft_size: usize) -> ScribeResult<Self> {
        Self::with_config(SpectrumConfig {
            fft_size,
            ..SpectrumConfig::default()
        })
    }

    pub fn with_config(config: SpectrumConfig) -> ScribeResult<Self> {
        let n = config.fft_size;
        if n < 32 || !n.is_power_of_two() {
            return Err(ScribeError::config(format!(
                "FFT size must be a power of two >= 32, got {n}"
            )));
        }

        // Blackman window.
        let window = (0..n)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
                0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
            })
            .collect();

        let fft = FftPlanner::new().plan_fft_forward(n);
        let mut samples = VecDeque::with_capacity(n);
        samples.resize(n, 0.0);

        Ok(Self {
            samples,
            window,
            fft,
            scratch: vec![Complex::new(0.0, 0.0); n],
            smoothed: vec![0.0; n / 2],
            config,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    /// Number of frequency buckets, half the FFT size.
    pub fn frequency_bin_count(&self) -> usize {
        self.config.fft_size / 2
    }

    /// Append samples, keeping only the latest `fft_size`.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let n = self.config.fft_size;
        let tail = if samples.len() > n {
            &samples[samples.len() - n..]
        } else {
            samples
        };
        for &sample in tail {
            if self.samples.len() == n {
                self.samples.pop_front();
            }
            self.samples.push_back(sample);
        }
    }

    /// Fill `out` with byte frequency data, one value per bucket.
    ///
    /// `out` may be shorter than the bucket count; extra entries are left
    /// untouched.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        let n = self.config.fft_size;
        for (slot, (sample, weight)) in self
            .scratch
            .iter_mut()
            .zip(self.samples.iter().zip(self.window.iter()))
        {
            *slot = Complex::new(sample * weight, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let tau = self.config.smoothing;
        let range = self.config.max_db - self.config.min_db;
        for (k, value) in out.iter_mut().take(n / 2).enumerate() {
            let magnitude = self.scratch[k].norm() / n as f32;
            let smoothed = tau * self.smoothed[k] + (1.0 - tau) * magnitude;
            self.smoothed[k] = smoothed;

            let db = if smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = 255.0 / range * (db - self.config.min_db);
            *value = scaled.clamp(0.0, 255.0) as u8;
        }
    }
}

/// An analyser attached to a stream's audio tap.
pub struct FrequencySource {
    analyser: SpectrumAnalyser,
    samples: Option<broadcast::Receiver<SampleBlock>>,
}

impl FrequencySource {
    /// Connect an analyser to `stream`'s audio track.
    pub fn attach(stream: &dyn MediaStream, fft_size: usize) -> ScribeResult<Self> {
        let samples = stream
            .audio_samples()
            .ok_or_else(|| ScribeError::capture("Stream has no audio track to analyse"))?;
        Ok(Self {
            analyser: SpectrumAnalyser::new(fft_size)?,
            samples: Some(samples),
        })
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.analyser.frequency_bin_count()
    }

    /// Drain pending PCM and compute the current byte frequency data.
    ///
    /// A closed source reports silence.
    pub fn read(&mut self, out: &mut [u8]) {
        let Some(samples) = self.samples.as_mut() else {
            out.fill(0);
            return;
        };
        loop {
            match samples.try_recv() {
                Ok(block) => self.analyser.push_samples(&block),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::trace!(skipped, "Analyser fell behind the audio tap");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        self.analyser.byte_frequency_data(out);
    }

    /// Detach from the audio tap.
    pub fn close(&mut self) {
        self.samples = None;
    }

    pub fn is_closed(&self) -> bool {
        self.samples.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(bin: usize, n: usize, amplitude: f32) -> Vec<f32> {
        (0..n)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * bin as f32 * i as f32 / n as f32).sin())
            .collect()
    }

    #[test]
    fn rejects_non_power_of_two() {
        assert!(SpectrumAnalyser::new(100).is_err());
        assert!(SpectrumAnalyser::new(16).is_err());
        assert_eq!(SpectrumAnalyser::new(256).unwrap().frequency_bin_count(), 128);
    }

    #[test]
    fn silence_maps_to_zero() {
        let mut analyser = SpectrumAnalyser::new(256).unwrap();
        analyser.push_samples(&[0.0; 256]);
        let mut out = [7u8; 128];
        analyser.byte_frequency_data(&mut out);
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn sine_peaks_at_its_bucket() {
        let mut analyser = SpectrumAnalyser::new(256).unwrap();
        let mut out = [0u8; 128];
        // Several frames so smoothing converges.
        for _ in 0..20 {
            analyser.push_samples(&sine(16, 256, 0.05));
            analyser.byte_frequency_data(&mut out);
        }
        let peak = out
            .iter()
            .enumerate()
            .max_by_key(|(_, v)| **v)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 16);
        assert!(out[16] > out[15] && out[16] > out[17]);
        assert!(out[16] > 150);
        assert!(out[100] < out[16]);
    }

    #[test]
    fn push_keeps_only_latest_window() {
        let mut analyser = SpectrumAnalyser::new(32).unwrap();
        analyser.push_samples(&[1.0; 100]);
        assert_eq!(analyser.samples.len(), 32);
        analyser.push_samples(&[2.0; 8]);
        assert_eq!(analyser.samples.len(), 32);
        assert_eq!(analyser.samples.back(), Some(&2.0));
    }
}
