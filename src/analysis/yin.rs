//! YIN fundamental frequency estimation for a single analysis window

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Pitch found in one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchEstimate {
    pub frequency_hz: f32,
    /// 1 - d'(τ) at the chosen lag, in [0, 1]
    pub confidence: f32,
}

/// YIN estimator with FFT plans shared across windows
///
/// The plans are immutable once built, so one detector can serve every
/// window of a buffer from several threads.
pub struct YinDetector {
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    fft_len: usize,
    sample_rate: u32,
    min_tau: usize,
    max_tau: usize,
    threshold: f32,
}

impl YinDetector {
    /// Detector for windows of at most `window_size` samples, searching
    /// `fmin_hz..=fmax_hz`
    pub fn new(
        sample_rate: u32,
        window_size: usize,
        fmin_hz: f32,
        fmax_hz: f32,
        threshold: f32,
    ) -> Self {
        let fft_len = (window_size.max(1) * 2).next_power_of_two();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_len);
        let ifft = planner.plan_fft_inverse(fft_len);

        let max_tau = ((sample_rate as f32 / fmin_hz).floor() as usize).min(window_size / 2);
        let min_tau = ((sample_rate as f32 / fmax_hz).ceil() as usize).max(2);

        Self {
            fft,
            ifft,
            fft_len,
            sample_rate,
            min_tau,
            max_tau,
            threshold,
        }
    }

    /// Estimate the pitch of `frame`, or `None` when it is unvoiced
    ///
    /// Frames shorter than the configured window search a proportionally
    /// smaller lag range.
    pub fn estimate(&self, frame: &[f32]) -> Option<PitchEstimate> {
        let max_tau = self.max_tau.min(frame.len() / 2);
        if max_tau <= self.min_tau || frame.len() > self.fft_len / 2 {
            return None;
        }

        let diff = self.difference_function(frame, max_tau);
        let cmnd = cumulative_mean_normalized_difference(&diff);
        let tau = absolute_threshold(&cmnd, self.min_tau, max_tau, self.threshold)?;

        let refined_tau = parabolic_interpolation(&cmnd, tau).max(1.0);
        Some(PitchEstimate {
            frequency_hz: self.sample_rate as f32 / refined_tau,
            confidence: (1.0 - cmnd[tau]).clamp(0.0, 1.0),
        })
    }

    /// Compute the YIN difference function d(τ) for τ in [0, max_tau]
    ///
    /// Uses an FFT autocorrelation r(τ) and
    /// d(τ) = Σ_{j<N-τ} x_j² + Σ_{j<N-τ} x_{j+τ}² - 2·r(τ).
    fn difference_function(&self, frame: &[f32], max_tau: usize) -> Vec<f32> {
        let n = frame.len();
        let mut diff = vec![0.0; max_tau + 1];

        let mut buffer = vec![Complex { re: 0.0f32, im: 0.0 }; self.fft_len];
        for (slot, &sample) in buffer.iter_mut().zip(frame) {
            slot.re = sample;
        }

        self.fft.process(&mut buffer);
        for value in buffer.iter_mut() {
            *value = Complex {
                re: value.norm_sqr(),
                im: 0.0,
            };
        }
        self.ifft.process(&mut buffer);

        let scale = 1.0 / self.fft_len as f32;
        let mut prefix_sq = vec![0.0f32; n + 1];
        for (idx, &sample) in frame.iter().enumerate() {
            prefix_sq[idx + 1] = prefix_sq[idx] + sample * sample;
        }

        for tau in 1..=max_tau.min(n - 1) {
            let sum_head = prefix_sq[n - tau];
            let sum_tail = prefix_sq[n] - prefix_sq[tau];
            let autocorr = buffer[tau].re * scale;
            diff[tau] = (sum_head + sum_tail - 2.0 * autocorr).max(0.0);
        }

        diff
    }
}

/// d'(τ) = d(τ) / ((1/τ) Σ_{j=1..τ} d(j)), with d'(0) = 1
pub fn cumulative_mean_normalized_difference(diff: &[f32]) -> Vec<f32> {
    let mut cmnd = vec![1.0; diff.len()];
    let mut running_sum = 0.0;
    for tau in 1..diff.len() {
        running_sum += diff[tau];
        if running_sum > 0.0 {
            cmnd[tau] = diff[tau] * tau as f32 / running_sum;
        }
    }
    cmnd
}

/// First lag under `threshold`, followed down to its local minimum
fn absolute_threshold(cmnd: &[f32], min_tau: usize, max_tau: usize, threshold: f32) -> Option<usize> {
    let mut tau = (min_tau..=max_tau).find(|&t| cmnd[t] < threshold)?;
    while tau < max_tau && cmnd[tau + 1] < cmnd[tau] {
        tau += 1;
    }
    Some(tau)
}

/// Parabolic interpolation around a minimum to refine τ
pub fn parabolic_interpolation(cmnd: &[f32], tau: usize) -> f32 {
    if tau == 0 || tau + 1 >= cmnd.len() {
        return tau as f32;
    }
    let y1 = cmnd[tau - 1];
    let y2 = cmnd[tau];
    let y3 = cmnd[tau + 1];
    let denom = y1 - 2.0 * y2 + y3;
    if denom.abs() < 1e-12 {
        return tau as f32;
    }
    tau as f32 + 0.5 * (y1 - y3) / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, len: usize, amp: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amp * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_cmnd_constant_signal() {
        let detector = YinDetector::new(1000, 64, 40.0, 400.0, 0.15);
        let frame = vec![1.0f32; 64];
        let diff = detector.difference_function(&frame, 32);
        assert!(diff.iter().all(|d| d.abs() < 1e-3));
    }

    #[test]
    fn test_cmnd_flat_difference() {
        let cmnd = cumulative_mean_normalized_difference(&[0.0, 2.0, 2.0, 2.0]);
        assert_eq!(cmnd, vec![1.0, 1.0, 1.0, 1.0]);

        let silent = cumulative_mean_normalized_difference(&[0.0; 8]);
        assert!(silent.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_parabolic_interpolation_minimum() {
        let cmnd: Vec<f32> = (0..10)
            .map(|i| {
                let x = i as f32 - 5.2;
                x * x
            })
            .collect();
        let refined = parabolic_interpolation(&cmnd, 5);
        assert!((refined - 5.2).abs() < 0.2);
    }

    #[test]
    fn test_detects_a440() {
        let detector = YinDetector::new(44100, 2048, 60.0, 1500.0, 0.15);
        let frame = sine(440.0, 44100, 2048, 0.5);
        let estimate = detector.estimate(&frame).expect("tone should be voiced");
        assert!(
            (estimate.frequency_hz - 440.0).abs() < 2.0,
            "estimated {} Hz",
            estimate.frequency_hz
        );
        assert!(estimate.confidence > 0.9);
    }

    #[test]
    fn test_detects_low_voice_at_16k() {
        let detector = YinDetector::new(16000, 2048, 60.0, 1500.0, 0.15);
        let frame = sine(130.81, 16000, 2048, 0.3);
        let estimate = detector.estimate(&frame).unwrap();
        assert!((estimate.frequency_hz - 130.81).abs() < 1.0);
    }

    #[test]
    fn test_harmonic_rich_tone_reports_fundamental() {
        let sr = 44100;
        let frame: Vec<f32> = (0..2048)
            .map(|i| {
                let t = i as f32 / sr as f32;
                0.4 * (2.0 * PI * 220.0 * t).sin()
                    + 0.3 * (2.0 * PI * 440.0 * t).sin()
                    + 0.2 * (2.0 * PI * 660.0 * t).sin()
            })
            .collect();
        let detector = YinDetector::new(sr, 2048, 60.0, 1500.0, 0.15);
        let estimate = detector.estimate(&frame).unwrap();
        assert!((estimate.frequency_hz - 220.0).abs() < 2.0);
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let detector = YinDetector::new(44100, 2048, 60.0, 1500.0, 0.15);
        assert!(detector.estimate(&vec![0.0; 2048]).is_none());
    }

    #[test]
    fn test_frame_too_short_is_unvoiced() {
        let detector = YinDetector::new(44100, 2048, 60.0, 1500.0, 0.15);
        let frame = sine(440.0, 44100, 40, 0.5);
        assert!(detector.estimate(&frame).is_none());
    }

    #[test]
    fn test_short_final_frame_still_voiced() {
        let detector = YinDetector::new(44100, 2048, 60.0, 1500.0, 0.15);
        let frame = sine(440.0, 44100, 1100, 0.5);
        let estimate = detector.estimate(&frame).unwrap();
        assert!((estimate.frequency_hz - 440.0).abs() < 3.0);
    }
}
