//! Sample-level primitives: silence, splice, gain, overlay, mix-down.
//!
//! Everything here works on mono `f64` buffers in [-1, 1]. The clip-level
//! API in [`crate::audio::clip`] is built on top of these.

/// Number of samples covering `duration_ms` at `sr`, rounded.
///
/// Negative durations count as zero.
pub fn ms_to_samples(duration_ms: f64, sr: u32) -> usize {
    if !(duration_ms > 0.0) {
        return 0;
    }
    (duration_ms / 1000.0 * sr as f64).round() as usize
}

/// Generate silence of given duration.
pub fn generate_silence(duration_ms: f64, sr: u32) -> Vec<f64> {
    vec![0.0; ms_to_samples(duration_ms, sr)]
}

/// Concatenate audio segments back to back. No cross-fade.
pub fn concatenate(clips: &[&[f64]]) -> Vec<f64> {
    let total: usize = clips.iter().map(|c| c.len()).sum();
    let mut result = Vec::with_capacity(total);
    for clip in clips {
        result.extend_from_slice(clip);
    }
    result
}

/// Convert a dB gain to a linear factor.
pub fn db_to_gain(db: f64) -> f64 {
    10.0f64.powf(db / 20.0)
}

/// Adjust volume by dB amount. Modifies samples in place.
pub fn adjust_volume(samples: &mut [f64], db: f64) {
    if db.abs() < 0.01 {
        return;
    }
    let gain = db_to_gain(db);
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}

/// Overlay `patch` onto `base` starting at sample `offset`.
///
/// The part of `base` under the patch is scaled by `gain_during_overlay_db`
/// before the patch is added. `base` keeps its length; whatever part of the
/// patch runs past the end is dropped.
pub fn overlay_into(base: &mut [f64], patch: &[f64], offset: usize, gain_during_overlay_db: f64) {
    if offset >= base.len() || patch.is_empty() {
        return;
    }

    let gain = db_to_gain(gain_during_overlay_db);
    let end = (offset + patch.len()).min(base.len());
    for (sample, &p) in base[offset..end].iter_mut().zip(patch) {
        *sample = *sample * gain + p;
    }
}

/// Sum several tracks into one, each weighted `1/N`.
///
/// Output length is that of the longest input; shorter inputs contribute
/// silence past their end.
pub fn mix_down(tracks: &[&[f64]]) -> Vec<f64> {
    let len = tracks.iter().map(|t| t.len()).max().unwrap_or(0);
    if tracks.is_empty() {
        return vec![];
    }
    let weight = 1.0 / tracks.len() as f64;
    let mut result = vec![0.0; len];
    for track in tracks {
        for (out, &s) in result.iter_mut().zip(track.iter()) {
            *out += s * weight;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ms_to_samples() {
        assert_eq!(ms_to_samples(100.0, 16000), 1600);
        assert_eq!(ms_to_samples(0.0, 16000), 0);
        assert_eq!(ms_to_samples(-5.0, 16000), 0);
        assert_eq!(ms_to_samples(f64::NAN, 16000), 0);
    }

    #[test]
    fn test_generate_silence() {
        let silence = generate_silence(100.0, 16000);
        assert_eq!(silence.len(), 1600);
        assert!(silence.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_concatenate() {
        let a = vec![1.0; 100];
        let b = vec![2.0; 50];
        let result = concatenate(&[&a, &b]);
        assert_eq!(result.len(), 150);
        assert_eq!(result[99], 1.0);
        assert_eq!(result[100], 2.0);
    }

    #[test]
    fn test_concatenate_empty() {
        assert!(concatenate(&[]).is_empty());
    }

    #[test]
    fn test_adjust_volume() {
        let mut samples = vec![0.5; 100];
        adjust_volume(&mut samples, 6.0); // +6 dB ≈ 2x
        assert!((samples[0] - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_adjust_volume_negative() {
        let mut samples = vec![1.0; 100];
        adjust_volume(&mut samples, -6.0); // -6 dB ≈ 0.5x
        assert!((samples[0] - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_adjust_volume_zero() {
        let mut samples = vec![0.5; 100];
        adjust_volume(&mut samples, 0.0);
        assert_eq!(samples[0], 0.5);
    }

    #[test]
    fn test_overlay_attenuates_base_under_patch() {
        let mut result = vec![1.0; 100];
        overlay_into(&mut result, &[0.25; 20], 10, -20.0);
        assert_eq!(result.len(), 100);
        assert_eq!(result[9], 1.0);
        // 1.0 * 0.1 + 0.25
        assert!((result[10] - 0.35).abs() < 1e-9);
        assert!((result[29] - 0.35).abs() < 1e-9);
        assert_eq!(result[30], 1.0);
    }

    #[test]
    fn test_overlay_truncates_patch() {
        let mut result = vec![0.0; 10];
        overlay_into(&mut result, &[1.0; 20], 5, 0.0);
        assert_eq!(result.len(), 10);
        assert_eq!(result[4], 0.0);
        assert_eq!(result[9], 1.0);
    }

    #[test]
    fn test_overlay_offset_past_end() {
        let mut base = vec![0.5; 10];
        overlay_into(&mut base, &[1.0; 5], 10, -6.0);
        assert_eq!(base, vec![0.5; 10]);
    }

    #[test]
    fn test_overlay_into_repeated_patches() {
        let mut base = vec![1.0; 10];
        overlay_into(&mut base, &[0.5; 2], 0, -6.0);
        overlay_into(&mut base, &[0.5; 2], 6, -6.0);
        let ducked = db_to_gain(-6.0) + 0.5;
        assert!((base[1] - ducked).abs() < 1e-9);
        assert_eq!(base[3], 1.0);
        assert!((base[7] - ducked).abs() < 1e-9);
    }

    #[test]
    fn test_mix_down_longest() {
        let a = vec![1.0; 10];
        let b = vec![0.5; 4];
        let result = mix_down(&[&a, &b]);
        assert_eq!(result.len(), 10);
        assert!((result[0] - 0.75).abs() < 1e-9);
        assert!((result[9] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_mix_down_empty() {
        assert!(mix_down(&[]).is_empty());
    }
}
