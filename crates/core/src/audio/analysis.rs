//! Silence and speech interval detection.

use crate::audio::effects::db_to_gain;

/// Length of the signal in whole milliseconds.
pub fn length_ms(samples: &[f64], sr: u32) -> u64 {
    if sr == 0 {
        return 0;
    }
    samples.len() as u64 * 1000 / sr as u64
}

fn ms_to_index(ms: u64, sr: u32) -> usize {
    (ms * sr as u64 / 1000) as usize
}

/// Find silent ranges, in milliseconds.
///
/// A window of `min_silence_len_ms` is silent when its RMS (relative to full
/// scale) is at or below `silence_thresh_db`. The window is slid one
/// millisecond at a time and overlapping silent windows are merged. With a
/// threshold of `-inf` only digital silence counts.
pub fn detect_silence(
    samples: &[f64],
    sr: u32,
    min_silence_len_ms: u64,
    silence_thresh_db: f64,
) -> Vec<(u64, u64)> {
    let seg_len = length_ms(samples, sr);
    if seg_len < min_silence_len_ms || min_silence_len_ms == 0 {
        return vec![];
    }

    // Prefix sums of squares make each window O(1).
    let mut prefix = Vec::with_capacity(samples.len() + 1);
    prefix.push(0.0f64);
    let mut acc = 0.0f64;
    for &s in samples {
        acc += s * s;
        prefix.push(acc);
    }

    let thresh = db_to_gain(silence_thresh_db);
    let window_rms = |start_ms: u64| -> f64 {
        let a = ms_to_index(start_ms, sr).min(samples.len());
        let b = ms_to_index(start_ms + min_silence_len_ms, sr).min(samples.len());
        if b <= a {
            return 0.0;
        }
        ((prefix[b] - prefix[a]).max(0.0) / (b - a) as f64).sqrt()
    };

    let last_start = seg_len - min_silence_len_ms;
    let silence_starts: Vec<u64> = (0..=last_start).filter(|&i| window_rms(i) <= thresh).collect();

    let Some((&first, rest)) = silence_starts.split_first() else {
        return vec![];
    };

    let mut ranges = Vec::new();
    let mut range_start = first;
    let mut prev = first;
    for &start in rest {
        let continuous = start == prev + 1;
        let has_gap = start > prev + min_silence_len_ms;
        if !continuous && has_gap {
            ranges.push((range_start, prev + min_silence_len_ms));
            range_start = start;
        }
        prev = start;
    }
    ranges.push((range_start, prev + min_silence_len_ms));
    ranges
}

/// Find non-silent ranges, in milliseconds. The inverse of [`detect_silence`].
pub fn detect_nonsilent(
    samples: &[f64],
    sr: u32,
    min_silence_len_ms: u64,
    silence_thresh_db: f64,
) -> Vec<(u64, u64)> {
    let seg_len = length_ms(samples, sr);
    let silent = detect_silence(samples, sr, min_silence_len_ms, silence_thresh_db);

    if silent.is_empty() {
        return if seg_len > 0 { vec![(0, seg_len)] } else { vec![] };
    }
    if silent[0] == (0, seg_len) {
        return vec![];
    }

    let mut ranges = Vec::new();
    let mut prev_end = 0u64;
    for &(start, end) in &silent {
        if start > prev_end {
            ranges.push((prev_end, start));
        }
        prev_end = end;
    }
    if prev_end < seg_len {
        ranges.push((prev_end, seg_len));
    }
    ranges
}
