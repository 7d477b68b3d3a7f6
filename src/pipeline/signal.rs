use image::GrayImage;
use imageproc::{
    contours::find_contours,
    contrast::{otsu_level, threshold, ThresholdType},
    filter::gaussian_blur_f32,
};
use ndarray::Array1;

pub const SAMPLES_PER_LEAD: usize = 255;

const BLUR_SIGMA: f32 = 0.7;

/// Smooths the lead and binarizes it with Otsu's level. Trace pixels, which
/// are darker than the paper, become foreground.
pub fn preprocess_lead(lead: &GrayImage) -> GrayImage {
    let blurred = gaussian_blur_f32(lead, BLUR_SIGMA);
    let level = otsu_level(&blurred);

    threshold(&blurred, level, ThresholdType::BinaryInverted)
}

/// Follows the longest foreground contour of a binarized lead and returns
/// its vertical coordinates, resampled to `SAMPLES_PER_LEAD` points and
/// min-max scaled to `[0, 1]`. Returns `None` when the lead has no trace.
pub fn extract_signal(binary: &GrayImage) -> Option<Vec<f32>> {
    let longest = find_contours::<u32>(binary)
        .into_iter()
        .max_by_key(|contour| contour.points.len())?;

    let rows: Vec<f32> = longest.points.iter().map(|p| p.y as f32).collect();

    Some(min_max_scale(&resample(&rows, SAMPLES_PER_LEAD)))
}

pub fn combine_signals(signals: &[Vec<f32>]) -> Array1<f32> {
    signals.iter().flatten().copied().collect()
}

fn resample(values: &[f32], len: usize) -> Vec<f32> {
    match values {
        [] => vec![0.0; len],
        [only] => vec![*only; len],
        _ => {
            let step = (values.len() - 1) as f32 / (len - 1).max(1) as f32;
            (0..len)
                .map(|i| {
                    let position = i as f32 * step;
                    let lo = (position.floor() as usize).min(values.len() - 1);
                    let hi = (lo + 1).min(values.len() - 1);
                    let frac = position - lo as f32;
                    values[lo] + (values[hi] - values[lo]) * frac
                })
                .collect()
        }
    }
}

fn min_max_scale(values: &[f32]) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    // a flat trace maps to zeros
    if range <= f32::EPSILON {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn lead_with_trace(trace: impl Fn(u32) -> u32) -> GrayImage {
        let mut lead = GrayImage::from_pixel(200, 100, Luma([250]));
        for x in 10..190 {
            let y = trace(x);
            for dy in 0..3 {
                lead.put_pixel(x, y + dy, Luma([10]));
            }
        }
        lead
    }

    #[test]
    fn test_preprocess_marks_trace_as_foreground() {
        let lead = lead_with_trace(|_| 50);

        let binary = preprocess_lead(&lead);

        assert_eq!(binary.get_pixel(100, 51)[0], 255);
        assert_eq!(binary.get_pixel(100, 10)[0], 0);
    }

    #[test]
    fn test_extract_signal_is_scaled() {
        let lead = lead_with_trace(|x| 20 + x / 4);

        let signal = extract_signal(&preprocess_lead(&lead)).unwrap();

        assert_eq!(signal.len(), SAMPLES_PER_LEAD);
        let min = signal.iter().copied().fold(f32::INFINITY, f32::min);
        let max = signal.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert!(min.abs() < 1e-6);
        assert!((max - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_extract_signal_without_trace() {
        let blank = GrayImage::from_pixel(50, 50, Luma([255]));
        assert_eq!(extract_signal(&preprocess_lead(&blank)), None);
    }

    #[test]
    fn test_resample_keeps_endpoints() {
        let resampled = resample(&[0.0, 10.0, 4.0], 5);
        assert_eq!(resampled, vec![0.0, 5.0, 10.0, 7.0, 4.0]);
        assert_eq!(resample(&[3.0], 4), vec![3.0; 4]);
    }

    #[test]
    fn test_flat_signal_scales_to_zero() {
        assert_eq!(min_max_scale(&[2.0, 2.0, 2.0]), vec![0.0; 3]);
        assert_eq!(min_max_scale(&[1.0, 3.0, 2.0]), vec![0.0, 1.0, 0.5]);
    }

    #[test]
    fn test_combine_concatenates_in_order() {
        let combined = combine_signals(&[vec![1.0, 2.0], vec![3.0]]);
        assert_eq!(combined.to_vec(), vec![1.0, 2.0, 3.0]);
    }
}
