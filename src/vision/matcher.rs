//! Zero-mean normalized cross-correlation template matching.
//!
//! ZNCC is preferred over plain normalized cross-correlation because it is
//! insensitive to global brightness changes between frames. The matcher is a
//! pure function of one frame; it keeps no state between iterations.

use crate::core::{Frame, PixelPoint};
use crate::error::{Error, Result};
use crate::vision::template::Template;

/// Best template placement found in one frame.
#[derive(Clone, Copy, Debug)]
pub struct TemplateMatch {
    /// Center of the matched placement, frame coordinates.
    pub center: PixelPoint,
    /// ZNCC score of the placement, in `[-1, 1]`.
    pub score: f64,
}

/// Find the best ZNCC placement of `template` inside `frame`.
///
/// `margin` is the fraction trimmed from each frame edge to bound the search
/// region (0 searches the whole frame). Every placement in the trimmed region
/// is scored; the maximum wins, ties broken by first occurrence in row-major
/// scan order.
///
/// Fails with a configuration error when the template does not fit inside the
/// search region.
pub fn match_template(frame: &Frame, template: &Template, margin: f64) -> Result<TemplateMatch> {
    let (tw, th) = (template.width(), template.height());
    let x0 = (frame.width as f64 * margin) as usize;
    let y0 = (frame.height as f64 * margin) as usize;
    let x1 = (frame.width as f64 * (1.0 - margin)) as usize;
    let y1 = (frame.height as f64 * (1.0 - margin)) as usize;

    if x1.saturating_sub(x0) < tw || y1.saturating_sub(y0) < th {
        return Err(Error::Configuration(format!(
            "template {tw}x{th} does not fit search region {}x{} of frame {}x{}",
            x1.saturating_sub(x0),
            y1.saturating_sub(y0),
            frame.width,
            frame.height
        )));
    }

    // Template statistics are placement-invariant; hoist them out of the scan.
    let t_mean = template.mean();
    let mut t_dev = vec![0.0f64; tw * th];
    let mut t_norm_sq = 0.0f64;
    for ty in 0..th {
        for tx in 0..tw {
            let dev = f64::from(template.get(tx, ty)) - t_mean;
            t_dev[ty * tw + tx] = dev;
            t_norm_sq += dev * dev;
        }
    }

    let mut best_score = f64::NEG_INFINITY;
    let mut best = (x0, y0);
    let window = (tw * th) as f64;

    for y in y0..=(y1 - th) {
        for x in x0..=(x1 - tw) {
            let mut f_sum = 0.0f64;
            for ty in 0..th {
                for tx in 0..tw {
                    f_sum += f64::from(frame.get(x + tx, y + ty));
                }
            }
            let f_mean = f_sum / window;

            let mut cross = 0.0f64;
            let mut f_norm_sq = 0.0f64;
            for ty in 0..th {
                for tx in 0..tw {
                    let f_dev = f64::from(frame.get(x + tx, y + ty)) - f_mean;
                    cross += f_dev * t_dev[ty * tw + tx];
                    f_norm_sq += f_dev * f_dev;
                }
            }

            let denom = (f_norm_sq * t_norm_sq).sqrt();
            let score = if denom > 0.0 { cross / denom } else { 0.0 };
            // Strict comparison keeps the first row-major occurrence on ties.
            if score > best_score {
                best_score = score;
                best = (x, y);
            }
        }
    }

    Ok(TemplateMatch {
        center: PixelPoint::new(
            (best.0 + tw / 2) as f64,
            (best.1 + th / 2) as f64,
        ),
        score: best_score,
    })
}

/// Locate the beam spot in a calibration frame.
///
/// Returns the centroid of all pixels within 10 counts of the frame maximum,
/// the same estimate the bench uses to fix the reference point before a run.
pub fn locate_beam_spot(frame: &Frame) -> Option<PixelPoint> {
    let max = frame.pixels.iter().copied().max()?;
    let threshold = max.saturating_sub(10);
    let (mut sum_x, mut sum_y, mut count) = (0.0f64, 0.0f64, 0usize);
    for y in 0..frame.height {
        for x in 0..frame.width {
            if frame.get(x, y) >= threshold {
                sum_x += x as f64;
                sum_y += y as f64;
                count += 1;
            }
        }
    }
    if count == 0 {
        return None;
    }
    Some(PixelPoint::new(sum_x / count as f64, sum_y / count as f64))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Pixel-center test against a continuous disc center, the same convention
    // `Template::disc` uses, so an aligned placement correlates perfectly.
    fn frame_with_disc(width: usize, height: usize, cx: usize, cy: usize, r: usize) -> Frame {
        let mut pixels = vec![0u8; width * height];
        for y in 0..height {
            for x in 0..width {
                let dx = x as f64 + 0.5 - cx as f64;
                let dy = y as f64 + 0.5 - cy as f64;
                if dx * dx + dy * dy <= (r * r) as f64 {
                    pixels[y * width + x] = 240;
                }
            }
        }
        Frame {
            index: 0,
            width,
            height,
            pixels,
        }
    }

    #[test]
    fn test_finds_disc_location() {
        let frame = frame_with_disc(80, 60, 50, 22, 6);
        let template = Template::disc(6);
        let m = match_template(&frame, &template, 0.0).unwrap();
        assert!((m.center.x - 50.0).abs() <= 1e-9, "x = {}", m.center.x);
        assert!((m.center.y - 22.0).abs() <= 1e-9, "y = {}", m.center.y);
        // The disc silhouettes agree exactly; ZNCC is affine-invariant, so
        // only floating-point error separates the score from 1.
        assert!(m.score > 0.99, "score = {}", m.score);
    }

    #[test]
    fn test_localizes_off_grid_disc() {
        // A disc rasterized from an integer pixel corner instead of a pixel
        // center correlates imperfectly with the template, but the best
        // placement must still land on the target.
        let mut pixels = vec![0u8; 80 * 60];
        for y in 0..60 {
            for x in 0..80 {
                let dx = x as f64 - 50.0;
                let dy = y as f64 - 22.0;
                if dx * dx + dy * dy <= 36.0 {
                    pixels[y * 80 + x] = 240;
                }
            }
        }
        let frame = Frame {
            index: 0,
            width: 80,
            height: 60,
            pixels,
        };
        let m = match_template(&frame, &Template::disc(6), 0.0).unwrap();
        assert!((m.center.x - 50.0).abs() <= 2.0, "x = {}", m.center.x);
        assert!((m.center.y - 22.0).abs() <= 2.0, "y = {}", m.center.y);
        assert!(m.score > 0.5, "score = {}", m.score);
    }

    #[test]
    fn test_center_stays_inside_search_region() {
        // Target near the edge; a margin-trimmed search must still report a
        // center inside the trimmed bounds.
        let frame = frame_with_disc(100, 100, 8, 8, 5);
        let template = Template::disc(5);
        let margin = 0.1;
        let m = match_template(&frame, &template, margin).unwrap();
        let lo_x = frame.width as f64 * margin;
        let hi_x = frame.width as f64 * (1.0 - margin);
        let lo_y = frame.height as f64 * margin;
        let hi_y = frame.height as f64 * (1.0 - margin);
        assert!(m.center.x >= lo_x && m.center.x <= hi_x);
        assert!(m.center.y >= lo_y && m.center.y <= hi_y);
    }

    #[test]
    fn test_rejects_oversized_template() {
        let frame = frame_with_disc(20, 20, 10, 10, 4);
        let template = Template::disc(15);
        assert!(matches!(
            match_template(&frame, &template, 0.0),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_tie_breaks_first_row_major() {
        // A flat frame scores 0 everywhere; the first placement wins.
        let frame = Frame {
            index: 0,
            width: 30,
            height: 30,
            pixels: vec![128; 900],
        };
        let template = Template::disc(4);
        let m = match_template(&frame, &template, 0.0).unwrap();
        assert_eq!(m.center.x, 4.0);
        assert_eq!(m.center.y, 4.0);
    }

    #[test]
    fn test_locate_beam_spot_centroid() {
        let frame = frame_with_disc(40, 40, 12, 30, 3);
        let spot = locate_beam_spot(&frame).unwrap();
        assert!((spot.x - 12.0).abs() <= 1.0);
        assert!((spot.y - 30.0).abs() <= 1.0);
    }
}
