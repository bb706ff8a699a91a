//! Synthesis of the disc-shaped match template.

/// A fixed grayscale template sized to the expected target silhouette.
#[derive(Clone, Debug)]
pub struct Template {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl Template {
    /// A filled white disc of the given radius on a black background.
    ///
    /// The template is `2 * radius` pixels square with the disc centered, the
    /// same silhouette the bench produces for the tracked target.
    pub fn disc(radius: usize) -> Self {
        let size = radius * 2;
        let r = radius as f64;
        let mut pixels = vec![0u8; size * size];
        for y in 0..size {
            for x in 0..size {
                let dx = x as f64 + 0.5 - r;
                let dy = y as f64 + 0.5 - r;
                if dx * dx + dy * dy <= r * r {
                    pixels[y * size + x] = 255;
                }
            }
        }
        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    /// Template width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Template height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel value at `(x, y)`.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * self.width + x]
    }

    /// Mean pixel value.
    pub fn mean(&self) -> f64 {
        let sum: u64 = self.pixels.iter().map(|&p| u64::from(p)).sum();
        sum as f64 / self.pixels.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disc_dimensions() {
        let template = Template::disc(10);
        assert_eq!(template.width(), 20);
        assert_eq!(template.height(), 20);
    }

    #[test]
    fn test_disc_filled_center_empty_corner() {
        let template = Template::disc(10);
        assert_eq!(template.get(10, 10), 255);
        assert_eq!(template.get(0, 0), 0);
    }

    #[test]
    fn test_disc_mean_strictly_between_extremes() {
        let mean = Template::disc(8).mean();
        assert!(mean > 0.0 && mean < 255.0);
    }
}
