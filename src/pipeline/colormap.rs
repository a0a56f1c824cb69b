//! The `gnuplot2` colour map (matplotlib gnuplot rgbformulae 30, 31, 32).
//!
//! Black → blue → purple → orange → white. Sampled into a 256-entry lookup
//! table the same way matplotlib builds its `LinearSegmentedColormap`, so a
//! grey level maps to the colour matplotlib would produce.

use image::{GrayImage, Rgb, RgbImage};

const LUT_SIZE: usize = 256;

fn clip(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn red(x: f64) -> f64 {
    clip(x / 0.32 - 0.78125)
}

fn green(x: f64) -> f64 {
    clip(2.0 * x - 0.84)
}

fn blue(x: f64) -> f64 {
    let b = if x < 0.25 {
        4.0 * x
    } else if x < 0.92 {
        -2.0 * x + 1.84
    } else {
        x / 0.08 - 11.5
    };
    clip(b)
}

/// 256-entry `gnuplot2` table of 8-bit RGB colours.
#[derive(Debug, Clone)]
pub struct Gnuplot2 {
    lut: [[u8; 3]; LUT_SIZE],
}

impl Default for Gnuplot2 {
    fn default() -> Self {
        Self::new()
    }
}

impl Gnuplot2 {
    pub fn new() -> Self {
        let mut lut = [[0u8; 3]; LUT_SIZE];
        for (i, entry) in lut.iter_mut().enumerate() {
            let x = i as f64 / (LUT_SIZE - 1) as f64;
            // Float → u8 truncates, as numpy's uint8 cast does.
            *entry = [
                (255.0 * red(x)) as u8,
                (255.0 * green(x)) as u8,
                (255.0 * blue(x)) as u8,
            ];
        }
        Self { lut }
    }

    /// Colour for a grey level. `gray / 255` is looked up the way matplotlib
    /// indexes a float in [0, 1]: `floor(v · N)` clamped to `N - 1`.
    pub fn color(&self, gray: u8) -> [u8; 3] {
        let index = ((f64::from(gray) / 255.0 * LUT_SIZE as f64) as usize).min(LUT_SIZE - 1);
        self.lut[index]
    }

    pub fn apply(&self, gray: &GrayImage) -> RgbImage {
        let (width, height) = gray.dimensions();
        RgbImage::from_fn(width, height, |x, y| Rgb(self.color(gray.get_pixel(x, y)[0])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn endpoints_are_black_and_white() {
        let cmap = Gnuplot2::new();
        assert_eq!(cmap.color(0), [0, 0, 0]);
        assert_eq!(cmap.color(255), [255, 255, 255]);
    }

    #[test]
    fn low_values_are_blue() {
        let cmap = Gnuplot2::new();
        let [r, g, b] = cmap.color(50);
        assert_eq!((r, g), (0, 0));
        assert!(b > 150, "expected strong blue, got {b}");
    }

    #[test]
    fn middle_values_turn_purple_then_orange() {
        let cmap = Gnuplot2::new();
        // x = 128/255: red ramps up, blue is on its way down, green has
        // just left zero (it starts at x = 0.42).
        let [r, g, b] = cmap.color(128);
        assert!(g > 0 && g < 64, "got {r} {g} {b}");
        assert!(r > 100 && b > 100, "got {r} {g} {b}");

        // x = 200/255: red saturated, green rising, blue dropping.
        let [r, g, b] = cmap.color(200);
        assert_eq!(r, 255);
        assert!(g > 100 && b < 100, "got {r} {g} {b}");
    }

    #[test]
    fn known_table_entries() {
        let cmap = Gnuplot2::new();
        // i = 64: x = 0.25098, blue = -2x + 1.84 = 1.33804 → clipped to 1.
        assert_eq!(cmap.color(64), [0, 0, 255]);
        // i = 128: x = 0.50196
        //   r = 0.50196 / 0.32 - 0.78125 = 0.78738 → 200
        //   g = 2 · 0.50196 - 0.84 = 0.16392 → 41
        //   b = -1.00392 + 1.84 = 0.83608 → 213
        assert_eq!(cmap.color(128), [200, 41, 213]);
        // i = 200: x = 0.78431, g = 0.72863 → 185, b = 0.27137 → 69.
        assert_eq!(cmap.color(200), [255, 185, 69]);
    }

    #[test]
    fn apply_preserves_dimensions() {
        let cmap = Gnuplot2::new();
        let gray = GrayImage::from_fn(7, 3, |x, _| Luma([(x * 40) as u8]));
        let rgb = cmap.apply(&gray);
        assert_eq!(rgb.dimensions(), (7, 3));
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(rgb.get_pixel(5, 2), &Rgb(cmap.color(200)));
    }
}
