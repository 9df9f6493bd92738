//! Hue-bucket heuristics for chemical indicator strips.
//!
//! A photographed strip is sampled on a fixed 3x3 grid; each pixel is converted to
//! HSL and sorted into named buckets. The buckets drive a suggestion for the two
//! chemical indicators that the operator can accept or override.

use common::model::record::IndicatorResult;
use common::requests::ChemicalValues;
use image::{DynamicImage, GenericImageView};
use log::warn;
use serde::Serialize;

/// Relative sample positions, used for both axes.
const GRID: [f32; 3] = [0.2, 0.5, 0.8];

/// Which color families were observed in a sample set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ColorBuckets {
    pub green_or_yellow: bool,
    pub orange_brown: bool,
    pub dark_blue_black_gray: bool,
    pub dark_brown_pattern: bool,
}

impl ColorBuckets {
    fn dark_range(&self) -> bool {
        self.dark_blue_black_gray || self.dark_brown_pattern
    }
}

/// Hue in degrees `[0, 360)`, saturation and lightness in `[0, 1]`.
pub fn rgb_to_hsl([r, g, b]: [u8; 3]) -> (f32, f32, f32) {
    let r = f32::from(r) / 255.0;
    let g = f32::from(g) / 255.0;
    let b = f32::from(b) / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    let delta = max - min;
    if delta == 0.0 {
        return (0.0, 0.0, l);
    }
    let s = if l > 0.5 {
        delta / (2.0 - max - min)
    } else {
        delta / (max + min)
    };
    let h = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    (h * 60.0, s, l)
}

fn within(value: f32, low: f32, high: f32) -> bool {
    (low..=high).contains(&value)
}

/// Sorts samples into buckets, in order, stopping as soon as the answer is settled.
pub fn classify(samples: &[[u8; 3]]) -> ColorBuckets {
    let mut buckets = ColorBuckets::default();
    for &rgb in samples {
        let (h, s, l) = rgb_to_hsl(rgb);

        if (within(h, 60.0, 180.0) || within(h, 45.0, 75.0)) && s > 0.3 && l > 0.2 {
            buckets.green_or_yellow = true;
            break;
        }
        if within(h, 15.0, 45.0) && s > 0.2 && l > 0.2 && l < 0.7 {
            buckets.orange_brown = true;
        }
        if l < 0.4 || (within(h, 200.0, 260.0) && s > 0.3 && l < 0.5) {
            buckets.dark_blue_black_gray = true;
        }
        if within(h, 20.0, 40.0) && l < 0.4 && s > 0.3 {
            buckets.dark_brown_pattern = true;
        }

        if buckets.orange_brown && buckets.dark_blue_black_gray && buckets.dark_brown_pattern {
            break;
        }
    }
    buckets
}

/// Pixels at the 3x3 grid of relative positions, row by row.
pub fn sample_grid(image: &DynamicImage) -> Vec<[u8; 3]> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let at = |extent: u32, fraction: f32| ((extent as f32 * fraction) as u32).min(extent - 1);
    let mut samples = Vec::with_capacity(GRID.len() * GRID.len());
    for fy in GRID {
        for fx in GRID {
            let pixel = image.get_pixel(at(width, fx), at(height, fy));
            samples.push([pixel[0], pixel[1], pixel[2]]);
        }
    }
    samples
}

/// Samples and classifies an encoded image. Undecodable bytes detect nothing.
pub fn analyze_image(bytes: &[u8]) -> ColorBuckets {
    match image::load_from_memory(bytes) {
        Ok(decoded) => classify(&sample_grid(&decoded)),
        Err(e) => {
            warn!("Could not decode image for color analysis: {}", e);
            classify(&[])
        }
    }
}

/// Chemical indicator values implied by `buckets`; fields without evidence keep
/// their `current` value.
pub fn suggest_chemical_indicators(buckets: &ColorBuckets, current: ChemicalValues) -> ChemicalValues {
    if buckets.green_or_yellow {
        return ChemicalValues {
            chemical_external: Some(IndicatorResult::Fail),
            chemical_internal: Some(IndicatorResult::Fail),
        };
    }
    ChemicalValues {
        chemical_external: if buckets.orange_brown {
            Some(IndicatorResult::Pass)
        } else {
            current.chemical_external
        },
        chemical_internal: if buckets.dark_range() {
            Some(IndicatorResult::Pass)
        } else {
            current.chemical_internal
        },
    }
}
