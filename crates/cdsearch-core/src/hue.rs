//! Six-sector hue classification and the calibrated color-depth distance.
//!
//! A color-depth pixel is classified by its dominant and secondary channel,
//! e.g. blue > red > green is [`HueSector::BlueRed`]. The ratio
//! `secondary / dominant` locates the pixel inside its sector. Two pixels in
//! the same sector are compared by ratio difference; pixels in neighbouring
//! sectors are compared by their distance to the calibrated sector boundary.

use crate::image::channels;

/// Distance reported for pixels that cannot match (unclassifiable or
/// non-adjacent sectors).
pub const UNMATCHED_DISTANCE: f64 = 10_000.0;
/// Distance reported when both ratios are clipped at the saturation value.
pub const SATURATED_DISTANCE: f64 = 1_000.0;
/// Ratio value treated as clipped.
pub const SATURATED_RATIO: f64 = 255.0;

// Ratio of the secondary channel at each sector boundary of the color-depth LUT.
pub const BLUE_RED_TO_BLUE_GREEN: f64 = 0.354_862_745;
pub const BLUE_GREEN_TO_GREEN_BLUE: f64 = 0.996_078_431;
pub const GREEN_BLUE_TO_GREEN_RED: f64 = 0.505_882_353;
pub const GREEN_RED_TO_RED_GREEN: f64 = 0.996_078_431;
pub const RED_GREEN_TO_RED_BLUE: f64 = 0.505_882_353;

/// Hue sector named after `(dominant, secondary)` channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HueSector {
    BlueRed = 0,
    BlueGreen = 1,
    GreenBlue = 2,
    GreenRed = 3,
    RedGreen = 4,
    RedBlue = 5,
}

impl HueSector {
    pub const ALL: [HueSector; 6] = [
        HueSector::BlueRed,
        HueSector::BlueGreen,
        HueSector::GreenBlue,
        HueSector::GreenRed,
        HueSector::RedGreen,
        HueSector::RedBlue,
    ];
}

/// Sector plus the `secondary / dominant` channel ratio.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HueClass {
    pub sector: HueSector,
    pub ratio: f64,
}

/// Classify a packed RGB pixel.
///
/// Returns `None` when no channel is strictly dominant (black, gray, or two
/// channels tied for the maximum). Ties of the secondary channel fall into
/// the second sector of the dominant pair.
pub fn classify(p: u32) -> Option<HueClass> {
    let (r, g, b) = channels(p);
    let class = |sector, num: u8, den: u8| {
        Some(HueClass {
            sector,
            ratio: num as f64 / den as f64,
        })
    };
    if b > r && b > g {
        if r > g {
            class(HueSector::BlueRed, r, b)
        } else {
            class(HueSector::BlueGreen, g, b)
        }
    } else if g > b && g > r {
        if b > r {
            class(HueSector::GreenBlue, b, g)
        } else {
            class(HueSector::GreenRed, r, g)
        }
    } else if r > b && r > g {
        if g > b {
            class(HueSector::RedGreen, g, r)
        } else {
            class(HueSector::RedBlue, b, r)
        }
    } else {
        None
    }
}

/// Ratio interval in which a cross-boundary comparison is allowed.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Window {
    Below(f64),
    Above(f64),
}

impl Window {
    #[inline]
    fn contains(self, ratio: f64) -> bool {
        match self {
            Window::Below(v) => ratio < v,
            Window::Above(v) => ratio > v,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Rule {
    Same,
    Boundary {
        value: f64,
        mask: Window,
        target: Window,
    },
    Unmatched,
}

#[derive(Clone, Copy)]
struct BoundaryRule {
    lower: HueSector,
    upper: HueSector,
    value: f64,
    lower_window: Window,
    upper_window: Window,
}

const BOUNDARIES: [BoundaryRule; 5] = [
    BoundaryRule {
        lower: HueSector::BlueRed,
        upper: HueSector::BlueGreen,
        value: BLUE_RED_TO_BLUE_GREEN,
        lower_window: Window::Below(0.44),
        upper_window: Window::Below(0.54),
    },
    BoundaryRule {
        lower: HueSector::BlueGreen,
        upper: HueSector::GreenBlue,
        value: BLUE_GREEN_TO_GREEN_BLUE,
        lower_window: Window::Above(0.8),
        upper_window: Window::Above(0.8),
    },
    BoundaryRule {
        lower: HueSector::GreenBlue,
        upper: HueSector::GreenRed,
        value: GREEN_BLUE_TO_GREEN_RED,
        lower_window: Window::Below(0.7),
        upper_window: Window::Below(0.7),
    },
    BoundaryRule {
        lower: HueSector::GreenRed,
        upper: HueSector::RedGreen,
        value: GREEN_RED_TO_RED_GREEN,
        lower_window: Window::Above(0.8),
        upper_window: Window::Above(0.8),
    },
    BoundaryRule {
        lower: HueSector::RedGreen,
        upper: HueSector::RedBlue,
        value: RED_GREEN_TO_RED_BLUE,
        lower_window: Window::Below(0.7),
        upper_window: Window::Below(0.7),
    },
];

const fn build_rules() -> [[Rule; 6]; 6] {
    let mut table = [[Rule::Unmatched; 6]; 6];
    let mut i = 0;
    while i < 6 {
        table[i][i] = Rule::Same;
        i += 1;
    }
    let mut k = 0;
    while k < BOUNDARIES.len() {
        let b = BOUNDARIES[k];
        table[b.lower as usize][b.upper as usize] = Rule::Boundary {
            value: b.value,
            mask: b.lower_window,
            target: b.upper_window,
        };
        table[b.upper as usize][b.lower as usize] = Rule::Boundary {
            value: b.value,
            mask: b.upper_window,
            target: b.lower_window,
        };
        k += 1;
    }
    table
}

/// `(mask sector, target sector)` → comparison rule.
static RULES: [[Rule; 6]; 6] = build_rules();

/// Distance between two classified pixels.
pub fn class_distance(mask: HueClass, target: HueClass) -> f64 {
    match RULES[mask.sector as usize][target.sector as usize] {
        Rule::Same => {
            if mask.ratio == SATURATED_RATIO && target.ratio == SATURATED_RATIO {
                SATURATED_DISTANCE
            } else {
                (mask.ratio - target.ratio).abs()
            }
        }
        Rule::Boundary {
            value,
            mask: mask_window,
            target: target_window,
        } => {
            if mask_window.contains(mask.ratio) && target_window.contains(target.ratio) {
                (mask.ratio - value).abs() + (target.ratio - value).abs()
            } else {
                UNMATCHED_DISTANCE
            }
        }
        Rule::Unmatched => UNMATCHED_DISTANCE,
    }
}

/// Calibrated color-depth distance between a mask pixel and a target pixel.
#[inline]
pub fn pixel_distance(mask: u32, target: u32) -> f64 {
    match (classify(mask), classify(target)) {
        (Some(m), Some(t)) => class_distance(m, t),
        _ => UNMATCHED_DISTANCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::rgb;
    use approx::assert_relative_eq;

    #[test]
    fn classify_picks_dominant_then_secondary() {
        let c = classify(rgb(100, 20, 200)).unwrap();
        assert_eq!(c.sector, HueSector::BlueRed);
        assert_relative_eq!(c.ratio, 0.5);
        assert_eq!(classify(rgb(0, 255, 0)).unwrap().sector, HueSector::GreenRed);
        assert_eq!(classify(rgb(10, 255, 11)).unwrap().sector, HueSector::GreenBlue);
        assert_eq!(classify(rgb(255, 0, 0)).unwrap().sector, HueSector::RedBlue);
        assert_eq!(classify(rgb(255, 9, 8)).unwrap().sector, HueSector::RedGreen);
        assert_eq!(classify(rgb(5, 5, 200)).unwrap().sector, HueSector::BlueGreen);
    }

    #[test]
    fn classify_rejects_ties_and_gray() {
        assert_eq!(classify(rgb(0, 0, 0)), None);
        assert_eq!(classify(rgb(90, 90, 90)), None);
        assert_eq!(classify(rgb(200, 200, 10)), None);
    }

    #[test]
    fn identical_pixels_have_zero_distance() {
        for p in [rgb(255, 0, 0), rgb(3, 140, 250), rgb(250, 249, 0)] {
            assert_eq!(pixel_distance(p, p), 0.0);
        }
    }

    #[test]
    fn table_is_symmetric_in_sector_pairs() {
        for m in HueSector::ALL {
            for t in HueSector::ALL {
                let forward = RULES[m as usize][t as usize];
                let backward = RULES[t as usize][m as usize];
                match (forward, backward) {
                    (Rule::Same, Rule::Same) | (Rule::Unmatched, Rule::Unmatched) => {}
                    (Rule::Boundary { value: a, .. }, Rule::Boundary { value: b, .. }) => {
                        assert_eq!(a, b)
                    }
                    other => panic!("asymmetric rule for {m:?}/{t:?}: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn adjacent_sectors_measure_distance_to_boundary() {
        // blue-green (ratio 50/255) vs blue-red (ratio 40/255)
        let d = pixel_distance(rgb(0, 50, 255), rgb(40, 0, 255));
        let expected = (BLUE_RED_TO_BLUE_GREEN - 50.0 / 255.0) + (BLUE_RED_TO_BLUE_GREEN - 40.0 / 255.0);
        assert_relative_eq!(d, expected, epsilon = 1e-12);

        // outside the window of the blue-red side
        assert_eq!(
            pixel_distance(rgb(200, 0, 255), rgb(0, 50, 255)),
            UNMATCHED_DISTANCE
        );
    }

    #[test]
    fn distant_sectors_never_match() {
        assert_eq!(
            pixel_distance(rgb(100, 0, 200), rgb(100, 200, 0)),
            UNMATCHED_DISTANCE
        );
        assert_eq!(pixel_distance(rgb(90, 90, 90), rgb(90, 90, 90)), UNMATCHED_DISTANCE);
    }

    #[test]
    fn saturated_ratios_are_escalated() {
        let clipped = HueClass {
            sector: HueSector::RedGreen,
            ratio: SATURATED_RATIO,
        };
        assert_eq!(class_distance(clipped, clipped), SATURATED_DISTANCE);
    }
}
