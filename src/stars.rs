//! Star model and star-field generation
//!
//! Spawn data (position, radius, parallax factor, twinkle speed) is fixed at
//! generation time. Only `opacity` changes afterwards, so throwing the whole
//! set away and regenerating on resize never accumulates drift.

use glam::Vec2;
use rand::Rng;

/// Sampling parameters for a star field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StarConfig {
    /// Stars per square pixel
    pub density: f64,
    /// Every star twinkles when set, otherwise `twinkle_probability` decides
    pub all_twinkle: bool,
    pub twinkle_probability: f32,
    pub min_twinkle_speed: f32,
    pub max_twinkle_speed: f32,
}

impl Default for StarConfig {
    fn default() -> Self {
        Self {
            density: 0.00015,
            all_twinkle: true,
            twinkle_probability: 0.7,
            min_twinkle_speed: 0.5,
            max_twinkle_speed: 1.0,
        }
    }
}

/// A single point light
#[derive(Debug, Clone, PartialEq)]
pub struct Star {
    pub position: Vec2,
    pub radius: f32,
    pub opacity: f32,
    /// Oscillation period scale; `None` means the star never twinkles
    pub twinkle_speed: Option<f32>,
    /// Sensitivity to pointer and scroll offsets, in `[0.2, 0.8]`
    pub parallax: f32,
}

impl Star {
    #[cfg(test)]
    pub fn twinkles(&self) -> bool {
        self.twinkle_speed.is_some()
    }
}

/// Number of stars a `width`×`height` canvas holds at `density`, never more
/// than one per pixel
pub fn star_count(width: u32, height: u32, density: f64) -> usize {
    if !density.is_finite() || density <= 0.0 {
        return 0;
    }
    let area = width as f64 * height as f64;
    (area * density).floor().min(area) as usize
}

/// Generate a fresh star set covering `[0, width) × [0, height)`
pub fn generate<R: Rng + ?Sized>(
    width: u32,
    height: u32,
    config: &StarConfig,
    rng: &mut R,
) -> Vec<Star> {
    let count = star_count(width, height, config.density);
    let (w, h) = (width as f32, height as f32);
    let (min_speed, max_speed) = if config.min_twinkle_speed <= config.max_twinkle_speed {
        (config.min_twinkle_speed, config.max_twinkle_speed)
    } else {
        (config.max_twinkle_speed, config.min_twinkle_speed)
    };

    (0..count)
        .map(|_| {
            let position = Vec2::new(sample_below(rng, w), sample_below(rng, h));
            let radius = 0.5 + rng.random::<f32>() * 0.05;
            let twinkles = config.all_twinkle || rng.random::<f32>() < config.twinkle_probability;
            let opacity = 0.5 + rng.random::<f32>() * 0.5;
            let twinkle_speed =
                twinkles.then(|| min_speed + rng.random::<f32>() * (max_speed - min_speed));
            let parallax = 0.2 + rng.random::<f32>() * 0.6;

            Star {
                position,
                radius,
                opacity,
                twinkle_speed,
                parallax,
            }
        })
        .collect()
}

/// Uniform sample in `[0, bound)`. f32 rounding can land exactly on `bound`
/// for large canvases, so step just below it.
fn sample_below<R: Rng + ?Sized>(rng: &mut R, bound: f32) -> f32 {
    let v = rng.random::<f32>() * bound;
    if v >= bound && bound > 0.0 {
        f32::from_bits(bound.to_bits() - 1)
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn count_is_floor_of_area_times_density() {
        assert_eq!(star_count(1920, 1080, 0.00015), 311);
        assert_eq!(star_count(100, 100, 0.00015), 1);
        assert_eq!(star_count(10, 10, 0.00015), 0);
        assert_eq!(star_count(0, 500, 0.00015), 0);
        assert_eq!(star_count(500, 500, 0.0), 0);
        assert_eq!(star_count(500, 500, -1.0), 0);
    }

    #[test]
    fn count_never_exceeds_one_star_per_pixel() {
        assert_eq!(star_count(1920, 1080, 1e15), 1920 * 1080);
        assert_eq!(star_count(64, 64, 2.0), 64 * 64);
        assert_eq!(star_count(64, 64, f64::INFINITY), 0);
        assert_eq!(star_count(64, 64, f64::NAN), 0);
    }

    #[test]
    fn stars_stay_inside_canvas() {
        let mut rng = StdRng::seed_from_u64(7);
        for &(w, h) in &[(1920, 1080), (375, 812), (64, 4000), (1, 1)] {
            let config = StarConfig {
                density: 0.01,
                ..StarConfig::default()
            };
            let stars = generate(w, h, &config, &mut rng);
            assert_eq!(stars.len(), star_count(w, h, config.density));
            for star in &stars {
                assert!(star.position.x >= 0.0 && star.position.x < w as f32);
                assert!(star.position.y >= 0.0 && star.position.y < h as f32);
                assert!((0.5..=0.55).contains(&star.radius));
                assert!((0.5..=1.0).contains(&star.opacity));
                assert!((0.2..=0.8).contains(&star.parallax));
            }
        }
    }

    #[test]
    fn regeneration_differs_but_count_is_stable() {
        let mut rng = StdRng::seed_from_u64(42);
        let config = StarConfig::default();
        let first = generate(800, 600, &config, &mut rng);
        let second = generate(800, 600, &config, &mut rng);
        assert_eq!(first.len(), second.len());
        assert_ne!(first, second);
    }

    #[test]
    fn empty_canvas_has_no_stars() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(generate(0, 0, &StarConfig::default(), &mut rng).is_empty());
    }

    #[test]
    fn all_twinkle_gives_every_star_a_speed_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        let stars = generate(1000, 1000, &StarConfig::default(), &mut rng);
        assert!(stars.iter().all(|s| s.twinkle_speed.is_some_and(|v| (0.5..=1.0).contains(&v))));
    }

    #[test]
    fn twinkle_probability_gates_subset() {
        let mut rng = StdRng::seed_from_u64(9);
        let none = StarConfig {
            all_twinkle: false,
            twinkle_probability: 0.0,
            ..StarConfig::default()
        };
        assert!(generate(1000, 1000, &none, &mut rng).iter().all(|s| !s.twinkles()));

        let some = StarConfig {
            all_twinkle: false,
            twinkle_probability: 0.5,
            density: 0.001,
            ..StarConfig::default()
        };
        let stars = generate(1000, 1000, &some, &mut rng);
        let twinkling = stars.iter().filter(|s| s.twinkles()).count();
        assert!(twinkling > 300 && twinkling < 700, "twinkling = {}", twinkling);
    }

    #[test]
    fn swapped_speed_bounds_are_normalised() {
        let mut rng = StdRng::seed_from_u64(11);
        let config = StarConfig {
            min_twinkle_speed: 2.0,
            max_twinkle_speed: 1.0,
            density: 0.001,
            ..StarConfig::default()
        };
        for star in generate(200, 200, &config, &mut rng) {
            let speed = star.twinkle_speed.unwrap();
            assert!((1.0..=2.0).contains(&speed));
        }
    }
}
