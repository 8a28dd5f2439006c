// Click point selection for click_image
use crate::template_matching::MatchResult;
use rand::Rng;

/// Optional expansion box around the match center
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClickBox {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub randomize: bool,
}

impl ClickBox {
    fn is_set(&self) -> bool {
        self.width.is_some() || self.height.is_some()
    }
}

/// Frame coordinates to click for a match, `None` when nothing matched.
///
/// Without a box the match center is used as-is. With a box (a missing side
/// falls back to the matched size) the box is centered on the match, and the
/// point is either its center or a uniform pick inside it; either way the
/// point is clamped to the frame.
pub fn click_point<R: Rng + ?Sized>(
    result: &MatchResult,
    frame_size: (u32, u32),
    click_box: &ClickBox,
    rng: &mut R,
) -> Option<(f64, f64)> {
    let (cx, cy) = result.center()?;
    if !click_box.is_set() {
        return Some((cx, cy));
    }
    let width = click_box.width.unwrap_or(result.matched_size.0 as f64);
    let height = click_box.height.unwrap_or(result.matched_size.1 as f64);
    let (x0, x1) = (cx - width / 2.0, cx + width / 2.0);
    let (y0, y1) = (cy - height / 2.0, cy + height / 2.0);
    let (x, y) = if click_box.randomize {
        (uniform(rng, x0, x1), uniform(rng, y0, y1))
    } else {
        ((x0 + x1) / 2.0, (y0 + y1) / 2.0)
    };
    let max_x = frame_size.0.saturating_sub(1) as f64;
    let max_y = frame_size.1.saturating_sub(1) as f64;
    Some((x.clamp(0.0, max_x), y.clamp(0.0, max_y)))
}

fn uniform<R: Rng + ?Sized>(rng: &mut R, low: f64, high: f64) -> f64 {
    if high > low { rng.gen_range(low..=high) } else { low }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn matched_at(x: u32, y: u32, w: u32, h: u32) -> MatchResult {
        MatchResult {
            score: 0.95,
            top_left: Some((x, y)),
            matched_size: (w, h),
            scale: Some(1.0),
        }
    }

    #[test]
    fn test_default_is_center() {
        let mut rng = StdRng::seed_from_u64(1);
        let point = click_point(&matched_at(10, 20, 30, 40), (640, 480), &ClickBox::default(), &mut rng);
        assert_eq!(point, Some((25.0, 40.0)));
    }

    #[test]
    fn test_symmetric_box_keeps_center() {
        let mut rng = StdRng::seed_from_u64(1);
        let click_box = ClickBox {
            width: Some(40.0),
            height: Some(20.0),
            randomize: false,
        };
        let point = click_point(&matched_at(100, 100, 20, 20), (640, 480), &click_box, &mut rng);
        assert_eq!(point, Some((110.0, 110.0)));
    }

    #[test]
    fn test_box_center_is_clamped() {
        let mut rng = StdRng::seed_from_u64(1);
        let click_box = ClickBox {
            width: Some(10.0),
            height: Some(10.0),
            randomize: false,
        };
        let point = click_point(&matched_at(90, 70, 40, 40), (100, 80), &click_box, &mut rng);
        assert_eq!(point, Some((99.0, 79.0)));
    }

    #[test]
    fn test_randomized_point_stays_in_box() {
        let mut rng = StdRng::seed_from_u64(7);
        let click_box = ClickBox {
            width: Some(40.0),
            height: Some(20.0),
            randomize: true,
        };
        let result = matched_at(100, 100, 20, 20);
        for _ in 0..200 {
            let (x, y) = click_point(&result, (640, 480), &click_box, &mut rng).unwrap();
            assert!((90.0..=130.0).contains(&x), "x={x}");
            assert!((100.0..=120.0).contains(&y), "y={y}");
        }
    }

    #[test]
    fn test_no_match_no_point() {
        let mut rng = StdRng::seed_from_u64(1);
        let result = MatchResult::no_match(20, 20);
        assert_eq!(click_point(&result, (640, 480), &ClickBox::default(), &mut rng), None);
    }
}
