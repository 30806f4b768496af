use tracing::debug;

use crate::types::{Detection, Point};

/// Keep detections whose screen position lies within `radius` of `center`.
/// Input order is preserved. A radius of zero or less disables hunting and keeps nothing.
pub fn filter(detections: &[Detection], center: Point, radius: f64) -> Vec<Detection> {
    if radius <= 0.0 {
        return Vec::new();
    }
    detections
        .iter()
        .filter(|d| {
            let distance = d.screen_position.distance_to(center);
            let inside = distance <= radius;
            debug!(
                "{} {} at {:.1}px",
                if inside { "in zone" } else { "outside zone" },
                d.screen_position,
                distance
            );
            inside
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CENTER: Point = Point::new(960, 540);

    #[test]
    fn near_detection_is_kept_far_one_dropped() {
        let near = Detection::at(Point::new(1000, 560), 0.9);
        let far = Detection::at(Point::new(1400, 540), 0.9);
        assert_eq!(filter(&[near.clone()], CENTER, 300.0), vec![near]);
        assert!(filter(&[far], CENTER, 300.0).is_empty());
    }

    #[test]
    fn boundary_is_inclusive() {
        let edge = Detection::at(Point::new(1260, 540), 0.5);
        assert_eq!(filter(&[edge], CENTER, 300.0).len(), 1);
    }

    #[test]
    fn non_positive_radius_keeps_nothing() {
        let on_center = Detection::at(CENTER, 0.9);
        assert!(filter(&[on_center.clone()], CENTER, 0.0).is_empty());
        assert!(filter(&[on_center], CENTER, -5.0).is_empty());
    }

    #[test]
    fn order_is_preserved() {
        let dets: Vec<Detection> = [900, 1000, 950, 1100]
            .iter()
            .map(|&x| Detection::at(Point::new(x, 540), 0.5))
            .collect();
        let kept: Vec<i32> = filter(&dets, CENTER, 300.0).iter().map(|d| d.screen_position.x).collect();
        assert_eq!(kept, vec![900, 1000, 950, 1100]);
    }

    proptest! {
        #[test]
        fn kept_iff_within_radius(
            points in prop::collection::vec((0i32..1920, 0i32..1080), 0..40),
            radius in -50.0f64..1200.0,
        ) {
            let dets: Vec<Detection> = points.iter().map(|&(x, y)| Detection::at(Point::new(x, y), 0.5)).collect();
            let kept = filter(&dets, CENTER, radius);
            let expected: Vec<Detection> = dets
                .iter()
                .filter(|d| radius > 0.0 && d.screen_position.distance_to(CENTER) <= radius)
                .cloned()
                .collect();
            prop_assert_eq!(kept, expected);
        }
    }
}
