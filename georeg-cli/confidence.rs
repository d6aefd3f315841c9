use georeg_core::{Confidence, ConfidenceThresholds, Transform};

/// Label for an accepted registration.
///
/// Only the inlier count decides the label; the transform is accepted so
/// matrix checks can join later without an interface change.
pub fn evaluate(inliers: usize, transform: &Transform) -> Confidence {
    evaluate_with(inliers, transform, &ConfidenceThresholds::default())
}

pub fn evaluate_with(inliers: usize, _transform: &Transform, thresholds: &ConfidenceThresholds) -> Confidence {
    if inliers < thresholds.none_below {
        Confidence::None
    } else if inliers > thresholds.high_above {
        Confidence::High
    } else {
        Confidence::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_boundaries() {
        let t = Transform::identity();
        assert_eq!(evaluate(0, &t), Confidence::None);
        assert_eq!(evaluate(3, &t), Confidence::None);
        assert_eq!(evaluate(4, &t), Confidence::None);
        assert_eq!(evaluate(5, &t), Confidence::Low);
        assert_eq!(evaluate(25, &t), Confidence::Low);
        assert_eq!(evaluate(26, &t), Confidence::High);
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = ConfidenceThresholds {
            none_below: 10,
            high_above: 12,
        };
        let t = Transform::identity();
        assert_eq!(evaluate_with(9, &t, &thresholds), Confidence::None);
        assert_eq!(evaluate_with(12, &t, &thresholds), Confidence::Low);
        assert_eq!(evaluate_with(13, &t, &thresholds), Confidence::High);
    }

    proptest! {
        #[test]
        fn prop_transform_is_ignored(inliers in 0usize..100, a in -10.0f64..10.0, b in -500.0f64..500.0) {
            let t = Transform::from_rows([[a, 0.5, b], [0.1, a, -b], [0.0, 0.0, 1.0]]).unwrap();
            prop_assert_eq!(evaluate(inliers, &t), evaluate(inliers, &Transform::identity()));
        }
    }
}
