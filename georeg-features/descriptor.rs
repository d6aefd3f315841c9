use georeg_core::DescriptorSet;

/// Hellinger mapping of float descriptors: L1-normalise each row, then take
/// the element-wise square root. Binary sets are returned unchanged.
///
/// After the transform every non-zero row has unit L2 norm, so Euclidean
/// distance between rows behaves like the Hellinger kernel.
pub fn root_transform(set: DescriptorSet) -> DescriptorSet {
    match set {
        DescriptorSet::Float { width, mut data } => {
            if width > 0 {
                for row in data.chunks_mut(width) {
                    let l1: f32 = row.iter().map(|v| v.abs()).sum();
                    if l1 > 0.0 {
                        for v in row.iter_mut() {
                            *v = (v.abs() / l1).sqrt();
                        }
                    }
                }
            }
            DescriptorSet::Float { width, data }
        }
        binary => binary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rows_become_unit_length() {
        let set = DescriptorSet::from_float_rows(4, &[[1.0f32, 3.0, 0.0, 0.0], [0.25, 0.25, 0.25, 0.25]]);
        let rooted = root_transform(set);
        let row = rooted.float_row(0).unwrap();
        assert_relative_eq!(row[0], 0.5);
        assert_relative_eq!(row[1], 0.75f32.sqrt());
        for i in 0..2 {
            let norm: f32 = rooted.float_row(i).unwrap().iter().map(|v| v * v).sum();
            assert_relative_eq!(norm, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_zero_row_stays_zero() {
        let rooted = root_transform(DescriptorSet::from_float_rows(3, &[[0.0f32; 3]]));
        assert_eq!(rooted.float_row(0).unwrap(), &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_binary_untouched() {
        let set = DescriptorSet::from_binary_rows(2, &[[0xffu8, 0x01]]);
        assert_eq!(root_transform(set.clone()), set);
    }
}
