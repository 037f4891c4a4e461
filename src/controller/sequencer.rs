// Rotate-before-translate: hold drive speed while any wheel is far off heading

/// True when any wheel's steering error exceeds `threshold`.
///
/// All-or-nothing: one misaligned module stops drive on all four.
pub fn should_suppress_translation(angle_errors: &[f64; 4], threshold: f64) -> bool {
    angle_errors.iter().any(|error| error.abs() > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_wheels_translate() {
        assert!(!should_suppress_translation(&[0.1, -0.2, 0.0, 0.49], 0.5));
    }

    #[test]
    fn test_single_misaligned_wheel_suppresses_all() {
        assert!(should_suppress_translation(&[0.0, 0.0, -0.8, 0.0], 0.5));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert!(!should_suppress_translation(&[0.5; 4], 0.5));
    }
}
