/// Arithmetic mean (0 for an empty slice).
pub fn mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return 0.0;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

/// Population standard deviation (0 for an empty slice).
pub fn std_dev(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return 0.0;
    }
    let mean = mean(vals);
    let var = vals.iter().map(|&val| (val - mean).powi(2)).sum::<f64>() / vals.len() as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_std_dev() {
        let vals = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&vals), 5.0);
        assert_eq!(std_dev(&vals), 2.0);
        assert_eq!(std_dev(&[3.0; 4]), 0.0);
        assert_eq!(mean(&[]), 0.0);
    }
}
