// kernel.rs — 1-D Gaussian weight table.
//
// weight(o) = exp(-o² / (2σ²))   for o in [-radius, radius]
//
// The table is deliberately NOT normalized. The sampler divides by the sum
// of the weights it actually accumulated, so the same table serves every
// pass and every backend (including the GPU kernel, which receives the
// table verbatim as a storage buffer).

use crate::error::{BlurError, Result};

/// Kernel radius used by every pass when nothing else is configured.
pub const DEFAULT_RADIUS: usize = 8;
/// Gaussian sigma used when nothing else is configured.
pub const DEFAULT_SIGMA: f32 = 3.0;

/// Immutable Gaussian weight table of length `2 * radius + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelWeights {
    radius: usize,
    sigma: f32,
    weights: Vec<f32>,
}

impl KernelWeights {
    /// Compute the weight table for `radius` and `sigma`.
    ///
    /// # Errors
    /// `InvalidSigma` if sigma is not a positive finite number.
    ///
    /// # Examples
    /// ```
    /// let k = sepconv::kernel::KernelWeights::new(2, 1.0).unwrap();
    /// assert_eq!(k.len(), 5);
    /// assert_eq!(k.weight(0), 1.0);
    /// ```
    pub fn new(radius: usize, sigma: f32) -> Result<Self> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(BlurError::InvalidSigma(sigma));
        }
        Ok(KernelWeights {
            radius,
            sigma,
            weights: gaussian_table(radius, sigma),
        })
    }

    #[inline]
    pub fn radius(&self) -> usize {
        self.radius
    }

    #[inline]
    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    /// Number of taps (`2 * radius + 1`).
    #[inline]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Always false; a zero-radius table still has its centre tap.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Weight for a signed tap offset.
    ///
    /// # Panics
    /// Panics if `|offset| > radius`.
    #[inline]
    pub fn weight(&self, offset: isize) -> f32 {
        let i = offset + self.radius as isize;
        assert!(
            i >= 0 && (i as usize) < self.weights.len(),
            "offset {offset} outside kernel radius {}",
            self.radius
        );
        self.weights[i as usize]
    }

    /// Weights indexed by `offset + radius`.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }

    /// Iterate `(offset, weight)` pairs from `-radius` to `+radius`.
    pub fn taps(&self) -> impl Iterator<Item = (isize, f32)> + '_ {
        let r = self.radius as isize;
        self.weights.iter().enumerate().map(move |(i, &w)| (i as isize - r, w))
    }

    /// Sum of all weights.
    pub fn sum(&self) -> f32 {
        self.weights.iter().sum()
    }
}

impl Default for KernelWeights {
    fn default() -> Self {
        KernelWeights {
            radius: DEFAULT_RADIUS,
            sigma: DEFAULT_SIGMA,
            weights: gaussian_table(DEFAULT_RADIUS, DEFAULT_SIGMA),
        }
    }
}

/// `exp(-o² / 2σ²)` for `o` in `-radius..=radius`. `sigma` must be positive.
fn gaussian_table(radius: usize, sigma: f32) -> Vec<f32> {
    let two_sigma_sq = 2.0 * sigma * sigma;
    let r = radius as isize;
    (-r..=r)
        .map(|o| {
            let o = o as f32;
            (-(o * o) / two_sigma_sq).exp()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let k = KernelWeights::default();
        assert_eq!(k.radius(), 8);
        assert_eq!(k.len(), 17);
        assert_eq!(k, KernelWeights::new(8, 3.0).unwrap());
        assert_eq!(k.as_slice(), gaussian_table(DEFAULT_RADIUS, DEFAULT_SIGMA).as_slice());
        assert_eq!(k.weight(0), 1.0);
        assert_eq!(k.weight(8), k.weight(-8));
    }

    #[test]
    fn test_weights_unnormalized_and_symmetric() {
        let k = KernelWeights::new(3, 1.5).unwrap();
        assert_eq!(k.weight(0), 1.0);
        for o in 1..=3 {
            assert_eq!(k.weight(o), k.weight(-o));
            assert!(k.weight(o) < k.weight(o - 1));
        }
        let expected = (-(4.0f32) / (2.0 * 1.5 * 1.5)).exp();
        assert!((k.weight(2) - expected).abs() < 1e-7);
    }

    #[test]
    fn test_zero_radius() {
        let k = KernelWeights::new(0, 3.0).unwrap();
        assert_eq!(k.as_slice(), &[1.0]);
        assert!(!k.is_empty());
    }

    #[test]
    fn test_taps_cover_radius() {
        let k = KernelWeights::new(2, 1.0).unwrap();
        let offsets: Vec<isize> = k.taps().map(|(o, _)| o).collect();
        assert_eq!(offsets, vec![-2, -1, 0, 1, 2]);
    }

    #[test]
    fn test_invalid_sigma() {
        assert!(matches!(KernelWeights::new(4, 0.0), Err(BlurError::InvalidSigma(_))));
        assert!(matches!(KernelWeights::new(4, -1.0), Err(BlurError::InvalidSigma(_))));
        assert!(matches!(KernelWeights::new(4, f32::NAN), Err(BlurError::InvalidSigma(_))));
    }

    #[test]
    #[should_panic(expected = "outside kernel radius")]
    fn test_weight_out_of_range() {
        KernelWeights::new(2, 1.0).unwrap().weight(3);
    }
}
