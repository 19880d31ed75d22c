//! Channel-order permutation, per-channel gain and gamma correction for
//! batches of RGB pixels (spec component C3).

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorrectionError {
    #[error("unknown channel order {0:?}, expected a permutation of R, G, B")]
    UnknownChannelOrder(String),
    #[error("pixel batch length {0} is not a multiple of 3")]
    MisalignedBatch(usize),
}

/// A permutation of the three output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Rbg,
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl ChannelOrder {
    /// Indices into a source `[r, g, b]` triplet that produce the output
    /// triplet, e.g. `Grb` yields `[1, 0, 2]`.
    pub const fn indices(self) -> [usize; 3] {
        match self {
            ChannelOrder::Rgb => [0, 1, 2],
            ChannelOrder::Rbg => [0, 2, 1],
            ChannelOrder::Grb => [1, 0, 2],
            ChannelOrder::Gbr => [1, 2, 0],
            ChannelOrder::Brg => [2, 0, 1],
            ChannelOrder::Bgr => [2, 1, 0],
        }
    }

    const fn is_identity(self) -> bool {
        matches!(self, ChannelOrder::Rgb)
    }
}

impl FromStr for ChannelOrder {
    type Err = CorrectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RGB" => Ok(ChannelOrder::Rgb),
            "RBG" => Ok(ChannelOrder::Rbg),
            "GRB" => Ok(ChannelOrder::Grb),
            "GBR" => Ok(ChannelOrder::Gbr),
            "BRG" => Ok(ChannelOrder::Brg),
            "BGR" => Ok(ChannelOrder::Bgr),
            other => Err(CorrectionError::UnknownChannelOrder(other.to_string())),
        }
    }
}

/// Immutable correction parameters applied to every outbound frame.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionConfig {
    pub gamma: Option<f32>,
    pub gains: [f32; 3],
    pub order: ChannelOrder,
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            gamma: None,
            gains: [1.0, 1.0, 1.0],
            order: ChannelOrder::Rgb,
        }
    }
}

impl CorrectionConfig {
    pub fn new(gamma: Option<f32>, gains: [f32; 3], order: ChannelOrder) -> Self {
        Self {
            gamma,
            gains,
            order,
        }
    }

    /// True when applying this config is provably a no-op (spec §4.3: "when
    /// all three parameters are identity/unity, this step is a no-op").
    pub fn is_identity(&self) -> bool {
        self.order.is_identity()
            && self.gains == [1.0, 1.0, 1.0]
            && self.gamma.map(|g| (g - 1.0).abs() < f32::EPSILON).unwrap_or(true)
    }

    /// Apply permute → gain → gamma → clamp to an `N*3` batch in place.
    pub fn apply(&self, batch: &mut [u8]) -> Result<(), CorrectionError> {
        if batch.len() % 3 != 0 {
            return Err(CorrectionError::MisalignedBatch(batch.len()));
        }
        if self.is_identity() {
            return Ok(());
        }

        let indices = self.order.indices();
        let use_gamma = self
            .gamma
            .map(|g| (g - 1.0).abs() > 1e-3)
            .unwrap_or(false);

        for triplet in batch.chunks_exact_mut(3) {
            let src = [triplet[0], triplet[1], triplet[2]];
            let permuted = [src[indices[0]], src[indices[1]], src[indices[2]]];

            for (channel, value) in permuted.into_iter().enumerate() {
                let mut v = value as f32 * self.gains[channel];
                if use_gamma {
                    let gamma = self.gamma.unwrap();
                    let normalized = (v.clamp(0.0, 255.0)) / 255.0;
                    v = normalized.powf(gamma) * 255.0;
                }
                triplet[channel] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_noop() {
        let cfg = CorrectionConfig::default();
        let mut batch = vec![10, 20, 30, 200, 100, 50];
        let before = batch.clone();
        cfg.apply(&mut batch).unwrap();
        assert_eq!(batch, before);
    }

    #[test]
    fn grb_permutes_channels() {
        let cfg = CorrectionConfig::new(None, [1.0, 1.0, 1.0], ChannelOrder::Grb);
        let mut batch = vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100, 110, 120];
        cfg.apply(&mut batch).unwrap();
        assert_eq!(
            batch,
            vec![20, 10, 30, 50, 40, 60, 80, 70, 90, 110, 100, 120]
        );
    }

    #[test]
    fn gamma_2_2_matches_reference() {
        let cfg = CorrectionConfig::new(Some(2.2), [1.0, 1.0, 1.0], ChannelOrder::Rgb);
        let mut batch = vec![128, 128, 128];
        cfg.apply(&mut batch).unwrap();
        for channel in batch {
            assert!((channel as i32 - 55).abs() <= 1);
        }
    }

    #[test]
    fn gains_scale_and_clamp() {
        let cfg = CorrectionConfig::new(None, [2.0, 1.0, 0.5], ChannelOrder::Rgb);
        let mut batch = vec![200, 10, 200];
        cfg.apply(&mut batch).unwrap();
        assert_eq!(batch, vec![255, 10, 100]);
    }

    #[test]
    fn rejects_misaligned_batch() {
        let cfg = CorrectionConfig::new(Some(2.2), [1.0, 1.0, 1.0], ChannelOrder::Rgb);
        let mut batch = vec![1, 2];
        assert!(cfg.apply(&mut batch).is_err());
    }

    #[test]
    fn channel_order_parses_case_insensitively() {
        assert_eq!("grb".parse::<ChannelOrder>().unwrap(), ChannelOrder::Grb);
        assert_eq!("RGB".parse::<ChannelOrder>().unwrap(), ChannelOrder::Rgb);
        assert!("xyz".parse::<ChannelOrder>().is_err());
    }
}
