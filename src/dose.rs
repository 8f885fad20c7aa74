use crate::enums::OverlayMode;
use crate::volume::VolumeGrid;

use log::warn;

/// Isodose levels shown when nothing else is configured.
pub const DEFAULT_ISODOSE_LEVELS: [f64; 9] = [0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];

/// A dose distribution plus the settings that drive its overlay.
#[derive(Clone, Debug, PartialEq)]
pub struct DoseVolumeGrid {
    grid: VolumeGrid,
    isodose_levels: Vec<f64>,
    reference_dose: Option<f64>,
    pub overlay_mode: OverlayMode,
    pub overlay_enabled: bool,
}

impl DoseVolumeGrid {
    pub fn new(grid: VolumeGrid) -> Self {
        Self {
            grid,
            isodose_levels: DEFAULT_ISODOSE_LEVELS.to_vec(),
            reference_dose: None,
            overlay_mode: OverlayMode::default(),
            overlay_enabled: true,
        }
    }

    pub fn grid(&self) -> &VolumeGrid {
        &self.grid
    }

    pub fn isodose_levels(&self) -> &[f64] {
        &self.isodose_levels
    }

    /// Replace the isodose levels.
    ///
    /// Levels outside `(0, 1]` are dropped; the rest are sorted ascending and
    /// deduplicated. Returns how many levels were kept.
    pub fn set_isodose_levels(&mut self, levels: &[f64]) -> usize {
        let mut kept: Vec<f64> = levels
            .iter()
            .copied()
            .filter(|level| *level > 0.0 && *level <= 1.0)
            .collect();
        if kept.len() != levels.len() {
            warn!(
                "dropped {} isodose levels outside (0, 1]",
                levels.len() - kept.len()
            );
        }
        kept.sort_by(f64::total_cmp);
        kept.dedup();
        self.isodose_levels = kept;
        self.isodose_levels.len()
    }

    pub fn reference_dose(&self) -> Option<f64> {
        self.reference_dose
    }

    /// Set the dose that relative levels refer to, e.g. the PTV mean dose.
    ///
    /// Only finite, strictly positive values are accepted.
    pub fn set_reference_dose(&mut self, dose: f64) -> bool {
        if dose.is_finite() && dose > 0.0 {
            self.reference_dose = Some(dose);
            true
        } else {
            false
        }
    }

    pub fn clear_reference_dose(&mut self) {
        self.reference_dose = None;
    }

    pub fn max_dose(&self) -> Option<f64> {
        self.grid.value_range().map(|(_, max)| max as f64)
    }

    /// Absolute dose of each isodose line for the current overlay mode.
    ///
    /// Empty for the wash mode, when the reference dose is unset in
    /// reference mode, or when the grid holds no dose.
    pub fn isodose_thresholds(&self) -> Vec<f64> {
        let normalization = match self.overlay_mode {
            OverlayMode::ContourRelativeToMax => self.max_dose().filter(|max| *max > 0.0),
            OverlayMode::ContourRelativeToReference => self.reference_dose,
            OverlayMode::SemiTransparentWash => None,
        };
        match normalization {
            Some(dose) => self.isodose_levels.iter().map(|level| level * dose).collect(),
            None => Vec::new(),
        }
    }
}
