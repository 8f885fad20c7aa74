use crate::dose::{DEFAULT_ISODOSE_LEVELS, DoseVolumeGrid};
use crate::enums::{DisplayWindow, Orientation, OverlayMode};

use log::warn;
use serde::Deserialize;
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Display preferences of the viewer. Every field may be left out of the
/// settings file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerSettings {
    pub isodose_levels: Vec<f64>,
    pub overlay_mode: OverlayMode,
    pub overlay_enabled: bool,
    /// Dose that relative isodose levels refer to, e.g. the PTV mean dose
    pub reference_dose: Option<f64>,
    pub window: DisplayWindow,
    pub invert_scale: bool,
    /// Quarter-turn each view: axial, coronal, sagittal
    pub rotate: [bool; 3],
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            isodose_levels: DEFAULT_ISODOSE_LEVELS.to_vec(),
            overlay_mode: OverlayMode::default(),
            overlay_enabled: true,
            reference_dose: None,
            window: DisplayWindow::default(),
            invert_scale: false,
            rotate: [true; 3],
        }
    }
}

impl ViewerSettings {
    /// Read settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    pub fn rotate_for(&self, orientation: Orientation) -> bool {
        self.rotate[orientation.index()]
    }

    /// Copy the overlay preferences onto a freshly imported dose grid.
    pub fn apply_to(&self, dose: &mut DoseVolumeGrid) {
        dose.set_isodose_levels(&self.isodose_levels);
        dose.overlay_mode = self.overlay_mode;
        dose.overlay_enabled = self.overlay_enabled;
        if let Some(reference) = self.reference_dose {
            if !dose.set_reference_dose(reference) {
                warn!("ignoring reference dose {reference}");
            }
        }
    }
}
