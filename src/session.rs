use crate::dose::DoseVolumeGrid;
use crate::enums::{DisplayWindow, Orientation};
use crate::normalizer::{NormalizeError, OrientationNormalizer, RawSlice, RawVolume};
use crate::settings::ViewerSettings;
use crate::slicer::{CrossVolumeSlicer, SliceCorrespondence};
use crate::structure_set::{ContourShape, StructureSet};
use crate::volume::{Extent, VolumeGrid};

use image::GrayImage;
use log::{debug, info};
use ndarray::Array2;

/// A dose slice ready to be drawn over the anatomy.
#[derive(Clone, Debug, PartialEq)]
pub struct DoseOverlay {
    pub slice_index: usize,
    pub image: Array2<f32>,
    pub extent: Extent,
    /// Absolute dose of each isodose line; empty for a colour wash
    pub isodose_thresholds: Vec<f64>,
}

/// Everything currently loaded in the viewer.
///
/// Each open replaces the previous value whole, and only after the new one
/// was built successfully, so a failed open leaves the session unchanged.
#[derive(Debug, Default)]
pub struct Session {
    ct: Option<VolumeGrid>,
    dose: Option<DoseVolumeGrid>,
    structures: Option<StructureSet>,
    settings: ViewerSettings,
}

impl Session {
    pub fn new(settings: ViewerSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    pub fn ct(&self) -> Option<&VolumeGrid> {
        self.ct.as_ref()
    }

    pub fn dose(&self) -> Option<&DoseVolumeGrid> {
        self.dose.as_ref()
    }

    pub fn dose_mut(&mut self) -> Option<&mut DoseVolumeGrid> {
        self.dose.as_mut()
    }

    pub fn structures(&self) -> Option<&StructureSet> {
        self.structures.as_ref()
    }

    pub fn is_ct_open(&self) -> bool {
        self.ct.is_some()
    }

    pub fn is_dose_open(&self) -> bool {
        self.dose.is_some()
    }

    /// Normalize and install an anatomical volume.
    pub fn open_ct(&mut self, raw: RawVolume) -> Result<&VolumeGrid, NormalizeError> {
        let grid = OrientationNormalizer::normalize(raw)?;
        Ok(&*self.ct.insert(grid))
    }

    /// Normalize and install an anatomical volume read slice by slice.
    pub fn open_ct_series(&mut self, slices: Vec<RawSlice>) -> Result<&VolumeGrid, NormalizeError> {
        let grid = OrientationNormalizer::normalize_series(slices)?;
        Ok(&*self.ct.insert(grid))
    }

    /// Normalize and install a dose grid, applying the configured overlay
    /// settings.
    pub fn import_dose(&mut self, raw: RawVolume) -> Result<&DoseVolumeGrid, NormalizeError> {
        let grid = OrientationNormalizer::normalize(raw)?;
        let mut dose = DoseVolumeGrid::new(grid);
        self.settings.apply_to(&mut dose);
        Ok(&*self.dose.insert(dose))
    }

    pub fn import_structures(&mut self, structures: StructureSet) -> &StructureSet {
        info!("imported {} structures", structures.len());
        &*self.structures.insert(structures)
    }

    pub fn rotate(&self, orientation: Orientation) -> bool {
        self.settings.rotate_for(orientation)
    }

    /// Dose slice matching `ct_slice`, or `None` without both volumes.
    pub fn dose_slice_for(
        &self,
        orientation: Orientation,
        ct_slice: usize,
    ) -> Option<SliceCorrespondence> {
        let ct = self.ct.as_ref()?;
        let dose = self.dose.as_ref()?;
        Some(CrossVolumeSlicer::corresponding_slice(
            ct,
            dose.grid(),
            orientation,
            ct_slice,
        ))
    }

    /// The dose to draw on top of CT slice `ct_slice`.
    ///
    /// `None` when no dose is loaded, the overlay is switched off, the CT
    /// slice does not exist, or no dose slice corresponds to it.
    pub fn dose_overlay(&self, orientation: Orientation, ct_slice: usize) -> Option<DoseOverlay> {
        let ct = self.ct.as_ref()?;
        let dose = self.dose.as_ref()?;
        if !dose.overlay_enabled || !ct.is_valid_index(ct_slice, orientation) {
            return None;
        }
        let slice_index = self.dose_slice_for(orientation, ct_slice)?.index()?;
        let rotate = self.rotate(orientation);
        let overlay = DoseOverlay {
            slice_index,
            image: dose.grid().image(orientation, slice_index, rotate)?,
            extent: dose.grid().extent(orientation, rotate)?,
            isodose_thresholds: dose.isodose_thresholds(),
        };
        debug!(
            "{:?} CT slice {} overlays dose slice {}",
            orientation, ct_slice, slice_index
        );
        Some(overlay)
    }

    /// CT slice as grey levels through the configured window.
    pub fn render_ct(&self, orientation: Orientation, index: usize) -> Option<GrayImage> {
        self.ct.as_ref()?.render(
            orientation,
            index,
            self.rotate(orientation),
            self.settings.window,
            self.settings.invert_scale,
        )
    }

    /// Dose slice as grey levels. Dose is always stretched over the slice's
    /// own range; the configured window is meant for CT numbers.
    pub fn render_dose(&self, orientation: Orientation, index: usize) -> Option<GrayImage> {
        self.dose.as_ref()?.grid().render(
            orientation,
            index,
            self.rotate(orientation),
            DisplayWindow::Auto,
            self.settings.invert_scale,
        )
    }

    /// Contours of one structure on a CT slice; empty when no CT or no
    /// structure set is loaded.
    pub fn contours(
        &self,
        structure_index: usize,
        orientation: Orientation,
        ct_slice: usize,
    ) -> Vec<ContourShape> {
        match (&self.structures, &self.ct) {
            (Some(structures), Some(ct)) => structures
                .contours_on_slice(
                    structure_index,
                    orientation,
                    ct_slice,
                    ct,
                    self.rotate(orientation),
                )
                .collect(),
            _ => Vec::new(),
        }
    }
}
