use crate::enums::Orientation;
use crate::volume::VolumeGrid;

use log::debug;

/// Outcome of mapping a reference slice onto a dependent grid.
///
/// Variants are ordered along the axis, so results can be compared directly:
/// `OutOfBoundsLow < Slice(_) < OutOfBoundsHigh`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SliceCorrespondence {
    /// The computed position lies before the dependent grid's first slice
    OutOfBoundsLow,
    /// A valid slice index of the dependent grid
    Slice(usize),
    /// The reference slice lies at or past the dependent grid's far edge
    OutOfBoundsHigh,
}

impl SliceCorrespondence {
    pub fn index(self) -> Option<usize> {
        match self {
            SliceCorrespondence::Slice(index) => Some(index),
            _ => None,
        }
    }
}

/// Maps slice indices between two independently positioned grids without
/// resampling either of them.
pub struct CrossVolumeSlicer;

impl CrossVolumeSlicer {
    /// Find the slice of `dependent` matching slice `reference_index` of
    /// `reference` along `orientation`.
    ///
    /// A reference position at or before the dependent origin clamps to the
    /// first slice. One at or past the far edge is `OutOfBoundsHigh`.
    ///
    /// In between, the index is derived from the whole-voxel offset between
    /// the two origins. The depth axis subtracts that offset and the in-plane
    /// axes add it. Indices that still land outside the dependent grid are
    /// reported as out of bounds, even when the reference position lies
    /// inside the dependent extent.
    ///
    /// Validating `reference_index` against `reference` is the caller's job.
    pub fn corresponding_slice(
        reference: &VolumeGrid,
        dependent: &VolumeGrid,
        orientation: Orientation,
        reference_index: usize,
    ) -> SliceCorrespondence {
        let a = orientation.index();
        let reference_position = reference.position(a, reference_index as f64);
        let dependent_origin = dependent.origin()[a];

        if reference_position <= dependent_origin {
            return SliceCorrespondence::Slice(0);
        }
        if reference_position >= dependent.upper_bound(a) {
            return SliceCorrespondence::OutOfBoundsHigh;
        }

        let reference_spacing = reference.spacing()[a];
        let offset = ((dependent_origin - reference.origin()[a]) / reference_spacing).floor();
        let shifted = match orientation {
            Orientation::Axial => reference_index as f64 - offset,
            Orientation::Coronal | Orientation::Sagittal => reference_index as f64 + offset,
        };
        let index = (shifted * reference_spacing / dependent.spacing()[a]).floor();

        let result = if index < 0.0 {
            SliceCorrespondence::OutOfBoundsLow
        } else if index >= dependent.shape()[a] as f64 {
            SliceCorrespondence::OutOfBoundsHigh
        } else {
            SliceCorrespondence::Slice(index as usize)
        };
        debug!(
            "{:?} slice {} at {:.3} maps to {:?}",
            orientation, reference_index, reference_position, result
        );
        result
    }
}
