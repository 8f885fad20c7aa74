use crate::volume::{VolumeGrid, Voxels};

use log::{debug, info};
use ndarray::{Array2, Array3, Axis, s};
use thiserror::Error;

/// Largest deviation from an exact basis vector still treated as aligned.
pub const ORIENTATION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("Unsupported image orientation: row {row:?}, column {col:?}")]
    UnsupportedOrientation { row: [f64; 3], col: [f64; 3] },

    #[error("Missing slice spacing for a multi-slice volume")]
    MissingSliceSpacing,

    #[error("Invalid voxel spacing {0:?}")]
    InvalidSpacing([f64; 3]),

    #[error("A series needs at least two slices, found {0}")]
    TooFewSlices(usize),

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,
}

/// Intensity model of a volume, with the scaling each kind applies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Modality {
    /// CT and other anatomical images: `value * slope + intercept`
    Anatomical {
        rescale_slope: Option<f64>,
        rescale_intercept: Option<f64>,
    },
    /// RT dose grids: `value * grid_scaling`
    Dose { grid_scaling: Option<f64> },
}

impl Default for Modality {
    fn default() -> Self {
        Modality::Anatomical {
            rescale_slope: None,
            rescale_intercept: None,
        }
    }
}

impl Modality {
    pub const DOSE_TAG: &'static str = "RTDOSE";

    /// Pick the variant from a DICOM modality string. Scaling attributes
    /// that do not belong to the chosen variant are ignored.
    pub fn from_tag(
        tag: &str,
        grid_scaling: Option<f64>,
        rescale_slope: Option<f64>,
        rescale_intercept: Option<f64>,
    ) -> Self {
        if tag.trim() == Self::DOSE_TAG {
            Modality::Dose { grid_scaling }
        } else {
            Modality::Anatomical {
                rescale_slope,
                rescale_intercept,
            }
        }
    }

    pub fn is_dose(&self) -> bool {
        matches!(self, Modality::Dose { .. })
    }

    /// Convert a stored value to a physical one. Missing terms are identity.
    #[inline]
    pub fn rescale(&self, value: f32) -> f32 {
        match *self {
            Modality::Anatomical {
                rescale_slope,
                rescale_intercept,
            } => {
                let value = value as f64 * rescale_slope.unwrap_or(1.0);
                (value + rescale_intercept.unwrap_or(0.0)) as f32
            }
            Modality::Dose { grid_scaling } => (value as f64 * grid_scaling.unwrap_or(1.0)) as f32,
        }
    }
}

/// Patient-space placement of an image plane, as stored in DICOM.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageGeometry {
    /// Pixel spacing `[between rows, between columns]`
    pub pixel_spacing: [f64; 2],
    /// Position `[x, y, z]` of the first transmitted pixel
    pub image_position: [f64; 3],
    /// Row direction cosines followed by column direction cosines
    pub image_orientation: [f64; 6],
}

impl ImageGeometry {
    pub fn row_direction(&self) -> [f64; 3] {
        [
            self.image_orientation[0],
            self.image_orientation[1],
            self.image_orientation[2],
        ]
    }

    pub fn col_direction(&self) -> [f64; 3] {
        [
            self.image_orientation[3],
            self.image_orientation[4],
            self.image_orientation[5],
        ]
    }
}

/// Voxels and metadata of one file, in file order.
///
/// `voxels` is `[row, col]` for a single image or `[frame, row, col]` for a
/// multi-frame file. `slice_spacing` is required for multi-frame data.
#[derive(Clone, Debug, PartialEq)]
pub struct RawVolume {
    pub voxels: Voxels,
    pub geometry: ImageGeometry,
    pub modality: Modality,
    pub slice_spacing: Option<f64>,
}

/// One single-image file of a series.
#[derive(Clone, Debug, PartialEq)]
pub struct RawSlice {
    pub pixels: Array2<f32>,
    /// Position along the stacking axis
    pub position: f64,
    pub geometry: ImageGeometry,
    pub modality: Modality,
}

/// Which in-plane axes have to be reversed to reach canonical order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlipFlags {
    /// Row direction is `+x`: reverse the column axis
    pub swap_row: bool,
    /// Column direction is `+y`: reverse the row axis
    pub swap_col: bool,
}

pub struct OrientationNormalizer;

impl OrientationNormalizer {
    /// Normalize a single file into a canonical grid.
    ///
    /// # Errors
    ///
    /// Returns error if the orientation is not axis aligned, if a multi-frame
    /// volume has no slice spacing, or if any spacing is zero or not finite.
    /// A negative slice spacing is accepted and turned into ascending order.
    pub fn normalize(raw: RawVolume) -> Result<VolumeGrid, NormalizeError> {
        let RawVolume {
            mut voxels,
            geometry,
            modality,
            slice_spacing,
        } = raw;
        let flips = Self::flip_flags(&geometry)?;

        let depth_spacing = match (&voxels, slice_spacing) {
            (Voxels::Volumetric(_), None) => return Err(NormalizeError::MissingSliceSpacing),
            (_, Some(spacing)) => spacing,
            (Voxels::Planar(_), None) => 1.0,
        };
        let [row_spacing, col_spacing] = geometry.pixel_spacing;
        let [x, y, z] = geometry.image_position;
        let mut spacing = [depth_spacing, col_spacing, row_spacing];
        let mut origin = [z, y, x];
        if spacing.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(NormalizeError::InvalidSpacing(spacing));
        }

        Self::rescale(&mut voxels, &modality);

        let shape = {
            let (depth, rows, cols) = voxels.view().dim();
            [depth, rows, cols]
        };
        if flips.swap_col {
            Self::invert_canonical_axis(&mut voxels, 1);
            origin[1] += shape[1] as f64 * spacing[1];
        }
        if flips.swap_row {
            Self::invert_canonical_axis(&mut voxels, 2);
            origin[2] += shape[2] as f64 * spacing[2];
        }
        if flips.swap_row && flips.swap_col {
            spacing.swap(1, 2);
        }
        // descending frames, e.g. a negative dose frame offset vector
        if spacing[0] < 0.0 {
            if let Voxels::Volumetric(volume) = &mut voxels {
                volume.invert_axis(Axis(0));
            }
            origin[0] += shape[0].saturating_sub(1) as f64 * spacing[0];
            spacing[0] = -spacing[0];
        }

        let grid = VolumeGrid::new(Self::into_standard_layout(voxels), spacing, origin);
        info!(
            "normalized {} grid: dims {:?}, spacing {:?}, origin {:?}, {:?}",
            if modality.is_dose() { "dose" } else { "anatomical" },
            grid.dims(),
            spacing,
            origin,
            flips
        );
        Ok(grid)
    }

    /// Stack single-image files into one canonical grid.
    ///
    /// Slices are ordered by ascending stacking position, and the distance
    /// between the first two positions becomes the depth spacing. Scaling and
    /// orientation are taken from the first slice after sorting.
    ///
    /// # Errors
    ///
    /// Returns error if fewer than two slices are given, if their dimensions
    /// differ, or on any error of [`OrientationNormalizer::normalize`].
    pub fn normalize_series(mut slices: Vec<RawSlice>) -> Result<VolumeGrid, NormalizeError> {
        if slices.len() < 2 {
            return Err(NormalizeError::TooFewSlices(slices.len()));
        }
        slices.sort_by(|a, b| a.position.total_cmp(&b.position));
        Self::validate_dimensions(&slices)?;

        let first = &slices[0];
        let slice_spacing = slices[1].position - first.position;
        let mut geometry = first.geometry;
        geometry.image_position[2] = first.position;
        let modality = first.modality;
        debug!(
            "stacking {} slices from {} to {}",
            slices.len(),
            first.position,
            slices[slices.len() - 1].position
        );

        Self::normalize(RawVolume {
            voxels: Voxels::Volumetric(Self::build_volume_array(&slices)),
            geometry,
            modality,
            slice_spacing: Some(slice_spacing),
        })
    }

    /// Derive the flip flags, rejecting anything but axial planes.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::UnsupportedOrientation`] unless the row
    /// direction is `±x` and the column direction is `±y`.
    pub fn flip_flags(geometry: &ImageGeometry) -> Result<FlipFlags, NormalizeError> {
        let row = geometry.row_direction();
        let col = geometry.col_direction();
        match (Self::alignment(row, 0), Self::alignment(col, 1)) {
            (Some(row_positive), Some(col_positive)) => Ok(FlipFlags {
                swap_row: row_positive,
                swap_col: col_positive,
            }),
            _ => Err(NormalizeError::UnsupportedOrientation { row, col }),
        }
    }

    /// `Some(true)` for `+axis`, `Some(false)` for `-axis`, otherwise `None`.
    fn alignment(direction: [f64; 3], axis: usize) -> Option<bool> {
        let off_axis_ok = direction
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != axis)
            .all(|(_, c)| c.abs() <= ORIENTATION_TOLERANCE);
        let along = direction[axis];
        if !off_axis_ok {
            None
        } else if (along - 1.0).abs() <= ORIENTATION_TOLERANCE {
            Some(true)
        } else if (along + 1.0).abs() <= ORIENTATION_TOLERANCE {
            Some(false)
        } else {
            None
        }
    }

    fn rescale(voxels: &mut Voxels, modality: &Modality) {
        match voxels {
            Voxels::Planar(plane) => plane.mapv_inplace(|v| modality.rescale(v)),
            Voxels::Volumetric(volume) => volume.mapv_inplace(|v| modality.rescale(v)),
        }
    }

    /// Reverse a canonical axis; planar grids have no axis 0.
    fn invert_canonical_axis(voxels: &mut Voxels, axis: usize) {
        match voxels {
            Voxels::Planar(plane) => plane.invert_axis(Axis(axis - 1)),
            Voxels::Volumetric(volume) => volume.invert_axis(Axis(axis)),
        }
    }

    fn into_standard_layout(voxels: Voxels) -> Voxels {
        match voxels {
            Voxels::Planar(plane) => Voxels::Planar(plane.as_standard_layout().into_owned()),
            Voxels::Volumetric(volume) => {
                Voxels::Volumetric(volume.as_standard_layout().into_owned())
            }
        }
    }

    fn validate_dimensions(slices: &[RawSlice]) -> Result<(), NormalizeError> {
        let first_dim = slices[0].pixels.dim();
        if slices.iter().any(|slice| slice.pixels.dim() != first_dim) {
            return Err(NormalizeError::InconsistentDimensions);
        }
        Ok(())
    }

    fn build_volume_array(slices: &[RawSlice]) -> Array3<f32> {
        let (height, width) = slices[0].pixels.dim();
        let depth = slices.len();
        let mut volume = Array3::<f32>::zeros((depth, height, width));

        for (i, slice) in slices.iter().enumerate() {
            volume.slice_mut(s![i, .., ..]).assign(&slice.pixels);
        }

        volume
    }
}

#[cfg(test)]
mod test_normalizer {
    use super::*;
    use float_eq::assert_float_eq;
    use ndarray::{Array, array};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const ROW_PLUS_X: [f64; 3] = [1.0, 0.0, 0.0];
    const ROW_MINUS_X: [f64; 3] = [-1.0, 0.0, 0.0];
    const COL_PLUS_Y: [f64; 3] = [0.0, 1.0, 0.0];
    const COL_MINUS_Y: [f64; 3] = [0.0, -1.0, 0.0];

    fn geometry(row: [f64; 3], col: [f64; 3]) -> ImageGeometry {
        ImageGeometry {
            pixel_spacing: [0.5, 0.75],
            image_position: [-100.0, -50.0, 20.0],
            image_orientation: [row[0], row[1], row[2], col[0], col[1], col[2]],
        }
    }

    fn raw_stack(row: [f64; 3], col: [f64; 3]) -> RawVolume {
        RawVolume {
            voxels: Voxels::Volumetric(Array::from_shape_fn((2, 3, 4), |(z, y, x)| {
                (100 * z + 10 * y + x) as f32
            })),
            geometry: geometry(row, col),
            modality: Modality::default(),
            slice_spacing: Some(2.5),
        }
    }

    fn volumetric(grid: &VolumeGrid) -> Array3<f32> {
        match grid.voxels() {
            Voxels::Volumetric(volume) => volume.clone(),
            Voxels::Planar(_) => panic!("expected a volumetric grid"),
        }
    }

    #[test]
    fn row_flip_of_planar_image() {
        let raw = RawVolume {
            voxels: Voxels::Planar(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]),
            geometry: ImageGeometry {
                pixel_spacing: [1.0, 1.0],
                image_position: [0.0, 0.0, 0.0],
                image_orientation: [-1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            },
            modality: Modality::default(),
            slice_spacing: None,
        };
        let grid = OrientationNormalizer::normalize(raw).unwrap();
        assert_eq!(
            grid.voxels(),
            &Voxels::Planar(array![[7.0, 8.0, 9.0], [4.0, 5.0, 6.0], [1.0, 2.0, 3.0]])
        );
        assert_eq!(grid.origin(), [0.0, 3.0, 0.0]);
        assert_eq!(grid.dims(), (3, 3, 0));
    }

    #[test]
    fn canonical_axes_without_flips() {
        let grid = OrientationNormalizer::normalize(raw_stack(ROW_MINUS_X, COL_MINUS_Y)).unwrap();
        assert_eq!(grid.dims(), (2, 3, 4));
        assert_eq!(grid.spacing(), [2.5, 0.75, 0.5]);
        assert_eq!(grid.origin(), [20.0, -50.0, -100.0]);
        assert_eq!(volumetric(&grid)[[1, 2, 3]], 123.0);
    }

    #[test]
    fn double_flip_matches_flipping_unflagged_volume_twice() {
        let plain = OrientationNormalizer::normalize(raw_stack(ROW_MINUS_X, COL_MINUS_Y)).unwrap();
        let both = OrientationNormalizer::normalize(raw_stack(ROW_PLUS_X, COL_PLUS_Y)).unwrap();

        let mut expected = volumetric(&plain);
        expected.invert_axis(Axis(1));
        expected.invert_axis(Axis(2));
        assert_eq!(volumetric(&both), expected);

        let [d, a, b] = plain.spacing();
        assert_eq!(both.spacing(), [d, b, a]);
        assert_float_eq!(
            both.origin(),
            [20.0, -50.0 + 3.0 * 0.75, -100.0 + 4.0 * 0.5],
            abs <= [1e-12; 3]
        );
    }

    #[rstest]
    #[case(ROW_PLUS_X, COL_MINUS_Y, FlipFlags { swap_row: true, swap_col: false })]
    #[case(ROW_MINUS_X, COL_PLUS_Y, FlipFlags { swap_row: false, swap_col: true })]
    #[case(ROW_PLUS_X, COL_PLUS_Y, FlipFlags { swap_row: true, swap_col: true })]
    #[case([0.9999999999, 1e-9, 0.0], COL_MINUS_Y, FlipFlags { swap_row: true, swap_col: false })]
    fn flip_flags_of_axial_planes(
        #[case] row: [f64; 3],
        #[case] col: [f64; 3],
        #[case] expected: FlipFlags,
    ) {
        assert_eq!(OrientationNormalizer::flip_flags(&geometry(row, col)).unwrap(), expected);
    }

    #[rstest]
    #[case([0.0, 1.0, 0.0], [0.0, 0.0, -1.0])]
    #[case([1.0, 0.0, 0.0], [0.0, 0.0, -1.0])]
    #[case([0.7071, 0.7071, 0.0], [-0.7071, 0.7071, 0.0])]
    #[case([1.0, 0.0, 0.0], [0.0, 0.5, 0.0])]
    fn non_axial_orientation_is_rejected(#[case] row: [f64; 3], #[case] col: [f64; 3]) {
        let result = OrientationNormalizer::normalize(raw_stack(row, col));
        assert!(matches!(
            result,
            Err(NormalizeError::UnsupportedOrientation { .. })
        ));
    }

    #[test]
    fn multi_frame_volume_needs_slice_spacing() {
        let mut raw = raw_stack(ROW_MINUS_X, COL_MINUS_Y);
        raw.slice_spacing = None;
        assert!(matches!(
            OrientationNormalizer::normalize(raw),
            Err(NormalizeError::MissingSliceSpacing)
        ));
    }

    #[test]
    fn zero_spacing_is_rejected() {
        let mut raw = raw_stack(ROW_MINUS_X, COL_MINUS_Y);
        raw.slice_spacing = Some(0.0);
        assert!(matches!(
            OrientationNormalizer::normalize(raw),
            Err(NormalizeError::InvalidSpacing(_))
        ));
    }

    #[test]
    fn descending_frames_are_reordered() {
        let mut raw = raw_stack(ROW_MINUS_X, COL_MINUS_Y);
        raw.slice_spacing = Some(-2.5);
        let grid = OrientationNormalizer::normalize(raw).unwrap();
        assert_eq!(grid.spacing(), [2.5, 0.75, 0.5]);
        assert_eq!(grid.origin(), [17.5, -50.0, -100.0]);
        let volume = volumetric(&grid);
        assert_eq!(volume[[0, 1, 2]], 112.0);
        assert_eq!(volume[[1, 1, 2]], 12.0);
    }

    #[test]
    fn negative_thickness_of_planar_image_is_made_positive() {
        let raw = RawVolume {
            voxels: Voxels::Planar(Array2::zeros((2, 2))),
            geometry: geometry(ROW_MINUS_X, COL_MINUS_Y),
            modality: Modality::default(),
            slice_spacing: Some(-3.0),
        };
        let grid = OrientationNormalizer::normalize(raw).unwrap();
        assert_eq!(grid.spacing()[0], 3.0);
        assert_eq!(grid.origin()[0], 20.0);
    }

    #[rstest]
    #[case(Modality::Anatomical { rescale_slope: Some(2.0), rescale_intercept: Some(-1024.0) }, 10.0, -1004.0)]
    #[case(Modality::Anatomical { rescale_slope: None, rescale_intercept: Some(-1024.0) }, 10.0, -1014.0)]
    #[case(Modality::Anatomical { rescale_slope: Some(0.5), rescale_intercept: None }, 10.0, 5.0)]
    #[case(Modality::default(), 10.0, 10.0)]
    #[case(Modality::Dose { grid_scaling: Some(0.001) }, 2000.0, 2.0)]
    #[case(Modality::Dose { grid_scaling: None }, 2000.0, 2000.0)]
    fn intensity_scaling(#[case] modality: Modality, #[case] stored: f32, #[case] expected: f32) {
        assert_float_eq!(modality.rescale(stored), expected, abs <= 1e-4);
    }

    #[test]
    fn modality_from_tag_picks_matching_attributes() {
        assert_eq!(
            Modality::from_tag("RTDOSE", Some(0.01), Some(2.0), Some(3.0)),
            Modality::Dose { grid_scaling: Some(0.01) }
        );
        assert_eq!(
            Modality::from_tag("CT", Some(0.01), Some(2.0), None),
            Modality::Anatomical {
                rescale_slope: Some(2.0),
                rescale_intercept: None
            }
        );
    }

    #[test]
    fn rescale_happens_before_flips() {
        let mut raw = raw_stack(ROW_PLUS_X, COL_MINUS_Y);
        raw.modality = Modality::Anatomical {
            rescale_slope: Some(2.0),
            rescale_intercept: Some(1.0),
        };
        let grid = OrientationNormalizer::normalize(raw).unwrap();
        // column axis reversed: canonical [0, 0, 0] holds stored [0, 0, 3]
        assert_eq!(volumetric(&grid)[[0, 0, 0]], 7.0);
    }

    fn slice(value: f32, position: f64) -> RawSlice {
        RawSlice {
            pixels: Array2::from_elem((2, 2), value),
            position,
            geometry: geometry(ROW_MINUS_X, COL_MINUS_Y),
            modality: Modality::Anatomical {
                rescale_slope: None,
                rescale_intercept: Some(-1000.0),
            },
        }
    }

    #[test]
    fn series_is_sorted_by_position() {
        let grid = OrientationNormalizer::normalize_series(vec![
            slice(5.0, 15.0),
            slice(1.0, 11.0),
            slice(3.0, 13.0),
        ])
        .unwrap();
        assert_eq!(grid.dims(), (3, 2, 2));
        assert_eq!(grid.spacing()[0], 2.0);
        assert_eq!(grid.origin(), [11.0, -50.0, -100.0]);
        let volume = volumetric(&grid);
        let firsts: Vec<f32> = (0..3).map(|i| volume[[i, 0, 0]]).collect();
        assert_eq!(firsts, vec![-999.0, -997.0, -995.0]);
    }

    #[test]
    fn series_needs_two_slices() {
        assert!(matches!(
            OrientationNormalizer::normalize_series(vec![slice(1.0, 0.0)]),
            Err(NormalizeError::TooFewSlices(1))
        ));
    }

    #[test]
    fn series_dimensions_must_agree() {
        let mut odd = slice(1.0, 3.0);
        odd.pixels = Array2::zeros((3, 2));
        assert!(matches!(
            OrientationNormalizer::normalize_series(vec![slice(1.0, 0.0), odd]),
            Err(NormalizeError::InconsistentDimensions)
        ));
    }

    #[test]
    fn series_with_repeated_position_is_rejected() {
        assert!(matches!(
            OrientationNormalizer::normalize_series(vec![slice(1.0, 4.0), slice(2.0, 4.0)]),
            Err(NormalizeError::InvalidSpacing(_))
        ));
    }
}
