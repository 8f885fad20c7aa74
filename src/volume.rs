use crate::enums::DisplayWindow;
use crate::enums::Orientation;

use image::GrayImage;
use ndarray::Array2;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::ArrayView3;
use ndarray::Axis;
use rayon::prelude::*;

/// Display bounds `[left, right, bottom, top]` of a slice in patient units.
pub type Extent = [f64; 4];

/// Voxel storage of a canonical grid.
#[derive(Clone, Debug, PartialEq)]
pub enum Voxels {
    /// A single image, indexed `[row, col]`
    Planar(Array2<f32>),
    /// A stack of images, indexed `[slice, row, col]`
    Volumetric(Array3<f32>),
}

impl Voxels {
    /// View the voxels as a stack; a planar image is a stack of one.
    pub fn view(&self) -> ArrayView3<'_, f32> {
        match self {
            Voxels::Planar(plane) => plane.view().insert_axis(Axis(0)),
            Voxels::Volumetric(volume) => volume.view(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Voxels::Planar(plane) => plane.len(),
            Voxels::Volumetric(volume) => volume.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A scalar field in canonical orientation.
///
/// `spacing` and `origin` are always laid out as (depth, row, col). For a
/// planar grid the image rows and columns are the physical axes 1 and 2,
/// and axis 0 holds the position of the single plane.
///
/// Increasing an index never needs further orientation handling: every
/// consumer reads the voxels as they are stored here.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeGrid {
    voxels: Voxels,
    spacing: [f64; 3],
    origin: [f64; 3],
}

impl VolumeGrid {
    pub fn new(voxels: Voxels, spacing: [f64; 3], origin: [f64; 3]) -> Self {
        Self {
            voxels,
            spacing,
            origin,
        }
    }

    /// Voxel counts `(nx, ny, nz)`; `nz == 0` marks a planar grid.
    pub fn dims(&self) -> (usize, usize, usize) {
        match &self.voxels {
            Voxels::Planar(plane) => {
                let (rows, cols) = plane.dim();
                (rows, cols, 0)
            }
            Voxels::Volumetric(volume) => volume.dim(),
        }
    }

    /// Voxel counts along the canonical (depth, row, col) axes.
    pub fn shape(&self) -> [usize; 3] {
        let (depth, rows, cols) = self.voxels.view().dim();
        [depth, rows, cols]
    }

    pub fn is_planar(&self) -> bool {
        matches!(self.voxels, Voxels::Planar(_))
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// Get a reference to the underlying voxels
    pub fn voxels(&self) -> &Voxels {
        &self.voxels
    }

    /// Get the voxels as a (depth, row, col) stack
    pub fn data(&self) -> ArrayView3<'_, f32> {
        self.voxels.view()
    }

    /// Physical coordinate of slice `index` along canonical `axis`.
    pub fn position(&self, axis: usize, index: f64) -> f64 {
        self.origin[axis] + index * self.spacing[axis]
    }

    /// Physical coordinate one full grid length past the origin along `axis`.
    pub fn upper_bound(&self, axis: usize) -> f64 {
        self.position(axis, self.shape()[axis] as f64)
    }

    /// Smallest and largest voxel value, ignoring NaN.
    pub fn value_range(&self) -> Option<(f32, f32)> {
        Self::min_max(self.data().iter().copied())
    }

    fn min_max(values: impl Iterator<Item = f32>) -> Option<(f32, f32)> {
        values
            .filter(|v| !v.is_nan())
            .fold(None, |range, v| match range {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    pub fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        if self.is_planar() && orientation != Orientation::Axial {
            return false;
        }
        index < self.shape()[orientation.index()]
    }

    fn get_slice_from_axis(
        &self,
        index: usize,
        orientation: Orientation,
    ) -> Option<ArrayView2<'_, f32>> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        Some(self.data().index_axis_move(Axis(orientation.index()), index))
    }

    /// The plane at `index` along `orientation`, ready for display.
    ///
    /// Storage order and display order are swapped, so the plane comes back
    /// transposed. With `rotate` the transposed plane is further turned a
    /// quarter counter-clockwise; pair it with `extent(.., true)`.
    ///
    /// Returns `None` for an index outside the grid, or for a non-axial view
    /// of a planar grid.
    pub fn image(&self, orientation: Orientation, index: usize, rotate: bool) -> Option<Array2<f32>> {
        let mut plane = self.get_slice_from_axis(index, orientation)?;
        let image = if rotate {
            // rot90(plane.T) is the plane with its first axis reversed
            plane.invert_axis(Axis(0));
            plane
        } else {
            plane.reversed_axes()
        };
        Some(image.as_standard_layout().into_owned())
    }

    /// Physical bounds of the images returned by [`VolumeGrid::image`].
    pub fn extent(&self, orientation: Orientation, rotate: bool) -> Option<Extent> {
        if self.is_planar() && orientation != Orientation::Axial {
            return None;
        }
        let o = self.origin;
        let span = |axis: usize| self.shape()[axis] as f64 * self.spacing[axis];
        let extent = match orientation {
            Orientation::Axial => [o[1], o[1] - span(1), o[2] - span(2), o[2]],
            Orientation::Coronal => [o[0], o[0] + span(0), o[2] - span(2), o[2]],
            Orientation::Sagittal => [o[0], o[0] + span(0), o[1] - span(1), o[1]],
        };
        Some(if rotate {
            Self::rotate_extent(extent)
        } else {
            extent
        })
    }

    /// Extent of a quarter-turned image.
    pub fn rotate_extent(extent: Extent) -> Extent {
        [extent[3], extent[2], extent[0], extent[1]]
    }

    #[inline]
    fn normalize_to_u8(value: f32, low: f32, high: f32, invert: bool) -> u8 {
        let width = high - low;
        let fraction = if width > 0.0 {
            ((value - low) / width).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let fraction = if invert { 1.0 - fraction } else { fraction };
        (fraction * 255.0).round() as u8
    }

    // Extract slice to image conversion
    fn slice_to_image(
        slice: &Array2<f32>,
        window: DisplayWindow,
        invert: bool,
    ) -> Option<GrayImage> {
        let (low, high) = match window {
            DisplayWindow::Auto => Self::min_max(slice.iter().copied()).unwrap_or((0.0, 0.0)),
            DisplayWindow::Hounsfield => {
                (DisplayWindow::HOUNSFIELD_MIN, DisplayWindow::HOUNSFIELD_MAX)
            }
            DisplayWindow::Range { min, max } => (min, max),
        };
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .as_slice()?
            .par_iter()
            .map(|&v| Self::normalize_to_u8(v, low, high, invert))
            .collect();
        GrayImage::from_raw(width as u32, height as u32, pixel_data)
    }

    /// Render a slice as 8-bit grey levels through `window`.
    pub fn render(
        &self,
        orientation: Orientation,
        index: usize,
        rotate: bool,
        window: DisplayWindow,
        invert: bool,
    ) -> Option<GrayImage> {
        let image = self.image(orientation, index, rotate)?;
        Self::slice_to_image(&image, window, invert)
    }
}

#[cfg(test)]
mod test_volume_grid {
    use super::*;
    use float_eq::assert_float_eq;
    use ndarray::{Array, array};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn numbered_grid() -> VolumeGrid {
        let data = Array::from_shape_fn((2, 3, 4), |(z, y, x)| (100 * z + 10 * y + x) as f32);
        VolumeGrid::new(
            Voxels::Volumetric(data),
            [2.0, 0.5, 1.0],
            [-10.0, 20.0, 30.0],
        )
    }

    #[test]
    fn dims_of_volumetric_and_planar_grids() {
        assert_eq!(numbered_grid().dims(), (2, 3, 4));
        let planar = VolumeGrid::new(
            Voxels::Planar(Array2::zeros((5, 6))),
            [1.0; 3],
            [0.0; 3],
        );
        assert_eq!(planar.dims(), (5, 6, 0));
        assert_eq!(planar.shape(), [1, 5, 6]);
        assert_eq!(planar.voxels().len(), 30);
    }

    #[test]
    fn axial_image_is_transposed_plane() {
        let grid = numbered_grid();
        let image = grid.image(Orientation::Axial, 1, false).unwrap();
        assert_eq!(image.dim(), (4, 3));
        assert_eq!(image[[0, 0]], 100.0);
        assert_eq!(image[[3, 1]], 113.0);
    }

    #[test]
    fn sagittal_image_holds_column_fixed() {
        let grid = numbered_grid();
        let image = grid.image(Orientation::Sagittal, 2, false).unwrap();
        assert_eq!(image, array![[2.0, 102.0], [12.0, 112.0], [22.0, 122.0]]);
    }

    #[test]
    fn rotated_image_is_quarter_turn_of_transposed_plane() {
        let grid = numbered_grid();
        let plain = grid.image(Orientation::Coronal, 1, false).unwrap();
        let rotated = grid.image(Orientation::Coronal, 1, true).unwrap();
        let (rows, cols) = plain.dim();
        assert_eq!(rotated.dim(), (cols, rows));
        for ((i, j), value) in rotated.indexed_iter() {
            assert_eq!(*value, plain[[j, cols - 1 - i]]);
        }
    }

    #[test]
    fn out_of_range_index_gives_no_image() {
        let grid = numbered_grid();
        assert!(grid.image(Orientation::Axial, 2, false).is_none());
        assert!(grid.image(Orientation::Sagittal, 3, true).is_some());
        assert!(grid.image(Orientation::Sagittal, 4, true).is_none());
    }

    #[rstest]
    #[case(Orientation::Axial, [20.0, 18.5, 26.0, 30.0])]
    #[case(Orientation::Coronal, [-10.0, -6.0, 26.0, 30.0])]
    #[case(Orientation::Sagittal, [-10.0, -6.0, 18.5, 20.0])]
    fn extent_per_axis(#[case] orientation: Orientation, #[case] expected: Extent) {
        let extent = numbered_grid().extent(orientation, false).unwrap();
        assert_float_eq!(extent, expected, abs <= [1e-12; 4]);
    }

    #[rstest]
    fn rotated_extent_is_permuted(
        #[values(Orientation::Axial, Orientation::Coronal, Orientation::Sagittal)]
        orientation: Orientation,
    ) {
        let grid = numbered_grid();
        let e = grid.extent(orientation, false).unwrap();
        let r = grid.extent(orientation, true).unwrap();
        assert_eq!(r, [e[3], e[2], e[0], e[1]]);
    }

    #[test]
    fn planar_grid_only_has_an_axial_view() {
        let planar = VolumeGrid::new(
            Voxels::Planar(array![[1.0, 2.0], [3.0, 4.0]]),
            [0.0, 1.0, 1.0],
            [0.0, 5.0, 5.0],
        );
        assert_eq!(
            planar.image(Orientation::Axial, 0, false).unwrap(),
            array![[1.0, 3.0], [2.0, 4.0]]
        );
        assert!(planar.image(Orientation::Coronal, 0, false).is_none());
        assert!(planar.extent(Orientation::Sagittal, false).is_none());
        assert_eq!(
            planar.extent(Orientation::Axial, false).unwrap(),
            [5.0, 3.0, 3.0, 5.0]
        );
    }

    #[test]
    fn render_stretches_auto_window() {
        let grid = numbered_grid();
        let image = grid
            .render(Orientation::Axial, 0, false, DisplayWindow::Auto, false)
            .unwrap();
        assert_eq!(image.dimensions(), (3, 4));
        assert_eq!(image.get_pixel(0, 0).0, [0]);
        assert_eq!(image.get_pixel(2, 3).0, [255]);
    }

    #[test]
    fn render_clamps_fixed_window_and_inverts() {
        let grid = VolumeGrid::new(
            Voxels::Planar(array![[-3000.0, 500.0], [2000.0, 5000.0]]),
            [1.0; 3],
            [0.0; 3],
        );
        let image = grid
            .render(Orientation::Axial, 0, false, DisplayWindow::Hounsfield, true)
            .unwrap();
        // transposed: pixel (x=1, y=0) is voxel [1, 0]
        assert_eq!(image.get_pixel(0, 0).0, [255]);
        assert_eq!(image.get_pixel(1, 0).0, [0]);
        assert_eq!(image.get_pixel(1, 1).0, [0]);
        assert_eq!(image.get_pixel(0, 1).0, [128]);
    }

    #[test]
    fn value_range_skips_nan() {
        let grid = VolumeGrid::new(
            Voxels::Planar(array![[f32::NAN, 2.0], [-1.0, 7.0]]),
            [1.0; 3],
            [0.0; 3],
        );
        assert_eq!(grid.value_range(), Some((-1.0, 7.0)));
    }
}
