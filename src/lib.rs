//! # RT-volume library
//!
//! This crate brings radiotherapy CT scans, dose grids and structure sets
//! into one canonical frame so they can be viewed on top of each other.
//!
//! Raw DICOM voxels come with whatever patient orientation the scanner or
//! planning system wrote. The [`OrientationNormalizer`] turns them into a
//! [`VolumeGrid`] whose indices always run in canonical order, with origin
//! and spacing laid out as (depth, row, col). Only axial acquisitions are
//! supported; oblique or sagittal image planes are rejected.
//!
//! A dose grid is usually coarser than the CT and placed elsewhere. Rather
//! than resampling it, the [`CrossVolumeSlicer`] maps a CT slice index to the
//! dose slice covering the same physical position, or reports that there is
//! none. Structure contours are picked per slice by [`StructureSet`].
//!
//! Grids are viewed in three orientations:
//!  - Axial (axis 1)
//!  - Coronal (axis 2)
//!  - Sagittal (axis 3)
//!
//! [`VolumeGrid::image`] and [`VolumeGrid::extent`] give the pixels and the
//! physical bounds of a slice; rotating one without the other misaligns the
//! display.
//!
//! # Examples
//!
//! ## Overlaying a dose slice on a CT series
//!
//! ```no_run
//! # use rt_volume::{CrossVolumeSlicer, Orientation, VolumeLoader};
//! let ct = VolumeLoader::open_series("ct/").expect("should have loaded the CT series");
//! let dose = VolumeLoader::open_dose("RD.dcm").expect("should have loaded the dose grid");
//! let ct_slice = ct.shape()[0] / 2;
//! let dose_slice =
//!     CrossVolumeSlicer::corresponding_slice(&ct, dose.grid(), Orientation::Axial, ct_slice);
//! if let Some(index) = dose_slice.index() {
//!     let image = dose.grid().image(Orientation::Axial, index, true);
//!     let extent = dose.grid().extent(Orientation::Axial, true);
//! }
//! ```

pub mod dose;
pub mod enums;
pub mod normalizer;
pub mod session;
pub mod settings;
pub mod slicer;
pub mod structure_set;
pub mod volume;
pub mod volume_loader;

pub use dose::DoseVolumeGrid;
pub use enums::{DisplayWindow, Orientation, OverlayMode};
pub use normalizer::{Modality, NormalizeError, OrientationNormalizer, RawSlice, RawVolume};
pub use session::{DoseOverlay, Session};
pub use settings::ViewerSettings;
pub use slicer::{CrossVolumeSlicer, SliceCorrespondence};
pub use structure_set::{ContourShape, Structure, StructureSet};
pub use volume::{Extent, VolumeGrid, Voxels};
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
