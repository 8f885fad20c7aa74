use crate::{
    dose::DoseVolumeGrid,
    normalizer::{
        ImageGeometry, Modality, NormalizeError, OrientationNormalizer, RawSlice, RawVolume,
    },
    structure_set::{Structure, StructureSet, StructureSetError},
    volume::{VolumeGrid, Voxels},
};

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder},
};
use dicom_dictionary_std::tags;
use log::{info, warn};
use ndarray::s;
use std::{collections::HashMap, fs, path::Path};
use thiserror::Error;

/// Display colour of structures without ROIDisplayColor.
pub const DEFAULT_STRUCTURE_COLOR: [u8; 3] = [255, 0, 0];

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Missing or malformed attribute {0}")]
    MissingAttribute(&'static str),

    #[error("Pixel data error: {0}")]
    PixelData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Structure(#[from] StructureSetError),
}

/// Extracts voxel arrays and geometry metadata from DICOM files.
///
/// Values are read as stored; rescaling and orientation are left to the
/// [`OrientationNormalizer`].
pub struct VolumeLoader;

impl VolumeLoader {
    /// Read one file: a single image, a multi-frame image or an RT dose grid
    pub fn load_file(path: impl AsRef<Path>) -> Result<RawVolume, VolumeLoaderError> {
        let dicom_object = open_file(path.as_ref())?;
        Self::raw_volume_from_object(&dicom_object)
    }

    /// Extract voxels and metadata from an already opened file.
    ///
    /// # Errors
    ///
    /// Returns error if the pixel data cannot be decoded or a geometry
    /// attribute is missing.
    pub fn raw_volume_from_object(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<RawVolume, VolumeLoaderError> {
        let voxels = Self::decode_voxels(dicom_object)?;
        let geometry = Self::geometry(dicom_object)?;
        let modality = Self::modality(dicom_object);
        let slice_spacing = match voxels {
            Voxels::Volumetric(_) => Self::frame_spacing(dicom_object),
            Voxels::Planar(_) => Self::get_float(dicom_object, tags::SLICE_THICKNESS),
        };
        Ok(RawVolume {
            voxels,
            geometry,
            modality,
            slice_spacing,
        })
    }

    /// Read every ".dcm" file of a directory as one slice of a series.
    ///
    /// Files that are not images are skipped with a warning.
    pub fn load_series_from_directory(
        path: impl AsRef<Path>,
    ) -> Result<Vec<RawSlice>, VolumeLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        let slices: Vec<RawSlice> = paths
            .iter()
            .filter_map(|path| match Self::load_slice(path) {
                Ok(slice) => Some(slice),
                Err(error) => {
                    warn!("skipping {}: {}", path.display(), error);
                    None
                }
            })
            .collect();

        if slices.is_empty() {
            return Err(VolumeLoaderError::NoValidImages);
        }
        Ok(slices)
    }

    fn load_slice(path: &Path) -> Result<RawSlice, VolumeLoaderError> {
        let dicom_object = open_file(path)?;
        Self::slice_from_object(&dicom_object)
    }

    /// Extract one series slice; the stacking position is the z component
    /// of ImagePositionPatient.
    pub fn slice_from_object(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<RawSlice, VolumeLoaderError> {
        let pixels = match Self::decode_voxels(dicom_object)? {
            Voxels::Planar(plane) => plane,
            Voxels::Volumetric(volume) => volume.slice_move(s![0, .., ..]),
        };
        let geometry = Self::geometry(dicom_object)?;
        Ok(RawSlice {
            pixels,
            position: geometry.image_position[2],
            geometry,
            modality: Self::modality(dicom_object),
        })
    }

    /// Open and normalize a directory of single-slice files
    pub fn open_series(path: impl AsRef<Path>) -> Result<VolumeGrid, VolumeLoaderError> {
        let slices = Self::load_series_from_directory(path)?;
        Ok(OrientationNormalizer::normalize_series(slices)?)
    }

    /// Open and normalize an RT dose file
    pub fn open_dose(path: impl AsRef<Path>) -> Result<DoseVolumeGrid, VolumeLoaderError> {
        let raw = Self::load_file(path)?;
        if !raw.modality.is_dose() {
            warn!("dose import of a file whose modality is not {}", Modality::DOSE_TAG);
        }
        Ok(DoseVolumeGrid::new(OrientationNormalizer::normalize(raw)?))
    }

    /// Read the contours of an RT structure set file
    pub fn load_structures(path: impl AsRef<Path>) -> Result<StructureSet, VolumeLoaderError> {
        let dicom_object = open_file(path.as_ref())?;
        Self::structures_from_object(&dicom_object)
    }

    /// Collect every ROI of an RT structure set, in ROIContourSequence order.
    ///
    /// Names come from StructureSetROISequence by ROI number. ROIs without a
    /// ContourSequence become empty structures; contours with malformed
    /// ContourData are skipped.
    pub fn structures_from_object(
        dicom_object: &InMemDicomObject,
    ) -> Result<StructureSet, VolumeLoaderError> {
        let names: HashMap<i32, String> =
            Self::get_items(dicom_object, tags::STRUCTURE_SET_ROI_SEQUENCE)
                .unwrap_or_default()
                .iter()
                .filter_map(|roi| {
                    let number = roi.element(tags::ROI_NUMBER).ok()?.to_int::<i32>().ok()?;
                    let name = roi.element(tags::ROI_NAME).ok()?.to_str().ok()?;
                    Some((number, name.trim().to_string()))
                })
                .collect();

        let roi_contours = Self::get_items(dicom_object, tags::ROI_CONTOUR_SEQUENCE)
            .ok_or(VolumeLoaderError::MissingAttribute("ROIContourSequence"))?;

        let mut structures = Vec::with_capacity(roi_contours.len());
        for (i, roi) in roi_contours.iter().enumerate() {
            let number = roi
                .element(tags::REFERENCED_ROI_NUMBER)
                .ok()
                .and_then(|e| e.to_int::<i32>().ok());
            let name = number
                .and_then(|n| names.get(&n).cloned())
                .unwrap_or_else(|| format!("ROI {}", number.unwrap_or(i as i32 + 1)));
            let color = Self::display_color(roi);

            let mut flat = Vec::new();
            let mut boundaries = Vec::new();
            for contour in Self::get_items(roi, tags::CONTOUR_SEQUENCE).unwrap_or_default() {
                match contour
                    .element(tags::CONTOUR_DATA)
                    .ok()
                    .and_then(|e| e.to_multi_float64().ok())
                {
                    Some(data) if !data.is_empty() && data.len() % 3 == 0 => {
                        flat.extend(data);
                        boundaries.push(flat.len() / 3);
                    }
                    _ => warn!("skipping malformed contour of {name}"),
                }
            }
            structures.push(Structure::new(name, &flat, boundaries, color)?);
        }

        info!("read {} structures", structures.len());
        Ok(StructureSet::new(structures))
    }

    fn display_color(roi: &InMemDicomObject) -> [u8; 3] {
        roi.element(tags::ROI_DISPLAY_COLOR)
            .ok()
            .and_then(|e| e.to_multi_int::<i32>().ok())
            .filter(|rgb| rgb.len() == 3)
            .map(|rgb| [0, 1, 2].map(|i| rgb[i].clamp(0, 255) as u8))
            .unwrap_or(DEFAULT_STRUCTURE_COLOR)
    }

    fn decode_voxels(
        dicom_object: &FileDicomObject<InMemDicomObject>,
    ) -> Result<Voxels, VolumeLoaderError> {
        let pixel_data = dicom_object
            .decode_pixel_data()
            .map_err(|e| VolumeLoaderError::PixelData(e.to_string()))?;
        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
        let frames = pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map_err(|e| VolumeLoaderError::PixelData(e.to_string()))?;
        // (frames, rows, columns, samples); only the first sample is kept
        if frames.dim().0 == 1 {
            Ok(Voxels::Planar(frames.slice_move(s![0, .., .., 0])))
        } else {
            Ok(Voxels::Volumetric(frames.slice_move(s![.., .., .., 0])))
        }
    }

    /// Read PixelSpacing, ImagePositionPatient and ImageOrientationPatient.
    pub fn geometry(dicom_object: &InMemDicomObject) -> Result<ImageGeometry, VolumeLoaderError> {
        let pixel_spacing: [f64; 2] = Self::get_floats(dicom_object, tags::PIXEL_SPACING)
            .ok_or(VolumeLoaderError::MissingAttribute("PixelSpacing"))?;
        let image_position: [f64; 3] = Self::get_floats(dicom_object, tags::IMAGE_POSITION_PATIENT)
            .ok_or(VolumeLoaderError::MissingAttribute("ImagePositionPatient"))?;
        let image_orientation: [f64; 6] =
            Self::get_floats(dicom_object, tags::IMAGE_ORIENTATION_PATIENT)
                .ok_or(VolumeLoaderError::MissingAttribute("ImageOrientationPatient"))?;
        Ok(ImageGeometry {
            pixel_spacing,
            image_position,
            image_orientation,
        })
    }

    /// Modality with its scaling attributes; absent attributes stay `None`.
    pub fn modality(dicom_object: &InMemDicomObject) -> Modality {
        let tag = dicom_object
            .element(tags::MODALITY)
            .ok()
            .and_then(|e| e.to_str().ok())
            .map(|s| s.into_owned())
            .unwrap_or_default();
        Modality::from_tag(
            &tag,
            Self::get_float(dicom_object, tags::DOSE_GRID_SCALING),
            Self::get_float(dicom_object, tags::RESCALE_SLOPE),
            Self::get_float(dicom_object, tags::RESCALE_INTERCEPT),
        )
    }

    /// Distance between the first two frames of a multi-frame file.
    fn frame_spacing(dicom_object: &InMemDicomObject) -> Option<f64> {
        let offsets = dicom_object
            .element(tags::GRID_FRAME_OFFSET_VECTOR)
            .ok()
            .and_then(|e| e.to_multi_float64().ok());
        match offsets.as_deref() {
            Some([first, second, ..]) => Some(second - first),
            _ => Self::get_float(dicom_object, tags::SPACING_BETWEEN_SLICES),
        }
    }

    fn get_float(dicom_object: &InMemDicomObject, tag: Tag) -> Option<f64> {
        dicom_object.element(tag).ok()?.to_float64().ok()
    }

    fn get_floats<const N: usize>(dicom_object: &InMemDicomObject, tag: Tag) -> Option<[f64; N]> {
        let values = dicom_object.element(tag).ok()?.to_multi_float64().ok()?;
        values.get(..N)?.try_into().ok()
    }

    fn get_items(dicom_object: &InMemDicomObject, tag: Tag) -> Option<&[InMemDicomObject]> {
        dicom_object.element(tag).ok()?.items()
    }
}
