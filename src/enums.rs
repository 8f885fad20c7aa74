use serde::Deserialize;

/// View axis of a canonical grid.
///
/// Each variant holds one canonical dimension fixed: `Axial` is the stacking
/// (depth) axis 0, `Coronal` the row axis 1 and `Sagittal` the column axis 2.
/// Viewers number them 1, 2 and 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Axial,
    Coronal,
    Sagittal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Coronal,
        Orientation::Sagittal,
    ];

    /// Map a 1-based viewer axis number onto an orientation
    pub fn from_axis_number(axis: u8) -> Option<Self> {
        match axis {
            1 => Some(Orientation::Axial),
            2 => Some(Orientation::Coronal),
            3 => Some(Orientation::Sagittal),
            _ => None,
        }
    }

    /// 1-based viewer axis number
    pub fn axis_number(self) -> u8 {
        self.index() as u8 + 1
    }

    /// Zero-based canonical dimension held fixed by this view
    pub fn index(self) -> usize {
        match self {
            Orientation::Axial => 0,
            Orientation::Coronal => 1,
            Orientation::Sagittal => 2,
        }
    }

    /// The two canonical dimensions spanning the displayed plane, in
    /// increasing order.
    pub fn in_plane(self) -> (usize, usize) {
        match self {
            Orientation::Axial => (1, 2),
            Orientation::Coronal => (0, 2),
            Orientation::Sagittal => (0, 1),
        }
    }
}

/// How a dose grid is drawn on top of the anatomy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayMode {
    #[default]
    ContourRelativeToMax,
    ContourRelativeToReference,
    SemiTransparentWash,
}

/// Grey level window used when converting a slice to an 8-bit image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayWindow {
    /// Stretch the slice's own minimum and maximum
    #[default]
    Auto,
    /// Fixed CT window from -1000 HU to 2000 HU
    Hounsfield,
    Range { min: f32, max: f32 },
}

impl DisplayWindow {
    pub const HOUNSFIELD_MIN: f32 = -1000.0;
    pub const HOUNSFIELD_MAX: f32 = 2000.0;
}
