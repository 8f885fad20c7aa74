use crate::enums::Orientation;
use crate::volume::VolumeGrid;

use std::ops::Range;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StructureSetError {
    #[error("Vertex data of structure {0:?} is not a list of x/y/z triples")]
    MalformedVertexData(String),

    #[error("Contour boundaries of structure {0:?} are not strictly increasing")]
    NonIncreasingBoundaries(String),

    #[error("Contour boundaries of structure {name:?} end at {last}, but it has {vertices} vertices")]
    BoundaryOutOfRange {
        name: String,
        last: usize,
        vertices: usize,
    },
}

/// One delineated structure: closed contours sharing a vertex list.
#[derive(Clone, Debug, PartialEq)]
pub struct Structure {
    name: String,
    color: [u8; 3],
    vertices: Vec<[f64; 3]>,
    boundaries: Vec<usize>,
}

impl Structure {
    /// Build a structure from interleaved patient `x/y/z` coordinates and
    /// the cumulative vertex count at the end of each contour.
    ///
    /// # Errors
    ///
    /// Returns error if the coordinates are not triples, if the boundaries
    /// are not strictly increasing, or if the last boundary is not the vertex
    /// count.
    pub fn new(
        name: impl Into<String>,
        flat_vertices: &[f64],
        boundaries: Vec<usize>,
        color: [u8; 3],
    ) -> Result<Self, StructureSetError> {
        let name = name.into();
        if flat_vertices.len() % 3 != 0 {
            return Err(StructureSetError::MalformedVertexData(name));
        }
        let vertices: Vec<[f64; 3]> = flat_vertices
            .chunks_exact(3)
            .map(|xyz| [xyz[0], xyz[1], xyz[2]])
            .collect();

        let increasing = std::iter::once(0)
            .chain(boundaries.iter().copied())
            .zip(boundaries.iter().copied())
            .all(|(start, end)| start < end);
        if !increasing {
            return Err(StructureSetError::NonIncreasingBoundaries(name));
        }
        let last = boundaries.last().copied().unwrap_or(0);
        if last != vertices.len() {
            return Err(StructureSetError::BoundaryOutOfRange {
                name,
                last,
                vertices: vertices.len(),
            });
        }

        Ok(Self {
            name,
            color,
            vertices,
            boundaries,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    /// Patient `[x, y, z]` coordinates of every vertex
    pub fn vertices(&self) -> &[[f64; 3]] {
        &self.vertices
    }

    pub fn boundaries(&self) -> &[usize] {
        &self.boundaries
    }

    /// A structure made of a single contour is drawn as a marker.
    pub fn is_point_marker(&self) -> bool {
        self.boundaries.len() == 1
    }

    /// Vertex range of each closed contour
    pub fn contour_ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        std::iter::once(0)
            .chain(self.boundaries.iter().copied())
            .zip(self.boundaries.iter().copied())
            .map(|(start, end)| start..end)
    }
}

/// Something to draw for a structure on one slice, in display coordinates.
#[derive(Clone, Debug, PartialEq)]
pub enum ContourShape {
    /// Closed polyline; the last point connects back to the first
    Polyline(Vec<[f64; 2]>),
    PointMarker([f64; 2]),
}

/// The slice a query is made on, with everything needed to test and project
/// a vertex.
#[derive(Clone, Copy, Debug)]
struct SlicePlane {
    depth_axis: usize,
    in_plane: (usize, usize),
    origin: f64,
    spacing: f64,
    slice_index: usize,
    rotate: bool,
}

impl SlicePlane {
    fn new(grid: &VolumeGrid, orientation: Orientation, slice_index: usize, rotate: bool) -> Self {
        let depth_axis = orientation.index();
        Self {
            depth_axis,
            in_plane: orientation.in_plane(),
            origin: grid.origin()[depth_axis],
            spacing: grid.spacing()[depth_axis],
            slice_index,
            rotate,
        }
    }

    /// Patient `[x, y, z]` in canonical (depth, row, col) order
    fn canonical(vertex: &[f64; 3]) -> [f64; 3] {
        [vertex[2], vertex[1], vertex[0]]
    }

    fn contains(&self, vertex: &[f64; 3]) -> bool {
        let depth = Self::canonical(vertex)[self.depth_axis];
        let index = ((depth - self.origin) / self.spacing).round();
        index == self.slice_index as f64
    }

    fn project(&self, vertex: &[f64; 3]) -> [f64; 2] {
        let c = Self::canonical(vertex);
        let (first, second) = self.in_plane;
        if self.rotate {
            [c[second], c[first]]
        } else {
            [c[first], c[second]]
        }
    }
}

/// All structures of one import, in file order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructureSet {
    structures: Vec<Structure>,
}

impl StructureSet {
    pub fn new(structures: Vec<Structure>) -> Self {
        Self { structures }
    }

    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    pub fn get(&self, index: usize) -> Option<&Structure> {
        self.structures.get(index)
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    pub fn position_by_name(&self, name: &str) -> Option<usize> {
        self.structures.iter().position(|s| s.name == name)
    }

    /// Contours of structure `structure_index` lying on a slice of `grid`.
    ///
    /// A vertex belongs to the slice whose index is nearest to its depth
    /// coordinate. Vertices of one contour on the slice form one polyline in
    /// the two in-plane coordinates, swapped when `rotate` is set so they
    /// line up with a rotated image. A single-contour structure yields a
    /// point marker instead.
    ///
    /// The sequence is computed lazily on each call. An unknown structure
    /// yields nothing.
    pub fn contours_on_slice<'a>(
        &'a self,
        structure_index: usize,
        orientation: Orientation,
        slice_index: usize,
        grid: &VolumeGrid,
        rotate: bool,
    ) -> impl Iterator<Item = ContourShape> + use<'a> {
        let plane = SlicePlane::new(grid, orientation, slice_index, rotate);
        self.structures
            .get(structure_index)
            .into_iter()
            .flat_map(move |structure| {
                let marker = structure.is_point_marker();
                structure.contour_ranges().filter_map(move |range| {
                    let points: Vec<[f64; 2]> = structure.vertices[range]
                        .iter()
                        .filter(|vertex| plane.contains(vertex))
                        .map(|vertex| plane.project(vertex))
                        .collect();
                    if points.is_empty() {
                        None
                    } else if marker {
                        Some(ContourShape::PointMarker(points[0]))
                    } else {
                        Some(ContourShape::Polyline(points))
                    }
                })
            })
    }
}
