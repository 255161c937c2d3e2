//! Landmark types and the ingestion adapter for detector output.
//!
//! Face-landmark detectors disagree on how they lay out their points: some emit
//! `scaledMesh` as `[[x, y, z], ...]`, others emit `keypoints` as
//! `[{x, y, z}, ...]`. [`DetectedFace::landmarks`] folds all of these into one
//! [`Landmarks`] list so extraction code never sees the raw shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single landmark in image-normalised coordinates. Missing depth is 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Canonical, index-addressable landmark list for one face.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Landmarks {
    points: Vec<Point3>,
}

impl Landmarks {
    pub fn new(points: Vec<Point3>) -> Self {
        Self { points }
    }

    /// Landmark at a model index, if the detector produced that many points.
    pub fn get(&self, index: usize) -> Option<Point3> {
        self.points.get(index).copied()
    }

    /// Resolve several indices at once; `None` if any is missing.
    pub fn get_all<const N: usize>(&self, indices: [usize; N]) -> Option<[Point3; N]> {
        let mut out = [Point3::default(); N];
        for (slot, idx) in out.iter_mut().zip(indices) {
            *slot = self.get(idx)?;
        }
        Some(out)
    }

    /// Points present among `indices`, skipping the ones the detector did not emit.
    pub fn select<'a>(&'a self, indices: &'a [usize]) -> impl Iterator<Item = Point3> + 'a {
        indices.iter().filter_map(move |&i| self.get(i))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point3] {
        &self.points
    }
}

impl From<Vec<Point3>> for Landmarks {
    fn from(points: Vec<Point3>) -> Self {
        Self::new(points)
    }
}

/// One face as reported by the detector, before shape normalisation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectedFace {
    #[serde(rename = "scaledMesh", default, skip_serializing_if = "Option::is_none")]
    pub scaled_mesh: Option<Value>,
    #[serde(rename = "keypoints3D", default, skip_serializing_if = "Option::is_none")]
    pub keypoints_3d: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypoints: Option<Value>,
}

impl DetectedFace {
    /// Build a face in the object-list (`keypoints`) layout.
    pub fn from_points(points: &[Point3]) -> Self {
        Self {
            keypoints: serde_json::to_value(points).ok(),
            ..Self::default()
        }
    }

    /// Normalise whichever container the detector filled into a landmark list.
    ///
    /// The first present container wins; if it is empty or not a recognised
    /// shape, `keypoints` is tried. Returns `None` when nothing usable exists.
    pub fn landmarks(&self) -> Option<Landmarks> {
        let primary = self
            .scaled_mesh
            .as_ref()
            .or(self.keypoints_3d.as_ref())
            .or(self.keypoints.as_ref());

        if let Some(points) = primary.and_then(parse_container) {
            if !points.is_empty() {
                return Some(Landmarks::new(points));
            }
        }

        self.keypoints
            .as_ref()
            .and_then(parse_container)
            .filter(|points| !points.is_empty())
            .map(Landmarks::new)
    }
}

/// Parse an array-of-arrays or array-of-objects container.
fn parse_container(value: &Value) -> Option<Vec<Point3>> {
    let items = value.as_array()?;
    let Some(first) = items.first() else {
        return Some(Vec::new());
    };

    if first.is_array() {
        items.iter().map(parse_tuple).collect()
    } else if first.get("x").is_some() {
        items.iter().map(parse_object).collect()
    } else {
        None
    }
}

fn parse_tuple(value: &Value) -> Option<Point3> {
    let coords = value.as_array()?;
    let x = coords.first()?.as_f64()?;
    let y = coords.get(1)?.as_f64()?;
    let z = coords.get(2).and_then(Value::as_f64).unwrap_or(0.0);
    Some(Point3::new(x, y, z))
}

fn parse_object(value: &Value) -> Option<Point3> {
    let x = value.get("x")?.as_f64()?;
    let y = value.get("y")?.as_f64()?;
    let z = value.get("z").and_then(Value::as_f64).unwrap_or(0.0);
    Some(Point3::new(x, y, z))
}
