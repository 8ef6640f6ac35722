//! Math utilities and types
//!
//! The runtime treats the entity transform as an opaque value: it only needs
//! to store it, hand it back, and round-trip it through a tree document.

use nalgebra::{Matrix4, Quaternion, Unit, Vector3};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EcsError, EcsResult};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position relative to the parent entity
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }

    /// Save as a tree document value
    ///
    /// `{"Position": [x, y, z], "Rotation": [i, j, k, w], "Scale": [x, y, z]}`
    pub fn to_document(&self) -> Value {
        serde_json::to_value(TransformDocument::from(self)).unwrap_or_default()
    }

    /// Load from a tree document value written by [`Transform::to_document`]
    ///
    /// Missing fields keep their identity value; the rotation is renormalized.
    pub fn from_document(doc: &Value) -> EcsResult<Self> {
        let document = TransformDocument::deserialize(doc)
            .map_err(|err| EcsError::malformed(format!("'Transform': {err}")))?;

        let [i, j, k, w] = document.rotation;
        let rotation = Quaternion::new(w, i, j, k);
        if rotation.norm() <= f32::EPSILON {
            return Err(EcsError::malformed("'Transform.Rotation' has zero length"));
        }

        Ok(Self {
            position: Vec3::from(document.position),
            rotation: Unit::new_normalize(rotation),
            scale: Vec3::from(document.scale),
        })
    }

    /// Whether a document value can be loaded as a transform
    pub fn is_transform(doc: &Value) -> bool {
        Self::from_document(doc).is_ok()
    }
}

/// Serialized form of a [`Transform`]
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct TransformDocument {
    position: [f32; 3],
    rotation: [f32; 4],
    scale: [f32; 3],
}

impl Default for TransformDocument {
    fn default() -> Self {
        Self::from(&Transform::default())
    }
}

impl From<&Transform> for TransformDocument {
    fn from(transform: &Transform) -> Self {
        let q = transform.rotation.coords;
        Self {
            position: transform.position.into(),
            rotation: [q[0], q[1], q[2], q[3]],
            scale: transform.scale.into(),
        }
    }
}
