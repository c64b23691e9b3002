#![forbid(unsafe_code)]

//! Dynamic property values.
//!
//! Property bags store [`Value`]s. `Null` stands for "unset". Every variant
//! compares structurally except [`Value::Object`], which compares by
//! identity: two handles are equal only when they share the same store.

use std::fmt;

use serde_json::json;

use crate::arena::NodeId;
use crate::observable::Observable;

/// Nesting limit when rendering observables to JSON.
const JSON_DEPTH_LIMIT: usize = 8;

/// A point or vector in model space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct XYZ {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl XYZ {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Column-major 4x4 transform.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Matrix4(pub [f64; 16]);

impl Default for Matrix4 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix4 {
    #[must_use]
    pub const fn identity() -> Self {
        Self([
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, 0.0, 1.0,
        ])
    }

    #[must_use]
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        let mut m = Self::identity();
        m.0[12] = x;
        m.0[13] = y;
        m.0[14] = z;
        m
    }

    /// Element-wise comparison within `tolerance`.
    #[must_use]
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }
}

/// Dynamic value held by an [`Observable`] property.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Point(XYZ),
    Matrix(Matrix4),
    Node(NodeId),
    List(Vec<Value>),
    Object(Observable),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Point(a), Self::Point(b)) => a == b,
            (Self::Matrix(a), Self::Matrix(b)) => a == b,
            (Self::Node(a), Self::Node(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::Float(v) => write!(f, "Float({v})"),
            Self::Text(v) => write!(f, "Text({v:?})"),
            Self::Point(v) => write!(f, "Point({}, {}, {})", v.x, v.y, v.z),
            Self::Matrix(_) => f.write_str("Matrix(..)"),
            Self::Node(id) => write!(f, "Node({id})"),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Object(obj) => write!(f, "Object(#{})", obj.id()),
        }
    }
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_matrix(&self) -> Option<&Matrix4> {
        match self {
            Self::Matrix(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_observable(&self) -> Option<&Observable> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Short type name, as used by custom property type inference.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::Float(_) => "number",
            Self::Text(_) => "string",
            Self::Point(_) | Self::Matrix(_) | Self::Node(_) | Self::List(_) | Self::Object(_) => {
                "object"
            }
        }
    }

    /// Render as JSON. Observables become objects of their public
    /// properties, nested up to a fixed depth.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_depth(0)
    }

    fn to_json_depth(&self, depth: usize) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(v) => json!(v),
            Self::Int(v) => json!(v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(v) => json!(v),
            Self::Point(p) => json!({ "x": p.x, "y": p.y, "z": p.z }),
            Self::Matrix(m) => json!({ "matrix": m.0.to_vec() }),
            Self::Node(id) => json!({ "node": id.to_string() }),
            Self::List(items) => serde_json::Value::Array(
                items.iter().map(|v| v.to_json_depth(depth + 1)).collect(),
            ),
            Self::Object(obj) => {
                if depth >= JSON_DEPTH_LIMIT {
                    return json!({ "objectId": obj.id() });
                }
                let map = obj
                    .entries()
                    .into_iter()
                    .filter(|(key, _)| !key.starts_with('_'))
                    .map(|(key, value)| (key, value.to_json_depth(depth + 1)))
                    .collect();
                serde_json::Value::Object(map)
            }
        }
    }

    /// Inverse of [`Value::to_json`] for the plain-data shapes. JSON objects
    /// that are not a point or a matrix come back as `Null`.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(v) => Self::Bool(*v),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(map) => {
                if let Some(serde_json::Value::Array(cells)) = map.get("matrix")
                    && cells.len() == 16
                {
                    let mut m = [0.0; 16];
                    for (slot, cell) in m.iter_mut().zip(cells) {
                        *slot = cell.as_f64().unwrap_or(0.0);
                    }
                    return Self::Matrix(Matrix4(m));
                }
                match (
                    map.get("x").and_then(serde_json::Value::as_f64),
                    map.get("y").and_then(serde_json::Value::as_f64),
                    map.get("z").and_then(serde_json::Value::as_f64),
                ) {
                    (Some(x), Some(y), Some(z)) if map.len() == 3 => Self::Point(XYZ::new(x, y, z)),
                    _ => Self::Null,
                }
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<XYZ> for Value {
    fn from(v: XYZ) -> Self {
        Self::Point(v)
    }
}

impl From<Matrix4> for Value {
    fn from(v: Matrix4) -> Self {
        Self::Matrix(v)
    }
}

impl From<NodeId> for Value {
    fn from(v: NodeId) -> Self {
        Self::Node(v)
    }
}

impl From<Observable> for Value {
    fn from(v: Observable) -> Self {
        Self::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
