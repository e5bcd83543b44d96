//! Document: the whiteboard value exchanged between replicas.
//!
//! A document is read wholesale, mutated wholesale in memory, and persisted
//! wholesale. It carries:
//! - `version`: schema marker, constant across replicas
//! - `layers`: ordered layer metadata (one writer-of-record per session)
//! - `strokes`: append-only, identity-addressed drawing content
//! - `canvas_width` / `canvas_height`: replica-wide constants
//! - `last_modified`: freshness clock in milliseconds since the Unix epoch

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;
use uuid::Uuid;
use web_time::{SystemTime, UNIX_EPOCH};

/// Schema version marker every persisted document must carry.
pub const SCHEMA_VERSION: u32 = 1;

/// Name given to the layer of a freshly created document.
pub const DEFAULT_LAYER_NAME: &str = "Layer 1";

pub const DEFAULT_CANVAS_WIDTH: u32 = 1920;
pub const DEFAULT_CANVAS_HEIGHT: u32 = 1080;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Layer identifier.
///
/// Opaque on the wire so replicas written by other clients still load;
/// locally generated ids are UUID v4 strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stroke identifier, assigned once by the authoring replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrokeId(pub String);

impl StrokeId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for StrokeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StrokeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Layer metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    /// Rank used for rendering order (lower draws first)
    pub order: i32,
}

impl Layer {
    pub fn new(name: impl Into<String>, order: i32) -> Self {
        Self {
            id: LayerId::generate(),
            name: name.into(),
            visible: true,
            order,
        }
    }
}

/// A point on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Drawing tool that produced a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Brush,
    Eraser,
}

/// A single stroke. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    pub id: StrokeId,
    pub points: Vec<Point>,
    pub color: String,
    pub width: f64,
    pub layer_id: LayerId,
    pub tool: Tool,
    pub author_id: String,
    pub author_name: String,
    /// Creation instant in milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl Stroke {
    /// Create a stroke with a fresh id, stamped with the current time.
    pub fn new(
        layer_id: LayerId,
        tool: Tool,
        points: Vec<Point>,
        color: impl Into<String>,
        width: f64,
        author_id: impl Into<String>,
        author_name: impl Into<String>,
    ) -> Self {
        Self {
            id: StrokeId::generate(),
            points,
            color: color.into(),
            width,
            layer_id,
            tool,
            author_id: author_id.into(),
            author_name: author_name.into(),
            timestamp: now_millis(),
        }
    }

    /// Whether every coordinate and the width are finite numbers.
    ///
    /// JSON has no NaN or infinity, so a non-finite stroke cannot be persisted.
    pub fn is_finite(&self) -> bool {
        self.width.is_finite() && self.points.iter().all(|p| p.x.is_finite() && p.y.is_finite())
    }
}

/// The synchronized aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub version: u32,
    pub layers: Vec<Layer>,
    pub strokes: Vec<Stroke>,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub last_modified: u64,
}

impl Document {
    /// Create the document a replica starts from when nothing is persisted.
    pub fn create_default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            layers: vec![Layer::new(DEFAULT_LAYER_NAME, 0)],
            strokes: Vec::new(),
            canvas_width: DEFAULT_CANVAS_WIDTH,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            last_modified: 0,
        }
    }

    /// Look up a layer by id.
    pub fn layer(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| &l.id == id)
    }

    /// Append a layer ranked above every existing one. Returns its id.
    pub fn add_layer(&mut self, name: impl Into<String>) -> LayerId {
        let order = self.layers.iter().map(|l| l.order + 1).max().unwrap_or(0);
        let layer = Layer::new(name, order);
        let id = layer.id.clone();
        self.layers.push(layer);
        id
    }

    /// Append a stroke. Strokes whose id is already present are ignored,
    /// since stroke identity is immutable, as are strokes that are not
    /// [finite](Stroke::is_finite).
    pub fn add_stroke(&mut self, stroke: Stroke) -> bool {
        if !stroke.is_finite() {
            warn!("Dropping stroke {} with non-finite geometry", stroke.id);
            return false;
        }
        if self.strokes.iter().any(|s| s.id == stroke.id) {
            return false;
        }
        self.strokes.push(stroke);
        true
    }

    /// Ids of every stroke in the document.
    pub fn stroke_ids(&self) -> HashSet<&StrokeId> {
        self.strokes.iter().map(|s| &s.id).collect()
    }

    /// Stamp `last_modified` for persistence.
    ///
    /// Every stamp is strictly newer than the one it replaces, even if the
    /// wall clock jumps back or two writes land in the same millisecond.
    pub fn touch(&mut self, now: u64) {
        self.last_modified = now.max(self.last_modified.saturating_add(1));
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::create_default()
    }
}
