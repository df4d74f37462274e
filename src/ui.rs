//! Named UI templates and the probes that look for them on screen.
//!
//! Menus and game messages have no cell on the grid; the agent finds them by
//! template matching against the captured frame. The catalog holds registered
//! templates by name, and every probe parks the cursor on the neutral point
//! first so it never shadows what it searches for.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::geom::{Point, Rect};
use crate::interface::{Actuator, Frame, Perception};

/// Minimum match confidence for a template to count as visible.
pub const UI_CONFIDENCE: f64 = 0.90;

/// The forge confirmation menu.
pub const BLACKSMITH_MENU: &str = "blacksmith_menu";
/// The furnace patch with no fire burning.
pub const COLD_FURNACE: &str = "cold_furnace";
/// Chat message: the worked rock face is mined out.
pub const NOTHING_TO_MINE: &str = "nothing_to_mine";
/// Chat message: the worked rock face is out of reach.
pub const CANNOT_MINE_THERE: &str = "cannot_mine_there";

/// A referenced template is not in the catalog.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("ui template {0:?} is not registered")]
pub struct MissingTemplate(pub String);

/// The agent's registry of probe-able UI templates.
#[derive(Clone, Debug, Default)]
pub struct UiCatalog {
    templates: HashMap<String, Frame>,
}

impl UiCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a template.
    pub fn register(&mut self, name: impl Into<String>, template: Frame) {
        self.templates.insert(name.into(), template);
    }

    pub fn get(&self, name: &str) -> Option<&Frame> {
        self.templates.get(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Check that every required template is registered.
    pub fn ensure(&self, required: &[&str]) -> Result<(), MissingTemplate> {
        for name in required {
            if !self.templates.contains_key(*name) {
                return Err(MissingTemplate(name.to_string()));
            }
        }
        Ok(())
    }
}

/// One look for a template anywhere on screen, cursor parked first.
pub fn probe<B>(backend: &mut B, template: &Frame, neutral: Point) -> Option<Point>
where
    B: Perception + Actuator,
{
    backend.move_cursor(neutral, Duration::ZERO);
    match backend.locate(template) {
        Some((at, confidence)) if confidence >= UI_CONFIDENCE => Some(at),
        _ => None,
    }
}

/// Poll for a template until it shows or the attempts run out.
pub fn wait_for<B>(
    backend: &mut B,
    template: &Frame,
    neutral: Point,
    attempts: u32,
    delay: Duration,
) -> Option<Point>
where
    B: Perception + Actuator,
{
    for attempt in 1..=attempts {
        if let Some(at) = probe(backend, template, neutral) {
            debug!(at = ?at, attempt, "ui element appeared");
            return Some(at);
        }
        backend.pause(delay);
    }
    None
}

/// Whether `template` currently shows inside a fixed screen region.
pub fn region_shows<P: Perception>(perception: &mut P, region: Rect, template: &Frame) -> bool {
    let frame = perception.capture();
    let patch = frame.region(region);
    perception.match_confidence(&patch, template) >= UI_CONFIDENCE
}

/// One manifest entry: a template file and the name it is probed by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiSpec {
    pub name: String,
    pub file: PathBuf,
}

/// On-disk description of the UI catalog, loaded from YAML.
///
/// ```yaml
/// elements:
///   - { name: blacksmith_menu, file: ui/blacksmith_menu.png }
///   - { name: cold_furnace, file: ui/cold_furnace.png }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiManifest {
    pub elements: Vec<UiSpec>,
}

impl UiManifest {
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

#[cfg(feature = "png")]
impl UiManifest {
    /// Load every template relative to `root` and build the catalog.
    pub fn load(
        &self,
        root: &std::path::Path,
    ) -> Result<UiCatalog, crate::signature::ManifestLoadError> {
        let mut catalog = UiCatalog::new();
        for spec in &self.elements {
            let path = root.join(&spec.file);
            let template = Frame::from_png(&path).map_err(|source| {
                crate::signature::ManifestLoadError::Template {
                    path: path.clone(),
                    source,
                }
            })?;
            catalog.register(spec.name.clone(), template);
        }
        Ok(catalog)
    }
}
