// SPDX-License-Identifier: MIT

//! An in-memory, scriptable [`DrawingHost`].
//!
//! This is the host used by `--demo`, by fixture-driven runs, and by the test
//! suite. It speaks the same raw attribute vocabulary as an AutoCAD-style
//! automation surface (`start_point`/`end_point`, `center`/`radius`,
//! `text`/`position`/`height`) so scans against it exercise the real
//! normalizer paths, and it can inject session loss mid-enumeration to
//! exercise abort handling.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use serde::Deserialize;

use crate::model::{DrawingId, Point3};

use super::{DrawOp, DrawingHost, ExportFormat, HostEntity, HostError, LayerInfo, SubmitReceipt};

const DEFAULT_LAYER: &str = "0";

#[derive(Debug, Default)]
struct ScriptedDrawing {
    entities: Vec<HostEntity>,
    layers: Vec<LayerInfo>,
}

impl ScriptedDrawing {
    fn new() -> Self {
        Self {
            entities: Vec::new(),
            layers: vec![default_layer()],
        }
    }

    fn ensure_layer(&mut self, name: &str, color: Option<u16>) {
        if let Some(layer) = self.layers.iter_mut().find(|layer| layer.name == name) {
            if let Some(color) = color {
                layer.color = color;
            }
            return;
        }
        self.layers.push(LayerInfo {
            name: name.to_owned(),
            color: color.unwrap_or(7),
            is_on: true,
            is_frozen: false,
            is_locked: false,
        });
    }
}

fn default_layer() -> LayerInfo {
    LayerInfo {
        name: DEFAULT_LAYER.to_owned(),
        color: 7,
        is_on: true,
        is_frozen: false,
        is_locked: false,
    }
}

#[derive(Debug, Default)]
struct Inner {
    drawings: std::collections::BTreeMap<DrawingId, ScriptedDrawing>,
    next_handle: u64,
    /// When set, enumeration yields this many entities and then reports the
    /// session as lost.
    fail_enumeration_after: Option<usize>,
    /// When set, this many further submissions succeed and the next fails.
    fail_submit_after: Option<usize>,
    submits_done: usize,
    offline: bool,
}

impl Inner {
    fn allocate_handle(&mut self) -> String {
        self.next_handle += 1;
        format!("{:X}", 0xA0 + self.next_handle)
    }
}

/// See module docs.
#[derive(Debug, Default)]
pub struct ScriptedHost {
    inner: Mutex<Inner>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host with one open drawing pre-populated with a PMC-flavored mix of
    /// lines, a circle, and labeled text entities.
    pub fn demo(drawing_id: &DrawingId) -> Self {
        let seed: [(&str, &str, serde_json::Value); 5] = [
            (
                "AcDbLine",
                DEFAULT_LAYER,
                serde_json::json!({ "start_point": [0.0, 0.0, 0.0], "end_point": [100.0, 0.0, 0.0] }),
            ),
            (
                "AcDbCircle",
                "PMC",
                serde_json::json!({ "center": [20.0, 40.0, 0.0], "radius": 5.0 }),
            ),
            (
                "AcDbText",
                "PMC",
                serde_json::json!({ "text": "PMC-3M-A", "position": [20.0, 48.0, 0.0], "height": 2.5 }),
            ),
            (
                "AcDbText",
                "PMC",
                serde_json::json!({ "text": "PMC-3M-B", "position": [60.0, 48.0, 0.0], "height": 2.5 }),
            ),
            (
                "AcDbMText",
                DEFAULT_LAYER,
                serde_json::json!({ "text": "OTHER", "position": [0.0, -10.0, 0.0], "height": 2.5 }),
            ),
        ];

        let host = Self::new();
        {
            let mut inner = host.inner.lock().expect("scripted host lock");
            let mut drawing = ScriptedDrawing::new();
            drawing.ensure_layer("PMC", Some(3));
            for (object_name, layer, attributes) in seed {
                let handle = inner.allocate_handle();
                drawing.entities.push(HostEntity {
                    handle,
                    object_name: object_name.to_owned(),
                    layer: Some(layer.to_owned()),
                    attributes,
                });
            }
            inner.drawings.insert(drawing_id.clone(), drawing);
        }
        host
    }

    /// Load drawings from a JSON fixture file.
    ///
    /// Entities without a `handle` get one assigned, so fixtures only need to
    /// pin handles when a test depends on them.
    pub fn from_fixture(path: &Path) -> Result<Self, HostError> {
        let raw = fs::read_to_string(path).map_err(|err| HostError::Unavailable {
            detail: format!("cannot read host fixture {path:?}: {err}"),
        })?;
        let fixture: Fixture = serde_json::from_str(&raw).map_err(|err| HostError::Unavailable {
            detail: format!("cannot parse host fixture {path:?}: {err}"),
        })?;

        let host = Self::new();
        {
            let mut inner = host.inner.lock().expect("scripted host lock");
            for (name, drawing_fixture) in fixture.drawings {
                let drawing_id = DrawingId::new(name).map_err(|err| HostError::Unavailable {
                    detail: format!("invalid drawing id in fixture: {err}"),
                })?;
                let mut drawing = ScriptedDrawing::new();
                for layer in drawing_fixture.layers {
                    drawing.ensure_layer(&layer.name, layer.color);
                }
                for entity in drawing_fixture.entities {
                    let handle = match entity.handle {
                        Some(handle) => handle,
                        None => inner.allocate_handle(),
                    };
                    drawing.entities.push(HostEntity {
                        handle,
                        object_name: entity.object_name,
                        layer: entity.layer,
                        attributes: entity.attributes,
                    });
                }
                inner.drawings.insert(drawing_id, drawing);
            }
        }
        Ok(host)
    }

    /// Simulate losing the automation session entirely.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().expect("scripted host lock").offline = offline;
    }

    /// Make the next enumerations fail after yielding `count` entities.
    pub fn fail_enumeration_after(&self, count: usize) {
        self.inner.lock().expect("scripted host lock").fail_enumeration_after = Some(count);
    }

    pub fn clear_enumeration_failure(&self) {
        self.inner.lock().expect("scripted host lock").fail_enumeration_after = None;
    }

    /// Make submissions fail once `count` further operations have succeeded.
    pub fn fail_submit_after(&self, count: usize) {
        let mut inner = self.inner.lock().expect("scripted host lock");
        inner.fail_submit_after = Some(count);
        inner.submits_done = 0;
    }

    /// Remove one entity, as a user deleting it in the host application.
    pub fn remove_entity(&self, drawing_id: &DrawingId, handle: &str) -> bool {
        let mut inner = self.inner.lock().expect("scripted host lock");
        let Some(drawing) = inner.drawings.get_mut(drawing_id) else {
            return false;
        };
        let before = drawing.entities.len();
        drawing.entities.retain(|entity| entity.handle != handle);
        drawing.entities.len() != before
    }

    /// Add a raw entity directly, bypassing `submit_operation`. Returns the
    /// assigned handle.
    pub fn insert_entity(
        &self,
        drawing_id: &DrawingId,
        object_name: &str,
        layer: Option<&str>,
        attributes: serde_json::Value,
    ) -> String {
        let mut inner = self.inner.lock().expect("scripted host lock");
        let handle = inner.allocate_handle();
        let drawing = inner
            .drawings
            .entry(drawing_id.clone())
            .or_insert_with(ScriptedDrawing::new);
        drawing.entities.push(HostEntity {
            handle: handle.clone(),
            object_name: object_name.to_owned(),
            layer: layer.map(str::to_owned),
            attributes,
        });
        handle
    }

    pub fn entity_count(&self, drawing_id: &DrawingId) -> usize {
        let inner = self.inner.lock().expect("scripted host lock");
        inner
            .drawings
            .get(drawing_id)
            .map(|drawing| drawing.entities.len())
            .unwrap_or(0)
    }
}

impl DrawingHost for ScriptedHost {
    fn list_drawings(&self) -> Result<Vec<DrawingId>, HostError> {
        let inner = self.inner.lock().expect("scripted host lock");
        if inner.offline {
            return Err(offline());
        }
        Ok(inner.drawings.keys().cloned().collect())
    }

    fn create_drawing(&self, drawing_id: &DrawingId) -> Result<(), HostError> {
        let mut inner = self.inner.lock().expect("scripted host lock");
        if inner.offline {
            return Err(offline());
        }
        if inner.drawings.contains_key(drawing_id) {
            return Err(HostError::Rejected {
                detail: format!("drawing already open: {drawing_id}"),
            });
        }
        inner.drawings.insert(drawing_id.clone(), ScriptedDrawing::new());
        Ok(())
    }

    fn enumerate_entities<'a>(
        &'a self,
        drawing_id: &DrawingId,
    ) -> Result<Box<dyn Iterator<Item = Result<HostEntity, HostError>> + 'a>, HostError> {
        let inner = self.inner.lock().expect("scripted host lock");
        if inner.offline {
            return Err(offline());
        }
        let drawing = inner
            .drawings
            .get(drawing_id)
            .ok_or_else(|| not_found(drawing_id))?;

        let entities = drawing.entities.clone();
        let fail_after = inner.fail_enumeration_after;
        drop(inner);

        let mut yielded = 0usize;
        let mut failed = false;
        let iter = entities.into_iter().map(Some).chain(std::iter::once(None)).filter_map(
            move |entity| {
                if failed {
                    return None;
                }
                if let Some(limit) = fail_after {
                    if yielded == limit {
                        failed = true;
                        return Some(Err(HostError::Unavailable {
                            detail: "automation session lost during enumeration".to_owned(),
                        }));
                    }
                }
                let entity = entity?;
                yielded += 1;
                Some(Ok(entity))
            },
        );
        Ok(Box::new(iter))
    }

    fn list_layers(&self, drawing_id: &DrawingId) -> Result<Vec<LayerInfo>, HostError> {
        let inner = self.inner.lock().expect("scripted host lock");
        if inner.offline {
            return Err(offline());
        }
        let drawing = inner
            .drawings
            .get(drawing_id)
            .ok_or_else(|| not_found(drawing_id))?;
        Ok(drawing.layers.clone())
    }

    fn submit_operation(
        &self,
        drawing_id: &DrawingId,
        op: &DrawOp,
    ) -> Result<SubmitReceipt, HostError> {
        let mut inner = self.inner.lock().expect("scripted host lock");
        if inner.offline {
            return Err(offline());
        }
        if !inner.drawings.contains_key(drawing_id) {
            return Err(not_found(drawing_id));
        }
        if let Some(limit) = inner.fail_submit_after {
            if inner.submits_done >= limit {
                return Err(HostError::Unavailable {
                    detail: "automation session lost during submission".to_owned(),
                });
            }
            inner.submits_done += 1;
        }

        match op {
            DrawOp::CreateLayer { name, color } => {
                let drawing = inner.drawings.get_mut(drawing_id).expect("drawing present");
                drawing.ensure_layer(name, *color);
                Ok(SubmitReceipt::default())
            }
            DrawOp::Line { start, end, layer } => {
                let attributes = serde_json::json!({
                    "start_point": point_json(start),
                    "end_point": point_json(end),
                });
                let handle = push_entity(&mut inner, drawing_id, "AcDbLine", layer, attributes);
                Ok(SubmitReceipt { handle: Some(handle) })
            }
            DrawOp::Circle { center, radius, layer } => {
                let attributes = serde_json::json!({
                    "center": point_json(center),
                    "radius": radius,
                });
                let handle = push_entity(&mut inner, drawing_id, "AcDbCircle", layer, attributes);
                Ok(SubmitReceipt { handle: Some(handle) })
            }
            DrawOp::Text { position, height, content, layer } => {
                let attributes = serde_json::json!({
                    "text": content,
                    "position": point_json(position),
                    "height": height,
                });
                let handle = push_entity(&mut inner, drawing_id, "AcDbText", layer, attributes);
                Ok(SubmitReceipt { handle: Some(handle) })
            }
            DrawOp::SetColor { handle, color } => {
                let drawing = inner.drawings.get_mut(drawing_id).expect("drawing present");
                let entity = drawing
                    .entities
                    .iter_mut()
                    .find(|entity| &entity.handle == handle)
                    .ok_or_else(|| HostError::Rejected {
                        detail: format!("no entity with handle {handle}"),
                    })?;
                if let serde_json::Value::Object(map) = &mut entity.attributes {
                    map.insert("color".to_owned(), serde_json::json!(color));
                }
                Ok(SubmitReceipt::default())
            }
        }
    }

    fn export_drawing(
        &self,
        drawing_id: &DrawingId,
        path: &Path,
        format: ExportFormat,
    ) -> Result<(), HostError> {
        let inner = self.inner.lock().expect("scripted host lock");
        if inner.offline {
            return Err(offline());
        }
        let drawing = inner
            .drawings
            .get(drawing_id)
            .ok_or_else(|| not_found(drawing_id))?;

        // The scripted host has no renderer; it exports the raw entity list
        // so round-trip tests can assert on what would have been written.
        let dump = serde_json::json!({
            "drawing_id": drawing_id.as_str(),
            "format": format.as_str(),
            "entities": drawing
                .entities
                .iter()
                .map(|entity| {
                    serde_json::json!({
                        "handle": entity.handle,
                        "object_name": entity.object_name,
                        "layer": entity.layer,
                        "attributes": entity.attributes,
                    })
                })
                .collect::<Vec<_>>(),
        });
        let text = serde_json::to_string_pretty(&dump).map_err(|err| HostError::Rejected {
            detail: format!("cannot serialize export: {err}"),
        })?;
        fs::write(path, text).map_err(|err| HostError::Rejected {
            detail: format!("cannot write export to {path:?}: {err}"),
        })
    }
}

fn push_entity(
    inner: &mut Inner,
    drawing_id: &DrawingId,
    object_name: &str,
    layer: &Option<String>,
    attributes: serde_json::Value,
) -> String {
    let handle = inner.allocate_handle();
    let drawing = inner.drawings.get_mut(drawing_id).expect("drawing present");
    if let Some(layer) = layer {
        drawing.ensure_layer(layer, None);
    }
    drawing.entities.push(HostEntity {
        handle: handle.clone(),
        object_name: object_name.to_owned(),
        layer: layer.clone().or_else(|| Some(DEFAULT_LAYER.to_owned())),
        attributes,
    });
    handle
}

fn point_json(point: &Point3) -> serde_json::Value {
    serde_json::json!([point.x, point.y, point.z])
}

fn offline() -> HostError {
    HostError::Unavailable {
        detail: "automation session is not connected".to_owned(),
    }
}

fn not_found(drawing_id: &DrawingId) -> HostError {
    HostError::DrawingNotFound {
        drawing_id: drawing_id.as_str().to_owned(),
    }
}

#[derive(Debug, Deserialize)]
struct Fixture {
    drawings: std::collections::BTreeMap<String, FixtureDrawing>,
}

#[derive(Debug, Deserialize)]
struct FixtureDrawing {
    #[serde(default)]
    layers: Vec<FixtureLayer>,
    #[serde(default)]
    entities: Vec<FixtureEntity>,
}

#[derive(Debug, Deserialize)]
struct FixtureLayer {
    name: String,
    #[serde(default)]
    color: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct FixtureEntity {
    #[serde(default)]
    handle: Option<String>,
    object_name: String,
    #[serde(default)]
    layer: Option<String>,
    #[serde(default)]
    attributes: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drawing() -> DrawingId {
        DrawingId::new("demo.dwg").expect("drawing id")
    }

    #[test]
    fn demo_host_enumerates_seed_entities() {
        let host = ScriptedHost::demo(&drawing());
        let entities: Vec<_> = host
            .enumerate_entities(&drawing())
            .expect("enumerate")
            .collect::<Result<_, _>>()
            .expect("no failures");
        assert_eq!(entities.len(), 5);
        assert!(entities.iter().all(|entity| !entity.handle.is_empty()));
    }

    #[test]
    fn enumeration_failure_is_injected_mid_stream() {
        let host = ScriptedHost::demo(&drawing());
        host.fail_enumeration_after(2);

        let mut iter = host.enumerate_entities(&drawing()).expect("enumerate");
        assert!(iter.next().expect("first").is_ok());
        assert!(iter.next().expect("second").is_ok());
        let third = iter.next().expect("third item");
        assert!(matches!(third, Err(HostError::Unavailable { .. })));
        assert!(iter.next().is_none());
    }

    #[test]
    fn offline_host_rejects_everything() {
        let host = ScriptedHost::demo(&drawing());
        host.set_offline(true);
        assert!(matches!(
            host.enumerate_entities(&drawing()),
            Err(HostError::Unavailable { .. })
        ));
        assert!(matches!(host.list_drawings(), Err(HostError::Unavailable { .. })));
    }

    #[test]
    fn submitted_line_becomes_enumerable() {
        let host = ScriptedHost::new();
        let id = drawing();
        host.create_drawing(&id).expect("create drawing");

        let receipt = host
            .submit_operation(
                &id,
                &DrawOp::Line {
                    start: Point3::xy(0.0, 0.0),
                    end: Point3::xy(10.0, 10.0),
                    layer: Some("WIRES".to_owned()),
                },
            )
            .expect("submit line");
        let handle = receipt.handle.expect("line handle");

        let entities: Vec<_> = host
            .enumerate_entities(&id)
            .expect("enumerate")
            .collect::<Result<_, _>>()
            .expect("no failures");
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].handle, handle);
        assert_eq!(entities[0].object_name, "AcDbLine");
        assert_eq!(entities[0].layer.as_deref(), Some("WIRES"));

        let layers = host.list_layers(&id).expect("layers");
        assert!(layers.iter().any(|layer| layer.name == "WIRES"));
    }

    #[test]
    fn unknown_drawing_is_not_found() {
        let host = ScriptedHost::new();
        let err = host.enumerate_entities(&drawing()).err().expect("error");
        assert!(matches!(err, HostError::DrawingNotFound { .. }));
    }
}
