// SPDX-License-Identifier: MIT

//! Declarative diagram templates.
//!
//! A template maps symbolic parameters (device counts, labels, layers) onto a
//! planned sequence of primitive drawing operations. Planning is pure: every
//! parameter is validated and every store lookup happens before the first
//! host call, so caller-input errors never leave stray primitives behind.
//! Submission has no rollback; a host failure at operation k of n is reported
//! as a partial failure with the exact progress, and the caller decides
//! whether to retry the remainder.

use std::collections::BTreeMap;
use std::fmt;

use tracing::info;

use crate::host::{DrawOp, DrawingHost, HostError};
use crate::model::{DrawingId, EntityKind, Point3};
use crate::store::{EntityFilter, SnapshotStore, StoreError};

pub const PMC_CONTROL: &str = "pmc_control";
pub const DEVICE_CONNECTION: &str = "device_connection";

/// Catalog entry for one built-in template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateInfo {
    pub name: &'static str,
    pub version: u32,
    pub required: &'static [&'static str],
    pub summary: &'static str,
}

pub fn available_templates() -> &'static [TemplateInfo] {
    &[
        TemplateInfo {
            name: PMC_CONTROL,
            version: 1,
            required: &["devices"],
            summary: "Grid of labeled PMC device circles on a dedicated layer, \
                      tied together by a bus line; placed below existing content.",
        },
        TemplateInfo {
            name: DEVICE_CONNECTION,
            version: 1,
            required: &["from", "to"],
            summary: "Three-segment orthogonal connection between two labeled \
                      devices located through the snapshot.",
        },
    ]
}

#[derive(Debug)]
pub enum TemplateError {
    UnknownTemplate {
        name: String,
    },
    MissingParameter {
        template: String,
        name: String,
    },
    InvalidParameter {
        template: String,
        name: String,
        detail: String,
    },
    /// A device label the template was asked to connect is not present in
    /// the snapshot.
    UnknownDevice {
        label: String,
    },
    Store(StoreError),
    /// The host failed partway through submission; `submitted` operations
    /// are already drawn and will not be rolled back.
    Partial {
        template: String,
        submitted: usize,
        total: usize,
        source: HostError,
    },
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTemplate { name } => write!(f, "unknown template: {name}"),
            Self::MissingParameter { template, name } => {
                write!(f, "template {template} is missing parameter {name}")
            }
            Self::InvalidParameter {
                template,
                name,
                detail,
            } => write!(f, "invalid parameter {name} for template {template}: {detail}"),
            Self::UnknownDevice { label } => {
                write!(f, "no device labeled {label:?} in the snapshot")
            }
            Self::Store(source) => write!(f, "template planning failed in store: {source}"),
            Self::Partial {
                template,
                submitted,
                total,
                source,
            } => write!(
                f,
                "template {template} submitted {submitted} of {total} operations before the host failed: {source}"
            ),
        }
    }
}

impl std::error::Error for TemplateError {}

impl TemplateError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTemplate { .. } => "unknown_template",
            Self::MissingParameter { .. } => "missing_parameter",
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::UnknownDevice { .. } => "unknown_device",
            Self::Store(_) => "store_unavailable",
            Self::Partial { .. } => "partial_diagram_failure",
        }
    }
}

/// Parameters as supplied by the tool call, with typed accessors that fail
/// fast before any host interaction.
#[derive(Debug, Clone, Default)]
pub struct TemplateParams {
    values: BTreeMap<String, serde_json::Value>,
}

impl TemplateParams {
    pub fn from_value(template: &str, value: serde_json::Value) -> Result<Self, TemplateError> {
        match value {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::Object(map) => Ok(Self {
                values: map.into_iter().collect(),
            }),
            other => Err(TemplateError::InvalidParameter {
                template: template.to_owned(),
                name: "parameters".to_owned(),
                detail: format!("expected an object, got {other}"),
            }),
        }
    }

    fn require<'a>(
        &'a self,
        template: &str,
        name: &str,
    ) -> Result<&'a serde_json::Value, TemplateError> {
        self.values
            .get(name)
            .ok_or_else(|| TemplateError::MissingParameter {
                template: template.to_owned(),
                name: name.to_owned(),
            })
    }

    fn require_u64(&self, template: &str, name: &str) -> Result<u64, TemplateError> {
        let value = self.require(template, name)?;
        value.as_u64().ok_or_else(|| TemplateError::InvalidParameter {
            template: template.to_owned(),
            name: name.to_owned(),
            detail: format!("expected a non-negative integer, got {value}"),
        })
    }

    fn require_str<'a>(&'a self, template: &str, name: &str) -> Result<&'a str, TemplateError> {
        let value = self.require(template, name)?;
        value.as_str().ok_or_else(|| TemplateError::InvalidParameter {
            template: template.to_owned(),
            name: name.to_owned(),
            detail: format!("expected a string, got {value}"),
        })
    }

    fn optional_str<'a>(
        &'a self,
        template: &str,
        name: &str,
    ) -> Result<Option<&'a str>, TemplateError> {
        match self.values.get(name) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => value
                .as_str()
                .map(Some)
                .ok_or_else(|| TemplateError::InvalidParameter {
                    template: template.to_owned(),
                    name: name.to_owned(),
                    detail: format!("expected a string, got {value}"),
                }),
        }
    }

    fn optional_f64(&self, template: &str, name: &str) -> Result<Option<f64>, TemplateError> {
        match self.values.get(name) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| TemplateError::InvalidParameter {
                    template: template.to_owned(),
                    name: name.to_owned(),
                    detail: format!("expected a number, got {value}"),
                }),
        }
    }

    fn optional_str_list(
        &self,
        template: &str,
        name: &str,
    ) -> Result<Option<Vec<String>>, TemplateError> {
        let Some(value) = self.values.get(name) else {
            return Ok(None);
        };
        if value.is_null() {
            return Ok(None);
        }
        let items = value
            .as_array()
            .ok_or_else(|| TemplateError::InvalidParameter {
                template: template.to_owned(),
                name: name.to_owned(),
                detail: format!("expected an array of strings, got {value}"),
            })?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| TemplateError::InvalidParameter {
                        template: template.to_owned(),
                        name: name.to_owned(),
                        detail: format!("expected a string element, got {item}"),
                    })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

/// Outcome of a fully submitted template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateReport {
    pub template: String,
    pub operations_submitted: usize,
}

/// Plans the operation sequence for a template without touching the host.
pub fn plan(
    store: &SnapshotStore,
    drawing_id: &DrawingId,
    template_name: &str,
    params: &TemplateParams,
) -> Result<Vec<DrawOp>, TemplateError> {
    match template_name {
        PMC_CONTROL => plan_pmc_control(store, drawing_id, params),
        DEVICE_CONNECTION => plan_device_connection(store, drawing_id, params),
        other => Err(TemplateError::UnknownTemplate {
            name: other.to_owned(),
        }),
    }
}

/// Plans and submits a template; see module docs for the failure contract.
pub fn generate(
    host: &dyn DrawingHost,
    store: &SnapshotStore,
    drawing_id: &DrawingId,
    template_name: &str,
    params: &TemplateParams,
) -> Result<GenerateReport, TemplateError> {
    let ops = plan(store, drawing_id, template_name, params)?;
    let total = ops.len();

    for (submitted, op) in ops.iter().enumerate() {
        host.submit_operation(drawing_id, op)
            .map_err(|source| TemplateError::Partial {
                template: template_name.to_owned(),
                submitted,
                total,
                source,
            })?;
    }

    info!("template {template_name} drew {total} operations into {drawing_id}");
    Ok(GenerateReport {
        template: template_name.to_owned(),
        operations_submitted: total,
    })
}

const PMC_DEVICE_RADIUS: f64 = 5.0;
const PMC_DEVICE_DROP: f64 = 20.0;
const PMC_LABEL_DROP: f64 = 32.0;
const PMC_LABEL_HEIGHT: f64 = 2.5;
const PMC_CLEARANCE: f64 = 20.0;
const PMC_MAX_DEVICES: u64 = 64;

fn plan_pmc_control(
    store: &SnapshotStore,
    drawing_id: &DrawingId,
    params: &TemplateParams,
) -> Result<Vec<DrawOp>, TemplateError> {
    let devices = params.require_u64(PMC_CONTROL, "devices")?;
    if devices == 0 || devices > PMC_MAX_DEVICES {
        return Err(TemplateError::InvalidParameter {
            template: PMC_CONTROL.to_owned(),
            name: "devices".to_owned(),
            detail: format!("expected 1..={PMC_MAX_DEVICES}, got {devices}"),
        });
    }

    let labels = match params.optional_str_list(PMC_CONTROL, "labels")? {
        Some(labels) => {
            if labels.len() as u64 != devices {
                return Err(TemplateError::InvalidParameter {
                    template: PMC_CONTROL.to_owned(),
                    name: "labels".to_owned(),
                    detail: format!("expected {devices} labels, got {}", labels.len()),
                });
            }
            labels
        }
        None => (1..=devices).map(|index| format!("P{index:02}")).collect(),
    };

    let layer = params
        .optional_str(PMC_CONTROL, "layer")?
        .unwrap_or("PMC_CONTROL")
        .to_owned();
    let spacing = params.optional_f64(PMC_CONTROL, "spacing")?.unwrap_or(40.0);
    if !spacing.is_finite() || spacing <= 0.0 {
        return Err(TemplateError::InvalidParameter {
            template: PMC_CONTROL.to_owned(),
            name: "spacing".to_owned(),
            detail: format!("expected a positive number, got {spacing}"),
        });
    }
    let origin_x = params.optional_f64(PMC_CONTROL, "origin_x")?.unwrap_or(0.0);
    let requested_y = params.optional_f64(PMC_CONTROL, "origin_y")?.unwrap_or(0.0);

    // Layout rule: never draw on top of existing content. The occupied
    // extent comes from the snapshot, read-only; the template itself never
    // scans.
    let bus_y = match occupied_floor(store, drawing_id)? {
        Some(min_y) => requested_y.min(min_y - PMC_CLEARANCE),
        None => requested_y,
    };

    let bus_end_x = origin_x + spacing * (devices as f64 - 1.0);
    let mut ops = Vec::with_capacity(2 + labels.len() * 3);
    ops.push(DrawOp::CreateLayer {
        name: layer.clone(),
        color: Some(3),
    });
    ops.push(DrawOp::Line {
        start: Point3::xy(origin_x, bus_y),
        end: Point3::xy(bus_end_x, bus_y),
        layer: Some(layer.clone()),
    });

    for (index, label) in labels.iter().enumerate() {
        let x = origin_x + spacing * index as f64;
        let center = Point3::xy(x, bus_y - PMC_DEVICE_DROP);
        ops.push(DrawOp::Line {
            start: Point3::xy(x, bus_y),
            end: Point3::xy(x, center.y + PMC_DEVICE_RADIUS),
            layer: Some(layer.clone()),
        });
        ops.push(DrawOp::Circle {
            center,
            radius: PMC_DEVICE_RADIUS,
            layer: Some(layer.clone()),
        });
        ops.push(DrawOp::Text {
            position: Point3::xy(x, bus_y - PMC_LABEL_DROP),
            height: PMC_LABEL_HEIGHT,
            content: label.clone(),
            layer: Some(layer.clone()),
        });
    }

    Ok(ops)
}

/// Lowest y of any active geometry in the drawing, if there is any.
fn occupied_floor(
    store: &SnapshotStore,
    drawing_id: &DrawingId,
) -> Result<Option<f64>, TemplateError> {
    let records = store
        .get_active(drawing_id, &EntityFilter::default())
        .map_err(TemplateError::Store)?;
    Ok(records
        .iter()
        .filter_map(|record| record.geometry.as_ref())
        .filter_map(|geometry| geometry.extent())
        .map(|(_, min_y, _, _)| min_y)
        .fold(None, |floor: Option<f64>, min_y| {
            Some(floor.map_or(min_y, |current| current.min(min_y)))
        }))
}

const CONNECTION_STUB: f64 = 5.0;
const CONNECTION_RISE: f64 = 10.0;

fn plan_device_connection(
    store: &SnapshotStore,
    drawing_id: &DrawingId,
    params: &TemplateParams,
) -> Result<Vec<DrawOp>, TemplateError> {
    let from_label = params.require_str(DEVICE_CONNECTION, "from")?;
    let to_label = params.require_str(DEVICE_CONNECTION, "to")?;
    let layer = params
        .optional_str(DEVICE_CONNECTION, "layer")?
        .map(str::to_owned);

    let from = locate_device(store, drawing_id, from_label)?;
    let to = locate_device(store, drawing_id, to_label)?;

    // Route off the device's left edge, over a shared vertical run: the same
    // three-segment shape the original host macros drew.
    let start_x = from.x - CONNECTION_STUB;
    let end_x = to.x - CONNECTION_STUB;
    let run_x = start_x - CONNECTION_RISE;

    let mut ops = Vec::with_capacity(4);
    if let Some(layer) = &layer {
        ops.push(DrawOp::CreateLayer {
            name: layer.clone(),
            color: None,
        });
    }
    ops.push(DrawOp::Line {
        start: Point3::xy(start_x, from.y),
        end: Point3::xy(run_x, from.y),
        layer: layer.clone(),
    });
    ops.push(DrawOp::Line {
        start: Point3::xy(run_x, from.y),
        end: Point3::xy(run_x, to.y),
        layer: layer.clone(),
    });
    ops.push(DrawOp::Line {
        start: Point3::xy(run_x, to.y),
        end: Point3::xy(end_x, to.y),
        layer,
    });
    Ok(ops)
}

/// Finds the anchor position of a labeled device: the first active text
/// record whose content equals the label exactly.
fn locate_device(
    store: &SnapshotStore,
    drawing_id: &DrawingId,
    label: &str,
) -> Result<Point3, TemplateError> {
    let records = store
        .get_active(
            drawing_id,
            &EntityFilter {
                kind: Some(EntityKind::Text),
                text_contains: Some(label.to_owned()),
                ..EntityFilter::default()
            },
        )
        .map_err(TemplateError::Store)?;

    records
        .iter()
        .filter(|record| record.text_content.as_deref() == Some(label))
        .find_map(|record| match &record.geometry {
            Some(crate::model::GeometrySummary::Text { position, .. }) => Some(*position),
            _ => None,
        })
        .ok_or_else(|| TemplateError::UnknownDevice {
            label: label.to_owned(),
        })
}
