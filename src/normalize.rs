//! Reassembles the structure → device graph from a [`RawStatusDocument`].
//!
//! The status endpoint keys everything by internal id across four sections.
//! Structures list their devices as `device.<id>` references; each bare id must
//! then resolve in the `device`, `shared` and `metadata` sections. A problem
//! with one record is reported as a [`NormalizationFault`] and only that
//! record is dropped.

use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::types::{
    json_type_name, DeviceDetails, ParsedStatus, RawStatusDocument, StructureDetails,
};

/// Length of the type prefix on device references (`device.`).
pub const DEVICE_REF_PREFIX_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Structure,
    Device,
    Shared,
    Metadata,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Structure => "structure",
            Section::Device => "device",
            Section::Shared => "shared",
            Section::Metadata => "metadata",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultReason {
    MissingEntry {
        section: Section,
    },
    NotAnObject {
        section: Section,
        found: &'static str,
    },
    MissingField {
        section: Section,
        field: &'static str,
    },
    WrongType {
        section: Section,
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    MalformedReference {
        reference: String,
    },
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultReason::MissingEntry { section } => write!(f, "no {} entry", section),
            FaultReason::NotAnObject { section, found } => {
                write!(f, "{} entry is a {}, expected an object", section, found)
            }
            FaultReason::MissingField { section, field } => {
                write!(f, "{} entry has no '{}' field", section, field)
            }
            FaultReason::WrongType {
                section,
                field,
                expected,
                found,
            } => write!(
                f,
                "{} field '{}' is a {}, expected a {}",
                section, field, found, expected
            ),
            FaultReason::MalformedReference { reference } => {
                write!(f, "malformed device reference {}", reference)
            }
        }
    }
}

/// A record that was skipped while normalizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizationFault {
    pub structure_id: String,
    /// `None` when the whole structure was skipped, or the reference itself was unusable.
    pub device_id: Option<String>,
    pub reason: FaultReason,
}

impl fmt::Display for NormalizationFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.device_id {
            Some(device_id) => write!(
                f,
                "structure '{}', device '{}': {}",
                self.structure_id, device_id, self.reason
            ),
            None => write!(f, "structure '{}': {}", self.structure_id, self.reason),
        }
    }
}

/// The snapshot that could be built, plus every record that had to be skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedStatus {
    pub status: ParsedStatus,
    pub faults: Vec<NormalizationFault>,
}

impl NormalizedStatus {
    pub fn is_complete(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Strip the `device.` prefix from a structure's device reference.
pub fn device_id_from_reference(reference: &str) -> Option<&str> {
    reference
        .get(DEVICE_REF_PREFIX_LEN..)
        .filter(|id| !id.is_empty())
}

/// Build the ordered structure list from a raw status document.
///
/// Structures come out in ascending id order; each structure's devices keep
/// the order of its own reference list.
pub fn normalize(doc: &RawStatusDocument) -> NormalizedStatus {
    let mut structures = Vec::with_capacity(doc.structures.len());
    let mut faults = Vec::new();

    for (structure_id, value) in &doc.structures {
        let (mut structure, references) = match structure_details(structure_id, value) {
            Ok(parsed) => parsed,
            Err(reason) => {
                faults.push(NormalizationFault {
                    structure_id: structure_id.clone(),
                    device_id: None,
                    reason,
                });
                continue;
            }
        };

        for reference in references {
            let Some(device_id) = reference.as_str().and_then(device_id_from_reference) else {
                faults.push(NormalizationFault {
                    structure_id: structure_id.clone(),
                    device_id: None,
                    reason: FaultReason::MalformedReference {
                        reference: reference.to_string(),
                    },
                });
                continue;
            };

            match device_details(doc, device_id) {
                Ok(device) => structure.devices.push(device),
                Err(reason) => faults.push(NormalizationFault {
                    structure_id: structure_id.clone(),
                    device_id: Some(device_id.to_string()),
                    reason,
                }),
            }
        }

        structures.push(structure);
    }

    for fault in &faults {
        warn!("Skipping record in status document: {}", fault);
    }
    debug!(
        "Normalized {} structures ({} faults)",
        structures.len(),
        faults.len()
    );

    NormalizedStatus {
        status: ParsedStatus(structures),
        faults,
    }
}

fn structure_details<'a>(
    id: &str,
    value: &'a Value,
) -> Result<(StructureDetails, &'a [Value]), FaultReason> {
    let fields = Fields::of(Section::Structure, value)?;
    let structure = StructureDetails {
        id: id.to_string(),
        name: fields.string("name")?,
        timestamp: fields.timestamp("$timestamp")?,
        away: fields.boolean("away")?,
        location: fields.string("location")?,
        postal_code: fields.string("postal_code")?,
        street_address: fields.string("street_address")?,
        devices: Vec::new(),
    };
    let references = fields.array("devices")?;
    Ok((structure, references))
}

fn device_details(doc: &RawStatusDocument, id: &str) -> Result<DeviceDetails, FaultReason> {
    let device = Fields::lookup(Section::Device, &doc.devices, id)?;
    let shared = Fields::lookup(Section::Shared, &doc.shared, id)?;
    let metadata = Fields::lookup(Section::Metadata, &doc.metadata, id)?;

    Ok(DeviceDetails {
        id: id.to_string(),
        timestamp: metadata.timestamp("$timestamp")?,
        current_humidity: device.number("current_humidity")?,
        target_humidity: device.number("target_humidity")?,
        current_temperature: shared.number("current_temperature")?,
        target_temperature: shared.number("target_temperature")?,
        target_temperature_type: shared.string("target_temperature_type")?,
        target_temperature_low: shared.number("target_temperature_low")?,
        target_temperature_high: shared.number("target_temperature_high")?,
        name: shared.string("name")?,
    })
}

/// Typed, fallible access to the fields of one section entry.
struct Fields<'a> {
    section: Section,
    map: &'a Map<String, Value>,
}

impl<'a> Fields<'a> {
    fn of(section: Section, value: &'a Value) -> Result<Self, FaultReason> {
        match value {
            Value::Object(map) => Ok(Self { section, map }),
            other => Err(FaultReason::NotAnObject {
                section,
                found: json_type_name(other),
            }),
        }
    }

    fn lookup(
        section: Section,
        entries: &'a BTreeMap<String, Value>,
        id: &str,
    ) -> Result<Self, FaultReason> {
        let value = entries
            .get(id)
            .ok_or(FaultReason::MissingEntry { section })?;
        Self::of(section, value)
    }

    fn get(&self, field: &'static str) -> Result<&'a Value, FaultReason> {
        self.map.get(field).ok_or(FaultReason::MissingField {
            section: self.section,
            field,
        })
    }

    fn wrong_type(&self, field: &'static str, expected: &'static str, found: &Value) -> FaultReason {
        FaultReason::WrongType {
            section: self.section,
            field,
            expected,
            found: json_type_name(found),
        }
    }

    fn string(&self, field: &'static str) -> Result<String, FaultReason> {
        let value = self.get(field)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.wrong_type(field, "string", value))
    }

    fn number(&self, field: &'static str) -> Result<f64, FaultReason> {
        let value = self.get(field)?;
        value
            .as_f64()
            .ok_or_else(|| self.wrong_type(field, "number", value))
    }

    fn boolean(&self, field: &'static str) -> Result<bool, FaultReason> {
        let value = self.get(field)?;
        value
            .as_bool()
            .ok_or_else(|| self.wrong_type(field, "boolean", value))
    }

    // Epoch millis normally arrive as integers, but floats are accepted and truncated.
    fn timestamp(&self, field: &'static str) -> Result<i64, FaultReason> {
        let value = self.get(field)?;
        value
            .as_i64()
            .or_else(|| value.as_f64().filter(|f| f.is_finite()).map(|f| f as i64))
            .ok_or_else(|| self.wrong_type(field, "number", value))
    }

    fn array(&self, field: &'static str) -> Result<&'a [Value], FaultReason> {
        let value = self.get(field)?;
        value
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| self.wrong_type(field, "array", value))
    }
}
