use chrono::{DateTime, Local, TimeZone};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Account credentials, held for the lifetime of the process.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Form body for `POST /user/login`.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

impl<'a> From<&'a Credentials> for LoginRequest<'a> {
    fn from(credentials: &'a Credentials) -> Self {
        Self {
            username: &credentials.username,
            password: &credentials.password,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub userid: String,
    #[serde(default)]
    pub urls: HashMap<String, Value>,
}

impl LoginResponse {
    pub fn transport_url(&self) -> Option<&str> {
        self.urls.get("transport_url").and_then(Value::as_str)
    }
}

/// The authenticated context obtained from a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionHandle {
    pub access_token: String,
    pub user_id: String,
    pub transport_url: String,
}

/// The four independently keyed sections of a status response.
///
/// Each section maps an internal structure or device id to its loosely typed
/// JSON object. Sections that are absent or are not JSON objects are left
/// empty; field-level validation happens during normalization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct RawStatusDocument {
    pub structures: BTreeMap<String, Value>,
    pub devices: BTreeMap<String, Value>,
    pub shared: BTreeMap<String, Value>,
    pub metadata: BTreeMap<String, Value>,
}

impl RawStatusDocument {
    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
            && self.devices.is_empty()
            && self.shared.is_empty()
            && self.metadata.is_empty()
    }
}

impl From<Value> for RawStatusDocument {
    fn from(value: Value) -> Self {
        let Value::Object(mut root) = value else {
            warn!("Status document is not a JSON object, treating it as empty");
            return Self::default();
        };

        Self {
            structures: take_section(&mut root, &["structure", "structures"]),
            devices: take_section(&mut root, &["device", "devices"]),
            shared: take_section(&mut root, &["shared"]),
            metadata: take_section(&mut root, &["metadata"]),
        }
    }
}

fn take_section(
    root: &mut serde_json::Map<String, Value>,
    names: &[&str],
) -> BTreeMap<String, Value> {
    for name in names {
        match root.remove(*name) {
            Some(Value::Object(entries)) => return entries.into_iter().collect(),
            Some(other) => {
                warn!(
                    "Status section '{}' is not an object (found {}), ignoring it",
                    name,
                    json_type_name(&other)
                );
            }
            None => continue,
        }
    }
    debug!("No usable '{}' section in status document", names[0]);
    BTreeMap::new()
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A single thermostat, assembled from the `device`, `shared` and `metadata` sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceDetails {
    pub id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub current_humidity: f64,
    pub target_humidity: f64,
    pub current_temperature: f64,
    pub target_temperature: f64,
    pub target_temperature_type: String,
    pub target_temperature_low: f64,
    pub target_temperature_high: f64,
    pub name: String,
}

impl DeviceDetails {
    pub fn time_in<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        tz.timestamp_millis_opt(self.timestamp).single()
    }

    pub fn local_time(&self) -> Option<DateTime<Local>> {
        self.time_in(&Local)
    }
}

/// A physical site and the devices it groups, in the site's own device order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructureDetails {
    pub id: String,
    pub name: String,
    pub timestamp: i64,
    pub away: bool,
    pub location: String,
    pub postal_code: String,
    pub street_address: String,
    pub devices: Vec<DeviceDetails>,
}

/// The result of one poll, ordered by structure id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParsedStatus(pub Vec<StructureDetails>);

impl ParsedStatus {
    pub fn structures(&self) -> &[StructureDetails] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn device_count(&self) -> usize {
        self.0.iter().map(|s| s.devices.len()).sum()
    }

    /// Render the snapshot with device times shown in `tz`.
    pub fn render_in<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let mut out = String::new();
        for structure in &self.0 {
            out.push_str(&structure.name);
            out.push('\n');
            for device in &structure.devices {
                let time = device
                    .time_in(tz)
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S %z").to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                out.push_str(&format!("\tDevice: {}\n", device.name));
                out.push_str(&format!("\t\tTime: {}\n", time));
                out.push_str(&format!(
                    "\t\tCurrTemp: {:2.1}\n",
                    device.current_temperature
                ));
                out.push_str(&format!(
                    "\t\tCurrHumidity: {:2.1}\n\n",
                    device.current_humidity
                ));
            }
        }
        out
    }
}

impl fmt::Display for ParsedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_in(&Local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn thermostat() -> DeviceDetails {
        DeviceDetails {
            id: "d1".to_string(),
            timestamp: 999,
            current_humidity: 40.0,
            target_humidity: 45.0,
            current_temperature: 21.5,
            target_temperature: 22.0,
            target_temperature_type: "heat".to_string(),
            target_temperature_low: 20.0,
            target_temperature_high: 23.0,
            name: "Thermo".to_string(),
        }
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials::new("me@example.com", "hunter2");
        let debug = format!("{:?}", credentials);
        assert!(debug.contains("me@example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_login_response_parsing() {
        let json = r#"{"access_token":"tok123","userid":"u1","urls":{"transport_url":"https://example","weather_url":"https://weather"}}"#;
        let response: LoginResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.access_token, "tok123");
        assert_eq!(response.userid, "u1");
        assert_eq!(response.transport_url(), Some("https://example"));
    }

    #[test]
    fn test_login_response_missing_fields_default_to_empty() {
        let response: LoginResponse = serde_json::from_str(r#"{"userid":"u1"}"#).unwrap();
        assert_eq!(response.access_token, "");
        assert_eq!(response.transport_url(), None);
    }

    #[test]
    fn test_raw_document_reads_singular_and_plural_sections() {
        let singular = RawStatusDocument::from(json!({
            "structure": {"s1": {}},
            "device": {"d1": {}},
            "shared": {"d1": {}},
            "metadata": {"d1": {}}
        }));
        assert_eq!(singular.structures.len(), 1);
        assert_eq!(singular.devices.len(), 1);

        let plural = RawStatusDocument::from(json!({
            "structures": {"s1": {}},
            "devices": {"d1": {}}
        }));
        assert_eq!(plural.structures.len(), 1);
        assert_eq!(plural.devices.len(), 1);
        assert!(plural.shared.is_empty());
    }

    #[test]
    fn test_raw_document_tolerates_wrong_shapes() {
        let doc = RawStatusDocument::from(json!({"structure": [1, 2], "shared": {"d1": {}}}));
        assert!(doc.structures.is_empty());
        assert_eq!(doc.shared.len(), 1);

        let fallback = RawStatusDocument::from(json!({
            "structure": "not-an-object",
            "structures": {"s1": {}},
            "device": null,
            "devices": {"d1": {}, "d2": {}}
        }));
        assert_eq!(fallback.structures.len(), 1);
        assert_eq!(fallback.devices.len(), 2);

        assert!(RawStatusDocument::from(json!("nope")).is_empty());
        let parsed: RawStatusDocument = serde_json::from_str("null").unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_render_matches_poll_output() {
        let status = ParsedStatus(vec![StructureDetails {
            id: "s1".to_string(),
            name: "Home".to_string(),
            timestamp: 1000,
            away: false,
            location: "loc".to_string(),
            postal_code: "00000".to_string(),
            street_address: "addr".to_string(),
            devices: vec![thermostat()],
        }]);

        let rendered = status.render_in(&Utc);
        assert_eq!(
            rendered,
            "Home\n\tDevice: Thermo\n\t\tTime: 1970-01-01 00:00:00 +0000\n\t\tCurrTemp: 21.5\n\t\tCurrHumidity: 40.0\n\n"
        );
        assert_eq!(status.device_count(), 1);
    }

    #[test]
    fn test_device_time_conversion() {
        let mut device = thermostat();
        device.timestamp = 1_700_000_000_123;
        let time = device.time_in(&Utc).unwrap();
        assert_eq!(time.timestamp(), 1_700_000_000);
        assert_eq!(time.timestamp_subsec_millis(), 123);
    }
}
