//! Client for the UrbanHello Rémi cloud.
//!
//! The backend is a Parse server. Collection reads are made by
//! POSTing a query body carrying `"_method": "GET"` rather than by
//! issuing a GET with query parameters; the backend expects exactly
//! that, so it is preserved as-is here.

use crate::opt_env_var;
use crate::remi_api::alarm::{event_to_alarm, simulated_alarms, Alarm, AlarmKind, ToggleAck};
use crate::remi_api::error::RemiError;
use crate::remi_api::transport::{ReqwestTransport, Transport};
use parking_lot::RwLock;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;

pub mod alarm;
pub mod error;
pub mod transport;

/// Raw temperature readings are offset by this many tenths of a degree
pub const TEMPERATURE_OFFSET: i64 = 40;
pub const FACE_LIGHT_ON: &str = "sleepyFace";
pub const FACE_LIGHT_OFF: &str = "awakeFace";

#[derive(clap::Parser, Debug)]
pub struct RemiApiArguments {
    /// The username (email address) of your Rémi account.
    /// If not passed here, it will be read from
    /// the REMI_USERNAME environment variable.
    #[arg(long, global = true)]
    pub remi_username: Option<String>,

    /// The password for your Rémi account.
    /// If not passed here, it will be read from
    /// the REMI_PASSWORD environment variable.
    #[arg(long, global = true)]
    pub remi_password: Option<String>,
}

impl RemiApiArguments {
    pub fn opt_username(&self) -> anyhow::Result<Option<String>> {
        match &self.remi_username {
            Some(u) => Ok(Some(u.to_string())),
            None => opt_env_var("REMI_USERNAME"),
        }
    }

    pub fn username(&self) -> anyhow::Result<String> {
        self.opt_username()?.ok_or_else(|| {
            anyhow::anyhow!(
                "Please specify the Rémi account username either via the \
                --remi-username parameter or by setting $REMI_USERNAME"
            )
        })
    }

    pub fn opt_password(&self) -> anyhow::Result<Option<String>> {
        match &self.remi_password {
            Some(p) => Ok(Some(p.to_string())),
            None => opt_env_var("REMI_PASSWORD"),
        }
    }

    pub fn password(&self) -> anyhow::Result<String> {
        self.opt_password()?.ok_or_else(|| {
            anyhow::anyhow!(
                "Please specify the Rémi account password either via the \
                --remi-password parameter or by setting $REMI_PASSWORD"
            )
        })
    }

    pub fn api_client(&self) -> anyhow::Result<RemiApiClient> {
        let username = self.username()?;
        let password = self.password()?;
        Ok(RemiApiClient::new(username, password))
    }

    /// Build a client and log it in
    pub async fn logged_in_client(&self) -> anyhow::Result<RemiApiClient> {
        let client = self.api_client()?;
        client.login().await?;
        Ok(client)
    }
}

/// Parse's typed foreign-key encoding
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    #[serde(rename = "__type")]
    pub kind: String,
    #[serde(rename = "className")]
    pub class_name: String,
    #[serde(rename = "objectId")]
    pub object_id: String,
}

impl Pointer {
    pub fn new<C: Into<String>, I: Into<String>>(class_name: C, object_id: I) -> Self {
        Self {
            kind: "Pointer".to_string(),
            class_name: class_name.into(),
            object_id: object_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Face {
    #[serde(rename = "objectId")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub index: Option<i64>,
}

/// The reference table of display modes, loaded once after login.
#[derive(Debug, Clone, Default)]
pub struct FaceTable {
    pub faces: Vec<Face>,
    by_name: HashMap<String, String>,
    by_id: HashMap<String, String>,
}

impl FaceTable {
    pub fn new(faces: Vec<Face>) -> Self {
        let by_name = faces
            .iter()
            .map(|f| (f.name.clone(), f.id.clone()))
            .collect();
        let by_id = faces
            .iter()
            .map(|f| (f.id.clone(), f.name.clone()))
            .collect();
        Self {
            faces,
            by_name,
            by_id,
        }
    }

    pub fn id_for_name(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(|s| s.as_str())
    }

    pub fn name_for_id(&self, id: &str) -> Option<&str> {
        self.by_id.get(id).map(|s| s.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

/// The state of a single device, normalized from `classes/Remi/{id}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RemiInfo {
    pub id: String,
    pub name: Option<String>,
    /// Raw reading plus `TEMPERATURE_OFFSET`, in tenths of a degree
    /// Celsius. Divide by 10 for presentation.
    pub temperature: i64,
    pub luminosity: i64,
    pub volume: i64,
    pub firmware_version: Option<String>,
    pub firmware_need_update: bool,
    pub face_id: Option<String>,
    pub face_name: Option<String>,
}

impl RemiInfo {
    pub fn temperature_celsius(&self) -> f64 {
        self.temperature as f64 / 10.0
    }

    /// The night light is on while the device shows the sleepy face
    pub fn is_light_on(&self) -> Option<bool> {
        self.face_name.as_deref().map(|name| name == FACE_LIGHT_ON)
    }
}

#[derive(Deserialize, Debug)]
struct LoginResponse {
    #[serde(rename = "sessionToken")]
    session_token: String,
    #[serde(default)]
    remis: Vec<String>,
}

#[derive(Deserialize, Debug)]
struct QueryResults<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Deserialize, Debug)]
struct RemiRecord {
    name: Option<String>,
    temp: Option<i64>,
    luminosity: Option<i64>,
    volume: Option<i64>,
    firmware_need_update: Option<JsonValue>,
    current_firmware_version: Option<JsonValue>,
    face: Option<JsonValue>,
}

fn decode<T: serde::de::DeserializeOwned>(what: &str, value: JsonValue) -> Result<T, RemiError> {
    serde_json::from_value(value).map_err(|err| RemiError::Json(format!("decoding {what}: {err}")))
}

/// Interpret the loosely typed firmware flag: bools, numbers and
/// numeric strings all appear in the wild.
fn flag_is_set(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|n| n != 0.0).unwrap_or(false),
        JsonValue::String(s) => !s.is_empty() && s != "0" && s != "false",
        _ => false,
    }
}

fn scalar_to_string(value: JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

struct Inner {
    username: String,
    password: String,
    transport: Arc<dyn Transport>,
    session: RwLock<Option<Session>>,
    remis: RwLock<Vec<String>>,
    faces: RwLock<FaceTable>,
}

/// A handle to the Rémi cloud. Cloning is cheap and clones share the
/// session. Concurrent `login` calls are not serialized; the caller
/// is expected to log in once.
#[derive(Clone)]
pub struct RemiApiClient {
    inner: Arc<Inner>,
}

impl RemiApiClient {
    pub fn new<U: Into<String>, P: Into<String>>(username: U, password: P) -> Self {
        Self::with_transport(username, password, Arc::new(ReqwestTransport::default()))
    }

    pub fn with_transport<U: Into<String>, P: Into<String>>(
        username: U,
        password: P,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                username: username.into(),
                password: password.into(),
                transport,
                session: RwLock::new(None),
                remis: RwLock::new(vec![]),
                faces: RwLock::new(FaceTable::default()),
            }),
        }
    }

    fn session_token(&self) -> Result<String, RemiError> {
        self.inner
            .session
            .read()
            .as_ref()
            .map(|s| s.token.clone())
            .ok_or(RemiError::NotLoggedIn)
    }

    async fn authed(
        &self,
        method: Method,
        path: &str,
        body: Option<&JsonValue>,
    ) -> Result<JsonValue, RemiError> {
        let token = self.session_token()?;
        self.inner
            .transport
            .request(method, path, Some(&token), body)
            .await
    }

    /// Query a collection using the POST + `_method: GET` convention
    async fn query(&self, class: &str, mut query: JsonValue) -> Result<Vec<JsonValue>, RemiError> {
        if let Some(obj) = query.as_object_mut() {
            obj.insert("_method".to_string(), json!("GET"));
        }
        let path = format!("classes/{class}");
        let data = self.authed(Method::POST, &path, Some(&query)).await?;
        let resp: QueryResults<JsonValue> = decode(&path, data)?;
        Ok(resp.results)
    }

    /// Authenticate and remember the session token and device list,
    /// then load the face table.
    pub async fn login(&self) -> Result<Session, RemiError> {
        let body = json!({
            "username": self.inner.username,
            "password": self.inner.password,
        });
        let data = self
            .inner
            .transport
            .request(Method::POST, "login", None, Some(&body))
            .await
            .map_err(|err| RemiError::Auth(format!("{err:#}")))?;
        let resp: LoginResponse =
            decode("login", data).map_err(|err| RemiError::Auth(format!("{err:#}")))?;

        let session = Session {
            token: resp.session_token,
        };
        self.inner.session.write().replace(session.clone());
        log::debug!("Login successful, devices available: {:?}", resp.remis);
        *self.inner.remis.write() = resp.remis;

        self.load_faces().await?;
        Ok(session)
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.inner.remis.read().clone()
    }

    pub fn faces(&self) -> FaceTable {
        self.inner.faces.read().clone()
    }

    pub async fn load_faces(&self) -> Result<FaceTable, RemiError> {
        let results = self.query("Face", json!({"order": "index"})).await?;
        let faces: Vec<Face> = decode("classes/Face", JsonValue::Array(results))?;
        let table = FaceTable::new(faces);
        if table.is_empty() {
            log::warn!("The account has no faces; night light control will not work");
        }
        log::debug!(
            "Loaded faces: {:?}",
            table.faces.iter().map(|f| &f.name).collect::<Vec<_>>()
        );
        *self.inner.faces.write() = table.clone();
        Ok(table)
    }

    pub async fn get_device_info(&self, id: &str) -> Result<RemiInfo, RemiError> {
        let path = format!("classes/Remi/{id}");
        let data = self.authed(Method::GET, &path, None).await?;
        let record: RemiRecord = decode(&path, data)?;

        let face_id = record
            .face
            .as_ref()
            .and_then(|face| face.get("objectId"))
            .and_then(|id| id.as_str())
            .map(|id| id.to_string());
        let face_name = face_id.as_deref().and_then(|face_id| {
            self.inner
                .faces
                .read()
                .name_for_id(face_id)
                .map(|name| name.to_string())
        });

        Ok(RemiInfo {
            id: id.to_string(),
            name: record.name,
            temperature: record.temp.unwrap_or(0) + TEMPERATURE_OFFSET,
            luminosity: record.luminosity.unwrap_or(0),
            volume: record.volume.unwrap_or(0),
            firmware_version: record.current_firmware_version.and_then(scalar_to_string),
            firmware_need_update: record
                .firmware_need_update
                .as_ref()
                .map(flag_is_set)
                .unwrap_or(false),
            face_id,
            face_name,
        })
    }

    async fn put_device(&self, id: &str, body: JsonValue) -> Result<JsonValue, RemiError> {
        let path = format!("classes/Remi/{id}");
        self.authed(Method::PUT, &path, Some(&body)).await
    }

    /// Values are passed through unclamped; the server decides
    /// what is acceptable.
    pub async fn set_brightness(&self, id: &str, value: i64) -> Result<JsonValue, RemiError> {
        self.put_device(id, json!({"luminosity": value})).await
    }

    pub async fn set_volume(&self, id: &str, value: i64) -> Result<JsonValue, RemiError> {
        self.put_device(id, json!({"volume": value})).await
    }

    async fn set_face(&self, id: &str, face_name: &str) -> Result<JsonValue, RemiError> {
        let face_id = self
            .inner
            .faces
            .read()
            .id_for_name(face_name)
            .map(|id| id.to_string())
            .ok_or_else(|| RemiError::Precondition(format!("{face_name} not found")))?;
        self.put_device(id, json!({"face": Pointer::new("Face", face_id)}))
            .await
    }

    pub async fn turn_on(&self, id: &str) -> Result<JsonValue, RemiError> {
        self.set_face(id, FACE_LIGHT_ON).await
    }

    pub async fn turn_off(&self, id: &str) -> Result<JsonValue, RemiError> {
        self.set_face(id, FACE_LIGHT_OFF).await
    }

    /// Fetch and convert the server-side events for a device.
    /// Malformed records are skipped.
    pub async fn fetch_events(&self, device_id: &str) -> Result<Vec<Alarm>, RemiError> {
        let results = self
            .query(
                "Event",
                json!({"where": {"remi": Pointer::new("Remi", device_id)}}),
            )
            .await?;
        log::info!("Found {} events for Remi device {device_id}", results.len());

        let alarms: Vec<Alarm> = results
            .iter()
            .filter_map(|event| event_to_alarm(event, device_id))
            .collect();
        log::info!("Converted {} events to alarms", alarms.len());
        Ok(alarms)
    }

    /// Returns the alarms for a device. This never fails: if there
    /// are no events, or they cannot be fetched, the simulated
    /// placeholders are returned instead.
    pub async fn get_bedtime_settings(&self, device_id: &str) -> Vec<Alarm> {
        match self.fetch_events(device_id).await {
            Ok(alarms) if !alarms.is_empty() => alarms,
            Ok(_) => {
                log::info!("No events found for {device_id}, using simulated alarms as fallback");
                simulated_alarms(device_id)
            }
            Err(err) => {
                log::error!("Failed to get events for {device_id}: {err:#}");
                simulated_alarms(device_id)
            }
        }
    }

    pub async fn get_all_bedtime_settings(&self) -> HashMap<String, Vec<Alarm>> {
        let mut all_settings = HashMap::new();
        for remi_id in self.device_ids() {
            log::info!("Getting bedtime settings for Remi {remi_id}");
            let settings = self.get_bedtime_settings(&remi_id).await;
            log::info!(
                "Retrieved {} settings for Remi {remi_id}",
                settings.len()
            );
            log::trace!("{settings:#?}");
            all_settings.insert(remi_id, settings);
        }
        all_settings
    }

    /// Raw alarm records from the `Alarm` collection, falling back to
    /// `Schedule` when the backend rejects the class with a 400.
    pub async fn get_alarm_settings(&self, device_id: &str) -> Result<Vec<JsonValue>, RemiError> {
        let query = json!({"where": {"remi": Pointer::new("Remi", device_id)}});
        match self.query("Alarm", query.clone()).await {
            Err(err) if err.status() == Some(400) => {
                log::debug!("Alarm class unavailable ({err:#}), trying Schedule");
                self.query("Schedule", query).await
            }
            result => result,
        }
    }

    pub async fn toggle(&self, setting_id: &str, enabled: bool) -> Result<ToggleAck, RemiError> {
        self.toggle_kind(AlarmKind::from_setting_id(setting_id), setting_id, enabled)
            .await
    }

    pub async fn toggle_alarm(&self, alarm: &Alarm, enabled: bool) -> Result<ToggleAck, RemiError> {
        self.toggle_kind(alarm.kind, &alarm.id, enabled).await
    }

    async fn toggle_kind(
        &self,
        kind: AlarmKind,
        setting_id: &str,
        enabled: bool,
    ) -> Result<ToggleAck, RemiError> {
        match kind {
            AlarmKind::Simulated => {
                log::info!(
                    "Toggle request for simulated alarm {setting_id} to {enabled} (simulated only)"
                );
                Ok(ToggleAck::acknowledged(enabled, true))
            }
            AlarmKind::DeviceEmbedded => {
                log::info!(
                    "Toggle request for device alarm {setting_id} to {enabled} (not supported by the API)"
                );
                Ok(ToggleAck::acknowledged(enabled, false))
            }
            AlarmKind::Event => {
                let path = format!("classes/Event/{setting_id}");
                self.authed(Method::PUT, &path, Some(&json!({"enabled": enabled})))
                    .await
                    .map_err(|err| RemiError::Toggle {
                        setting_id: setting_id.to_string(),
                        reason: format!("{err:#}"),
                    })?;
                log::info!("Successfully toggled event {setting_id} to {enabled}");
                Ok(ToggleAck::updated(enabled))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::remi_api::alarm::Weekday;
    use crate::remi_api::transport::mock::MockTransport;

    fn faces_response() -> JsonValue {
        json!({"results": [
            {"objectId": "f-awake", "name": "awakeFace", "index": 0},
            {"objectId": "f-sleepy", "name": "sleepyFace", "index": 1},
            {"objectId": "f-night", "name": "nightFace", "index": 2},
        ]})
    }

    fn mock() -> Arc<MockTransport> {
        let mock = Arc::new(MockTransport::new());
        mock.respond(
            Method::POST,
            "login",
            json!({"sessionToken": "r:token", "remis": ["dev1", "dev2"]}),
        );
        mock.respond(Method::POST, "classes/Face", faces_response());
        mock
    }

    async fn logged_in(mock: &Arc<MockTransport>) -> RemiApiClient {
        let client = RemiApiClient::with_transport("user", "pass", mock.clone());
        client.login().await.unwrap();
        mock.clear_requests();
        client
    }

    #[tokio::test]
    async fn login_stores_session_and_loads_faces() {
        let mock = mock();
        let client = RemiApiClient::with_transport("user", "pass", mock.clone());
        let session = client.login().await.unwrap();

        assert_eq!(session.token, "r:token");
        assert_eq!(client.device_ids(), vec!["dev1", "dev2"]);
        assert_eq!(client.faces().id_for_name("sleepyFace"), Some("f-sleepy"));
        assert_eq!(client.faces().name_for_id("f-awake"), Some("awakeFace"));

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path, "login");
        assert_eq!(requests[0].session_token, None);
        assert_eq!(
            requests[0].body,
            Some(json!({"username": "user", "password": "pass"}))
        );
        assert_eq!(requests[1].method, Method::POST);
        assert_eq!(requests[1].path, "classes/Face");
        assert_eq!(requests[1].session_token.as_deref(), Some("r:token"));
        assert_eq!(
            requests[1].body,
            Some(json!({"order": "index", "_method": "GET"}))
        );
    }

    #[tokio::test]
    async fn login_failure_is_auth_error() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_status(Method::POST, "login", 401);
        let client = RemiApiClient::with_transport("user", "bad", mock.clone());
        let err = client.login().await.unwrap_err();
        assert!(matches!(err, RemiError::Auth(_)), "{err:?}");
        assert!(client.device_ids().is_empty());
    }

    #[tokio::test]
    async fn login_without_devices() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(Method::POST, "login", json!({"sessionToken": "t"}));
        mock.respond(Method::POST, "classes/Face", json!({"results": []}));
        let client = RemiApiClient::with_transport("user", "pass", mock.clone());
        client.login().await.unwrap();
        assert!(client.device_ids().is_empty());
        assert!(client.faces().is_empty());
    }

    #[tokio::test]
    async fn face_load_failure_is_api_error() {
        let mock = Arc::new(MockTransport::new());
        mock.respond(Method::POST, "login", json!({"sessionToken": "t"}));
        mock.respond_status(Method::POST, "classes/Face", 500);
        let client = RemiApiClient::with_transport("user", "pass", mock.clone());
        let err = client.login().await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn calls_before_login_fail() {
        let mock = mock();
        let client = RemiApiClient::with_transport("user", "pass", mock.clone());
        let err = client.get_device_info("dev1").await.unwrap_err();
        assert!(matches!(err, RemiError::NotLoggedIn), "{err:?}");
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn device_info() {
        let mock = mock();
        mock.respond(
            Method::GET,
            "classes/Remi/dev1",
            json!({
                "objectId": "dev1",
                "name": "Nursery",
                "temp": 180,
                "luminosity": 55,
                "volume": 20,
                "firmware_need_update": 1,
                "current_firmware_version": "2.1.7",
                "face": {"__type": "Pointer", "className": "Face", "objectId": "f-sleepy"},
            }),
        );
        let client = logged_in(&mock).await;

        let info = client.get_device_info("dev1").await.unwrap();
        assert_eq!(info.name.as_deref(), Some("Nursery"));
        assert_eq!(info.temperature, 220);
        assert_eq!(info.temperature_celsius(), 22.0);
        assert_eq!(info.luminosity, 55);
        assert_eq!(info.volume, 20);
        assert!(info.firmware_need_update);
        assert_eq!(info.firmware_version.as_deref(), Some("2.1.7"));
        assert_eq!(info.face_id.as_deref(), Some("f-sleepy"));
        assert_eq!(info.face_name.as_deref(), Some("sleepyFace"));
        assert_eq!(info.is_light_on(), Some(true));
    }

    #[tokio::test]
    async fn device_info_defaults() {
        let mock = mock();
        mock.respond(Method::GET, "classes/Remi/dev2", json!({"objectId": "dev2"}));
        let client = logged_in(&mock).await;

        let info = client.get_device_info("dev2").await.unwrap();
        assert_eq!(info.temperature, 40);
        assert_eq!(info.luminosity, 0);
        assert_eq!(info.volume, 0);
        assert!(!info.firmware_need_update);
        assert_eq!(info.face_id, None);
        assert_eq!(info.face_name, None);
        assert_eq!(info.is_light_on(), None);
    }

    #[tokio::test]
    async fn temperature_offset_then_scale() {
        let mock = mock();
        let client = logged_in(&mock).await;
        for raw in [-40i64, 0, 1, 175, 212, 999] {
            mock.respond(Method::GET, "classes/Remi/dev1", json!({"temp": raw}));
            let info = client.get_device_info("dev1").await.unwrap();
            assert_eq!(info.temperature_celsius(), (raw + 40) as f64 / 10.0);
        }
    }

    #[tokio::test]
    async fn unknown_face_has_no_name() {
        let mock = mock();
        mock.respond(
            Method::GET,
            "classes/Remi/dev1",
            json!({"face": {"__type": "Pointer", "className": "Face", "objectId": "f-new"}}),
        );
        let client = logged_in(&mock).await;
        let info = client.get_device_info("dev1").await.unwrap();
        assert_eq!(info.face_id.as_deref(), Some("f-new"));
        assert_eq!(info.face_name, None);
    }

    #[tokio::test]
    async fn brightness_and_volume_are_not_clamped() {
        let mock = mock();
        mock.respond(Method::PUT, "classes/Remi/dev1", json!({"updatedAt": "now"}));
        let client = logged_in(&mock).await;

        client.set_brightness("dev1", 150).await.unwrap();
        client.set_volume("dev1", -3).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, Method::PUT);
        assert_eq!(requests[0].body, Some(json!({"luminosity": 150})));
        assert_eq!(requests[1].body, Some(json!({"volume": -3})));
    }

    #[tokio::test]
    async fn write_failure_propagates() {
        let mock = mock();
        mock.respond_status(Method::PUT, "classes/Remi/dev1", 403);
        let client = logged_in(&mock).await;
        let err = client.set_volume("dev1", 10).await.unwrap_err();
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn turn_on_and_off_use_faces() {
        let mock = mock();
        mock.respond(Method::PUT, "classes/Remi/dev1", json!({}));
        let client = logged_in(&mock).await;

        client.turn_on("dev1").await.unwrap();
        client.turn_off("dev1").await.unwrap();

        let requests = mock.requests();
        assert_eq!(
            requests[0].body,
            Some(json!({"face": {"__type": "Pointer", "className": "Face", "objectId": "f-sleepy"}}))
        );
        assert_eq!(
            requests[1].body,
            Some(json!({"face": {"__type": "Pointer", "className": "Face", "objectId": "f-awake"}}))
        );
    }

    #[tokio::test]
    async fn turn_on_without_faces_is_precondition_error() {
        let mock = mock();
        mock.respond(
            Method::POST,
            "classes/Face",
            json!({"results": [{"objectId": "f-awake", "name": "awakeFace", "index": 0}]}),
        );
        let client = logged_in(&mock).await;

        let err = client.turn_on("dev1").await.unwrap_err();
        assert!(matches!(err, RemiError::Precondition(_)), "{err:?}");
        assert_eq!(err.to_string(), "sleepyFace not found");
        assert!(mock.requests().is_empty());

        // awakeFace is present, so turning off is fine
        mock.respond(Method::PUT, "classes/Remi/dev1", json!({}));
        client.turn_off("dev1").await.unwrap();
    }

    #[tokio::test]
    async fn turn_off_before_faces_loaded() {
        let mock = mock();
        mock.respond(Method::POST, "classes/Face", json!({"results": []}));
        let client = logged_in(&mock).await;
        let err = client.turn_off("dev1").await.unwrap_err();
        assert_eq!(err.to_string(), "awakeFace not found");
    }

    #[tokio::test]
    async fn bedtime_settings_from_events() {
        let mock = mock();
        mock.respond(
            Method::POST,
            "classes/Event",
            json!({"results": [
                {"objectId": "ev1", "enabled": true, "event_time": [6, 30], "recurrence": [1,1,1,1,1,0,0]},
                "garbage",
                {"objectId": "ev2", "event_time": [19, 0]},
            ]}),
        );
        let client = logged_in(&mock).await;

        let alarms = client.get_bedtime_settings("dev1").await;
        assert_eq!(alarms.len(), 2);
        assert_eq!(alarms[0].id, "ev1");
        assert_eq!(alarms[0].time, "06:30");
        assert_eq!(alarms[0].days.len(), 5);
        assert_eq!(alarms[1].time, "19:00");
        assert!(alarms.iter().all(|a| a.kind == AlarmKind::Event));

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].body,
            Some(json!({
                "where": {"remi": {"__type": "Pointer", "className": "Remi", "objectId": "dev1"}},
                "_method": "GET"
            }))
        );
    }

    #[tokio::test]
    async fn zero_events_yields_simulated() {
        let mock = mock();
        mock.respond(Method::POST, "classes/Event", json!({"results": []}));
        let client = logged_in(&mock).await;

        let alarms = client.get_bedtime_settings("dev1").await;
        assert_eq!(alarms.len(), 5);
        for alarm in &alarms {
            assert!(alarm.enabled);
            assert!(alarm.is_simulated());
            assert_eq!(alarm.days, Weekday::ALL.to_vec());
        }
    }

    #[tokio::test]
    async fn only_malformed_events_yields_simulated() {
        let mock = mock();
        mock.respond(
            Method::POST,
            "classes/Event",
            json!({"results": [{"name": "no id"}, 42]}),
        );
        let client = logged_in(&mock).await;
        let alarms = client.get_bedtime_settings("dev1").await;
        assert_eq!(alarms.len(), 5);
        assert!(alarms.iter().all(|a| a.is_simulated()));
    }

    #[tokio::test]
    async fn loosely_typed_events_are_kept() {
        let mock = mock();
        mock.respond(
            Method::POST,
            "classes/Event",
            json!({"results": [{
                "objectId": "ev1",
                "event_time": [7, 0],
                "recurrence": ["1", "", "", "", "", "", "", 0],
                "brightness": 50.0,
                "lightnight": [255, 200, 100, 0],
            }]}),
        );
        let client = logged_in(&mock).await;
        let alarms = client.get_bedtime_settings("dev1").await;
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].kind, AlarmKind::Event);
        assert_eq!(alarms[0].days, vec![Weekday::Monday]);
        assert_eq!(alarms[0].brightness, 50);
    }

    #[tokio::test]
    async fn event_fetch_failure_yields_simulated() {
        let mock = mock();
        mock.respond_status(Method::POST, "classes/Event", 502);
        let client = logged_in(&mock).await;

        assert!(client.fetch_events("dev1").await.is_err());
        let alarms = client.get_bedtime_settings("dev1").await;
        assert_eq!(alarms.len(), 5);
        assert!(alarms.iter().all(|a| a.is_simulated()));
    }

    #[tokio::test]
    async fn all_bedtime_settings_covers_every_device() {
        let mock = mock();
        mock.respond(
            Method::POST,
            "classes/Event",
            json!({"results": [{"objectId": "ev1"}]}),
        );
        let client = logged_in(&mock).await;

        let all = client.get_all_bedtime_settings().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all["dev1"].len(), 1);
        assert_eq!(all["dev2"].len(), 1);
        assert_eq!(all["dev2"][0].device_id(), "dev2");
    }

    #[tokio::test]
    async fn alarm_settings_fall_back_to_schedule() {
        let mock = mock();
        mock.respond_status(Method::POST, "classes/Alarm", 400);
        mock.respond(
            Method::POST,
            "classes/Schedule",
            json!({"results": [{"objectId": "s1"}]}),
        );
        let client = logged_in(&mock).await;

        let results = client.get_alarm_settings("dev1").await.unwrap();
        assert_eq!(results, vec![json!({"objectId": "s1"})]);
        let paths: Vec<String> = mock.requests().into_iter().map(|r| r.path).collect();
        assert_eq!(paths, vec!["classes/Alarm", "classes/Schedule"]);
    }

    #[tokio::test]
    async fn alarm_settings_other_errors_propagate() {
        let mock = mock();
        mock.respond_status(Method::POST, "classes/Alarm", 500);
        let client = logged_in(&mock).await;
        let err = client.get_alarm_settings("dev1").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn toggle_simulated_makes_no_request() {
        let mock = mock();
        let client = logged_in(&mock).await;

        let ack = client.toggle("dev1_simulated_alarm_0", false).await.unwrap();
        assert_eq!(ack, ToggleAck::acknowledged(false, true));
        assert!(ack.simulated);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn toggle_device_embedded_makes_no_request() {
        let mock = mock();
        let client = logged_in(&mock).await;

        let ack = client.toggle("dev1_alarm_3", true).await.unwrap();
        assert_eq!(ack.status, "acknowledged");
        assert!(ack.enabled);
        assert!(!ack.simulated);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn toggle_event_puts_enabled() {
        let mock = mock();
        mock.respond(Method::PUT, "classes/Event/Xy12AbCd", json!({"updatedAt": "now"}));
        let client = logged_in(&mock).await;

        let ack = client.toggle("Xy12AbCd", true).await.unwrap();
        assert_eq!(ack, ToggleAck::updated(true));

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::PUT);
        assert_eq!(requests[0].path, "classes/Event/Xy12AbCd");
        assert_eq!(requests[0].body, Some(json!({"enabled": true})));
    }

    #[tokio::test]
    async fn toggle_event_failure() {
        let mock = mock();
        mock.respond_status(Method::PUT, "classes/Event/Xy12AbCd", 404);
        let client = logged_in(&mock).await;
        let err = client.toggle("Xy12AbCd", false).await.unwrap_err();
        assert!(matches!(err, RemiError::Toggle { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn toggle_alarm_uses_attached_kind() {
        let mock = mock();
        let client = logged_in(&mock).await;
        let alarm = simulated_alarms("dev1").remove(2);

        let ack = client.toggle_alarm(&alarm, false).await.unwrap();
        assert!(ack.simulated);
        assert!(mock.requests().is_empty());
    }
}
