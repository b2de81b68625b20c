use crate::remi_api::Pointer;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

const SIMULATED_ALARM_TIMES: [&str; 5] = ["06:45", "07:00", "09:00", "20:30", "21:00"];
const DEFAULT_BRIGHTNESS: i64 = 100;

fn default_night_light() -> JsonValue {
    serde_json::json!([255, 255, 255])
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    /// Monday first, matching the vendor's recurrence vector
    pub const ALL: [Weekday; 7] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
        Self::Sunday,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
            Self::Sunday => "Sunday",
        }
    }
}

impl std::fmt::Display for Weekday {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.write_str(self.name())
    }
}

/// Where an alarm came from, which in turn decides what toggling
/// it means.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    /// A server-side `Event` record; toggling writes to the backend
    Event,
    /// An alarm embedded in the device record. The vendor API has
    /// no endpoint for these, so toggles are only acknowledged.
    DeviceEmbedded,
    /// A locally synthesized placeholder
    Simulated,
}

impl AlarmKind {
    /// Classify a bare setting id by its shape.
    /// Simulated ids also contain `_alarm_`, so they must be
    /// tested for first.
    pub fn from_setting_id(setting_id: &str) -> Self {
        if setting_id.contains("simulated_alarm") {
            Self::Simulated
        } else if setting_id.contains("_alarm_") {
            Self::DeviceEmbedded
        } else {
            Self::Event
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Alarm {
    pub id: String,
    pub name: String,
    /// "HH:MM"
    pub time: String,
    pub enabled: bool,
    pub days: Vec<Weekday>,
    /// Monday first
    pub recurrence: [bool; 7],
    /// [hour, minute]
    pub event_time: [u32; 2],
    pub cmd: i64,
    pub brightness: i64,
    pub volume: i64,
    pub length_min: i64,
    pub remi: Pointer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub face: Option<JsonValue>,
    /// Night light colour, passed through as sent by the backend
    pub lightnight: JsonValue,
    pub kind: AlarmKind,
}

impl Alarm {
    pub fn is_simulated(&self) -> bool {
        self.kind == AlarmKind::Simulated
    }

    pub fn device_id(&self) -> &str {
        &self.remi.object_id
    }
}

/// The outcome of a toggle request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ToggleAck {
    pub status: String,
    pub enabled: bool,
    pub simulated: bool,
}

impl ToggleAck {
    pub fn acknowledged(enabled: bool, simulated: bool) -> Self {
        Self {
            status: "acknowledged".to_string(),
            enabled,
            simulated,
        }
    }

    pub fn updated(enabled: bool) -> Self {
        Self {
            status: "updated".to_string(),
            enabled,
            simulated: false,
        }
    }
}

pub fn format_time(hour: u32, minute: u32) -> String {
    format!("{hour:02}:{minute:02}")
}

pub fn recurrence_to_days(recurrence: &[bool; 7]) -> Vec<Weekday> {
    recurrence
        .iter()
        .zip(Weekday::ALL)
        .filter_map(|(&on, day)| if on { Some(day) } else { None })
        .collect()
}

/// Truthiness of a loosely typed JSON value: empty strings, empty
/// containers, zero, false and null are false; anything else is true.
fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

/// Entries past Sunday are tolerated as long as they are falsy
fn decode_recurrence(raw: Option<&JsonValue>) -> anyhow::Result<[bool; 7]> {
    let mut recurrence = [false; 7];
    let bits = match raw {
        None | Some(JsonValue::Null) => return Ok(recurrence),
        Some(JsonValue::Array(bits)) => bits,
        Some(other) => anyhow::bail!("recurrence is not a list: {other}"),
    };
    for (idx, bit) in bits.iter().enumerate() {
        if !truthy(bit) {
            continue;
        }
        match recurrence.get_mut(idx) {
            Some(slot) => *slot = true,
            None => anyhow::bail!("recurrence sets day {idx}, there are only 7"),
        }
    }
    Ok(recurrence)
}

fn number_as_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        JsonValue::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as i64),
        JsonValue::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// A pass-through numeric setting. Values we cannot read as a number
/// fall back to the default rather than discarding the whole event.
fn int_field(event: &JsonMap<String, JsonValue>, key: &str, default: i64) -> i64 {
    match event.get(key) {
        None | Some(JsonValue::Null) => default,
        Some(value) => number_as_i64(value).unwrap_or_else(|| {
            log::warn!("Event field {key} is not numeric: {value}, using {default}");
            default
        }),
    }
}

fn hour_or_minute(value: &JsonValue) -> anyhow::Result<u32> {
    value
        .as_f64()
        .filter(|v| v.fract() == 0.0 && *v >= 0.0 && *v <= u32::MAX as f64)
        .map(|v| v as u32)
        .ok_or_else(|| anyhow::anyhow!("event_time entry {value} is not a whole number"))
}

fn decode_event_time(raw: Option<&JsonValue>) -> anyhow::Result<[u32; 2]> {
    match raw {
        None | Some(JsonValue::Null) => Ok([0, 0]),
        Some(JsonValue::Array(parts)) => match parts.as_slice() {
            [hour, minute, ..] => Ok([hour_or_minute(hour)?, hour_or_minute(minute)?]),
            _ => Ok([0, 0]),
        },
        Some(other) => anyhow::bail!("event_time is not a list: {other}"),
    }
}

fn try_event_to_alarm(record: &JsonValue, device_id: &str) -> anyhow::Result<Alarm> {
    let event = record
        .as_object()
        .ok_or_else(|| anyhow::anyhow!("Event record is not an object"))?;
    let id = match event.get("objectId") {
        Some(JsonValue::String(id)) if !id.is_empty() => id.to_string(),
        _ => anyhow::bail!("Event record has no objectId"),
    };

    let event_time = decode_event_time(event.get("event_time"))?;
    let time = format_time(event_time[0], event_time[1]);

    let recurrence = decode_recurrence(event.get("recurrence"))?;

    let name = match event.get("name") {
        None | Some(JsonValue::Null) => format!("Event {time}"),
        Some(JsonValue::String(name)) => name.to_string(),
        Some(other) => other.to_string(),
    };

    let lightnight = match event.get("lightnight") {
        None | Some(JsonValue::Null) => default_night_light(),
        Some(value) => value.clone(),
    };

    Ok(Alarm {
        name,
        id,
        time,
        enabled: event.get("enabled").is_some_and(truthy),
        days: recurrence_to_days(&recurrence),
        recurrence,
        event_time,
        cmd: int_field(event, "cmd", 0),
        brightness: int_field(event, "brightness", DEFAULT_BRIGHTNESS),
        volume: int_field(event, "volume", 0),
        length_min: int_field(event, "length_min", 0),
        remi: Pointer::new("Remi", device_id),
        face: event.get("face").filter(|f| !f.is_null()).cloned(),
        lightnight,
        kind: AlarmKind::Event,
    })
}

/// Convert a raw `Event` record into an Alarm.
/// Returns None (and logs why) if the record is malformed.
pub fn event_to_alarm(record: &JsonValue, device_id: &str) -> Option<Alarm> {
    match try_event_to_alarm(record, device_id) {
        Ok(alarm) => Some(alarm),
        Err(err) => {
            log::error!("Failed to convert event to alarm for {device_id}: {err:#}. {record}");
            None
        }
    }
}

/// A fixed set of placeholder alarms used when the backend has no
/// events for a device. They are never written back to the server.
pub fn simulated_alarms(device_id: &str) -> Vec<Alarm> {
    let alarms: Vec<Alarm> = SIMULATED_ALARM_TIMES
        .iter()
        .enumerate()
        .map(|(idx, time)| {
            let (hour, minute) = time.split_once(':').unwrap_or(("0", "0"));
            let event_time = [hour.parse().unwrap_or(0), minute.parse().unwrap_or(0)];
            Alarm {
                id: format!("{device_id}_simulated_alarm_{idx}"),
                name: format!("Alarm {time}"),
                time: time.to_string(),
                enabled: true,
                days: Weekday::ALL.to_vec(),
                recurrence: [true; 7],
                event_time,
                cmd: 0,
                brightness: DEFAULT_BRIGHTNESS,
                volume: 0,
                length_min: 0,
                remi: Pointer::new("Remi", device_id),
                face: None,
                lightnight: default_night_light(),
                kind: AlarmKind::Simulated,
            }
        })
        .collect();

    log::info!(
        "Created {} simulated alarms for device {device_id}",
        alarms.len()
    );
    alarms
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_event() {
        let alarm = event_to_alarm(
            &json!({
                "objectId": "ev1",
                "name": "School",
                "enabled": true,
                "event_time": [7, 5],
                "recurrence": [1, 1, 0, 1, 1, 0, 0],
                "cmd": 3,
                "brightness": 40,
                "volume": 12,
                "length_min": 30,
                "face": {"__type": "Pointer", "className": "Face", "objectId": "f1"},
                "lightnight": [10, 20, 30],
            }),
            "dev1",
        )
        .unwrap();

        assert_eq!(alarm.id, "ev1");
        assert_eq!(alarm.name, "School");
        assert_eq!(alarm.time, "07:05");
        assert!(alarm.enabled);
        k9::assert_equal!(
            alarm.days,
            vec![
                Weekday::Monday,
                Weekday::Tuesday,
                Weekday::Thursday,
                Weekday::Friday
            ]
        );
        assert_eq!(alarm.recurrence, [true, true, false, true, true, false, false]);
        assert_eq!(alarm.event_time, [7, 5]);
        assert_eq!(alarm.cmd, 3);
        assert_eq!(alarm.brightness, 40);
        assert_eq!(alarm.volume, 12);
        assert_eq!(alarm.length_min, 30);
        assert_eq!(alarm.lightnight, json!([10, 20, 30]));
        assert_eq!(alarm.remi, Pointer::new("Remi", "dev1"));
        assert_eq!(alarm.kind, AlarmKind::Event);
        assert!(!alarm.is_simulated());
    }

    #[test]
    fn defaults_for_missing_fields() {
        let alarm = event_to_alarm(&json!({"objectId": "ev2"}), "dev1").unwrap();
        assert_eq!(alarm.time, "00:00");
        assert_eq!(alarm.name, "Event 00:00");
        assert!(alarm.days.is_empty());
        assert_eq!(alarm.recurrence, [false; 7]);
        assert!(!alarm.enabled);
        assert_eq!(alarm.cmd, 0);
        assert_eq!(alarm.brightness, 100);
        assert_eq!(alarm.volume, 0);
        assert_eq!(alarm.length_min, 0);
        assert_eq!(alarm.lightnight, json!([255, 255, 255]));
        assert_eq!(alarm.face, None);
    }

    #[test]
    fn short_event_time_is_midnight() {
        let alarm = event_to_alarm(&json!({"objectId": "ev3", "event_time": [9]}), "d").unwrap();
        assert_eq!(alarm.time, "00:00");
        assert_eq!(alarm.event_time, [0, 0]);
    }

    #[test]
    fn day_count_matches_truthy_bits() {
        let vectors = [
            [0, 0, 0, 0, 0, 0, 0],
            [1, 0, 0, 0, 0, 0, 1],
            [0, 1, 0, 1, 0, 1, 0],
            [1, 1, 1, 1, 1, 1, 1],
            [0, 0, 0, 0, 0, 1, 1],
        ];
        for bits in vectors {
            let alarm =
                event_to_alarm(&json!({"objectId": "x", "recurrence": bits}), "d").unwrap();
            let expected: Vec<Weekday> = bits
                .iter()
                .zip(Weekday::ALL)
                .filter(|(b, _)| **b != 0)
                .map(|(_, d)| d)
                .collect();
            assert_eq!(alarm.days.len(), bits.iter().filter(|b| **b != 0).count());
            assert_eq!(alarm.days, expected);
        }
    }

    #[test]
    fn boolean_recurrence() {
        let alarm = event_to_alarm(
            &json!({"objectId": "x", "recurrence": [false, false, false, false, false, true, true]}),
            "d",
        )
        .unwrap();
        assert_eq!(alarm.days, vec![Weekday::Saturday, Weekday::Sunday]);
    }

    #[test]
    fn malformed_records() {
        assert!(event_to_alarm(&json!("not an object"), "d").is_none());
        assert!(event_to_alarm(&json!({"name": "no id"}), "d").is_none());
        assert!(event_to_alarm(&json!({"objectId": "x", "event_time": "7:00"}), "d").is_none());
        assert!(event_to_alarm(&json!({"objectId": "x", "event_time": [7.5, 0]}), "d").is_none());
        // an eighth day that is actually set cannot be mapped to a weekday
        assert!(event_to_alarm(&json!({"objectId": "x", "recurrence": [1, 1, 1, 1, 1, 1, 1, 1]}), "d").is_none());
    }

    #[test]
    fn string_recurrence_bits() {
        let alarm = event_to_alarm(
            &json!({"objectId": "x", "recurrence": ["1", "", "1", "", "", "", "yes"]}),
            "d",
        )
        .unwrap();
        assert_eq!(
            alarm.days,
            vec![Weekday::Monday, Weekday::Wednesday, Weekday::Sunday]
        );
    }

    #[test]
    fn trailing_unset_recurrence_bits() {
        let alarm = event_to_alarm(
            &json!({"objectId": "x", "recurrence": [1, 0, 0, 0, 0, 0, 0, 0]}),
            "d",
        )
        .unwrap();
        assert_eq!(alarm.days, vec![Weekday::Monday]);
        assert_eq!(alarm.recurrence, [true, false, false, false, false, false, false]);
    }

    #[test]
    fn float_settings() {
        let alarm = event_to_alarm(
            &json!({
                "objectId": "x",
                "event_time": [7.0, 30.0],
                "brightness": 50.0,
                "volume": "20",
                "length_min": 14.6,
                "cmd": {"unexpected": true},
            }),
            "d",
        )
        .unwrap();
        assert_eq!(alarm.time, "07:30");
        assert_eq!(alarm.brightness, 50);
        assert_eq!(alarm.volume, 20);
        assert_eq!(alarm.length_min, 15);
        assert_eq!(alarm.cmd, 0);
    }

    #[test]
    fn lightnight_passes_through() {
        let alarm = event_to_alarm(
            &json!({"objectId": "x", "lightnight": [255, 200, 100, 0]}),
            "d",
        )
        .unwrap();
        assert_eq!(alarm.lightnight, json!([255, 200, 100, 0]));
    }

    #[test]
    fn loose_enabled_and_name() {
        let alarm = event_to_alarm(
            &json!({"objectId": "x", "enabled": 1, "name": null, "face": null}),
            "d",
        )
        .unwrap();
        assert!(alarm.enabled);
        assert_eq!(alarm.name, "Event 00:00");
        assert_eq!(alarm.face, None);
    }

    #[test]
    fn simulated() {
        let alarms = simulated_alarms("dev1");
        assert_eq!(alarms.len(), 5);
        let times: Vec<&str> = alarms.iter().map(|a| a.time.as_str()).collect();
        assert_eq!(times, vec!["06:45", "07:00", "09:00", "20:30", "21:00"]);
        for (idx, alarm) in alarms.iter().enumerate() {
            assert_eq!(alarm.id, format!("dev1_simulated_alarm_{idx}"));
            assert!(alarm.enabled);
            assert!(alarm.is_simulated());
            assert_eq!(alarm.days, Weekday::ALL.to_vec());
            assert_eq!(alarm.device_id(), "dev1");
        }
        assert_eq!(alarms[3].event_time, [20, 30]);
        assert_eq!(alarms[3].name, "Alarm 20:30");
    }

    #[test]
    fn classify_setting_ids() {
        assert_eq!(
            AlarmKind::from_setting_id("dev1_simulated_alarm_0"),
            AlarmKind::Simulated
        );
        assert_eq!(
            AlarmKind::from_setting_id("dev1_alarm_3"),
            AlarmKind::DeviceEmbedded
        );
        assert_eq!(AlarmKind::from_setting_id("Xy12AbCd"), AlarmKind::Event);

        // every simulated id would also match the embedded pattern
        for alarm in simulated_alarms("dev1") {
            assert!(alarm.id.contains("_alarm_"));
            assert_eq!(AlarmKind::from_setting_id(&alarm.id), alarm.kind);
        }
    }

    #[test]
    fn time_formatting() {
        assert_eq!(format_time(6, 5), "06:05");
        assert_eq!(format_time(23, 59), "23:59");
    }
}
