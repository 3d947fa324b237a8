//! Events and status pushed by the glasses through the vendor bridge.
//!
//! The bridge is loose about field spelling (`containerID`, `ContainerID`,
//! `Container_ID`) and about how event types are encoded (integer, name, or
//! `{ "value": n }`), so every parser here accepts all of those forms.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsEventType {
    Click,
    ScrollTop,
    ScrollBottom,
    DoubleClick,
    ForegroundEnter,
    ForegroundExit,
    AbnormalExit,
}

impl OsEventType {
    const ALL: [OsEventType; 7] = [
        OsEventType::Click,
        OsEventType::ScrollTop,
        OsEventType::ScrollBottom,
        OsEventType::DoubleClick,
        OsEventType::ForegroundEnter,
        OsEventType::ForegroundExit,
        OsEventType::AbnormalExit,
    ];

    pub fn value(self) -> i64 {
        match self {
            OsEventType::Click => 0,
            OsEventType::ScrollTop => 1,
            OsEventType::ScrollBottom => 2,
            OsEventType::DoubleClick => 3,
            OsEventType::ForegroundEnter => 4,
            OsEventType::ForegroundExit => 5,
            OsEventType::AbnormalExit => 6,
        }
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            OsEventType::Click => "CLICK_EVENT",
            OsEventType::ScrollTop => "SCROLL_TOP_EVENT",
            OsEventType::ScrollBottom => "SCROLL_BOTTOM_EVENT",
            OsEventType::DoubleClick => "DOUBLE_CLICK_EVENT",
            OsEventType::ForegroundEnter => "FOREGROUND_ENTER_EVENT",
            OsEventType::ForegroundExit => "FOREGROUND_EXIT_EVENT",
            OsEventType::AbnormalExit => "ABNORMAL_EXIT_EVENT",
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.value() == value)
    }

    /// Matches `SCROLL_TOP_EVENT` or `SCROLL_TOP`, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|kind| {
            let full = kind.wire_name();
            let short = full.trim_end_matches("_EVENT");
            full.eq_ignore_ascii_case(name) || short.eq_ignore_ascii_case(name)
        })
    }

    pub fn from_json(raw: &Value) -> Option<Self> {
        match raw {
            Value::Number(n) => n.as_i64().and_then(Self::from_i64),
            Value::String(s) => s
                .parse::<i64>()
                .ok()
                .and_then(Self::from_i64)
                .or_else(|| Self::from_name(s)),
            Value::Object(map) => map.get("value").and_then(Self::from_json),
            _ => None,
        }
    }
}

/// Interaction reported by the glasses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    List {
        container_id: Option<u32>,
        container_name: Option<String>,
        selected_index: Option<i64>,
        selected_name: Option<String>,
        event_type: Option<OsEventType>,
    },
    Text {
        container_id: Option<u32>,
        container_name: Option<String>,
        event_type: Option<OsEventType>,
    },
    System {
        event_type: Option<OsEventType>,
    },
}

impl DeviceEvent {
    /// Parses a hub event of the shape `{ listEvent?, textEvent?, sysEvent? }`.
    ///
    /// When more than one is present the list event wins, then text.
    pub fn from_json(raw: &Value) -> Option<Self> {
        if let Some(list) = raw.get("listEvent").filter(|v| v.is_object()) {
            return Some(DeviceEvent::List {
                container_id: container_id(list),
                container_name: container_name(list),
                selected_index: lookup(
                    list,
                    &[
                        "currentSelectItemIndex",
                        "CurrentSelectItemIndex",
                        "CurrentSelect_ItemIndex",
                    ],
                )
                .and_then(as_int),
                selected_name: lookup(
                    list,
                    &[
                        "currentSelectItemName",
                        "CurrentSelectItemName",
                        "CurrentSelect_ItemName",
                    ],
                )
                .and_then(as_string),
                event_type: event_type(list),
            });
        }

        if let Some(text) = raw.get("textEvent").filter(|v| v.is_object()) {
            return Some(DeviceEvent::Text {
                container_id: container_id(text),
                container_name: container_name(text),
                event_type: event_type(text),
            });
        }

        raw.get("sysEvent")
            .filter(|v| v.is_object())
            .map(|sys| DeviceEvent::System {
                event_type: event_type(sys),
            })
    }

    pub fn event_type(&self) -> Option<OsEventType> {
        match self {
            DeviceEvent::List { event_type, .. }
            | DeviceEvent::Text { event_type, .. }
            | DeviceEvent::System { event_type } => *event_type,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectType {
    #[default]
    None,
    Connecting,
    Connected,
    Disconnected,
    ConnectionFailed,
}

impl ConnectType {
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "connecting" => ConnectType::Connecting,
            "connected" => ConnectType::Connected,
            "disconnected" => ConnectType::Disconnected,
            "connectionfailed" => ConnectType::ConnectionFailed,
            _ => ConnectType::None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    pub sn: String,
    pub connect_type: ConnectType,
    pub is_wearing: Option<bool>,
    pub battery_level: Option<i64>,
    pub is_charging: Option<bool>,
    pub is_in_case: Option<bool>,
}

impl DeviceStatus {
    pub fn from_json(raw: &Value) -> Option<Self> {
        let map = raw.as_object()?;
        Some(Self {
            sn: map
                .get("sn")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            connect_type: map
                .get("connectType")
                .and_then(Value::as_str)
                .map(ConnectType::from_name)
                .unwrap_or_default(),
            is_wearing: map.get("isWearing").and_then(Value::as_bool),
            battery_level: map.get("batteryLevel").and_then(as_int),
            is_charging: map.get("isCharging").and_then(Value::as_bool),
            is_in_case: map.get("isInCase").and_then(Value::as_bool),
        })
    }
}

fn lookup<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| raw.get(*key).filter(|value| !value.is_null()))
}

fn container_id(raw: &Value) -> Option<u32> {
    lookup(raw, &["containerID", "ContainerID", "Container_ID"])
        .and_then(as_int)
        .and_then(|id| u32::try_from(id).ok())
}

fn container_name(raw: &Value) -> Option<String> {
    lookup(raw, &["containerName", "ContainerName", "Container_Name"]).and_then(as_string)
}

fn event_type(raw: &Value) -> Option<OsEventType> {
    lookup(raw, &["eventType", "EventType", "Event_Type"]).and_then(OsEventType::from_json)
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}
