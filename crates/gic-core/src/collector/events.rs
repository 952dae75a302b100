//! Event relay envelope and payload parsing (§4.E).

use serde::Deserialize;

use crate::geometry::Point3D;

/// The outer envelope every relay frame carries, after zlib decompression.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(rename = "$schemaRef")]
    #[serde(default)]
    pub schema_ref: Option<String>,
    #[serde(default)]
    pub header: Option<EnvelopeHeader>,
    pub message: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct EnvelopeHeader {
    #[serde(rename = "gatewayTimestamp", default)]
    pub gateway_timestamp: Option<String>,
    #[serde(rename = "softwareName", default)]
    pub software_name: Option<String>,
    #[serde(rename = "softwareVersion", default)]
    pub software_version: Option<String>,
    #[serde(rename = "uploaderID", default)]
    pub uploader_id: Option<String>,
}

/// A parsed `FSDJump` event.
#[derive(Debug, Clone)]
pub struct FsdJumpEvent {
    pub star_system: String,
    pub coords: Point3D,
    pub timestamp_unix: i64,
}

/// A parsed `Docked` event.
#[derive(Debug, Clone)]
pub struct DockedEvent {
    pub star_system: String,
    pub coords: Point3D,
    pub station_name: String,
    pub timestamp_unix: i64,
}

#[derive(Debug, Deserialize)]
struct RawFsdJump {
    #[serde(rename = "StarSystem")]
    star_system: String,
    #[serde(rename = "StarPos")]
    star_pos: Vec<f64>,
    timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
struct RawDocked {
    #[serde(rename = "StarSystem")]
    star_system: String,
    #[serde(rename = "StarPos")]
    star_pos: Vec<f64>,
    #[serde(rename = "StationName")]
    station_name: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

/// What a successfully-decoded message resolved to.
pub enum DispatchedEvent {
    FsdJump(FsdJumpEvent),
    Docked(DockedEvent),
    /// A recognized-but-uninteresting event, or one dropped due to a bad payload.
    Ignored,
}

/// Decodes `message.event` and, for `FSDJump`/`Docked`, the relevant fields.
///
/// A `StarPos` that isn't exactly 3 elements is dropped with a warning rather
/// than treated as a parse error, matching §4.E's explicit handling for
/// `FSDJump` (and, per the Open Question resolution in SPEC_FULL.md,
/// uniformly for `Docked` as well).
pub fn dispatch(message: &serde_json::Value) -> DispatchedEvent {
    let event = match message.get("event").and_then(|v| v.as_str()) {
        Some(e) => e,
        None => return DispatchedEvent::Ignored,
    };

    match event {
        "FSDJump" => match serde_json::from_value::<RawFsdJump>(message.clone()) {
            Ok(raw) if raw.star_pos.len() == 3 => DispatchedEvent::FsdJump(FsdJumpEvent {
                star_system: raw.star_system,
                coords: Point3D::new(raw.star_pos[0], raw.star_pos[1], raw.star_pos[2]),
                timestamp_unix: raw.timestamp.timestamp(),
            }),
            Ok(raw) => {
                tracing::warn!(
                    "dropping FSDJump for {} with malformed StarPos (len {})",
                    raw.star_system,
                    raw.star_pos.len()
                );
                DispatchedEvent::Ignored
            }
            Err(e) => {
                tracing::warn!("dropping malformed FSDJump event: {e}");
                DispatchedEvent::Ignored
            }
        },
        "Docked" => match serde_json::from_value::<RawDocked>(message.clone()) {
            Ok(raw) if raw.star_pos.len() == 3 => DispatchedEvent::Docked(DockedEvent {
                star_system: raw.star_system,
                coords: Point3D::new(raw.star_pos[0], raw.star_pos[1], raw.star_pos[2]),
                station_name: raw.station_name,
                timestamp_unix: raw.timestamp.timestamp(),
            }),
            Ok(raw) => {
                tracing::warn!(
                    "dropping Docked for {} with malformed StarPos (len {})",
                    raw.star_system,
                    raw.star_pos.len()
                );
                DispatchedEvent::Ignored
            }
            Err(e) => {
                tracing::warn!("dropping malformed Docked event: {e}");
                DispatchedEvent::Ignored
            }
        },
        _ => DispatchedEvent::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fsd_jump() {
        let msg = json!({
            "event": "FSDJump",
            "StarSystem": "Sol",
            "StarPos": [0.0, 0.0, 0.0],
            "timestamp": "2024-01-01T00:00:00Z",
        });
        match dispatch(&msg) {
            DispatchedEvent::FsdJump(ev) => {
                assert_eq!(ev.star_system, "Sol");
                assert_eq!(ev.coords, Point3D::new(0.0, 0.0, 0.0));
            }
            _ => panic!("expected FsdJump"),
        }
    }

    #[test]
    fn drops_fsd_jump_with_bad_star_pos() {
        let msg = json!({
            "event": "FSDJump",
            "StarSystem": "Sol",
            "StarPos": [0.0, 0.0],
            "timestamp": "2024-01-01T00:00:00Z",
        });
        assert!(matches!(dispatch(&msg), DispatchedEvent::Ignored));
    }

    #[test]
    fn parses_docked() {
        let msg = json!({
            "event": "Docked",
            "StarSystem": "Sol",
            "StarPos": [0.0, 0.0, 0.0],
            "StationName": "Daedalus",
            "timestamp": "2024-01-01T00:00:00Z",
        });
        match dispatch(&msg) {
            DispatchedEvent::Docked(ev) => assert_eq!(ev.station_name, "Daedalus"),
            _ => panic!("expected Docked"),
        }
    }

    #[test]
    fn unknown_event_is_ignored() {
        let msg = json!({"event": "ReceiveText"});
        assert!(matches!(dispatch(&msg), DispatchedEvent::Ignored));
    }
}
