use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one broadcast record.
///
/// Minted by the admin console at creation time and stable across kind
/// changes and renames; every tick, store lookup and webhook payload is
/// keyed by it. The nil id only appears on records that were never
/// saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BroadcastId(Uuid);

impl BroadcastId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Selects which broadcast state set applies and how the stream reaches
/// the platform: straight from the camera, or through the vidforward
/// proxy (permanently live with a slate fallback, or as a secondary
/// window-bound stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BroadcastKind {
    #[default]
    #[serde(rename = "direct")]
    Direct,
    #[serde(rename = "vidforwardPermanent")]
    VidforwardPermanent,
    #[serde(rename = "vidforwardSecondary")]
    VidforwardSecondary,
}

impl BroadcastKind {
    /// Prefix of every persisted state name of this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            BroadcastKind::Direct => "direct",
            BroadcastKind::VidforwardPermanent => "vidforwardPermanent",
            BroadcastKind::VidforwardSecondary => "vidforwardSecondary",
        }
    }

    /// Direct broadcasts get extra slack: the camera boots from cold.
    pub fn starting_timeout(&self) -> Duration {
        match self {
            BroadcastKind::Direct => Duration::minutes(10),
            _ => Duration::minutes(5),
        }
    }

    pub fn uses_forwarder(&self) -> bool {
        !matches!(self, BroadcastKind::Direct)
    }
}

/// Privacy applied to the platform broadcast once it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    Public,
    #[default]
    Unlisted,
    Private,
}

/// One broadcast as the admin console persists it.
///
/// Mutated by the console between ticks and by tick outcomes (the four
/// state fields persist back on every transition). Unknown fields in
/// stored records are ignored on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BroadcastConfig {
    pub id: BroadcastId,
    pub name: String,
    pub enabled: bool,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kind: BroadcastKind,
    /// MAC of the camera, as integer. 0 means unset.
    pub camera_mac: u64,
    /// MAC of the power controller. 0 means the camera is not gated by a
    /// controller and voltage checks are skipped.
    pub controller_mac: u64,
    pub required_streaming_voltage: f64,
    pub voltage_recovery_timeout_hours: f64,
    pub checking_health: bool,
    pub forwarding_host: String,
    pub post_live_privacy: Privacy,
    pub site_key: i64,
    /// Bitmask of suppressed notification kinds, see
    /// [`NotificationKind::mask_bit`](crate::NotificationKind::mask_bit).
    pub notify_suppress_rules: u64,
    pub register_open_fish: bool,
    pub openfish_capture_source: String,
    /// Scheduled chat line posted on every `chatMessageDueEvent`.
    pub chat_message: String,
    pub platform_broadcast_id: String,
    pub platform_stream_id: String,
    pub platform_chat_id: String,
    pub rtmp_key: String,
    pub in_failure: bool,
    pub hardware_state: String,
    pub hardware_state_data: serde_json::Value,
    pub broadcast_state: String,
    pub broadcast_state_data: serde_json::Value,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            id: BroadcastId::default(),
            name: String::new(),
            enabled: false,
            start: DateTime::UNIX_EPOCH,
            end: DateTime::UNIX_EPOCH,
            kind: BroadcastKind::default(),
            camera_mac: 0,
            controller_mac: 0,
            required_streaming_voltage: 0.0,
            voltage_recovery_timeout_hours: 0.0,
            checking_health: false,
            forwarding_host: String::new(),
            post_live_privacy: Privacy::default(),
            site_key: 0,
            notify_suppress_rules: 0,
            register_open_fish: false,
            openfish_capture_source: String::new(),
            chat_message: String::new(),
            platform_broadcast_id: String::new(),
            platform_stream_id: String::new(),
            platform_chat_id: String::new(),
            rtmp_key: String::new(),
            in_failure: false,
            hardware_state: String::new(),
            hardware_state_data: serde_json::Value::Null,
            broadcast_state: String::new(),
            broadcast_state_data: serde_json::Value::Null,
        }
    }
}

impl BroadcastConfig {
    pub const DEFAULT_RECOVERY_TIMEOUT_HOURS: f64 = 4.0;
    pub const DEFAULT_STREAMING_VOLTAGE: f64 = 24.5;

    pub fn in_window(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    /// Fills the zero-values the console leaves behind.
    ///
    /// Returns true if anything changed, in which case the caller persists
    /// the record before the machines see it.
    pub fn sanitize(&mut self) -> bool {
        let mut changed = false;
        if self.voltage_recovery_timeout_hours == 0.0 {
            self.voltage_recovery_timeout_hours = Self::DEFAULT_RECOVERY_TIMEOUT_HOURS;
            changed = true;
        }
        if self.required_streaming_voltage == 0.0 {
            self.required_streaming_voltage = Self::DEFAULT_STREAMING_VOLTAGE;
            changed = true;
        }
        changed
    }

    /// Store variable under which the public watch link is saved.
    pub fn link_variable(&self) -> String {
        format!("{}.broadcastLink", self.name)
    }

    #[cfg(any(test, feature = "unstable"))]
    pub fn mock(kind: BroadcastKind) -> Self {
        Self {
            id: BroadcastId::new_v4(),
            name: "mock".into(),
            enabled: true,
            kind,
            camera_mac: 0xb8_27eb_01_02_03,
            required_streaming_voltage: Self::DEFAULT_STREAMING_VOLTAGE,
            voltage_recovery_timeout_hours: Self::DEFAULT_RECOVERY_TIMEOUT_HOURS,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_fills_zero_values() {
        let mut config = BroadcastConfig::default();
        assert!(config.sanitize());
        assert_eq!(
            BroadcastConfig::DEFAULT_RECOVERY_TIMEOUT_HOURS,
            config.voltage_recovery_timeout_hours
        );
        assert_eq!(
            BroadcastConfig::DEFAULT_STREAMING_VOLTAGE,
            config.required_streaming_voltage
        );
        assert!(!config.sanitize());
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let mut config = BroadcastConfig::default();
        config.start = "2026-03-01T00:00:00Z".parse().unwrap();
        config.end = "2026-03-01T01:00:00Z".parse().unwrap();
        assert!(config.in_window(config.start));
        assert!(config.in_window(config.end));
        assert!(!config.in_window(config.end + Duration::seconds(1)));
        assert!(!config.in_window(config.start - Duration::seconds(1)));
    }

    #[test]
    fn unknown_fields_are_ignored_on_load() {
        let config: BroadcastConfig = serde_json::from_value(json!({
            "name": "fathom cam",
            "kind": "vidforwardPermanent",
            "fieldFromTheFuture": {"nested": true},
        }))
        .unwrap();
        assert_eq!("fathom cam", config.name);
        assert_eq!(BroadcastKind::VidforwardPermanent, config.kind);
    }

    #[test]
    fn kind_names_round_trip() {
        for kind in [
            BroadcastKind::Direct,
            BroadcastKind::VidforwardPermanent,
            BroadcastKind::VidforwardSecondary,
        ] {
            let as_json = serde_json::to_value(kind).unwrap();
            assert_eq!(json!(kind.prefix()), as_json);
            assert_eq!(kind, serde_json::from_value(as_json).unwrap());
        }
    }

    #[test]
    fn starting_timeout_is_longer_for_direct() {
        assert_eq!(
            Duration::minutes(10),
            BroadcastKind::Direct.starting_timeout()
        );
        assert_eq!(
            Duration::minutes(5),
            BroadcastKind::VidforwardPermanent.starting_timeout()
        );
        assert_eq!(
            Duration::minutes(5),
            BroadcastKind::VidforwardSecondary.starting_timeout()
        );
    }
}
