use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of the physical camera/controller stack.
///
/// `Stopping` and `Restarting` are compound: their payload is the nested
/// phase and both names serialize into the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum HardwareState {
    Off,
    Starting(Starting),
    On,
    Stopping(StopPhase),
    Restarting(RestartPhase),
    RecoveringVoltage(RecoveringVoltage),
    Failure,
}

/// Waiting for the camera to report after power-on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Starting {
    pub entered: DateTime<Utc>,
}

impl Default for Starting {
    fn default() -> Self {
        Self {
            entered: DateTime::UNIX_EPOCH,
        }
    }
}

impl Starting {
    pub fn timeout() -> Duration {
        Duration::minutes(5)
    }
}

/// Graceful shutdown first, hard power-off second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase")]
pub enum StopPhase {
    #[serde(rename = "hardwareShuttingDown", rename_all = "camelCase")]
    ShuttingDown { entered: DateTime<Utc> },
    #[serde(rename = "hardwarePoweringOff", rename_all = "camelCase")]
    PoweringOff { entered: DateTime<Utc> },
}

impl Default for StopPhase {
    fn default() -> Self {
        StopPhase::ShuttingDown {
            entered: DateTime::UNIX_EPOCH,
        }
    }
}

impl StopPhase {
    pub fn timeout() -> Duration {
        Duration::minutes(5)
    }
}

/// Full stop, then a fresh start, without leaving the restarting state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase")]
pub enum RestartPhase {
    #[serde(rename = "hardwareStopping", rename_all = "camelCase")]
    Stopping { stop: StopPhase },
    #[serde(rename = "hardwareStarting", rename_all = "camelCase")]
    Starting { entered: DateTime<Utc> },
}

impl Default for RestartPhase {
    fn default() -> Self {
        RestartPhase::Stopping {
            stop: StopPhase::default(),
        }
    }
}

/// Camera is off while the battery charges back above the streaming
/// threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecoveringVoltage {
    pub entered: DateTime<Utc>,
    pub timeout_hours: f64,
}

impl Default for RecoveringVoltage {
    fn default() -> Self {
        Self {
            entered: DateTime::UNIX_EPOCH,
            timeout_hours: crate::BroadcastConfig::DEFAULT_RECOVERY_TIMEOUT_HOURS,
        }
    }
}

impl RecoveringVoltage {
    pub fn timeout(&self) -> Duration {
        Duration::seconds((self.timeout_hours * 3600.0) as i64)
    }
}

impl HardwareState {
    pub fn name(&self) -> &'static str {
        match self {
            HardwareState::Off => "hardwareOff",
            HardwareState::Starting(_) => "hardwareStarting",
            HardwareState::On => "hardwareOn",
            HardwareState::Stopping(_) => "hardwareStopping",
            HardwareState::Restarting(_) => "hardwareRestarting",
            HardwareState::RecoveringVoltage(_) => "hardwareRecoveringVoltage",
            HardwareState::Failure => "hardwareFailure",
        }
    }

    /// JSON of the state's public fields, stored beside the name.
    pub fn snapshot(&self) -> serde_json::Value {
        match self {
            HardwareState::Off | HardwareState::On | HardwareState::Failure => {
                serde_json::json!({})
            }
            HardwareState::Starting(s) => {
                serde_json::to_value(s).expect("state snapshots are serializable")
            }
            HardwareState::Stopping(p) => {
                serde_json::to_value(p).expect("state snapshots are serializable")
            }
            HardwareState::Restarting(p) => {
                serde_json::to_value(p).expect("state snapshots are serializable")
            }
            HardwareState::RecoveringVoltage(r) => {
                serde_json::to_value(r).expect("state snapshots are serializable")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compound_snapshots_serialize_both_names() {
        let entered: DateTime<Utc> = "2026-03-01T00:00:00Z".parse().unwrap();
        let state = HardwareState::Stopping(StopPhase::PoweringOff { entered });
        assert_eq!("hardwareStopping", state.name());
        assert_eq!(
            json!({"phase": "hardwarePoweringOff", "entered": "2026-03-01T00:00:00Z"}),
            state.snapshot()
        );

        let nested = HardwareState::Restarting(RestartPhase::Stopping {
            stop: StopPhase::ShuttingDown { entered },
        });
        assert_eq!(
            json!({
                "phase": "hardwareStopping",
                "stop": {"phase": "hardwareShuttingDown", "entered": "2026-03-01T00:00:00Z"},
            }),
            nested.snapshot()
        );
    }

    #[test]
    fn recovery_timeout_comes_from_the_snapshot() {
        let recovering = RecoveringVoltage {
            entered: DateTime::UNIX_EPOCH,
            timeout_hours: 0.5,
        };
        assert_eq!(Duration::minutes(30), recovering.timeout());
    }
}
