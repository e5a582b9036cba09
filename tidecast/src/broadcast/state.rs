use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BroadcastKind;

/// Lifecycle of one broadcast. Which variants are reachable depends on
/// the broadcast kind: the slate states exist for the permanent kind
/// only, while direct and secondary broadcasts cycle through
/// idle/starting/live and the failure sink.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastState {
    Idle,
    Starting(Starting),
    Live,
    LiveUnhealthy,
    Slate,
    SlateUnhealthy,
    TransitionLiveToSlate,
    TransitionSlateToLive,
    VoltageRecoverySlate,
    Failure,
}

/// Platform setup in flight, waiting for the hardware to report.
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

impl BroadcastState {
    /// Persisted, kind-prefixed state name.
    pub fn name(&self, kind: BroadcastKind) -> &'static str {
        use BroadcastKind::*;
        use BroadcastState::*;
        match (kind, self) {
            (Direct, Idle) => "directIdle",
            (Direct, Starting(_)) => "directStarting",
            (Direct, Live) => "directLive",
            (Direct, LiveUnhealthy) => "directLiveUnhealthy",
            (Direct, Failure) => "directFailure",
            (VidforwardSecondary, Idle) => "vidforwardSecondaryIdle",
            (VidforwardSecondary, Starting(_)) => "vidforwardSecondaryStarting",
            (VidforwardSecondary, Live) => "vidforwardSecondaryLive",
            (VidforwardSecondary, LiveUnhealthy) => "vidforwardSecondaryLiveUnhealthy",
            (VidforwardSecondary, Failure) => "vidforwardSecondaryFailure",
            (VidforwardPermanent, Idle) => "vidforwardPermanentIdle",
            (VidforwardPermanent, Starting(_)) => "vidforwardPermanentStarting",
            (VidforwardPermanent, Live) => "vidforwardPermanentLive",
            (VidforwardPermanent, LiveUnhealthy) => "vidforwardPermanentLiveUnhealthy",
            (VidforwardPermanent, Slate) => "vidforwardPermanentSlate",
            (VidforwardPermanent, SlateUnhealthy) => "vidforwardPermanentSlateUnhealthy",
            (VidforwardPermanent, TransitionLiveToSlate) => {
                "vidforwardPermanentTransitionLiveToSlate"
            }
            (VidforwardPermanent, TransitionSlateToLive) => {
                "vidforwardPermanentTransitionSlateToLive"
            }
            (VidforwardPermanent, VoltageRecoverySlate) => {
                "vidforwardPermanentVoltageRecoverySlate"
            }
            // Constructing a slate state for a non-permanent kind is a
            // programming error, not an input error.
            (kind, state) => unreachable!("{state:?} is not defined for {kind:?} broadcasts"),
        }
    }

    /// JSON of the state's public fields, stored beside the name.
    pub fn snapshot(&self) -> serde_json::Value {
        match self {
            BroadcastState::Starting(s) => {
                serde_json::to_value(s).expect("state snapshots are serializable")
            }
            _ => serde_json::json!({}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_carry_the_kind_prefix() {
        assert_eq!("directIdle", BroadcastState::Idle.name(BroadcastKind::Direct));
        assert_eq!(
            "vidforwardSecondaryLiveUnhealthy",
            BroadcastState::LiveUnhealthy.name(BroadcastKind::VidforwardSecondary)
        );
        assert_eq!(
            "vidforwardPermanentTransitionLiveToSlate",
            BroadcastState::TransitionLiveToSlate.name(BroadcastKind::VidforwardPermanent)
        );
    }

    #[test]
    #[should_panic(expected = "not defined")]
    fn slate_states_do_not_exist_for_direct_broadcasts() {
        BroadcastState::Slate.name(BroadcastKind::Direct);
    }
}
