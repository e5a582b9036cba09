use std::collections::HashMap;

use serde::de::DeserializeOwned;
use tracing::error;

use crate::{
    broadcast::{self, BroadcastState},
    config::BroadcastKind,
    hardware::{HardwareState, RecoveringVoltage, RestartPhase, StopPhase},
};

type HardwareCtor = fn(&serde_json::Value) -> HardwareState;
type BroadcastCtor = fn(&serde_json::Value) -> BroadcastState;

/// Process-wide mapping from persisted state name to constructor.
///
/// Populated once at startup through [`register_states`] and immutable
/// afterwards. Asking for an unregistered name is a programming error and
/// aborts: guessing a state would mean doing the wrong thing with
/// operator equipment.
#[derive(Default)]
pub struct StateRegistry {
    hardware: HashMap<&'static str, HardwareCtor>,
    broadcast: HashMap<&'static str, (BroadcastKind, BroadcastCtor)>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_hardware(&mut self, name: &'static str, ctor: HardwareCtor) {
        self.hardware.insert(name, ctor);
    }

    pub fn register_broadcast(
        &mut self,
        name: &'static str,
        kind: BroadcastKind,
        ctor: BroadcastCtor,
    ) {
        self.broadcast.insert(name, (kind, ctor));
    }

    /// Constructs the hardware state stored under `name` from its
    /// snapshot.
    pub fn hardware(&self, name: &str, data: &serde_json::Value) -> HardwareState {
        let ctor = self
            .hardware
            .get(name)
            .unwrap_or_else(|| panic!("unknown hardware state name '{name}'"));
        ctor(data)
    }

    /// Constructs the broadcast state stored under `name` from its
    /// snapshot, together with the kind the name belongs to.
    pub fn broadcast(&self, name: &str, data: &serde_json::Value) -> (BroadcastKind, BroadcastState) {
        let (kind, ctor) = self
            .broadcast
            .get(name)
            .unwrap_or_else(|| panic!("unknown broadcast state name '{name}'"));
        (*kind, ctor(data))
    }
}

/// Decodes a snapshot into the state's payload, tolerating both missing
/// data (fresh records) and fields from newer versions. A snapshot that
/// cannot be decoded at all falls back to the payload defaults so the
/// broadcast stays controllable.
fn decode<T: DeserializeOwned + Default>(name: &'static str, data: &serde_json::Value) -> T {
    if data.is_null() {
        return T::default();
    }
    match serde_json::from_value(data.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            error!(state = name, error = %e, "corrupt state snapshot, using defaults");
            T::default()
        }
    }
}

/// Installs every persistable state. Called exactly once at startup.
pub fn register_states(registry: &mut StateRegistry) {
    registry.register_hardware("hardwareOff", |_| HardwareState::Off);
    registry.register_hardware("hardwareStarting", |data| {
        HardwareState::Starting(decode("hardwareStarting", data))
    });
    registry.register_hardware("hardwareOn", |_| HardwareState::On);
    registry.register_hardware("hardwareStopping", |data| {
        HardwareState::Stopping(decode::<StopPhase>("hardwareStopping", data))
    });
    registry.register_hardware("hardwareRestarting", |data| {
        HardwareState::Restarting(decode::<RestartPhase>("hardwareRestarting", data))
    });
    registry.register_hardware("hardwareRecoveringVoltage", |data| {
        HardwareState::RecoveringVoltage(decode::<RecoveringVoltage>(
            "hardwareRecoveringVoltage",
            data,
        ))
    });
    registry.register_hardware("hardwareFailure", |_| HardwareState::Failure);

    for kind in [
        BroadcastKind::Direct,
        BroadcastKind::VidforwardPermanent,
        BroadcastKind::VidforwardSecondary,
    ] {
        register_common_broadcast_states(registry, kind);
    }
    registry.register_broadcast(
        "vidforwardPermanentSlate",
        BroadcastKind::VidforwardPermanent,
        |_| BroadcastState::Slate,
    );
    registry.register_broadcast(
        "vidforwardPermanentSlateUnhealthy",
        BroadcastKind::VidforwardPermanent,
        |_| BroadcastState::SlateUnhealthy,
    );
    registry.register_broadcast(
        "vidforwardPermanentTransitionLiveToSlate",
        BroadcastKind::VidforwardPermanent,
        |_| BroadcastState::TransitionLiveToSlate,
    );
    registry.register_broadcast(
        "vidforwardPermanentTransitionSlateToLive",
        BroadcastKind::VidforwardPermanent,
        |_| BroadcastState::TransitionSlateToLive,
    );
    registry.register_broadcast(
        "vidforwardPermanentVoltageRecoverySlate",
        BroadcastKind::VidforwardPermanent,
        |_| BroadcastState::VoltageRecoverySlate,
    );
}

fn register_common_broadcast_states(registry: &mut StateRegistry, kind: BroadcastKind) {
    registry.register_broadcast(BroadcastState::Idle.name(kind), kind, |_| BroadcastState::Idle);
    registry.register_broadcast(
        BroadcastState::Starting(Default::default()).name(kind),
        kind,
        |data| BroadcastState::Starting(decode::<broadcast::Starting>("starting", data)),
    );
    registry.register_broadcast(BroadcastState::Live.name(kind), kind, |_| BroadcastState::Live);
    registry.register_broadcast(BroadcastState::LiveUnhealthy.name(kind), kind, |_| {
        BroadcastState::LiveUnhealthy
    });
    registry.register_broadcast(BroadcastState::Failure.name(kind), kind, |_| {
        BroadcastState::Failure
    });
}
