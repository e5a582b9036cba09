//! Broadcast control core for unattended ocean-observation livestreams.
//!
//! Two state machines, one per broadcast: [`hardware::HardwareMachine`]
//! drives the physical camera/controller stack, [`broadcast::BroadcastMachine`]
//! drives the platform lifecycle. They communicate only through the
//! [`EventBus`] and persist `(state name, snapshot)` pairs on the
//! [`BroadcastConfig`] record, so the process can crash or redeploy
//! between ticks without losing its place. The [`Orchestrator`] injects a
//! single `timeEvent` per tick; everything else is reactive.

pub mod broadcast;
mod bus;
mod camera;
mod config;
mod context;
mod event;
mod forward;
pub mod hardware;
mod hooks;
mod notify;
mod orchestrator;
mod platform;
mod registry;
mod store;
#[cfg(any(test, feature = "unstable"))]
pub mod testing;
mod webhook;

pub use bus::{EventBus, Publisher, Subscriber};
pub use camera::HardwareManager;
pub use config::{BroadcastConfig, BroadcastId, BroadcastKind, Privacy};
pub use context::BroadcastContext;
pub use event::Event;
pub use forward::ForwardingService;
pub use hooks::EventHooks;
pub use notify::{NotificationKind, Notifier};
pub use orchestrator::Orchestrator;
pub use platform::{watch_url, BroadcastManager, BroadcastStatus, PlatformIds, StreamHealth};
pub use registry::{register_states, StateRegistry};
pub use store::{DeviceRecord, SensorCalibration, Store, StoreError};
pub use webhook::WebhookClient;
