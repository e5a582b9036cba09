use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::{
    bus::Subscriber,
    config::BroadcastConfig,
    context::BroadcastContext,
    event::Event,
    notify::NotificationKind,
    registry::StateRegistry,
};

mod state;

pub use state::{HardwareState, RecoveringVoltage, RestartPhase, Starting, StopPhase};

/// Drives the physical camera/controller stack.
///
/// Reacts to requests from the broadcast machine and to its own published
/// progress events; the only external inputs are the tick and the
/// telemetry read through the hardware manager. Transitions persist the
/// `(name, snapshot)` pair before any side effect touches hardware.
pub struct HardwareMachine {
    state: HardwareState,
}

#[async_trait]
impl Subscriber for HardwareMachine {
    async fn handle(&mut self, event: &Event, ctx: &BroadcastContext) -> anyhow::Result<()> {
        self.dispatch(event, ctx).await
    }
}

impl HardwareMachine {
    pub fn new(state: HardwareState) -> Self {
        Self { state }
    }

    /// Reconstructs the machine from the persisted pair, defaulting to
    /// `hardwareOff` for records that never ticked.
    pub fn restore(registry: &StateRegistry, config: &BroadcastConfig) -> Self {
        if config.hardware_state.is_empty() {
            return Self::new(HardwareState::Off);
        }
        Self::new(registry.hardware(&config.hardware_state, &config.hardware_state_data))
    }

    pub fn state(&self) -> &HardwareState {
        &self.state
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    async fn dispatch(&mut self, event: &Event, ctx: &BroadcastContext) -> anyhow::Result<()> {
        match event {
            Event::Time(t) => return self.on_time(*t, ctx).await,
            Event::HardwareStartRequest => match self.state {
                HardwareState::Off => {
                    return self.transition(starting(ctx.now), ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::HardwareResetRequest => match self.state {
                HardwareState::Off => {
                    return self.transition(starting(ctx.now), ctx).await;
                }
                HardwareState::On => {
                    return self
                        .transition(HardwareState::Restarting(shutting_down_restart(ctx.now)), ctx)
                        .await;
                }
                HardwareState::Failure => {
                    info!("operator reset, clearing hardware failure");
                    return self.transition(HardwareState::Off, ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::HardwareStopRequest => match self.state {
                HardwareState::Starting(_) | HardwareState::On => {
                    return self
                        .transition(HardwareState::Stopping(shutting_down(ctx.now)), ctx)
                        .await;
                }
                _ => self.ignore(event),
            },
            Event::HardwareStarted => match self.state {
                HardwareState::Starting(_)
                | HardwareState::Restarting(RestartPhase::Starting { .. }) => {
                    return self.transition(HardwareState::On, ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::HardwareStopped => match self.state {
                HardwareState::On | HardwareState::Stopping(_) => {
                    return self.transition(HardwareState::Off, ctx).await;
                }
                HardwareState::Restarting(RestartPhase::Stopping { .. }) => {
                    return self
                        .transition(
                            HardwareState::Restarting(RestartPhase::Starting { entered: ctx.now }),
                            ctx,
                        )
                        .await;
                }
                _ => self.ignore(event),
            },
            Event::HardwareShutdown | Event::HardwareShutdownFailed => match self.state {
                HardwareState::Stopping(StopPhase::ShuttingDown { .. }) => {
                    return self
                        .transition(HardwareState::Stopping(powering_off(ctx.now)), ctx)
                        .await;
                }
                HardwareState::Restarting(RestartPhase::Stopping {
                    stop: StopPhase::ShuttingDown { .. },
                }) => {
                    return self
                        .transition(
                            HardwareState::Restarting(RestartPhase::Stopping {
                                stop: powering_off(ctx.now),
                            }),
                            ctx,
                        )
                        .await;
                }
                _ => self.ignore(event),
            },
            Event::HardwarePowerOffFailed => match self.state {
                HardwareState::Stopping(_) => {
                    ctx.notify(NotificationKind::BroadcastHardware, "camera failed to power off")
                        .await;
                    return self.transition(HardwareState::Failure, ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::HardwareStartFailed => match self.state {
                HardwareState::Starting(_)
                | HardwareState::RecoveringVoltage(_)
                | HardwareState::Restarting(_) => {
                    return self.transition(HardwareState::Off, ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::HardwareStopFailed => match self.state {
                HardwareState::Restarting(_) => {
                    ctx.notify(NotificationKind::BroadcastHardware, "camera failed to stop")
                        .await;
                    return self.transition(HardwareState::Failure, ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::LowVoltage => match self.state {
                HardwareState::Starting(_) | HardwareState::Restarting(_) => {
                    let config = ctx.config();
                    return self
                        .transition(
                            HardwareState::RecoveringVoltage(RecoveringVoltage {
                                entered: ctx.now,
                                timeout_hours: config.voltage_recovery_timeout_hours,
                            }),
                            ctx,
                        )
                        .await;
                }
                HardwareState::On => {
                    return self
                        .transition(HardwareState::Stopping(shutting_down(ctx.now)), ctx)
                        .await;
                }
                _ => self.ignore(event),
            },
            Event::VoltageRecovered => match self.state {
                HardwareState::RecoveringVoltage(_) => {
                    return self.transition(starting(ctx.now), ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::ControllerFailure => match self.state {
                HardwareState::Starting(_) | HardwareState::Restarting(_) => {
                    return self.transition(HardwareState::Failure, ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::InvalidConfiguration => match self.state {
                HardwareState::Off | HardwareState::Failure => self.ignore(event),
                // The configuration is unusable; park the hardware.
                _ => return self.transition(HardwareState::Off, ctx).await,
            },
            _ => self.ignore(event),
        }
        Ok(())
    }

    async fn on_time(&mut self, t: DateTime<Utc>, ctx: &BroadcastContext) -> anyhow::Result<()> {
        let config = ctx.config();
        match self.state.clone() {
            HardwareState::Starting(s) => {
                if t - s.entered > Starting::timeout() {
                    warn!("hardware start timed out");
                    ctx.publisher.publish(Event::HardwareStartFailed);
                } else {
                    self.check_reporting(Event::HardwareStarted, true, &config, ctx)
                        .await;
                }
            }
            HardwareState::Stopping(phase) => self.on_time_stop(t, &phase, &config, ctx).await,
            HardwareState::Restarting(RestartPhase::Stopping { stop }) => {
                self.on_time_restart_stop(t, &stop, &config, ctx).await
            }
            HardwareState::Restarting(RestartPhase::Starting { entered }) => {
                if t - entered > Starting::timeout() {
                    warn!("hardware restart timed out while starting");
                    ctx.publisher.publish(Event::HardwareStartFailed);
                } else {
                    self.check_reporting(Event::HardwareStarted, true, &config, ctx)
                        .await;
                }
            }
            HardwareState::RecoveringVoltage(r) => {
                let voltage = match ctx.hardware.voltage(config.controller_mac).await {
                    Ok(v) => v,
                    Err(e) => {
                        ctx.notify(
                            NotificationKind::BroadcastConfiguration,
                            &format!("cannot read battery voltage: {e}"),
                        )
                        .await;
                        ctx.publisher.publish(Event::InvalidConfiguration);
                        return Ok(());
                    }
                };
                if voltage >= config.required_streaming_voltage {
                    info!(voltage, "battery recovered");
                    ctx.publisher.publish(Event::VoltageRecovered);
                } else if t - r.entered > r.timeout() {
                    warn!(voltage, "battery did not recover in time");
                    ctx.notify(
                        NotificationKind::BroadcastHardware,
                        "battery failed to recover above streaming voltage",
                    )
                    .await;
                    ctx.publisher.publish(Event::HardwareStartFailed);
                }
            }
            HardwareState::Off | HardwareState::On | HardwareState::Failure => {}
        }
        Ok(())
    }

    async fn on_time_stop(
        &mut self,
        t: DateTime<Utc>,
        phase: &StopPhase,
        config: &BroadcastConfig,
        ctx: &BroadcastContext,
    ) {
        match phase {
            StopPhase::ShuttingDown { entered } => {
                if t - *entered > StopPhase::timeout() {
                    warn!("camera shutdown timed out, powering off anyway");
                    ctx.publisher.publish(Event::HardwareShutdownFailed);
                } else {
                    self.check_reporting(Event::HardwareShutdown, false, config, ctx)
                        .await;
                }
            }
            StopPhase::PoweringOff { entered } => {
                if t - *entered > StopPhase::timeout() {
                    warn!("camera power off timed out");
                    ctx.publisher.publish(Event::HardwarePowerOffFailed);
                } else {
                    self.check_reporting(Event::HardwareStopped, false, config, ctx)
                        .await;
                }
            }
        }
    }

    // Same shape as `on_time_stop`, but a failed power-off inside a
    // restart surfaces as a stop failure (terminal).
    async fn on_time_restart_stop(
        &mut self,
        t: DateTime<Utc>,
        phase: &StopPhase,
        config: &BroadcastConfig,
        ctx: &BroadcastContext,
    ) {
        match phase {
            StopPhase::ShuttingDown { entered } => {
                if t - *entered > StopPhase::timeout() {
                    warn!("camera shutdown timed out during restart");
                    ctx.publisher.publish(Event::HardwareShutdownFailed);
                } else {
                    self.check_reporting(Event::HardwareShutdown, false, config, ctx)
                        .await;
                }
            }
            StopPhase::PoweringOff { entered } => {
                if t - *entered > StopPhase::timeout() {
                    warn!("camera power off timed out during restart");
                    ctx.publisher.publish(Event::HardwareStopFailed);
                } else {
                    self.check_reporting(Event::HardwareStopped, false, config, ctx)
                        .await;
                }
            }
        }
    }

    /// Publishes `event` when the camera's liveness matches `expected`;
    /// read errors surface as an invalid configuration.
    async fn check_reporting(
        &self,
        event: Event,
        expected: bool,
        config: &BroadcastConfig,
        ctx: &BroadcastContext,
    ) {
        if let Err(e) = ctx
            .hardware
            .publish_event_if_status(&ctx.publisher, event, expected, config.camera_mac)
            .await
        {
            ctx.notify(
                NotificationKind::BroadcastConfiguration,
                &format!("cannot read camera status: {e}"),
            )
            .await;
            ctx.publisher.publish(Event::InvalidConfiguration);
        }
    }

    async fn transition(
        &mut self,
        next: HardwareState,
        ctx: &BroadcastContext,
    ) -> anyhow::Result<()> {
        debug!(from = self.state.name(), to = next.name(), "hardware transition");
        ctx.persist_states(Some((next.name(), next.snapshot())), None)
            .await?;
        self.exit();
        self.state = next;
        self.enter(ctx).await;
        Ok(())
    }

    fn exit(&self) {
        trace!(state = self.state.name(), "exit");
    }

    async fn enter(&mut self, ctx: &BroadcastContext) {
        trace!(state = self.state.name(), "enter");
        let config = ctx.config();
        match &self.state {
            HardwareState::Starting(_)
            | HardwareState::Restarting(RestartPhase::Starting { .. }) => {
                self.enter_starting(&config, ctx).await
            }
            HardwareState::Stopping(StopPhase::ShuttingDown { .. })
            | HardwareState::Restarting(RestartPhase::Stopping {
                stop: StopPhase::ShuttingDown { .. },
            }) => {
                if let Err(e) = ctx.hardware.shutdown(&config).await {
                    warn!(error = %e, "camera shutdown request failed, retrying via timeout");
                }
            }
            HardwareState::Stopping(StopPhase::PoweringOff { .. })
            | HardwareState::Restarting(RestartPhase::Stopping {
                stop: StopPhase::PoweringOff { .. },
            }) => {
                if let Err(e) = ctx.hardware.stop(&config).await {
                    warn!(error = %e, "camera power off request failed, retrying via timeout");
                }
            }
            _ => {}
        }
    }

    /// Entry checks before powering the camera: configuration, battery
    /// voltage against the alarm and streaming thresholds, and controller
    /// liveness.
    async fn enter_starting(&self, config: &BroadcastConfig, ctx: &BroadcastContext) {
        if config.camera_mac == 0 {
            ctx.notify(NotificationKind::BroadcastConfiguration, "camera mac is empty")
                .await;
            ctx.publisher.publish(Event::InvalidConfiguration);
            return;
        }
        if config.controller_mac == 0 {
            // No controller gating power; start directly.
            if let Err(e) = ctx.hardware.start(config).await {
                warn!(error = %e, "camera start failed, retrying next tick");
            }
            return;
        }
        let voltage = match ctx.hardware.voltage(config.controller_mac).await {
            Ok(v) => v,
            Err(e) => {
                ctx.notify(
                    NotificationKind::BroadcastConfiguration,
                    &format!("cannot read battery voltage: {e}"),
                )
                .await;
                ctx.publisher.publish(Event::InvalidConfiguration);
                return;
            }
        };
        let alarm = match ctx.hardware.alarm_voltage(config.controller_mac).await {
            Ok(v) => v,
            Err(e) => {
                ctx.notify(
                    NotificationKind::BroadcastConfiguration,
                    &format!("cannot read alarm voltage: {e}"),
                )
                .await;
                ctx.publisher.publish(Event::InvalidConfiguration);
                return;
            }
        };
        let controller_up = match ctx.hardware.is_up(config.controller_mac).await {
            Ok(up) => up,
            Err(e) => {
                ctx.notify(
                    NotificationKind::BroadcastConfiguration,
                    &format!("cannot read controller status: {e}"),
                )
                .await;
                ctx.publisher.publish(Event::InvalidConfiguration);
                return;
            }
        };
        if voltage <= alarm {
            info!(voltage, alarm, "battery at or below alarm voltage");
            ctx.publisher.publish(Event::LowVoltage);
        } else if !controller_up {
            ctx.notify(
                NotificationKind::BroadcastHardware,
                "controller is not reporting above alarm voltage",
            )
            .await;
            ctx.publisher.publish(Event::ControllerFailure);
        } else if voltage < config.required_streaming_voltage {
            info!(
                voltage,
                required = config.required_streaming_voltage,
                "battery below streaming voltage"
            );
            ctx.publisher.publish(Event::LowVoltage);
        } else if let Err(e) = ctx.hardware.start(config).await {
            warn!(error = %e, "camera start failed, retrying next tick");
        }
    }

    fn ignore(&self, event: &Event) {
        trace!(state = self.state.name(), event = event.name(), "event ignored");
    }
}

fn starting(now: DateTime<Utc>) -> HardwareState {
    HardwareState::Starting(Starting { entered: now })
}

fn shutting_down(now: DateTime<Utc>) -> StopPhase {
    StopPhase::ShuttingDown { entered: now }
}

fn powering_off(now: DateTime<Utc>) -> StopPhase {
    StopPhase::PoweringOff { entered: now }
}

fn shutting_down_restart(now: DateTime<Utc>) -> RestartPhase {
    RestartPhase::Stopping {
        stop: shutting_down(now),
    }
}
