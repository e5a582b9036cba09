use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, trace, warn};

use crate::{
    bus::Subscriber,
    config::{BroadcastConfig, BroadcastKind},
    context::BroadcastContext,
    event::Event,
    notify::NotificationKind,
    platform::BroadcastStatus,
    registry::StateRegistry,
};

mod state;

pub use state::{BroadcastState, Starting};

/// Drives one broadcast's lifecycle against the platform and the
/// forwarding proxy. Hardware is only ever touched indirectly, through
/// request events the hardware machine reacts to.
pub struct BroadcastMachine {
    kind: BroadcastKind,
    state: BroadcastState,
}

#[async_trait]
impl Subscriber for BroadcastMachine {
    async fn handle(&mut self, event: &Event, ctx: &BroadcastContext) -> anyhow::Result<()> {
        self.dispatch(event, ctx).await
    }
}

impl BroadcastMachine {
    pub fn new(kind: BroadcastKind, state: BroadcastState) -> Self {
        Self { kind, state }
    }

    /// Reconstructs the machine from the persisted pair, defaulting to the
    /// kind's idle state. A record whose stored state belongs to another
    /// kind (the console changed the kind between ticks) restarts idle.
    pub fn restore(registry: &StateRegistry, config: &BroadcastConfig) -> Self {
        if config.broadcast_state.is_empty() {
            return Self::new(config.kind, BroadcastState::Idle);
        }
        let (kind, state) =
            registry.broadcast(&config.broadcast_state, &config.broadcast_state_data);
        if kind != config.kind {
            warn!(
                stored = config.broadcast_state.as_str(),
                "stored state belongs to a different kind, restarting idle"
            );
            return Self::new(config.kind, BroadcastState::Idle);
        }
        Self::new(kind, state)
    }

    pub fn state(&self) -> &BroadcastState {
        &self.state
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name(self.kind)
    }

    fn permanent(&self) -> bool {
        self.kind == BroadcastKind::VidforwardPermanent
    }

    async fn dispatch(&mut self, event: &Event, ctx: &BroadcastContext) -> anyhow::Result<()> {
        match event {
            Event::Time(t) => return self.on_time(*t, ctx).await,
            Event::Started => match self.state {
                BroadcastState::Starting(_) | BroadcastState::TransitionSlateToLive => {
                    return self.transition(BroadcastState::Live, ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::StartFailed => match self.state {
                BroadcastState::Starting(_) => {
                    return self.transition(BroadcastState::Idle, ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::HardwareStartFailed => match self.state {
                BroadcastState::Starting(_) => {
                    warn!("hardware failed to start, giving up on this cycle");
                    self.publish_start_failed(ctx);
                    return self.transition(BroadcastState::Idle, ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::Finish => {
                let live = matches!(
                    self.state,
                    BroadcastState::Live | BroadcastState::LiveUnhealthy
                );
                if self.permanent()
                    && (live || self.state == BroadcastState::VoltageRecoverySlate)
                {
                    ctx.publisher.publish(Event::HardwareStopRequest);
                    return self
                        .transition(BroadcastState::TransitionLiveToSlate, ctx)
                        .await;
                }
                if !self.permanent() && live {
                    ctx.publisher.publish(Event::Finished);
                    ctx.publisher.publish(Event::HardwareStopRequest);
                    return self.transition(BroadcastState::Idle, ctx).await;
                }
                self.ignore(event)
            }
            Event::BadHealth => match self.state {
                BroadcastState::Live => {
                    return self.transition(BroadcastState::LiveUnhealthy, ctx).await;
                }
                BroadcastState::Slate => {
                    return self.transition(BroadcastState::SlateUnhealthy, ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::GoodHealth => match self.state {
                BroadcastState::LiveUnhealthy => {
                    return self.transition(BroadcastState::Live, ctx).await;
                }
                BroadcastState::SlateUnhealthy => {
                    return self.transition(BroadcastState::Slate, ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::InvalidConfiguration => match self.state {
                BroadcastState::Starting(_) => {
                    error!("invalid configuration while starting");
                    ctx.notify(
                        NotificationKind::BroadcastConfiguration,
                        "broadcast configuration is invalid, operator action required",
                    )
                    .await;
                    ctx.publisher.publish(Event::Finished);
                    ctx.publisher.publish(Event::HardwareStopRequest);
                    return self.transition(BroadcastState::Failure, ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::LowVoltage => {
                if self.permanent()
                    && matches!(
                        self.state,
                        BroadcastState::Live | BroadcastState::LiveUnhealthy
                    )
                {
                    info!("battery low, showing slate while it recovers");
                    return self
                        .transition(BroadcastState::VoltageRecoverySlate, ctx)
                        .await;
                }
                self.ignore(event)
            }
            Event::VoltageRecovered => {
                if self.permanent() && self.state == BroadcastState::VoltageRecoverySlate {
                    ctx.publisher.publish(Event::Start);
                    return self
                        .transition(BroadcastState::TransitionSlateToLive, ctx)
                        .await;
                }
                self.ignore(event)
            }
            Event::HardwareResetRequest => match self.state {
                BroadcastState::Failure => {
                    info!("operator reset, clearing broadcast failure");
                    return self.transition(BroadcastState::Idle, ctx).await;
                }
                _ => self.ignore(event),
            },
            Event::HardwareStarted => {
                if let BroadcastState::Starting(_) = self.state {
                    return self.on_hardware_started(ctx).await;
                }
                self.ignore(event)
            }
            _ => self.ignore(event),
        }
        Ok(())
    }

    async fn on_time(&mut self, t: DateTime<Utc>, ctx: &BroadcastContext) -> anyhow::Result<()> {
        let config = ctx.config();
        let in_window = config.in_window(t);
        match self.state.clone() {
            BroadcastState::Idle => {
                if in_window {
                    ctx.publisher.publish(Event::Start);
                    ctx.publisher.publish(Event::HardwareStartRequest);
                    return self
                        .transition(BroadcastState::Starting(Starting { entered: t }), ctx)
                        .await;
                }
            }
            BroadcastState::Starting(s) => {
                if t - s.entered > self.kind.starting_timeout() {
                    warn!(
                        entered = %s.entered,
                        "broadcast did not reach live in time"
                    );
                    self.publish_start_failed(ctx);
                    return self.transition(BroadcastState::Idle, ctx).await;
                }
            }
            BroadcastState::Live | BroadcastState::LiveUnhealthy => {
                if in_window {
                    ctx.publisher.publish(Event::StatusCheckDue);
                    ctx.publisher.publish(Event::ChatMessageDue);
                    if config.checking_health {
                        ctx.publisher.publish(Event::HealthCheckDue);
                    }
                    if self.state == BroadcastState::LiveUnhealthy
                        && self.kind != BroadcastKind::VidforwardSecondary
                    {
                        // Secondary broadcasts share hardware with their
                        // primary; never reset it from here.
                        ctx.publisher.publish(Event::HardwareResetRequest);
                    }
                } else {
                    ctx.publisher.publish(Event::Finish);
                    if self.permanent() {
                        ctx.publisher.publish(Event::HardwareStopRequest);
                        return self
                            .transition(BroadcastState::TransitionLiveToSlate, ctx)
                            .await;
                    }
                    // Direct and secondary finish via the Finish handler.
                }
            }
            BroadcastState::Slate | BroadcastState::SlateUnhealthy => {
                if in_window {
                    ctx.publisher.publish(Event::Start);
                    return self
                        .transition(BroadcastState::TransitionSlateToLive, ctx)
                        .await;
                }
                if config.checking_health {
                    ctx.publisher.publish(Event::HealthCheckDue);
                }
                if self.state == BroadcastState::SlateUnhealthy {
                    // The slate comes from the forwarder, so repair means
                    // re-issuing the slate request.
                    if let Err(e) = ctx.forwarder.slate(&config).await {
                        warn!(error = %e, "slate repair failed");
                    }
                }
            }
            BroadcastState::TransitionLiveToSlate => {
                match ctx.forwarder.slate(&config).await {
                    Ok(()) => return self.transition(BroadcastState::Slate, ctx).await,
                    Err(e) => warn!(error = %e, "forwarder not on slate yet, retrying next tick"),
                }
            }
            BroadcastState::TransitionSlateToLive => {
                match ctx.forwarder.stream(&config).await {
                    Ok(()) => ctx.publisher.publish(Event::Started),
                    Err(e) => warn!(error = %e, "forwarder not streaming yet, retrying next tick"),
                }
            }
            BroadcastState::VoltageRecoverySlate => {
                if !in_window {
                    return self.transition(BroadcastState::Slate, ctx).await;
                }
                // Waiting for voltageRecoveredEvent from the hardware side.
            }
            BroadcastState::Failure => {}
        }
        Ok(())
    }

    /// The camera is pushing video; drive the platform broadcast live and
    /// announce it. Failures restart the cycle instead of retrying here.
    async fn on_hardware_started(&mut self, ctx: &BroadcastContext) -> anyhow::Result<()> {
        let config = ctx.config();
        if config.platform_broadcast_id.is_empty() {
            warn!("hardware started but no platform broadcast exists");
            self.publish_start_failed(ctx);
            return self.transition(BroadcastState::Idle, ctx).await;
        }
        match ctx
            .manager
            .transition_status(&config.platform_broadcast_id, BroadcastStatus::Live)
            .await
        {
            Ok(()) => ctx.publisher.publish(Event::Started),
            Err(e) => {
                warn!(error = %e, "platform refused to go live");
                self.publish_start_failed(ctx);
                return self.transition(BroadcastState::Idle, ctx).await;
            }
        }
        Ok(())
    }

    /// Producer contract: whoever announces a failed start also announces
    /// the cleanup events for the kinds that release their hardware.
    fn publish_start_failed(&self, ctx: &BroadcastContext) {
        ctx.publisher.publish(Event::StartFailed);
        if !self.permanent() {
            ctx.publisher.publish(Event::Finished);
            ctx.publisher.publish(Event::HardwareStopRequest);
        }
    }

    async fn transition(
        &mut self,
        next: BroadcastState,
        ctx: &BroadcastContext,
    ) -> anyhow::Result<()> {
        debug!(
            from = self.state.name(self.kind),
            to = next.name(self.kind),
            "broadcast transition"
        );
        ctx.persist_states(None, Some((next.name(self.kind), next.snapshot())))
            .await?;
        self.exit();
        self.state = next;
        self.enter(ctx).await;
        Ok(())
    }

    fn exit(&self) {
        trace!(state = self.state.name(self.kind), "exit");
    }

    async fn enter(&mut self, ctx: &BroadcastContext) {
        trace!(state = self.state.name(self.kind), "enter");
        match &self.state {
            BroadcastState::Starting(_) => self.enter_starting(ctx).await,
            BroadcastState::Live => {
                ctx.publisher.publish(Event::StatusCheckDue);
                ctx.publisher.publish(Event::ChatMessageDue);
            }
            BroadcastState::TransitionLiveToSlate | BroadcastState::VoltageRecoverySlate => {
                let config = ctx.config();
                if let Err(e) = ctx.forwarder.slate(&config).await {
                    warn!(error = %e, "slate request failed, retrying next tick");
                }
            }
            _ => {}
        }
    }

    /// Creates the platform broadcast and wires the forwarder.
    ///
    /// Idempotent: ids persist as soon as they are minted, so a crash or a
    /// failed later step re-enters here without re-creating anything.
    async fn enter_starting(&self, ctx: &BroadcastContext) {
        let config = ctx.config();
        if config.platform_broadcast_id.is_empty() {
            let ids = match ctx.manager.create_broadcast(&config).await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(error = %e, "platform broadcast creation failed");
                    self.publish_start_failed(ctx);
                    return;
                }
            };
            info!(broadcast_id = ids.broadcast_id.as_str(), "platform broadcast created");
            let persisted = ctx
                .persist_config_update(move |c| {
                    c.platform_broadcast_id = ids.broadcast_id.clone();
                    c.platform_stream_id = ids.stream_id.clone();
                    c.platform_chat_id = ids.chat_id.clone();
                })
                .await;
            if let Err(e) = persisted {
                warn!(error = %e, "could not persist platform ids");
                self.publish_start_failed(ctx);
                return;
            }
            let config = ctx.config();
            if let Err(e) = ctx
                .manager
                .save_link(&config.link_variable(), &config.platform_broadcast_id)
                .await
            {
                warn!(error = %e, "could not save watch link");
            }
        }
        if self.kind.uses_forwarder() {
            let config = ctx.config();
            if config.rtmp_key.is_empty() {
                match ctx.manager.rtmp_key(&config.name).await {
                    Ok(key) => {
                        if let Err(e) = ctx
                            .persist_config_update(move |c| c.rtmp_key = key.clone())
                            .await
                        {
                            warn!(error = %e, "could not persist rtmp key");
                        }
                    }
                    Err(e) => warn!(error = %e, "could not fetch rtmp key"),
                }
            }
            if let Err(e) = ctx.forwarder.stream(&ctx.config()).await {
                warn!(error = %e, "forwarder not streaming yet, retrying next tick");
            }
        }
    }

    fn ignore(&self, event: &Event) {
        trace!(
            state = self.state.name(self.kind),
            event = event.name(),
            "event ignored"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bus::EventBus, testing::TestCollaborators};
    use chrono::Duration;

    fn live_config(kind: BroadcastKind) -> BroadcastConfig {
        let mut config = BroadcastConfig::mock(kind);
        config.platform_broadcast_id = "B1".into();
        config.platform_stream_id = "S1".into();
        config.platform_chat_id = "C1".into();
        config
    }

    #[tokio::test]
    async fn idle_starts_inside_the_window() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let mut config = BroadcastConfig::mock(BroadcastKind::Direct);
        let ctx_now = crate::testing::test_instant();
        config.start = ctx_now - Duration::minutes(1);
        config.end = ctx_now + Duration::hours(1);
        let ctx = collaborators.context(config, bus.publisher());
        let mut machine = BroadcastMachine::new(BroadcastKind::Direct, BroadcastState::Idle);

        machine.handle(&Event::Time(ctx.now), &ctx).await.unwrap();

        assert_eq!(
            vec![Event::Start, Event::HardwareStartRequest],
            ctx.publisher.take_queued()
        );
        assert!(matches!(machine.state(), BroadcastState::Starting(_)));
        assert_eq!("directStarting", ctx.config().broadcast_state);
        // Platform setup ran on entry.
        assert_eq!("B1", ctx.config().platform_broadcast_id);
        assert!(collaborators.manager.calls().contains(&"createBroadcast".to_string()));
    }

    #[tokio::test]
    async fn idle_stays_idle_outside_the_window() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let config = BroadcastConfig::mock(BroadcastKind::Direct);
        let ctx = collaborators.context(config, bus.publisher());
        let mut machine = BroadcastMachine::new(BroadcastKind::Direct, BroadcastState::Idle);

        machine.handle(&Event::Time(ctx.now), &ctx).await.unwrap();

        assert!(ctx.publisher.take_queued().is_empty());
        assert_eq!(&BroadcastState::Idle, machine.state());
    }

    #[tokio::test]
    async fn starting_timeout_releases_the_hardware() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let mut config = live_config(BroadcastKind::Direct);
        let now = crate::testing::test_instant();
        config.start = now - Duration::hours(1);
        config.end = now + Duration::hours(1);
        let ctx = collaborators.context(config, bus.publisher());
        let entered = now - Duration::minutes(11);
        let mut machine = BroadcastMachine::new(
            BroadcastKind::Direct,
            BroadcastState::Starting(Starting { entered }),
        );

        machine.handle(&Event::Time(now), &ctx).await.unwrap();

        assert_eq!(
            vec![
                Event::StartFailed,
                Event::Finished,
                Event::HardwareStopRequest
            ],
            ctx.publisher.take_queued()
        );
        assert_eq!(&BroadcastState::Idle, machine.state());
    }

    #[tokio::test]
    async fn starting_within_the_direct_grace_period_keeps_waiting() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let mut config = live_config(BroadcastKind::Direct);
        let now = crate::testing::test_instant();
        config.start = now - Duration::hours(1);
        config.end = now + Duration::hours(1);
        let ctx = collaborators.context(config, bus.publisher());
        let entered = now - Duration::minutes(8);
        let mut machine = BroadcastMachine::new(
            BroadcastKind::Direct,
            BroadcastState::Starting(Starting { entered }),
        );

        machine.handle(&Event::Time(now), &ctx).await.unwrap();

        assert!(ctx.publisher.take_queued().is_empty());
        assert!(matches!(machine.state(), BroadcastState::Starting(_)));
    }

    #[tokio::test]
    async fn hardware_started_drives_the_platform_live() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let ctx = collaborators.context(live_config(BroadcastKind::Direct), bus.publisher());
        let mut machine = BroadcastMachine::new(
            BroadcastKind::Direct,
            BroadcastState::Starting(Starting { entered: ctx.now }),
        );

        machine.handle(&Event::HardwareStarted, &ctx).await.unwrap();
        assert_eq!(vec![Event::Started], ctx.publisher.take_queued());
        assert!(collaborators
            .manager
            .calls()
            .contains(&"transitionStatus:B1:live".to_string()));

        machine.handle(&Event::Started, &ctx).await.unwrap();
        assert_eq!(&BroadcastState::Live, machine.state());
        // Live entry schedules the periodic checks.
        assert_eq!(
            vec![Event::StatusCheckDue, Event::ChatMessageDue],
            ctx.publisher.take_queued()
        );
    }

    #[tokio::test]
    async fn health_events_flip_the_live_substate() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let ctx = collaborators.context(live_config(BroadcastKind::Direct), bus.publisher());
        let mut machine = BroadcastMachine::new(BroadcastKind::Direct, BroadcastState::Live);

        machine.handle(&Event::BadHealth, &ctx).await.unwrap();
        assert_eq!(&BroadcastState::LiveUnhealthy, machine.state());

        // Repeated bad health is not a transition.
        machine.handle(&Event::BadHealth, &ctx).await.unwrap();
        assert_eq!(&BroadcastState::LiveUnhealthy, machine.state());

        machine.handle(&Event::GoodHealth, &ctx).await.unwrap();
        assert_eq!(&BroadcastState::Live, machine.state());
    }

    #[tokio::test]
    async fn unhealthy_direct_broadcast_requests_a_hardware_reset() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let mut config = live_config(BroadcastKind::Direct);
        let now = crate::testing::test_instant();
        config.start = now - Duration::hours(1);
        config.end = now + Duration::hours(1);
        let ctx = collaborators.context(config, bus.publisher());
        let mut machine =
            BroadcastMachine::new(BroadcastKind::Direct, BroadcastState::LiveUnhealthy);

        machine.handle(&Event::Time(now), &ctx).await.unwrap();

        assert_eq!(
            vec![
                Event::StatusCheckDue,
                Event::ChatMessageDue,
                Event::HardwareResetRequest
            ],
            ctx.publisher.take_queued()
        );
    }

    #[tokio::test]
    async fn unhealthy_secondary_broadcast_never_resets_shared_hardware() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let mut config = live_config(BroadcastKind::VidforwardSecondary);
        let now = crate::testing::test_instant();
        config.start = now - Duration::hours(1);
        config.end = now + Duration::hours(1);
        let ctx = collaborators.context(config, bus.publisher());
        let mut machine = BroadcastMachine::new(
            BroadcastKind::VidforwardSecondary,
            BroadcastState::LiveUnhealthy,
        );

        machine.handle(&Event::Time(now), &ctx).await.unwrap();

        assert_eq!(
            vec![Event::StatusCheckDue, Event::ChatMessageDue],
            ctx.publisher.take_queued()
        );
    }

    #[tokio::test]
    async fn window_end_sends_the_permanent_broadcast_to_slate() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let mut config = live_config(BroadcastKind::VidforwardPermanent);
        let now = crate::testing::test_instant();
        config.start = now - Duration::hours(2);
        config.end = now - Duration::minutes(1);
        let ctx = collaborators.context(config, bus.publisher());
        let mut machine =
            BroadcastMachine::new(BroadcastKind::VidforwardPermanent, BroadcastState::Live);

        machine.handle(&Event::Time(now), &ctx).await.unwrap();

        assert_eq!(
            vec![Event::Finish, Event::HardwareStopRequest],
            ctx.publisher.take_queued()
        );
        assert_eq!(&BroadcastState::TransitionLiveToSlate, machine.state());
        // Entry already asked the forwarder for the slate.
        assert_eq!(vec!["slate"], collaborators.forwarder.calls());

        // Next tick completes the transition.
        machine.handle(&Event::Time(now), &ctx).await.unwrap();
        assert_eq!(&BroadcastState::Slate, machine.state());
    }

    #[tokio::test]
    async fn window_end_finishes_the_direct_broadcast() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let mut config = live_config(BroadcastKind::Direct);
        let now = crate::testing::test_instant();
        config.start = now - Duration::hours(2);
        config.end = now - Duration::minutes(1);
        let ctx = collaborators.context(config, bus.publisher());
        let mut machine = BroadcastMachine::new(BroadcastKind::Direct, BroadcastState::Live);

        machine.handle(&Event::Time(now), &ctx).await.unwrap();
        assert_eq!(vec![Event::Finish], ctx.publisher.take_queued());
        assert_eq!(&BroadcastState::Live, machine.state());

        machine.handle(&Event::Finish, &ctx).await.unwrap();
        assert_eq!(
            vec![Event::Finished, Event::HardwareStopRequest],
            ctx.publisher.take_queued()
        );
        assert_eq!(&BroadcastState::Idle, machine.state());
    }

    #[tokio::test]
    async fn slate_goes_live_when_the_window_opens() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let mut config = live_config(BroadcastKind::VidforwardPermanent);
        let now = crate::testing::test_instant();
        config.start = now - Duration::minutes(1);
        config.end = now + Duration::hours(1);
        let ctx = collaborators.context(config, bus.publisher());
        let mut machine =
            BroadcastMachine::new(BroadcastKind::VidforwardPermanent, BroadcastState::Slate);

        machine.handle(&Event::Time(now), &ctx).await.unwrap();
        assert_eq!(vec![Event::Start], ctx.publisher.take_queued());
        assert_eq!(&BroadcastState::TransitionSlateToLive, machine.state());

        machine.handle(&Event::Time(now), &ctx).await.unwrap();
        assert_eq!(vec![Event::Started], ctx.publisher.take_queued());
        assert_eq!(vec!["stream"], collaborators.forwarder.calls());

        machine.handle(&Event::Started, &ctx).await.unwrap();
        assert_eq!(&BroadcastState::Live, machine.state());
    }

    #[tokio::test]
    async fn low_voltage_swaps_the_permanent_live_for_a_recovery_slate() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let mut config = live_config(BroadcastKind::VidforwardPermanent);
        let now = crate::testing::test_instant();
        config.start = now - Duration::hours(1);
        config.end = now + Duration::hours(1);
        let ctx = collaborators.context(config, bus.publisher());
        let mut machine =
            BroadcastMachine::new(BroadcastKind::VidforwardPermanent, BroadcastState::Live);

        machine.handle(&Event::LowVoltage, &ctx).await.unwrap();
        assert_eq!(&BroadcastState::VoltageRecoverySlate, machine.state());
        assert_eq!(vec!["slate"], collaborators.forwarder.calls());

        machine.handle(&Event::VoltageRecovered, &ctx).await.unwrap();
        assert_eq!(vec![Event::Start], ctx.publisher.take_queued());
        assert_eq!(&BroadcastState::TransitionSlateToLive, machine.state());
    }

    #[tokio::test]
    async fn invalid_configuration_parks_the_broadcast_in_failure() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let ctx = collaborators.context(live_config(BroadcastKind::Direct), bus.publisher());
        let mut machine = BroadcastMachine::new(
            BroadcastKind::Direct,
            BroadcastState::Starting(Starting { entered: ctx.now }),
        );

        machine
            .handle(&Event::InvalidConfiguration, &ctx)
            .await
            .unwrap();

        assert_eq!(
            vec![Event::Finished, Event::HardwareStopRequest],
            ctx.publisher.take_queued()
        );
        assert_eq!(&BroadcastState::Failure, machine.state());
        assert_eq!("directFailure", ctx.config().broadcast_state);
        assert!(ctx.config().in_failure);

        // Terminal until the operator resets.
        machine.handle(&Event::Time(ctx.now), &ctx).await.unwrap();
        assert_eq!(&BroadcastState::Failure, machine.state());
        machine
            .handle(&Event::HardwareResetRequest, &ctx)
            .await
            .unwrap();
        assert_eq!(&BroadcastState::Idle, machine.state());
        assert!(!ctx.config().in_failure);
    }
}
