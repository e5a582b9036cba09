use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{
    bus::Subscriber,
    config::BroadcastKind,
    context::BroadcastContext,
    event::Event,
    platform::BroadcastStatus,
};

/// Side effects the tick driver subscribes behind the two machines:
/// platform status verification, scheduled chat lines, stream health
/// probes, completion work and the outbound webhooks.
///
/// Hooks never transition anything themselves; they only translate
/// observations back into events.
#[derive(Default)]
pub struct EventHooks;

#[async_trait]
impl Subscriber for EventHooks {
    async fn handle(&mut self, event: &Event, ctx: &BroadcastContext) -> anyhow::Result<()> {
        match event {
            Event::StatusCheckDue => self.check_status(ctx).await,
            Event::ChatMessageDue => self.post_chat(ctx).await,
            Event::HealthCheckDue => self.check_health(ctx).await,
            Event::Started => self.announce_live(ctx).await,
            Event::Finished => self.complete(ctx).await,
            _ => {}
        }
        Ok(())
    }
}

impl EventHooks {
    /// The broadcast thinks it is live; make sure the platform agrees.
    async fn check_status(&self, ctx: &BroadcastContext) {
        let config = ctx.config();
        if config.platform_broadcast_id.is_empty() {
            return;
        }
        match ctx
            .manager
            .broadcast_status(&config.platform_broadcast_id)
            .await
        {
            Ok(BroadcastStatus::Complete | BroadcastStatus::Revoked) => {
                info!("platform reports the broadcast is over");
                ctx.publisher.publish(Event::Finish);
            }
            Ok(status) => debug!(status = status.as_str(), "platform status"),
            Err(e) => warn!(error = %e, "status check failed"),
        }
    }

    async fn post_chat(&self, ctx: &BroadcastContext) {
        let config = ctx.config();
        if config.chat_message.is_empty() || config.platform_chat_id.is_empty() {
            return;
        }
        if let Err(e) = ctx
            .manager
            .post_chat_message(&config.platform_chat_id, &config.chat_message)
            .await
        {
            warn!(error = %e, "chat message failed");
        }
    }

    async fn check_health(&self, ctx: &BroadcastContext) {
        let config = ctx.config();
        if config.platform_stream_id.is_empty() {
            return;
        }
        match ctx.manager.stream_health(&config.platform_stream_id).await {
            Ok(health) if health.is_healthy() => ctx.publisher.publish(Event::GoodHealth),
            Ok(health) => {
                debug!(health = ?health, "stream unhealthy");
                ctx.publisher.publish(Event::BadHealth);
            }
            Err(e) => warn!(error = %e, "health check failed"),
        }
    }

    /// Direct broadcasts announce going live to the partner site.
    async fn announce_live(&self, ctx: &BroadcastContext) {
        let config = ctx.config();
        if config.kind != BroadcastKind::Direct {
            return;
        }
        if let Err(e) = ctx.webhooks.notify_live(&config).await {
            warn!(error = %e, "live webhook failed");
        }
    }

    async fn complete(&self, ctx: &BroadcastContext) {
        let config = ctx.config();
        if !config.platform_broadcast_id.is_empty() {
            if let Err(e) = ctx.manager.complete_broadcast(&config).await {
                warn!(error = %e, "could not complete the platform broadcast");
            }
        }
        if config.register_open_fish {
            if let Err(e) = ctx.webhooks.register_capture(&config).await {
                warn!(error = %e, "stream registration failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bus::EventBus,
        config::BroadcastConfig,
        platform::StreamHealth,
        testing::TestCollaborators,
    };

    fn live_config(kind: BroadcastKind) -> BroadcastConfig {
        let mut config = BroadcastConfig::mock(kind);
        config.platform_broadcast_id = "B1".into();
        config.platform_stream_id = "S1".into();
        config.platform_chat_id = "C1".into();
        config
    }

    #[tokio::test]
    async fn bad_stream_health_is_translated_into_an_event() {
        let collaborators = TestCollaborators::new();
        collaborators.manager.set_health(StreamHealth::NoData);
        let bus = EventBus::new();
        let ctx = collaborators.context(live_config(BroadcastKind::Direct), bus.publisher());
        let mut hooks = EventHooks;

        hooks.handle(&Event::HealthCheckDue, &ctx).await.unwrap();
        assert_eq!(vec![Event::BadHealth], ctx.publisher.take_queued());

        collaborators.manager.set_health(StreamHealth::Good);
        hooks.handle(&Event::HealthCheckDue, &ctx).await.unwrap();
        assert_eq!(vec![Event::GoodHealth], ctx.publisher.take_queued());
    }

    #[tokio::test]
    async fn completed_platform_broadcast_publishes_finish() {
        let collaborators = TestCollaborators::new();
        collaborators.manager.set_status(BroadcastStatus::Complete);
        let bus = EventBus::new();
        let ctx = collaborators.context(live_config(BroadcastKind::Direct), bus.publisher());
        let mut hooks = EventHooks;

        hooks.handle(&Event::StatusCheckDue, &ctx).await.unwrap();

        assert_eq!(vec![Event::Finish], ctx.publisher.take_queued());
    }

    #[tokio::test]
    async fn chat_lines_are_posted_when_configured() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let mut config = live_config(BroadcastKind::Direct);
        config.chat_message = "Water temperature 19.2 C".into();
        let ctx = collaborators.context(config, bus.publisher());
        let mut hooks = EventHooks;

        hooks.handle(&Event::ChatMessageDue, &ctx).await.unwrap();

        assert_eq!(
            vec!["postChat:C1:Water temperature 19.2 C".to_string()],
            collaborators.manager.calls()
        );
    }

    #[tokio::test]
    async fn only_direct_broadcasts_fire_the_live_webhook() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let ctx = collaborators.context(live_config(BroadcastKind::Direct), bus.publisher());
        EventHooks.handle(&Event::Started, &ctx).await.unwrap();
        assert_eq!(vec!["notifyLive"], collaborators.webhooks.calls());

        let collaborators = TestCollaborators::new();
        let ctx = collaborators.context(
            live_config(BroadcastKind::VidforwardPermanent),
            bus.publisher(),
        );
        EventHooks.handle(&Event::Started, &ctx).await.unwrap();
        assert!(collaborators.webhooks.calls().is_empty());
    }

    #[tokio::test]
    async fn finished_broadcast_completes_and_registers() {
        let collaborators = TestCollaborators::new();
        let bus = EventBus::new();
        let mut config = live_config(BroadcastKind::Direct);
        config.register_open_fish = true;
        let ctx = collaborators.context(config, bus.publisher());

        EventHooks.handle(&Event::Finished, &ctx).await.unwrap();

        assert!(collaborators
            .manager
            .calls()
            .contains(&"completeBroadcast".to_string()));
        assert_eq!(vec!["registerCapture"], collaborators.webhooks.calls());
    }
}
