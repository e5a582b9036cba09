use async_trait::async_trait;

/// Subject of an operator notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    BroadcastHardware,
    BroadcastSoftware,
    BroadcastConfiguration,
    BroadcastNetwork,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BroadcastHardware => "broadcastHardware",
            NotificationKind::BroadcastSoftware => "broadcastSoftware",
            NotificationKind::BroadcastConfiguration => "broadcastConfiguration",
            NotificationKind::BroadcastNetwork => "broadcastNetwork",
        }
    }

    /// Bit in the broadcast's `notify_suppress_rules` mask.
    pub fn mask_bit(&self) -> u64 {
        match self {
            NotificationKind::BroadcastHardware => 1 << 0,
            NotificationKind::BroadcastSoftware => 1 << 1,
            NotificationKind::BroadcastConfiguration => 1 << 2,
            NotificationKind::BroadcastNetwork => 1 << 3,
        }
    }

    pub fn suppressed_by(&self, mask: u64) -> bool {
        mask & self.mask_bit() != 0
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivers operator notifications. Must return promptly; failures are
/// logged by the caller, never surfaced into the tick.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        site_key: i64,
        kind: NotificationKind,
        message: &str,
    ) -> anyhow::Result<()>;
}
