mod hardware;
mod notifier;
mod runtime;
mod settings;
mod store;
mod tokens;
mod tracing;
mod vidforward;
mod webhook;
mod youtube;

pub use hardware::StoreHardwareManager;
pub use notifier::{HttpNotifier, LogNotifier};
pub use runtime::Runtime;
pub use settings::RuntimeConfig;
pub use store::JsonFileStore;
pub use tokens::{FsTokenStore, HttpTokenStore, TokenStore};
pub use vidforward::HttpForwardingService;
pub use webhook::{WebhookSender, WebhookSettings};
pub use youtube::YouTubeBroadcastManager;
