mod content_fetcher;
mod secrets;
mod webhook;

pub use content_fetcher::{ContentFetch, ContentFetcher};
pub use secrets::{EnvSecretResolver, SecretResolve};
pub use webhook::{format_payload, Message, Notify, WebhookNotifier};
