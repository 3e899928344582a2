//! Host-facing session: applies [`UiIntent`]s to the connection.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::bridge::{Bridge, UiIntent};
use crate::channel::{Connector, EndpointResolver};
use crate::config::TransportConfig;
use crate::domain::{Credential, EventAllowList};
use crate::error::InvokeReply;
use crate::service::ConnectionManager;

/// One host's connection, driven by its intent stream.
#[derive(Debug)]
pub struct Session<K: Connector> {
    manager: Arc<ConnectionManager<K>>,
}

impl<K: Connector> Session<K> {
    /// Creates a disconnected session over the standard event vocabulary.
    #[must_use]
    pub fn new(
        config: &TransportConfig,
        connector: K,
        endpoint: Arc<dyn EndpointResolver>,
        bridge: Arc<dyn Bridge>,
    ) -> Self {
        Self::with_allow_list(config, connector, endpoint, EventAllowList::standard(), bridge)
    }

    /// Creates a disconnected session enforcing `allow`.
    #[must_use]
    pub fn with_allow_list(
        config: &TransportConfig,
        connector: K,
        endpoint: Arc<dyn EndpointResolver>,
        allow: Arc<EventAllowList>,
        bridge: Arc<dyn Bridge>,
    ) -> Self {
        Self {
            manager: Arc::new(ConnectionManager::new(connector, endpoint, config, allow, bridge)),
        }
    }

    /// Returns the connection manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<ConnectionManager<K>> {
        &self.manager
    }

    /// Applies one intent.
    ///
    /// Acknowledged calls run on their own task so a slow call never holds
    /// up the intents behind it; the outcome goes to the intent's reply
    /// sender.
    pub async fn handle(&self, intent: UiIntent) {
        match intent {
            UiIntent::Message { event, args } => {
                self.manager.router().forward_outbound(&event, args);
            }
            UiIntent::Invoke {
                event,
                payload,
                reply,
            } => {
                let router = Arc::clone(self.manager.router());
                tokio::spawn(async move {
                    let outcome = router.invoke(&event, payload).await;
                    if reply.send(InvokeReply::from(outcome)).is_err() {
                        tracing::debug!(event = %event, "invoke caller went away");
                    }
                });
            }
            UiIntent::Connect { token } => self.manager.connect(Credential::new(token)).await,
            UiIntent::Disconnect => self.manager.disconnect().await,
        }
    }

    /// Applies intents until the host closes the stream, then disconnects.
    pub async fn run(&self, mut intents: mpsc::Receiver<UiIntent>) {
        while let Some(intent) = intents.recv().await {
            self.handle(intent).await;
        }
        tracing::info!("intent stream closed");
        self.manager.disconnect().await;
    }
}
