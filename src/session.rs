//! Per-session wiring
//!
//! A `Session` is built once per authenticated session: it owns the
//! backend, the active-hall selection and the chat controller. Ending the
//! session tears down any open stream and drops cached data.

use std::sync::Arc;
use tracing::info;

use crate::api::{ApiClient, ChatBackend};
use crate::chat::{ChatController, ControllerOptions};
use crate::config::ChatSettings;
use crate::context::{HallContext, Notifier, SharedHall};
use crate::error::Result;
use crate::store::ConversationStore;
use crate::types::HallId;

pub struct Session {
    settings: ChatSettings,
    hall: Arc<SharedHall>,
    controller: ChatController,
}

impl Session {
    /// Session talking to the HTTP backend described by `settings`
    pub fn new(settings: ChatSettings, notifier: Arc<dyn Notifier>) -> Self {
        let backend = Arc::new(ApiClient::from_settings(&settings));
        Self::with_backend(settings, backend, notifier)
    }

    pub fn with_backend(
        settings: ChatSettings,
        backend: Arc<dyn ChatBackend>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let hall = Arc::new(SharedHall::new(settings.hall_id));
        let store = ConversationStore::new(
            Arc::clone(&backend),
            settings.conversation_page_size,
            settings.message_page_size,
        );
        let hall_context: Arc<dyn HallContext> = hall.clone();
        let controller = ChatController::new(
            backend,
            store,
            hall_context,
            notifier,
            ControllerOptions {
                throttle: settings.throttle,
                welcome_message: settings.welcome_message.clone(),
            },
        );

        Self {
            settings,
            hall,
            controller,
        }
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn controller(&self) -> &ChatController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut ChatController {
        &mut self.controller
    }

    pub fn hall_id(&self) -> Option<HallId> {
        self.hall.active_hall_id()
    }

    /// Switch the active hall and reload the conversation list for it
    pub async fn switch_hall(&mut self, hall_id: Option<HallId>) -> Result<()> {
        self.hall.set(hall_id);
        info!(hall_id = ?hall_id, "Active hall changed");
        self.controller.new_conversation();
        self.controller.reconnect().await
    }

    /// End the session: close any stream and forget cached data
    pub fn logout(&mut self) {
        self.controller.teardown();
        self.controller.new_conversation();
        self.controller.store_mut().clear();
        info!("Session ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LogNotifier;

    #[tokio::test]
    async fn test_session_uses_configured_hall() {
        let mut settings = ChatSettings::for_base_url("http://127.0.0.1:9/api").unwrap();
        settings.hall_id = Some(3);
        let session = Session::new(settings, Arc::new(LogNotifier));

        assert_eq!(session.hall_id(), Some(3));
        assert_eq!(session.settings().base_url.as_str(), "http://127.0.0.1:9/api/");
        assert_eq!(session.controller().messages().len(), 1);
    }
}
