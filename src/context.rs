//! Collaborators consumed by the chat subsystem
//!
//! The hall-context provider supplies the active hall; the notifier is the
//! toast layer. Both are traits so the host (terminal client, tests) can
//! plug in its own.

use std::sync::RwLock;
use tracing::{error, info, warn};

use crate::types::HallId;

/// Supplies the hall that scopes chat and conversation queries
pub trait HallContext: Send + Sync {
    fn active_hall_id(&self) -> Option<HallId>;
}

/// Hall selection that can be switched at runtime
#[derive(Debug, Default)]
pub struct SharedHall {
    current: RwLock<Option<HallId>>,
}

impl SharedHall {
    pub fn new(hall_id: Option<HallId>) -> Self {
        Self {
            current: RwLock::new(hall_id),
        }
    }

    pub fn set(&self, hall_id: Option<HallId>) {
        match self.current.write() {
            Ok(mut guard) => *guard = hall_id,
            Err(poisoned) => *poisoned.into_inner() = hall_id,
        }
    }
}

impl HallContext for SharedHall {
    fn active_hall_id(&self) -> Option<HallId> {
        match self.current.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Toast-style notification sink
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);

    fn error(&self, message: &str) {
        self.notify(NoticeLevel::Error, message);
    }

    fn info(&self, message: &str) {
        self.notify(NoticeLevel::Info, message);
    }
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => info!(notice = message),
            NoticeLevel::Warning => warn!(notice = message),
            NoticeLevel::Error => error!(notice = message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_hall_switch() {
        let hall = SharedHall::new(Some(3));
        assert_eq!(hall.active_hall_id(), Some(3));
        hall.set(Some(7));
        assert_eq!(hall.active_hall_id(), Some(7));
        hall.set(None);
        assert_eq!(hall.active_hall_id(), None);
    }
}
