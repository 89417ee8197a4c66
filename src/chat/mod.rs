//! Chat view state: the message list reducer and the controller driving it

pub mod controller;
pub mod messages;

pub use controller::{
    ChatController, ChatStatus, ConnectionStatus, ControllerOptions, StreamProgress,
    SubmitOutcome,
};
pub use messages::{MessageAction, MessageList, ReduceError};
