//! Slash command handlers

use anyhow::Result;

use hall_chat::types::{ChatMessage, Conversation};
use hall_chat::Session;

use super::{colors, print_outcome, Flow};

pub async fn handle(session: &mut Session, line: &str) -> Result<Flow> {
    let mut parts = line.splitn(2, ' ');
    let command = parts.next().unwrap_or("");
    let arg = parts.next().unwrap_or("").trim();

    match command {
        "/help" => {
            println!("Commands:");
            println!("  /help              - Show this help");
            println!("  /new               - Start a new conversation");
            println!("  /conversations     - List recent conversations");
            println!("  /open <id>         - Open a conversation");
            println!("  /retry             - Resend the last failed message");
            println!("  /hall <id|none>    - Switch the active hall");
            println!("  /status            - Show connection and conversation state");
            println!("  /reconnect         - Reload conversations and go online");
            println!("  /quit              - Exit");
        }
        "/new" => {
            session.controller_mut().new_conversation();
            println!("{}", colors::success("Started a new conversation."));
        }
        "/conversations" => {
            let loaded = session.controller_mut().store_mut().refresh_conversations().await;
            match loaded {
                Ok(list) => print_conversations(&list),
                Err(e) => println!("{}", colors::error(&e.to_user_string())),
            }
        }
        "/open" => match arg.parse::<i64>() {
            Ok(id) => match session.controller_mut().open_conversation(id).await {
                Ok(_) => print_history(session.controller().messages().as_slice()),
                Err(e) => println!("{}", colors::error(&e.to_user_string())),
            },
            Err(_) => println!("Usage: /open <conversation id>"),
        },
        "/retry" => {
            let controller = session.controller_mut();
            match controller.retry_last().await {
                Ok(Some(outcome)) => print_outcome(controller, outcome).await?,
                Ok(None) => println!("Nothing to retry."),
                Err(e) => println!("{}", colors::warning(&e.to_user_string())),
            }
        }
        "/hall" => {
            let hall_id = match arg {
                "" => {
                    let current = session
                        .hall_id()
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "(none)".into());
                    println!("Hall: {}", current);
                    return Ok(Flow::Continue);
                }
                "none" => None,
                raw => match raw.parse::<i64>() {
                    Ok(id) => Some(id),
                    Err(_) => {
                        println!("Usage: /hall <id|none>");
                        return Ok(Flow::Continue);
                    }
                },
            };
            match session.switch_hall(hall_id).await {
                Ok(()) => println!("{}", colors::success("Hall switched.")),
                Err(e) => println!("{}", colors::warning(&e.to_user_string())),
            }
        }
        "/status" => {
            let controller = session.controller();
            println!("Status:       {}", controller.status_line());
            println!("Server:       {}", session.settings().base_url);
            println!(
                "Hall:         {}",
                session
                    .hall_id()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "(none)".into())
            );
            println!(
                "Conversation: {}",
                controller
                    .conversation_id()
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "(new)".into())
            );
        }
        "/reconnect" => match session.controller_mut().reconnect().await {
            Ok(()) => println!("{}", colors::success("Connected.")),
            Err(e) => println!("{}", colors::warning(&e.to_user_string())),
        },
        "/quit" | "/exit" => return Ok(Flow::Quit),
        _ => println!("Unknown command: {}. Try /help", command),
    }
    Ok(Flow::Continue)
}

pub fn print_conversations(list: &[Conversation]) {
    if list.is_empty() {
        println!("No conversations yet.");
        return;
    }
    for conversation in list {
        let when = conversation
            .last_message_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "  {:>6}  {:<16}  {}",
            conversation.id,
            when,
            conversation.topic.as_deref().unwrap_or("(untitled)")
        );
    }
}

fn print_history(messages: &[ChatMessage]) {
    println!("{}", colors::separator(50));
    for message in messages {
        let who = if message.is_user() { "you" } else { "assistant" };
        println!("{} {}", colors::header(who), message.display_text());
        if let Some(url) = &message.chart_url {
            println!("  {}", colors::link(url));
        }
    }
    println!("{}", colors::separator(50));
}
