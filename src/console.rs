//! Line-based front end: one room, stdin in, stdout out.

use std::error::Error;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::common::{RoomId, SessionCommand, SessionEvent, UserId};
use crate::ui::components::chat_area::format_timestamp;

const LEAVE_COMMAND: &str = "/leave";

pub async fn run(
    commands: mpsc::Sender<SessionCommand>,
    mut events: mpsc::Receiver<SessionEvent>,
    user: UserId,
    room: RoomId,
) -> Result<(), Box<dyn Error>> {
    commands.send(SessionCommand::Join { user, room }).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    log::warn!("Session loop ended unexpectedly");
                    break;
                };
                if let Some(line) = render_event(&event) {
                    println!("{line}");
                }
                if matches!(event, SessionEvent::Left | SessionEvent::JoinFailed(_)) {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) if line.trim() == LEAVE_COMMAND => {
                        commands.send(SessionCommand::Leave).await?;
                    }
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => commands.send(SessionCommand::SendMessage(line)).await?,
                    None => {
                        stdin_open = false;
                        commands.send(SessionCommand::Leave).await?;
                    }
                }
            }
        }
    }

    Ok(())
}

fn render_event(event: &SessionEvent) -> Option<String> {
    let line = match event {
        SessionEvent::Joining { user, room } => format!("* joining {room} as {user}..."),
        SessionEvent::HistoryLoaded(messages) => {
            let mut out = messages
                .iter()
                .map(|message| {
                    format!(
                        "[{}] {}: {}",
                        format_timestamp(&message.timestamp.with_timezone(&Local)),
                        message.sender,
                        message.content
                    )
                })
                .collect::<Vec<_>>();
            out.push(format!("* {} earlier messages. Type {LEAVE_COMMAND} to quit.", messages.len()));
            out.join("\n")
        }
        SessionEvent::MessageAppended(message) => format!(
            "[{}] {}: {}",
            format_timestamp(&message.timestamp.with_timezone(&Local)),
            message.sender,
            message.content
        ),
        SessionEvent::ConnectionChanged(state) => format!("* {state}"),
        SessionEvent::Disconnected(reason) => format!("* connection lost: {reason}"),
        SessionEvent::Reconnecting { attempt, delay } => {
            format!("* reconnecting in {}s (attempt {attempt})", delay.as_secs())
        }
        SessionEvent::ReconnectAbandoned => "* could not reach the chat server".to_string(),
        SessionEvent::SendRejected(reason) => format!("! not sent: {reason}"),
        SessionEvent::JoinFailed(reason) => format!("! could not join: {reason}"),
        SessionEvent::RoomCreated(room) => format!("* created room {room}"),
        SessionEvent::Left => "* left the room".to_string(),
        SessionEvent::FrameRejected(_) => return None,
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::common::ConnectionState;
    use crate::testing::{room, user};

    #[test]
    fn status_lines_are_prefixed() {
        assert_eq!(
            render_event(&SessionEvent::ConnectionChanged(ConnectionState::Connected)).as_deref(),
            Some("* connected")
        );
        assert_eq!(
            render_event(&SessionEvent::Reconnecting {
                attempt: 2,
                delay: Duration::from_secs(4)
            })
            .as_deref(),
            Some("* reconnecting in 4s (attempt 2)")
        );
        assert_eq!(
            render_event(&SessionEvent::Joining {
                user: user("alice"),
                room: room("R1")
            })
            .as_deref(),
            Some("* joining R1 as alice...")
        );
    }

    #[test]
    fn rejected_frames_stay_quiet() {
        assert!(render_event(&SessionEvent::FrameRejected("bad json".into())).is_none());
    }

    #[test]
    fn empty_history_still_prints_a_hint() {
        let line = render_event(&SessionEvent::HistoryLoaded(vec![])).unwrap();
        assert_eq!(line, "* 0 earlier messages. Type /leave to quit.");
    }
}
