use eframe::egui;
use tokio::sync::mpsc;

use crate::common::{SessionCommand, SessionEvent};

use super::components::join_form::{self, JoinRequest};
use super::components::{chat_area, debug_panel, input_bar, room_header};
use super::state::AppState;

pub struct ChatApp {
    state: AppState,
    command_sender: mpsc::Sender<SessionCommand>,
    event_receiver: mpsc::Receiver<SessionEvent>,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        state: AppState,
        command_sender: mpsc::Sender<SessionCommand>,
        event_receiver: mpsc::Receiver<SessionEvent>,
    ) -> Self {
        Self {
            state,
            command_sender,
            event_receiver,
        }
    }

    fn handle_session_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            self.state.apply(event);
        }
    }

    fn send_command(&mut self, command: SessionCommand) {
        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to session: {err}");
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_session_events();

        egui::SidePanel::right("debug_panel")
            .resizable(true)
            .default_width(280.0)
            .show(ctx, |ui| {
                debug_panel::render(ui, &self.state);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            if !self.state.joined {
                match join_form::render(ui, &mut self.state) {
                    Some(JoinRequest::Join(user, room)) => {
                        self.send_command(SessionCommand::Join { user, room });
                    }
                    Some(JoinRequest::Create(user, room)) => {
                        self.send_command(SessionCommand::CreateRoom { user, room });
                    }
                    None => {}
                }
                return;
            }

            if room_header::render(ui, &self.state) {
                self.send_command(SessionCommand::Leave);
            }
            ui.separator();

            egui::TopBottomPanel::bottom("input_bar").show_inside(ui, |ui| {
                let enabled = self.state.can_send();
                if let Some(content) = input_bar::render(ui, &mut self.state.input_text, enabled) {
                    self.send_command(SessionCommand::SendMessage(content));
                }
            });
            chat_area::render(ui, &self.state);
        });

        ctx.request_repaint_after(std::time::Duration::from_millis(100));
    }
}
