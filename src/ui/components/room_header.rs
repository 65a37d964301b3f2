use eframe::egui;

use crate::common::ConnectionState;
use crate::ui::state::AppState;

/// Returns true when Leave was clicked.
pub fn render(ui: &mut egui::Ui, state: &AppState) -> bool {
    let mut leave = false;
    ui.horizontal(|ui| {
        let room = state.room.as_ref().map(|room| room.as_str()).unwrap_or("-");
        ui.heading(format!("# {room}"));

        let (color, label) = indicator(state.connection);
        ui.colored_label(color, "●");
        ui.label(label);

        if let Some(user) = &state.user {
            ui.label(egui::RichText::new(format!("as {user}")).weak());
        }

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            leave = ui.button("Leave").clicked();
        });
    });

    if let Some(status) = &state.status {
        ui.label(egui::RichText::new(status).weak());
    }
    leave
}

fn indicator(connection: ConnectionState) -> (egui::Color32, &'static str) {
    match connection {
        ConnectionState::Connected => (egui::Color32::GREEN, "Connected"),
        ConnectionState::Connecting => (egui::Color32::YELLOW, "Connecting"),
        ConnectionState::Disconnected => (egui::Color32::GRAY, "Disconnected"),
        ConnectionState::Failed => (egui::Color32::RED, "Failed"),
    }
}
