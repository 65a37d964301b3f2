use eframe::egui;

use crate::ui::state::AppState;

pub fn render(ui: &mut egui::Ui, state: &AppState) {
    ui.heading("Debug Info");
    ui.separator();

    ui.horizontal(|ui| {
        ui.label("Connection:");
        ui.label(state.connection.to_string());
    });
    ui.horizontal(|ui| {
        ui.label("Messages:");
        ui.label(format!("{}", state.messages.len()));
    });

    ui.separator();

    ui.label("Recent Events:");
    egui::ScrollArea::vertical()
        .max_height(400.0)
        .show(ui, |ui| {
            for event in state.debug_events.iter().rev().take(20) {
                let time_str = event.timestamp.format("%H:%M:%S");
                let color = match event.event_type {
                    "MESSAGE" | "HISTORY" => egui::Color32::GREEN,
                    "DISCONNECTED" | "JOIN_FAILED" | "FRAME_REJECTED" | "SEND_REJECTED" => egui::Color32::RED,
                    "RECONNECTING" | "CONNECTION" => egui::Color32::YELLOW,
                    _ => egui::Color32::WHITE,
                };

                ui.horizontal(|ui| {
                    ui.colored_label(color, format!("[{}] {}", time_str, event.event_type));
                    ui.label(event.message.as_str());
                });
            }
        });
}
