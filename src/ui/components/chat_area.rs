use chrono::{DateTime, Local};
use eframe::egui;

use crate::ui::state::AppState;

pub fn render(ui: &mut egui::Ui, state: &AppState) {
    egui::ScrollArea::vertical()
        .auto_shrink([false, false])
        .stick_to_bottom(true)
        .show(ui, |ui| {
            if state.messages.is_empty() {
                ui.label(egui::RichText::new("No messages yet").weak());
            }
            for message in &state.messages {
                let layout = if state.is_own(message) {
                    egui::Layout::top_down(egui::Align::Max)
                } else {
                    egui::Layout::top_down(egui::Align::Min)
                };
                ui.with_layout(layout, |ui| {
                    ui.label(
                        egui::RichText::new(format!(
                            "{}  {}",
                            message.sender,
                            format_timestamp(&message.timestamp.with_timezone(&Local))
                        ))
                        .small()
                        .weak(),
                    );
                    ui.label(message.content.as_str());
                });
                ui.add_space(4.0);
            }
        });
}

/// `h:mm AM/PM` in the timestamp's own zone.
pub fn format_timestamp<Tz: chrono::TimeZone>(timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    timestamp.format("%-I:%M %p").to_string()
}
