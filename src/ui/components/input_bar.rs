use eframe::egui;

/// Returns the text to send once Send or Enter is pressed.
pub fn render(ui: &mut egui::Ui, input_text: &mut String, enabled: bool) -> Option<String> {
    let mut send = false;
    ui.add_enabled_ui(enabled, |ui| {
        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(input_text)
                    .hint_text("Type a message")
                    .desired_width(ui.available_width() - 60.0),
            );
            if ui.button("Send").clicked() {
                send = true;
            }

            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                send = true;
                response.request_focus();
            }
        });
    });

    if enabled && send && !input_text.trim().is_empty() {
        let message = input_text.clone();
        input_text.clear();
        return Some(message);
    }

    None
}
