use eframe::egui;

use crate::common::{RoomId, UserId};
use crate::ui::state::AppState;

pub enum JoinRequest {
    Join(UserId, RoomId),
    Create(UserId, RoomId),
}

pub fn render(ui: &mut egui::Ui, state: &mut AppState) -> Option<JoinRequest> {
    ui.heading("Join a room");
    ui.separator();

    egui::Grid::new("join_form").num_columns(2).show(ui, |ui| {
        ui.label("User:");
        ui.text_edit_singleline(&mut state.user_input);
        ui.end_row();

        ui.label("Room:");
        ui.text_edit_singleline(&mut state.room_input);
        ui.end_row();
    });

    let mut join = false;
    let mut create = false;
    ui.horizontal(|ui| {
        join = ui.button("Join").clicked();
        create = ui.button("Create room").clicked();
    });

    if let Some(status) = &state.status {
        ui.label(egui::RichText::new(status).color(egui::Color32::LIGHT_RED));
    }

    if !join && !create {
        return None;
    }

    let (Ok(user), Ok(room)) = (
        UserId::new(state.user_input.trim()),
        RoomId::new(state.room_input.trim()),
    ) else {
        state.status = Some("User and room are both required".to_string());
        return None;
    };

    Some(if create {
        JoinRequest::Create(user, room)
    } else {
        JoinRequest::Join(user, room)
    })
}
