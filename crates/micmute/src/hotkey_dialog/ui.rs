//! Cross-platform egui hotkey dialog.

use std::sync::{Arc, Mutex};

use eframe::egui;

use super::{HotkeyChoice, parse_input};

pub struct HotkeyApp {
    text: String,
    error: Option<String>,
    result: Arc<Mutex<Option<HotkeyChoice>>>,
}

impl HotkeyApp {
    pub fn new(
        text: String,
        error: Option<String>,
        result: Arc<Mutex<Option<HotkeyChoice>>>,
        cc: &eframe::CreationContext<'_>,
    ) -> Self {
        let mut style = (*cc.egui_ctx.style()).clone();
        let corner_radius = egui::CornerRadius::same(4);
        style.visuals.widgets.inactive.corner_radius = corner_radius;
        style.visuals.widgets.active.corner_radius = corner_radius;
        style.visuals.widgets.hovered.corner_radius = corner_radius;
        cc.egui_ctx.set_style(style);

        Self {
            text,
            error,
            result,
        }
    }

    fn finish(&mut self, ctx: &egui::Context, choice: HotkeyChoice) {
        if let Ok(mut guard) = self.result.lock() {
            *guard = Some(choice);
        }
        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
    }

    fn try_save(&mut self, ctx: &egui::Context) {
        match parse_input(&self.text) {
            Ok(choice) => self.finish(ctx, choice),
            Err(e) => self.error = Some(e),
        }
    }
}

impl eframe::App for HotkeyApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.label(egui::RichText::new("Toggle mute hotkey").strong().size(14.0));
            ui.add_space(6.0);
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.text)
                    .hint_text("e.g. Ctrl+Shift+M")
                    .desired_width(f32::INFINITY),
            );
            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                self.try_save(ui.ctx());
            }

            if let Some(err) = &self.error {
                ui.add_space(6.0);
                ui.label(egui::RichText::new(err).color(egui::Color32::from_rgb(220, 50, 50)));
            }

            ui.add_space(12.0);
            ui.separator();
            ui.add_space(8.0);

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let save_btn = egui::Button::new("Save")
                    .fill(egui::Color32::from_rgb(60, 130, 210))
                    .min_size(egui::vec2(72.0, 0.0));
                if ui.add(save_btn).clicked() {
                    self.try_save(ui.ctx());
                }
                if ui.button("Cancel").clicked() {
                    ui.ctx().send_viewport_cmd(egui::ViewportCommand::Close);
                }
                if ui.button("Clear").clicked() {
                    self.finish(ui.ctx(), HotkeyChoice::Clear);
                }
            });
        });
    }
}
