//! API key entry dialog, shown when no key is found in the environment.
//!
//! The key is held in zeroized memory while the dialog is open and handed
//! over exactly once on submit. Cancelling means the app cannot talk to the
//! API at all, so the caller is expected to quit.

use super::{Modal, ModalResult};
use egui::{Align2, Area, Context, Id, Key, RichText, TextEdit, Vec2};
use zeroize::Zeroizing;

pub struct ApiKeyDialog {
    is_open: bool,
    key: Zeroizing<String>,
    result: ModalResult<String>,
    error: Option<String>,
    id: Id,
}

impl ApiKeyDialog {
    pub fn new(id: impl std::hash::Hash) -> Self {
        Self {
            is_open: false,
            key: Zeroizing::new(String::new()),
            result: ModalResult::Pending,
            error: None,
            id: Id::new(id),
        }
    }

    /// Get the result (consumes the key).
    pub fn take_result(&mut self) -> ModalResult<String> {
        std::mem::replace(&mut self.result, ModalResult::Pending)
    }

    pub fn has_result(&self) -> bool {
        !self.result.is_pending()
    }

    fn submit(&mut self) {
        let key = std::mem::take(&mut *self.key);
        let trimmed = key.trim().to_string();
        if trimmed.is_empty() {
            self.error = Some("The key cannot be empty".to_string());
            return;
        }
        self.result = ModalResult::Confirmed(trimmed);
    }
}

impl Modal for ApiKeyDialog {
    fn update(&mut self, ctx: &Context) -> bool {
        if !self.is_open {
            return false;
        }

        let mut should_close = false;

        // Semi-transparent background overlay
        Area::new(self.id.with("overlay"))
            .anchor(Align2::LEFT_TOP, Vec2::ZERO)
            .show(ctx, |ui| {
                let screen_rect = ctx.screen_rect();
                ui.allocate_response(screen_rect.size(), egui::Sense::click());
                ui.painter()
                    .rect_filled(screen_rect, 0.0, egui::Color32::from_black_alpha(180));
            });

        egui::Window::new("🔐 API Key Required")
            .id(self.id.with("window"))
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.set_min_width(350.0);
                ui.add_space(8.0);

                ui.label("Enter your DeepSeek API key to continue:");
                ui.add_space(8.0);

                if let Some(ref error) = self.error {
                    ui.colored_label(egui::Color32::RED, error);
                    ui.add_space(8.0);
                }

                ui.horizontal(|ui| {
                    ui.label("Key:");
                    let response = ui.add(
                        TextEdit::singleline(&mut *self.key)
                            .password(true)
                            .desired_width(240.0)
                            .hint_text("sk-..."),
                    );
                    if response.gained_focus() || self.error.is_some() {
                        response.request_focus();
                    }
                    if response.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter)) {
                        self.submit();
                        should_close = !self.result.is_pending();
                    }
                });

                ui.add_space(12.0);

                ui.horizontal(|ui| {
                    if ui.button("Quit").clicked() {
                        self.result = ModalResult::Cancelled;
                        should_close = true;
                    }
                    ui.add_space(8.0);
                    let submit_enabled = !self.key.is_empty();
                    if ui
                        .add_enabled(submit_enabled, egui::Button::new("Submit"))
                        .clicked()
                    {
                        self.submit();
                        should_close = !self.result.is_pending();
                    }
                });

                ui.add_space(8.0);
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Min), |ui| {
                    ui.label(
                        RichText::new("🔒 The key is kept in memory only")
                            .small()
                            .weak(),
                    );
                });
            });

        if ctx.input(|i| i.key_pressed(Key::Escape)) {
            self.result = ModalResult::Cancelled;
            should_close = true;
        }

        if should_close {
            self.is_open = false;
            self.key = Zeroizing::new(String::new());
        }

        should_close
    }

    fn is_open(&self) -> bool {
        self.is_open
    }

    fn open(&mut self) {
        self.is_open = true;
        self.key = Zeroizing::new(String::new());
        self.result = ModalResult::Pending;
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialog_starts_closed() {
        let dialog = ApiKeyDialog::new("test");
        assert!(!dialog.is_open());
        assert!(!dialog.has_result());
    }

    #[test]
    fn test_submit_trims_confirms_and_clears_key() {
        let mut dialog = ApiKeyDialog::new("test");
        dialog.open();
        *dialog.key = "  sk-abc  ".to_string();
        dialog.submit();
        assert!(dialog.key.is_empty());
        assert_eq!(dialog.take_result().take_value().as_deref(), Some("sk-abc"));
    }

    #[test]
    fn test_submit_rejects_empty() {
        let mut dialog = ApiKeyDialog::new("test");
        dialog.open();
        *dialog.key = "   ".to_string();
        dialog.submit();
        assert!(!dialog.has_result());
        assert!(dialog.error.is_some());
    }
}
