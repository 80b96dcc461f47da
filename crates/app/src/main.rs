//! DeepThink - desktop chat client for the DeepSeek API.
//!
//! The UI runs on the egui event loop; completions and balance queries run
//! on worker threads and report back over std channels, drained once per
//! frame.

use eframe::egui;
use parking_lot::Mutex;
use std::sync::Arc;

mod modals;
mod sessions;
mod state;
mod types;
mod utils;

use modals::{ApiKeyDialog, Modal};
use providers::deepseek::MODELS;
use types::{AppState, Author};
use utils::{format_balance, format_thinking};

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 750.0])
            .with_min_inner_size([800.0, 600.0]),
        vsync: true,
        ..Default::default()
    };
    eframe::run_native(
        "DeepThink",
        options,
        Box::new(|cc| {
            let state = AppState::new();
            apply_theme(&cc.egui_ctx, state.settings.dark_mode);
            Box::new(DeepThinkApp::new(state))
        }),
    )
}

fn apply_theme(ctx: &egui::Context, dark_mode: bool) {
    if dark_mode {
        ctx.set_visuals(egui::Visuals::dark());
    } else {
        ctx.set_visuals(egui::Visuals::light());
    }
}

struct DeepThinkApp {
    state: Arc<Mutex<AppState>>,
    api_key_dialog: ApiKeyDialog,
}

impl DeepThinkApp {
    fn new(state: AppState) -> Self {
        let mut app = Self {
            state: Arc::new(Mutex::new(state)),
            api_key_dialog: ApiKeyDialog::new("api-key"),
        };
        let needs_key = {
            let mut s = app.state.lock();
            if s.has_api_key() {
                s.start_balance_polling();
                false
            } else {
                true
            }
        };
        if needs_key {
            app.api_key_dialog.open();
        }
        app
    }
}

impl eframe::App for DeepThinkApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let mut s = self.state.lock();

        // Drain worker channels (non-blocking).
        s.poll_chat_events();
        s.poll_balance();

        // Keep polling while a completion is in flight.
        if s.awaiting_response {
            ctx.request_repaint();
        } else {
            // Periodic balance updates land without user interaction.
            ctx.request_repaint_after(std::time::Duration::from_secs(1));
        }

        if self.api_key_dialog.is_open() {
            self.api_key_dialog.update(ctx);
            if self.api_key_dialog.has_result() {
                match self.api_key_dialog.take_result().take_value() {
                    Some(key) => {
                        s.api_key = key;
                        s.start_balance_polling();
                    }
                    // No key means the app is unusable.
                    None => ctx.send_viewport_cmd(egui::ViewportCommand::Close),
                }
            }
            return;
        }

        draw_sidebar(ctx, &mut s);
        draw_header(ctx, &mut s);
        draw_input_bar(ctx, &mut s);
        draw_transcript(ctx, &s);
    }
}

fn draw_sidebar(ctx: &egui::Context, s: &mut AppState) {
    egui::SidePanel::left("sidebar")
        .default_width(220.0)
        .show(ctx, |ui| {
            ui.add_space(8.0);
            if ui
                .add_enabled(!s.awaiting_response, egui::Button::new("＋ New Chat"))
                .clicked()
            {
                s.new_chat();
            }
            ui.add_space(8.0);
            ui.separator();

            egui::ScrollArea::vertical().show(ui, |ui| {
                let conversations = s.past_conversations.clone();
                for conv in &conversations {
                    let selected = conv.conversation_id == s.conversation_id;
                    if ui
                        .selectable_label(selected, &conv.title)
                        .on_hover_text(&conv.started_at)
                        .clicked()
                        && !selected
                    {
                        s.load_conversation(&conv.conversation_id);
                    }
                }
            });
        });
}

fn draw_header(ctx: &egui::Context, s: &mut AppState) {
    egui::TopBottomPanel::top("header").show(ctx, |ui| {
        ui.add_space(4.0);
        ui.horizontal(|ui| {
            if ui
                .add_enabled(!s.awaiting_response, egui::Button::new("Add File"))
                .clicked()
            {
                if let Some(path) = rfd::FileDialog::new().pick_file() {
                    s.add_file(&path);
                }
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let mut selected = s.settings.selected_model.clone();
                egui::ComboBox::from_label("Model")
                    .selected_text(&selected)
                    .show_ui(ui, |ui| {
                        for (name, _) in MODELS {
                            ui.selectable_value(&mut selected, name.to_string(), name);
                        }
                    });
                if selected != s.settings.selected_model {
                    s.settings.selected_model = selected;
                    utils::save_settings(&s.settings);
                }

                ui.separator();
                ui.label(format_balance(s.api_balance));
                ui.separator();
                ui.label(format_thinking(s.total_thinking_secs));
                ui.separator();

                let icon = if s.settings.dark_mode { "☀" } else { "🌙" };
                if ui.button(icon).on_hover_text("Toggle theme").clicked() {
                    s.settings.dark_mode = !s.settings.dark_mode;
                    apply_theme(ui.ctx(), s.settings.dark_mode);
                    utils::save_settings(&s.settings);
                }
            });
        });
        ui.add_space(4.0);
    });
}

fn draw_input_bar(ctx: &egui::Context, s: &mut AppState) {
    egui::TopBottomPanel::bottom("input").show(ctx, |ui| {
        ui.add_space(6.0);
        ui.horizontal(|ui| {
            let input = egui::TextEdit::multiline(&mut s.input_text)
                .desired_rows(3)
                .desired_width(ui.available_width() - 70.0)
                .hint_text("Ask DeepThink...");
            let response = ui.add_enabled(!s.awaiting_response, input);

            // Enter sends, Shift+Enter inserts a newline.
            let enter_pressed = response.has_focus()
                && ui.input(|i| i.key_pressed(egui::Key::Enter) && !i.modifiers.shift);

            let send_label = if s.awaiting_response { "…" } else { "Send" };
            let clicked = ui
                .add_enabled(!s.awaiting_response, egui::Button::new(send_label))
                .clicked();

            if clicked || enter_pressed {
                s.send_message();
            }
        });
        ui.add_space(6.0);
    });
}

fn draw_transcript(ctx: &egui::Context, s: &AppState) {
    egui::CentralPanel::default().show(ctx, |ui| {
        egui::ScrollArea::vertical()
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for (i, message) in s.transcript.iter().enumerate() {
                    if message.is_reasoning {
                        let live = s.awaiting_response && i == s.transcript.len() - 1;
                        let title = if live {
                            "Thinking…".to_string()
                        } else {
                            match message.thinking_secs {
                                Some(secs) => format!("Thinking ({secs:.1}s)"),
                                None => "Thinking".to_string(),
                            }
                        };
                        egui::CollapsingHeader::new(title)
                            .id_source(("reasoning", i))
                            .default_open(false)
                            .show(ui, |ui| {
                                ui.label(egui::RichText::new(&message.content).weak());
                                if ui.small_button("📋 Copy").clicked() {
                                    utils::copy_to_clipboard(ui.ctx(), &message.content);
                                }
                            });
                        continue;
                    }

                    let align = match message.author {
                        Author::User => egui::Align::Max,
                        Author::Assistant => egui::Align::Min,
                    };
                    ui.with_layout(egui::Layout::top_down(align), |ui| {
                        egui::Frame::group(ui.style())
                            .rounding(8.0)
                            .show(ui, |ui| {
                                ui.set_max_width(ui.available_width() * 0.8);
                                ui.label(&message.content);
                                ui.with_layout(
                                    egui::Layout::right_to_left(egui::Align::Min),
                                    |ui| {
                                        if ui
                                            .small_button("📋")
                                            .on_hover_text("Copy message")
                                            .clicked()
                                        {
                                            utils::copy_to_clipboard(ui.ctx(), &message.content);
                                        }
                                    },
                                );
                            });
                    });
                    ui.add_space(4.0);
                }

                if s.awaiting_response && s.transcript.last().map_or(true, |m| m.author == Author::User) {
                    ui.label(egui::RichText::new("…").weak());
                }
            });
    });
}
