//! Standalone text-to-image GUI.
//!
//! A single window: prompt field, generate button, progress bar, image view.
//! Generation happens against a hosted endpoint on a worker thread; the UI
//! polls a channel once per frame and never blocks.

use anyhow::{anyhow, Context as AnyhowContext, Result};
use eframe::egui;
use serde::Serialize;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const MODEL: &str = "black-forest-labs/FLUX.1-dev";
const IMAGE_SIZE: &str = "768x768";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1100.0, 800.0])
            .with_min_inner_size([600.0, 500.0]),
        vsync: true,
        ..Default::default()
    };
    eframe::run_native(
        "Image Generator",
        options,
        Box::new(|_cc| Box::new(ImageGenApp::default())),
    )
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
    response_format: &'a str,
}

enum GenEvent {
    Finished(image::RgbaImage),
    Failed(String),
}

#[derive(Default)]
struct ImageGenApp {
    prompt: String,
    generating: bool,
    status: Option<String>,
    rx: Option<Receiver<GenEvent>>,
    texture: Option<egui::TextureHandle>,
}

impl ImageGenApp {
    fn start_generation(&mut self) {
        let prompt = self.prompt.trim().to_string();
        if prompt.is_empty() || self.generating {
            return;
        }
        let (tx, rx) = std::sync::mpsc::channel();
        self.rx = Some(rx);
        self.generating = true;
        self.status = None;
        std::thread::spawn(move || run_generation(prompt, tx));
    }

    fn poll(&mut self, ctx: &egui::Context) {
        let Some(rx) = &self.rx else {
            return;
        };
        let event = match rx.try_recv() {
            Ok(event) => event,
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => GenEvent::Failed("worker exited".to_string()),
        };
        self.generating = false;
        self.rx = None;
        match event {
            GenEvent::Finished(rgba) => {
                let size = [rgba.width() as usize, rgba.height() as usize];
                let pixels = egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());
                self.texture =
                    Some(ctx.load_texture("generated", pixels, egui::TextureOptions::LINEAR));
            }
            GenEvent::Failed(message) => {
                tracing::error!("generation failed: {message}");
                self.status = Some(message);
            }
        }
    }
}

impl eframe::App for ImageGenApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll(ctx);
        if self.generating {
            ctx.request_repaint();
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.vertical_centered(|ui| {
                ui.add_space(8.0);
                ui.label("Enter prompt:");
                ui.add(
                    egui::TextEdit::singleline(&mut self.prompt)
                        .desired_width(500.0)
                        .hint_text("a lighthouse at dusk, oil painting"),
                );
                ui.add_space(6.0);

                let can_generate = !self.generating && !self.prompt.trim().is_empty();
                if ui
                    .add_enabled(can_generate, egui::Button::new("Generate Image"))
                    .clicked()
                {
                    self.start_generation();
                }

                ui.add_space(6.0);
                if self.generating {
                    ui.add(
                        egui::ProgressBar::new(0.0)
                            .desired_width(300.0)
                            .animate(true)
                            .text("generating..."),
                    );
                }
                if let Some(status) = &self.status {
                    ui.colored_label(egui::Color32::RED, status);
                }

                ui.add_space(8.0);
                if let Some(texture) = &self.texture {
                    egui::ScrollArea::both().show(ui, |ui| {
                        ui.image((texture.id(), texture.size_vec2()));
                    });
                }
            });
        });
    }
}

/// Worker: request an image, download it, decode it.
fn run_generation(prompt: String, tx: Sender<GenEvent>) {
    let result = (|| -> Result<image::RgbaImage> {
        let rt = tokio::runtime::Runtime::new().context("starting async runtime")?;
        rt.block_on(generate(&prompt))
    })();
    let _ = tx.send(match result {
        Ok(rgba) => GenEvent::Finished(rgba),
        Err(e) => GenEvent::Failed(format!("{e:#}")),
    });
}

async fn generate(prompt: &str) -> Result<image::RgbaImage> {
    let api_key =
        std::env::var("IMAGEGEN_API_KEY").context("IMAGEGEN_API_KEY is not set")?;
    let base_url = std::env::var("IMAGEGEN_BASE_URL")
        .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
    let base_url = base_url.trim_end_matches('/');

    let client = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("building HTTP client")?;

    let request = GenerationRequest {
        model: MODEL,
        prompt,
        n: 1,
        size: IMAGE_SIZE,
        response_format: "url",
    };
    let resp = client
        .post(format!("{base_url}/images/generations"))
        .header("Authorization", format!("Bearer {api_key}"))
        .json(&request)
        .send()
        .await
        .context("generation request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        let detail: String = body.chars().take(400).collect();
        return Err(anyhow!("generation error: {status}\n{detail}"));
    }

    let body = resp.text().await?;
    let url = extract_image_url(&body)?;

    let bytes = client
        .get(&url)
        .send()
        .await
        .context("image download failed")?
        .error_for_status()?
        .bytes()
        .await?;

    let decoded = image::load_from_memory(&bytes).context("decoding image")?;
    Ok(decoded.to_rgba8())
}

/// Pull the first image URL out of the endpoint's JSON body.
fn extract_image_url(body: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(body)?;
    value
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|item| item.get("url"))
        .and_then(|url| url.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("response body has no data[0].url"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_image_url() {
        let body = r#"{"created":1,"data":[{"url":"https://cdn.example/img.png"}]}"#;
        assert_eq!(
            extract_image_url(body).unwrap(),
            "https://cdn.example/img.png"
        );
    }

    #[test]
    fn test_extract_image_url_missing() {
        assert!(extract_image_url(r#"{"data":[]}"#).is_err());
        assert!(extract_image_url("not json").is_err());
    }

    #[test]
    fn test_generation_request_shape() {
        let request = GenerationRequest {
            model: MODEL,
            prompt: "a cat",
            n: 1,
            size: IMAGE_SIZE,
            response_format: "url",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["prompt"], "a cat");
        assert_eq!(json["size"], "768x768");
        assert_eq!(json["n"], 1);
    }
}
