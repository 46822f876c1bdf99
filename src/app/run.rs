//! Native window entry point.
//!
//! winit allows a single event loop per process, so the presenter is created once
//! by the caller and handed to whoever needs to show a window.

use super::{PlotApp, PlotView, Presenter};
use crate::error::PresentError;

/// Presenter that runs the eframe native event loop.
#[derive(Default)]
pub struct NativePresenter {
    native_options: eframe::NativeOptions,
}

impl NativePresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse the caller's presenter if it has one, else create a fresh one.
    pub fn get_or_create(existing: Option<NativePresenter>) -> NativePresenter {
        existing.unwrap_or_default()
    }
}

impl Presenter for NativePresenter {
    fn present(&mut self, view: PlotView) -> Result<(), PresentError> {
        let title = view.settings.title.clone();
        let [width, height] = view.settings.window_size;
        let mut opts = self.native_options.clone();
        // Set a default window size if one is not provided.
        if opts.viewport.inner_size.is_none() {
            opts.viewport = opts.viewport.clone().with_inner_size(egui::vec2(width, height));
        }

        let app = PlotApp::new(view);
        log::info!("opening plot window '{}'", title);
        eframe::run_native(
            &title,
            opts,
            Box::new(|cc| {
                // Install Phosphor icon font before creating the app.
                let mut fonts = egui::FontDefinitions::default();
                egui_phosphor::add_to_fonts(&mut fonts, egui_phosphor::Variant::Regular);
                cc.egui_ctx.set_fonts(fonts);
                Ok(Box::new(app))
            }),
        )?;
        log::info!("plot window closed");
        Ok(())
    }
}
