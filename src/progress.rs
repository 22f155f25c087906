//! Terminal progress for inference and sync passes

use crate::ui;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use intelligence::{EntityId, ProgressCallback};

/// Progress bar over all entities of a pass, advanced layer by layer
pub struct LayerProgress {
    bar: ProgressBar,
    layer: usize,
    hidden: bool,
}

impl LayerProgress {
    pub fn new(total: usize, hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::with_draw_target(Some(total as u64), ProgressDrawTarget::hidden())
        } else {
            ProgressBar::new(total as u64)
        };
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self {
            bar,
            layer: 0,
            hidden,
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressCallback for LayerProgress {
    fn on_layer_start(&mut self, count: usize) {
        self.layer += 1;
        self.bar
            .set_message(format!("layer {} ({} entities)", self.layer, count));
    }

    fn on_entity_complete(&mut self, id: &EntityId, outcome: &str) {
        self.bar.inc(1);
        if outcome.starts_with("failed") && !self.hidden {
            let line = format!("  {} {} ({})", "✗".red(), id, ui::truncate(outcome, 80));
            self.bar.suspend(|| println!("{line}"));
        } else {
            log::debug!("{id}: {outcome}");
        }
    }

    fn on_layer_complete(&mut self) {
        log::trace!("layer {} complete", self.layer);
    }
}
