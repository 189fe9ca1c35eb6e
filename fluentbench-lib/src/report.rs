use crate::{aggregate::RunReport, config::RunConfig, dispatch::WindowResult};

/// Observer of a load run, driven from the pacing loop.
///
/// Calls never overlap and arrive in run order:
/// `on_start`, `on_probe`, then (if the probe succeeded)
/// one `on_window` per window and a final `finish`.
pub trait Reporter: Send {
    fn on_start(&mut self, cfg: &RunConfig);
    fn on_probe(&mut self, cfg: &RunConfig, ok: bool);
    fn on_window(&mut self, cfg: &RunConfig, window: &WindowResult);
    fn finish(&mut self, cfg: &RunConfig, report: &RunReport);
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn on_start(&mut self, cfg: &RunConfig) {
        (**self).on_start(cfg)
    }

    fn on_probe(&mut self, cfg: &RunConfig, ok: bool) {
        (**self).on_probe(cfg, ok)
    }

    fn on_window(&mut self, cfg: &RunConfig, window: &WindowResult) {
        (**self).on_window(cfg, window)
    }

    fn finish(&mut self, cfg: &RunConfig, report: &RunReport) {
        (**self).finish(cfg, report)
    }
}
