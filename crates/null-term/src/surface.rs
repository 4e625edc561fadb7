use std::io::Write;

use null_term_ui::{PanelGeometry, RenderSurface, SurfaceError, SurfaceFactory, TermSize};
use tracing::debug;

/// Approximate cell height used to turn the panel height into rows.
const CELL_HEIGHT_PX: u32 = 16;
/// Hidden tabs keep at most this much output for when they are shown again.
const MAX_BACKLOG_BYTES: usize = 256 * 1024;

/// Renders a session straight to the process's stdout. The host terminal
/// does the escape-sequence work; hidden sessions buffer their output.
pub struct StdoutSurface {
    visible: bool,
    attached: bool,
    disposed: bool,
    backlog: String,
}

impl StdoutSurface {
    pub fn new() -> Self {
        Self {
            visible: false,
            attached: false,
            disposed: false,
            backlog: String::new(),
        }
    }

    fn emit(text: &str) {
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(text.as_bytes()).and_then(|_| stdout.flush()) {
            debug!(error = %e, "stdout write failed");
        }
    }

    fn buffer(&mut self, text: &str) {
        self.backlog.push_str(text);
        if self.backlog.len() > MAX_BACKLOG_BYTES {
            let mut cut = self.backlog.len() - MAX_BACKLOG_BYTES;
            while !self.backlog.is_char_boundary(cut) {
                cut += 1;
            }
            self.backlog.drain(..cut);
        }
    }
}

impl Default for StdoutSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSurface for StdoutSurface {
    fn try_attach(&mut self) -> Result<(), SurfaceError> {
        if self.disposed {
            return Err(SurfaceError::Disposed);
        }
        if !self.visible {
            return Err(SurfaceError::NotLaidOut);
        }
        self.attached = true;
        Ok(())
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn write(&mut self, text: &str) {
        if self.disposed {
            return;
        }
        if self.visible && self.attached {
            Self::emit(text);
        } else {
            self.buffer(text);
        }
    }

    fn fit(&mut self, geometry: PanelGeometry) -> Option<TermSize> {
        if !self.visible || !self.attached {
            return None;
        }
        let (cols, term_rows) = crossterm::terminal::size().ok()?;
        Some(TermSize::new(cols, rows_for(geometry, term_rows)))
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if visible && self.attached && !self.backlog.is_empty() {
            let backlog = std::mem::take(&mut self.backlog);
            Self::emit(&backlog);
        }
    }

    fn dispose(&mut self) {
        self.disposed = true;
        self.attached = false;
        self.visible = false;
        self.backlog.clear();
    }
}

fn rows_for(geometry: PanelGeometry, term_rows: u16) -> u16 {
    let panel_rows = u16::try_from(geometry.height_px / CELL_HEIGHT_PX).unwrap_or(u16::MAX);
    panel_rows.clamp(1, term_rows.max(1))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSurfaceFactory;

impl SurfaceFactory for StdoutSurfaceFactory {
    fn create(&mut self, _session_id: &str, _display_name: &str) -> Box<dyn RenderSurface> {
        Box::new(StdoutSurface::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_follow_panel_height_within_terminal() {
        assert_eq!(rows_for(PanelGeometry { height_px: 300 }, 50), 18);
        assert_eq!(rows_for(PanelGeometry { height_px: 600 }, 24), 24);
        assert_eq!(rows_for(PanelGeometry { height_px: 0 }, 24), 1);
    }

    #[test]
    fn test_attach_requires_visibility() {
        let mut surface = StdoutSurface::new();
        assert_eq!(surface.try_attach(), Err(SurfaceError::NotLaidOut));
        surface.set_visible(true);
        assert_eq!(surface.try_attach(), Ok(()));
        assert!(surface.is_attached());
    }

    #[test]
    fn test_hidden_output_is_buffered_and_bounded() {
        let mut surface = StdoutSurface::new();
        surface.write("hello");
        assert_eq!(surface.backlog, "hello");

        surface.write(&"x".repeat(MAX_BACKLOG_BYTES));
        assert_eq!(surface.backlog.len(), MAX_BACKLOG_BYTES);
        assert!(surface.backlog.chars().all(|c| c == 'x'));
    }

    #[test]
    fn test_disposed_surface_drops_output() {
        let mut surface = StdoutSurface::new();
        surface.dispose();
        surface.write("late");
        assert!(surface.backlog.is_empty());
        assert_eq!(surface.try_attach(), Err(SurfaceError::Disposed));
    }
}
