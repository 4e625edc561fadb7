use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

impl std::fmt::Display for TermSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Space the panel currently gives its terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelGeometry {
    pub height_px: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("render surface is not laid out yet")]
    NotLaidOut,
    #[error("render surface was disposed")]
    Disposed,
}

/// The widget that draws one session's output. Escape-sequence handling,
/// scrollback and fitting to the container all live behind this trait.
pub trait RenderSurface: Send {
    /// Binds the surface to its visible container. Fails while the
    /// container has no layout yet; callers retry.
    fn try_attach(&mut self) -> Result<(), SurfaceError>;

    fn is_attached(&self) -> bool;

    fn write(&mut self, text: &str);

    /// Proposed columns and rows for the current layout, or `None` when the
    /// surface cannot be measured (hidden or not attached).
    fn fit(&mut self, geometry: PanelGeometry) -> Option<TermSize>;

    fn set_visible(&mut self, visible: bool);

    fn dispose(&mut self);
}

pub trait SurfaceFactory: Send {
    fn create(&mut self, session_id: &str, display_name: &str) -> Box<dyn RenderSurface>;
}
