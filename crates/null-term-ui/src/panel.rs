use tracing::debug;

use crate::error::UiError;
use crate::manager::SessionManager;
use crate::state::LifecycleState;
use crate::surface::PanelGeometry;

pub const MIN_PANEL_HEIGHT: u32 = 100;
pub const MAX_PANEL_HEIGHT: u32 = 600;
pub const DEFAULT_PANEL_HEIGHT: u32 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: String,
    pub title: String,
    pub active: bool,
    pub state: LifecycleState,
}

/// The bottom panel: a tab strip over the session manager.
///
/// The panel keeps at least one terminal while it is mounted and shown, and
/// triggers a refit whenever it is shown or its height changes.
pub struct PanelController {
    manager: SessionManager,
    mounted: bool,
    visible: bool,
    height: u32,
}

impl PanelController {
    pub fn new(mut manager: SessionManager) -> Self {
        manager.set_geometry(PanelGeometry {
            height_px: DEFAULT_PANEL_HEIGHT,
        });
        let visible = manager.is_visible();
        Self {
            manager,
            mounted: false,
            visible,
            height: DEFAULT_PANEL_HEIGHT,
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut SessionManager {
        &mut self.manager
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the id of the terminal opened on first mount, if any.
    pub async fn mount(&mut self) -> Option<String> {
        if self.mounted {
            return None;
        }
        self.mounted = true;
        self.ensure_session().await
    }

    pub async fn new_tab(&mut self) -> String {
        self.manager.create_session().await
    }

    pub async fn close_tab(&mut self, id: &str) -> Result<(), UiError> {
        self.manager.close_session(id).await
    }

    pub async fn close_active_tab(&mut self) -> Result<(), UiError> {
        let id = self
            .manager
            .active_id()
            .map(str::to_string)
            .ok_or_else(|| UiError::NotFound("no active terminal".to_string()))?;
        self.close_tab(&id).await
    }

    pub async fn select_tab(&mut self, id: &str) -> Result<(), UiError> {
        self.manager.switch_to(id).await.map(|_| ())
    }

    /// Selects a tab by its 1-based position in the strip.
    pub async fn select_index(&mut self, position: usize) -> Result<String, UiError> {
        let id = position
            .checked_sub(1)
            .and_then(|idx| self.manager.sessions().get(idx).map(|s| s.id.clone()))
            .ok_or_else(|| UiError::NotFound(format!("tab {}", position)))?;
        self.select_tab(&id).await?;
        Ok(id)
    }

    pub async fn select_next(&mut self) -> Result<Option<String>, UiError> {
        self.select_relative(1).await
    }

    pub async fn select_prev(&mut self) -> Result<Option<String>, UiError> {
        self.select_relative(-1).await
    }

    async fn select_relative(&mut self, step: isize) -> Result<Option<String>, UiError> {
        let sessions = self.manager.sessions();
        if sessions.is_empty() {
            return Ok(None);
        }
        let len = sessions.len() as isize;
        let current = sessions.iter().position(|s| s.active).unwrap_or(0) as isize;
        let next = (current + step).rem_euclid(len) as usize;
        let id = sessions[next].id.clone();
        self.select_tab(&id).await?;
        Ok(Some(id))
    }

    /// Shows or hides the panel. Showing a mounted, empty panel opens a
    /// terminal; showing always refits the active one.
    pub async fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.manager.set_visible(visible);
        if !visible {
            return;
        }
        if self.ensure_session().await.is_none() {
            self.refit().await;
        }
    }

    pub async fn toggle(&mut self) -> bool {
        self.set_visible(!self.visible).await;
        self.visible
    }

    /// Clamps to the allowed range and refits. Returns the applied height.
    pub async fn set_height(&mut self, height_px: u32) -> u32 {
        self.height = height_px.clamp(MIN_PANEL_HEIGHT, MAX_PANEL_HEIGHT);
        self.manager.set_geometry(PanelGeometry {
            height_px: self.height,
        });
        if self.visible {
            self.refit().await;
        }
        self.height
    }

    /// Keyboard input for the active terminal.
    pub async fn input(&mut self, data: &str) -> Result<(), UiError> {
        self.manager.write_active(data).await
    }

    pub fn pump(&mut self) -> usize {
        self.manager.pump_events()
    }

    pub fn tabs(&self) -> Vec<TabInfo> {
        self.manager
            .sessions()
            .into_iter()
            .map(|session| TabInfo {
                id: session.id,
                title: session.display_name,
                active: session.active,
                state: session.state,
            })
            .collect()
    }

    /// Kills every terminal. Called when the window is going away.
    pub async fn window_closing(&mut self) -> usize {
        self.manager.close_all().await
    }

    async fn ensure_session(&mut self) -> Option<String> {
        if self.mounted && self.visible && self.manager.is_empty() {
            Some(self.manager.create_session().await)
        } else {
            None
        }
    }

    async fn refit(&mut self) {
        if let Err(err) = self.manager.resize_all().await {
            debug!(error = %err, "Refit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sleeper::MockSleeper;
    use crate::testing::{FakeSurfaceFactory, FakeTransport};

    fn panel() -> (PanelController, Arc<FakeTransport>, FakeSurfaceFactory) {
        let transport = Arc::new(FakeTransport::new());
        let surfaces = FakeSurfaceFactory::new();
        let manager = SessionManager::new(transport.clone(), Box::new(surfaces.clone()))
            .with_sleeper(Arc::new(MockSleeper::new()));
        (PanelController::new(manager), transport, surfaces)
    }

    #[tokio::test]
    async fn test_mount_opens_one_terminal() {
        let (mut panel, transport, _) = panel();

        let first = panel.mount().await;
        let again = panel.mount().await;

        assert!(first.is_some());
        assert!(again.is_none());
        assert_eq!(panel.tabs().len(), 1);
        assert_eq!(transport.spawns().len(), 1);
        assert_eq!(panel.tabs()[0].title, "Terminal 1");
    }

    #[tokio::test]
    async fn test_showing_empty_panel_opens_terminal() {
        let (mut panel, _, _) = panel();
        panel.mount().await;
        let id = panel.tabs()[0].id.clone();
        panel.close_tab(&id).await.unwrap();
        assert!(panel.tabs().is_empty());

        panel.set_visible(false).await;
        assert!(panel.tabs().is_empty());
        panel.set_visible(true).await;

        let tabs = panel.tabs();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].title, "Terminal 2");
        assert!(tabs[0].active);
    }

    #[tokio::test]
    async fn test_showing_refits_active_terminal() {
        let (mut panel, transport, surfaces) = panel();
        let id = panel.mount().await.unwrap();
        panel.set_visible(false).await;
        surfaces.view(&id).unwrap().set_size(100, 12);

        panel.set_visible(true).await;

        assert_eq!(transport.resizes_for(&id), vec![(100, 12)]);
    }

    #[tokio::test]
    async fn test_toggle_hides_and_shows_active_surface() {
        let (mut panel, _, surfaces) = panel();
        let id = panel.mount().await.unwrap();
        let view = surfaces.view(&id).unwrap();
        assert!(view.is_visible());

        assert!(!panel.toggle().await);
        assert!(!view.is_visible());
        assert!(panel.toggle().await);
        assert!(view.is_visible());
    }

    #[tokio::test]
    async fn test_height_is_clamped() {
        let (mut panel, _, _) = panel();
        assert_eq!(panel.set_height(20).await, MIN_PANEL_HEIGHT);
        assert_eq!(panel.set_height(5000).await, MAX_PANEL_HEIGHT);
        assert_eq!(panel.set_height(420).await, 420);
        assert_eq!(panel.height(), 420);
    }

    #[tokio::test]
    async fn test_height_change_refits() {
        let (mut panel, transport, surfaces) = panel();
        let id = panel.mount().await.unwrap();
        surfaces.view(&id).unwrap().set_size(80, 30);

        panel.set_height(480).await;

        assert_eq!(transport.resizes_for(&id), vec![(80, 30)]);
    }

    #[tokio::test]
    async fn test_tab_cycling_wraps() {
        let (mut panel, _, _) = panel();
        let t1 = panel.mount().await.unwrap();
        let t2 = panel.new_tab().await;
        let t3 = panel.new_tab().await;

        assert_eq!(panel.select_next().await.unwrap(), Some(t1.clone()));
        assert_eq!(panel.select_next().await.unwrap(), Some(t2.clone()));
        assert_eq!(panel.select_prev().await.unwrap(), Some(t1));
        assert_eq!(panel.select_prev().await.unwrap(), Some(t3.clone()));
        assert_eq!(panel.select_index(2).await.unwrap(), t2);
        assert!(panel.select_index(0).await.is_err());
        assert!(panel.select_index(9).await.is_err());
    }

    #[tokio::test]
    async fn test_input_goes_to_active_tab() {
        let (mut panel, transport, _) = panel();
        let t1 = panel.mount().await.unwrap();
        let t2 = panel.new_tab().await;
        panel.select_tab(&t1).await.unwrap();

        panel.input("ls\n").await.unwrap();

        assert_eq!(transport.writes_for(&t1), vec!["ls\n"]);
        assert!(transport.writes_for(&t2).is_empty());
    }

    #[tokio::test]
    async fn test_window_closing_kills_all() {
        let (mut panel, transport, _) = panel();
        let t1 = panel.mount().await.unwrap();
        let t2 = panel.new_tab().await;

        assert_eq!(panel.window_closing().await, 2);

        assert!(!transport.is_live(&t1));
        assert!(!transport.is_live(&t2));
        assert!(panel.tabs().is_empty());
    }

    #[tokio::test]
    async fn test_close_active_tab_without_tabs() {
        let (mut panel, _, _) = panel();
        assert!(matches!(
            panel.close_active_tab().await,
            Err(UiError::NotFound(_))
        ));
    }
}
