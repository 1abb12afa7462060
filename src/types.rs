/// Requests handed to the UI thread, which owns the tray icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayCommand {
    SetTooltip(String),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Initializing,
    Ready,
    Exiting,
    Terminated,
}

impl AppState {
    /// Forward-only lifecycle; `Ready` may be skipped when startup fails.
    pub fn can_advance_to(self, next: AppState) -> bool {
        matches!(
            (self, next),
            (AppState::Initializing, AppState::Ready)
                | (AppState::Initializing, AppState::Exiting)
                | (AppState::Ready, AppState::Exiting)
                | (AppState::Exiting, AppState::Terminated)
        )
    }
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppState::Initializing => write!(f, "Initializing"),
            AppState::Ready => write!(f, "Ready"),
            AppState::Exiting => write!(f, "Exiting"),
            AppState::Terminated => write!(f, "Terminated"),
        }
    }
}
