//! Execution-mode classification.
//!
//! Decides, once per request, whether a program runs inside the server
//! process or in an isolated host process, and whether it needs the host's
//! main thread (the "apartment requirement" of desktop GUI toolkits).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Kind of program, decided from the declared project type and the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectKind {
    Console,
    DesktopGui,
    HostedWeb,
}

impl ProjectKind {
    /// Map a declared project type onto the fixed vocabulary.
    ///
    /// Case-folds and strips non-alphanumerics; empty or unknown input is
    /// treated as a console program.
    pub fn from_declared(declared: &str) -> Self {
        let normalized: String = declared
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "gui" | "desktop" | "desktopgui" | "winforms" | "windowsforms" | "wpf"
            | "windowsapp" | "egui" | "eframe" | "iced" | "slint" | "winit" => Self::DesktopGui,
            "web" | "webapp" | "webapi" | "api" | "server" | "aspnet" | "aspnetcore"
            | "hostedweb" | "axum" | "http" => Self::HostedWeb,
            _ => Self::Console,
        }
    }

    /// Lowercase name used in project descriptors and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::DesktopGui => "gui",
            Self::HostedWeb => "web",
        }
    }
}

/// Where a program runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    InProcess,
    IsolatedProcess,
}

/// Result of classification. Immutable once derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionModeDecision {
    pub kind: ProjectKind,
    pub mode: ExecutionMode,
    /// Guest entry must run on the host process's main thread.
    pub requires_main_thread: bool,
}

/// Literal markers of desktop GUI toolkits.
const GUI_MARKERS: &[&str] = &[
    "eframe::run_native",
    "eframe::run_simple_native",
    "impl eframe::App for",
    "iced::run",
    "iced::application",
    "winit::event_loop::EventLoop",
    "slint::slint!",
    "fltk::app::App",
    "gtk::Application",
    "use eframe",
    "use iced",
    "use winit",
];

/// Capabilities of the machine the engine runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPlatform {
    /// Whether a desktop session is available to show windows.
    pub desktop: bool,
}

impl HostPlatform {
    /// Detect the current host.
    ///
    /// Windows and macOS always count as desktop hosts; elsewhere a display
    /// server must be advertised through `DISPLAY` or `WAYLAND_DISPLAY`.
    pub fn detect() -> Self {
        let desktop = cfg!(any(target_os = "windows", target_os = "macos"))
            || std::env::var_os("DISPLAY").is_some_and(|v| !v.is_empty())
            || std::env::var_os("WAYLAND_DISPLAY").is_some_and(|v| !v.is_empty());
        Self { desktop }
    }

    /// A headless host.
    pub fn headless() -> Self {
        Self { desktop: false }
    }

    /// A desktop-capable host.
    pub fn desktop() -> Self {
        Self { desktop: true }
    }
}

/// Whether the source contains a known desktop GUI toolkit marker.
pub fn contains_gui_marker(source: &str) -> bool {
    GUI_MARKERS.iter().any(|marker| source.contains(marker))
}

/// Classify a request.
///
/// Auto-detected GUI markers upgrade a console declaration to desktop GUI;
/// an explicit web or GUI declaration is never downgraded.
///
/// # Errors
/// Returns [`Error::UnsupportedPlatform`] for a desktop GUI program on a
/// host without a desktop session.
pub fn classify(
    declared_project_type: &str,
    source: &str,
    host: HostPlatform,
) -> Result<ExecutionModeDecision> {
    let declared = ProjectKind::from_declared(declared_project_type);
    let kind = if declared == ProjectKind::Console && contains_gui_marker(source) {
        tracing::debug!("GUI toolkit marker found; upgrading console request to desktop GUI");
        ProjectKind::DesktopGui
    } else {
        declared
    };

    if kind == ProjectKind::DesktopGui && !host.desktop {
        return Err(Error::UnsupportedPlatform(
            "desktop GUI programs need a desktop session (Windows, macOS, or a running X11/Wayland display); this host is headless".to_string(),
        ));
    }

    let decision = match kind {
        ProjectKind::DesktopGui => ExecutionModeDecision {
            kind,
            mode: ExecutionMode::IsolatedProcess,
            requires_main_thread: true,
        },
        ProjectKind::HostedWeb => ExecutionModeDecision {
            kind,
            mode: ExecutionMode::IsolatedProcess,
            requires_main_thread: false,
        },
        ProjectKind::Console => ExecutionModeDecision {
            kind,
            mode: ExecutionMode::InProcess,
            requires_main_thread: false,
        },
    };
    Ok(decision)
}
