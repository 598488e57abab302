//! Text and JSON output for mirrored state

use fht_mirror_ipc::{Mirror, Window, Workspace};
use serde_json::json;

/// The window a title bar would show
///
/// With `output`, the active window of the workspace visible on that output.
/// Otherwise the active window of the focused workspace.
pub fn active_window<'a>(mirror: &'a Mirror, output: Option<&str>) -> Option<&'a Window> {
    let workspace = match output {
        Some(output) => mirror.active_workspace_on(output),
        None => mirror.focused_workspace(),
    }?;
    mirror.active_window_of(workspace)
}

pub fn workspace_line(workspace: &Workspace) -> String {
    let mut line = format!(
        "{:>3}  {}  {} window{}",
        workspace.id,
        workspace.output,
        workspace.windows.len(),
        if workspace.windows.len() == 1 { "" } else { "s" }
    );
    if workspace.is_active {
        line.push_str("  active");
    }
    if workspace.is_focused {
        line.push_str("  focused");
    }
    line
}

/// One line per workspace, optionally limited to one output
pub fn workspaces(mirror: &Mirror, output: Option<&str>) -> Vec<String> {
    mirror
        .workspaces()
        .iter()
        .filter(|ws| output.map_or(true, |output| ws.output == output))
        .map(workspace_line)
        .collect()
}

pub fn workspaces_json(mirror: &Mirror, output: Option<&str>) -> serde_json::Value {
    let selected: Vec<&Workspace> = mirror
        .workspaces()
        .iter()
        .filter(|ws| output.map_or(true, |output| ws.output == output))
        .collect();
    json!(selected)
}

pub fn window_line(mirror: &Mirror, window: Option<&Window>) -> String {
    match window {
        Some(window) => {
            let mut line = if window.title.is_empty() {
                window.app_id.clone()
            } else {
                format!("{} ({})", window.title, window.app_id)
            };
            if mirror.is_solo(window) {
                line.push_str("  solo");
            }
            line
        }
        None => "No active window".to_string(),
    }
}

pub fn window_json(mirror: &Mirror, window: Option<&Window>) -> serde_json::Value {
    match window {
        Some(window) => json!({ "window": window, "solo": mirror.is_solo(window) }),
        None => json!({ "window": null, "solo": false }),
    }
}
