//! Mirrored compositor data and typed events
//!
//! The wire protocol uses hyphenated field names (`app-id`, `active-window-idx`);
//! the mirror uses underscored names. The rename happens here, while the
//! payload is parsed, so the store only ever sees typed values.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::codec::RawEvent;
use crate::IpcError;

/// Event names sent by fht-compositor
pub mod names {
    pub const WORKSPACES: &str = "workspaces";
    pub const ACTIVE_WORKSPACE_CHANGED: &str = "active-workspace-changed";
    pub const WORKSPACE_CHANGED: &str = "workspace-changed";
    pub const WORKSPACE_REMOVED: &str = "workspace-removed";
    pub const WINDOWS: &str = "windows";
    pub const WINDOW_CHANGED: &str = "window-changed";
    pub const WINDOW_CLOSED: &str = "window-closed";
    pub const WINDOW_FOCUSED: &str = "window-focused";

    /// Events that change workspace state
    pub const WORKSPACE_EVENTS: &[&str] = &[
        WORKSPACES,
        ACTIVE_WORKSPACE_CHANGED,
        WORKSPACE_CHANGED,
        WORKSPACE_REMOVED,
    ];

    /// Events that change window state
    pub const WINDOW_EVENTS: &[&str] = &[WINDOWS, WINDOW_CHANGED, WINDOW_CLOSED, WINDOW_FOCUSED];

    /// Every event the mirror applies
    pub const ALL: &[&str] = &[
        WORKSPACES,
        ACTIVE_WORKSPACE_CHANGED,
        WORKSPACE_CHANGED,
        WORKSPACE_REMOVED,
        WINDOWS,
        WINDOW_CHANGED,
        WINDOW_CLOSED,
        WINDOW_FOCUSED,
    ];
}

/// A workspace as mirrored from the compositor
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Workspace {
    /// Unique workspace identifier, stable for the workspace's lifetime
    pub id: u64,
    /// Name of the output (monitor) the workspace lives on
    pub output: String,
    /// Window ids on this workspace, in layout order
    pub windows: Vec<u64>,
    /// Index into `windows` of the active window
    pub active_window_idx: Option<usize>,
    /// Index into `windows` of the fullscreened window
    pub fullscreen_window_idx: Option<usize>,
    /// Master width factor
    pub mwfact: f64,
    /// Number of master windows
    pub nmaster: i32,
    /// Visible on its output. Not carried by workspace payloads; only
    /// `active-workspace-changed` sets it.
    pub is_active: bool,
    /// Holds keyboard focus. At most one workspace is focused.
    pub is_focused: bool,
}

impl Workspace {
    /// Overwrite the fields carried on the wire, keeping the activation flags
    pub(crate) fn update_from(&mut self, other: Workspace) {
        self.output = other.output;
        self.windows = other.windows;
        self.active_window_idx = other.active_window_idx;
        self.fullscreen_window_idx = other.fullscreen_window_idx;
        self.mwfact = other.mwfact;
        self.nmaster = other.nmaster;
    }

    fn from_fields(id: u64, fields: WorkspaceFields) -> Self {
        Self {
            id,
            output: fields.output,
            windows: fields.windows,
            active_window_idx: fields.active_window_idx,
            fullscreen_window_idx: fields.fullscreen_window_idx,
            mwfact: fields.mwfact,
            nmaster: fields.nmaster,
            is_active: false,
            is_focused: false,
        }
    }
}

/// A window as mirrored from the compositor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Window {
    /// Unique window identifier
    pub id: u64,
    pub title: String,
    pub app_id: String,
    /// Workspace owning the window
    pub workspace_id: u64,
    /// Width and height
    pub size: (i32, i32),
    /// X and Y
    pub location: (i32, i32),
    pub fullscreened: bool,
    pub maximized: bool,
    pub tiled: bool,
    pub activated: bool,
    /// At most one window is focused across the mirror
    pub focused: bool,
}

impl Window {
    fn from_fields(id: u64, fields: WindowFields) -> Self {
        Self {
            id,
            title: fields.title,
            app_id: fields.app_id,
            workspace_id: fields.workspace_id,
            size: fields.size,
            location: fields.location,
            fullscreened: fields.fullscreened,
            maximized: fields.maximized,
            tiled: fields.tiled,
            activated: fields.activated,
            focused: fields.focused,
        }
    }
}

/// Treat an explicit `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct WorkspaceFields {
    #[serde(deserialize_with = "null_as_default")]
    output: String,
    #[serde(deserialize_with = "null_as_default")]
    windows: Vec<u64>,
    active_window_idx: Option<usize>,
    fullscreen_window_idx: Option<usize>,
    #[serde(deserialize_with = "null_as_default")]
    mwfact: f64,
    #[serde(deserialize_with = "null_as_default")]
    nmaster: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct WindowFields {
    #[serde(deserialize_with = "null_as_default")]
    title: String,
    #[serde(deserialize_with = "null_as_default")]
    app_id: String,
    #[serde(deserialize_with = "null_as_default")]
    workspace_id: u64,
    #[serde(deserialize_with = "null_as_default")]
    size: (i32, i32),
    #[serde(deserialize_with = "null_as_default")]
    location: (i32, i32),
    #[serde(deserialize_with = "null_as_default")]
    fullscreened: bool,
    #[serde(deserialize_with = "null_as_default")]
    maximized: bool,
    #[serde(deserialize_with = "null_as_default")]
    tiled: bool,
    #[serde(deserialize_with = "null_as_default")]
    activated: bool,
    #[serde(deserialize_with = "null_as_default")]
    focused: bool,
}

#[derive(Debug, Deserialize)]
struct WorkspacePayload {
    id: u64,
    #[serde(flatten)]
    fields: WorkspaceFields,
}

#[derive(Debug, Deserialize)]
struct WindowPayload {
    id: u64,
    #[serde(flatten)]
    fields: WindowFields,
}

#[derive(Debug, Deserialize)]
struct IdPayload {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct FocusPayload {
    #[serde(default)]
    id: Option<u64>,
}

/// A decoded compositor event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Full workspace list, sorted by id
    Workspaces(Vec<Workspace>),
    ActiveWorkspaceChanged { id: u64 },
    WorkspaceChanged(Workspace),
    WorkspaceRemoved { id: u64 },
    /// Full window list
    Windows(Vec<Window>),
    WindowChanged(Window),
    WindowClosed { id: u64 },
    /// `None` means no window has focus
    WindowFocused { id: Option<u64> },
    /// An event the mirror does not track. Subscribers still receive it.
    Other(String),
}

impl Event {
    /// Convert a raw wire event into its typed form
    ///
    /// # Errors
    ///
    /// Returns `IpcError::MalformedEvent` if the payload of a known event has
    /// the wrong shape, e.g. a missing `id` or a non-numeric map key.
    pub fn from_raw(raw: &RawEvent) -> Result<Self, IpcError> {
        let malformed = |e: serde_json::Error| IpcError::malformed(format!("{}: {e}", raw.name));

        let event = match raw.name.as_str() {
            names::WORKSPACES => {
                let map = BTreeMap::<String, WorkspaceFields>::deserialize(&raw.data)
                    .map_err(malformed)?;
                let mut workspaces = map
                    .into_iter()
                    .map(|(key, fields)| {
                        Ok(Workspace::from_fields(parse_key(&raw.name, &key)?, fields))
                    })
                    .collect::<Result<Vec<_>, IpcError>>()?;
                workspaces.sort_by_key(|ws| ws.id);
                Event::Workspaces(workspaces)
            }
            names::ACTIVE_WORKSPACE_CHANGED => {
                let payload = IdPayload::deserialize(&raw.data).map_err(malformed)?;
                Event::ActiveWorkspaceChanged { id: payload.id }
            }
            names::WORKSPACE_CHANGED => {
                let payload = WorkspacePayload::deserialize(&raw.data).map_err(malformed)?;
                Event::WorkspaceChanged(Workspace::from_fields(payload.id, payload.fields))
            }
            names::WORKSPACE_REMOVED => {
                let payload = IdPayload::deserialize(&raw.data).map_err(malformed)?;
                Event::WorkspaceRemoved { id: payload.id }
            }
            names::WINDOWS => {
                let map =
                    BTreeMap::<String, WindowFields>::deserialize(&raw.data).map_err(malformed)?;
                let windows = map
                    .into_iter()
                    .map(|(key, fields)| {
                        Ok(Window::from_fields(parse_key(&raw.name, &key)?, fields))
                    })
                    .collect::<Result<Vec<_>, IpcError>>()?;
                Event::Windows(windows)
            }
            names::WINDOW_CHANGED => {
                let payload = WindowPayload::deserialize(&raw.data).map_err(malformed)?;
                Event::WindowChanged(Window::from_fields(payload.id, payload.fields))
            }
            names::WINDOW_CLOSED => {
                let payload = IdPayload::deserialize(&raw.data).map_err(malformed)?;
                Event::WindowClosed { id: payload.id }
            }
            names::WINDOW_FOCUSED => {
                let payload = FocusPayload::deserialize(&raw.data).map_err(malformed)?;
                Event::WindowFocused { id: payload.id }
            }
            other => Event::Other(other.to_string()),
        };

        Ok(event)
    }

    /// The wire name of this event
    pub fn name(&self) -> &str {
        match self {
            Event::Workspaces(_) => names::WORKSPACES,
            Event::ActiveWorkspaceChanged { .. } => names::ACTIVE_WORKSPACE_CHANGED,
            Event::WorkspaceChanged(_) => names::WORKSPACE_CHANGED,
            Event::WorkspaceRemoved { .. } => names::WORKSPACE_REMOVED,
            Event::Windows(_) => names::WINDOWS,
            Event::WindowChanged(_) => names::WINDOW_CHANGED,
            Event::WindowClosed { .. } => names::WINDOW_CLOSED,
            Event::WindowFocused { .. } => names::WINDOW_FOCUSED,
            Event::Other(name) => name,
        }
    }
}

fn parse_key(event: &str, key: &str) -> Result<u64, IpcError> {
    key.parse()
        .map_err(|_| IpcError::malformed(format!("{event}: key {key:?} is not an integer id")))
}
