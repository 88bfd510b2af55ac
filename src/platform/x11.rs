//! X11 window system backend (EWMH window managers)

use anyhow::{Context, Result};
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::errors::{ConnectionError, ReplyError};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use crate::constants::x11;
use crate::error::{PlacementError, PlacementResult};
use crate::platform::WindowSystem;
use crate::types::{ProcessId, Rect, WindowHandle};

/// Pre-cached X11 atoms to avoid repeated roundtrips
pub struct CachedAtoms {
    pub wm_name: Atom,
    pub net_wm_name: Atom,
    pub utf8_string: Atom,
    pub net_wm_pid: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_hidden: Atom,
    pub net_active_window: Atom,
    pub net_client_list: Atom,
    pub net_frame_extents: Atom,
}

fn intern(conn: &RustConnection, name: &str) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name.as_bytes())
        .with_context(|| format!("Failed to intern {} atom", name))?
        .reply()
        .with_context(|| format!("Failed to get reply for {} atom", name))?
        .atom)
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        // Do all intern_atom roundtrips once at startup
        Ok(Self {
            wm_name: intern(conn, "WM_NAME")?,
            net_wm_name: intern(conn, "_NET_WM_NAME")?,
            utf8_string: intern(conn, "UTF8_STRING")?,
            net_wm_pid: intern(conn, "_NET_WM_PID")?,
            net_wm_state: intern(conn, "_NET_WM_STATE")?,
            net_wm_state_hidden: intern(conn, "_NET_WM_STATE_HIDDEN")?,
            net_active_window: intern(conn, "_NET_ACTIVE_WINDOW")?,
            net_client_list: intern(conn, "_NET_CLIENT_LIST")?,
            net_frame_extents: intern(conn, "_NET_FRAME_EXTENTS")?,
        })
    }
}

/// `WindowSystem` over a live X11 connection
pub struct X11WindowSystem {
    conn: RustConnection,
    root: Window,
    atoms: CachedAtoms,
}

fn connection_failed(operation: &'static str, err: ConnectionError) -> PlacementError {
    PlacementError::os(operation, err)
}

/// X11 protocol errors on a specific window almost always mean it is gone
fn reply_failed(window: WindowHandle, operation: &'static str, err: ReplyError) -> PlacementError {
    match err {
        ReplyError::X11Error(e) if matches!(e.error_kind, x11rb::protocol::ErrorKind::Window | x11rb::protocol::ErrorKind::Drawable) => {
            PlacementError::StaleHandle { window, operation }
        }
        other => PlacementError::os(operation, other),
    }
}

impl X11WindowSystem {
    /// Connect to the display named by `DISPLAY`
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None)
            .context("Failed to connect to X11 server. Is DISPLAY set correctly?")?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        info!(
            screen = screen_num,
            width = screen.width_in_pixels,
            height = screen.height_in_pixels,
            "Connected to X11 server"
        );

        let atoms = CachedAtoms::new(&conn).context("Failed to cache X11 atoms at startup")?;
        Ok(Self { conn, root, atoms })
    }

    fn property_u32s(&self, window: Window, property: Atom, type_: impl Into<Atom>, length: u32) -> PlacementResult<Vec<u32>> {
        let reply = self
            .conn
            .get_property(false, window, property, type_, 0, length)
            .map_err(|e| connection_failed("get_property", e))?
            .reply()
            .map_err(|e| reply_failed(window, "get_property", e))?;
        Ok(reply.value32().map(|v| v.collect()).unwrap_or_default())
    }

    fn property_text(&self, window: Window, property: Atom, type_: impl Into<Atom>) -> PlacementResult<String> {
        let reply = self
            .conn
            .get_property(false, window, property, type_, 0, x11::TITLE_PROPERTY_LENGTH)
            .map_err(|e| connection_failed("get_property", e))?
            .reply()
            .map_err(|e| reply_failed(window, "get_property", e))?;
        Ok(String::from_utf8_lossy(&reply.value).into_owned())
    }

    fn query_minimized(&self, window: Window) -> PlacementResult<bool> {
        let states = self.property_u32s(window, self.atoms.net_wm_state, AtomEnum::ATOM, 1024)?;
        Ok(states.contains(&self.atoms.net_wm_state_hidden))
    }

    /// Decorations added by the WM: (left, top)
    fn frame_offset(&self, window: Window) -> (i32, i32) {
        match self.property_u32s(window, self.atoms.net_frame_extents, AtomEnum::CARDINAL, 4) {
            Ok(extents) if extents.len() == 4 => (extents[0] as i32, extents[2] as i32),
            _ => (0, 0),
        }
    }

    /// Activate (focus) a window using _NET_ACTIVE_WINDOW
    fn activate(&self, window: Window) -> PlacementResult<()> {
        // First, raise the window to top of stack
        self.conn
            .configure_window(window, &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE))
            .map_err(|e| connection_failed("raise_window", e))?;

        let event = ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window,
            type_: self.atoms.net_active_window,
            data: ClientMessageData::from([
                x11::ACTIVE_WINDOW_SOURCE_PAGER,
                x11rb::CURRENT_TIME,
                0, // Requestor's currently active window (0 = none)
                0,
                0,
            ]),
        };

        self.conn
            .send_event(
                false,
                self.root,
                EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                event,
            )
            .map_err(|e| connection_failed("send_event", e))?
            .check()
            .map_err(|e| reply_failed(window, "send_event", e))?;
        self.conn.flush().map_err(|e| connection_failed("flush", e))?;
        Ok(())
    }
}

impl WindowSystem for X11WindowSystem {
    fn enumerate_top_level_windows(&self) -> PlacementResult<Vec<WindowHandle>> {
        let clients = self.property_u32s(self.root, self.atoms.net_client_list, AtomEnum::WINDOW, u32::MAX)?;
        if !clients.is_empty() {
            return Ok(clients);
        }

        // No EWMH client list: fall back to the root's children
        debug!("_NET_CLIENT_LIST empty, falling back to query_tree");
        let tree = self
            .conn
            .query_tree(self.root)
            .map_err(|e| connection_failed("query_tree", e))?
            .reply()
            .map_err(|e| reply_failed(self.root, "query_tree", e))?;
        Ok(tree.children)
    }

    fn is_visible(&self, window: WindowHandle) -> bool {
        let viewable = self
            .conn
            .get_window_attributes(window)
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .is_some_and(|attrs| attrs.map_state == MapState::VIEWABLE);
        // Iconified windows are unmapped but still managed top-level windows
        viewable || self.is_minimized(window)
    }

    fn is_minimized(&self, window: WindowHandle) -> bool {
        self.query_minimized(window).unwrap_or(false)
    }

    fn title(&self, window: WindowHandle) -> String {
        match self.property_text(window, self.atoms.net_wm_name, self.atoms.utf8_string) {
            Ok(title) if !title.is_empty() => title,
            Ok(_) => self
                .property_text(window, self.atoms.wm_name, AtomEnum::ANY)
                .unwrap_or_default(),
            Err(e) => {
                debug!(window = window, error = %e, "Failed to read window title");
                String::new()
            }
        }
    }

    fn owning_process_id(&self, window: WindowHandle) -> Option<ProcessId> {
        let reply = self
            .conn
            .get_property(false, window, self.atoms.net_wm_pid, AtomEnum::CARDINAL, 0, 1)
            .ok()?
            .reply()
            .ok()?;
        if reply.value.len() < x11::PID_PROPERTY_SIZE {
            return None;
        }
        reply.value32()?.next()
    }

    fn rect(&self, window: WindowHandle) -> PlacementResult<Rect> {
        let geom = self
            .conn
            .get_geometry(window)
            .map_err(|e| connection_failed("get_geometry", e))?
            .reply()
            .map_err(|e| reply_failed(window, "get_geometry", e))?;
        let origin = self
            .conn
            .translate_coordinates(window, self.root, 0, 0)
            .map_err(|e| connection_failed("translate_coordinates", e))?
            .reply()
            .map_err(|e| reply_failed(window, "translate_coordinates", e))?;

        // Report the frame's top-left so that moving to the same point is a no-op
        let (left, top) = self.frame_offset(window);
        Ok(Rect::new(
            i32::from(origin.dst_x) - left,
            i32::from(origin.dst_y) - top,
            i32::from(geom.width),
            i32::from(geom.height),
        ))
    }

    fn set_bounds(&self, window: WindowHandle, bounds: Rect) -> PlacementResult<()> {
        let width = u32::try_from(bounds.width).map_err(|_| PlacementError::InvalidGeometry {
            width: bounds.width,
            height: bounds.height,
        })?;
        let height = u32::try_from(bounds.height).map_err(|_| PlacementError::InvalidGeometry {
            width: bounds.width,
            height: bounds.height,
        })?;

        let aux = ConfigureWindowAux::new()
            .x(bounds.x)
            .y(bounds.y)
            .width(width)
            .height(height);
        self.conn
            .configure_window(window, &aux)
            .map_err(|e| connection_failed("configure_window", e))?
            .check()
            .map_err(|e| reply_failed(window, "configure_window", e))?;
        self.conn.flush().map_err(|e| connection_failed("flush", e))?;
        Ok(())
    }

    fn set_foreground(&self, window: WindowHandle) -> bool {
        match self.activate(window) {
            Ok(()) => true,
            Err(e) => {
                debug!(window = window, error = %e, "Failed to activate window");
                false
            }
        }
    }

    fn restore_if_minimized(&self, window: WindowHandle) {
        if !self.is_minimized(window) {
            return;
        }
        debug!(window = window, "Restoring minimized window");
        if let Err(e) = self.conn.map_window(window).map_err(|e| connection_failed("map_window", e)) {
            debug!(window = window, error = %e, "Failed to map minimized window");
            return;
        }
        if let Err(e) = self.conn.flush() {
            debug!(window = window, error = %e, "Failed to flush after map_window");
        }
    }
}
