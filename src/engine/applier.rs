//! Computes the effective target rect for a matched window and moves it

use tracing::info;

use crate::config::WindowConfig;
use crate::error::{PlacementError, PlacementResult};
use crate::platform::WindowSystem;
use crate::types::{MatchedWindow, Rect};

/// Target rect: configured values for controlled fields, current ones otherwise
pub fn effective_target(current: Rect, config: &WindowConfig) -> Rect {
    let (x, y) = if config.control_position {
        (config.x, config.y)
    } else {
        (current.x, current.y)
    };
    let (width, height) = if config.control_size {
        (config.width, config.height)
    } else {
        (current.width, current.height)
    };
    Rect::new(x, y, width, height)
}

pub struct PlacementApplier<'a> {
    windows: &'a dyn WindowSystem,
}

impl<'a> PlacementApplier<'a> {
    pub fn new(windows: &'a dyn WindowSystem) -> Self {
        Self { windows }
    }

    /// Move/resize `matched` according to `config` with one platform call.
    ///
    /// Returns the rect that was requested. A non-positive effective size is
    /// reported as `InvalidGeometry` without touching the window. Failures are
    /// not retried here; the next tick reconsiders the rule.
    pub fn apply(&self, matched: &MatchedWindow, config: &WindowConfig) -> PlacementResult<Rect> {
        let current = self.windows.rect(matched.window)?;
        let target = effective_target(current, config);
        if !target.has_positive_size() {
            return Err(PlacementError::InvalidGeometry {
                width: target.width,
                height: target.height,
            });
        }

        self.windows.set_bounds(matched.window, target)?;
        info!(
            window = matched.window,
            pid = matched.pid,
            process = %matched.image_name,
            from = %current,
            to = %target,
            "Placed window"
        );
        Ok(target)
    }
}
