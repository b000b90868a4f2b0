use serde::{Deserialize, Serialize};

/// Window dimensions in logical (scale-independent) units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LogicalSize {
    pub width: f64,
    pub height: f64,
}

impl LogicalSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expansion {
    #[default]
    Compact,
    Expanded,
}

impl Expansion {
    pub fn toggled(self) -> Self {
        match self {
            Expansion::Compact => Expansion::Expanded,
            Expansion::Expanded => Expansion::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Largest height ever requested, in either mode.
    pub max_height: f64,
    pub compact: LogicalSize,
    pub expanded: LogicalSize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_height: 400.0,
            compact: LogicalSize::new(360.0, 240.0),
            expanded: LogicalSize::new(480.0, 400.0),
        }
    }
}

/// Decides what size to ask the host window for.
#[derive(Debug, Clone)]
pub struct WindowFit {
    config: WindowConfig,
    expansion: Expansion,
}

impl WindowFit {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            expansion: Expansion::Compact,
        }
    }

    pub fn expansion(&self) -> Expansion {
        self.expansion
    }

    /// Size to request after a render measured at `measured`.
    ///
    /// The height follows the content up to `max_height` in both modes; while
    /// expanded the width stays at the expanded width.
    pub fn fit(&self, measured: LogicalSize) -> LogicalSize {
        let width = match self.expansion {
            Expansion::Expanded => self.config.expanded.width,
            Expansion::Compact => measured.width,
        };
        LogicalSize {
            width,
            height: clamp_height(measured.height, self.config.max_height),
        }
    }

    /// Flips between compact and expanded and returns the new fixed size.
    pub fn toggle(&mut self) -> LogicalSize {
        self.expansion = self.expansion.toggled();
        self.fixed_size()
    }

    /// Configured size for the current mode, its height capped at `max_height`.
    pub fn fixed_size(&self) -> LogicalSize {
        let size = match self.expansion {
            Expansion::Compact => self.config.compact,
            Expansion::Expanded => self.config.expanded,
        };
        LogicalSize {
            height: clamp_height(size.height, self.config.max_height),
            ..size
        }
    }
}

fn clamp_height(height: f64, max_height: f64) -> f64 {
    if height > max_height {
        max_height
    } else {
        height
    }
}
