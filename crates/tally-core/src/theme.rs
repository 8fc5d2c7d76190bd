use std::fmt;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::storage::{KeyValueStore, THEME_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn from_dark_flag(is_dark: bool) -> Self {
        if is_dark { Self::Dark } else { Self::Light }
    }

    /// Only the exact string `"dark"` selects the dark theme.
    pub fn from_stored(raw: &str) -> Self {
        Self::from_dark_flag(raw == "dark")
    }

    pub fn is_dark(self) -> bool {
        self == Self::Dark
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }

    pub fn storage_value(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_value())
    }
}

/// Ambient "prefers dark" signal, consulted only when nothing is stored.
pub trait ColorSchemeProbe {
    /// `None` when the environment cannot say.
    fn prefers_dark(&self) -> Option<bool>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FixedProbe(pub Option<bool>);

impl ColorSchemeProbe for FixedProbe {
    fn prefers_dark(&self) -> Option<bool> {
        self.0
    }
}

/// Reads `theme.ambient` from config, then the terminal's `COLORFGBG`.
#[derive(Debug, Clone, Default)]
pub struct EnvColorSchemeProbe {
    ambient: Option<String>,
    colorfgbg: Option<String>,
}

impl EnvColorSchemeProbe {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            ambient: cfg.get("theme.ambient"),
            colorfgbg: std::env::var("COLORFGBG").ok(),
        }
    }

    pub fn with_values(ambient: Option<&str>, colorfgbg: Option<&str>) -> Self {
        Self {
            ambient: ambient.map(str::to_string),
            colorfgbg: colorfgbg.map(str::to_string),
        }
    }
}

impl ColorSchemeProbe for EnvColorSchemeProbe {
    fn prefers_dark(&self) -> Option<bool> {
        match self
            .ambient
            .as_deref()
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            Some("dark") => return Some(true),
            Some("light") => return Some(false),
            None | Some("" | "auto") => {}
            Some(other) => {
                warn!(value = %other, "unknown theme.ambient value; treating as auto");
            }
        }

        self.colorfgbg.as_deref().and_then(dark_from_colorfgbg)
    }
}

/// `COLORFGBG` is `fg;bg` or `fg;default;bg`; the last field is the
/// background palette index.
fn dark_from_colorfgbg(raw: &str) -> Option<bool> {
    let bg: u8 = raw.rsplit(';').next()?.trim().parse().ok()?;
    Some(matches!(bg, 0..=6 | 8))
}

#[derive(Debug)]
pub struct ThemePreference<S> {
    storage: S,
    theme: Theme,
    last_persist_error: Option<String>,
}

impl<S: KeyValueStore> ThemePreference<S> {
    /// Stored value first, then the ambient probe, then light.
    ///
    /// A theme derived from the probe is not written back; only
    /// [`ThemePreference::toggle`] persists.
    #[tracing::instrument(skip_all)]
    pub fn initialize(storage: S, probe: &dyn ColorSchemeProbe) -> Self {
        let stored = match storage.read(THEME_KEY) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed reading stored theme; ignoring");
                None
            }
        };

        // An empty stored value counts as no stored value.
        let stored = stored.filter(|raw| !raw.trim().is_empty());
        let theme = match stored {
            Some(raw) => {
                debug!(stored = %raw.trim(), "using stored theme");
                Theme::from_stored(raw.trim())
            }
            None => {
                let ambient = probe.prefers_dark();
                debug!(?ambient, "no stored theme; using ambient preference");
                Theme::from_dark_flag(ambient.unwrap_or(false))
            }
        };

        info!(%theme, "theme initialized");
        Self {
            storage,
            theme,
            last_persist_error: None,
        }
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn is_dark(&self) -> bool {
        self.theme.is_dark()
    }

    #[tracing::instrument(skip(self))]
    pub fn toggle(&mut self) -> Theme {
        self.theme = self.theme.toggled();

        match self.storage.write(THEME_KEY, self.theme.storage_value()) {
            Ok(()) => {
                self.last_persist_error = None;
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(error = %message, "failed to persist theme; keeping it for this session");
                self.last_persist_error = Some(message);
            }
        }

        info!(theme = %self.theme, "theme toggled");
        self.theme
    }

    pub fn last_persist_error(&self) -> Option<&str> {
        self.last_persist_error.as_deref()
    }
}
