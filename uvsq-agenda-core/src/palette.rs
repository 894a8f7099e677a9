//! Event-type → colour table.
//!
//! The table is versioned and read-only once loaded. [`ColorPalette::builtin`]
//! is initialised on first use and shared process-wide.

use std::{collections::BTreeMap, path::Path, sync::OnceLock};

use serde::{Deserialize, Serialize};

use crate::{ColorToken, Error, Result};

static BUILTIN: OnceLock<ColorPalette> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorPalette {
    version: String,
    #[serde(default = "inherit")]
    default: ColorToken,
    colors: BTreeMap<String, ColorToken>,
}

const fn inherit() -> ColorToken {
    ColorToken::Inherit
}

impl ColorPalette {
    pub const BUILTIN_VERSION: &'static str = "uvsq-2024";

    pub fn new(
        version: impl Into<String>,
        default: ColorToken,
        colors: impl IntoIterator<Item = (String, ColorToken)>,
    ) -> Self {
        Self {
            version: version.into(),
            default,
            colors: colors
                .into_iter()
                .map(|(label, token)| (label.trim().to_string(), token))
                .collect(),
        }
    }

    /// Table shipped with the crate
    pub fn builtin() -> &'static Self {
        BUILTIN.get_or_init(|| {
            Self::new(
                Self::BUILTIN_VERSION,
                ColorToken::Inherit,
                [
                    ("CM", "1"),
                    ("Contrôle continu", "4"),
                    ("TD Cartable Numérique", "8"),
                    ("TD", "8"),
                ]
                .map(|(label, id)| (label.to_string(), ColorToken::Id(id.to_string()))),
            )
        })
    }

    /// Load a table from JSON: `{"version": "...", "default": null, "colors": {"CM": "1"}}`
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: Self = serde_json::from_str(json)?;
        if parsed.version.trim().is_empty() {
            return Err(Error::Config("palette version must not be empty".to_string()));
        }
        Ok(Self::new(parsed.version, parsed.default, parsed.colors))
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read palette '{}': {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub const fn default_color(&self) -> &ColorToken {
        &self.default
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &ColorToken)> {
        self.colors.iter().map(|(label, token)| (label.as_str(), token))
    }

    /// Colour of an event type; unknown or blank types get the default.
    pub fn get_color(&self, event_type: &str) -> &ColorToken {
        self.colors
            .get(event_type.trim())
            .unwrap_or(&self.default)
    }
}

impl Default for ColorPalette {
    fn default() -> Self {
        Self::builtin().clone()
    }
}
