use std::path::{Path, PathBuf};

/// A named shortcut mapping to a stream URL.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Preset {
    pub name: String,
    pub url: String,
}

/// Ordered name → URL mapping, loaded once at start-up.
///
/// Lookup is read-only; the table is append-only at runtime (a config
/// reload may add presets, the engine itself never mutates it).  Unknown
/// names are not an error here — the resolver passes them through as
/// literal URLs.
#[derive(Debug, Clone, Default)]
pub struct PresetTable {
    presets: Vec<Preset>,
}

impl PresetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_presets(presets: Vec<Preset>) -> Self {
        Self { presets }
    }

    /// Returns the URL mapped to `name`, or `None` when the name is unknown.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.presets
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.url.as_str())
    }

    /// Appends a preset.  Earlier entries win on name collision.
    pub fn add(&mut self, name: impl Into<String>, url: impl Into<String>) {
        self.presets.push(Preset {
            name: name.into(),
            url: url.into(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.presets.iter()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Loads a preset file, picking the format by extension
    /// (`.toml` → TOML tables, anything else → `name=url` lines).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            parse_presets_from_toml_str(&content)
        } else {
            Ok(parse_presets_from_str(&content))
        }
    }
}

/// Default location of the preset file.
pub fn default_presets_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("radio")
        .join("presets.toml")
}

/// Parses `name=url` lines.  Blank lines and `#` comments are skipped;
/// malformed lines are logged and ignored rather than failing the load.
pub fn parse_presets_from_str(content: &str) -> PresetTable {
    let mut table = PresetTable::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match line.split_once('=') {
            Some((name, url)) if !name.trim().is_empty() && !url.trim().is_empty() => {
                table.add(name.trim(), url.trim());
            }
            _ => {
                tracing::warn!("presets: skipping malformed line {:?}", line);
            }
        }
    }

    table
}

// ── TOML preset loader ────────────────────────────────────────────────────────

/// Intermediate struct that matches the TOML `[[preset]]` table.  Kept
/// separate from `Preset` so the file schema can diverge from the
/// runtime struct without breaking either.
#[derive(Debug, serde::Deserialize)]
struct TomlPresetFile {
    preset: Vec<TomlPreset>,
}

#[derive(Debug, serde::Deserialize)]
struct TomlPreset {
    name: String,
    url: String,
}

pub fn parse_presets_from_toml_str(content: &str) -> anyhow::Result<PresetTable> {
    let file: TomlPresetFile = toml::from_str(content)?;
    let presets = file
        .preset
        .into_iter()
        .map(|p| Preset {
            name: p.name,
            url: p.url,
        })
        .collect();
    Ok(PresetTable::from_presets(presets))
}
