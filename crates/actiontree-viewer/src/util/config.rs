use actiontree_core::NodeKind;
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::graph::{Direction, LayoutConfig, ViewOptions};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub socket_path: String,
    pub direction: Direction,
    pub type_filter: Option<NodeKind>,
    pub search: String,
    pub debounce_ms: u64,
    pub node_width: f32,
    pub node_height: f32,
    pub node_gap: f32,
    pub rank_gap: f32,
    pub max_crossing_passes: usize,
    pub verbose_frames: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        let layout = LayoutConfig::default();
        Self {
            socket_path: default_socket_path(),
            direction: Direction::TopToBottom,
            type_filter: None,
            search: String::new(),
            debounce_ms: 120,
            node_width: layout.node_width,
            node_height: layout.node_height,
            node_gap: layout.node_gap,
            rank_gap: layout.rank_gap,
            max_crossing_passes: layout.max_crossing_passes,
            verbose_frames: false,
        }
    }
}

impl ViewerConfig {
    pub fn layout(&self) -> LayoutConfig {
        LayoutConfig {
            direction: self.direction,
            node_width: self.node_width,
            node_height: self.node_height,
            node_gap: self.node_gap,
            rank_gap: self.rank_gap,
            max_crossing_passes: self.max_crossing_passes,
        }
    }

    pub fn view_options(&self) -> ViewOptions {
        ViewOptions {
            direction: self.direction,
            type_filter: self.type_filter,
            search: self.search.clone(),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Copy the live view options back so `save` persists them.
    pub fn remember(&mut self, options: &ViewOptions) {
        self.direction = options.direction;
        self.type_filter = options.type_filter;
        self.search = options.search.clone();
    }
}

pub fn default_socket_path() -> String {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(dir) if !dir.trim().is_empty() => format!("{dir}/actiontree.sock"),
        _ => "/tmp/actiontree.sock".to_string(),
    }
}

pub fn config_file_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("", "", "actiontree")?;
    Some(proj.config_dir().join("viewer.toml"))
}

pub fn load_or_default() -> ViewerConfig {
    let Some(path) = config_file_path() else {
        return ViewerConfig::default();
    };
    load_or_default_from_path(&path)
}

pub fn load_or_default_from_path(path: &Path) -> ViewerConfig {
    let Ok(contents) = fs::read_to_string(path) else {
        return ViewerConfig::default();
    };
    toml::from_str(&contents).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "invalid viewer config, using defaults");
        ViewerConfig::default()
    })
}

pub fn save_to_path(cfg: &ViewerConfig, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    let data = toml::to_string_pretty(cfg).context("failed to serialize viewer config")?;
    fs::write(path, data)
        .with_context(|| format!("failed to write viewer config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn viewer_config_roundtrip_save_load() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("viewer.toml");
        let cfg = ViewerConfig {
            direction: Direction::LeftToRight,
            type_filter: Some(NodeKind::Decision),
            search: "retry".to_string(),
            ..ViewerConfig::default()
        };

        save_to_path(&cfg, &path).expect("save config");
        let loaded = load_or_default_from_path(&path);

        assert_eq!(cfg, loaded);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("viewer.toml");
        fs::write(&path, "direction = \"left_to_right\"\ndebounce_ms = 40\n").expect("write");

        let loaded = load_or_default_from_path(&path);

        assert_eq!(loaded.direction, Direction::LeftToRight);
        assert_eq!(loaded.debounce(), Duration::from_millis(40));
        assert_eq!(loaded.node_width, ViewerConfig::default().node_width);
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("viewer.toml");
        fs::write(&path, "direction = 12").expect("write");

        assert_eq!(load_or_default_from_path(&path), ViewerConfig::default());
    }
}
