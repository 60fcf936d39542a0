use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::script::ScriptFile;

/// Load all scripts from a directory, filtering by config
///
/// Every `*.toml` file in `dir` is parsed as a [`ScriptFile`]. Files that
/// cannot be read or parsed are logged and skipped. A script is skipped when
/// its own `enabled` flag is false or when `script_config` has an entry for
/// its id with `enabled = false`. Scripts come back sorted by file name.
pub fn load_scripts(dir: &Path, script_config: &HashMap<String, toml::Value>) -> Vec<ScriptFile> {
    let mut scripts = Vec::new();

    // Check if directory exists
    if !dir.exists() {
        info!(
            target: "scripting",
            "Script directory does not exist: {} (this is fine if no scripts are being used)",
            dir.display()
        );
        return scripts;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(
                target: "scripting",
                "Failed to read script directory {}: {}",
                dir.display(),
                e
            );
            return scripts;
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("toml"))
        .collect();
    paths.sort();

    for path in paths {
        let script = match ScriptFile::from_file(&path) {
            Ok(s) => s,
            Err(e) => {
                warn!(
                    target: "scripting",
                    "Failed to load script {}: {:#}",
                    path.display(),
                    e
                );
                continue;
            }
        };

        // Default to enabled if not specified in config
        let is_enabled = script_config
            .get(&script.id)
            .and_then(|config: &toml::Value| config.get("enabled"))
            .and_then(|v: &toml::Value| v.as_bool())
            .unwrap_or(true);

        if !script.enabled || !is_enabled {
            info!(
                target: "scripting",
                "Skipping disabled script: {} ({}) from {}",
                script.display_name(),
                script.id,
                path.display()
            );
            continue;
        }

        info!(
            target: "scripting",
            "Loaded script: {} ({}) from {}",
            script.display_name(),
            script.id,
            path.display()
        );
        scripts.push(script);
    }

    if scripts.is_empty() {
        info!(target: "scripting", "No scripts found in {}", dir.display());
    }

    scripts
}
