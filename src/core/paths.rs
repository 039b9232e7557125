//! Path helpers: home directory, default locations, log file resolution.

use std::env;
use std::path::{Component, Path, PathBuf};

/// The current user's home directory, or the system temp dir when unknown.
#[must_use]
pub fn home_dir() -> PathBuf {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    env::var_os(var)
        .filter(|value| !value.is_empty())
        .map_or_else(
            || {
                eprintln!("[CLM-CONFIG] WARNING: {var} not set, using temp dir for default paths");
                env::temp_dir()
            },
            PathBuf::from,
        )
}

/// Where the Chia harvester writes its debug log on this platform.
#[must_use]
pub fn default_chia_log_path() -> PathBuf {
    chia_log_path_under(&home_dir())
}

fn chia_log_path_under(home: &Path) -> PathBuf {
    let chia_root = if cfg!(target_os = "macos") {
        home.join("Library")
            .join("Application Support")
            .join("Chia")
    } else {
        home.join(".chia")
    };
    chia_root.join("mainnet").join("log").join("debug.log")
}

/// `~/.config/clm/config.toml`
#[must_use]
pub fn default_config_path() -> PathBuf {
    home_dir().join(".config").join("clm").join("config.toml")
}

/// `~/.local/share/clm/activity.jsonl`
#[must_use]
pub fn default_activity_log_path() -> PathBuf {
    home_dir()
        .join(".local")
        .join("share")
        .join("clm")
        .join("activity.jsonl")
}

/// Replace a leading `~` with the home directory.
#[must_use]
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => home_dir().join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Pick the log file to monitor.
///
/// An explicit path always wins, even if it does not exist yet. Otherwise the
/// first existing path among the platform default and `fallbacks` is used,
/// and the platform default when none exist.
#[must_use]
pub fn resolve_log_file(explicit: Option<&Path>, fallbacks: &[PathBuf]) -> PathBuf {
    resolve_log_file_with(explicit, default_chia_log_path(), fallbacks, Path::exists)
}

fn resolve_log_file_with<F>(
    explicit: Option<&Path>,
    platform_default: PathBuf,
    fallbacks: &[PathBuf],
    exists: F,
) -> PathBuf
where
    F: Fn(&Path) -> bool,
{
    if let Some(path) = explicit {
        return expand_tilde(path);
    }
    std::iter::once(platform_default.clone())
        .chain(fallbacks.iter().map(|p| expand_tilde(p)))
        .find(|candidate| exists(candidate))
        .unwrap_or(platform_default)
}

/// Resolve a path to an absolute, normalized path.
///
/// Uses `fs::canonicalize` when the path exists; otherwise joins onto the CWD
/// and resolves `.`/`..` syntactically.
pub fn resolve_absolute_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    };

    if let Ok(canonical) = std::fs::canonicalize(&absolute) {
        return canonical;
    }

    normalize_syntactic(&absolute)
}

fn normalize_syntactic(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Prefix(..) | Component::RootDir | Component::Normal(_) => {
                components.push(component);
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                }
            }
        }
    }
    components.into_iter().collect()
}
