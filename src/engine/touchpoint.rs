// src/engine/touchpoint.rs

//! Touchpoints: the environment-specific side of install and uninstall
//!
//! Phases hand a touchpoint the unit, the instruction bodies the unit
//! declares for the phase, and (for install) the collected artifact files.
//!
//! [`DirectoryTouchpoint`] lays units out as `<root>/<id>_<version>/` and
//! understands a small instruction language: a body is a `;`-separated list
//! of `action(key:value,...)` calls.
//!
//! ```text
//! mkdir(path:bin);remove(path:cache)
//! ```

use crate::error::{Error, Result};
use crate::metadata::InstallableUnit;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Environment-specific installer
pub trait Touchpoint: Send + Sync {
    fn name(&self) -> &str;

    /// Carry out `phase` for `unit`
    fn execute(
        &self,
        phase: &str,
        unit: &InstallableUnit,
        instructions: &[&str],
        artifacts: &[PathBuf],
    ) -> Result<()>;
}

/// Touchpoint that changes nothing outside the profile
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTouchpoint;

impl Touchpoint for NullTouchpoint {
    fn name(&self) -> &str {
        "null"
    }

    fn execute(
        &self,
        phase: &str,
        unit: &InstallableUnit,
        _instructions: &[&str],
        _artifacts: &[PathBuf],
    ) -> Result<()> {
        debug!("null touchpoint: {} {}", phase, unit.key());
        Ok(())
    }
}

/// One parsed instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: String,
    pub args: BTreeMap<String, String>,
}

impl Action {
    fn arg(&self, key: &str) -> Result<&str> {
        self.args.get(key).map(String::as_str).ok_or_else(|| {
            Error::TouchpointError(format!("{}: missing argument '{}'", self.name, key))
        })
    }
}

/// Parse an instruction body into actions
pub fn parse_instructions(body: &str) -> Result<Vec<Action>> {
    let mut actions = Vec::new();
    for call in body.split(';').map(str::trim).filter(|c| !c.is_empty()) {
        let (name, rest) = call.split_once('(').ok_or_else(|| {
            Error::TouchpointError(format!("expected 'action(...)', got '{}'", call))
        })?;
        let inner = rest.strip_suffix(')').ok_or_else(|| {
            Error::TouchpointError(format!("unterminated action '{}'", call))
        })?;

        let mut args = BTreeMap::new();
        for pair in inner.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once(':').ok_or_else(|| {
                Error::TouchpointError(format!("expected 'key:value' in '{}'", call))
            })?;
            args.insert(key.trim().to_string(), value.trim().to_string());
        }
        actions.push(Action {
            name: name.trim().to_string(),
            args,
        });
    }
    Ok(actions)
}

/// Reject absolute paths and parent components
fn relative_path(path: &str) -> Result<PathBuf> {
    let path = Path::new(path);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(Error::TouchpointError(format!(
                    "path '{}' escapes the unit directory",
                    path.display()
                )));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(Error::TouchpointError("empty path".to_string()));
    }
    Ok(clean)
}

/// Installs units into per-unit directories under a root
#[derive(Debug, Clone)]
pub struct DirectoryTouchpoint {
    root: PathBuf,
}

impl DirectoryTouchpoint {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory a unit is installed into
    pub fn unit_dir(&self, unit: &InstallableUnit) -> PathBuf {
        self.root.join(format!("{}_{}", unit.id, unit.version))
    }

    fn run(&self, dir: &Path, instructions: &[&str]) -> Result<()> {
        for body in instructions {
            for action in parse_instructions(body)? {
                match action.name.as_str() {
                    "mkdir" => {
                        fs::create_dir_all(dir.join(relative_path(action.arg("path")?)?))?;
                    }
                    "remove" => {
                        let target = dir.join(relative_path(action.arg("path")?)?);
                        if target.is_dir() {
                            fs::remove_dir_all(&target)?;
                        } else if target.exists() {
                            fs::remove_file(&target)?;
                        }
                    }
                    other => {
                        return Err(Error::TouchpointError(format!("unknown action '{}'", other)));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Touchpoint for DirectoryTouchpoint {
    fn name(&self) -> &str {
        "directory"
    }

    fn execute(
        &self,
        phase: &str,
        unit: &InstallableUnit,
        instructions: &[&str],
        artifacts: &[PathBuf],
    ) -> Result<()> {
        let dir = self.unit_dir(unit);
        match phase {
            "install" => {
                fs::create_dir_all(&dir)?;
                for artifact in artifacts {
                    let Some(name) = artifact.file_name() else {
                        continue;
                    };
                    fs::copy(artifact, dir.join(name))?;
                }
                self.run(&dir, instructions)?;
                debug!("Installed {} into {}", unit.key(), dir.display());
            }
            "uninstall" => {
                if dir.exists() {
                    self.run(&dir, instructions)?;
                    fs::remove_dir_all(&dir)?;
                }
                debug!("Removed {}", dir.display());
            }
            _ => {
                if dir.exists() {
                    self.run(&dir, instructions)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::Version;
    use tempfile::TempDir;

    #[test]
    fn test_parse_instructions() {
        let actions = parse_instructions("mkdir(path:bin); remove(path: cache)").unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].name, "mkdir");
        assert_eq!(actions[1].args.get("path").unwrap(), "cache");
        assert!(parse_instructions("mkdir(path:bin").is_err());
        assert!(parse_instructions("mkdir").is_err());
    }

    #[test]
    fn test_relative_path_rejects_escape() {
        assert!(relative_path("../etc").is_err());
        assert!(relative_path("/etc").is_err());
        assert_eq!(relative_path("./a/b").unwrap(), PathBuf::from("a/b"));
    }

    #[test]
    fn test_install_and_uninstall() {
        let temp = TempDir::new().unwrap();
        let artifact = temp.path().join("payload.bin");
        fs::write(&artifact, b"payload").unwrap();

        let touchpoint = DirectoryTouchpoint::new(temp.path().join("root"));
        let unit = InstallableUnit::builder("app", Version::new(1, 0, 0))
            .build()
            .unwrap();
        touchpoint
            .execute("install", &unit, &["mkdir(path:bin)"], &[artifact])
            .unwrap();

        let dir = touchpoint.unit_dir(&unit);
        assert!(dir.ends_with("app_1.0.0"));
        assert_eq!(fs::read(dir.join("payload.bin")).unwrap(), b"payload");
        assert!(dir.join("bin").is_dir());

        touchpoint.execute("uninstall", &unit, &[], &[]).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_unknown_action_fails() {
        let temp = TempDir::new().unwrap();
        let touchpoint = DirectoryTouchpoint::new(temp.path());
        let unit = InstallableUnit::builder("app", Version::new(1, 0, 0))
            .build()
            .unwrap();
        assert!(matches!(
            touchpoint.execute("install", &unit, &["explode(now:yes)"], &[]),
            Err(Error::TouchpointError(_))
        ));
    }
}
