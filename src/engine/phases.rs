// src/engine/phases.rs

//! Standard phases

use super::phase::Phase;
use super::session::Session;
use crate::director::Operand;
use crate::error::{Error, Result};
use crate::hash::{Hasher, verify_digest};
use crate::metadata::{ArtifactKey, InstallableUnit};
use crate::repository::artifact::signature_path;
use crate::status::Status;
use crate::trust::CertificateChecker;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::{debug, info};

pub const COLLECT: &str = "collect";
pub const CHECK_TRUST: &str = "check-trust";
pub const UNCONFIGURE: &str = "unconfigure";
pub const UNINSTALL: &str = "uninstall";
pub const PROPERTY: &str = "property";
pub const INSTALL: &str = "install";
pub const CONFIGURE: &str = "configure";
pub const SIZING: &str = "sizing";

fn is_install(operand: &Operand) -> bool {
    matches!(operand, Operand::Install { .. })
}

fn is_uninstall(operand: &Operand) -> bool {
    matches!(operand, Operand::Uninstall { .. })
}

fn missing_artifact(key: &ArtifactKey) -> Error {
    Error::NotFoundError(format!("artifact {}", key))
}

/// Run the unit's instructions for `phase` through the session touchpoint
fn run_touchpoint(
    session: &Session<'_>,
    phase: &str,
    unit: &InstallableUnit,
    artifacts: &[PathBuf],
) -> Result<()> {
    let instructions = unit.instructions_for(phase);
    session
        .touchpoint()
        .execute(phase, unit, &instructions, artifacts)
}

/// Copy each install operand's artifacts into the session directory
///
/// Digests are verified when the source knows one; a detached signature is
/// written next to the copy for the trust check.
pub struct CollectPhase;

impl CollectPhase {
    fn collect(session: &mut Session<'_>, unit: &InstallableUnit, key: &ArtifactKey) -> Result<()> {
        let source = session
            .context()
            .artifact_source(key)?
            .ok_or_else(|| missing_artifact(key))?;
        let descriptor = source.descriptor(key)?;
        let mut reader = source.open(key)?.ok_or_else(|| missing_artifact(key))?;

        let dir = session.work_dir().join("artifacts");
        fs::create_dir_all(&dir)?;
        let dest = dir.join(key.file_name());
        let mut file = File::create(&dest)?;
        let mut hasher = Hasher::new();
        let mut buffer = [0u8; 8192];
        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            file.write_all(&buffer[..n])?;
        }
        file.flush()?;

        let size = hasher.bytes();
        let actual = hasher.finalize();
        if let Some(expected) = descriptor.and_then(|d| d.sha256) {
            verify_digest(&actual, &expected)
                .map_err(|e| Error::ChecksumMismatch(format!("{}: {}", key, e)))?;
        }
        if let Some(signature) = source.signature(key)? {
            fs::write(signature_path(&dest), signature)?;
        }

        debug!("Collected {} ({} bytes)", key, size);
        session.record_artifact(&unit.key(), dest);
        Ok(())
    }
}

impl Phase for CollectPhase {
    fn id(&self) -> &str {
        COLLECT
    }

    fn is_mutating(&self) -> bool {
        false
    }

    fn applies_to(&self, operand: &Operand) -> bool {
        is_install(operand)
    }

    fn perform(&self, session: &mut Session<'_>, operand: &Operand) -> Result<Status> {
        if let Operand::Install { unit, .. } = operand {
            for key in &unit.artifacts {
                Self::collect(session, unit, key)?;
            }
        }
        Ok(Status::ok())
    }
}

/// Evaluate trust for everything collected so far
pub struct CheckTrustPhase;

impl Phase for CheckTrustPhase {
    fn id(&self) -> &str {
        CHECK_TRUST
    }

    fn is_mutating(&self) -> bool {
        false
    }

    fn applies_to(&self, operand: &Operand) -> bool {
        is_install(operand)
    }

    fn perform(&self, _session: &mut Session<'_>, _operand: &Operand) -> Result<Status> {
        Ok(Status::ok())
    }

    fn complete(&self, session: &mut Session<'_>) -> Result<Status> {
        let trust = session.trust();
        let mut checker = CertificateChecker::new(trust.settings, trust.store.clone());
        if let Some(ref prompt) = trust.prompt {
            checker = checker.with_prompt(prompt.clone());
        }
        let mut count = 0;
        for path in session.all_artifacts() {
            checker.add(path.clone());
            count += 1;
        }
        let status = checker.start();
        info!("Trust check of {} artifact(s): {}", count, status.severity);
        Ok(status)
    }
}

pub struct UnconfigurePhase;

impl Phase for UnconfigurePhase {
    fn id(&self) -> &str {
        UNCONFIGURE
    }

    fn applies_to(&self, operand: &Operand) -> bool {
        is_uninstall(operand)
    }

    fn perform(&self, session: &mut Session<'_>, operand: &Operand) -> Result<Status> {
        if let Operand::Uninstall { unit } = operand {
            run_touchpoint(session, UNCONFIGURE, unit, &[])?;
        }
        Ok(Status::ok())
    }
}

pub struct UninstallPhase;

impl Phase for UninstallPhase {
    fn id(&self) -> &str {
        UNINSTALL
    }

    fn applies_to(&self, operand: &Operand) -> bool {
        is_uninstall(operand)
    }

    fn perform(&self, session: &mut Session<'_>, operand: &Operand) -> Result<Status> {
        if let Operand::Uninstall { unit } = operand {
            run_touchpoint(session, UNINSTALL, unit, &[])?;
            session.working_mut().remove_unit(&unit.key());
        }
        Ok(Status::ok())
    }
}

/// Apply unit and profile property changes to the working copy
pub struct PropertyPhase;

impl Phase for PropertyPhase {
    fn id(&self) -> &str {
        PROPERTY
    }

    fn applies_to(&self, operand: &Operand) -> bool {
        matches!(
            operand,
            Operand::UnitProperty { .. } | Operand::ProfileProperty { .. }
        )
    }

    fn perform(&self, session: &mut Session<'_>, operand: &Operand) -> Result<Status> {
        let working = session.working_mut();
        match operand {
            Operand::UnitProperty {
                key, name, after, ..
            } => match after {
                Some(value) => working.set_unit_property(key, name, value),
                None => working.remove_unit_property(key, name),
            },
            Operand::ProfileProperty { name, after, .. } => match after {
                Some(value) => working.set_property(name, value),
                None => working.remove_property(name),
            },
            _ => {}
        }
        Ok(Status::ok())
    }
}

pub struct InstallPhase;

impl Phase for InstallPhase {
    fn id(&self) -> &str {
        INSTALL
    }

    fn applies_to(&self, operand: &Operand) -> bool {
        is_install(operand)
    }

    fn perform(&self, session: &mut Session<'_>, operand: &Operand) -> Result<Status> {
        if let Operand::Install { unit, .. } = operand {
            let artifacts = session.artifacts(&unit.key()).to_vec();
            run_touchpoint(session, INSTALL, unit, &artifacts)?;
            session.working_mut().add_unit(unit.clone());
        }
        Ok(Status::ok())
    }
}

pub struct ConfigurePhase;

impl Phase for ConfigurePhase {
    fn id(&self) -> &str {
        CONFIGURE
    }

    fn applies_to(&self, operand: &Operand) -> bool {
        is_install(operand)
    }

    fn perform(&self, session: &mut Session<'_>, operand: &Operand) -> Result<Status> {
        if let Operand::Install { unit, .. } = operand {
            run_touchpoint(session, CONFIGURE, unit, &[])?;
        }
        Ok(Status::ok())
    }
}

/// Total the artifact sizes of every install operand
pub struct SizingPhase;

impl Phase for SizingPhase {
    fn id(&self) -> &str {
        SIZING
    }

    fn is_mutating(&self) -> bool {
        false
    }

    fn applies_to(&self, operand: &Operand) -> bool {
        is_install(operand)
    }

    fn perform(&self, session: &mut Session<'_>, operand: &Operand) -> Result<Status> {
        if let Operand::Install { unit, .. } = operand {
            for key in &unit.artifacts {
                let descriptor = session
                    .context()
                    .artifact_source(key)?
                    .and_then(|source| source.descriptor(key).transpose())
                    .transpose()?
                    .ok_or_else(|| missing_artifact(key))?;
                session.add_download_size(descriptor.size);
            }
        }
        Ok(Status::ok())
    }

    fn complete(&self, session: &mut Session<'_>) -> Result<Status> {
        Ok(Status::info(format!(
            "Download size: {} bytes",
            session.download_size()
        )))
    }
}
