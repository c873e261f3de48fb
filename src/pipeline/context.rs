//! Per-run execution context.
//!
//! Every stage takes a [`RunContext`] instead of reading ambient globals:
//! the run's isolated workspace, the shared fetch cache, and the
//! environment-supplied signing credentials all travel through it.

use std::path::{Path, PathBuf};

use crate::pipeline::error::{ErrorExt, Result};

/// Environment variable naming the signing identity (keychain identity,
/// certificate subject, or GPG key id depending on platform).
pub const ENV_SIGNING_IDENTITY: &str = "RELKIT_SIGNING_IDENTITY";

/// Environment variable carrying a base64-encoded .p12 certificate for CI
/// hosts without a pre-provisioned keychain.
pub const ENV_CERTIFICATE: &str = "RELKIT_CERTIFICATE";

/// Environment variable with the certificate password.
pub const ENV_CERTIFICATE_PASSWORD: &str = "RELKIT_CERTIFICATE_PASSWORD";

/// Environment variable with the notarization keychain profile name.
pub const ENV_NOTARY_PROFILE: &str = "RELKIT_NOTARY_PROFILE";

/// Signing and notarization credentials, read from the execution
/// environment once per run. Never persisted into configuration, state
/// files or artifacts.
#[derive(Clone, Default)]
pub struct Secrets {
    /// Signing identity reference.
    pub signing_identity: Option<String>,
    /// Decoded certificate bytes, if supplied via environment.
    pub certificate: Option<Vec<u8>>,
    /// Certificate password.
    pub certificate_password: Option<String>,
    /// Notarization credential profile.
    pub notary_profile: Option<String>,
}

impl Secrets {
    /// Reads credentials from the environment.
    ///
    /// An unset variable is simply absent; a malformed certificate is an
    /// error so a misconfigured CI secret fails loudly rather than
    /// producing an unsigned release.
    pub fn from_env() -> Result<Self> {
        let certificate = match std::env::var(ENV_CERTIFICATE) {
            Ok(b64) => {
                use base64::Engine;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(b64.trim())
                    .map_err(|e| {
                        crate::pipeline::Error::Config(format!(
                            "{ENV_CERTIFICATE} is not valid base64: {e}"
                        ))
                    })?;
                Some(bytes)
            }
            Err(_) => None,
        };

        Ok(Self {
            signing_identity: std::env::var(ENV_SIGNING_IDENTITY).ok(),
            certificate,
            certificate_password: std::env::var(ENV_CERTIFICATE_PASSWORD)
                .ok()
                .map(|p| p.trim().to_string()),
            notary_profile: std::env::var(ENV_NOTARY_PROFILE).ok(),
        })
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("signing_identity", &self.signing_identity.as_deref().map(|_| "<redacted>"))
            .field("certificate", &self.certificate.as_ref().map(|_| "<redacted>"))
            .field(
                "certificate_password",
                &self.certificate_password.as_deref().map(|_| "<redacted>"),
            )
            .field("notary_profile", &self.notary_profile.as_deref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Workspace layout and credentials for one pipeline run.
///
/// All intermediate and final output lives under `runs/<run-id>/`, so
/// concurrent runs on one host never share mutable state. Only the fetch
/// cache is shared, under the freezer's flock discipline.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: String,
    run_root: PathBuf,
    cache_dir: PathBuf,
    secrets: Secrets,
}

impl RunContext {
    /// Creates a context rooted at `work_root/runs/<run_id>`.
    ///
    /// `run_id` of `None` selects the stable id `default`, which lets the
    /// discrete subcommands (`freeze-dependency`, `bundle`, ...) operate on
    /// one shared workspace across invocations.
    pub fn new(work_root: &Path, run_id: Option<String>, cache_dir: Option<PathBuf>) -> Result<Self> {
        let run_id = run_id.unwrap_or_else(|| "default".to_string());
        let run_root = work_root.join("runs").join(&run_id);
        std::fs::create_dir_all(&run_root).fs_context("creating run workspace", &run_root)?;

        let cache_dir = match cache_dir {
            Some(dir) => dir,
            None => dirs::cache_dir()
                .unwrap_or_else(|| work_root.join("cache"))
                .join("relkit"),
        };
        std::fs::create_dir_all(&cache_dir).fs_context("creating fetch cache", &cache_dir)?;

        Ok(Self {
            run_id,
            run_root,
            cache_dir,
            secrets: Secrets::from_env()?,
        })
    }

    /// Creates an isolated context with a fresh unique run id.
    ///
    /// Used by the determinism test, which needs two runs that share
    /// nothing but the read-only fetch cache.
    pub fn isolated(work_root: &Path, cache_dir: Option<PathBuf>) -> Result<Self> {
        let run_id = uuid::Uuid::new_v4().to_string();
        Self::new(work_root, Some(run_id), cache_dir)
    }

    /// Unique identifier of this run.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Root of this run's workspace.
    pub fn run_root(&self) -> &Path {
        &self.run_root
    }

    /// Shared read-only fetch cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Signing/notarization credentials for this run.
    pub fn secrets(&self) -> &Secrets {
        &self.secrets
    }

    /// Frozen-dependency output tree.
    pub fn frozen_dir(&self) -> PathBuf {
        self.run_root.join("frozen")
    }

    /// Bundle output tree.
    pub fn bundle_dir(&self) -> PathBuf {
        self.run_root.join("bundle")
    }

    /// Final artifact directory for this run.
    pub fn dist_dir(&self) -> PathBuf {
        self.run_root.join("dist")
    }

    /// A fresh private staging directory under this run's workspace.
    ///
    /// Stages build into staging and atomically rename into place on full
    /// success, so a failed stage never leaves partial output at a path a
    /// later stage would consume.
    pub fn staging_dir(&self, label: &str) -> Result<PathBuf> {
        let staging_root = self.run_root.join("staging");
        std::fs::create_dir_all(&staging_root)
            .fs_context("creating staging root", &staging_root)?;
        let dir = staging_root.join(format!("{}-{}", label, uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).fs_context("creating staging directory", &dir)?;
        Ok(dir)
    }

    /// Removes this run's workspace. The shared fetch cache is untouched.
    pub fn clean(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.run_root) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
