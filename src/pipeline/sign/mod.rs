//! Code signing.
//!
//! Signing is local, synchronous and fatal on failure. The identity is an
//! opaque capability supplied by the environment ([`crate::pipeline::context`]);
//! nothing here ever persists credential material.

pub mod keychain;
pub mod notarize;

use std::path::{Path, PathBuf};

use crate::pipeline::context::RunContext;
use crate::pipeline::error::{Error, Result};
use crate::pipeline::settings::{Settings, TargetPlatform};
use crate::pipeline::utils::process;

/// Signs one artifact in place.
///
/// Returns the path of a detached-signature sidecar when the platform
/// produces one (Linux), `None` when the signature is embedded.
pub async fn sign_artifact(
    ctx: &RunContext,
    settings: &Settings,
    artifact: &Path,
) -> Result<Option<PathBuf>> {
    let identity = ctx
        .secrets()
        .signing_identity
        .as_deref()
        .ok_or_else(|| {
            Error::Signing(format!(
                "no signing identity; set {}",
                crate::pipeline::context::ENV_SIGNING_IDENTITY
            ))
        })?;

    log::info!("Signing {}", artifact.display());

    // CI hosts supply the certificate via environment; import it into a
    // throwaway keychain that lives for the duration of the signing call.
    let _temp_keychain = match (settings.target(), &ctx.secrets().certificate) {
        (TargetPlatform::MacOs, Some(cert)) => {
            let password = ctx
                .secrets()
                .certificate_password
                .as_deref()
                .unwrap_or_default();
            Some(keychain::TempKeychain::from_certificate_bytes(cert, password).await?)
        }
        _ => None,
    };

    let result = match settings.target() {
        TargetPlatform::MacOs => sign_macos(identity, artifact).await.map(|()| None),
        TargetPlatform::Windows => sign_windows(identity, artifact).await.map(|()| None),
        TargetPlatform::Linux => sign_linux(identity, artifact).await.map(Some),
    };

    match result {
        Ok(sidecar) => {
            log::info!("✓ Signed {}", artifact.display());
            Ok(sidecar)
        }
        Err(Error::ToolInvocation { tool, status, stderr }) => Err(Error::Signing(format!(
            "{tool} exited with status {status:?}: {}",
            stderr.trim()
        ))),
        Err(Error::ToolSpawn { tool, source }) => {
            Err(Error::Signing(format!("failed to run {tool}: {source}")))
        }
        Err(other) => Err(other),
    }
}

async fn sign_macos(identity: &str, artifact: &Path) -> Result<()> {
    let path = path_str(artifact)?;
    process::run_tool(
        "codesign",
        &[
            "--force",
            "--options",
            "runtime",
            "--timestamp",
            "--sign",
            identity,
            path,
        ],
        None,
        &[],
    )
    .await?;

    // Signing that does not verify is as fatal as signing that fails.
    process::run_tool("codesign", &["--verify", "--strict", path], None, &[]).await?;
    Ok(())
}

async fn sign_windows(identity: &str, artifact: &Path) -> Result<()> {
    process::run_tool(
        "signtool",
        &[
            "sign",
            "/fd",
            "SHA256",
            "/n",
            identity,
            path_str(artifact)?,
        ],
        None,
        &[],
    )
    .await?;
    Ok(())
}

/// Detached armored signature next to the artifact.
async fn sign_linux(identity: &str, artifact: &Path) -> Result<PathBuf> {
    crate::pipeline::preflight::require(
        "gpg",
        *crate::pipeline::preflight::HAS_GPG,
        "detached artifact signatures",
    )?;
    let sidecar = PathBuf::from(format!("{}.asc", artifact.display()));
    process::run_tool(
        "gpg",
        &[
            "--batch",
            "--yes",
            "--armor",
            "--detach-sign",
            "--local-user",
            identity,
            "--output",
            path_str(&sidecar)?,
            path_str(artifact)?,
        ],
        None,
        &[],
    )
    .await?;
    Ok(sidecar)
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::Generic(format!("path is not valid UTF-8: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::settings::{
        BundleSettings, PackageSettings, SettingsBuilder, TargetPlatform,
    };

    #[tokio::test]
    async fn missing_identity_is_a_signing_error() {
        let work = tempfile::tempdir().expect("tempdir");
        let ctx = RunContext::new(work.path(), None, Some(work.path().join("cache")))
            .expect("ctx");
        // Only run the assertion when the environment carries no identity;
        // CI hosts with one configured exercise the real path elsewhere.
        if ctx.secrets().signing_identity.is_some() {
            return;
        }

        let settings = SettingsBuilder::new()
            .package(PackageSettings {
                product_name: "App".into(),
                version: "1.0.0".into(),
                ..Default::default()
            })
            .bundle(BundleSettings {
                app_dir: "app".into(),
                runtime_dir: None,
                main_binary: "app".into(),
                loader: None,
            })
            .target(TargetPlatform::Linux)
            .build()
            .expect("settings");

        let artifact = work.path().join("App-1.0.0-linux.zip");
        std::fs::write(&artifact, b"zip").expect("write");

        let err = sign_artifact(&ctx, &settings, &artifact)
            .await
            .expect_err("must fail without identity");
        assert!(matches!(err, Error::Signing(_)));
    }
}
