//! Temporary keychain for CI signing (macOS).
//!
//! CI hosts have no pre-provisioned keychain; the certificate arrives
//! base64-encoded in the environment and is imported into a throwaway
//! keychain that lives for the duration of the signing stage. The
//! keychain is deleted on drop, so credential material never outlives
//! the run.

use std::path::PathBuf;

use crate::pipeline::error::{Error, ErrorExt, Result};
use crate::pipeline::utils::process;

/// A throwaway keychain holding the imported signing certificate.
///
/// Kept alive for the duration of signing; dropping deletes the keychain.
pub struct TempKeychain {
    name: String,
    p12_path: PathBuf,
}

impl TempKeychain {
    /// Imports certificate bytes into a fresh keychain.
    pub async fn from_certificate_bytes(cert: &[u8], password: &str) -> Result<Self> {
        let name = format!("relkit-{}.keychain-db", uuid::Uuid::new_v4());

        // The .p12 has to exist on disk for `security import`; it is
        // removed again as soon as the import completes.
        let p12_path = std::env::temp_dir().join(format!("{name}.p12"));
        tokio::fs::write(&p12_path, cert)
            .await
            .fs_context("writing certificate for import", &p12_path)?;

        let keychain = Self {
            name,
            p12_path: p12_path.clone(),
        };

        let import = async {
            process::run_tool(
                "security",
                &["create-keychain", "-p", "", &keychain.name],
                None,
                &[],
            )
            .await?;
            process::run_tool(
                "security",
                &["set-keychain-settings", &keychain.name],
                None,
                &[],
            )
            .await?;
            process::run_tool("security", &["unlock-keychain", "-p", "", &keychain.name], None, &[])
                .await?;
            let p12 = p12_path
                .to_str()
                .ok_or_else(|| Error::Generic("certificate path is not valid UTF-8".into()))?;
            process::run_tool(
                "security",
                &[
                    "import",
                    p12,
                    "-k",
                    &keychain.name,
                    "-P",
                    password,
                    "-T",
                    "/usr/bin/codesign",
                ],
                None,
                &[],
            )
            .await?;
            // Let codesign use the key without a UI prompt.
            process::run_tool(
                "security",
                &[
                    "set-key-partition-list",
                    "-S",
                    "apple-tool:,apple:",
                    "-s",
                    "-k",
                    "",
                    &keychain.name,
                ],
                None,
                &[],
            )
            .await?;
            Ok::<(), Error>(())
        }
        .await;

        tokio::fs::remove_file(&p12_path).await.ok();

        match import {
            Ok(()) => {
                log::info!("✓ Certificate imported to temporary keychain");
                Ok(keychain)
            }
            Err(e) => Err(Error::Signing(format!("certificate import failed: {e}"))),
        }
    }

    /// Name of the keychain, for diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TempKeychain {
    fn drop(&mut self) {
        let _ = std::process::Command::new("security")
            .args(["delete-keychain", &self.name])
            .output();
        let _ = std::fs::remove_file(&self.p12_path);
    }
}

impl std::fmt::Debug for TempKeychain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TempKeychain").finish_non_exhaustive()
    }
}
