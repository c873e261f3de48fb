//! Command execution for pipeline operations.
//!
//! Each subcommand maps onto exactly one pipeline stage (or the full
//! sequence for `all`). The orchestration here stays thin: load settings,
//! build the run context, call the stage, report the result.

use std::path::PathBuf;

use crate::cli::args::{Args, Command};
use crate::cli::output::OutputManager;
use crate::error::{CliError, Result};
use crate::pipeline::sign::notarize::{NotarizeConfig, Notarizer, SystemClock, XcrunNotary};
use crate::pipeline::{
    self, BuildTree, NormalizedTree, RunContext, Settings, SettingsBuilder, TargetPlatform,
    bundler, freezer, installer, normalize, sign, verify,
};

/// Executes the selected subcommand, returning the process exit code.
pub async fn execute(args: &Args) -> Result<i32> {
    let output = OutputManager::new();
    let ctx = RunContext::new(&args.work_dir, args.run_id.clone(), args.cache_dir.clone())
        .map_err(crate::error::RelkitError::Pipeline)?;

    match &args.command {
        Command::Clean => {
            ctx.clean()?;
            output.success(&format!("removed run workspace {}", ctx.run_id()));
            Ok(0)
        }

        Command::FreezeDependency => {
            let settings = load_settings(args)?;
            let descriptor = settings.dependency().ok_or_else(|| {
                CliError::InvalidArguments {
                    reason: "no [dependency] section in the manifest".into(),
                }
            })?;
            let frozen = freezer::freeze(&ctx, descriptor, settings.base_dir()).await?;
            output.artifact("frozen dependency", &frozen);
            Ok(0)
        }

        Command::Bundle => {
            let settings = load_settings(args)?;
            let bundle_dir = bundler::bundle(&ctx, &settings).await?;
            output.artifact("bundle", &bundle_dir);
            Ok(0)
        }

        Command::Archive => {
            let settings = load_settings(args)?;
            let tree = scan_bundle(&ctx)?;
            let normalized = normalize::normalize(tree)?;
            let dist = ctx.dist_dir();
            tokio::fs::create_dir_all(&dist).await?;
            let archive_path = pipeline::archive::write_archive(
                &normalized,
                &dist.join(settings.archive_name()),
            )
            .await?;
            output.artifact("archive", &archive_path);
            Ok(0)
        }

        Command::MakeInstaller => {
            let settings = load_settings(args)?;
            // The installer generator refuses a tree that has not passed
            // normalization; `archive` (or `all`) must have run first.
            let normalized = NormalizedTree::verify(scan_bundle(&ctx)?)?;
            let installer_path = installer::make_installer(&ctx, &settings, &normalized).await?;
            output.artifact("installer", &installer_path);
            Ok(0)
        }

        Command::Sign => {
            let settings = load_settings(args)?;
            let artifacts = signable_artifacts(&ctx, &settings)?;
            if artifacts.is_empty() {
                return Err(CliError::ExecutionFailed {
                    command: "sign".into(),
                    reason: format!("no artifacts in {}", ctx.dist_dir().display()),
                }
                .into());
            }
            for artifact in &artifacts {
                let sidecar = sign::sign_artifact(&ctx, &settings, artifact).await?;
                output.artifact("signed", artifact);
                if let Some(sidecar) = sidecar {
                    output.artifact("signature", &sidecar);
                }
            }
            // Embedded signatures change artifact bytes; the record must
            // cover what actually ships.
            let record = verify::write_digest_record(&ctx.dist_dir()).await?;
            output.artifact("digest record", &record);
            Ok(0)
        }

        Command::Notarize => {
            let settings = load_settings(args)?;
            if settings.target() != TargetPlatform::MacOs {
                return Err(CliError::InvalidArguments {
                    reason: "notarization applies to the macos target only".into(),
                }
                .into());
            }
            let artifact = ctx.dist_dir().join(settings.installer_name());
            if !artifact.is_file() {
                return Err(CliError::ExecutionFailed {
                    command: "notarize".into(),
                    reason: format!("no installer at {}; run make-installer and sign first", artifact.display()),
                }
                .into());
            }

            let service = XcrunNotary::from_context(&ctx)?;
            let notarizer = Notarizer::new(service, SystemClock, NotarizeConfig::default());
            let submission_id = notarizer.notarize(&artifact).await?;

            // Staple the ticket so offline hosts can validate the artifact.
            pipeline::utils::process::run_tool(
                "xcrun",
                &[
                    "stapler",
                    "staple",
                    artifact.to_str().ok_or_else(|| CliError::InvalidArguments {
                        reason: format!("path is not valid UTF-8: {}", artifact.display()),
                    })?,
                ],
                None,
                &[],
            )
            .await?;

            output.success(&format!("notarization accepted ({submission_id})"));
            Ok(0)
        }

        Command::VerifyDeterminism { with_installer } => {
            let settings = load_settings(args)?;
            let report = pipeline::determinism_check(
                &args.work_dir,
                &settings,
                *with_installer,
                args.cache_dir.clone(),
            )
            .await?;

            if report.is_empty() {
                output.success("determinism check passed: runs are byte-identical");
                Ok(0)
            } else {
                for divergence in &report {
                    output.failure(&format!(
                        "{}: {} ({} != {})",
                        divergence.path, divergence.field, divergence.value_a, divergence.value_b
                    ));
                }
                Err(crate::pipeline::Error::DeterminismMismatch { report }.into())
            }
        }

        Command::All => {
            let settings = load_settings(args)?;
            let artifacts = pipeline::package(&ctx, &settings, true).await?;
            output.artifact("archive", &artifacts.archive);
            if let Some(installer_path) = &artifacts.installer {
                output.artifact("installer", installer_path);
            }
            output.artifact("digest record", &artifacts.digest_record);
            Ok(0)
        }
    }
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut builder = SettingsBuilder::from_manifest(&args.config)?;
    if let Some(platform) = &args.platform {
        builder = builder.target(TargetPlatform::parse(platform)?);
    }
    Ok(builder.build()?)
}

fn scan_bundle(ctx: &RunContext) -> Result<BuildTree> {
    let bundle_dir = ctx.bundle_dir();
    if !bundle_dir.is_dir() {
        return Err(CliError::ExecutionFailed {
            command: "archive".into(),
            reason: format!("no bundle at {}; run bundle first", bundle_dir.display()),
        }
        .into());
    }
    Ok(BuildTree::scan(&bundle_dir)?)
}

/// Artifacts the current platform's signer applies to.
///
/// Embedded-signature formats (disk image, installer executable) are
/// signed individually; on Linux every distributable gets a detached
/// signature.
fn signable_artifacts(ctx: &RunContext, settings: &Settings) -> Result<Vec<PathBuf>> {
    let dist = ctx.dist_dir();
    let mut artifacts = Vec::new();

    match settings.target() {
        TargetPlatform::Linux => {
            if !dist.is_dir() {
                return Ok(artifacts);
            }
            let mut names: Vec<String> = std::fs::read_dir(&dist)
                .map_err(crate::pipeline::Error::Io)?
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.path().is_file())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| name != "SHA256SUMS" && !name.ends_with(".asc"))
                .collect();
            names.sort();
            artifacts.extend(names.into_iter().map(|name| dist.join(name)));
        }
        TargetPlatform::MacOs | TargetPlatform::Windows => {
            let installer_path = dist.join(settings.installer_name());
            if installer_path.is_file() {
                artifacts.push(installer_path);
            }
        }
    }

    Ok(artifacts)
}
