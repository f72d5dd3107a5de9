//! The concrete stages, in the order a run executes them.

use crate::manifest::{
    ensure_exported, ensure_launcher_activity, find_existing_class, patch_sdk_levels,
    rewrite_numeric_resource_refs, write_minimal_stub, ManifestDocument,
};
use crate::package::{
    check_alignment, Aligner, PackageAssembler, PackageExtractor, ResourceCompressionFixer,
    SignOutcome, Signer, MANIFEST_FILE,
};
use crate::pipeline::error::{RepackError, Result};
use crate::pipeline::result::PipelineWarning;
use crate::pipeline::stage::{RunContext, Stage};
use crate::pipeline::state::StageName;
use crate::types::{PipelineConfig, PipelineOptions};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Superclass of the generated launcher stub.
pub const LAUNCHER_SUPERCLASS: &str = "android.app.Activity";

/// Stages of a full run.
pub fn default_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(ExtractStage),
        Box::new(ManifestPatchStage),
        Box::new(RebuildStage),
        Box::new(ResourceFixStage),
        Box::new(AlignStage),
        Box::new(SignStage),
        Box::new(PublishStage),
    ]
}

pub struct ExtractStage;

#[async_trait]
impl Stage for ExtractStage {
    fn name(&self) -> StageName {
        StageName::Extract
    }

    async fn execute(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let decoded = PackageExtractor::new(ctx.config.tools.apktool.clone())
            .decode(ctx.input, ctx.workspace.path(), ctx.config.force_decode)
            .await?;
        ctx.artifacts.decoded_tree = Some(decoded);
        Ok(())
    }
}

/// Apply every manifest edit a run asks for and check the result.
pub fn patch_manifest_text(
    text: &str,
    options: &PipelineOptions,
    config: &PipelineConfig,
) -> Result<String> {
    let mut patched = if options.rewrite_numeric_resource_refs {
        rewrite_numeric_resource_refs(text, &config.fallback_label)
    } else {
        text.to_string()
    };

    patched = patch_sdk_levels(&patched, options.min_sdk, options.target_sdk)?;
    if options.inject_launcher {
        patched = ensure_launcher_activity(
            &patched,
            &options.launcher_activity_name,
            &config.launcher_theme,
        )?;
    }
    patched = ensure_exported(&patched);

    validate_patched(&patched)?;
    Ok(patched)
}

fn validate_patched(text: &str) -> Result<()> {
    let document = ManifestDocument::parse(text);
    if document.sdk_declarations != 1 {
        return Err(RepackError::ManifestPatch {
            reason: format!(
                "expected one <uses-sdk> declaration after patching, found {}",
                document.sdk_declarations
            ),
        });
    }

    let unexported = document.unexported_intent_components();
    if !unexported.is_empty() {
        let names: Vec<&str> = unexported.iter().map(|c| c.name.as_str()).collect();
        return Err(RepackError::ManifestPatch {
            reason: format!("components still lack android:exported: {}", names.join(", ")),
        });
    }
    Ok(())
}

pub struct ManifestPatchStage;

#[async_trait]
impl Stage for ManifestPatchStage {
    fn name(&self) -> StageName {
        StageName::ManifestPatch
    }

    async fn execute(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let tree = ctx.artifacts.decoded_tree(self.name())?.to_path_buf();
        let manifest_path = tree.join(MANIFEST_FILE);

        let original = tokio::fs::read_to_string(&manifest_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => RepackError::ManifestMissing {
                    path: manifest_path.clone(),
                },
                _ => RepackError::ManifestPatch {
                    reason: format!("failed to read {}: {e}", manifest_path.display()),
                },
            })?;

        let patched = patch_manifest_text(&original, ctx.options, ctx.config)?;
        if patched != original {
            tokio::fs::write(&manifest_path, &patched)
                .await
                .map_err(|e| RepackError::ManifestPatch {
                    reason: format!("failed to write {}: {e}", manifest_path.display()),
                })?;
            info!("Patched {}", manifest_path.display());
        } else {
            debug!("Manifest already satisfies every requested edit");
        }

        if ctx.options.inject_launcher {
            let document = ManifestDocument::parse(patched);
            let class_name = document.qualify(&ctx.options.launcher_activity_name);
            match find_existing_class(&tree, &class_name) {
                Some(existing) => debug!("{} already defined in {}", class_name, existing.display()),
                None => {
                    write_minimal_stub(&tree.join("smali"), &class_name, LAUNCHER_SUPERCLASS)?;
                }
            }
        }

        Ok(())
    }
}

pub struct RebuildStage;

#[async_trait]
impl Stage for RebuildStage {
    fn name(&self) -> StageName {
        StageName::Rebuild
    }

    async fn execute(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let tree = ctx.artifacts.decoded_tree(self.name())?;
        let rebuilt = PackageAssembler::new(ctx.config.tools.apktool.clone())
            .rebuild(tree, &ctx.workspace.rebuilt_apk())
            .await?;
        ctx.artifacts.rebuilt = Some(rebuilt);
        Ok(())
    }
}

pub struct ResourceFixStage;

#[async_trait]
impl Stage for ResourceFixStage {
    fn name(&self) -> StageName {
        StageName::ResourceFix
    }

    async fn execute(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let rebuilt = ctx.artifacts.rebuilt(self.name())?;
        let changed = ResourceCompressionFixer::new(&ctx.config.resource_table, ctx.config.alignment)
            .ensure_uncompressed(rebuilt, ctx.workspace.path())
            .await?;
        if changed {
            info!("Stored {} uncompressed", ctx.config.resource_table);
        }
        Ok(())
    }
}

pub struct AlignStage;

#[async_trait]
impl Stage for AlignStage {
    fn name(&self) -> StageName {
        StageName::Align
    }

    async fn execute(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let rebuilt = ctx.artifacts.rebuilt(self.name())?;
        let boundary = ctx.config.alignment;
        let aligned = Aligner::new(ctx.config.tools.zipalign.clone())
            .align(rebuilt, boundary, &ctx.workspace.aligned_apk())
            .await?;

        if ctx.config.verify_alignment {
            let archive = aligned.clone();
            let misaligned = tokio::task::spawn_blocking(move || check_alignment(&archive, boundary))
                .await
                .map_err(|e| RepackError::Align {
                    archive: aligned.clone(),
                    diagnostics: format!("Task join error: {e}"),
                })??;
            if !misaligned.is_empty() {
                return Err(RepackError::Align {
                    archive: aligned,
                    diagnostics: format!(
                        "stored members not {boundary}-byte aligned: {}",
                        misaligned.join(", ")
                    ),
                });
            }
        }

        ctx.artifacts.aligned = Some(aligned);
        Ok(())
    }
}

pub struct SignStage;

#[async_trait]
impl Stage for SignStage {
    fn name(&self) -> StageName {
        StageName::Sign
    }

    async fn execute(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let aligned = ctx.artifacts.aligned(self.name())?;
        let outcome = Signer::new(ctx.config.tools.apksigner.clone())
            .with_verification(ctx.config.verify_signature)
            .sign_with_policy(
                aligned,
                ctx.options.signing_identity.as_ref(),
                ctx.identity_provider,
                ctx.options.signing_policy,
                &ctx.workspace.signed_apk(),
            )
            .await?;

        match outcome {
            SignOutcome::Signed(signed) => {
                ctx.artifacts.final_package = Some(signed);
                ctx.artifacts.signed = true;
            }
            SignOutcome::Unsigned { artifact, reason } => {
                ctx.artifacts.final_package = Some(artifact);
                ctx.artifacts.signed = false;
                ctx.warnings.push(PipelineWarning::Unsigned { reason });
            }
        }
        Ok(())
    }
}

pub struct PublishStage;

#[async_trait]
impl Stage for PublishStage {
    fn name(&self) -> StageName {
        StageName::Publish
    }

    async fn execute(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let source = ctx.artifacts.final_package(self.name())?;
        let sha256 = publish(source, ctx.output)
            .await
            .map_err(|e| RepackError::Publish {
                output: ctx.output.to_path_buf(),
                reason: e.to_string(),
            })?;

        info!("Published {} (sha256 {})", ctx.output.display(), sha256);
        ctx.artifacts.published = Some(ctx.output.to_path_buf());
        ctx.artifacts.sha256 = Some(sha256);
        Ok(())
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".partial");
    output.with_file_name(name)
}

/// Copy next to `output` and rename into place, so readers never observe a
/// half-written package. Returns the hex digest of what was published.
async fn publish(source: &Path, output: &Path) -> std::io::Result<String> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    // Hash the staged copy; the rename must stay the last fallible step.
    let partial = partial_path(output);
    let staged = async {
        tokio::fs::copy(source, &partial).await?;
        let bytes = tokio::fs::read(&partial).await?;
        let digest = format!("{:x}", Sha256::digest(&bytes));
        tokio::fs::rename(&partial, output).await?;
        Ok::<_, std::io::Error>(digest)
    }
    .await;
    if staged.is_err() {
        if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
            warn!("Could not remove {}: {}", partial.display(), cleanup);
        }
    }
    staged
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="no"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example.app">
    <application android:label="@7f0e001b" android:icon="@7f0c0000">
        <activity android:name=".Home">
            <intent-filter>
                <action android:name="android.intent.action.VIEW"/>
            </intent-filter>
        </activity>
    </application>
</manifest>
"#;

    #[test]
    fn test_patch_manifest_text_applies_every_edit() {
        let options = PipelineOptions {
            inject_launcher: true,
            rewrite_numeric_resource_refs: true,
            ..PipelineOptions::default()
        };
        let patched = patch_manifest_text(MANIFEST, &options, &PipelineConfig::default()).unwrap();

        let document = ManifestDocument::parse(patched.as_str());
        assert_eq!(document.min_sdk, Some(24));
        assert_eq!(document.target_sdk, Some(33));
        assert!(document.references_component(".MainActivity"));
        assert!(document.unexported_intent_components().is_empty());
        assert!(patched.contains(r#"android:label="App""#));
        assert!(!patched.contains("android:icon"));
    }

    #[test]
    fn test_patch_manifest_text_is_idempotent() {
        let options = PipelineOptions {
            inject_launcher: true,
            ..PipelineOptions::default()
        };
        let config = PipelineConfig::default();
        let once = patch_manifest_text(MANIFEST, &options, &config).unwrap();
        let twice = patch_manifest_text(&once, &options, &config).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_manifest_without_application_is_rejected() {
        let err = patch_manifest_text(
            "<manifest package=\"a.b\"></manifest>",
            &PipelineOptions::default(),
            &PipelineConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "manifest_patch");
    }

    #[test]
    fn test_partial_path_is_a_sibling() {
        assert_eq!(
            partial_path(Path::new("/out/app.apk")),
            PathBuf::from("/out/app.apk.partial")
        );
    }

    #[tokio::test]
    async fn test_publish_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("signed.apk");
        std::fs::write(&source, b"abc").unwrap();
        let output = dir.path().join("nested/out/app.apk");

        let digest = publish(&source, &output).await.unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(std::fs::read(&output).unwrap(), b"abc");
        assert!(!partial_path(&output).exists());
    }

    #[tokio::test]
    async fn test_publish_digest_matches_published_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("signed.apk");
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&source, &payload).unwrap();
        let output = dir.path().join("app.apk");

        let digest = publish(&source, &output).await.unwrap();
        let published = std::fs::read(&output).unwrap();
        assert_eq!(published, payload);
        assert_eq!(digest, format!("{:x}", Sha256::digest(&published)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_publish_failed_rename_leaves_no_output_or_partial() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("signed.apk");
        std::fs::write(&source, b"abc").unwrap();
        // A non-empty directory cannot be replaced by a file.
        let output = dir.path().join("app.apk");
        std::fs::create_dir(&output).unwrap();
        std::fs::write(output.join("keep"), b"x").unwrap();

        assert!(publish(&source, &output).await.is_err());
        assert!(output.join("keep").is_file());
        assert!(!partial_path(&output).exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_manifest_is_patch_error_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("decoded");
        std::fs::create_dir(&tree).unwrap();
        std::fs::write(tree.join(MANIFEST_FILE), [0xffu8, 0xfe, 0x00, 0x3c]).unwrap();

        let config = PipelineConfig::default();
        let options = PipelineOptions::default();
        let workspace = crate::pipeline::workspace::Workspace::create(
            &crate::types::WorkspaceConfig {
                base_dir: Some(dir.path().join("workspaces")),
                keep_workspace: false,
            },
            "0123456789abcdef",
        )
        .unwrap();
        let provider = crate::package::DebugKeystoreProvider::new(config.signing.clone());
        let mut ctx = RunContext::new(
            &tree,
            &tree,
            &options,
            &config,
            &provider,
            &workspace,
        );
        ctx.artifacts.decoded_tree = Some(tree.clone());

        let err = ManifestPatchStage.execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.kind(), "manifest_patch");
        assert!(err.to_string().contains("failed to read"));

        std::fs::remove_file(tree.join(MANIFEST_FILE)).unwrap();
        let err = ManifestPatchStage.execute(&mut ctx).await.unwrap_err();
        assert!(matches!(err, RepackError::ManifestMissing { .. }));
    }

    #[tokio::test]
    async fn test_publish_missing_source_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("app.apk");
        assert!(publish(&dir.path().join("absent.apk"), &output).await.is_err());
        assert!(!output.exists());
        assert!(!partial_path(&output).exists());
    }
}
