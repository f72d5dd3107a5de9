//! Optional launcher activity injection.

use crate::manifest::document::{ManifestDocument, APPLICATION_OPEN};
use crate::pipeline::error::{RepackError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

static NUMERIC_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"android:label="@(?:0x)?[0-9a-fA-F]+""#).expect("valid regex")
});
static NUMERIC_ICON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\s*android:icon="@(?:0x)?[0-9a-fA-F]+""#).expect("valid regex")
});

const MAIN_ACTION: &str = "android.intent.action.MAIN";
const LAUNCHER_CATEGORY: &str = "android.intent.category.LAUNCHER";

fn launcher_fragment(activity_name: &str, theme: &str, indent: &str) -> String {
    let i1 = format!("{indent}    ");
    let i2 = format!("{indent}        ");
    let i3 = format!("{indent}            ");
    format!(
        "\n{i1}<activity android:name=\"{activity_name}\" android:exported=\"true\" android:theme=\"{theme}\">\
         \n{i2}<intent-filter>\
         \n{i3}<action android:name=\"{MAIN_ACTION}\"/>\
         \n{i3}<category android:name=\"{LAUNCHER_CATEGORY}\"/>\
         \n{i2}</intent-filter>\
         \n{i1}</activity>"
    )
}

/// Make sure an activity named `activity_name` exists, launchable from the
/// home screen. Inserted once, directly after the application opening tag.
pub fn ensure_launcher_activity(text: &str, activity_name: &str, theme: &str) -> Result<String> {
    let document = ManifestDocument::parse(text);
    if document.references_component(activity_name)
        || text.contains(&format!("android:name=\"{activity_name}\""))
    {
        debug!("Launcher activity {} already declared", activity_name);
        return Ok(text.to_string());
    }

    let application = APPLICATION_OPEN
        .find(text)
        .ok_or_else(|| RepackError::ManifestPatch {
            reason: "no <application> element to hold the launcher activity".to_string(),
        })?;

    let line_start = text[..application.start()].rfind('\n').map_or(0, |i| i + 1);
    let indent: String = text[line_start..application.start()]
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect();
    let fragment = launcher_fragment(activity_name, theme, &indent);

    let tag = application.as_str();
    let mut out = String::with_capacity(text.len() + fragment.len() + 32);
    out.push_str(&text[..application.start()]);
    if let Some(attrs) = tag.strip_suffix("/>") {
        out.push_str(attrs.trim_end());
        out.push('>');
        out.push_str(&fragment);
        out.push('\n');
        out.push_str(&indent);
        out.push_str("</application>");
    } else {
        out.push_str(tag);
        out.push_str(&fragment);
    }
    out.push_str(&text[application.end()..]);

    info!("Injected launcher activity {}", activity_name);
    Ok(out)
}

/// Smali source for a class whose only behaviour is delegating `onCreate` to its superclass.
pub fn minimal_stub_source(class_name: &str, superclass_name: &str) -> String {
    let class = descriptor(class_name);
    let superclass = descriptor(superclass_name);
    let source = class_name.rsplit('.').next().unwrap_or(class_name);
    format!(
        ".class public {class}
.super {superclass}
.source \"{source}.java\"


# direct methods
.method public constructor <init>()V
    .locals 0

    invoke-direct {{p0}}, {superclass}-><init>()V

    return-void
.end method


# virtual methods
.method protected onCreate(Landroid/os/Bundle;)V
    .locals 0

    invoke-super {{p0, p1}}, {superclass}->onCreate(Landroid/os/Bundle;)V

    return-void
.end method
"
    )
}

fn descriptor(class_name: &str) -> String {
    format!("L{};", class_name.replace('.', "/"))
}

/// Location of the smali file for `class_name` under a smali root.
pub fn stub_path(output_dir: &Path, class_name: &str) -> PathBuf {
    output_dir.join(format!("{}.smali", class_name.replace('.', "/")))
}

/// Write the stub unless a file for `class_name` already exists.
/// Returns whether a file was written.
pub fn write_minimal_stub(output_dir: &Path, class_name: &str, superclass_name: &str) -> Result<bool> {
    if class_name.is_empty() || class_name.starts_with('.') || class_name.contains('/') {
        return Err(RepackError::ManifestPatch {
            reason: format!("stub class name must be fully qualified, got {class_name:?}"),
        });
    }

    let path = stub_path(output_dir, class_name);
    if path.exists() {
        debug!("Stub {} already present", path.display());
        return Ok(false);
    }

    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, minimal_stub_source(class_name, superclass_name))
    };
    write().map_err(|e| RepackError::ManifestPatch {
        reason: format!("failed to write {}: {e}", path.display()),
    })?;

    info!("Wrote stub {}", path.display());
    Ok(true)
}

/// Any `smali*` root of a decoded tree that already defines `class_name`.
pub fn find_existing_class(decoded_tree: &Path, class_name: &str) -> Option<PathBuf> {
    WalkDir::new(decoded_tree)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("smali"))
        .map(|entry| stub_path(entry.path(), class_name))
        .find(|path| path.is_file())
}

/// Replace raw numeric label references with `label` and drop raw numeric icon
/// references. Decoders emit these when a resource id could not be resolved,
/// and the rebuild step rejects them.
pub fn rewrite_numeric_resource_refs(text: &str, label: &str) -> String {
    let replacement = format!("android:label=\"{label}\"");
    let relabeled = NUMERIC_LABEL.replace_all(text, regex::NoExpand(replacement.as_str()));
    NUMERIC_ICON.replace_all(&relabeled, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const THEME: &str = "@android:style/Theme.DeviceDefault.NoActionBar";

    #[test]
    fn test_injects_launcher_after_application_tag() {
        let input = "<manifest package=\"com.example\">\n    <application android:label=\"x\">\n    </application>\n</manifest>";
        let out = ensure_launcher_activity(input, ".MainActivity", THEME).unwrap();

        let app_end = out.find("android:label=\"x\">").unwrap() + "android:label=\"x\">".len();
        assert!(out[app_end..].starts_with("\n        <activity android:name=\".MainActivity\" android:exported=\"true\""));
        assert!(out.contains(MAIN_ACTION));
        assert!(out.contains(LAUNCHER_CATEGORY));
        assert!(out.contains(THEME));

        let doc = ManifestDocument::parse(out.as_str());
        assert_eq!(doc.components.len(), 1);
        assert!(doc.components[0].has_intent_filter);
        assert_eq!(doc.components[0].exported.as_deref(), Some("true"));
    }

    #[test]
    fn test_injection_is_idempotent() {
        let input = "<manifest package=\"com.example\"><application></application></manifest>";
        let once = ensure_launcher_activity(input, ".MainActivity", THEME).unwrap();
        let twice = ensure_launcher_activity(&once, ".MainActivity", THEME).unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.matches("<activity ").count(), 1);
    }

    #[test]
    fn test_existing_qualified_activity_is_reused() {
        let input = r#"<manifest package="com.example"><application><activity android:name="com.example.MainActivity"/></application></manifest>"#;
        let out = ensure_launcher_activity(input, ".MainActivity", THEME).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_self_closing_application_is_expanded() {
        let input = "<manifest>\n  <application android:label=\"x\"/>\n</manifest>";
        let out = ensure_launcher_activity(input, ".MainActivity", THEME).unwrap();
        assert!(out.contains("<application android:label=\"x\">\n      <activity"));
        assert!(out.contains("</activity>\n  </application>\n</manifest>"));
    }

    #[test]
    fn test_missing_application_is_error() {
        let err = ensure_launcher_activity("<manifest/>", ".MainActivity", THEME).unwrap_err();
        assert!(matches!(err, RepackError::ManifestPatch { .. }));
    }

    #[test]
    fn test_stub_source_shape() {
        let source = minimal_stub_source("com.example.MainActivity", "android.app.Activity");
        assert!(source.starts_with(".class public Lcom/example/MainActivity;\n.super Landroid/app/Activity;"));
        assert!(source.contains(".source \"MainActivity.java\""));
        assert!(source.contains("invoke-super {p0, p1}, Landroid/app/Activity;->onCreate(Landroid/os/Bundle;)V"));
        assert_eq!(source.matches(".method ").count(), 2);
    }

    #[test]
    fn test_write_stub_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let smali = dir.path().join("smali");

        assert!(write_minimal_stub(&smali, "com.example.MainActivity", "android.app.Activity").unwrap());
        let path = smali.join("com/example/MainActivity.smali");
        assert!(path.is_file());

        std::fs::write(&path, "# hand edited").unwrap();
        assert!(!write_minimal_stub(&smali, "com.example.MainActivity", "android.app.Activity").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# hand edited");
    }

    #[test]
    fn test_stub_rejects_relative_names() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_minimal_stub(dir.path(), ".MainActivity", "android.app.Activity").is_err());
    }

    #[test]
    fn test_find_existing_class_across_smali_roots() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("smali_classes2/com/example");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("MainActivity.smali"), ".class public Lcom/example/MainActivity;").unwrap();
        std::fs::create_dir_all(dir.path().join("smali")).unwrap();

        let found = find_existing_class(dir.path(), "com.example.MainActivity").unwrap();
        assert!(found.starts_with(dir.path().join("smali_classes2")));
        assert!(find_existing_class(dir.path(), "com.example.Other").is_none());
    }

    #[test]
    fn test_rewrite_numeric_resource_refs() {
        let input = r#"<application android:label="@2130837504" android:icon="@0x7f020000" android:theme="@style/App">"#;
        let out = rewrite_numeric_resource_refs(input, "App");
        assert_eq!(out, r#"<application android:label="App" android:theme="@style/App">"#);

        let symbolic = r#"<application android:label="@string/app_name" android:icon="@drawable/icon">"#;
        assert_eq!(rewrite_numeric_resource_refs(symbolic, "App"), symbolic);
    }
}
