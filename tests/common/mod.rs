//! Shared fixtures: a throwaway directory with stand-in tool scripts, a
//! prebuilt package whose resource table is deflated, and a pipeline config
//! wired to both.

#![allow(dead_code)]

use apk_repack::types::{PipelineConfig, SigningIdentity, ToolSpec};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const STORE_PASS: &str = "store-secret";
pub const KEY_ALIAS: &str = "release";

pub const BASIC_MANIFEST: &str = r#"<?xml version="1.0" encoding="utf-8" standalone="no"?>
<manifest xmlns:android="http://schemas.android.com/apk/res/android" package="com.example.app">
    <uses-sdk android:minSdkVersion="16" android:targetSdkVersion="23"/>
    <application android:label="@string/app_name">
        <activity android:name=".Home">
            <intent-filter>
                <action android:name="android.intent.action.MAIN"/>
                <category android:name="android.intent.category.LAUNCHER"/>
            </intent-filter>
        </activity>
        <service android:name=".Sync"></service>
        <receiver android:name=".Boot" android:exported="false">
            <intent-filter>
                <action android:name="android.intent.action.BOOT_COMPLETED"/>
            </intent-filter>
        </receiver>
    </application>
</manifest>
"#;

pub fn resource_table() -> Vec<u8> {
    (0..2048u32).flat_map(|i| (i % 23).to_le_bytes()).collect()
}

/// Package as the rebuild step typically leaves it: everything deflated.
pub fn write_rebuilt_fixture(path: &Path) {
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file("AndroidManifest.xml", deflated).unwrap();
    writer.write_all(b"\x03\x00\x08\x00binary-manifest").unwrap();
    writer.start_file("classes.dex", deflated).unwrap();
    writer.write_all(b"dex\n035\0").unwrap();
    writer.start_file("resources.arsc", deflated).unwrap();
    writer.write_all(&resource_table()).unwrap();
    writer.finish().unwrap();
}

pub struct Harness {
    pub dir: TempDir,
    pub input: PathBuf,
    pub output: PathBuf,
    /// Copy of the manifest the rebuild step was handed.
    pub captured_manifest: PathBuf,
    /// One line per signing invocation: keystore and alias.
    pub sign_log: PathBuf,
    pub keystore: PathBuf,
    pub config: PipelineConfig,
}

impl Harness {
    pub fn new(manifest: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let input = root.join("input.apk");
        std::fs::write(&input, b"PK\x03\x04original").unwrap();
        let manifest_fixture = root.join("fixture-manifest.xml");
        std::fs::write(&manifest_fixture, manifest).unwrap();
        let rebuilt_fixture = root.join("fixture-rebuilt.apk");
        write_rebuilt_fixture(&rebuilt_fixture);
        let keystore = root.join("release.jks");
        std::fs::write(&keystore, b"keystore").unwrap();

        let mut config = PipelineConfig::default();
        config.workspace.base_dir = Some(root.join("workspaces"));
        config.signing.keystore = root.join("no-debug.keystore");

        let mut harness = Self {
            output: root.join("out").join("patched.apk"),
            captured_manifest: root.join("captured-manifest.xml"),
            sign_log: root.join("sign.log"),
            input,
            keystore,
            config,
            dir,
        };

        harness.write_tool(
            "apktool",
            &format!(
                r#"set -e
case "$1" in
  d)
    mkdir -p "$4/smali"
    cp "{manifest}" "$4/AndroidManifest.xml"
    ;;
  b)
    cp "$2/AndroidManifest.xml" "{captured}"
    cp "{rebuilt}" "$4"
    ;;
  *)
    echo "unknown command $1" >&2
    exit 2
    ;;
esac
"#,
                manifest = manifest_fixture.display(),
                captured = harness.captured_manifest.display(),
                rebuilt = rebuilt_fixture.display(),
            ),
        );
        harness.write_tool("zipalign", "set -e\ncp \"$4\" \"$5\"\n");
        harness.write_tool(
            "apksigner",
            &format!(
                r#"case "$1" in
  sign)
    [ "$APK_REPACK_KS_PASS" = "{STORE_PASS}" ] || {{ echo "Failed to load signer: keystore password was incorrect" >&2; exit 1; }}
    cp "${{12}}" "${{11}}" || exit 1
    echo "$3 $5" >> "{log}"
    : > "${{11}}.idsig"
    ;;
  verify)
    [ -f "$2.idsig" ] || {{ echo "DOES NOT VERIFY" >&2; exit 1; }}
    ;;
  *)
    exit 2
    ;;
esac
"#,
                log = harness.sign_log.display(),
            ),
        );
        harness
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn workspace_base(&self) -> PathBuf {
        self.root().join("workspaces")
    }

    /// (Re)write the stand-in for `tool` and point the config at it.
    pub fn write_tool(&mut self, tool: &str, body: &str) {
        let script = self.root().join(format!("{tool}.sh"));
        std::fs::write(&script, body).unwrap();
        let spec = ToolSpec::new("sh").with_args([script.to_string_lossy().into_owned()]);
        match tool {
            "apktool" => self.config.tools.apktool = spec,
            "zipalign" => self.config.tools.zipalign = spec,
            "apksigner" => self.config.tools.apksigner = spec,
            other => panic!("no tool slot named {other}"),
        }
    }

    pub fn identity(&self) -> SigningIdentity {
        SigningIdentity::new(&self.keystore, KEY_ALIAS, STORE_PASS, STORE_PASS)
    }

    pub fn workspaces(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.workspace_base()) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}
