//! Textual rewrites of decoded `AndroidManifest.xml`.

pub mod document;
pub mod injector;
pub mod transform;

pub use document::{Component, ComponentKind, ManifestDocument};
pub use injector::{
    ensure_launcher_activity, find_existing_class, rewrite_numeric_resource_refs,
    write_minimal_stub,
};
pub use transform::{ensure_exported, patch_sdk_levels, sdk_declaration};
