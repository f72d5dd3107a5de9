//! Wrappers around the container tooling: decode, rebuild, resource fix, align, sign.

pub mod aligner;
pub mod assembler;
pub mod extractor;
pub mod resources;
pub mod signer;

pub use aligner::{check_alignment, Aligner};
pub use assembler::PackageAssembler;
pub use extractor::{PackageExtractor, MANIFEST_FILE};
pub use resources::{ensure_uncompressed_resource_table, ResourceCompressionFixer};
pub use signer::{
    resolve_identity, DebugKeystoreProvider, SignOutcome, Signer, SigningIdentityProvider,
};
