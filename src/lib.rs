//! apk-repack - Android package repackaging pipeline
//!
//! Decodes an application package, patches its manifest (API levels, explicit
//! component export flags, optional launcher activity), rebuilds it, stores the
//! resource table uncompressed, aligns, signs and publishes the result.
//! External work is delegated to apktool, zipalign and apksigner.

pub mod cli;
pub mod manifest;
pub mod package;
pub mod pipeline;
pub mod tools;
pub mod types;

pub use pipeline::{
    run_pipeline, Pipeline, PipelineOutcome, PipelineResult, PipelineWarning, RepackError,
    StageName,
};
pub use types::*;
