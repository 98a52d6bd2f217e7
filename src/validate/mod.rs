//! Validate module - round-trip checks for source data packages.
//!
//! This module provides the stages of a check:
//! - **Extract**: unpack zip and (compressed) tar archives via [`extract::extract`]
//! - **Build**: supervise `sdist` and collect archives via [`build_package`]
//! - **Install**: unpack, install and look up one archive via [`verify_install`]
//! - **Lookup**: resolve installed data packages via [`ShareTreeLookup`]
//! - **Pipeline**: batch driver via [`ValidationPipeline`]

pub mod build;
pub mod extract;
pub mod install;
pub mod lookup;
pub mod pipeline;

// Re-export commonly used types
pub use build::{build_package, find_archive, BuildError};
pub use extract::{extract, ExtractError};
pub use install::{package_name, verify_install, verify_install_in, InstallError, VerifiedInstall};
pub use lookup::ShareTreeLookup;
pub use pipeline::{PipelineError, ValidationPipeline};
