//! MES system provisioner library.
//!
//! This crate turns a users list and a default games list into the generated
//! u-boot headers, drives the PetaLinux image build, and emits the boot image
//! descriptor for an MES (MITRE Entertainment System) image. It is used by the
//! `provision-system` binary and can be driven programmatically in tests.
//!
//! # Modules
//!
//! - [`artefact`] - Generated file emission
//! - [`builder`] - PetaLinux build invocation behind an injectable executor
//! - [`catalog`] - Default games list parsing
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Environment-derived run configuration
//! - [`credentials`] - Users list classification and validation
//! - [`error`] - Error types and exit status mapping
//! - [`headers`] - `mesh_users.h` and `default_games.h` rendering
//! - [`output`] - Progress output helpers
//! - [`pipeline`] - Provisioning run orchestration
//! - [`system_image`] - Boot image descriptor and factory secrets rendering

pub mod artefact;
pub mod builder;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod error;
pub mod headers;
pub mod output;
pub mod pipeline;
pub mod system_image;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
