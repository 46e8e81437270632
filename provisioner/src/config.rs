//! Provisioning configuration resolved from the environment.
//!
//! The u-boot source tree and the PetaLinux project root come from the
//! `ECTF_UBOOT` and `ECTF_PETALINUX` variables set up by the MES development
//! VM. They are read once at start-up into a [`ProvisionConfig`], which the
//! pipeline receives explicitly; nothing else consults the environment.
//!
//! Optional overrides:
//!
//! - `MES_GENERATED_DIR` moves the descriptor and secrets output away from
//!   `files/generated`.
//! - `MES_BUILD_TIMEOUT_SECS` bounds the image build; unset means wait for as
//!   long as it takes.
//! - `MES_BUILD_COMMAND` replaces the PetaLinux build with a shell snippet.

use crate::builder::{BuildCommand, BuildConfig};
use crate::error::{ProvisionError, Result};
use crate::headers::{DEFAULT_GAMES_HEADER, MESH_USERS_HEADER};
use crate::system_image::{FACTORY_SECRETS_FILE, SYSTEM_IMAGE_FILE};
use camino::Utf8PathBuf;
use std::ffi::OsString;
use std::time::Duration;

/// Root of the MES u-boot sources; headers are written to its `include/`.
pub const UBOOT_ROOT_VAR: &str = "ECTF_UBOOT";

/// Root of the PetaLinux project tree.
pub const PETALINUX_ROOT_VAR: &str = "ECTF_PETALINUX";

/// Override for the generated-files directory.
pub const GENERATED_DIR_VAR: &str = "MES_GENERATED_DIR";

/// Optional build timeout in whole seconds.
pub const BUILD_TIMEOUT_VAR: &str = "MES_BUILD_TIMEOUT_SECS";

/// Optional shell snippet run instead of the PetaLinux build.
pub const BUILD_COMMAND_VAR: &str = "MES_BUILD_COMMAND";

/// Generated-files directory, relative to the working directory.
pub const DEFAULT_GENERATED_DIR: &str = "files/generated";

/// Everything a provisioning run needs to know about its surroundings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    /// Destination of `mesh_users.h`.
    pub mesh_users_header: Utf8PathBuf,
    /// Destination of `default_games.h`.
    pub default_games_header: Utf8PathBuf,
    /// Root the PetaLinux project and its images live under.
    pub build_output_root: Utf8PathBuf,
    /// Directory receiving the descriptor and factory secrets.
    pub generated_dir: Utf8PathBuf,
    /// How to run the image build.
    pub build: BuildConfig,
}

impl ProvisionConfig {
    /// Resolve the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Self::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Resolve the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::MissingEnv`] if `ECTF_UBOOT` or
    /// `ECTF_PETALINUX` is unset or empty, and [`ProvisionError::InvalidEnv`]
    /// if any value is not UTF-8 or the timeout is not a positive integer.
    ///
    /// # Examples
    ///
    /// ```
    /// use mes_provisioner::config::ProvisionConfig;
    /// use std::ffi::OsString;
    ///
    /// let config = ProvisionConfig::from_lookup(|name| match name {
    ///     "ECTF_UBOOT" => Some(OsString::from("/mes/u-boot")),
    ///     "ECTF_PETALINUX" => Some(OsString::from("/mes/petalinux")),
    ///     _ => None,
    /// })?;
    /// assert_eq!(config.mesh_users_header, "/mes/u-boot/include/mesh_users.h");
    /// assert_eq!(config.generated_dir, "files/generated");
    /// # Ok::<(), mes_provisioner::error::ProvisionError>(())
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let include_dir = required_path(&lookup, UBOOT_ROOT_VAR)?.join("include");
        let build_output_root = required_path(&lookup, PETALINUX_ROOT_VAR)?;
        let generated_dir = optional_value(&lookup, GENERATED_DIR_VAR)?
            .map_or_else(|| Utf8PathBuf::from(DEFAULT_GENERATED_DIR), Utf8PathBuf::from);
        let timeout = optional_value(&lookup, BUILD_TIMEOUT_VAR)?
            .map(|value| parse_timeout(&value))
            .transpose()?;
        let command = optional_value(&lookup, BUILD_COMMAND_VAR)?.map_or_else(
            || BuildCommand::petalinux(&build_output_root),
            |snippet| BuildCommand::shell(&snippet),
        );

        Ok(Self {
            mesh_users_header: include_dir.join(MESH_USERS_HEADER),
            default_games_header: include_dir.join(DEFAULT_GAMES_HEADER),
            build_output_root,
            generated_dir,
            build: BuildConfig { command, timeout },
        })
    }

    /// Destination of `SystemImage.bif`.
    #[must_use]
    pub fn system_image_path(&self) -> Utf8PathBuf {
        self.generated_dir.join(SYSTEM_IMAGE_FILE)
    }

    /// Destination of `FactorySecrets.txt`.
    #[must_use]
    pub fn factory_secrets_path(&self) -> Utf8PathBuf {
        self.generated_dir.join(FACTORY_SECRETS_FILE)
    }
}

fn required_path<F>(lookup: &F, name: &'static str) -> Result<Utf8PathBuf>
where
    F: Fn(&str) -> Option<OsString>,
{
    optional_value(lookup, name)?
        .map(Utf8PathBuf::from)
        .ok_or(ProvisionError::MissingEnv { name })
}

/// Read a variable, treating empty values as unset.
fn optional_value<F>(lookup: &F, name: &'static str) -> Result<Option<String>>
where
    F: Fn(&str) -> Option<OsString>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let value = raw.into_string().map_err(|_| ProvisionError::InvalidEnv {
        name,
        reason: "value is not valid UTF-8".to_owned(),
    })?;
    Ok(Some(value).filter(|v| !v.trim().is_empty()))
}

fn parse_timeout(value: &str) -> Result<Duration> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ProvisionError::InvalidEnv {
            name: BUILD_TIMEOUT_VAR,
            reason: format!("expected a positive number of seconds, got {value:?}"),
        }),
    }
}
