//! Provisioning pipeline orchestration.
//!
//! A run moves through [`ProvisionStage`]s in a fixed order:
//!
//! 1. both input files are opened and read, and the generated directory is
//!    created with its two destinations checked for writability;
//! 2. the users list is validated and the demo user appended;
//! 3. the default games list is parsed, then both headers are written;
//! 4. the image build runs to completion;
//! 5. the boot image descriptor and factory secrets are written.
//!
//! The first failure stops the run. Nothing from a later stage is touched, so
//! a failed build never leaves a fresh descriptor behind.

use crate::artefact::{Artefact, ensure_generated_dir};
use crate::builder::{Builder, CommandExecutor};
use crate::catalog::DefaultCatalog;
use crate::config::ProvisionConfig;
use crate::credentials::{
    CredentialFormatError, CredentialRecord, parse_credentials, validate_credentials,
    with_demo_user,
};
use crate::error::{ProvisionError, Result};
use crate::headers::{render_default_games, render_mesh_users};
use crate::output::write_stderr_line;
use crate::system_image::{PROJECT_DIR, render_factory_secrets, render_system_image};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};

/// Progress of a provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStage {
    /// Nothing has happened yet.
    Init,
    /// Both input files have been read.
    InputsOpened,
    /// The users list passed validation and includes the demo user.
    UsersValidated,
    /// `mesh_users.h` and `default_games.h` are on disk.
    HeadersWritten,
    /// The image build finished successfully.
    BuildInvoked,
    /// The descriptor and factory secrets are on disk.
    DescriptorsWritten,
    /// The run completed.
    Done,
    /// The run stopped with the given exit status.
    Failed(i32),
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::InputsOpened => f.write_str("inputs opened"),
            Self::UsersValidated => f.write_str("users validated"),
            Self::HeadersWritten => f.write_str("headers written"),
            Self::BuildInvoked => f.write_str("build invoked"),
            Self::DescriptorsWritten => f.write_str("descriptors written"),
            Self::Done => f.write_str("done"),
            Self::Failed(code) => write!(f, "failed ({code})"),
        }
    }
}

/// Paths of every artefact a successful run produced, in write order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Generated `mesh_users.h`.
    pub mesh_users_header: Utf8PathBuf,
    /// Generated `default_games.h`.
    pub default_games_header: Utf8PathBuf,
    /// Generated `SystemImage.bif`.
    pub system_image: Utf8PathBuf,
    /// Generated `FactorySecrets.txt`.
    pub factory_secrets: Utf8PathBuf,
}

/// Drives one provisioning run.
pub struct Pipeline<'a> {
    config: &'a ProvisionConfig,
    executor: &'a dyn CommandExecutor,
    stage: ProvisionStage,
}

impl<'a> Pipeline<'a> {
    /// Create a pipeline that builds through `executor`.
    #[must_use]
    pub fn new(config: &'a ProvisionConfig, executor: &'a dyn CommandExecutor) -> Self {
        Self {
            config,
            executor,
            stage: ProvisionStage::Init,
        }
    }

    /// The last stage reached.
    #[must_use]
    pub const fn stage(&self) -> ProvisionStage {
        self.stage
    }

    /// Provision from `users_file` and `default_file`, reporting progress to
    /// `stderr`.
    ///
    /// On failure the stage becomes [`ProvisionStage::Failed`] with the
    /// error's exit status.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProvisionError`] encountered. See
    /// [`ProvisionError::exit_code`] for how each maps to an exit status.
    pub fn run(
        &mut self,
        users_file: &Utf8Path,
        default_file: &Utf8Path,
        stderr: &mut dyn Write,
    ) -> Result<ProvisionReport> {
        let result = self.run_stages(users_file, default_file, stderr);
        if let Err(err) = &result {
            debug!(target: "pipeline", "run stopped after {}: {err}", self.stage);
            self.stage = ProvisionStage::Failed(err.exit_code());
        }
        result
    }

    fn run_stages(
        &mut self,
        users_file: &Utf8Path,
        default_file: &Utf8Path,
        stderr: &mut dyn Write,
    ) -> Result<ProvisionReport> {
        let users_text = read_users_file(users_file)?;
        let catalog_text = read_input(default_file, "default games file")?;
        self.advance(ProvisionStage::InputsOpened);

        ensure_generated_dir(&self.config.generated_dir)?;
        self.check_descriptor_destinations()?;

        let users = load_users(&users_text)?;
        self.advance(ProvisionStage::UsersValidated);

        let catalog = DefaultCatalog::parse(&catalog_text)?;
        self.write_headers(&users, &catalog, stderr)?;
        self.advance(ProvisionStage::HeadersWritten);

        self.build(stderr)?;
        self.advance(ProvisionStage::BuildInvoked);

        let (system_image, factory_secrets) = self.write_descriptors(stderr)?;
        self.advance(ProvisionStage::DescriptorsWritten);

        self.advance(ProvisionStage::Done);
        Ok(ProvisionReport {
            mesh_users_header: self.config.mesh_users_header.clone(),
            default_games_header: self.config.default_games_header.clone(),
            system_image,
            factory_secrets,
        })
    }

    fn advance(&mut self, stage: ProvisionStage) {
        info!(target: "pipeline", "{} -> {stage}", self.stage);
        self.stage = stage;
    }

    /// Fail before the build if the descriptor or secrets could not be
    /// written afterwards. Neither file is modified.
    fn check_descriptor_destinations(&self) -> Result<()> {
        Artefact::new(self.config.system_image_path(), "").check_writable()?;
        Artefact::new(self.config.factory_secrets_path(), "").check_writable()
    }

    fn write_headers(
        &self,
        users: &[CredentialRecord],
        catalog: &DefaultCatalog,
        stderr: &mut dyn Write,
    ) -> Result<()> {
        let mesh_users = Artefact::new(
            self.config.mesh_users_header.clone(),
            render_mesh_users(users),
        );
        mesh_users.write()?;
        write_stderr_line(
            stderr,
            format!("Generated mesh_users.h file: {}", mesh_users.path()),
        );

        let default_games = Artefact::new(
            self.config.default_games_header.clone(),
            render_default_games(catalog),
        );
        default_games.write()?;
        write_stderr_line(
            stderr,
            format!("Generated default_games.h file: {}", default_games.path()),
        );
        Ok(())
    }

    fn build(&self, stderr: &mut dyn Write) -> Result<()> {
        write_stderr_line(stderr, "Building Images... this may take a while!");
        Builder::new(self.executor, self.config.build.clone()).build_images()?;
        write_stderr_line(
            stderr,
            format!(
                "Done Building Images to {}",
                self.config
                    .build_output_root
                    .join(PROJECT_DIR)
                    .join("images")
            ),
        );
        Ok(())
    }

    fn write_descriptors(&self, stderr: &mut dyn Write) -> Result<(Utf8PathBuf, Utf8PathBuf)> {
        let system_image = Artefact::new(
            self.config.system_image_path(),
            render_system_image(&self.config.build_output_root),
        );
        system_image.write()?;
        write_stderr_line(
            stderr,
            format!("Generated SystemImage file: {}", system_image.path()),
        );

        let factory_secrets =
            Artefact::new(self.config.factory_secrets_path(), render_factory_secrets());
        factory_secrets.write()?;
        write_stderr_line(
            stderr,
            format!("Generated FactorySecrets file: {}", factory_secrets.path()),
        );

        Ok((
            system_image.path().to_owned(),
            factory_secrets.path().to_owned(),
        ))
    }
}

/// Validate the users list and append the demo user.
///
/// # Errors
///
/// Returns [`ProvisionError::CredentialFormat`] if any identity is too long
/// for the generated table.
pub fn load_users(contents: &str) -> Result<Vec<CredentialRecord>> {
    let records = validate_credentials(parse_credentials(contents.lines()))?;
    debug!(target: "pipeline", "accepted {} users", records.len());
    Ok(with_demo_user(records))
}

/// Open an input file for reading. A directory opens successfully on Unix
/// but cannot be read, so it is reported as an open failure here.
fn open_input(path: &Utf8Path, description: &'static str) -> Result<File> {
    let open_failure = |source| ProvisionError::InputOpen {
        description,
        path: path.to_owned(),
        source,
    };
    let file = File::open(path).map_err(open_failure)?;
    let metadata = file.metadata().map_err(open_failure)?;
    if metadata.is_dir() {
        return Err(open_failure(io::Error::new(
            io::ErrorKind::IsADirectory,
            "is a directory",
        )));
    }
    Ok(file)
}

/// Read the users file; anything that stops it being read as text is a
/// formatting problem rather than an open failure.
fn read_users_file(path: &Utf8Path) -> Result<String> {
    let mut file = open_input(path, "users text file")?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|source| CredentialFormatError::Unreadable { source })?;
    Ok(contents)
}

fn read_input(path: &Utf8Path, description: &'static str) -> Result<String> {
    let mut file = open_input(path, description)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|source| ProvisionError::InputRead {
            description,
            path: path.to_owned(),
            source,
        })?;
    Ok(contents)
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
