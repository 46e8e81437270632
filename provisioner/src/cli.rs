//! CLI argument definitions for the MES system provisioner.
//!
//! The tool takes exactly two positional paths. Everything else about a run
//! comes from the environment; see [`crate::config`].

use camino::Utf8PathBuf;
use clap::Parser;

/// Provision an MES system image from a users list and a default games list.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "provision-system")]
#[command(about)]
#[command(long_about = concat!(
    "Provision an MES system image from a users list and a default games list.\n\n",
    "The users file is validated and written, together with the built-in demo ",
    "user, to $ECTF_UBOOT/include/mesh_users.h. The default games file is written ",
    "to $ECTF_UBOOT/include/default_games.h. PetaLinux then rebuilds the images ",
    "under $ECTF_PETALINUX/Arty-Z7-10, and on success the boot image descriptor ",
    "and factory secrets are written to files/generated.",
))]
#[command(after_help = concat!(
    "FILE FORMATS:\n",
    "  USERS_FILE     One `<username> <8-digit pin>` pair per line. Lines that do\n",
    "                 not match are ignored. Usernames are at most 15 characters.\n",
    "  DEFAULT_FILE   One `<game name> <major>.<minor>` pair per line. Blank lines\n",
    "                 are ignored; any other malformed line is an error.\n\n",
    "ENVIRONMENT:\n",
    "  ECTF_UBOOT              u-boot source root (required)\n",
    "  ECTF_PETALINUX          PetaLinux project root (required)\n",
    "  MES_GENERATED_DIR       output directory [default: files/generated]\n",
    "  MES_BUILD_TIMEOUT_SECS  abort the image build after this many seconds\n",
    "  MES_BUILD_COMMAND       shell command to run instead of petalinux-build\n",
    "  MES_PROVISION_LOG       log filter [default: warn]\n\n",
    "EXIT STATUS:\n",
    "  0  provisioning completed\n",
    "  2  a file could not be opened or the users file is misformatted\n",
    "  1  any other failure\n",
))]
pub struct Cli {
    /// Users text file.
    #[arg(value_name = "USERS_FILE")]
    pub users_file: Utf8PathBuf,

    /// Default games text file.
    #[arg(value_name = "DEFAULT_FILE")]
    pub default_file: Utf8PathBuf,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
