//! Unit tests for pipeline orchestration.
//!
//! Each test provisions into a scratch directory laid out like the MES
//! development VM, with the image build replaced by a `StubExecutor`.

use super::*;
use crate::builder::{BuildCommand, BuildConfig};
use crate::catalog::CatalogError;
use crate::test_utils::{ExpectedCall, StubExecutor, failure_output, success_output};
use rstest::{fixture, rstest};
use std::fs;
use std::process::Output;
use std::time::Duration;
use tempfile::TempDir;

const USERS: &str = "alice 12345678\n# comment\nbob 87654321";
const DEFAULT_GAMES: &str = "chess 1.2\n\nbattleship 3.0\n";

/// Scratch layout holding both inputs, the u-boot include directory, and
/// the generated-files directory.
struct Sandbox {
    _temp: TempDir,
    root: Utf8PathBuf,
    config: ProvisionConfig,
}

impl Sandbox {
    fn new() -> Self {
        let temp = TempDir::new().expect("failed to create temp dir");
        let root =
            Utf8PathBuf::try_from(temp.path().to_owned()).expect("temp dir should be UTF-8");
        let include = root.join("u-boot").join("include");
        fs::create_dir_all(&include).expect("failed to create include dir");

        let config = ProvisionConfig {
            mesh_users_header: include.join("mesh_users.h"),
            default_games_header: include.join("default_games.h"),
            build_output_root: root.join("petalinux"),
            generated_dir: root.join("files").join("generated"),
            build: BuildConfig {
                command: BuildCommand::shell("make images"),
                timeout: None,
            },
        };

        let sandbox = Self {
            _temp: temp,
            root,
            config,
        };
        sandbox.write_input("users.txt", USERS);
        sandbox.write_input("default.txt", DEFAULT_GAMES);
        sandbox
    }

    fn write_input(&self, name: &str, contents: impl AsRef<[u8]>) {
        fs::write(self.root.join(name), contents).expect("failed to write input");
    }

    fn users(&self) -> Utf8PathBuf {
        self.root.join("users.txt")
    }

    fn default_games(&self) -> Utf8PathBuf {
        self.root.join("default.txt")
    }

    fn build_succeeds(&self) -> StubExecutor {
        StubExecutor::new(vec![ExpectedCall::new(
            self.config.build.command.clone(),
            Ok(success_output()),
        )])
    }

    fn build_fails(&self) -> StubExecutor {
        StubExecutor::new(vec![ExpectedCall::new(
            self.config.build.command.clone(),
            Ok(failure_output("ERROR: Failed to build linux\n")),
        )])
    }
}

/// Run a pipeline over the sandbox inputs and capture progress output.
fn provision(
    sandbox: &Sandbox,
    executor: &dyn CommandExecutor,
) -> (ProvisionStage, Result<ProvisionReport>, String) {
    let mut stderr = Vec::new();
    let mut pipeline = Pipeline::new(&sandbox.config, executor);
    let result = pipeline.run(&sandbox.users(), &sandbox.default_games(), &mut stderr);
    let progress = String::from_utf8(stderr).expect("progress output should be UTF-8");
    (pipeline.stage(), result, progress)
}

fn read(path: &Utf8Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("failed to read {path}: {err}"))
}

/// A build that succeeds but leaves a directory where the boot image
/// descriptor should go.
struct BuildClobbersDescriptor {
    descriptor: Utf8PathBuf,
}

impl CommandExecutor for BuildClobbersDescriptor {
    fn run(&self, _: &BuildCommand, _: Option<Duration>) -> Result<Output> {
        fs::create_dir(&self.descriptor).expect("failed to create blocking dir");
        Ok(success_output())
    }
}

#[fixture]
fn sandbox() -> Sandbox {
    Sandbox::new()
}

#[rstest]
fn successful_run_writes_every_artefact(sandbox: Sandbox) {
    let executor = sandbox.build_succeeds();

    let (stage, result, _) = provision(&sandbox, &executor);
    let report = result.expect("provisioning should succeed");

    executor.assert_finished();
    assert_eq!(stage, ProvisionStage::Done);

    let users = vec![
        CredentialRecord::new("alice", "12345678"),
        CredentialRecord::new("bob", "87654321"),
        CredentialRecord::demo(),
    ];
    assert_eq!(read(&report.mesh_users_header), render_mesh_users(&users));

    let games = read(&report.default_games_header);
    assert!(games.contains("#define NUM_DEFAULT_GAMES 2\n"));
    assert!(games.contains("    \"chess-v1.2\",\n    \"battleship-v3.0\",\n"));

    assert_eq!(
        read(&report.system_image),
        render_system_image(&sandbox.config.build_output_root)
    );
    assert_eq!(report.system_image, sandbox.config.system_image_path());
    assert_eq!(read(&report.factory_secrets), "");
}

#[rstest]
fn progress_is_reported_in_order(sandbox: Sandbox) {
    let executor = sandbox.build_succeeds();

    let (_, result, progress) = provision(&sandbox, &executor);
    result.expect("provisioning should succeed");

    let lines: Vec<&str> = progress.lines().collect();
    assert_eq!(
        lines,
        [
            format!(
                "Generated mesh_users.h file: {}",
                sandbox.config.mesh_users_header
            ),
            format!(
                "Generated default_games.h file: {}",
                sandbox.config.default_games_header
            ),
            "Building Images... this may take a while!".to_owned(),
            format!(
                "Done Building Images to {}/Arty-Z7-10/images",
                sandbox.config.build_output_root
            ),
            format!(
                "Generated SystemImage file: {}",
                sandbox.config.system_image_path()
            ),
            format!(
                "Generated FactorySecrets file: {}",
                sandbox.config.factory_secrets_path()
            ),
        ]
    );
}

#[rstest]
fn malformed_catalog_stops_before_any_header(sandbox: Sandbox) {
    sandbox.write_input("default.txt", "brokenline\n");
    let executor = StubExecutor::never();

    let (stage, result, progress) = provision(&sandbox, &executor);
    let err = result.expect_err("provisioning should fail");

    assert!(matches!(
        err,
        ProvisionError::CatalogFormat(CatalogError::Malformed(_))
    ));
    assert_eq!(stage, ProvisionStage::Failed(1));
    assert!(!sandbox.config.mesh_users_header.exists());
    assert!(!sandbox.config.default_games_header.exists());
    assert!(progress.is_empty());
}

#[rstest]
fn failed_build_leaves_descriptors_untouched(sandbox: Sandbox) {
    fs::create_dir_all(&sandbox.config.generated_dir).expect("failed to create generated dir");
    fs::write(sandbox.config.system_image_path(), "previous run").expect("failed to seed");
    let executor = sandbox.build_fails();

    let (stage, result, progress) = provision(&sandbox, &executor);
    let err = result.expect_err("provisioning should fail");

    executor.assert_finished();
    assert!(matches!(err, ProvisionError::BuildTool(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().contains("Failed to build linux"));
    assert_eq!(stage, ProvisionStage::Failed(1));

    assert!(sandbox.config.mesh_users_header.exists());
    assert!(sandbox.config.default_games_header.exists());
    assert_eq!(read(&sandbox.config.system_image_path()), "previous run");
    assert!(!sandbox.config.factory_secrets_path().exists());
    assert!(!progress.contains("Done Building Images"));
}

#[rstest]
fn missing_users_file_is_an_open_failure(sandbox: Sandbox) {
    fs::remove_file(sandbox.users()).expect("failed to remove users file");
    let executor = StubExecutor::never();

    let (stage, result, _) = provision(&sandbox, &executor);
    let err = result.expect_err("provisioning should fail");

    assert!(matches!(
        err,
        ProvisionError::InputOpen { description: "users text file", .. }
    ));
    assert!(err.to_string().contains("users.txt"));
    assert_eq!(stage, ProvisionStage::Failed(2));
    assert!(!sandbox.config.generated_dir.exists());
}

#[rstest]
fn missing_default_games_file_is_an_open_failure(sandbox: Sandbox) {
    fs::remove_file(sandbox.default_games()).expect("failed to remove default file");
    let executor = StubExecutor::never();

    let (_, result, _) = provision(&sandbox, &executor);
    let err = result.expect_err("provisioning should fail");

    assert!(matches!(
        err,
        ProvisionError::InputOpen { description: "default games file", .. }
    ));
    assert_eq!(err.exit_code(), 2);
}

#[rstest]
fn users_file_that_is_a_directory_is_an_open_failure(sandbox: Sandbox) {
    fs::remove_file(sandbox.users()).expect("failed to remove users file");
    fs::create_dir(sandbox.users()).expect("failed to create directory");
    let executor = StubExecutor::never();

    let (stage, result, _) = provision(&sandbox, &executor);
    let err = result.expect_err("provisioning should fail");

    assert!(matches!(
        err,
        ProvisionError::InputOpen { description: "users text file", .. }
    ));
    assert!(err.to_string().contains("users.txt"), "{err}");
    assert_eq!(err.exit_code(), 2);
    assert_eq!(stage, ProvisionStage::Failed(2));
}

#[rstest]
fn default_games_file_that_is_a_directory_is_an_open_failure(sandbox: Sandbox) {
    fs::remove_file(sandbox.default_games()).expect("failed to remove default file");
    fs::create_dir(sandbox.default_games()).expect("failed to create directory");
    let executor = StubExecutor::never();

    let (stage, result, _) = provision(&sandbox, &executor);
    let err = result.expect_err("provisioning should fail");

    assert!(matches!(
        err,
        ProvisionError::InputOpen { description: "default games file", .. }
    ));
    assert!(err.to_string().contains("default.txt"), "{err}");
    assert_eq!(stage, ProvisionStage::Failed(2));
    assert!(!sandbox.config.mesh_users_header.exists());
}

#[rstest]
fn blocked_generated_dir_stops_before_any_header(sandbox: Sandbox) {
    fs::write(sandbox.root.join("files"), "not a directory").expect("failed to seed blocker");
    let executor = StubExecutor::never();

    let (stage, result, _) = provision(&sandbox, &executor);
    let err = result.expect_err("provisioning should fail");

    assert!(matches!(err, ProvisionError::GeneratedDir { .. }));
    assert_eq!(stage, ProvisionStage::Failed(2));
    assert!(!sandbox.config.mesh_users_header.exists());
    assert!(!sandbox.config.factory_secrets_path().exists());
}

#[rstest]
fn unwritable_descriptor_is_caught_before_the_build(sandbox: Sandbox) {
    fs::create_dir_all(sandbox.config.system_image_path()).expect("failed to create blocker");
    let executor = StubExecutor::never();

    let (stage, result, progress) = provision(&sandbox, &executor);
    let err = result.expect_err("provisioning should fail");

    assert!(matches!(
        err,
        ProvisionError::OutputOpen { ref path, .. } if *path == sandbox.config.system_image_path()
    ));
    assert_eq!(stage, ProvisionStage::Failed(2));
    assert!(!sandbox.config.mesh_users_header.exists());
    assert!(!sandbox.config.default_games_header.exists());
    assert!(!progress.contains("Building Images"));
}

#[rstest]
fn descriptor_open_failure_after_the_build_skips_factory_secrets(sandbox: Sandbox) {
    let executor = BuildClobbersDescriptor {
        descriptor: sandbox.config.system_image_path(),
    };

    let (stage, result, progress) = provision(&sandbox, &executor);
    let err = result.expect_err("provisioning should fail");

    assert!(matches!(err, ProvisionError::OutputOpen { .. }));
    assert_eq!(stage, ProvisionStage::Failed(2));
    assert!(progress.contains("Done Building Images"));
    assert!(sandbox.config.mesh_users_header.exists());
    assert!(!sandbox.config.factory_secrets_path().exists());
    assert!(!progress.contains("Generated SystemImage file"));
}

#[rstest]
#[case::identity_too_long("a_very_long_username 12345678\n".as_bytes())]
#[case::not_utf8(&[0x61, 0x20, 0xff, 0xfe, 0x0a])]
fn rejected_users_file_writes_nothing(sandbox: Sandbox, #[case] users: &[u8]) {
    sandbox.write_input("users.txt", users);
    let executor = StubExecutor::never();

    let (stage, result, _) = provision(&sandbox, &executor);
    let err = result.expect_err("provisioning should fail");

    assert!(matches!(err, ProvisionError::CredentialFormat { .. }));
    assert_eq!(stage, ProvisionStage::Failed(2));
    assert!(!sandbox.config.mesh_users_header.exists());
}

#[rstest]
fn unwritable_header_location_is_an_open_failure(mut sandbox: Sandbox) {
    sandbox.config.mesh_users_header = sandbox.root.join("missing").join("mesh_users.h");
    let executor = StubExecutor::never();

    let (_, result, _) = provision(&sandbox, &executor);
    let err = result.expect_err("provisioning should fail");

    assert!(matches!(err, ProvisionError::OutputOpen { .. }));
    assert_eq!(err.exit_code(), 2);
}

#[rstest]
fn repeated_runs_produce_identical_artefacts(sandbox: Sandbox) {
    let first = provision(&sandbox, &sandbox.build_succeeds())
        .1
        .expect("first run should succeed");
    let snapshot: Vec<String> = [
        &first.mesh_users_header,
        &first.default_games_header,
        &first.system_image,
        &first.factory_secrets,
    ]
    .into_iter()
    .map(|path| read(path))
    .collect();

    let second = provision(&sandbox, &sandbox.build_succeeds())
        .1
        .expect("second run should succeed");
    let again: Vec<String> = [
        &second.mesh_users_header,
        &second.default_games_header,
        &second.system_image,
        &second.factory_secrets,
    ]
    .into_iter()
    .map(|path| read(path))
    .collect();

    assert_eq!(first, second);
    assert_eq!(snapshot, again);
}

#[test]
fn load_users_appends_demo_last() {
    let users = load_users(USERS).expect("users should load");
    let identities: Vec<&str> = users.iter().map(CredentialRecord::identity).collect();
    assert_eq!(identities, ["alice", "bob", "demo"]);
}

#[test]
fn load_users_keeps_duplicate_demo() {
    let users = load_users("demo 11111111\n").expect("users should load");
    assert_eq!(users.len(), 2);
    assert_eq!(users[1], CredentialRecord::demo());
}

#[test]
fn stages_display_readably() {
    assert_eq!(ProvisionStage::HeadersWritten.to_string(), "headers written");
    assert_eq!(ProvisionStage::Failed(2).to_string(), "failed (2)");
}
