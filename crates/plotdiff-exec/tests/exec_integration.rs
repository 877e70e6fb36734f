//! Integration tests for the git/make installer and the command renderer,
//! using throwaway git repositories and shell scripts.
#![cfg(unix)]

use plotdiff_core::{EnvironmentHandle, InstallError, Installer, RenderError, RenderRequest, Renderer};
use plotdiff_exec::{
    latest_remote_tag, remote_tags, CommandRenderer, GitError, GitMakeInstaller, InstallCommand,
    RenderOptions,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;

const BUILD_SCRIPT: &str = "#!/bin/sh
mkdir -p venv/bin
printf '#!/bin/sh\\necho plot\\n' > venv/bin/plot
chmod +x venv/bin/plot
echo built >> build.log
";

fn run_git(repo_dir: &Path, args: &[&str]) {
    let output = StdCommand::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Source repository with a build script, tags v0.9, v1.0, v1.10 and a
/// `dev` branch.
fn make_source_repo(root: &Path) -> PathBuf {
    let repo = root.join("src");
    fs::create_dir_all(&repo).unwrap();
    run_git(&repo, &["init", "--quiet"]);
    run_git(&repo, &["config", "user.name", "test-user"]);
    run_git(&repo, &["config", "user.email", "test@example.com"]);
    fs::write(repo.join("build.sh"), BUILD_SCRIPT).unwrap();
    run_git(&repo, &["add", "build.sh"]);
    run_git(&repo, &["commit", "--quiet", "-m", "initial"]);
    run_git(&repo, &["tag", "v0.9"]);
    run_git(&repo, &["tag", "v1.10", "-a", "-m", "annotated"]);
    run_git(&repo, &["tag", "v1.0"]);
    run_git(&repo, &["branch", "dev"]);
    repo
}

fn script_install() -> InstallCommand {
    InstallCommand {
        program: "sh".to_string(),
        args: vec!["build.sh".to_string()],
        venv_dir: "venv".to_string(),
        executable_name: "plot".to_string(),
    }
}

fn write_script(path: &Path, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

fn env_for(executable: PathBuf) -> EnvironmentHandle {
    EnvironmentHandle {
        revision: "v1.0".to_string(),
        root: executable.parent().unwrap().to_path_buf(),
        executable,
    }
}

/// Fake plotting program: announces two plots and writes them unless
/// `--dry-run` is given.
const PLOTTER: &str = r#"
dry=0
for a in "$@"; do
  [ "$a" = "--dry-run" ] && dry=1
done
echo "starting $*"
for p in a.png sub/b.png; do
  if [ $dry -eq 0 ]; then
    mkdir -p "$(dirname "$p")"
    echo "$p" > "$p"
  fi
  echo "input.nc -> $p"
done
"#;

/// Test: latest tag follows version ordering and ignores peeled refs
#[tokio::test]
async fn test_latest_remote_tag() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = make_source_repo(tmp.path());
    let repo = repo.to_string_lossy();

    let tags = remote_tags(&repo).await.expect("ls-remote failed");
    assert_eq!(tags, vec!["v0.9", "v1.0", "v1.10"]);
    assert_eq!(latest_remote_tag(&repo).await.unwrap(), "v1.10");
}

/// Test: a repository without tags is an error
#[tokio::test]
async fn test_no_tags_is_error() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("bare");
    fs::create_dir_all(&repo).unwrap();
    run_git(&repo, &["init", "--quiet"]);

    let err = latest_remote_tag(&repo.to_string_lossy()).await.unwrap_err();
    assert!(matches!(err, GitError::NoTags { .. }), "{err}");
}

/// Test: install clones, builds and reuses the existing installation
#[tokio::test]
async fn test_install_and_reuse() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = make_source_repo(tmp.path());
    let repo = repo.to_string_lossy().into_owned();
    let install_dir = tmp.path().join("install").join("v1.0");
    let installer = GitMakeInstaller::new(script_install());

    let handle = installer
        .ensure(&repo, "v1.0", &install_dir, false)
        .await
        .expect("install failed");
    assert_eq!(handle.executable, install_dir.join("venv/bin/plot"));
    assert!(handle.executable.exists());

    // Reuse: the clone is clean and the executable exists, nothing is rebuilt.
    installer
        .ensure(&repo, "v1.0", &install_dir, true)
        .await
        .expect("reuse failed");
    let log = fs::read_to_string(install_dir.join("build.log")).unwrap();
    assert_eq!(log.lines().count(), 1);

    // Reinstall: the directory is replaced.
    fs::write(install_dir.join("marker"), b"").unwrap();
    installer
        .ensure(&repo, "v1.0", &install_dir, false)
        .await
        .expect("reinstall failed");
    assert!(!install_dir.join("marker").exists());
    assert!(install_dir.join("venv/bin/plot").exists());
}

/// Test: a dirty clone is not reused
#[tokio::test]
async fn test_dirty_clone_is_recloned() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = make_source_repo(tmp.path());
    let repo = repo.to_string_lossy().into_owned();
    let install_dir = tmp.path().join("install").join("dev");
    let installer = GitMakeInstaller::new(script_install());

    installer.ensure(&repo, "dev", &install_dir, false).await.unwrap();
    fs::write(install_dir.join("build.sh"), "#!/bin/sh\nexit 1\n").unwrap();

    installer
        .ensure(&repo, "dev", &install_dir, true)
        .await
        .expect("reclone failed");
    let script = fs::read_to_string(install_dir.join("build.sh")).unwrap();
    assert_eq!(script, BUILD_SCRIPT);
}

/// Test: unknown revision fails at checkout
#[tokio::test]
async fn test_unknown_revision_is_checkout_error() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = make_source_repo(tmp.path());
    let installer = GitMakeInstaller::new(script_install());

    let err = installer
        .ensure(&repo.to_string_lossy(), "no-such-rev", &tmp.path().join("i"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, InstallError::Checkout { .. }), "{err}");
}

/// Test: a build that produces no executable is reported
#[tokio::test]
async fn test_missing_executable() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = make_source_repo(tmp.path());
    let installer = GitMakeInstaller::new(InstallCommand {
        program: "true".to_string(),
        args: Vec::new(),
        ..script_install()
    });

    let err = installer
        .ensure(&repo.to_string_lossy(), "v1.0", &tmp.path().join("i"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, InstallError::MissingExecutable { .. }), "{err}");
}

/// Test: a failing build is reported as build error
#[tokio::test]
async fn test_failing_build() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = make_source_repo(tmp.path());
    let installer = GitMakeInstaller::new(InstallCommand {
        program: "false".to_string(),
        args: Vec::new(),
        ..script_install()
    });

    let err = installer
        .ensure(&repo.to_string_lossy(), "v1.0", &tmp.path().join("i"), false)
        .await
        .unwrap_err();
    assert!(matches!(err, InstallError::Build { .. }), "{err}");
}

/// Test: renderer returns announced plots in production order
#[tokio::test]
async fn test_render_produces_expected_plots() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = tmp.path().join("bin/plotter");
    write_script(&exe, PLOTTER);
    let data = tmp.path().join("data");
    fs::create_dir_all(&data).unwrap();
    let out = tmp.path().join("out");

    let renderer = CommandRenderer::new(RenderOptions {
        data_path: Some(data.clone()),
        num_procs: 2,
        only: None,
    });
    let request = RenderRequest {
        preset: "test/preset".to_string(),
        infile: Some(PathBuf::from("input.nc")),
        output_dir: out.clone(),
    };
    let plots = renderer
        .render(&env_for(exe), &request)
        .await
        .expect("render failed");

    assert_eq!(plots.names().collect::<Vec<_>>(), vec!["a.png", "sub/b.png"]);
    assert_eq!(plots.get("sub/b.png").unwrap().path, out.join("sub/b.png"));
    assert!(out.join("a.png").exists());
    let link = fs::symlink_metadata(out.join("data")).unwrap();
    assert!(link.file_type().is_symlink());
    assert_eq!(fs::read_link(out.join("data")).unwrap(), data);
}

/// Test: a dry run announcing nothing is an error
#[tokio::test]
async fn test_render_without_expected_plots() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = tmp.path().join("bin/plotter");
    write_script(&exe, "echo nothing to do\n");

    let request = RenderRequest {
        preset: "empty".to_string(),
        infile: None,
        output_dir: tmp.path().join("out"),
    };
    let err = CommandRenderer::default()
        .render(&env_for(exe), &request)
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::NoPlotsExpected { .. }), "{err}");
}

/// Test: a plot not announced by the dry run is rejected
#[tokio::test]
async fn test_render_rejects_unexpected_plot() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = tmp.path().join("bin/plotter");
    let body = format!(
        "{}\ncase \"$*\" in *--dry-run*) ;; *) touch surprise.png; echo \"input.nc -> surprise.png\";; esac\n",
        PLOTTER
    );
    write_script(&exe, &body);

    let request = RenderRequest {
        preset: "p".to_string(),
        infile: None,
        output_dir: tmp.path().join("out"),
    };
    let err = CommandRenderer::default()
        .render(&env_for(exe), &request)
        .await
        .unwrap_err();
    match err {
        RenderError::UnexpectedPlot { name, .. } => assert_eq!(name, "surprise.png"),
        other => panic!("unexpected error: {other}"),
    }
}

/// Test: a real run producing fewer plots than announced is rejected
#[tokio::test]
async fn test_render_rejects_incomplete_output() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = tmp.path().join("bin/plotter");
    write_script(
        &exe,
        r#"
case "$*" in
  *--dry-run*) echo "input.nc -> a.png"; echo "input.nc -> b.png";;
  *) touch a.png; echo "input.nc -> a.png";;
esac
"#,
    );

    let request = RenderRequest {
        preset: "p".to_string(),
        infile: None,
        output_dir: tmp.path().join("out"),
    };
    let err = CommandRenderer::default()
        .render(&env_for(exe), &request)
        .await
        .unwrap_err();
    match err {
        RenderError::IncompleteRender { missing, .. } => assert_eq!(missing, vec!["b.png"]),
        other => panic!("unexpected error: {other}"),
    }
}

/// Test: a failing plotting program is a command error
#[tokio::test]
async fn test_render_command_failure() {
    let tmp = tempfile::tempdir().unwrap();
    let exe = tmp.path().join("bin/plotter");
    write_script(&exe, "echo broken >&2\nexit 2\n");

    let request = RenderRequest {
        preset: "p".to_string(),
        infile: None,
        output_dir: tmp.path().join("out"),
    };
    let err = CommandRenderer::default()
        .render(&env_for(exe), &request)
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::Command { .. }), "{err}");
    assert!(err.to_string().contains("broken"));
}
