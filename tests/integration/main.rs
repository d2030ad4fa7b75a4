//! Integration tests for Kiln

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    /// Command isolated from the user's config and state directories
    fn kiln(home: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("kiln");
        cmd.env_remove("KILN_CONFIG")
            .env("HOME", home)
            .env("XDG_CONFIG_HOME", home.join(".config"))
            .env("XDG_STATE_HOME", home.join(".local/state"));
        cmd
    }

    fn write_config(home: &Path, body: &str) -> std::path::PathBuf {
        let path = home.join("kiln.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        kiln(home.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("On-demand build coordinator"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        kiln(home.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn features_lists_registry() {
        let home = TempDir::new().unwrap();
        kiln(home.path())
            .arg("features")
            .assert()
            .success()
            .stdout(predicate::str::contains("gzip").and(predicate::str::contains("markdown")));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        kiln(home.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let home = TempDir::new().unwrap();
        kiln(home.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("binary_prefix"));
    }

    #[test]
    fn build_without_backend_fails() {
        let home = TempDir::new().unwrap();
        kiln(home.path())
            .args(["build", "--os", "linux", "--arch", "amd64"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No compiler backend configured"));
    }

    #[test]
    fn build_rejects_unknown_feature() {
        let home = TempDir::new().unwrap();
        let config = write_config(
            home.path(),
            "[general]\naudit_log = false\n\n[backend]\nprogram = \"true\"\n",
        );

        kiln(home.path())
            .arg("--config")
            .arg(&config)
            .args(["build", "--os", "linux", "--arch", "amd64", "--features", "nope"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid parameter"))
            .stderr(predicate::str::contains("kiln features"));
    }

    #[test]
    fn build_rejects_non_numeric_variant() {
        let home = TempDir::new().unwrap();
        let config = write_config(
            home.path(),
            "[general]\naudit_log = false\n\n[backend]\nprogram = \"true\"\n",
        );

        kiln(home.path())
            .arg("--config")
            .arg(&config)
            .args(["build", "--os", "linux", "--arch", "arm", "--arm", "v7"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid parameter arm"));
    }

    #[cfg(unix)]
    #[test]
    fn build_with_command_backend() {
        let home = TempDir::new().unwrap();
        let storage = home.path().join("builds");
        let config = write_config(
            home.path(),
            &format!(
                r#"
[general]
audit_log = false

[storage]
root = "{}"

[backend]
program = "sh"
args = ["-c", "printf binary > \"$KILN_OUTPUT\""]
"#,
                storage.display()
            ),
        );
        let output = home.path().join("artifact.zip");

        kiln(home.path())
            .arg("--config")
            .arg(&config)
            .args(["build", "--os", "linux", "--arch", "amd64", "--features", "markdown,gzip"])
            .arg("--output")
            .arg(&output)
            .assert()
            .success()
            .stdout(predicate::str::contains("201"))
            .stdout(predicate::str::contains("build_linux_amd64_custom.zip"));

        assert!(output.is_file());
        let attempts: Vec<_> = std::fs::read_dir(&storage).unwrap().collect();
        assert_eq!(attempts.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn batch_compiles_identical_requests_once() {
        let home = TempDir::new().unwrap();
        let storage = home.path().join("builds");
        let config = write_config(
            home.path(),
            &format!(
                r#"
[general]
audit_log = false

[storage]
root = "{}"

[backend]
program = "sh"
args = ["-c", "sleep 0.2; printf binary > \"$KILN_OUTPUT\""]
"#,
                storage.display()
            ),
        );
        let batch = home.path().join("requests.toml");
        std::fs::write(
            &batch,
            r#"
[[request]]
os = "linux"
arch = "amd64"
features = "gzip,markdown"

[[request]]
os = "linux"
arch = "amd64"
features = "markdown, gzip"

[[request]]
os = "linux"
arch = "amd64"
features = "markdown,gzip,gzip"
"#,
        )
        .unwrap();

        kiln(home.path())
            .arg("--config")
            .arg(&config)
            .arg("batch")
            .arg(&batch)
            .assert()
            .success()
            .stdout(predicate::str::contains("3 request(s), 1 compile(s)"));

        let attempts: Vec<_> = std::fs::read_dir(&storage).unwrap().collect();
        assert_eq!(attempts.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn batch_reports_failures() {
        let home = TempDir::new().unwrap();
        let config = write_config(
            home.path(),
            &format!(
                "[general]\naudit_log = false\n\n[storage]\nroot = \"{}\"\n\n[backend]\nprogram = \"false\"\n",
                home.path().join("builds").display()
            ),
        );
        let batch = home.path().join("requests.toml");
        std::fs::write(&batch, "[[request]]\nos = \"linux\"\narch = \"amd64\"\n").unwrap();

        kiln(home.path())
            .arg("--config")
            .arg(&config)
            .arg("batch")
            .arg(&batch)
            .assert()
            .failure()
            .stderr(predicate::str::contains("1 of 1 batch requests failed"));
    }
}
