/// Tests for exit codes and output at the binary edge

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use bootstrap_core::error::report_failure;
    use bootstrap_core::migrations::MigrationError;
    use bootstrap_core::restore::RestoreError;
    use bootstrap_core::BootstrapError;
    use std::path::PathBuf;
    use std::process::{Command, Output};

    fn db_bootstrap(args: &[&str], env: &[(&str, &str)]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_db-bootstrap"))
            .args(args)
            .env_clear()
            .env("RUST_LOG", "off")
            .envs(env.iter().copied())
            .output()
            .expect("binary should start")
    }

    #[test]
    fn test_lenient_restore_errors_are_printed_to_stdout() {
        let err = anyhow::Error::from(BootstrapError::Restore(RestoreError::Errors {
            error_log: PathBuf::from("/tmp/restore_errors.log"),
            content: "pg_restore: error: relation \"users\" does not exist".to_string(),
        }));

        let mut stdout = Vec::new();
        let code = report_failure(&err, &mut stdout);

        assert_eq!(code, 1);
        assert_eq!(
            String::from_utf8(stdout).unwrap(),
            "pg_restore: error: relation \"users\" does not exist\n"
        );
    }

    #[test]
    fn test_config_error_keeps_exit_code_through_context() {
        let err = Err::<(), _>(BootstrapError::InvalidConfig("POSTGRES_DB or DATABASE_URL must be set".into()))
            .context("loading configuration")
            .unwrap_err();

        let mut stdout = Vec::new();
        assert_eq!(report_failure(&err, &mut stdout), 2);
        assert!(stdout.is_empty());
    }

    #[test]
    fn test_tool_failures_report_their_exit_code() {
        let err = anyhow::Error::from(BootstrapError::Migration(MigrationError::Failed {
            program: "alembic".to_string(),
            code: Some(3),
            status: "exit status: 3".to_string(),
        }));
        let mut stdout = Vec::new();
        assert_eq!(report_failure(&err, &mut stdout), 3);
        assert!(stdout.is_empty());

        let other = anyhow::anyhow!("runtime setup failed");
        assert_eq!(report_failure(&other, &mut stdout), 1);
    }

    #[test]
    fn test_binary_exits_2_on_invalid_configuration() {
        let output = db_bootstrap(&["status"], &[("POSTGRES_USER", "app")]);

        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("loading configuration"), "{}", stderr);
        assert!(stderr.contains("POSTGRES_DB"), "{}", stderr);
    }

    #[test]
    fn test_binary_exits_2_when_restore_policy_missing() {
        let output = db_bootstrap(&["--load-dump", "print-config"], &[("POSTGRES_DB", "trava")]);

        assert_eq!(output.status.code(), Some(2));
        assert!(String::from_utf8_lossy(&output.stderr).contains("RESTORE_POLICY"));
    }

    #[test]
    fn test_binary_prints_redacted_config() {
        let output = db_bootstrap(
            &["--restore-policy", "lenient", "print-config"],
            &[
                ("POSTGRES_HOST", "db"),
                ("POSTGRES_USER", "app"),
                ("POSTGRES_PASSWORD", "hunter2"),
                ("POSTGRES_DB", "trava"),
            ],
        );

        assert_eq!(output.status.code(), Some(0));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(!stdout.contains("hunter2"), "{}", stdout);
        assert!(stdout.contains("postgresql://app:***@db:5432/trava"), "{}", stdout);
        assert!(stdout.contains("policy = \"lenient\""), "{}", stdout);
    }
}
