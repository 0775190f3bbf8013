/// Tests for the server launch specification and exec failure handling

#[cfg(test)]
mod tests {
    use bootstrap_core::config::{BootstrapConfig, ServerConfig};
    use bootstrap_core::handoff::{ExecLauncher, LaunchSpec, Launcher};
    use bootstrap_core::BootstrapError;

    #[test]
    fn test_launch_spec_uses_fixed_bind_address() {
        let server = ServerConfig {
            command: vec!["uvicorn".to_string(), "main:app".to_string()],
            host: "127.0.0.1".to_string(),
            port: 8080,
        };

        let spec = LaunchSpec::new(&server, "DATABASE_URL", "postgresql+asyncpg://db/trava")
            .expect("spec should build");

        assert_eq!(spec.command.to_string(), "uvicorn main:app --host 127.0.0.1 --port 8080");
        assert_eq!(
            spec.env,
            vec![("DATABASE_URL".to_string(), "postgresql+asyncpg://db/trava".to_string())]
        );
    }

    #[test]
    fn test_launch_spec_rejects_empty_command() {
        let server = ServerConfig {
            command: Vec::new(),
            ..ServerConfig::default()
        };
        let err = LaunchSpec::new(&server, "DATABASE_URL", "").expect_err("empty command");
        assert!(matches!(err, BootstrapError::InvalidConfig(_)));
    }

    #[test]
    fn test_launch_spec_from_config() {
        let mut config = BootstrapConfig::default();
        config.database.name = Some("trava".to_string());
        let config = config.finalize().unwrap();

        let spec = LaunchSpec::from_config(&config).unwrap();
        assert_eq!(spec.command.program, "uvicorn");
        assert_eq!(spec.env[0].1, "postgresql+asyncpg://localhost:5432/trava");
    }

    #[cfg(unix)]
    #[test]
    fn test_missing_server_program_exits_127() {
        let server = ServerConfig {
            command: vec!["no-such-application-server".to_string()],
            ..ServerConfig::default()
        };
        let spec = LaunchSpec::new(&server, "DATABASE_URL", "postgresql://db/trava").unwrap();

        let err = ExecLauncher.launch(&spec).expect_err("exec should fail");

        assert!(matches!(err, BootstrapError::Handoff { .. }));
        assert_eq!(err.exit_code(), 127);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_server_exits_126() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let script = dir.path().join("server");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

        let server = ServerConfig {
            command: vec![script.display().to_string()],
            ..ServerConfig::default()
        };
        let spec = LaunchSpec::new(&server, "DATABASE_URL", "postgresql://db/trava").unwrap();

        let err = ExecLauncher.launch(&spec).expect_err("exec should fail");
        assert_eq!(err.exit_code(), 126);
    }
}
