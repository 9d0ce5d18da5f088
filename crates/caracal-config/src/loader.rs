use crate::args::Args;
use crate::env;
use crate::error::ConfigError;
use crate::file::GatewayConfigOverlay;
use crate::types::GatewayConfig;

/// Builds the effective configuration in precedence order CLI > env > file >
/// default, then validates the result eagerly. Grounded on `chronx-node`'s
/// `Args::parse()` entry point, generalized with the file and env layers
/// `SPEC_FULL.md` §A.3 calls for.
pub fn load(args: &Args) -> Result<GatewayConfig, ConfigError> {
    let mut config = GatewayConfig::default();

    if let Some(path) = &args.config {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Configuration(format!("reading config file {}: {e}", path.display())))?;
        let overlay: GatewayConfigOverlay = toml::from_str(&text)
            .map_err(|e| ConfigError::Configuration(format!("parsing config file {}: {e}", path.display())))?;
        overlay.apply_to(&mut config);
    }

    env::load_overlay()?.apply_to(&mut config);

    args.as_overlay().apply_to(&mut config);

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args_with(extra: &[&str]) -> Args {
        let mut argv = vec!["caracal-node"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_apply_with_no_overrides() {
        let config = load(&args_with(&[])).unwrap();
        assert_eq!(config.listen_addr.port(), 8443);
        assert_eq!(config.backup_count, 3);
    }

    #[test]
    fn cli_flag_overrides_default() {
        let config = load(&args_with(&["--backup-count", "7"])).unwrap();
        assert_eq!(config.backup_count, 7);
    }

    #[test]
    fn toml_file_is_applied_beneath_cli() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("caracal.toml");
        std::fs::write(&path, "backup_count = 9\nreap_batch_size = 42\n").unwrap();

        let args = args_with(&["--config", path.to_str().unwrap(), "--backup-count", "11"]);
        let config = load(&args).unwrap();

        assert_eq!(config.backup_count, 11, "CLI must win over the file");
        assert_eq!(config.reap_batch_size, 42, "file value applies where CLI is silent");
    }

    #[test]
    fn mtls_without_cert_path_is_rejected() {
        assert!(load(&args_with(&["--auth-mode", "mtls"])).is_err());
    }
}
