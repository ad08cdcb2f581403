use std::io::Write;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn test_empty_document_uses_defaults() {
	let config = RuntimeConfig::from_toml_str("").unwrap();
	assert_eq!(config, RuntimeConfig::default());
	assert_eq!(config.logging.filter, "info");
	assert_eq!(config.registry.name, "default");
}

#[test]
fn test_partial_tables_keep_remaining_defaults() {
	let config = RuntimeConfig::from_toml_str(
		r#"
name = "edge"

[logging]
filter = "strata_components=debug,info"
compact = true

[registry]
name = "edge-registry"
"#,
	)
	.unwrap();
	assert_eq!(config.name, "edge");
	assert_eq!(config.logging.filter, "strata_components=debug,info");
	assert!(config.logging.compact);
	assert!(config.logging.ansi);
	assert_eq!(config.logging.file, None);
	assert_eq!(config.registry.name, "edge-registry");
}

#[test]
fn test_unknown_keys_are_rejected() {
	let err = RuntimeConfig::from_toml_str("[logging]\nlevel = \"debug\"\n").unwrap_err();
	assert!(matches!(err, ConfigError::Parse { .. }));
	assert!(err.to_string().contains("<inline>"));
}

#[test]
fn test_load_reads_file() {
	let mut file = tempfile::NamedTempFile::new().unwrap();
	writeln!(file, "[logging]\nfile = \"strata.log\"\nansi = false").unwrap();

	let config = RuntimeConfig::load(file.path()).unwrap();
	assert_eq!(config.logging.file, Some(PathBuf::from("strata.log")));
	assert!(!config.logging.ansi);
}

#[test]
fn test_load_missing_file_reports_path() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("absent.toml");
	match RuntimeConfig::load(&path) {
		Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
		other => panic!("expected I/O error, got {other:?}"),
	}
}

#[test]
fn test_parse_error_names_file() {
	let mut file = tempfile::NamedTempFile::new().unwrap();
	writeln!(file, "name = ").unwrap();
	let err = RuntimeConfig::load(file.path()).unwrap_err();
	assert!(matches!(err, ConfigError::Parse { ref path, .. } if path == file.path()));
}
