use lodge_registry::config::*;
use lodge_registry::error::RegistryError;
use lodge_registry::types::DeploymentMode;
use lodge_crypto::MasterKey;
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name: &str| map.get(name).cloned()
}

#[test]
fn defaults() {
    let config = RegistryConfig::default();
    assert_eq!(config.deployment_mode, DeploymentMode::Production);
    assert_eq!(config.registry_blob_key, "registry/lodges.enc");
    assert_eq!(config.key_envelope_blob_key, "registry/quantum-keys.enc");
    assert_eq!(config.local_dir, PathBuf::from(".lodge"));
    assert_eq!(config.cache_ttl(), Duration::from_secs(300));
    assert_eq!(config.blob_timeout(), Duration::from_secs(10));
    assert!(config.public_keys().is_none());
    assert!(config.master_key().unwrap().is_none());
    assert!(config.legacy_key().unwrap().is_none());
}

#[test]
fn from_lookup_overrides_defaults() {
    let master = MasterKey::generate();
    let master_hex = master.to_hex();
    let config = RegistryConfig::from_lookup(lookup(&[
        (ENV_DEPLOYMENT_MODE, "local"),
        (ENV_KEM_PUBLIC_KEY, "abcd"),
        (ENV_RSA_PUBLIC_KEY, "ZmFrZQ=="),
        (ENV_MASTER_KEY, master_hex.as_str()),
        (ENV_S3_BUCKET, "tenants"),
        (ENV_S3_ENDPOINT, "http://localhost:9000"),
        (ENV_REGISTRY_BLOB_KEY, "custom/registry.enc"),
        (ENV_CACHE_TTL_SECS, "30"),
        (ENV_BLOB_TIMEOUT_SECS, "2"),
    ]))
    .unwrap();

    assert_eq!(config.deployment_mode, DeploymentMode::Local);
    assert_eq!(config.s3_bucket, "tenants");
    assert_eq!(config.s3_endpoint_override.as_deref(), Some("http://localhost:9000"));
    assert_eq!(config.registry_blob_key, "custom/registry.enc");
    assert_eq!(config.cache_ttl(), Duration::from_secs(30));
    assert_eq!(config.blob_timeout(), Duration::from_secs(2));

    let public = config.public_keys().unwrap();
    assert_eq!(public.kem_public_key, "abcd");
    assert_eq!(config.master_key().unwrap().unwrap().as_bytes(), master.as_bytes());
}

#[test]
fn empty_values_are_absent() {
    let config = RegistryConfig::from_lookup(lookup(&[
        (ENV_MASTER_KEY, ""),
        (ENV_KEM_PUBLIC_KEY, "  "),
    ]))
    .unwrap();
    assert!(config.master_key.is_none());
    assert!(config.kem_public_key.is_none());
}

#[test]
fn public_keys_need_both_halves() {
    let config = RegistryConfig::from_lookup(lookup(&[(ENV_KEM_PUBLIC_KEY, "abcd")])).unwrap();
    assert!(config.public_keys().is_none());
}

#[test]
fn unknown_mode_is_config_error() {
    let err = RegistryConfig::from_lookup(lookup(&[(ENV_DEPLOYMENT_MODE, "staging")])).unwrap_err();
    assert!(matches!(err, RegistryError::Config(_)));
}

#[test]
fn non_numeric_ttl_is_config_error() {
    let err = RegistryConfig::from_lookup(lookup(&[(ENV_CACHE_TTL_SECS, "five")])).unwrap_err();
    assert!(err.to_string().contains(ENV_CACHE_TTL_SECS));
}

#[test]
fn malformed_master_key_is_error_not_absent() {
    let config = RegistryConfig::from_lookup(lookup(&[(ENV_MASTER_KEY, "abcd")])).unwrap();
    assert!(config.master_key().is_err());
}

#[test]
fn legacy_key_decodes() {
    let key = "11".repeat(32);
    let config = RegistryConfig::from_lookup(lookup(&[(ENV_LEGACY_KEY, key.as_str())])).unwrap();
    assert_eq!(config.legacy_key().unwrap().unwrap().as_bytes(), &[0x11; 32]);
}

#[test]
fn debug_redacts_secrets() {
    let config = RegistryConfig {
        master_key: Some("deadbeef".repeat(8)),
        legacy_key: Some("cafebabe".repeat(8)),
        ..Default::default()
    };
    let debug = format!("{config:?}");
    assert!(!debug.contains("deadbeef"));
    assert!(!debug.contains("cafebabe"));
    assert!(debug.contains("<redacted>"));
}

#[test]
fn serialization_skips_secrets() {
    let config = RegistryConfig {
        master_key: Some("aa".repeat(32)),
        legacy_key: Some("bb".repeat(32)),
        s3_bucket: "tenants".into(),
        ..Default::default()
    };
    let json = serde_json::to_string(&config).unwrap();
    assert!(!json.contains("master_key"));
    assert!(!json.contains("legacy_key"));

    let back: RegistryConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.s3_bucket, "tenants");
    assert!(back.master_key.is_none());
}

#[test]
#[serial]
fn from_env_reads_process_environment() {
    // SAFETY: serialized with every other test touching the environment.
    unsafe {
        std::env::set_var(ENV_DEPLOYMENT_MODE, "dev");
        std::env::set_var(ENV_S3_REGION, "eu-west-1");
    }
    let config = RegistryConfig::from_env();
    unsafe {
        std::env::remove_var(ENV_DEPLOYMENT_MODE);
        std::env::remove_var(ENV_S3_REGION);
    }

    let config = config.unwrap();
    assert_eq!(config.deployment_mode, DeploymentMode::Local);
    assert_eq!(config.s3_region, "eu-west-1");
}

#[test]
#[serial]
fn from_env_defaults_to_production() {
    unsafe {
        std::env::remove_var(ENV_DEPLOYMENT_MODE);
    }
    let config = RegistryConfig::from_env().unwrap();
    assert_eq!(config.deployment_mode, DeploymentMode::Production);
}
