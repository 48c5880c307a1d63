// Reading the target from COUNT_CALLS_TO
//
// These tests mutate the process environment, so they run serially.

use callcount::config::{ConfigError, CounterConfig, TARGET_ENV};
use callcount::specifier::MemberKind;
use serial_test::serial;
use std::env;

#[test]
#[serial]
fn test_target_from_env() {
    env::set_var(TARGET_ENV, "Base64.encode64");

    let spec = CounterConfig::target_from_env().unwrap();
    assert_eq!(spec.owner(), "Base64");
    assert_eq!(spec.member(), "encode64");
    assert_eq!(spec.kind(), MemberKind::OwnerScoped);

    env::remove_var(TARGET_ENV);
}

#[test]
#[serial]
fn test_target_from_env_trims_whitespace() {
    env::set_var(TARGET_ENV, "  Counter#increment\n");

    let spec = CounterConfig::target_from_env().unwrap();
    assert_eq!(spec.raw(), "Counter#increment");

    env::remove_var(TARGET_ENV);
}

#[test]
#[serial]
fn test_unset_env_is_missing_target() {
    env::remove_var(TARGET_ENV);

    assert_eq!(
        CounterConfig::target_from_env().unwrap_err(),
        ConfigError::MissingTarget
    );
}

#[test]
#[serial]
fn test_empty_env_is_malformed() {
    env::set_var(TARGET_ENV, "");

    let err = CounterConfig::target_from_env().unwrap_err();
    assert!(matches!(err, ConfigError::Specifier(_)));
    assert!(err.to_string().contains("empty specifier"));

    env::remove_var(TARGET_ENV);
}

#[test]
#[serial]
fn test_malformed_env_target() {
    env::set_var(TARGET_ENV, "Counter::increment");

    let err = CounterConfig::target_from_env().unwrap_err();
    assert!(err.to_string().contains("Counter::increment"));

    env::remove_var(TARGET_ENV);
}
