use arbitrary::Unstructured;
use rand::{prelude::random, rngs::SmallRng, Rng, SeedableRng};

use super::*;

#[test]
fn test_config_default() {
    let config = Config::new();
    assert!(!config.lockmemory);
    assert!(!config.readonly);
    assert!(!config.fallback);
    assert!(config.upstream.is_empty());
    assert_eq!(config.map_size, MAP_SIZE);
    assert_eq!(config.max_dbs, MAX_DBS);
}

#[test]
fn test_config_setters() {
    let mut config = Config::new();
    config
        .set_lockmemory(true)
        .set_readonly(true)
        .set_fallback(true)
        .set_map_size(1_000_000)
        .set_upstream(vec!["tcp://peer:27492/layer".to_string()]);

    assert!(config.lockmemory);
    assert!(config.readonly);
    assert!(config.fallback);
    assert_eq!(config.map_size, 1_000_000);
    assert_eq!(config.upstream.len(), 1);
}

#[test]
fn test_config_from_toml() {
    let text = r#"
        lockmemory = true
        fallback = true
        map_size = 1000000
        upstream = ["tcp://a/x", "tcp://b/y"]
    "#;
    let config = Config::from_toml(text.parse().unwrap()).unwrap();
    assert!(config.lockmemory);
    assert!(!config.readonly);
    assert!(config.fallback);
    assert_eq!(config.map_size, 1_000_000);
    assert_eq!(config.upstream, vec!["tcp://a/x", "tcp://b/y"]);

    // a single upstream url is accepted without the list.
    let config = Config::from_toml("upstream = \"tcp://a/x\"".parse().unwrap()).unwrap();
    assert_eq!(config.upstream, vec!["tcp://a/x"]);

    let config = Config::from_toml("".parse().unwrap()).unwrap();
    assert!(config.upstream.is_empty());

    assert!(Config::from_toml("lockmemory = \"yes\"".parse().unwrap()).is_err());
    assert!(Config::from_toml("upstream = 42".parse().unwrap()).is_err());
}

#[test]
fn test_config_arbitrary() {
    let seed: u128 = random();
    println!("test_config_arbitrary {}", seed);
    let mut rng = SmallRng::from_seed(seed.to_le_bytes());

    for _ in 0..32 {
        let bytes = rng.gen::<[u8; 32]>();
        let mut uns = Unstructured::new(&bytes);
        let config: Config = uns.arbitrary().unwrap();
        assert!(!config.readonly);
        assert!(config.map_size > 0);
    }
}
