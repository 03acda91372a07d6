//! Alias registry through the public API, with the registries the apps ship.

use pfund_kit::{AliasOptions, AliasRegistry, KitError};

fn data_sources() -> AliasRegistry {
    AliasRegistry::new([
        ("YF", "YAHOO_FINANCE"),
        ("FRD", "FIRSTRATE_DATA"),
        ("DBT", "DATABENTO"),
        ("FMP", "FINANCIAL_MODELING_PREP"),
    ])
    .unwrap()
}

#[test]
fn test_data_source_aliases() {
    let registry = data_sources();
    assert_eq!(registry.resolve("YF"), "YAHOO_FINANCE");
    assert_eq!(registry.resolve("DBT"), "DATABENTO");
    assert_eq!(registry.resolve("YAHOO_FINANCE"), "YAHOO_FINANCE");
    assert_eq!(registry.get_alias("DATABENTO"), Some("DBT"));
}

#[test]
fn test_cli_choice_expansion() {
    let canonical = ["YAHOO_FINANCE", "DATABENTO", "FIRSTRATE_DATA", "POLYGON"];
    let registry = data_sources();

    let mut choices: Vec<&str> = canonical.to_vec();
    choices.extend(canonical.iter().filter_map(|c| registry.get_alias(c)));
    assert_eq!(
        choices,
        vec!["YAHOO_FINANCE", "DATABENTO", "FIRSTRATE_DATA", "POLYGON", "YF", "DBT", "FRD"]
    );
    assert_eq!(registry.resolve("FRD"), "FIRSTRATE_DATA");
}

#[test]
fn test_trading_terms_case_insensitive() {
    let registry = AliasRegistry::with_options(
        [
            ("px", "price"),
            ("qty", "quantity"),
            ("SPOT", "cryptocurrency"),
            ("PERP", "perpetual_contract"),
            ("IB", "interactive brokers"),
        ],
        AliasOptions { case_sensitive: false, allow_conflicts: false },
    )
    .unwrap();
    assert_eq!(registry.resolve("PX"), "price");
    assert_eq!(registry.resolve("perp"), "perpetual_contract");
    assert_eq!(registry.resolve("Interactive Brokers"), "interactive brokers");
    assert_eq!(registry.get_alias("PRICE"), Some("px"));
    assert!(registry.contains("Spot"));
}

#[test]
fn test_conflicts_name_both_entries() {
    let err = AliasRegistry::new([("A", "X"), ("X", "Y")]).unwrap_err();
    let msg = err.to_string();
    assert!(matches!(err, KitError::AliasConflict { .. }));
    assert!(msg.contains("'X'"), "{msg}");
    assert!(msg.contains("'A'"), "{msg}");

    let lenient = AliasRegistry::with_options(
        [("A", "X"), ("X", "Y")],
        AliasOptions { case_sensitive: true, allow_conflicts: true },
    )
    .unwrap();
    assert_eq!(lenient.len(), 2);
}

#[test]
fn test_registry_from_settings_table() {
    let table: toml::Table = toml::from_str(
        r#"
YF = "YAHOO_FINANCE"
BYB = "BYBIT"
"#,
    )
    .unwrap();
    let registry = AliasRegistry::try_from(table).unwrap();
    assert_eq!(registry.aliases().collect::<Vec<_>>(), vec!["YF", "BYB"]);
    assert_eq!(registry.lookup("BYB").unwrap(), "BYBIT");
    assert!(matches!(registry.lookup("BYBIT"), Err(KitError::AliasNotFound(_))));
}
