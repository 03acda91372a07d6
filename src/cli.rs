//! Extra CLI arguments as sink/command kwargs.

use toml::Value;

/// Turn `--key value` pairs into a kwargs table.
///
/// ```text
/// ["--exchange", "BYBIT", "--symbol", "BTC"] -> { exchange = "BYBIT", symbol = "BTC" }
/// ["--verbose", "--timeout", "30"]          -> { verbose = true, timeout = "30" }
/// ["--some-key", "value"]                   -> { some_key = "value" }
/// ```
///
/// Values stay strings; a flag followed by another `--option` (or by
/// nothing) becomes `true`. Tokens that are not options are skipped. A
/// repeated key keeps its last value.
pub fn args_to_kwargs<I, S>(args: I) -> toml::Table
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let args: Vec<S> = args.into_iter().collect();
    let mut kwargs = toml::Table::new();
    let mut i = 0;
    while i < args.len() {
        let Some(key) = args[i].as_ref().strip_prefix("--") else {
            i += 1;
            continue;
        };
        let key = key.replace('-', "_");
        match args.get(i + 1).map(AsRef::as_ref) {
            Some(value) if !value.starts_with("--") => {
                kwargs.insert(key, Value::String(value.to_string()));
                i += 2;
            }
            _ => {
                kwargs.insert(key, Value::Boolean(true));
                i += 1;
            }
        }
    }
    kwargs
}
