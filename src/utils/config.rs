//! Configuration parameters struct parsing helper.

/// Composes a configuration struct from its default values, then overwrites
/// the listed fields with values parsed from the given TOML string (if any).
/// Returns `Ok(config)` on success, and `Err(ShardsetError)` when the string
/// fails to parse or names a field outside the listed set.
///
/// Example:
/// ```no_run
/// let config = parsed_config!(config_str => MyConfig; poll_ms, cap)?;
/// ```
#[macro_export]
macro_rules! parsed_config {
    ($config_str:expr => $config_type:ty; $($field:ident),+) => {{
        // closure helper for easier error returning
        let compose = || -> Result<$config_type, $crate::ShardsetError> {
            let mut config: $config_type = Default::default();
            let config_str: Option<&str> = $config_str;
            let Some(config_str) = config_str else {
                return Ok(config);
            };

            let mut table = config_str.parse::<toml::Table>()?;

            // overwrite each listed field found in the parsed table
            $(
                if let Some(value) = table.remove(stringify!($field)) {
                    config.$field = value.try_into()?;
                }
            )+

            // any key remaining in the table was not a listed field name
            if let Some(name) = table.keys().next() {
                return Err($crate::ShardsetError(format!(
                    "invalid field name '{}' in config",
                    name
                )));
            }

            Ok(config)
        };

        compose()
    }};
}
