use crate::{ConfigurationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Current version of the stored settings record
pub const SETTINGS_VERSION: u32 = 21;

/// One year, the default holding period after which gains are tax free
const DEFAULT_TAXFREE_AFTER_PERIOD: i64 = 31_536_000;

/// Per-user settings, decoded once at startup from the stored string records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbSettings {
    /// Enables the subgraph-backed balance path
    pub have_premium: bool,

    pub version: u32,
    pub last_write_ts: u64,
    pub premium_should_sync: bool,
    pub include_crypto2crypto: bool,
    pub anonymized_logs: bool,
    pub last_data_upload_ts: u64,
    pub ui_floating_precision: u32,

    /// `None` disables the tax-free period
    pub taxfree_after_period: Option<i64>,

    pub balance_save_frequency: u32,
    pub include_gas_costs: bool,
    pub historical_data_start: String,
    pub eth_rpc_endpoint: String,
    pub main_currency: String,
    pub date_display_format: String,
    pub thousand_separator: String,
    pub decimal_separator: String,
    pub currency_location: String,
    pub last_balance_save: u64,
    pub submit_usage_analytics: bool,

    /// Protocol modules the user has turned on
    pub active_modules: Vec<String>,

    pub frontend_settings: String,
}

impl Default for DbSettings {
    fn default() -> Self {
        Self {
            have_premium: false,
            version: SETTINGS_VERSION,
            last_write_ts: 0,
            premium_should_sync: false,
            include_crypto2crypto: true,
            anonymized_logs: false,
            last_data_upload_ts: 0,
            ui_floating_precision: 2,
            taxfree_after_period: Some(DEFAULT_TAXFREE_AFTER_PERIOD),
            balance_save_frequency: 24,
            include_gas_costs: true,
            historical_data_start: "01/08/2015".to_string(),
            eth_rpc_endpoint: "http://localhost:8545".to_string(),
            main_currency: "USD".to_string(),
            date_display_format: "%d/%m/%Y %H:%M:%S %Z".to_string(),
            thousand_separator: ",".to_string(),
            decimal_separator: ".".to_string(),
            currency_location: "after".to_string(),
            last_balance_save: 0,
            submit_usage_analytics: true,
            active_modules: vec!["uniswap".to_string(), "sushiswap".to_string()],
            frontend_settings: String::new(),
        }
    }
}

/// Decodes a stored value into its field; `Ok(Some(_))` carries a warning
type DecodeFn = fn(&mut DbSettings, &str) -> Result<Option<String>>;

/// Encodes a field into its stored form; `None` means "stored as empty"
type EncodeFn = fn(&DbSettings) -> Option<String>;

struct SettingField {
    name: &'static str,
    decode: DecodeFn,
    encode: EncodeFn,
}

fn invalid(name: &str, value: &str, reason: impl std::fmt::Display) -> ConfigurationError {
    ConfigurationError::InvalidValue(format!("{} = '{}': {}", name, value, reason))
}

pub fn read_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigurationError::InvalidValue(format!(
            "Failed to read a boolean from '{}'",
            value
        ))),
    }
}

fn encode_bool(value: bool) -> String {
    let encoded = if value { "True" } else { "False" };
    encoded.to_string()
}

fn decode_taxfree(settings: &mut DbSettings, value: &str) -> Result<Option<String>> {
    if value.trim().is_empty() {
        settings.taxfree_after_period = None;
        return Ok(None);
    }

    let period: i64 = value
        .trim()
        .parse()
        .map_err(|e| invalid("taxfree_after_period", value, e))?;

    if period <= 0 {
        settings.taxfree_after_period = None;
        return Ok(Some(format!(
            "A negative or zero value ({}) for taxfree_after_period was stored. Treating it as disabled",
            period
        )));
    }

    settings.taxfree_after_period = Some(period);
    Ok(None)
}

fn decode_version(settings: &mut DbSettings, value: &str) -> Result<Option<String>> {
    let version: u32 = value.trim().parse().map_err(|e| invalid("version", value, e))?;
    settings.version = version;

    if version > SETTINGS_VERSION {
        return Ok(Some(format!(
            "Stored settings version {} is newer than the supported version {}",
            version, SETTINGS_VERSION
        )));
    }
    Ok(None)
}

fn decode_active_modules(settings: &mut DbSettings, value: &str) -> Result<Option<String>> {
    settings.active_modules =
        serde_json::from_str(value).map_err(|e| invalid("active_modules", value, e))?;
    Ok(None)
}

macro_rules! bool_field {
    ($name:ident) => {
        SettingField {
            name: stringify!($name),
            decode: |s, v| {
                s.$name = read_bool(v)?;
                Ok(None)
            },
            encode: |s| Some(encode_bool(s.$name)),
        }
    };
}

macro_rules! int_field {
    ($name:ident) => {
        SettingField {
            name: stringify!($name),
            decode: |s, v| {
                s.$name = v.trim().parse().map_err(|e| invalid(stringify!($name), v, e))?;
                Ok(None)
            },
            encode: |s| Some(s.$name.to_string()),
        }
    };
}

macro_rules! string_field {
    ($name:ident) => {
        SettingField {
            name: stringify!($name),
            decode: |s, v| {
                s.$name = v.to_string();
                Ok(None)
            },
            encode: |s| Some(s.$name.clone()),
        }
    };
}

fn schema() -> Vec<SettingField> {
    vec![
        bool_field!(have_premium),
        SettingField {
            name: "version",
            decode: decode_version,
            encode: |s| Some(s.version.to_string()),
        },
        int_field!(last_write_ts),
        bool_field!(premium_should_sync),
        bool_field!(include_crypto2crypto),
        bool_field!(anonymized_logs),
        int_field!(last_data_upload_ts),
        int_field!(ui_floating_precision),
        SettingField {
            name: "taxfree_after_period",
            decode: decode_taxfree,
            encode: |s| s.taxfree_after_period.map(|p| p.to_string()),
        },
        int_field!(balance_save_frequency),
        bool_field!(include_gas_costs),
        string_field!(historical_data_start),
        string_field!(eth_rpc_endpoint),
        string_field!(main_currency),
        string_field!(date_display_format),
        string_field!(thousand_separator),
        string_field!(decimal_separator),
        string_field!(currency_location),
        int_field!(last_balance_save),
        bool_field!(submit_usage_analytics),
        SettingField {
            name: "active_modules",
            decode: decode_active_modules,
            encode: |s| serde_json::to_string(&s.active_modules).ok(),
        },
        string_field!(frontend_settings),
    ]
}

impl DbSettings {
    /// Decode a single stored record into `self`.
    ///
    /// Returns a warning for values that were accepted but adjusted.
    pub fn apply_record(&mut self, name: &str, value: &str) -> Result<Option<String>> {
        let field = schema()
            .into_iter()
            .find(|field| field.name == name)
            .ok_or_else(|| ConfigurationError::UnknownSetting(name.to_string()))?;

        (field.decode)(self, value)
    }

    /// Build settings from stored records, starting from the defaults.
    ///
    /// Unknown keys and undecodable values are skipped and reported as
    /// warnings; they never fail the load.
    pub fn from_records(records: &HashMap<String, String>) -> (Self, Vec<String>) {
        let mut settings = Self::default();
        let mut warnings = Vec::new();

        let mut names: Vec<&String> = records.keys().collect();
        names.sort();

        for name in names {
            let value = &records[name];
            match settings.apply_record(name, value) {
                Ok(None) => {}
                Ok(Some(warning)) => warnings.push(warning),
                Err(ConfigurationError::UnknownSetting(_)) => {
                    warnings.push(format!("Unknown setting {} given. Ignoring it", name))
                }
                Err(e) => warnings.push(format!("Ignoring stored setting {}: {}", name, e)),
            }
        }

        for warning in &warnings {
            warn!("{}", warning);
        }

        (settings, warnings)
    }

    /// Every field in its stored string form; disabled optional values are empty
    pub fn to_records(&self) -> BTreeMap<String, String> {
        schema()
            .iter()
            .map(|field| (field.name.to_string(), (field.encode)(self).unwrap_or_default()))
            .collect()
    }

    pub fn is_module_active(&self, module: &str) -> bool {
        self.active_modules.iter().any(|m| m == module)
    }
}

/// A partial update of the user-modifiable settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifiableSettings {
    pub premium_should_sync: Option<bool>,
    pub include_crypto2crypto: Option<bool>,
    pub anonymized_logs: Option<bool>,
    pub ui_floating_precision: Option<u32>,

    /// -1 disables the tax-free period
    pub taxfree_after_period: Option<i64>,

    pub balance_save_frequency: Option<u32>,
    pub include_gas_costs: Option<bool>,
    pub historical_data_start: Option<String>,
    pub eth_rpc_endpoint: Option<String>,
    pub main_currency: Option<String>,
    pub date_display_format: Option<String>,
    pub thousand_separator: Option<String>,
    pub decimal_separator: Option<String>,
    pub currency_location: Option<String>,
    pub submit_usage_analytics: Option<bool>,
    pub active_modules: Option<Vec<String>>,
    pub frontend_settings: Option<String>,
}

impl ModifiableSettings {
    /// The stored string records for every field that is set
    pub fn serialize(&self) -> BTreeMap<String, String> {
        let mut records = BTreeMap::new();
        let mut put = |name: &str, value: Option<String>| {
            if let Some(value) = value {
                records.insert(name.to_string(), value);
            }
        };

        put("premium_should_sync", self.premium_should_sync.map(encode_bool));
        put("include_crypto2crypto", self.include_crypto2crypto.map(encode_bool));
        put("anonymized_logs", self.anonymized_logs.map(encode_bool));
        put("ui_floating_precision", self.ui_floating_precision.map(|v| v.to_string()));
        put(
            "taxfree_after_period",
            self.taxfree_after_period
                .map(|v| if v == -1 { String::new() } else { v.to_string() }),
        );
        put("balance_save_frequency", self.balance_save_frequency.map(|v| v.to_string()));
        put("include_gas_costs", self.include_gas_costs.map(encode_bool));
        put("historical_data_start", self.historical_data_start.clone());
        put("eth_rpc_endpoint", self.eth_rpc_endpoint.clone());
        put("main_currency", self.main_currency.clone());
        put("date_display_format", self.date_display_format.clone());
        put("thousand_separator", self.thousand_separator.clone());
        put("decimal_separator", self.decimal_separator.clone());
        put("currency_location", self.currency_location.clone());
        put("submit_usage_analytics", self.submit_usage_analytics.map(encode_bool));
        put(
            "active_modules",
            self.active_modules
                .as_ref()
                .and_then(|m| serde_json::to_string(m).ok()),
        );
        put("frontend_settings", self.frontend_settings.clone());

        records
    }

    /// Apply the update to `settings` through the same decoders used on load
    pub fn apply_to(&self, settings: &mut DbSettings) -> Result<()> {
        for (name, value) in self.serialize() {
            settings.apply_record(&name, &value)?;
        }
        Ok(())
    }
}
