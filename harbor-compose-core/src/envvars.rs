//! Environment variable classification.
//!
//! Variables coming from the platform are partitioned into four buckets:
//! deployment metadata ("special"), log-shipping settings, secrets
//! ("hidden") and plain configuration ("basic"). The restart marker is
//! dropped altogether.

use std::collections::BTreeMap;

use crate::shipment::{EnvVarPayload, EnvVarType};

/// Variable used only to force a redeploy; never written to compose files.
pub const RESTART_MARKER: &str = "HC_RESTART";

/// Names reserved for deployment metadata.
pub const SPECIAL_ENV_VARS: [&str; 5] = ["CUSTOMER", "PRODUCT", "PROJECT", "PROPERTY", "BARGE"];

/// Names that configure platform log shipping.
pub const LOG_SHIPPING_ENV_VARS: [&str; 7] = [
    "SHIP_LOGS",
    "LOGS_ENDPOINT",
    "LOGS_ACCESS_KEY",
    "LOGS_SECRET_KEY",
    "LOGS_DOMAIN_NAME",
    "LOGS_REGION",
    "LOGS_QUEUE_NAME",
];

/// Destination bucket for a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvVarBucket {
    /// Deployment metadata.
    Special,
    /// Log-shipping configuration.
    LogShipping,
    /// Secret routed to the hidden env file.
    Hidden,
    /// Plain configuration written to the compose environment.
    Basic,
}

/// Decide which bucket a variable belongs to, or `None` for the restart marker.
pub fn bucket_for(var: &EnvVarPayload) -> Option<EnvVarBucket> {
    let name = var.name.to_uppercase();
    if name == RESTART_MARKER {
        return None;
    }
    if SPECIAL_ENV_VARS.contains(&name.as_str()) {
        return Some(EnvVarBucket::Special);
    }
    if LOG_SHIPPING_ENV_VARS.contains(&name.as_str()) {
        return Some(EnvVarBucket::LogShipping);
    }
    if var.var_type == EnvVarType::Hidden {
        return Some(EnvVarBucket::Hidden);
    }
    Some(EnvVarBucket::Basic)
}

/// Whether a name is the restart marker (case-insensitive).
pub fn is_restart_marker(name: &str) -> bool {
    name.eq_ignore_ascii_case(RESTART_MARKER)
}

/// Whether a name is one of the log-shipping variables (case-insensitive).
pub fn is_log_shipping(name: &str) -> bool {
    let name = name.to_uppercase();
    LOG_SHIPPING_ENV_VARS.contains(&name.as_str())
}

/// Escape `$` as `$$` so compose interpolation leaves values untouched.
pub fn escape_dollars(value: &str) -> String {
    value.replace('$', "$$")
}

/// Reverse [`escape_dollars`].
pub fn unescape_dollars(value: &str) -> String {
    value.replace("$$", "$")
}

/// Variables partitioned into mutually exclusive buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassifiedEnvVars {
    /// Deployment metadata, values unescaped.
    pub special: BTreeMap<String, String>,
    /// Log-shipping settings, values escaped.
    pub log_shipping: BTreeMap<String, String>,
    /// Secrets, values escaped.
    pub hidden: BTreeMap<String, String>,
    /// Plain configuration, values escaped.
    pub basic: BTreeMap<String, String>,
}

impl ClassifiedEnvVars {
    /// Classify a single tier of variables.
    pub fn from_vars(vars: &[EnvVarPayload]) -> Self {
        let mut classified = Self::default();
        classified.classify(vars);
        classified
    }

    /// Merge another tier; later calls overwrite names seen earlier.
    pub fn classify(&mut self, vars: &[EnvVarPayload]) {
        for var in vars {
            let Some(bucket) = bucket_for(var) else {
                continue;
            };
            self.remove(&var.name);
            let value = match bucket {
                EnvVarBucket::Special => var.value.clone(),
                _ => escape_dollars(&var.value),
            };
            self.bucket_mut(bucket).insert(var.name.clone(), value);
        }
    }

    /// Total number of classified variables.
    pub fn len(&self) -> usize {
        self.special.len() + self.log_shipping.len() + self.hidden.len() + self.basic.len()
    }

    /// Whether every bucket is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a special variable case-insensitively.
    pub fn special_value(&self, name: &str) -> Option<&str> {
        self.special
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn remove(&mut self, name: &str) {
        self.special.remove(name);
        self.log_shipping.remove(name);
        self.hidden.remove(name);
        self.basic.remove(name);
    }

    fn bucket_mut(&mut self, bucket: EnvVarBucket) -> &mut BTreeMap<String, String> {
        match bucket {
            EnvVarBucket::Special => &mut self.special,
            EnvVarBucket::LogShipping => &mut self.log_shipping,
            EnvVarBucket::Hidden => &mut self.hidden,
            EnvVarBucket::Basic => &mut self.basic,
        }
    }
}
