use std::collections::HashSet;

use crate::config::DeviceType;
use crate::snapshot::Snapshot;

pub const MANUFACTURER_ATTRIBUTE: &str = "manufacturer_name";
pub const PRODUCT_ATTRIBUTE: &str = "product_name";

/// Decides which device notifications are worth tracking
#[derive(Clone, Debug)]
pub enum Eligibility {
    Any,
    Allowlist(HashSet<DeviceType>),
}

impl Eligibility {
    pub fn allowlist(device_types: impl IntoIterator<Item = DeviceType>) -> Self {
        Eligibility::Allowlist(device_types.into_iter().collect())
    }

    /// Checks the device's attributes as they were before the change
    pub fn accepts(&self, old: &Snapshot) -> bool {
        match self {
            Eligibility::Any => true,
            Eligibility::Allowlist(device_types) => {
                let (Some(manufacturer), Some(product)) = (
                    old.text_attribute(MANUFACTURER_ATTRIBUTE),
                    old.text_attribute(PRODUCT_ATTRIBUTE),
                ) else {
                    return false;
                };
                device_types.contains(&DeviceType::new(manufacturer, product))
            }
        }
    }

    /// Human readable roster for the startup log line
    pub fn describe(&self) -> String {
        match self {
            Eligibility::Any => "initialized: tracking all devices".to_string(),
            Eligibility::Allowlist(device_types) => {
                let mut names = device_types
                    .iter()
                    .map(|d| format!("{} {}", d.manufacturer, d.product))
                    .collect::<Vec<_>>();
                names.sort();
                format!(
                    "initialized: tracking these device types: {}",
                    names.join(", ")
                )
            }
        }
    }
}
