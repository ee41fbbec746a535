use std::time::Duration;

use serde_derive::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub devices: Option<Vec<DeviceType>>,
    pub tracking: Option<TrackingConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub publisher_id: Option<String>,
    /// Prefix for topics this service publishes on
    pub topic_path: Option<String>,
    /// Topic the hub publishes its event stream on
    pub eventstream_topic: Option<String>,
    /// Base topic of the hub's state stream, used to warm the state cache
    pub statestream_topic: Option<String>,
    pub keep_alive_seconds: Option<u64>,
}

/// A (manufacturer, product) pair as reported in the zwave entity attributes
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceType {
    pub manufacturer: String,
    pub product: String,
}

impl DeviceType {
    pub fn new(manufacturer: &str, product: &str) -> Self {
        DeviceType {
            manufacturer: manufacturer.to_string(),
            product: product.to_string(),
        }
    }
}

/// Dimmers known to report state before they settle
pub fn default_device_types() -> Vec<DeviceType> {
    vec![DeviceType::new(
        "HomeSeer Technologies",
        "HS-WD200+ Wall Dimmer",
    )]
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct TrackingConfig {
    pub stability_threshold: Option<u32>,
    pub max_polls: Option<u32>,
    pub refresh_delay_seconds: Option<u64>,
    pub debounce: Option<bool>,
    pub filter_devices: Option<bool>,
    pub source_domain: Option<String>,
    pub target_domain: Option<String>,
    pub refresh_service: Option<String>,
    pub stale_after_seconds: Option<u64>,
}

/// Tracking settings with every default filled in
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSettings {
    pub stability_threshold: u32,
    pub max_polls: u32,
    pub refresh_delay: Duration,
    pub debounce: bool,
    pub filter_devices: bool,
    pub source_domain: String,
    pub target_domain: String,
    pub refresh_service: String,
    pub stale_after: Option<Duration>,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        TrackingConfig::default().resolve()
    }
}

impl TrackingConfig {
    pub fn resolve(&self) -> TrackingSettings {
        TrackingSettings {
            stability_threshold: self.stability_threshold.unwrap_or(2).max(1),
            max_polls: self.max_polls.unwrap_or(100),
            refresh_delay: Duration::from_secs(self.refresh_delay_seconds.unwrap_or(1)),
            debounce: self.debounce.unwrap_or(true),
            filter_devices: self.filter_devices.unwrap_or(true),
            source_domain: self.source_domain.clone().unwrap_or("zwave".to_string()),
            target_domain: self.target_domain.clone().unwrap_or("light".to_string()),
            refresh_service: self
                .refresh_service
                .clone()
                .unwrap_or("zwave/refresh_entity".to_string()),
            stale_after: self.stale_after_seconds.map(Duration::from_secs),
        }
    }
}

impl AppConfig {
    pub fn tracking_settings(&self) -> TrackingSettings {
        self.tracking.clone().unwrap_or_default().resolve()
    }

    pub fn device_types(&self) -> Vec<DeviceType> {
        self.devices.clone().unwrap_or_else(default_device_types)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config() {
        let config_str = r#"
            [mqtt]
            host = "localhost"
            port = 1883
            username = "user"
            password = "pass"
            eventstream_topic = "hass/events"
            statestream_topic = "hass/states"

            [tracking]
            stability_threshold = 5
            refresh_delay_seconds = 3
            debounce = false

            [[devices]]
            manufacturer = "HomeSeer Technologies"
            product = "HS-WD100+ Wall Dimmer"
        "#;
        let config: AppConfig = toml::de::from_str(config_str).unwrap();
        assert!(config.mqtt.host == "localhost");
        assert_eq!(config.mqtt.eventstream_topic.as_deref(), Some("hass/events"));
        assert_eq!(config.mqtt.statestream_topic.as_deref(), Some("hass/states"));

        let settings = config.tracking_settings();
        assert_eq!(settings.stability_threshold, 5);
        assert_eq!(settings.max_polls, 100);
        assert_eq!(settings.refresh_delay, Duration::from_secs(3));
        assert!(!settings.debounce);
        assert!(settings.filter_devices);
        assert_eq!(settings.stale_after, None);

        assert_eq!(
            config.device_types(),
            vec![DeviceType::new("HomeSeer Technologies", "HS-WD100+ Wall Dimmer")]
        );
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::de::from_str("[mqtt]\nhost = \"broker\"").unwrap();
        assert_eq!(config.mqtt.statestream_topic, None);
        let settings = config.tracking_settings();
        assert_eq!(settings.stability_threshold, 2);
        assert_eq!(settings.refresh_delay, Duration::from_secs(1));
        assert!(settings.debounce);
        assert_eq!(settings.source_domain, "zwave");
        assert_eq!(settings.target_domain, "light");
        assert_eq!(settings.refresh_service, "zwave/refresh_entity");
        assert_eq!(config.device_types(), default_device_types());
    }
}
