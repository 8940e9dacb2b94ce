//! Client configuration.

use std::{env, time::Duration};

use anyhow::Context;

use crate::protocol::QoS;

/// Client configuration.
///
/// On OneNet the username is the product id, the password the authorization
/// token and the client id the device name.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Broker address (host:port).
    pub address: String,
    /// Product id, sent as the CONNECT username.
    pub product_id: String,
    /// Device name, sent as the CONNECT client id.
    pub device_name: String,
    /// Authorization token, sent as the CONNECT password.
    pub token: String,
    /// Keep-alive interval in seconds (0 = disabled).
    pub keep_alive: u16,
    pub clean_session: bool,
    /// Topic property reports are published to.
    pub publish_topic: String,
    pub publish_qos: QoS,
    /// Topic filters subscribed to after linking.
    pub subscribe_topics: Vec<String>,
    /// How long to wait for the broker to answer a request.
    pub response_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("product-id", "device-name")
    }
}

impl ClientConfig {
    /// A config for `device_name` of `product_id`, using the platform's
    /// property topics.
    pub fn new(product_id: impl Into<String>, device_name: impl Into<String>) -> Self {
        let product_id = product_id.into();
        let device_name = device_name.into();

        Self {
            address: "mqtts.heclouds.com:1883".to_string(),
            publish_topic: format!("$sys/{product_id}/{device_name}/thing/property/post"),
            subscribe_topics: vec![format!("$sys/{product_id}/{device_name}/thing/property/set")],
            product_id,
            device_name,
            token: String::new(),
            keep_alive: 256,
            clean_session: true,
            publish_qos: QoS::AtMostOnce,
            response_timeout: Duration::from_millis(2500),
        }
    }

    /// Overrides the defaults from `MQTTKIT_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = match (env::var("MQTTKIT_PRODUCT_ID"), env::var("MQTTKIT_DEVICE_NAME")) {
            (Ok(product_id), Ok(device_name)) => Self::new(product_id, device_name),
            (Ok(product_id), Err(_)) => Self::new(product_id, "device-name"),
            (Err(_), Ok(device_name)) => Self::new("product-id", device_name),
            (Err(_), Err(_)) => Self::default(),
        };

        if let Ok(address) = env::var("MQTTKIT_ADDRESS") {
            config.address = address;
        }

        if let Ok(token) = env::var("MQTTKIT_TOKEN") {
            config.token = token;
        }

        if let Ok(keep_alive) = env::var("MQTTKIT_KEEP_ALIVE") {
            config.keep_alive = keep_alive
                .parse()
                .with_context(|| format!("MQTTKIT_KEEP_ALIVE is not a number: {keep_alive}"))?;
        }

        if let Ok(topic) = env::var("MQTTKIT_PUBLISH_TOPIC") {
            config.publish_topic = topic;
        }

        if let Ok(qos) = env::var("MQTTKIT_PUBLISH_QOS") {
            let raw: u8 = qos.parse().with_context(|| format!("MQTTKIT_PUBLISH_QOS is not a number: {qos}"))?;
            config.publish_qos = QoS::try_from(raw)?;
        }

        if let Ok(topics) = env::var("MQTTKIT_SUBSCRIBE_TOPICS") {
            config.subscribe_topics =
                topics.split(',').map(str::trim).filter(|t| !t.is_empty()).map(String::from).collect();
        }

        Ok(config)
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Set keep-alive interval in seconds.
    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    pub fn publish_topic(mut self, topic: impl Into<String>, qos: QoS) -> Self {
        self.publish_topic = topic.into();
        self.publish_qos = qos;
        self
    }

    pub fn subscribe_topics(mut self, topics: Vec<String>) -> Self {
        self.subscribe_topics = topics;
        self
    }

    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn keep_alive_interval(&self) -> Option<Duration> {
        (self.keep_alive > 0).then(|| Duration::from_secs(u64::from(self.keep_alive)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_derive_topics() {
        let config = ClientConfig::new("p1", "d1");
        assert_eq!(config.publish_topic, "$sys/p1/d1/thing/property/post");
        assert_eq!(config.subscribe_topics, vec!["$sys/p1/d1/thing/property/set".to_string()]);
        assert_eq!(config.keep_alive_interval(), Some(Duration::from_secs(256)));
    }

    #[test]
    fn builder_setters() {
        let config = ClientConfig::default()
            .address("127.0.0.1:1883")
            .token("secret")
            .keep_alive(0)
            .publish_topic("a/b", QoS::AtLeastOnce);

        assert_eq!(config.address, "127.0.0.1:1883");
        assert_eq!(config.token, "secret");
        assert_eq!(config.keep_alive_interval(), None);
        assert_eq!(config.publish_qos, QoS::AtLeastOnce);
    }
}
