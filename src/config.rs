use crate::error::{LoadError, Result};
use crate::message::DEFAULT_MESSAGE_SIZE;
use crate::scenarios::ScenarioConfig;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Grace period the producer leaves for outstanding publisher confirms
pub const DEFAULT_CONFIRM_GRACE: Duration = Duration::from_millis(3000);

/// Username presented to the broker alongside the OAuth token
pub const DEFAULT_BROKER_USERNAME: &str = "guest";

/// Merged key/value view over one or more `.properties` files.
///
/// Later files override earlier ones on duplicate keys.
#[derive(Debug, Default, Clone)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and merge the given files in order.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut props = Self::new();
        for path in paths {
            let path = path.as_ref();
            info!(file = %path.display(), "Loading properties file");
            let file = File::open(path).map_err(|e| {
                LoadError::configuration(format!(
                    "Error while reading file [{}]: {}",
                    path.display(),
                    e
                ))
            })?;
            props.merge(BufReader::new(file), &path.display().to_string())?;
        }
        info!(count = props.values.len(), "Read properties");
        Ok(props)
    }

    /// Parse properties from `reader` and merge them over the current set.
    pub fn merge<R: Read>(&mut self, reader: R, source: &str) -> Result<()> {
        let parsed = java_properties::read(reader).map_err(|e| {
            LoadError::configuration(format!("Error while reading file [{}]: {}", source, e))
        })?;
        self.values.extend(parsed);
        Ok(())
    }

    #[cfg(test)]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Required string lookup.
    pub fn get(&self, key: &str) -> Result<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .ok_or_else(|| LoadError::MissingProperty {
                key: key.to_string(),
            })
    }

    /// Required typed lookup.
    pub fn get_parsed<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let raw = self.get(key)?;
        raw.parse().map_err(|e| {
            LoadError::configuration(format!(
                "Property [{}] has invalid value [{}]: {}",
                key, raw, e
            ))
        })
    }

    /// Optional typed lookup; absent keys yield `None`, malformed ones still fail.
    pub fn get_optional<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        if self.contains(key) {
            self.get_parsed(key).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Broker endpoint and routing.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub virtual_host: String,
    pub exchange: String,
    pub routing_key: String,
    pub queue: String,
    pub username: String,
    /// Connect with `amqps`
    pub tls: bool,
    /// Extra PEM trust anchors for the broker certificate
    pub ca_certificate_pem: Option<String>,
}

impl BrokerConfig {
    fn from_properties(props: &Properties) -> Result<Self> {
        Ok(Self {
            host: props.get("rabbitmq.url")?.to_string(),
            port: props.get_parsed("rabbitmq.port")?,
            virtual_host: props.get("rabbitmq.virtual-host")?.to_string(),
            exchange: props.get("rabbitmq.exchange")?.to_string(),
            routing_key: props.get("rabbitmq.routing-key")?.to_string(),
            queue: props.get("rabbitmq.queue")?.to_string(),
            username: props
                .get_optional("rabbitmq.username")?
                .unwrap_or_else(|| DEFAULT_BROKER_USERNAME.to_string()),
            tls: props.get_optional("rabbitmq.tls")?.unwrap_or(true),
            ca_certificate_pem: props
                .get_optional::<PathBuf>("rabbitmq.ca-certificate")?
                .map(|path| read_pem(&path))
                .transpose()?,
        })
    }
}

fn read_pem(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        LoadError::configuration(format!(
            "Error while reading CA certificate [{}]: {}",
            path.display(),
            e
        ))
    })
}

/// OAuth password-grant parameters for the identity provider.
#[derive(Clone)]
pub struct CredentialConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub grant_type: String,
    pub response_type: String,
    pub username: String,
    pub password: String,
}

impl CredentialConfig {
    fn from_properties(props: &Properties) -> Result<Self> {
        Ok(Self {
            token_url: props.get("uaa.token-url")?.to_string(),
            client_id: props.get("uaa.client-id")?.to_string(),
            client_secret: props.get("uaa.client-secret")?.to_string(),
            grant_type: props.get("uaa.grant-type")?.to_string(),
            response_type: props.get("uaa.response-type")?.to_string(),
            username: props.get("gina.username")?.to_string(),
            password: props.get("gina.password")?.to_string(),
        })
    }

    /// Form fields posted to the token endpoint, in wire order.
    pub fn form_fields(&self) -> [(&'static str, &str); 6] {
        [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", self.grant_type.as_str()),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("response_type", self.response_type.as_str()),
        ]
    }
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialConfig")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("grant_type", &self.grant_type)
            .field("response_type", &self.response_type)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Certificate validation for the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsPolicy {
    #[default]
    Verify,
    /// Trust any certificate and hostname. Opt-in only.
    AcceptInvalidCertificates,
}

/// Everything a run needs, validated up front.
#[derive(Debug, Clone)]
pub struct Settings {
    pub scenario: ScenarioConfig,
    pub broker: BrokerConfig,
    pub credentials: CredentialConfig,
    pub tls: TlsPolicy,
    /// Target body length of every generated message
    pub message_size: usize,
    pub confirm_grace: Duration,
    /// Overrides the scenario's per-iteration consumer margin
    pub wait_margin: Option<Duration>,
    /// Publish and honour the end-of-stream marker
    pub end_marker: bool,
}

impl Settings {
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let scenario = ScenarioConfig::from_properties(props)?;
        let broker = BrokerConfig::from_properties(props)?;
        let credentials = CredentialConfig::from_properties(props)?;

        let tls = match props.get_optional("tls.accept-invalid-certs")? {
            Some(true) => {
                warn!("Certificate validation DISABLED for the token endpoint (tls.accept-invalid-certs=true)");
                if broker.tls && broker.ca_certificate_pem.is_none() {
                    warn!("Broker certificate is still validated; a self-signed broker needs rabbitmq.ca-certificate");
                }
                TlsPolicy::AcceptInvalidCertificates
            }
            _ => TlsPolicy::Verify,
        };

        let message_size = props
            .get_optional("message.size")?
            .unwrap_or(DEFAULT_MESSAGE_SIZE);
        let confirm_grace = props
            .get_optional("producer.confirm-grace")?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CONFIRM_GRACE);
        let wait_margin = props
            .get_optional("consumer.wait-margin")?
            .map(Duration::from_millis);
        let end_marker = props.get_optional("scenario.end-marker")?.unwrap_or(false);

        Ok(Self {
            scenario,
            broker,
            credentials,
            tls,
            message_size,
            confirm_grace,
            wait_margin,
            end_marker,
        })
    }
}
