use crate::config::BrokerConfig;
use crate::error::{LoadError, Result};
use lapin::tcp::OwnedTLSConfig;
use lapin::uri::{AMQPAuthority, AMQPScheme, AMQPUri, AMQPUserInfo};
use lapin::{Channel, Connection, ConnectionProperties};
use tracing::{debug, info};

const CLOSE_REPLY_CODE: u16 = 200;
const CLOSE_REPLY_TEXT: &str = "OK";

/// Build the connection URI; the OAuth token goes in the password slot.
pub fn amqp_uri(broker: &BrokerConfig, token: &str) -> AMQPUri {
    AMQPUri {
        scheme: if broker.tls {
            AMQPScheme::AMQPS
        } else {
            AMQPScheme::AMQP
        },
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: broker.username.clone(),
                password: token.to_string(),
            },
            host: broker.host.clone(),
            port: broker.port,
        },
        vhost: broker.virtual_host.clone(),
        ..Default::default()
    }
}

/// One connection plus one channel, owned by a single worker
pub struct Session {
    connection: Connection,
    channel: Channel,
    role: &'static str,
}

impl Session {
    pub async fn open(broker: &BrokerConfig, token: &str, role: &'static str) -> Result<Self> {
        let tls_config = OwnedTLSConfig {
            identity: None,
            cert_chain: broker.ca_certificate_pem.clone(),
        };
        let properties = ConnectionProperties::default()
            .with_connection_name(format!("rabbitmq-load-{}", role).into());

        debug!(
            role,
            host = %broker.host,
            port = broker.port,
            vhost = %broker.virtual_host,
            tls = broker.tls,
            "Connecting to broker"
        );
        let connection = Connection::connect_uri_with_config(
            amqp_uri(broker, token),
            properties,
            tls_config,
        )
        .await
        .map_err(|e| LoadError::transport("connect", e))?;

        let channel = match connection.create_channel().await {
            Ok(channel) => channel,
            Err(e) => {
                let _ = connection.close(CLOSE_REPLY_CODE, CLOSE_REPLY_TEXT).await;
                return Err(LoadError::transport("channel.open", e));
            }
        };

        info!(role, host = %broker.host, vhost = %broker.virtual_host, "Broker session open");
        Ok(Self {
            connection,
            channel,
            role,
        })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Close channel then connection. Failures are logged only; the worker
    /// is finishing either way.
    pub async fn close(self) {
        if let Err(e) = self.channel.close(CLOSE_REPLY_CODE, CLOSE_REPLY_TEXT).await {
            debug!(role = self.role, error = %e, "Channel close failed");
        }
        if let Err(e) = self.connection.close(CLOSE_REPLY_CODE, CLOSE_REPLY_TEXT).await {
            debug!(role = self.role, error = %e, "Connection close failed");
        }
        info!(role = self.role, "Broker session closed");
    }
}
