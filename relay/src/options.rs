//! `Run(options)` boot options (§6). Mirrors the original `Options` struct
//! field-for-field: `Address`, `EnableGracefulShutdown`, `ShutdownTimeout`,
//! `HTTP`, `Kafka`/`RabbitMQ`, `ConsumerRegistry`, `CustomTransports`.

use std::time::Duration;

use relay_core::transport::CustomTransport;
use relay_transport::consumer::ReaderFactory;

/// HTTP-specific sub-options (§4.8).
#[derive(Clone, Debug)]
pub struct HttpOptions {
    /// Optional path prefix joined before every HTTP route. Must start with
    /// `/`, must not contain `:` or `*`; a trailing `/` is trimmed.
    /// Violations are fatal at boot.
    pub global_prefix: Option<String>,
    /// Disables the panic-recovery middleware. Recovery is on by default
    /// (§4.8: "enabled by default and may be disabled via config").
    pub disable_recover: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            global_prefix: None,
            disable_recover: false,
        }
    }
}

/// One registered consumer topic: a name (used for logs and, for brokers
/// that don't carry their own topic string, as the delivered event name)
/// paired with the factory that builds its reader (§4.10).
pub struct ConsumerRegistration {
    pub topic: String,
    pub factory: Box<dyn ReaderFactory>,
}

impl ConsumerRegistration {
    pub fn new(topic: impl Into<String>, factory: impl ReaderFactory + 'static) -> Self {
        Self {
            topic: topic.into(),
            factory: Box::new(factory),
        }
    }
}

/// Write-side RabbitMQ options: where the domain-event publisher connects
/// and which durable topic exchange it publishes onto (§6).
#[derive(Clone, Debug)]
pub struct RabbitMqWriteOptions {
    pub uri: String,
    pub exchange: String,
}

/// Boot-time configuration passed to [`crate::App::run`] (§6).
pub struct Options {
    /// `host:port` the HTTP listener binds to.
    pub address: String,
    /// Whether `SIGINT`/`SIGTERM` trigger an orderly shutdown of every
    /// runtime instead of an immediate process exit (§5).
    pub enable_graceful_shutdown: bool,
    /// Upper bound on how long the HTTP server is given to drain in-flight
    /// requests during graceful shutdown. Default 10s (§5).
    pub shutdown_timeout: Duration,
    pub http: HttpOptions,
    /// Registered broker topics the consumer runtime reads from.
    pub consumer_registry: Vec<ConsumerRegistration>,
    /// If set, a `RabbitWriter` is connected at boot and registered as a
    /// domain-event publisher alongside any added via [`crate::App::publisher`].
    pub rabbitmq_publisher: Option<RabbitMqWriteOptions>,
    /// User-supplied transports participating in the same boot/shutdown
    /// lifecycle as the built-in ones (§6: `Transport(hook)`).
    pub custom_transports: Vec<Box<dyn CustomTransport>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            enable_graceful_shutdown: true,
            shutdown_timeout: Duration::from_secs(10),
            http: HttpOptions::default(),
            consumer_registry: Vec::new(),
            rabbitmq_publisher: None,
            custom_transports: Vec::new(),
        }
    }
}
