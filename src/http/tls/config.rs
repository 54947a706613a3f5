//! TLS client configuration

use crate::config::ConnectionSettings;
use openssl::ssl::{SslContext, SslContextBuilder, SslFiletype, SslMethod, SslVerifyMode};
use std::path::Path;

/// TLS errors
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] openssl::error::ErrorStack),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Certificate error: {0}")]
    Certificate(String),

    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),
}

/// TLS configuration (immutable after building)
#[derive(Clone)]
pub struct TlsConfig {
    pub(crate) ctx: SslContext,
    pub(crate) servername: Option<String>,
    pub(crate) verify_peer: bool,
}

impl TlsConfig {
    /// Create a new client configuration builder
    pub fn client() -> Result<ClientConfigBuilder, TlsError> {
        ClientConfigBuilder::new()
    }

    /// Build the context a session with `settings` needs
    ///
    /// Certificate and key files are loaded here, so a bad path fails at
    /// construction rather than on first send.
    pub fn from_settings(settings: &ConnectionSettings, alpn: &[&str]) -> Result<Self, TlsError> {
        let mut builder = Self::client()?
            .servername(settings.server_name())
            .verify_peer(!settings.disable_cert_validation);

        if let Some(cert) = &settings.client_cert {
            builder = builder.client_cert(cert, settings.client_key.as_deref())?;
        }
        if !alpn.is_empty() {
            builder = builder.alpn(alpn)?;
        }

        builder.build()
    }

    /// Whether the peer certificate is checked
    pub fn verifies_peer(&self) -> bool {
        self.verify_peer
    }

    /// Connect to a server with TLS
    pub fn connect(
        &self,
        stream: std::net::TcpStream,
    ) -> Result<super::TlsSessionOps, TlsError> {
        super::session::TlsSessionOps::connect(stream, self)
    }
}

/// Client configuration builder
pub struct ClientConfigBuilder {
    ctx_builder: SslContextBuilder,
    servername: Option<String>,
    verify_peer: bool,
}

impl ClientConfigBuilder {
    fn new() -> Result<Self, TlsError> {
        let mut ctx_builder = SslContextBuilder::new(SslMethod::tls_client())?;

        // Default: don't verify peer
        ctx_builder.set_verify(SslVerifyMode::NONE);

        Ok(ClientConfigBuilder {
            ctx_builder,
            servername: None,
            verify_peer: false,
        })
    }

    /// Set SNI servername (also the name checked when verifying)
    pub fn servername(mut self, name: impl Into<String>) -> Self {
        self.servername = Some(name.into());
        self
    }

    /// Enable/disable peer certificate verification
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        if verify {
            self.ctx_builder.set_verify(SslVerifyMode::PEER);
        } else {
            self.ctx_builder.set_verify(SslVerifyMode::NONE);
        }
        self
    }

    /// Load a client certificate chain and its private key (PEM)
    ///
    /// With no key path the key is read from the certificate file.
    pub fn client_cert(mut self, cert: &Path, key: Option<&Path>) -> Result<Self, TlsError> {
        let key = key.unwrap_or(cert);

        self.ctx_builder
            .set_certificate_chain_file(cert)
            .map_err(|e| {
                TlsError::Certificate(format!(
                    "Failed to load certificate {}: {}",
                    cert.display(),
                    e
                ))
            })?;

        self.ctx_builder
            .set_private_key_file(key, SslFiletype::PEM)
            .map_err(|e| {
                TlsError::Certificate(format!(
                    "Failed to load private key {}: {}",
                    key.display(),
                    e
                ))
            })?;

        self.ctx_builder
            .check_private_key()
            .map_err(|e| TlsError::Certificate(format!("Key does not match certificate: {}", e)))?;

        Ok(self)
    }

    /// Set ALPN protocols
    pub fn alpn(mut self, protocols: &[&str]) -> Result<Self, TlsError> {
        // Encode ALPN protocols (length-prefixed)
        let mut alpn_bytes = Vec::new();
        for proto in protocols {
            let len = u8::try_from(proto.len()).map_err(|_| {
                TlsError::InvalidConfig(format!("ALPN protocol too long: {}", proto))
            })?;
            alpn_bytes.push(len);
            alpn_bytes.extend_from_slice(proto.as_bytes());
        }
        self.ctx_builder.set_alpn_protos(&alpn_bytes)?;
        Ok(self)
    }

    /// Build the TLS configuration
    pub fn build(mut self) -> Result<TlsConfig, TlsError> {
        if self.verify_peer {
            self.ctx_builder.set_default_verify_paths()?;
        }

        Ok(TlsConfig {
            ctx: self.ctx_builder.build(),
            servername: self.servername,
            verify_peer: self.verify_peer,
        })
    }
}
