//! TLS transport for MQTT brokers.
//!
//! Reads the CA certificate and, when both are configured, the client
//! certificate and key from PEM files into rumqttc's TLS transport.

use rumqttc::{TlsConfiguration, Transport};

use ps_protocol::MqttSettings;

use crate::error::{ProviderError, ProviderResult};

/// Build a TLS transport from the certificate paths in `settings`.
///
/// A CA certificate is required. Client authentication is enabled only when
/// both a client certificate and key are configured.
pub fn load_tls_transport(settings: &MqttSettings) -> ProviderResult<Transport> {
    let ca_path = settings
        .tls_ca
        .as_deref()
        .ok_or_else(|| ProviderError::Tls("TLS enabled but no CA cert configured".into()))?;
    let ca = read_pem(ca_path, "CA cert")?;

    let client_auth = match (&settings.tls_client_cert, &settings.tls_client_key) {
        (Some(cert), Some(key)) => Some((read_pem(cert, "client cert")?, read_pem(key, "client key")?)),
        (None, None) => None,
        _ => {
            return Err(ProviderError::Tls(
                "client cert and client key must be configured together".into(),
            ));
        }
    };

    Ok(Transport::tls_with_config(TlsConfiguration::Simple {
        ca,
        alpn: None,
        client_auth,
    }))
}

fn read_pem(path: &str, what: &str) -> ProviderResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| ProviderError::Tls(format!("failed to read {what} '{path}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_protocol::Qos;

    fn settings() -> MqttSettings {
        MqttSettings {
            server_url: "mqtts://localhost:8883".into(),
            client_id: "test".into(),
            username: None,
            password: None,
            use_tls: true,
            tls_ca: Some("/nonexistent/ca.pem".into()),
            tls_client_cert: None,
            tls_client_key: None,
            publish_qos: Qos::AtMostOnce,
            subscribe_qos: Qos::AtMostOnce,
            keepalive_secs: 30,
        }
    }

    #[test]
    fn missing_ca_cert_returns_error() {
        let err = load_tls_transport(&settings()).err().expect("should fail");
        let msg = err.to_string();
        assert!(msg.contains("CA cert"), "error should mention CA cert: {msg}");
    }

    #[test]
    fn unconfigured_ca_returns_error() {
        let mut settings = settings();
        settings.tls_ca = None;
        let err = load_tls_transport(&settings).err().expect("should fail");
        assert!(matches!(err, ProviderError::Tls(_)));
    }

    #[test]
    fn half_configured_client_auth_is_rejected() {
        let dir = std::env::temp_dir().join(format!("ps-tls-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let ca = dir.join("ca.pem");
        std::fs::write(&ca, b"-----BEGIN CERTIFICATE-----\n").unwrap();

        let mut settings = settings();
        settings.tls_ca = Some(ca.to_string_lossy().into_owned());
        settings.tls_client_cert = Some("/nonexistent/cert.pem".into());

        let err = load_tls_transport(&settings).err().expect("should fail");
        assert!(err.to_string().contains("together"), "{err}");
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
