use std::fmt;

use crate::dsn::{Dsn, PROTOCOL_VERSION};

/// Represents an auth header.
///
/// The `Display` implementation renders the value of the `X-Sentry-Auth`
/// header.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    client: Option<String>,
    version: u16,
    key: String,
}

impl Auth {
    /// Returns the protocol version the client speaks
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Returns the public key
    pub fn public_key(&self) -> &str {
        &self.key
    }

    /// Returns the client agent string, if any.
    pub fn client_agent(&self) -> Option<&str> {
        self.client.as_deref()
    }
}

impl fmt::Display for Auth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Sentry sentry_key={}, sentry_version={}",
            self.key, self.version
        )?;
        if let Some(ref client) = self.client {
            write!(f, ", sentry_client={}", client)?;
        }
        Ok(())
    }
}

pub(crate) fn auth_from_dsn_and_client(dsn: &Dsn, client: Option<&str>) -> Auth {
    Auth {
        client: client.map(str::to_owned),
        version: PROTOCOL_VERSION,
        key: dsn.public_key().to_owned(),
    }
}

#[test]
fn test_auth_header() {
    let dsn: Dsn = "https://public@example.com/1".parse().unwrap();
    assert_eq!(
        dsn.to_auth(None).to_string(),
        "Sentry sentry_key=public, sentry_version=7"
    );

    let auth = dsn.to_auth(Some("beacon/0.1.0"));
    assert_eq!(auth.client_agent(), Some("beacon/0.1.0"));
    assert_eq!(
        auth.to_string(),
        "Sentry sentry_key=public, sentry_version=7, sentry_client=beacon/0.1.0"
    );
}
