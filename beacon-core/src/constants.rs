use std::sync::LazyLock;

use crate::protocol::{ClientSdkInfo, ClientSdkPackage};

/// The version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The user agent reported by default transports.
pub static USER_AGENT: LazyLock<String> = LazyLock::new(|| format!("beacon.rust/{}", VERSION));

/// The SDK metadata attached to every event.
pub static SDK_INFO: LazyLock<ClientSdkInfo> = LazyLock::new(|| ClientSdkInfo {
    name: "beacon.rust".into(),
    version: VERSION.into(),
    integrations: vec![],
    packages: vec![ClientSdkPackage {
        name: "cargo:beacon".into(),
        version: VERSION.into(),
    }],
});
