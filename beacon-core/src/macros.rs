/// Returns the intended release as an `Option<Cow<'static, str>>`.
///
/// This can be used with `ClientOptions` to set the release name.  It uses
/// the information supplied by cargo to calculate a release.
///
/// # Examples
///
/// ```
/// let options = beacon_core::ClientOptions {
///     release: beacon_core::release_name!(),
///     ..Default::default()
/// };
/// assert!(options.release.unwrap().starts_with("beacon"));
/// ```
#[macro_export]
macro_rules! release_name {
    () => {{
        use std::sync::LazyLock;
        static RELEASE: LazyLock<Option<String>> = LazyLock::new(|| {
            option_env!("CARGO_PKG_NAME").and_then(|name| {
                option_env!("CARGO_PKG_VERSION").map(|version| format!("{}@{}", name, version))
            })
        });
        RELEASE
            .as_deref()
            .map(|release| ::std::borrow::Cow::Borrowed(release))
    }};
}

#[macro_export]
#[doc(hidden)]
#[cfg(feature = "debug-logs")]
macro_rules! beacon_debug {
    ($($arg:tt)*) => {
        $crate::log::debug!(target: "beacon", $($arg)*);
    }
}

#[macro_export]
#[doc(hidden)]
#[cfg(not(feature = "debug-logs"))]
macro_rules! beacon_debug {
    ($($arg:tt)*) => {
        $crate::Hub::with(|hub| {
            if hub.client().is_some_and(|c| c.options().debug) {
                eprint!("[beacon] ");
                eprintln!($($arg)*);
            }
        });
    }
}
