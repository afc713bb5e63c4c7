pub const fn project_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}

/// Value used for the `Server` header of every lifecycle server response.
pub const fn server_identifier() -> &'static str {
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
}
