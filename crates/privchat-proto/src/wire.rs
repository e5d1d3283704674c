//! Fixed wire strings for handshake prompts and credential replies.
//!
//! These are part of the interoperability contract: clients match on them
//! byte-for-byte.

/// Server prompt after the username is established: send the exchange key.
pub const SEND_EXCHANGE_KEY: &str = "SEND_EXCHANGE_KEY";

/// Server prompt after the exchange key is stored: send the signing key.
pub const SEND_SIGNING_KEY: &str = "SEND_SIGNING_KEY";

/// Prefix of a login request: `LOGIN|username|password`.
pub const LOGIN_PREFIX: &str = "LOGIN|";

/// Prefix of a registration request: `REGISTER|username|password`.
pub const REGISTER_PREFIX: &str = "REGISTER|";

/// Login accepted; doubles as the exchange-key prompt.
pub const LOGIN_OK: &str = "LOGIN_OK";

/// Login rejected (unknown user, wrong password, malformed request).
pub const LOGIN_FAIL: &str = "LOGIN_FAIL";

/// Registration accepted; doubles as the exchange-key prompt.
pub const REGISTER_OK: &str = "REGISTER_OK";

/// Registration rejected (malformed request or store failure).
pub const REGISTER_FAIL: &str = "REGISTER_FAIL";

/// Registration rejected because the username is already taken.
pub const REGISTER_FAIL_USERNAME_EXISTS: &str = "REGISTER_FAIL_USERNAME_EXISTS";
