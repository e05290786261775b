// SPDX-FileCopyrightText: 2026 Chatbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for chatbridge.
//!
//! This crate provides the error taxonomy, the relay domain types, input
//! validation, and the trait seams (`RelayStore`, `ConfigProvider`,
//! `ConfigStore`, `PluginAdapter`) that the storage, rate-limit and gateway
//! crates implement or consume.

pub mod error;
pub mod time;
pub mod traits;
pub mod types;
pub mod validate;

// Re-export key items at crate root for ergonomic imports.
pub use error::{BridgeError, ErrorKind};
pub use types::{AdapterType, Endpoint, HealthStatus, Page, Pagination, RateDecision};
pub use validate::SessionId;

pub use traits::{ConfigProvider, ConfigStore, PluginAdapter, RelayStore};

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn error_kinds_classify_every_variant() {
        let cases = [
            (BridgeError::Config("x".into()), ErrorKind::Internal),
            (BridgeError::invalid("x"), ErrorKind::InvalidInput),
            (
                BridgeError::UnknownSession {
                    session_id: "session_a".into(),
                },
                ErrorKind::UnknownSession,
            ),
            (
                BridgeError::DuplicateSession {
                    session_id: "session_a".into(),
                },
                ErrorKind::Conflict,
            ),
            (
                BridgeError::storage(std::io::Error::other("disk")),
                ErrorKind::Storage,
            ),
            (
                BridgeError::Timeout {
                    duration: std::time::Duration::from_secs(5),
                },
                ErrorKind::Storage,
            ),
            (BridgeError::Internal("x".into()), ErrorKind::Internal),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn client_errors_are_flagged() {
        assert!(BridgeError::invalid("x").is_client_error());
        assert!(
            BridgeError::UnknownSession {
                session_id: "s".into()
            }
            .is_client_error()
        );
        assert!(!BridgeError::Internal("x".into()).is_client_error());
    }

    #[test]
    fn endpoint_names_round_trip() {
        for endpoint in Endpoint::iter() {
            let s = endpoint.to_string();
            assert_eq!(Endpoint::from_str(&s).unwrap(), endpoint);
            assert!(endpoint.config_key().ends_with(&s));
        }
        assert_eq!(Endpoint::Inbox.to_string(), "inbox");
    }

    #[test]
    fn endpoint_default_limits() {
        assert_eq!(Endpoint::Messages.default_limit(), 50);
        assert_eq!(Endpoint::Inbox.default_limit(), 120);
        assert_eq!(Endpoint::Outbox.default_limit(), 200);
        assert_eq!(Endpoint::Responses.default_limit(), 200);
        assert_eq!(Endpoint::Sessions.default_limit(), 20);
    }

    #[test]
    fn pagination_clamps_and_defaults() {
        assert_eq!(Pagination::clamped(Some(500), Some(3)).limit, 100);
        assert_eq!(Pagination::clamped(None, None).limit, 50);
        assert_eq!(Pagination::clamped(Some(0), None).limit, 50);
        assert_eq!(Pagination::clamped(Some(10), None).offset, 0);
    }

    #[test]
    fn page_has_more_follows_offset_plus_limit() {
        let first = Page::new(vec![0u8; 10], 25, Pagination::clamped(Some(10), Some(0)));
        assert!(first.has_more);
        let last = Page::new(vec![0u8; 5], 25, Pagination::clamped(Some(10), Some(20)));
        assert!(!last.has_more);
        let exact = Page::new(vec![0u8; 10], 20, Pagination::clamped(Some(10), Some(10)));
        assert!(!exact.has_more);
    }

    #[test]
    fn rate_decision_helpers() {
        assert!(RateDecision::Permitted.is_permitted());
        assert!(!RateDecision::Exceeded.is_permitted());
        assert_eq!(RateDecision::Exceeded.to_string(), "exceeded");
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_relay_store<T: RelayStore>() {}
        fn _assert_config_provider<T: ConfigProvider>() {}
        fn _assert_config_store<T: ConfigStore>() {}
    }
}
