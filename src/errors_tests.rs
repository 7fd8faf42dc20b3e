// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use crate::errors::SyncError;

    #[test]
    fn test_zone_not_found_message() {
        let error = SyncError::ZoneNotFound {
            host: "api.example.org".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "No DNS zone found for host 'api.example.org'"
        );
        assert_eq!(error.reason(), "ZoneNotFound");
    }

    #[test]
    fn test_invalid_address_message() {
        let error = SyncError::InvalidAddress {
            address: "not-an-ip".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Invalid address 'not-an-ip': not an IPv4 or IPv6 literal"
        );
    }

    #[test]
    fn test_missing_node_address_message() {
        let error = SyncError::MissingNodeAddress {
            pod: "web-0".to_string(),
            node: "worker-1".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "Pod 'web-0' on node 'worker-1' has no external node address"
        );
    }

    #[test]
    fn test_provider_helper_keeps_context() {
        let error = SyncError::provider("list zones", "HTTP 500: boom");

        assert_eq!(
            error,
            SyncError::ProviderRequestFailed {
                operation: "list zones".to_string(),
                reason: "HTTP 500: boom".to_string(),
            }
        );
        assert_eq!(
            error.to_string(),
            "DNS provider request 'list zones' failed: HTTP 500: boom"
        );
    }

    #[test]
    fn test_cluster_helper_keeps_context() {
        let error = SyncError::cluster("list nodes", "connection refused");

        assert_eq!(error.reason(), "ClusterRequestFailed");
        assert!(error.to_string().contains("connection refused"));
    }

    #[test]
    fn test_watch_expired_is_not_scoped() {
        let error = SyncError::WatchExpired {
            operation: "watch pods in namespace metrics".to_string(),
        };

        assert_eq!(error.reason(), "WatchExpired");
        assert!(!error.is_scoped());
        assert!(error.to_string().contains("too old"));
    }

    #[test]
    fn test_scoped_errors() {
        assert!(SyncError::ZoneNotFound {
            host: "a".to_string()
        }
        .is_scoped());
        assert!(SyncError::InvalidAddress {
            address: "a".to_string()
        }
        .is_scoped());
        assert!(SyncError::MissingNodeAddress {
            pod: "a".to_string(),
            node: "b".to_string()
        }
        .is_scoped());

        assert!(!SyncError::provider("list zones", "down").is_scoped());
        assert!(!SyncError::cluster("list pods", "down").is_scoped());
    }
}
