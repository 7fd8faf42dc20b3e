// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `desired.rs`

#[cfg(test)]
mod tests {
    use crate::cluster::PodObservation;
    use crate::config::AnnotationKeys;
    use crate::desired::{build_desired_state, parse_proxy_flag, pod_hostname};
    use crate::errors::SyncError;
    use crate::test_support::{node, pod, proxied_pod};
    use std::collections::BTreeSet;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_single_pod_maps_to_node_address() {
        let nodes = vec![node("worker-1", Some("1.2.3.4"))];
        let pods = vec![pod("web-0", "worker-1", "api.example.com")];

        let state = build_desired_state(&nodes, &pods, &AnnotationKeys::default());

        let host = state.get("api.example.com").unwrap();
        assert_eq!(host.addresses, set(&["1.2.3.4"]));
        assert_eq!(host.source_pods, set(&["web-0"]));
        assert!(!host.proxied);
        assert!(state.diagnostics.is_empty());
    }

    #[test]
    fn test_pods_without_annotation_are_ignored() {
        let nodes = vec![node("worker-1", Some("1.2.3.4"))];
        let blank = pod("blank", "worker-1", "   ");
        let pods = vec![
            PodObservation {
                name: "plain".to_string(),
                node_name: "worker-1".to_string(),
                ..Default::default()
            },
            blank,
        ];

        let state = build_desired_state(&nodes, &pods, &AnnotationKeys::default());

        assert!(state.is_empty());
        assert!(state.diagnostics.is_empty());
    }

    #[test]
    fn test_pods_sharing_host_merge_and_dedupe() {
        let nodes = vec![
            node("worker-1", Some("1.2.3.4")),
            node("worker-2", Some("5.6.7.8")),
        ];
        let pods = vec![
            pod("web-0", "worker-1", "api.example.com"),
            pod("web-1", "worker-2", "api.example.com"),
            pod("web-2", "worker-1", "API.example.com."),
        ];

        let state = build_desired_state(&nodes, &pods, &AnnotationKeys::default());

        assert_eq!(state.len(), 1);
        let host = state.get("api.example.com").unwrap();
        assert_eq!(host.addresses, set(&["1.2.3.4", "5.6.7.8"]));
        assert_eq!(host.source_pods, set(&["web-0", "web-1", "web-2"]));
    }

    #[test]
    fn test_proxy_flag_is_or_reduced() {
        let nodes = vec![
            node("worker-1", Some("1.2.3.4")),
            node("worker-2", Some("5.6.7.8")),
        ];
        let pods = vec![
            pod("web-0", "worker-1", "api.example.com"),
            proxied_pod("web-1", "worker-2", "api.example.com"),
            pod("db-0", "worker-2", "db.example.com"),
        ];

        let state = build_desired_state(&nodes, &pods, &AnnotationKeys::default());

        assert!(state.get("api.example.com").unwrap().proxied);
        assert!(!state.get("db.example.com").unwrap().proxied);
    }

    #[test]
    fn test_missing_node_address_is_diagnosed_and_skipped() {
        let nodes = vec![
            node("worker-1", Some("1.2.3.4")),
            node("internal-only", None),
        ];
        let pods = vec![
            pod("web-0", "worker-1", "api.example.com"),
            pod("web-1", "internal-only", "api.example.com"),
            pod("pending", "", "queue.example.com"),
        ];

        let state = build_desired_state(&nodes, &pods, &AnnotationKeys::default());

        let host = state.get("api.example.com").unwrap();
        assert_eq!(host.addresses, set(&["1.2.3.4"]));
        assert_eq!(host.source_pods, set(&["web-0"]));
        assert!(state.get("queue.example.com").is_none());
        assert_eq!(
            state.diagnostics,
            vec![
                SyncError::MissingNodeAddress {
                    pod: "web-1".to_string(),
                    node: "internal-only".to_string(),
                },
                SyncError::MissingNodeAddress {
                    pod: "pending".to_string(),
                    node: String::new(),
                },
            ]
        );
    }

    #[test]
    fn test_ipv6_addresses_are_canonicalized() {
        let nodes = vec![
            node("v6-a", Some("2001:0db8:0000:0000:0000:0000:0000:0001")),
            node("v6-b", Some("2001:db8::1")),
        ];
        let pods = vec![
            pod("a", "v6-a", "api.example.com"),
            pod("b", "v6-b", "api.example.com"),
        ];

        let state = build_desired_state(&nodes, &pods, &AnnotationKeys::default());

        assert_eq!(
            state.get("api.example.com").unwrap().addresses,
            set(&["2001:db8::1"])
        );
    }

    #[test]
    fn test_builder_is_deterministic() {
        let nodes = vec![
            node("worker-1", Some("1.2.3.4")),
            node("worker-2", Some("5.6.7.8")),
        ];
        let pods = vec![
            pod("web-1", "worker-2", "api.example.com"),
            pod("web-0", "worker-1", "api.example.com"),
            proxied_pod("www-0", "worker-1", "www.example.com"),
        ];
        let keys = AnnotationKeys::default();

        let first = build_desired_state(&nodes, &pods, &keys);
        let second = build_desired_state(&nodes, &pods, &keys);

        assert_eq!(first, second);
    }

    #[test]
    fn test_custom_annotation_keys() {
        let keys = AnnotationKeys {
            hostname: "dns.example.io/host".to_string(),
            proxy: "dns.example.io/proxy".to_string(),
        };
        let mut custom = PodObservation {
            name: "custom".to_string(),
            node_name: "worker-1".to_string(),
            ..Default::default()
        };
        custom
            .annotations
            .insert("dns.example.io/host".to_string(), "edge.example.com".to_string());
        custom
            .annotations
            .insert("dns.example.io/proxy".to_string(), "YES".to_string());
        let default_keyed = pod("legacy", "worker-1", "legacy.example.com");

        let state = build_desired_state(
            &[node("worker-1", Some("1.2.3.4"))],
            &[custom, default_keyed],
            &keys,
        );

        assert_eq!(state.len(), 1);
        assert!(state.get("edge.example.com").unwrap().proxied);
    }

    #[test]
    fn test_parse_proxy_flag() {
        assert_eq!(parse_proxy_flag("true"), Some(true));
        assert_eq!(parse_proxy_flag(" TRUE "), Some(true));
        assert_eq!(parse_proxy_flag("1"), Some(true));
        assert_eq!(parse_proxy_flag("no"), Some(false));
        assert_eq!(parse_proxy_flag("0"), Some(false));
        assert_eq!(parse_proxy_flag("maybe"), None);
    }

    #[test]
    fn test_unparseable_proxy_flag_counts_as_false() {
        let mut p = pod("web-0", "worker-1", "api.example.com");
        p.annotations.insert(
            crate::labels::ANNOTATION_NODE_DNS_PROXIED.to_string(),
            "sometimes".to_string(),
        );

        let state = build_desired_state(
            &[node("worker-1", Some("1.2.3.4"))],
            &[p],
            &AnnotationKeys::default(),
        );

        assert!(!state.get("api.example.com").unwrap().proxied);
    }

    #[test]
    fn test_pod_hostname_normalizes() {
        let p = pod("web-0", "worker-1", " Api.Example.com. ");

        assert_eq!(
            pod_hostname(&p, &AnnotationKeys::default()),
            Some("api.example.com".to_string())
        );
    }
}
