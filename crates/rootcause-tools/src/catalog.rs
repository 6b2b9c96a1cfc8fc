use rootcause_core::ToolSpec;

const TOOLS: &[(&str, &str)] = &[
    ("get_metrics", "Instant Prometheus metrics for a service or pod: latency, error rate, CPU, memory"),
    ("get_metrics_range", "Prometheus metrics for a service or pod over a time window, to spot trends"),
    ("get_traces", "Recent Jaeger traces for a service, optionally only those with errors or above a latency"),
    ("get_trace", "One Jaeger trace by id with every span"),
    ("get_logs", "Recent log lines of a service or pod, optionally filtered to important lines"),
    ("get_dependencies", "Services the given service calls, from trace data"),
    ("get_services_used_by", "Services that call the given service, from trace data"),
    ("get_pods_from_service", "Pods backing a service and their status"),
    ("get_cluster_pods_and_services", "Every pod and service in the namespace"),
    ("kubectl_get", "List or fetch Kubernetes resources"),
    ("kubectl_describe", "Describe a Kubernetes resource, including events"),
    ("get_triage_metrics", "Golden signals and pre-digested anomaly lines for one resource"),
];

/// Tools a standard observability gateway serves.
pub fn default_catalog() -> Vec<ToolSpec> {
    TOOLS
        .iter()
        .map(|(name, description)| ToolSpec::new(*name, *description))
        .collect()
}

/// Keeps only the catalog entries named in `allowed`, in catalog order.
pub fn allow_list(catalog: Vec<ToolSpec>, allowed: &[&str]) -> Vec<ToolSpec> {
    catalog
        .into_iter()
        .filter(|spec| allowed.contains(&spec.name.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_has_unique_names() {
        let catalog = default_catalog();
        let mut names: Vec<_> = catalog.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), catalog.len());
        assert!(names.contains(&"get_triage_metrics"));
    }

    #[test]
    fn test_allow_list_filters_and_keeps_order() {
        let allowed = allow_list(default_catalog(), &["get_logs", "get_metrics", "rm_rf"]);
        let names: Vec<_> = allowed.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["get_metrics", "get_logs"]);
    }
}
