//! Reverse-proxy label synthesis.
//!
//! Containers are routed by Traefik through Docker labels. These functions
//! are pure: they derive the label set from a project's routing config and
//! never touch the Docker API themselves.

use std::collections::HashMap;

use crate::project::{is_local_domain, Project};

/// Docker network shared by managed containers and the proxy.
pub const PROXY_NETWORK: &str = "wharf";

/// Label marking a container as managed by wharf.
pub const MANAGED_LABEL: &str = "wharf.managed";

/// Label carrying the owning project ID.
pub const PROJECT_LABEL: &str = "wharf.project";

/// Sanitize a name for use as a Traefik router/service name.
///
/// Lowercases, replaces anything outside [a-z0-9] with '-', collapses runs
/// of '-' and trims them from the ends. Total over arbitrary input.
pub fn sanitize_router_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

/// Synthesize the full label set for an image-kind project's container.
pub fn synthesize(project: &Project, base_domain: &str) -> HashMap<String, String> {
    let router = sanitize_router_name(&project.name);
    synthesize_inner(project, base_domain, &router)
}

/// Synthesize labels for one service of a compose-kind project.
///
/// The router name includes the service so two services of the same
/// project never collide.
pub fn synthesize_for_service(
    project: &Project,
    service: &str,
    base_domain: &str,
) -> HashMap<String, String> {
    let router = sanitize_router_name(&format!("{}-{}", project.name, service));
    synthesize_inner(project, base_domain, &router)
}

fn synthesize_inner(
    project: &Project,
    base_domain: &str,
    router: &str,
) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
    labels.insert(PROJECT_LABEL.to_string(), project.id.clone());

    // Unrouted projects get management labels only.
    let domain = match project.effective_domain(base_domain) {
        Some(d) => d,
        None => return labels,
    };

    labels.insert("traefik.enable".to_string(), "true".to_string());
    labels.insert("traefik.docker.network".to_string(), PROXY_NETWORK.to_string());
    labels.insert(
        format!("traefik.http.services.{}.loadbalancer.server.port", router),
        project.routed_port().to_string(),
    );

    let host_rule = format!("Host(`{}`)", domain);

    if is_local_domain(&domain) {
        // Plain HTTP only; there is no certificate story for *.localhost.
        labels.insert(format!("traefik.http.routers.{}.rule", router), host_rule);
        labels.insert(format!("traefik.http.routers.{}.entrypoints", router), "web".to_string());
    } else {
        // HTTP router redirects, HTTPS router terminates.
        labels.insert(format!("traefik.http.routers.{}-http.rule", router), host_rule.clone());
        labels.insert(
            format!("traefik.http.routers.{}-http.entrypoints", router),
            "web".to_string(),
        );
        labels.insert(
            format!("traefik.http.routers.{}-http.middlewares", router),
            "redirect-to-https@docker".to_string(),
        );
        labels.insert(format!("traefik.http.routers.{}.rule", router), host_rule);
        labels.insert(
            format!("traefik.http.routers.{}.entrypoints", router),
            "websecure".to_string(),
        );
        labels.insert(
            format!("traefik.http.routers.{}.tls.certresolver", router),
            "letsencrypt".to_string(),
        );
    }

    labels
}

/// Labels declaring the shared redirect-to-https middleware.
///
/// Applied to the proxy container itself, not to project containers.
pub fn redirect_middleware_labels() -> HashMap<String, String> {
    let mut labels = HashMap::new();
    labels.insert(
        "traefik.http.middlewares.redirect-to-https.redirectscheme.scheme".to_string(),
        "https".to_string(),
    );
    labels.insert(
        "traefik.http.middlewares.redirect-to-https.redirectscheme.permanent".to_string(),
        "true".to_string(),
    );
    labels
}
