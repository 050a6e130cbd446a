//! Cluster specification validation
//!
//! Runs after loading, before a model is ever built. Fails fast on the
//! first problem with a message naming the offending field.

use crate::cluster::{Cluster, Rule, ServerPool};
use crate::error::{CoreError, Result};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use tracing::debug;

/// Validate a loaded cluster specification.
#[tracing::instrument(skip_all, fields(cluster = %cluster.name))]
pub fn validate_cluster(cluster: &Cluster) -> Result<()> {
    let name_re = regex::Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$")
        .map_err(|e| CoreError::InvalidSpec(format!("name pattern failed to compile: {}", e)))?;

    check_name(&name_re, "cluster name", &cluster.name)?;

    let network = parse_cidr(&cluster.network.cidr)
        .ok_or_else(|| invalid(format!("network cidr '{}' is malformed", cluster.network.cidr)))?;

    if cluster.server_pools.is_empty() {
        return Err(invalid("at least one server pool is required"));
    }
    if !cluster.server_pools.iter().any(|p| p.role.is_master()) {
        return Err(invalid("no master or hybrid pool defined"));
    }

    let mut seen_pools = HashSet::new();
    for pool in &cluster.server_pools {
        check_name(&name_re, "pool name", &pool.name)?;
        if !seen_pools.insert(pool.name.as_str()) {
            return Err(invalid(format!("duplicate pool name '{}'", pool.name)));
        }
        validate_pool(&name_re, pool, network)?;
    }

    debug!(pools = cluster.server_pools.len(), "Cluster spec valid");
    Ok(())
}

fn validate_pool(name_re: &regex::Regex, pool: &ServerPool, network: (u32, u8)) -> Result<()> {
    if pool.min_count == 0 {
        return Err(invalid(format!("pool '{}': min_count must be at least 1", pool.name)));
    }
    if pool.min_count > pool.max_count {
        return Err(invalid(format!(
            "pool '{}': min_count {} exceeds max_count {}",
            pool.name, pool.min_count, pool.max_count
        )));
    }
    if pool.image.is_empty() {
        return Err(invalid(format!("pool '{}': image is required", pool.name)));
    }
    if pool.size.is_empty() {
        return Err(invalid(format!("pool '{}': size is required", pool.name)));
    }

    for subnet in &pool.subnets {
        check_name(name_re, "subnet name", &subnet.name)?;
        let sub = parse_cidr(&subnet.cidr).ok_or_else(|| {
            invalid(format!(
                "pool '{}': subnet '{}' cidr '{}' is malformed",
                pool.name, subnet.name, subnet.cidr
            ))
        })?;
        if !cidr_contains(network, sub) {
            return Err(invalid(format!(
                "pool '{}': subnet '{}' ({}) is outside the cluster network",
                pool.name, subnet.name, subnet.cidr
            )));
        }
    }

    for firewall in &pool.firewalls {
        check_name(name_re, "firewall name", &firewall.name)?;
        for rule in firewall.ingress_rules.iter().chain(&firewall.egress_rules) {
            validate_rule(&pool.name, &firewall.name, rule)?;
        }
    }

    if let Some(profile) = &pool.instance_profile {
        check_name(name_re, "instance profile name", &profile.name)?;
        if profile.role.name.is_empty() {
            return Err(invalid(format!(
                "pool '{}': instance profile '{}' has no role",
                pool.name, profile.name
            )));
        }
    }

    Ok(())
}

fn validate_rule(pool: &str, firewall: &str, rule: &Rule) -> Result<()> {
    if rule.from_port > rule.to_port {
        return Err(invalid(format!(
            "pool '{}': firewall '{}' rule has from_port {} > to_port {}",
            pool, firewall, rule.from_port, rule.to_port
        )));
    }
    if rule.source.is_empty() {
        return Err(invalid(format!(
            "pool '{}': firewall '{}' rule has an empty source",
            pool, firewall
        )));
    }
    if parse_cidr(&rule.source).is_none() {
        return Err(invalid(format!(
            "pool '{}': firewall '{}' rule source '{}' is not a CIDR",
            pool, firewall, rule.source
        )));
    }
    Ok(())
}

fn check_name(re: &regex::Regex, what: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(format!("{} is empty", what)));
    }
    if name.len() > 63 || !re.is_match(name) {
        return Err(invalid(format!(
            "{} '{}' must be lowercase alphanumeric or '-', at most 63 characters",
            what, name
        )));
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> CoreError {
    CoreError::InvalidSpec(message.into())
}

/// Parse `a.b.c.d/prefix` into the network base address and prefix length.
pub fn parse_cidr(cidr: &str) -> Option<(u32, u8)> {
    let (addr, prefix) = cidr.split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    Some((u32::from(addr) & mask(prefix), prefix))
}

/// Whether `inner` lies entirely inside `outer`.
pub fn cidr_contains(outer: (u32, u8), inner: (u32, u8)) -> bool {
    let (outer_base, outer_prefix) = outer;
    let (inner_base, inner_prefix) = inner;
    inner_prefix >= outer_prefix && (inner_base & mask(outer_prefix)) == outer_base
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix)
    }
}
