//! The iterative walk: pick candidate nameservers, query them over
//! UDP, cache what comes back, and keep going while the answer is a
//! CNAME pointing somewhere new.

use rand::Rng;
use std::net::{IpAddr, SocketAddr};

use lodestar_wire::protocol::types::*;

use crate::{net, Resolver, ADDRESS_TYPES, CHASE_LIMIT};

/// Try to answer a question by querying remote nameservers, appending
/// to the response under construction.  `true` if at least one final
/// answer was obtained.
pub(crate) async fn resolve_remote(
    resolver: &Resolver,
    res: &mut Message,
    name: &Name,
    qtype: RecordType,
) -> bool {
    let port = resolver.config().upstream_port;
    let is_proxy = resolver.config().upstreams.is_some();

    let mut candidates = candidate_nameservers(resolver, name);
    let mut working = vec![name.clone()];
    let mut countable = 0;
    let mut iterations = 0;

    while countable == 0 {
        let Some(target) = working.first().cloned() else {
            break;
        };
        if iterations == CHASE_LIMIT {
            tracing::debug!(%name, "hit chase limit");
            break;
        }
        iterations += 1;
        working.clear();

        // most nameservers only answer the first question of a
        // multi-question message, so ask exactly one
        let mut request = Message::from_question(
            rand::thread_rng().gen(),
            Question {
                name: target.clone(),
                qtype,
            },
        );
        request.header.recursion_desired = is_proxy;
        let encoded = match request.to_octets() {
            Ok(encoded) => encoded,
            Err(error) => {
                tracing::warn!(message = ?request, ?error, "could not serialise message");
                break;
            }
        };

        let mut reply = None;
        for &ip in &candidates {
            if let Some(message) = net::exchange(SocketAddr::new(ip, port), &encoded).await {
                reply = Some(message);
                break;
            }
        }
        let Some(cres) = reply else {
            // every candidate failed: abandon this question with
            // whatever has been accumulated so far
            break;
        };

        for record in cres
            .answers
            .iter()
            .chain(&cres.authority)
            .chain(&cres.additional)
        {
            // SOA and MX records are returned but never cached
            if record.ttl > 0
                && !matches!(record.rtype(), RecordType::SOA | RecordType::MX)
            {
                resolver.cache().insert(record);
            }
        }

        for record in &cres.answers {
            res.answers.push(record.clone());
            if let RData::CNAME { cname } = &record.rdata {
                working.push(cname.clone());
            }
            if record.name == target
                && (qtype == RecordType::CNAME || record.rtype() != RecordType::CNAME)
            {
                countable += 1;
            }
        }
        for record in &cres.authority {
            res.authority.push(record.clone());
            // an SOA signals an authoritative negative or terminal
            // response, which is as final as an answer
            if record.rtype() == RecordType::SOA || qtype == RecordType::NS {
                countable += 1;
            }
        }
        res.additional.extend(cres.additional.iter().cloned());

        candidates = next_hop_addresses(resolver, &cres).await;

        if cres.header.rcode != Rcode::NoError {
            res.header.rcode = cres.header.rcode;
        }
    }

    countable > 0
}

/// Candidate nameserver addresses for a question, best first.
///
/// Walks up the name one label at a time looking for cached NS
/// records, keeping the first level that yields at least one usable
/// address; with nothing better this bottoms out at the root hints.
/// In proxy mode the configured upstreams are used instead,
/// regardless of the name.
fn candidate_nameservers(resolver: &Resolver, name: &Name) -> Vec<IpAddr> {
    if let Some(upstreams) = &resolver.config().upstreams {
        return upstreams.clone();
    }

    let cache = resolver.cache();
    let mut addresses = Vec::new();
    let mut cursor = name.parent();

    while let Some(domain) = cursor {
        for record in cache.get(&domain, RecordType::NS) {
            let RData::NS { nsdname } = &record.rdata else {
                continue;
            };
            if let Some(ip) = nsdname.as_ip() {
                addresses.push(ip);
            } else {
                addresses.extend(cached_addresses(resolver, nsdname));
            }
        }
        if !addresses.is_empty() {
            break;
        }
        cursor = domain.parent();
    }

    addresses
}

/// Nameserver addresses for the next iteration of the walk: glue from
/// the additional section when there is any, otherwise resolve each
/// authority host through the top-level query.
async fn next_hop_addresses(resolver: &Resolver, cres: &Message) -> Vec<IpAddr> {
    let mut addresses: Vec<IpAddr> = cres
        .additional
        .iter()
        .filter_map(|record| address_of(&record.rdata))
        .collect();

    if addresses.is_empty() {
        for record in &cres.authority {
            let host = match &record.rdata {
                RData::SOA { mname, .. } => mname,
                RData::NS { nsdname } => nsdname,
                _ => continue,
            };
            match resolver.query(host, RecordType::ANY).await {
                Some(sub) => {
                    addresses.extend(
                        sub.answers
                            .iter()
                            .filter_map(|record| address_of(&record.rdata)),
                    );
                }
                // carry on with whatever has been collected
                None => tracing::warn!(%host, "could not resolve nameserver host"),
            }
        }
    }

    addresses
}

/// Addresses for a hostname already present in the cache.
fn cached_addresses(resolver: &Resolver, host: &Name) -> Vec<IpAddr> {
    resolver
        .cache()
        .get_any_of(host, &ADDRESS_TYPES)
        .iter()
        .filter_map(|record| address_of(&record.rdata))
        .collect()
}

fn address_of(rdata: &RData) -> Option<IpAddr> {
    match rdata {
        RData::A { address } => Some(IpAddr::V4(*address)),
        RData::AAAA { address } => Some(IpAddr::V6(*address)),
        _ => None,
    }
}
