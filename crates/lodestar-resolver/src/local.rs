//! Resolution from the cache alone: CNAME expansion, direct matches
//! with whatever glue the cache can supply, and synthesised authority
//! for the locally-served zones.  No network I/O happens here.

use std::net::Ipv4Addr;

use lodestar_wire::protocol::types::*;

use crate::{Resolver, ADDRESS_TYPES};

/// Try to answer a question entirely from the cache, appending to the
/// response under construction.  `true` means the cache sufficed and
/// no remote lookup is needed.
pub(crate) async fn resolve_cached(
    resolver: &Resolver,
    res: &mut Message,
    name: &Name,
    qtype: RecordType,
) -> bool {
    let cache = resolver.cache();

    // an alias in the cache answers the question whatever its type;
    // chase the targets through the top-level query so the chain can
    // be completed remotely if it has to be
    let cnames = cache.get(name, RecordType::CNAME);
    if !cnames.is_empty() {
        res.answers.extend(cnames.iter().cloned());
        if !resolver.config().recursion_available || qtype == RecordType::CNAME {
            return true;
        }
        for record in &cnames {
            let RData::CNAME { cname } = &record.rdata else {
                continue;
            };
            match resolver.query(cname, qtype).await {
                Some(sub) if sub.header.rcode == Rcode::NoError => {
                    res.answers.extend(sub.answers);
                    res.authority = sub.authority;
                    res.additional = sub.additional;
                }
                _ => continue,
            }
        }
        return true;
    }

    let mut countable = 0;
    for record in cache.get(name, qtype) {
        if let RData::NS { nsdname } = &record.rdata {
            // only a nameserver we can also supply an address for is
            // worth referring the client to
            let glue = cache.get_any_of(nsdname, &ADDRESS_TYPES);
            if !glue.is_empty() {
                res.additional.extend(glue);
                if record.rtype() == qtype {
                    countable += 1;
                }
                res.authority.push(record);
            }
        } else {
            if qtype == RecordType::CNAME || record.rtype() != RecordType::CNAME {
                countable += 1;
            }
            res.answers.push(record.renamed(name));
        }
    }

    let suffixes = &resolver.config().authority_suffixes;
    if suffixes.iter().any(|suffix| name.has_suffix(suffix)) {
        if countable == 0 {
            res.header.rcode = Rcode::NameError;
            countable = 1;
        }
        res.header.is_authoritative = true;
        res.authority.push(Record::permanent(
            name.clone(),
            RData::NS {
                nsdname: Name::new("localhost"),
            },
        ));
        res.additional.push(Record::permanent(
            name.clone(),
            RData::A {
                address: Ipv4Addr::LOCALHOST,
            },
        ));
    }

    countable > 0
}

#[cfg(test)]
mod tests {
    use lodestar_wire::hints::RootHints;
    use lodestar_wire::protocol::types::test_util::*;

    use super::*;
    use crate::Config;

    fn resolver_with_suffixes(suffixes: &[&str]) -> Resolver {
        let config = Config {
            authority_suffixes: suffixes.iter().map(ToString::to_string).collect(),
            ..Config::default()
        };
        Resolver::new(config, &RootHints::default(), None)
    }

    fn fresh_response(name: &Name, qtype: RecordType) -> Message {
        let mut res = Message::from_question(0, Question {
            name: name.clone(),
            qtype,
        })
        .make_response();
        res.header.recursion_available = true;
        res
    }

    #[tokio::test]
    async fn empty_cache_is_not_sufficient() {
        let resolver = resolver_with_suffixes(&[]);
        let name = name("www.example.com");
        let mut res = fresh_response(&name, RecordType::A);

        assert!(!resolve_cached(&resolver, &mut res, &name, RecordType::A).await);
        assert!(res.answers.is_empty());
    }

    #[tokio::test]
    async fn direct_match_is_served_and_counted() {
        let resolver = resolver_with_suffixes(&[]);
        let name = name("www.example.com");
        resolver
            .cache()
            .insert(&a_record("WWW.Example.Com", Ipv4Addr::new(1, 1, 1, 1), 300));

        let mut res = fresh_response(&name, RecordType::A);
        assert!(resolve_cached(&resolver, &mut res, &name, RecordType::A).await);
        assert_eq!(1, res.answers.len());
        assert_eq!(name, res.answers[0].name);
        assert!(res.authority.is_empty());
    }

    #[tokio::test]
    async fn cname_and_target_are_expanded_from_cache() {
        let resolver = resolver_with_suffixes(&[]);
        let name = name("www.example.com");
        resolver
            .cache()
            .insert(&cname_record("www.example.com", "example.com", 300));
        resolver
            .cache()
            .insert(&a_record("example.com", Ipv4Addr::new(93, 184, 216, 34), 300));

        let mut res = fresh_response(&name, RecordType::A);
        assert!(resolve_cached(&resolver, &mut res, &name, RecordType::A).await);

        assert_eq!(2, res.answers.len());
        assert_eq!(RecordType::CNAME, res.answers[0].rtype());
        assert_eq!(
            RData::A {
                address: Ipv4Addr::new(93, 184, 216, 34)
            },
            res.answers[1].rdata
        );
    }

    #[tokio::test]
    async fn cname_question_is_not_chased() {
        let resolver = resolver_with_suffixes(&[]);
        let name = name("www.example.com");
        resolver
            .cache()
            .insert(&cname_record("www.example.com", "example.com", 300));

        let mut res = fresh_response(&name, RecordType::CNAME);
        assert!(resolve_cached(&resolver, &mut res, &name, RecordType::CNAME).await);
        assert_eq!(1, res.answers.len());
    }

    #[tokio::test]
    async fn ns_match_needs_glue_to_count() {
        let resolver = resolver_with_suffixes(&[]);
        let name = name("example.com");
        resolver
            .cache()
            .insert(&ns_record("example.com", "ns1.example.com", 300));

        // no glue for ns1: the NS record is not returnable
        let mut res = fresh_response(&name, RecordType::NS);
        assert!(!resolve_cached(&resolver, &mut res, &name, RecordType::NS).await);
        assert!(res.authority.is_empty());

        resolver
            .cache()
            .insert(&a_record("ns1.example.com", Ipv4Addr::new(192, 0, 2, 53), 300));

        let mut res = fresh_response(&name, RecordType::NS);
        assert!(resolve_cached(&resolver, &mut res, &name, RecordType::NS).await);
        assert_eq!(1, res.authority.len());
        assert_eq!(1, res.additional.len());
    }

    #[tokio::test]
    async fn authority_suffix_synthesises_nxdomain() {
        let resolver = resolver_with_suffixes(&[".lan"]);
        let name = name("host.lan");

        let mut res = fresh_response(&name, RecordType::A);
        assert!(resolve_cached(&resolver, &mut res, &name, RecordType::A).await);

        assert!(res.header.is_authoritative);
        assert_eq!(Rcode::NameError, res.header.rcode);
        assert!(res.answers.is_empty());
        assert_eq!(
            vec![Record::permanent(
                name.clone(),
                RData::NS {
                    nsdname: Name::new("localhost")
                }
            )],
            res.authority
        );
        assert_eq!(
            vec![Record::permanent(
                name.clone(),
                RData::A {
                    address: Ipv4Addr::LOCALHOST
                }
            )],
            res.additional
        );
    }

    #[tokio::test]
    async fn authority_suffix_with_real_answer_is_not_nxdomain() {
        let resolver = resolver_with_suffixes(&[".lan"]);
        let name = name("host.lan");
        resolver
            .cache()
            .insert(&a_record("host.lan", Ipv4Addr::new(10, 0, 0, 2), TTL_PERMANENT));

        let mut res = fresh_response(&name, RecordType::A);
        assert!(resolve_cached(&resolver, &mut res, &name, RecordType::A).await);

        assert!(res.header.is_authoritative);
        assert_eq!(Rcode::NoError, res.header.rcode);
        assert_eq!(1, res.answers.len());
    }

    #[tokio::test]
    async fn seeded_loopback_ptr_is_served() {
        let resolver = resolver_with_suffixes(&[]);
        let name = name("1.0.0.127.in-addr.arpa");

        let mut res = fresh_response(&name, RecordType::PTR);
        assert!(resolve_cached(&resolver, &mut res, &name, RecordType::PTR).await);

        assert_eq!(
            vec![ptr_record("1.0.0.127.in-addr.arpa", "lodestard", TTL_PERMANENT)],
            res.answers
        );
    }
}
