//! End-to-end tests driving `Resolver::query` against mock upstream
//! nameservers on the loopback addresses.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::sleep;

use lodestar_resolver::{Config, Resolver};
use lodestar_wire::hints::RootHints;
use lodestar_wire::protocol::types::test_util::*;
use lodestar_wire::protocol::types::*;

/// A mock nameserver bound to a loopback address.  The behaviour
/// closure gets each decoded query and decides the reply; `None`
/// swallows the query, which a caller sees as a timeout.
struct Upstream {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

async fn upstream_on<F>(addr: SocketAddr, delay: Duration, behaviour: F) -> Upstream
where
    F: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
{
    let sock = UdpSocket::bind(addr).await.expect("could not bind mock upstream");
    let addr = sock.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let task_hits = hits.clone();
    tokio::spawn(async move {
        let mut buf = vec![0u8; 512];
        loop {
            let Ok((len, peer)) = sock.recv_from(&mut buf).await else {
                break;
            };
            task_hits.fetch_add(1, Ordering::SeqCst);
            let Ok(query) = Message::from_octets(&buf[..len]) else {
                continue;
            };
            if let Some(reply) = behaviour(&query) {
                sleep(delay).await;
                let octets = reply.to_octets().unwrap();
                let _ = sock.send_to(&octets, peer).await;
            }
        }
    });

    Upstream { addr, hits }
}

async fn upstream<F>(behaviour: F) -> Upstream
where
    F: Fn(&Message) -> Option<Message> + Send + Sync + 'static,
{
    upstream_on(
        (Ipv4Addr::LOCALHOST, 0).into(),
        Duration::ZERO,
        behaviour,
    )
    .await
}

fn proxy_config(upstreams: &[&Upstream]) -> Config {
    Config {
        upstreams: Some(upstreams.iter().map(|u| u.addr.ip()).collect()),
        upstream_port: upstreams[0].addr.port(),
        ..Config::default()
    }
}

fn answer_with(records: &[Record]) -> impl Fn(&Message) -> Option<Message> {
    let records = records.to_vec();
    move |query: &Message| {
        let mut reply = query.make_response();
        reply.answers = records.clone();
        Some(reply)
    }
}

// E1: an authoritative suffix synthesises NXDOMAIN for unknown names.
#[tokio::test]
async fn authority_suffix_synthesises_nxdomain() {
    let config = Config {
        authority_suffixes: vec![".lan".to_string()],
        ..Config::default()
    };
    let resolver = Resolver::new(config, &RootHints::default(), None);

    let res = resolver
        .query(&Name::new("host.lan"), RecordType::A)
        .await
        .expect("expected an answer");

    assert!(res.header.is_authoritative);
    assert_eq!(Rcode::NameError, res.header.rcode);
    assert!(res.answers.is_empty());
    assert_eq!(
        vec![ns_record("host.lan", "localhost", TTL_PERMANENT)],
        res.authority
    );
    assert_eq!(
        vec![a_record("host.lan", Ipv4Addr::LOCALHOST, TTL_PERMANENT)],
        res.additional
    );
}

// E2: a cached CNAME and its target are served with no network I/O.
#[tokio::test]
async fn cached_cname_chain_is_served_without_the_network() {
    let resolver = Resolver::new(Config::default(), &RootHints::default(), None);
    resolver
        .cache()
        .insert(&cname_record("www.example.com", "example.com", 300));
    resolver
        .cache()
        .insert(&a_record("example.com", Ipv4Addr::new(93, 184, 216, 34), 300));

    let res = resolver
        .query(&Name::new("www.example.com"), RecordType::A)
        .await
        .expect("expected an answer");

    assert_eq!(Rcode::NoError, res.header.rcode);
    assert_eq!(
        vec![RecordType::CNAME, RecordType::A],
        res.answers.iter().map(Record::rtype).collect::<Vec<_>>()
    );
}

// E3: concurrent identical queries coalesce onto one upstream
// exchange and share the result.
#[tokio::test]
async fn concurrent_queries_share_one_upstream_exchange() {
    let upstream = upstream_on(
        (Ipv4Addr::LOCALHOST, 0).into(),
        Duration::from_millis(50),
        answer_with(&[a_record("a.test", Ipv4Addr::new(192, 0, 2, 1), 300)]),
    )
    .await;
    let resolver = Resolver::new(proxy_config(&[&upstream]), &RootHints::default(), None);

    let name = Name::new("a.test");
    let (first, second) = tokio::join!(
        resolver.query(&name, RecordType::A),
        resolver.query(&name, RecordType::A),
    );

    assert!(first.is_some());
    assert_eq!(first, second);
    assert_eq!(1, upstream.hits.load(Ordering::SeqCst));
}

// E4: a reply with the wrong transaction id is discarded and the next
// candidate used instead.
#[tokio::test]
async fn mismatched_transaction_ids_are_discarded() {
    let liar = upstream(|query: &Message| {
        let mut reply = query.make_response();
        reply.header.id = query.header.id.wrapping_add(1);
        reply.answers = vec![a_record("b.test", Ipv4Addr::new(6, 6, 6, 6), 300)];
        Some(reply)
    })
    .await;
    let honest = upstream_on(
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)), liar.addr.port()),
        Duration::ZERO,
        answer_with(&[a_record("b.test", Ipv4Addr::new(192, 0, 2, 2), 300)]),
    )
    .await;

    let resolver = Resolver::new(
        proxy_config(&[&liar, &honest]),
        &RootHints::default(),
        None,
    );

    let res = resolver
        .query(&Name::new("b.test"), RecordType::A)
        .await
        .expect("expected an answer");

    assert_eq!(
        vec![a_record("b.test", Ipv4Addr::new(192, 0, 2, 2), 300)],
        res.answers
    );
    assert_eq!(1, liar.hits.load(Ordering::SeqCst));
    assert_eq!(1, honest.hits.load(Ordering::SeqCst));
}

// E5: when every candidate times out the caller sees a deadline miss,
// and a later caller joining the same flight sees the server failure
// the walk eventually produces.
#[tokio::test]
async fn exhausted_candidates_time_out_then_fail() {
    let silent = upstream(|_: &Message| None).await;
    let also_silent = upstream_on(
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2)), silent.addr.port()),
        Duration::ZERO,
        |_: &Message| None,
    )
    .await;

    let resolver = Resolver::new(
        proxy_config(&[&silent, &also_silent]),
        &RootHints::default(),
        None,
    );

    // the walk spends a 3s read timeout per candidate, so it is still
    // running when the first caller's 3s deadline passes
    let name = Name::new("c.test");
    assert_eq!(None, resolver.query(&name, RecordType::A).await);

    // joins the still-pending flight and outlives the walk
    sleep(Duration::from_millis(1500)).await;
    let res = resolver
        .query(&name, RecordType::A)
        .await
        .expect("expected the shared failure response");

    assert_eq!(Rcode::ServerFailure, res.header.rcode);
    assert!(res.answers.is_empty());
}

// E6: a glue-less referral makes the resolver look up the nameserver
// host through its own front door, then carry on with that address.
#[tokio::test]
async fn unglued_referrals_resolve_nameservers_via_subqueries() {
    let tld_server = upstream_on(
        (Ipv4Addr::new(127, 0, 0, 2), 0).into(),
        Duration::ZERO,
        answer_with(&[a_record("web.tld", Ipv4Addr::new(192, 0, 2, 99), 300)]),
    )
    .await;

    let tld_ip = tld_server.addr.ip();
    let root_server = upstream_on(
        (Ipv4Addr::LOCALHOST, tld_server.addr.port()).into(),
        Duration::ZERO,
        move |query: &Message| {
            let mut reply = query.make_response();
            match query.questions[0].name.as_str() {
                // a referral with no glue, plus the alias being chased
                "host.tld" => {
                    reply.answers = vec![cname_record("host.tld", "web.tld", 300)];
                    reply.authority = vec![ns_record("tld", "ns1.tld", 300)];
                }
                // the sub-query the referral forces
                "ns1.tld" => {
                    reply.answers = vec![Record {
                        name: Name::new("ns1.tld"),
                        rdata: match tld_ip {
                            IpAddr::V4(address) => RData::A { address },
                            IpAddr::V6(address) => RData::AAAA { address },
                        },
                        ttl: 300,
                    }];
                }
                _ => reply.header.rcode = Rcode::NameError,
            }
            Some(reply)
        },
    )
    .await;

    let hints = RootHints {
        records: vec![
            ns_record(".", "a.root.test", TTL_PERMANENT),
            a_record(
                "a.root.test",
                Ipv4Addr::LOCALHOST,
                TTL_PERMANENT,
            ),
        ],
    };
    let config = Config {
        upstream_port: root_server.addr.port(),
        ..Config::default()
    };
    let resolver = Resolver::new(config, &hints, None);

    let res = resolver
        .query(&Name::new("host.tld"), RecordType::A)
        .await
        .expect("expected an answer");

    assert_eq!(Rcode::NoError, res.header.rcode);
    assert_eq!(
        vec![
            cname_record("host.tld", "web.tld", 300),
            a_record("web.tld", Ipv4Addr::new(192, 0, 2, 99), 300),
        ],
        res.answers
    );
    assert!(tld_server.hits.load(Ordering::SeqCst) >= 1);
    assert!(root_server.hits.load(Ordering::SeqCst) >= 2);
}

// Remote records with a zero TTL, and SOA / MX records of any TTL,
// are returned but never cached.
#[tokio::test]
async fn uncacheable_records_are_returned_but_not_cached() {
    let upstream = upstream(|query: &Message| {
        let mut reply = query.make_response();
        reply.answers = vec![
            a_record("d.test", Ipv4Addr::new(192, 0, 2, 3), 300),
            a_record("d.test", Ipv4Addr::new(192, 0, 2, 4), 0),
            mx_record("d.test", "mail.d.test", 300),
        ];
        reply.authority = vec![soa_record("test", "ns1.test", 300)];
        Some(reply)
    })
    .await;
    let resolver = Resolver::new(proxy_config(&[&upstream]), &RootHints::default(), None);

    let name = Name::new("d.test");
    let res = resolver
        .query(&name, RecordType::ANY)
        .await
        .expect("expected an answer");

    assert_eq!(3, res.answers.len());
    assert_eq!(1, res.authority.len());

    let cache = resolver.cache();
    assert_eq!(1, cache.get(&name, RecordType::A).len());
    assert!(cache.get(&name, RecordType::MX).is_empty());
    assert!(cache.get(&Name::new("test"), RecordType::SOA).is_empty());
}

// With no candidates at all the walk fails immediately.
#[tokio::test]
async fn no_candidates_is_a_prompt_server_failure() {
    let resolver = Resolver::new(Config::default(), &RootHints::default(), None);

    let res = resolver
        .query(&Name::new("e.test"), RecordType::A)
        .await
        .expect("expected an answer");

    assert_eq!(Rcode::ServerFailure, res.header.rcode);
}

// A hosts file entry is served like any other permanent record.
#[tokio::test]
async fn hosts_file_entries_are_served() {
    let hosts =
        lodestar_wire::hosts::Hosts::deserialise("10.0.0.7 printer.home\n").unwrap();
    let resolver = Resolver::new(Config::default(), &RootHints::default(), Some(&hosts));

    let res = resolver
        .query(&Name::new("printer.home"), RecordType::A)
        .await
        .expect("expected an answer");

    assert_eq!(
        vec![a_record("printer.home", Ipv4Addr::new(10, 0, 0, 7), TTL_PERMANENT)],
        res.answers
    );
}
