use bytes::BytesMut;
use clap::Parser;
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

use lodestar_resolver::net::send_udp_bytes_to;
use lodestar_resolver::{Config, Resolver};
use lodestar_wire::hints::RootHints;
use lodestar_wire::hosts::Hosts;
use lodestar_wire::protocol::types::{Message, Opcode, Rcode, RecordType};

async fn resolve_and_build_response(resolver: &Resolver, query: Message) -> Message {
    let mut response = query.make_response();

    match query.questions.first() {
        Some(question) if matches!(question.qtype, RecordType::Unknown(_)) => {
            tracing::info!(%question, "refused");
            response.header.rcode = Rcode::Refused;
        }
        Some(question) => {
            match resolver.query(&question.name, question.qtype).await {
                Some(answer) => {
                    tracing::info!(
                        %question,
                        rcode = %answer.header.rcode,
                        answers = %answer.answers.len(),
                        "ok"
                    );
                    response.header.is_authoritative = answer.header.is_authoritative;
                    response.header.rcode = answer.header.rcode;
                    response.answers = answer.answers;
                    response.authority = answer.authority;
                    response.additional = answer.additional;
                }
                None => {
                    tracing::info!(%question, "deadline exceeded");
                    response.header.rcode = Rcode::ServerFailure;
                }
            }
        }
        None => response.header.rcode = Rcode::FormatError,
    }

    response
}

async fn handle_raw_message(resolver: &Resolver, buf: &[u8]) -> Option<Message> {
    let res = Message::from_octets(buf);
    tracing::debug!(message = ?res, "got message");

    match res {
        Ok(msg) => {
            if msg.header.is_response {
                Some(Message::make_format_error_response(msg.header.id))
            } else if msg.header.opcode == Opcode::Standard {
                Some(resolve_and_build_response(resolver, msg).await)
            } else {
                let mut response = msg.make_response();
                response.header.rcode = Rcode::NotImplemented;
                Some(response)
            }
        }
        Err(err) => err.id().map(Message::make_format_error_response),
    }
}

async fn listen_udp_task(resolver: Resolver, socket: UdpSocket) {
    let (tx, mut rx) = mpsc::channel::<(Message, std::net::SocketAddr)>(32);
    let mut buf = vec![0u8; 512];

    loop {
        tokio::select! {
            Ok((size, peer)) = socket.recv_from(&mut buf) => {
                tracing::debug!(?peer, "UDP request");
                let bytes = BytesMut::from(&buf[..size]);
                let reply = tx.clone();
                let resolver = resolver.clone();
                tokio::spawn(async move {
                    if let Some(response) = handle_raw_message(&resolver, bytes.as_ref()).await {
                        if let Err(error) = reply.send((response, peer)).await {
                            tracing::debug!(?peer, ?error, "UDP reply channel error");
                        }
                    }
                });
            }

            Some((message, peer)) = rx.recv() => {
                match message.to_octets() {
                    Ok(mut serialised) => {
                        if let Err(error) = send_udp_bytes_to(&socket, peer, &mut serialised).await {
                            tracing::debug!(?peer, ?error, "UDP send error");
                        }
                    }
                    Err(error) => {
                        tracing::warn!(?peer, ?message, ?error, "could not serialise message");
                    }
                }
            }
        }
    }
}

/// Delete expired cache entries every 5 minutes.
async fn prune_cache_task(resolver: Resolver) {
    loop {
        sleep(Duration::from_secs(60 * 5)).await;
        let pruned = resolver.cache().prune();
        if pruned > 0 {
            tracing::info!(%pruned, size = %resolver.cache().len(), "pruned cache");
        }
    }
}

fn begin_logging() {
    let log_format = env::var("RUST_LOG_FORMAT").unwrap_or_default();
    let flags: Vec<&str> = log_format.split(',').collect();

    let logger = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(!flags.contains(&"no-ansi"));

    if flags.contains(&"json") {
        logger.json().init();
    } else if flags.contains(&"compact") {
        logger.compact().init();
    } else {
        logger.init();
    }
}

// the doc comments for this struct turn into the CLI help text
#[derive(Debug, Clone, Parser)]
/// A coalescing recursive DNS resolver for small networks.
///
/// lodestard walks the nameserver hierarchy itself starting from a
/// root hint set, caches what it learns, answers authoritatively for
/// configured local suffixes, and folds identical concurrent queries
/// into a single upstream walk.  With --upstream it forwards to a
/// fixed resolver instead of recursing.
struct Args {
    /// Interface to listen on
    #[clap(short, long, value_parser, default_value_t = Ipv4Addr::UNSPECIFIED)]
    interface: Ipv4Addr,

    /// Port to listen on
    #[clap(short, long, value_parser, default_value_t = 53, env = "LODESTARD_PORT")]
    port: u16,

    /// DNS suffix to answer for authoritatively (e.g. ".lan"), can be
    /// specified more than once
    #[clap(short = 'z', long = "authority-zone", value_parser)]
    authority_zones: Vec<String>,

    /// Forward queries to this nameserver instead of recursing from
    /// the root hints, can be specified more than once
    #[clap(short, long, value_parser)]
    upstream: Vec<IpAddr>,

    /// Port to query nameservers on
    #[clap(long, value_parser, default_value_t = 53)]
    upstream_port: u16,

    /// Path to a root hints file in named.root format (a bundled copy
    /// is used if not given)
    #[clap(long, value_parser)]
    hints_file: Option<PathBuf>,

    /// Path to a hosts file served with permanent TTLs
    #[clap(short = 'a', long, value_parser)]
    hosts_file: Option<PathBuf>,

    /// Name to serve from the loopback PTR record
    #[clap(long, value_parser, default_value = "lodestard")]
    server_name: String,
}

async fn load_hints(args: &Args) -> Option<RootHints> {
    let Some(path) = &args.hints_file else {
        return Some(RootHints::bundled());
    };

    match tokio::fs::read_to_string(path).await {
        Ok(data) => match RootHints::deserialise(&data) {
            Ok(hints) => Some(hints),
            Err(error) => {
                tracing::error!(?path, ?error, "could not parse hints file");
                None
            }
        },
        Err(error) => {
            tracing::error!(?path, ?error, "could not read hints file");
            None
        }
    }
}

async fn load_hosts(args: &Args) -> Option<Option<Hosts>> {
    let Some(path) = &args.hosts_file else {
        return Some(None);
    };

    match tokio::fs::read_to_string(path).await {
        Ok(data) => match Hosts::deserialise(&data) {
            Ok(hosts) => Some(Some(hosts)),
            Err(error) => {
                tracing::error!(?path, ?error, "could not parse hosts file");
                None
            }
        },
        Err(error) => {
            tracing::error!(?path, ?error, "could not read hosts file");
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    begin_logging();

    let Some(hints) = load_hints(&args).await else {
        process::exit(1);
    };
    let Some(hosts) = load_hosts(&args).await else {
        process::exit(1);
    };

    tracing::info!(interface = %args.interface, port = %args.port, "binding DNS UDP socket");
    let udp = match UdpSocket::bind((args.interface, args.port)).await {
        Ok(socket) => socket,
        Err(error) => {
            tracing::error!(?error, "could not bind DNS UDP socket");
            process::exit(1);
        }
    };

    let config = Config {
        server_name: args.server_name.clone(),
        authority_suffixes: args.authority_zones.clone(),
        upstreams: if args.upstream.is_empty() {
            None
        } else {
            Some(args.upstream.clone())
        },
        upstream_port: args.upstream_port,
        recursion_available: true,
    };
    let resolver = Resolver::new(config, &hints, hosts.as_ref());

    tokio::spawn(prune_cache_task(resolver.clone()));

    listen_udp_task(resolver, udp).await;
}
