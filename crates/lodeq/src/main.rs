use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::process;

use lodestar_resolver::{Config, Resolver};
use lodestar_wire::hints::RootHints;
use lodestar_wire::protocol::types::{Message, Name, Rcode, Record, RecordType};

/// The resolver performs one nameserver round per query, learning as
/// it goes, so a cold lookup may take a few passes to walk down from
/// the roots.
const MAX_ATTEMPTS: usize = 10;

fn print_section(heading: &str, records: &[Record]) {
    if records.is_empty() {
        return;
    }

    println!("\n;; {heading}");
    for record in records {
        println!(
            "{}\t{}\tIN\t{}\t{}",
            record.name,
            record.ttl,
            record.rtype(),
            record.rdata
        );
    }
}

fn print_response(response: &Message) {
    if response.header.rcode != Rcode::NoError {
        println!("\n; {}", response.header.rcode);
    }
    print_section("ANSWER", &response.answers);
    print_section("AUTHORITY", &response.authority);
    print_section("ADDITIONAL", &response.additional);
}

// the doc comments for this struct turn into the CLI help text
#[derive(Debug, Parser)]
/// DNS lookup utility speaking to no server: it runs the resolver
/// in-process, walking from the bundled root hints (or forwarding to
/// --upstream).
struct Args {
    /// Domain name to resolve
    #[clap(value_parser)]
    domain: String,

    /// Query type to resolve
    #[clap(default_value_t = RecordType::A, value_parser)]
    qtype: RecordType,

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
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let hints = match &args.hints_file {
        Some(path) => {
            let data = match std::fs::read_to_string(path) {
                Ok(data) => data,
                Err(error) => {
                    eprintln!("could not read {}: {error}", path.display());
                    process::exit(1);
                }
            };
            match RootHints::deserialise(&data) {
                Ok(hints) => hints,
                Err(error) => {
                    eprintln!("could not parse {}: {error}", path.display());
                    process::exit(1);
                }
            }
        }
        None => RootHints::bundled(),
    };

    let config = Config {
        upstreams: if args.upstream.is_empty() {
            None
        } else {
            Some(args.upstream.clone())
        },
        upstream_port: args.upstream_port,
        ..Config::default()
    };
    let resolver = Resolver::new(config, &hints, None);

    let name = Name::new(&args.domain);
    println!(";; QUESTION");
    println!("{}\tIN\t{}", name, args.qtype);

    let mut last = None;
    for _ in 0..MAX_ATTEMPTS {
        match resolver.query(&name, args.qtype).await {
            Some(response) => {
                // a referral comes back as a server failure with the
                // delegation cached, so the next attempt starts lower
                // down; anything terminal ends the loop
                let done = match response.header.rcode {
                    Rcode::NameError => true,
                    Rcode::NoError => {
                        !response.answers.is_empty()
                            || response
                                .authority
                                .iter()
                                .any(|r| r.rtype() == RecordType::SOA)
                    }
                    _ => false,
                };
                last = Some(response);
                if done {
                    break;
                }
            }
            None => continue,
        }
    }

    match last {
        Some(response) => {
            let failed = response.header.rcode != Rcode::NoError;
            print_response(&response);
            if failed {
                process::exit(1);
            }
        }
        None => {
            println!("\n; timed out");
            process::exit(1);
        }
    }
}
