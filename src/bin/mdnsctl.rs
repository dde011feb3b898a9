//! Control the local mDNS resolver daemon.
//!
//! Thin console front-end over the `mdns-ctl` library: one-shot lookups
//! (`lookup`, `rlookup`) and the open-ended `browse` mode, which runs until
//! killed or until the daemon goes away.

use clap::{Args, Parser, Subcommand};
use mdns_ctl::{
    BrowseEvent, BrowseSession, ControlConn, Error, LookupResult, Selector, MDNSD_SOCKET,
};
use std::io::Write;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mdnsctl", version, about = "control the mDNS resolver daemon")]
struct Cli {
    /// Path to the daemon control socket.
    #[arg(long, default_value = MDNSD_SOCKET, value_name = "PATH")]
    socket: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// One-shot lookups against a hostname.
    Lookup(LookupArgs),

    /// Reverse lookup: the hostname owning an IPv4 address.
    Rlookup {
        /// Address to look up.
        address: Ipv4Addr,
    },

    /// Browse for services, expanding categories as the daemon reveals them.
    Browse(BrowseArgs),
}

#[derive(Args)]
struct LookupArgs {
    /// Hostname to query, e.g. "myhost.local".
    hostname: String,

    /// Look up the IPv4 address (the default when no flag is given).
    #[arg(short = 'a', long)]
    address: bool,

    /// Look up host information (cpu and os).
    #[arg(short = 'i', long)]
    hinfo: bool,

    /// Look up the service record.
    #[arg(short = 's', long)]
    srv: bool,

    /// Look up the text record.
    #[arg(short = 't', long)]
    txt: bool,
}

#[derive(Args)]
struct BrowseArgs {
    /// Application to browse for, e.g. "_http". Omit both positional
    /// arguments to browse everything.
    #[arg(requires = "protocol")]
    application: Option<String>,

    /// Protocol the application runs on, e.g. "_tcp".
    #[arg(requires = "application")]
    protocol: Option<String>,

    /// Resolve connection details for every discovered service.
    #[arg(short, long)]
    resolve: bool,
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("mdnsctl: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> mdns_ctl::Result<ExitCode> {
    match cli.command {
        Command::Lookup(args) => lookup(&cli.socket, args),
        Command::Rlookup { address } => rlookup(&cli.socket, address),
        Command::Browse(args) => browse(&cli.socket, args),
    }
}

fn lookup(socket: &Path, args: LookupArgs) -> mdns_ctl::Result<ExitCode> {
    let mut conn = ControlConn::connect(socket)?;
    let any_flag = args.address || args.hinfo || args.srv || args.txt;

    if args.address || !any_flag {
        match conn.lookup_address(&args.hostname)? {
            LookupResult::Found(addr) => println!("Address: {addr}"),
            LookupResult::NotFound => println!("Address not found."),
        }
    }

    if args.hinfo {
        match conn.lookup_host_info(&args.hostname)? {
            LookupResult::Found(hinfo) => {
                println!("Cpu: {}", hinfo.cpu);
                println!("Os: {}", hinfo.os);
            }
            LookupResult::NotFound => println!("Hinfo not found."),
        }
    }

    if args.srv {
        match conn.lookup_service(&args.hostname)? {
            LookupResult::Found(srv) => {
                println!("Name: {}", srv.name);
                println!("Port: {}", srv.port);
                println!("Priority: {}", srv.priority);
                println!("Weight: {}", srv.weight);
            }
            LookupResult::NotFound => println!("SRV not found."),
        }
    }

    if args.txt {
        match conn.lookup_text(&args.hostname)? {
            LookupResult::Found(txt) => println!("TXT: {txt}"),
            LookupResult::NotFound => println!("TXT not found."),
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn rlookup(socket: &Path, address: Ipv4Addr) -> mdns_ctl::Result<ExitCode> {
    let mut conn = ControlConn::connect(socket)?;

    match conn.reverse_lookup(address)? {
        LookupResult::Found(hostname) => {
            println!("Hostname: {hostname}");
            Ok(ExitCode::SUCCESS)
        }
        LookupResult::NotFound => {
            println!("Name not found.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn browse(socket: &Path, args: BrowseArgs) -> mdns_ctl::Result<ExitCode> {
    let selector = match (args.application, args.protocol) {
        (Some(app), Some(proto)) => Selector::new(app, proto),
        _ => Selector::all(),
    };

    let conn = ControlConn::connect(socket)?;
    let session = BrowseSession::open(conn, selector, args.resolve)?;

    // Open-ended: only a fatal channel error gets us out of here.
    session.run(|event| {
        match event {
            BrowseEvent::ServiceUp(s) => {
                println!("+++ {:<48} {:<20} {}", s.name(), s.application(), s.protocol());
            }
            BrowseEvent::ServiceDown(s) => {
                println!("--- {:<48} {:<20} {}", s.name(), s.application(), s.protocol());
            }
            _ => {}
        }
        std::io::stdout()
            .flush()
            .map_err(|e| Error::Io(e.to_string()))
    })?;

    Ok(ExitCode::SUCCESS)
}
