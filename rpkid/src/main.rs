// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use rpki_common::log::{init_file_logger, init_logger};
use rtr::config::CacheConfig;
use slog::info;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

mod admin;
mod error;
mod instance;
mod log;
mod rpki_admin;

pub const COMPONENT_RPKID: &str = "rpkid";
pub const MOD_ADMIN: &str = "admin";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the RPKI origin validation daemon.
    Run(RunArgs),

    /// Generate the OpenAPI spec for the admin API.
    Apigen {
        #[arg(default_value = "rpki-admin.json")]
        path: String,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Address to listen on for the admin API.
    #[arg(long, default_value_t = IpAddr::V6(Ipv6Addr::UNSPECIFIED))]
    admin_addr: IpAddr,

    /// Port to listen on for the admin API.
    #[arg(long, default_value_t = 4323)]
    admin_port: u16,

    /// Write logs to this file instead of stdout.
    #[arg(long, env = "RPKID_LOG_FILE")]
    log_file: Option<String>,

    /// Cache server for the default VRF as `address:port:preference`.
    #[arg(long = "cache", value_parser = parse_cache)]
    caches: Vec<CacheConfig>,
}

/// Split off the preference at the last colon so that bracketed IPv6
/// addresses parse.
fn parse_cache(s: &str) -> Result<CacheConfig, String> {
    let (sa, preference) = s
        .rsplit_once(':')
        .ok_or(format!("expected address:port:preference, got {s}"))?;
    let sa: SocketAddr = sa
        .parse()
        .map_err(|e| format!("bad cache address {sa}: {e}"))?;
    let preference: u8 = preference
        .parse()
        .map_err(|e| format!("bad preference {preference}: {e}"))?;
    Ok(CacheConfig::new(sa.ip(), sa.port(), preference))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    match args.command {
        Commands::Run(run_args) => run(run_args).await,
        Commands::Apigen { path } => admin::apigen(&path),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let log = match &args.log_file {
        Some(path) => init_file_logger(path)
            .with_context(|| format!("open log file {path}"))?,
        None => init_logger(),
    };

    let context = Arc::new(admin::HandlerContext::new(log.clone()));
    let default = context.rpki.ensure(None);
    for c in args.caches {
        info!(log, "initial cache {} preference {}", c.id(), c.preference);
        default.caches.add(c)?;
    }

    let j = admin::start_server(
        log.clone(),
        args.admin_addr,
        args.admin_port,
        context.clone(),
    )
    .map_err(|e| anyhow!(e))?;
    j.await?;
    context.rpki.shutdown();
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cache_argument() {
        let c = parse_cache("192.0.2.1:3323:10").unwrap();
        assert_eq!(c.id().to_string(), "192.0.2.1:3323");
        assert_eq!(c.preference, 10);

        let c = parse_cache("[2001:db8::1]:323:1").unwrap();
        assert_eq!(c.id().to_string(), "[2001:db8::1]:323");

        assert!(parse_cache("192.0.2.1:323").is_err());
        assert!(parse_cache("192.0.2.1:323:300").is_err());
    }
}
