//! backsocks server binary.
//!
//! Usage: backsocks [-1qh] [-i listenip] [-p port] [-u user] [-P pass]
//!                  [-b bindaddr] [-w ip,ip,...] [-c connecthost] [-C port2]
//!
//! All arguments are optional; the default is an unauthenticated listener on
//! 0.0.0.0:1080.

use std::env;

use anyhow::{anyhow, bail, Context as _};
use tracing_subscriber::EnvFilter;

use backsocks::addr;
use backsocks::server::{Credentials, Server, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match build_config(env::args().skip(1).collect()).await {
        Ok(Some(config)) => config,
        Ok(None) => return Ok(()),
        Err(e) => {
            eprintln!("error: {e:#}");
            print_usage();
            std::process::exit(1);
        }
    };

    // logs go to stderr, one line per event; RUST_LOG overrides the default
    let default_filter = if config.quiet { "error" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Server::new(config).run().await?;
    Ok(())
}

/// Parse the command line into a validated configuration.
///
/// Returns `None` when `-h` was given and the usage text already printed.
async fn build_config(args: Vec<String>) -> anyhow::Result<Option<ServerConfig>> {
    let mut config = ServerConfig::new();
    let mut user: Option<String> = None;
    let mut pass: Option<String> = None;
    let mut whitelist: Option<String> = None;

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                return Ok(None);
            }
            "-1" => config.auth_once = true,
            "-q" => config.quiet = true,
            "-i" => config.listen_ip = next_value(&mut iter, "-i")?,
            "-p" => {
                config.port = next_value(&mut iter, "-p")?
                    .parse()
                    .context("invalid port for -p")?
            }
            "-u" => user = Some(next_value(&mut iter, "-u")?),
            "-P" => pass = Some(next_value(&mut iter, "-P")?),
            "-b" => {
                let host = next_value(&mut iter, "-b")?;
                let ip = addr::resolve_one(&host)
                    .await
                    .with_context(|| format!("failed to resolve {host}"))?;
                config.bind_addr = Some(ip);
            }
            "-w" => whitelist = Some(next_value(&mut iter, "-w")?),
            "-c" => config.connect_host = Some(next_value(&mut iter, "-c")?),
            "-C" => {
                config.relay_port = Some(
                    next_value(&mut iter, "-C")?
                        .parse()
                        .context("invalid port for -C")?,
                )
            }
            other => bail!("unknown option: {other}"),
        }
    }

    config.credentials = match (user, pass) {
        (Some(user), Some(pass)) => Some(Credentials { user, pass }),
        (None, None) => None,
        _ => bail!("user and pass must be used together"),
    };

    if let Some(list) = whitelist {
        for host in list.split(',') {
            let ip = addr::resolve_one(host)
                .await
                .with_context(|| format!("failed to resolve {host}"))?;
            config.whitelist.push(ip);
        }
    }

    config.validate().map_err(|e| anyhow!(e))?;
    Ok(Some(config))
}

fn next_value(iter: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    iter.next()
        .ok_or_else(|| anyhow!("option {flag} requires an operand"))
}

fn print_usage() {
    eprintln!(
        r#"backsocks SOCKS5 server
-----------------------
usage: backsocks -1 -q -i listenip -p port -u user -P pass -b bindaddr -w ips -c connecthost -C port2
all arguments are optional.
by default listenip is 0.0.0.0 and port 1080.

option -q disables logging.
option -b specifies which ip outgoing connections are bound to
option -w allows to specify a comma-separated whitelist of ip addresses,
 that may use the proxy without user/pass authentication.
 e.g. -w 127.0.0.1,192.168.1.1,::1 or just -w 10.0.0.1
 to allow access ONLY to those ips, choose an impossible to guess user/pw combo.
option -1 activates auth-once mode: once a specific ip address
 authed successfully with user/pass, it is added to a whitelist
 and may use the proxy without auth. this is handy for programs
 that don't support user/pass auth: authenticate once with a client
 that does, then point the rest at the same proxy.
option -c makes the proxy dial out to connecthost:port instead of
 listening, for hosts that cannot accept inbound connections.
option -C adds a second listener on port2; a connection arriving there
 is paired with the next arrival on the main port as a raw data relay,
 with no SOCKS dialogue on either side."#
    );
}
