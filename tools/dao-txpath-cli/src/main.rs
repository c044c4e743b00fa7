use std::path::PathBuf;

use alloy_primitives::{Address, U256};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dao_txpath::{
    callscript::{decode, encode, Segment},
    Config, DaoHost, Intent, PathResolver, TransactionAssembler,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod fixture;

use fixture::Fixture;

/// Encode and decode callscripts, and resolve permissioned transaction paths against a
/// DAO described by a JSON fixture.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode calls into a callscript.
    Encode {
        /// Call as `<to>:<hex calldata>`; repeat for several segments.
        #[arg(long = "call", required = true)]
        calls: Vec<String>,
    },

    /// Decode a callscript, expanding nested forward calls.
    Decode {
        /// Script hex, with or without `0x`.
        script: String,
    },

    /// Resolve an intent and print the transactions the sender has to submit.
    Resolve {
        /// DAO fixture (apps, events, chain facts).
        #[arg(long, env = "DAO_TXPATH_FIXTURE")]
        fixture: PathBuf,

        /// Overrides the fixture's `config` section.
        #[arg(long, env = "DAO_TXPATH_CONFIG")]
        config: Option<PathBuf>,

        #[arg(long, env = "DAO_TXPATH_SENDER")]
        sender: Address,

        /// Target app proxy.
        #[arg(long)]
        to: Address,

        /// Method name or full signature (eg, `mint` or `mint(address,uint256)`).
        #[arg(long)]
        method: String,

        #[arg(long = "param")]
        params: Vec<String>,

        /// Tokens the call pulls from the sender, as `<token>:<amount>`.
        #[arg(long)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Encode { calls } => {
            let segments = calls.iter().map(|c| parse_call(c)).collect::<Result<Vec<_>>>()?;
            println!("0x{}", hex::encode(encode(&segments)?));
        }
        Command::Decode { script } => {
            let bytes = parse_hex(&script)?;
            let segments = decode(&bytes).context("invalid callscript")?;
            println!("{}", serde_json::to_string_pretty(&segments)?);
        }
        Command::Resolve {
            fixture,
            config,
            sender,
            to,
            method,
            params,
            token,
        } => {
            let fixture = Fixture::load(&fixture)?;
            let config = match config {
                Some(path) => {
                    Config::from_json_file(&path).with_context(|| format!("failed reading {}", path.display()))?
                }
                None => fixture.config.clone(),
            };

            let mut host = DaoHost::new(config.host.clone(), fixture.registry()?);
            host.apply_all(fixture.events.iter().cloned()).await?;
            let snapshot = host.snapshot();
            info!(
                revision = snapshot.revision,
                apps = snapshot.apps.len(),
                forwarders = snapshot.apps.forwarders().count(),
                "fixture ingested"
            );

            let mut intent = Intent::invoke_str(&snapshot.apps, to, &method, &params)?;
            if let Some(token) = token {
                let (token, amount) = parse_token(&token)?;
                intent = intent.with_token(token, amount);
            }

            let chain = fixture.chain();
            let path = PathResolver::new(&snapshot, &chain, &config.resolver)
                .resolve(&intent, sender)
                .await?;
            let path = TransactionAssembler::new(&chain, &config.resolver)
                .assemble(path, &intent)
                .await?;
            println!("{}", serde_json::to_string_pretty(&path)?);
        }
    }
    Ok(())
}

fn parse_hex(raw: &str) -> Result<Vec<u8>> {
    let raw = raw.trim();
    hex::decode(raw.strip_prefix("0x").unwrap_or(raw)).with_context(|| format!("invalid hex `{raw}`"))
}

fn parse_call(raw: &str) -> Result<Segment> {
    let (to, data) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("expected `<to>:<hex calldata>`, got `{raw}`"))?;
    let to: Address = to.parse().with_context(|| format!("invalid address `{to}`"))?;
    Ok(Segment::new(to, parse_hex(data)?))
}

fn parse_token(raw: &str) -> Result<(Address, U256)> {
    let (token, amount) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("expected `<token>:<amount>`, got `{raw}`"))?;
    let token: Address = token.parse().with_context(|| format!("invalid token address `{token}`"))?;
    let amount: U256 = amount.parse().with_context(|| format!("invalid amount `{amount}`"))?;
    Ok((token, amount))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::address;

    use super::*;

    #[test]
    fn parses_call_segments() {
        let segment = parse_call("0x000000000000000000000000000000000000cafe:0xbeef").unwrap();
        assert_eq!(segment.to, address!("000000000000000000000000000000000000cafe"));
        assert_eq!(segment.data.as_ref(), &[0xbe, 0xef]);

        assert!(parse_call("0xcafe").is_err());
        assert!(parse_call("nope:beef").is_err());
    }

    #[test]
    fn parses_token_requirement() {
        let (token, amount) = parse_token("0x2222222222222222222222222222222222222222:1500").unwrap();
        assert_eq!(token, address!("2222222222222222222222222222222222222222"));
        assert_eq!(amount, U256::from(1500));
        assert!(parse_token("0x2222222222222222222222222222222222222222").is_err());
    }

    #[test]
    fn cli_parses_resolve() {
        let cli = Cli::try_parse_from([
            "dao-txpath",
            "resolve",
            "--fixture",
            "dao.json",
            "--sender",
            "0x1111111111111111111111111111111111111111",
            "--to",
            "0xa000000000000000000000000000000000000001",
            "--method",
            "mint",
            "--param",
            "0x1111111111111111111111111111111111111111",
            "--param",
            "10",
        ])
        .unwrap();
        match cli.command {
            Command::Resolve { method, params, token, .. } => {
                assert_eq!(method, "mint");
                assert_eq!(params.len(), 2);
                assert!(token.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
