use anyhow::Result;
use clap::{value_parser, Arg, ArgMatches, Command};
use contract_dispatch::config::Config;
use contract_dispatch::ethereum::utils;
use contract_dispatch::server::{describe_error, parse_gas_price, ContractDispatchServer, ContractTarget};
use contract_dispatch::{CallOptions, EventOptions};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{error, info};

fn target_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("artifact")
                .short('a')
                .long("artifact")
                .value_name("FILE")
                .required(true)
                .help("ABI or build artifact JSON file"),
        )
        .arg(
            Arg::new("address")
                .long("address")
                .value_name("ADDRESS")
                .help("Deployed contract address"),
        )
        .arg(
            Arg::new("args")
                .long("args")
                .value_name("JSON")
                .help("Arguments as a JSON array (positional) or object (named)"),
        )
}

fn name_arg(required: bool, help: &'static str) -> Arg {
    Arg::new("name").value_name("NAME").required(required).help(help)
}

fn block_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .value_name("BLOCK")
        .value_parser(value_parser!(i64))
        .allow_negative_numbers(true)
        .help(help)
}

fn cli() -> Command {
    Command::new("contract-dispatch")
        .version("0.1.0")
        .about("ABI-driven contract calls, transactions and event queries")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("network")
                .short('n')
                .long("network")
                .value_name("NETWORK")
                .global(true)
                .help("Network to use (ethereum, sepolia, local, or any configured name)"),
        )
        .arg(
            Arg::new("rpc-url")
                .short('r')
                .long("rpc-url")
                .value_name("URL")
                .global(true)
                .help("RPC endpoint URL"),
        )
        .arg(
            Arg::new("allow-writes")
                .long("allow-writes")
                .global(true)
                .help("Allow write operations (transactions)")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .subcommand(Command::new("serve").about("Run the MCP server on stdio (default)"))
        .subcommand(
            target_args(Command::new("encode").about("Print call data"))
                .arg(name_arg(false, "Function name; omit to encode a deployment")),
        )
        .subcommand(
            target_args(Command::new("call").about("Call a function without a transaction"))
                .arg(name_arg(true, "Function name"))
                .arg(Arg::new("from").long("from").value_name("ADDRESS"))
                .arg(block_arg("block", "Block to call against; negative counts back from latest")),
        )
        .subcommand(
            target_args(Command::new("estimate").about("Estimate gas for a function call"))
                .arg(name_arg(true, "Function name"))
                .arg(Arg::new("from").long("from").value_name("ADDRESS"))
                .arg(Arg::new("value").long("value").value_name("WEI")),
        )
        .subcommand(
            target_args(Command::new("send").about("Send a transaction, or deploy when no function is named"))
                .arg(name_arg(false, "Function name; omit to deploy"))
                .arg(Arg::new("value").long("value").value_name("WEI"))
                .arg(
                    Arg::new("gas-limit")
                        .long("gas-limit")
                        .value_name("GAS")
                        .value_parser(value_parser!(u64)),
                )
                .arg(Arg::new("gas-price").long("gas-price").value_name("WEI"))
                .arg(
                    Arg::new("private-key")
                        .long("private-key")
                        .value_name("KEY")
                        .help("Signing key; defaults to CONTRACT_DISPATCH_PRIVATE_KEY"),
                )
                .arg(
                    Arg::new("confirmations")
                        .long("confirmations")
                        .value_name("N")
                        .value_parser(value_parser!(u64))
                        .help("Blocks to wait for on top of the mined block (at most 12)"),
                ),
        )
        .subcommand(
            target_args(Command::new("events").about("Query past events"))
                .arg(name_arg(true, "Event name"))
                .arg(block_arg("from-block", "First block; negative counts back from latest"))
                .arg(block_arg("to-block", "Last block; defaults to latest")),
        )
        .subcommand(
            target_args(Command::new("watch").about("Print matching events as they are mined"))
                .arg(name_arg(true, "Event name"))
                .arg(block_arg("from-block", "Also report events from this block on"))
                .arg(
                    Arg::new("poll-ms")
                        .long("poll-ms")
                        .value_name("MS")
                        .value_parser(value_parser!(u64))
                        .help("Polling interval in milliseconds"),
                ),
        )
}

fn target(matches: &ArgMatches) -> ContractTarget {
    ContractTarget {
        artifact: matches.get_one::<String>("artifact").cloned().unwrap_or_default(),
        address: matches.get_one::<String>("address").cloned(),
        network: matches.get_one::<String>("network").cloned(),
    }
}

fn json_args(matches: &ArgMatches) -> Result<Value> {
    utils::parse_json_args(matches.get_one::<String>("args").map(String::as_str))
}

fn name(matches: &ArgMatches) -> Option<&str> {
    matches.get_one::<String>("name").map(String::as_str)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn dispatch(server: &ContractDispatchServer, command: &str, matches: &ArgMatches) -> Result<()> {
    if command == "serve" {
        return server.run().await;
    }

    let target = target(matches);
    let args = json_args(matches)?;
    let function = name(matches).unwrap_or_default();

    match command {
        "encode" => println!("{}", server.encode(&target, name(matches), args).await?),
        "call" => {
            let opts = CallOptions {
                from: matches.get_one::<String>("from").cloned(),
                block: matches.get_one::<i64>("block").copied(),
                ..Default::default()
            };
            print_json(&server.call(&target, function, args, &opts).await?)?;
        }
        "estimate" => {
            let opts = CallOptions {
                from: matches.get_one::<String>("from").cloned(),
                value: matches.get_one::<String>("value").cloned().map(Value::String),
                ..Default::default()
            };
            println!("{}", server.estimate(&target, function, args, &opts).await?);
        }
        "send" => {
            let opts = CallOptions {
                value: matches.get_one::<String>("value").cloned().map(Value::String),
                gas: matches.get_one::<u64>("gas-limit").copied(),
                gas_price: matches
                    .get_one::<String>("gas-price")
                    .map(|price| parse_gas_price(price))
                    .transpose()?,
                private_key: matches
                    .get_one::<String>("private-key")
                    .cloned()
                    .or_else(Config::private_key_from_env),
                ..Default::default()
            };
            let confirmations = matches.get_one::<u64>("confirmations").copied();
            let receipt = server
                .send(&target, name(matches), args, opts, confirmations)
                .await?;
            print_json(&receipt)?;
        }
        "events" => {
            let opts = EventOptions {
                from_block: matches.get_one::<i64>("from-block").copied(),
                to_block: matches.get_one::<i64>("to-block").copied(),
                poll_rate: None,
            };
            print_json(&server.past_events(&target, function, args, &opts).await?)?;
        }
        "watch" => {
            let opts = EventOptions {
                from_block: matches.get_one::<i64>("from-block").copied(),
                to_block: None,
                poll_rate: matches.get_one::<u64>("poll-ms").copied().map(Duration::from_millis),
            };
            let mut watch = server.watch(&target, function, args, opts).await?;
            let handle = watch.handle();
            info!("Watching {} every {:?}", function, handle.poll_rate());
            loop {
                tokio::select! {
                    event = watch.next() => match event {
                        Some(Ok(event)) => println!("{}", serde_json::to_string(&event)?),
                        Some(Err(e)) => return Err(e.into()),
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        handle.close();
                        break;
                    }
                }
            }
        }
        other => anyhow::bail!("Unknown command: {}", other),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to stderr (stdout carries MCP traffic and command output)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let matches = cli().get_matches();

    // Handle special commands first
    if matches.get_flag("generate-config") {
        let sample_config = Config::generate_sample();
        println!("{}", sample_config);
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    // Load configuration, falling back to the default location
    let config_path = match matches.get_one::<String>("config") {
        Some(path) => Some(std::path::PathBuf::from(path)),
        None => Config::default_config_path().ok().filter(|path| path.exists()),
    };
    let mut config = Config::load_or_default(config_path).await;

    // Override with command line arguments
    if let Some(network) = matches.get_one::<String>("network") {
        config.default_network = network.clone();
    }

    if let Some(rpc_url) = matches.get_one::<String>("rpc-url") {
        if let Some(network_config) = config.networks.get_mut(&config.default_network) {
            network_config.rpc_url = rpc_url.clone();
        }
    }

    if matches.get_flag("allow-writes") {
        config.security.allow_write_operations = true;
    }

    info!("Default network: {}", config.default_network);
    info!(
        "Write operations allowed: {}",
        config.security.allow_write_operations
    );

    let server = ContractDispatchServer::new(config)?;

    let (command, sub_matches) = match matches.subcommand() {
        Some((command, sub_matches)) => (command, sub_matches),
        None => ("serve", &matches),
    };

    if let Err(e) = dispatch(&server, command, sub_matches).await {
        error!("{} failed: {}", command, describe_error(&e));
        return Err(e);
    }

    Ok(())
}
