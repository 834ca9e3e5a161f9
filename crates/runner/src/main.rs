use relay_runner::{
    ClientCredentialsProvider, Console, CredentialProvider, Prompt, Relay, RelayConfig,
    StaticCredentials,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn print_help() {
    eprintln!(
        r#"Exchange Relay - order entry and market-data fan-out over one exchange session

USAGE:
    relay [OPTIONS]

OPTIONS:
    --config <PATH>     Load configuration from JSON file
    --token <TOKEN>     Use this refresh token instead of the credential exchange
    --headless          Run without the operator console (stop with Ctrl-C)
    --help              Print this help message

ENVIRONMENT VARIABLES:
    RELAY_EXCHANGE_URL  Exchange WebSocket URL
    RELAY_PORT          Distribution server port (default: 9002)
    RELAY_CLIENT_ID     Client id for the credential exchange
    RELAY_CLIENT_SECRET Client secret for the credential exchange
    RUST_LOG            Log level filter

EXAMPLES:
    # Console on stdin, server on the default port
    relay --config relay.json

    # Server only
    RELAY_PORT=9100 relay --headless
"#
    );
}

struct Args {
    config_path: Option<String>,
    token: Option<String>,
    headless: bool,
}

fn parse_args() -> Option<Args> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args {
        config_path: None,
        token: None,
        headless: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                return None;
            }
            "--config" | "-c" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
                parsed.config_path = Some(args[i].clone());
            }
            "--token" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("Error: --token requires a value");
                    std::process::exit(1);
                }
                parsed.token = Some(args[i].clone());
            }
            "--headless" => parsed.headless = true,
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }
    Some(parsed)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay=info,relay_runner=info,relay_transport=info,relay_order_gateway=info,relay_subscription=info,relay_distribution=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let Some(args) = parse_args() else {
        return Ok(());
    };

    let mut config = match &args.config_path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            RelayConfig::from_file(path)?
        }
        None => {
            tracing::info!("Using default configuration");
            RelayConfig::default()
        }
    };
    config.apply_env()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.worker_threads())
        .enable_all()
        .build()?;

    runtime.block_on(run(config, args))
}

async fn run(config: RelayConfig, args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let provider: Box<dyn CredentialProvider> = match args.token {
        Some(token) => Box::new(StaticCredentials(token)),
        None => Box::new(ClientCredentialsProvider::new(&config.credentials)),
    };
    let token = provider.valid_token().await?;

    tracing::info!("Connecting to {}", config.exchange.ws_url);
    let relay = Relay::start(&config, &token).await?;

    let listener = relay.server().bind().await?;
    tracing::info!("Downstream endpoint: ws://{}/?api_key=<key>", config.server.addr());
    let server = relay.spawn_server(listener);

    if args.headless {
        tokio::signal::ctrl_c().await?;
    } else {
        let prompt = Prompt::new(
            tokio::io::BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        );
        let console = Console::new(relay.gateway().clone(), relay.bridge().clone(), prompt);
        tokio::select! {
            result = console.run() => result?,
            result = tokio::signal::ctrl_c() => result?,
        }
    }

    relay.shutdown().await;
    let _ = server.await;
    Ok(())
}
