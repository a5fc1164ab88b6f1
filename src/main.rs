//! pawject-client -- issue authenticated requests against the Pawject backend.
//!
//! Entry point wiring:
//!   - Configuration loading (TOML + `PAWJECT_*` env overrides)
//!   - Tracing initialization
//!   - Shared `HttpClient` with token interceptor and refresh coordinator
//!   - One request, printed to stdout or written to a file

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use reqwest::Method;
use tracing_subscriber::EnvFilter;

use pawject_client::{ApiRequest, Config, HttpClient, LoginRequiredCallback, ResponseType};

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

struct CliArgs {
    config_path: PathBuf,
    method: Method,
    path: String,
    data: Option<String>,
    output: Option<PathBuf>,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("pawject.toml");
    let mut data = None;
    let mut output = None;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => config_path = PathBuf::from(required_value(&mut args, "--config")),
            "--data" | "-d" => data = Some(required_value(&mut args, "--data")),
            "--output" | "-o" => output = Some(PathBuf::from(required_value(&mut args, "--output"))),
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("pawject-client {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
            _ => positional.push(arg),
        }
    }

    let (method, path) = match positional.as_slice() {
        [path] => (Method::GET, path.clone()),
        [method, path] => match Method::from_bytes(method.to_uppercase().as_bytes()) {
            Ok(m) => (m, path.clone()),
            Err(_) => {
                eprintln!("Error: invalid HTTP method '{method}'");
                std::process::exit(1);
            }
        },
        _ => {
            print_usage();
            std::process::exit(1);
        }
    };

    CliArgs {
        config_path,
        method,
        path,
        data,
        output,
    }
}

fn required_value(args: &mut impl Iterator<Item = String>, flag: &str) -> String {
    args.next().unwrap_or_else(|| {
        eprintln!("Error: {flag} requires a value");
        std::process::exit(1);
    })
}

fn print_usage() {
    println!(
        "\
pawject-client {version} -- authenticated client for the Pawject backend

USAGE:
    pawject-client [OPTIONS] [METHOD] <PATH>

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: pawject.toml]
    -d, --data <JSON>      JSON request body
    -o, --output <PATH>    Write the response body to a file (or directory)
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    PAWJECT_CONFIG         Alternative to --config flag
    PAWJECT_*              Override individual settings (e.g. PAWJECT_BACKEND_URL)
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

/// Set up the tracing subscriber based on configuration.
fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("pawject_client={level},warn"))
    });

    // Logs go to stderr; stdout carries the response body.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = parse_args();

    // Allow PAWJECT_CONFIG env var as alternative to --config flag
    let config_path = std::env::var("PAWJECT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or(cli.config_path);

    let config = Config::load(&config_path)?;
    init_tracing(&config);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting pawject-client"
    );

    let client = HttpClient::from_config(&config).context("Failed to create HTTP client")?;
    let on_login_required: LoginRequiredCallback = Arc::new(|open| {
        if open {
            eprintln!("Session expired: sign in again to obtain a new refresh token.");
        }
    });
    client.state().set_login_required_callback(on_login_required);

    let mut request = ApiRequest::new(cli.method, cli.path);
    if let Some(data) = &cli.data {
        let body: serde_json::Value =
            serde_json::from_str(data).context("--data is not valid JSON")?;
        request = request.json(&body)?;
    }

    match &cli.output {
        Some(output) => {
            let download = client
                .download(request)
                .await
                .context("Request failed")?;
            let target = output_path(output, &download.filename);
            std::fs::write(&target, &download.bytes)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            eprintln!("Saved {} bytes to {}", download.bytes.len(), target.display());
        }
        None => {
            let response = client
                .execute(request.response_type(ResponseType::Json))
                .await
                .context("Request failed")?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&response.body)?;
            if !response.body.ends_with(b"\n") {
                stdout.write_all(b"\n")?;
            }
        }
    }

    Ok(())
}

/// A directory target receives the server-suggested filename.
fn output_path(output: &Path, filename: &str) -> PathBuf {
    if output.is_dir() {
        // Strip any directory components the server may have sent.
        let name = Path::new(filename)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| pawject_client::net::DEFAULT_DOWNLOAD_FILENAME.into());
        output.join(name)
    } else {
        output.to_path_buf()
    }
}
