//! Price Monitor - API host with mutual-TLS client authentication

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use price_monitor::{
    Error,
    cli::{Cli, Command},
    config::Config,
    gateway::Server,
    mtls::{CertificateBundle, CertificateValidator, certificate_info, is_certificate_valid},
    setup_tracing,
};

/// `EX_CONFIG` from sysexits.h: startup refused because of configuration.
const EXIT_CONFIG: u8 = 78;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Inspect { ref file }) => run_inspect(file),
        Some(Command::Verify { ref file }) => run_verify(&cli, file),
        Some(Command::Bundle) => run_bundle(&cli),
        Some(Command::Serve) | None => run_server(&cli).await,
    }
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli) -> Option<Config> {
    match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            if let Some(port) = cli.port {
                config.server.port = port;
            }
            if let Some(ref host) = cli.host {
                config.server.host = host.clone();
            }
            Some(config)
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            None
        }
    }
}

fn read_pem(file: &Path) -> Option<String> {
    match fs::read_to_string(file) {
        Ok(pem) => Some(pem),
        Err(e) => {
            eprintln!("❌ Cannot read {}: {e}", file.display());
            None
        }
    }
}

/// Run inspect command
fn run_inspect(file: &Path) -> ExitCode {
    let Some(pem) = read_pem(file) else {
        return ExitCode::FAILURE;
    };

    match certificate_info(&pem) {
        Ok(info) => match serde_json::to_string_pretty(&info) {
            Ok(json) => {
                println!("{json}");
                println!(
                    "\nCurrently valid: {}",
                    if is_certificate_valid(&pem) { "yes" } else { "no" }
                );
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Failed to serialize to JSON: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("❌ {}: {e}", file.display());
            ExitCode::FAILURE
        }
    }
}

/// Run verify command
fn run_verify(cli: &Cli, file: &Path) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };
    let Some(pem) = read_pem(file) else {
        return ExitCode::FAILURE;
    };

    let validator = match CertificateBundle::load(&config.mtls)
        .and_then(|bundle| CertificateValidator::new(&bundle))
    {
        Ok(v) => v,
        Err(e) => {
            eprintln!("❌ {e}");
            if !config.mtls.enabled {
                eprintln!("   Enable mTLS in the configuration to verify certificates.");
            }
            return ExitCode::FAILURE;
        }
    };

    let result = validator.validate_client_certificate(&pem);
    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("❌ Failed to serialize to JSON: {e}");
            return ExitCode::FAILURE;
        }
    }

    if result.is_authenticated {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Run bundle command
fn run_bundle(cli: &Cli) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    let bundle = match CertificateBundle::load(&config.mtls) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    if !bundle.is_loaded() {
        println!("mTLS is disabled; no certificate bundle loaded.");
        return ExitCode::SUCCESS;
    }

    print_certificate("CA", bundle.ca_cert());
    print_certificate("Server", bundle.server_cert());

    println!("Known client certificates: {}", bundle.known_client_certs().len());
    for (i, pem) in bundle.known_client_certs().iter().enumerate() {
        print_certificate(&format!("Client #{}", i + 1), pem);
    }

    ExitCode::SUCCESS
}

fn print_certificate(label: &str, pem: &str) {
    match certificate_info(pem) {
        Ok(info) => {
            let status = if info.is_valid { "✅" } else { "⚠️  outside validity window" };
            println!("📜 {label} {status}");
            println!("   Subject:     {}", info.subject);
            println!("   Issuer:      {}", info.issuer);
            println!("   Serial:      {}", info.serial_number);
            println!("   Not before:  {}", info.not_before);
            println!("   Not after:   {}", info.not_after);
            println!("   Fingerprint: {}", info.fingerprint);
            println!();
        }
        Err(e) => {
            println!("❌ {label}: {e}");
            println!();
        }
    }
}

/// Run the API server
async fn run_server(cli: &Cli) -> ExitCode {
    let Some(config) = load_config(cli) else {
        return ExitCode::FAILURE;
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        mtls = config.mtls.enabled,
        "Starting price monitor"
    );

    let result = match Server::new(config) {
        Ok(server) => server.run().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => server_exit_code(&e),
    }
}

fn server_exit_code(e: &Error) -> ExitCode {
    if e.is_config_fatal() {
        error!(error = %e, "Refusing to serve: unusable mTLS configuration");
        ExitCode::from(EXIT_CONFIG)
    } else {
        error!(error = %e, "Server error");
        ExitCode::FAILURE
    }
}
