use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::Parser;
use futures::future::join_all;
use nutriscan_core::{JsonRecognizer, ScanConfig, ScanResult, Scanner, fixture::TestCase};
use serde_json::json;
use tracing::*;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nutriscan")]
#[command(about = "Read nutrition facts from recognized label text")]
struct Args {
    #[arg(required = true, help = "Fragment lists or test cases, as JSON")]
    files: Vec<PathBuf>,

    #[arg(short, long, help = "Scan configuration JSON file")]
    config: Option<PathBuf>,

    #[arg(long, help = "Compare every result with the expected result of its test case")]
    check: bool,

    #[arg(long, help = "Write logs as JSON lines")]
    json_logs: bool,

    #[arg(long, help = "Pretty-print results")]
    pretty: bool,
}

fn init_tracing(json_logs: bool) {
    let registry = tracing_subscriber::registry().with(EnvFilter::from_default_env());
    match json_logs {
        true => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        false => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// `Ok(false)` when the test case has an expected result and the scan differs.
fn check(path: &Path, result: &ScanResult) -> anyhow::Result<bool> {
    let case = TestCase::load(path).with_context(|| format!("Loading test case {:?}", path))?;
    let Some(expected) = case.expected else {
        warn!("Test case {} has no expected result", case.id);
        return Ok(true);
    };
    if &expected != result {
        error!("Test case {} does not match its expected result", case.id);
        return Ok(false);
    }
    info!("Test case {} matches", case.id);
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let config = match &args.config {
        Some(path) => ScanConfig::from_json_file(path)?,
        None => ScanConfig::default(),
    };
    let scanner = Scanner::new(config);

    let scans = join_all(args.files.iter().map(|path| {
        let scanner = &scanner;
        async move {
            let recognizer = JsonRecognizer::new(path);
            (path, scanner.scan_with(&recognizer).await)
        }
    }))
    .await;

    let mut failures = 0;
    for (path, scan) in scans {
        let result = match scan {
            Ok(result) => result,
            Err(e) => {
                error!("Scanning {:?} failed: {}", path, e);
                failures += 1;
                continue;
            }
        };

        let output = json!({ "file": path, "result": result });
        let line = match args.pretty {
            true => serde_json::to_string_pretty(&output)?,
            false => serde_json::to_string(&output)?,
        };
        println!("{}", line);

        if args.check && !check(path, &result)? {
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{} of {} labels failed", failures, args.files.len());
    }
    Ok(())
}
